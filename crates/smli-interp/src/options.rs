use serde::{Deserialize, Serialize};

/// Knobs for one interpreter instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterOptions {
    /// Abort evaluation with `EvaluationError::StepLimit` after this many frames.
    pub max_steps: Option<u64>,
    pub exhaustiveness_warnings: bool,
    /// Refinement passes for a recursive binding group before the final check.
    pub max_refinement_passes: usize,
    /// Recursive groups nested deeper than this skip the circularity check.
    pub circularity_check_depth: usize,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            max_steps: None,
            exhaustiveness_warnings: true,
            max_refinement_passes: 3,
            circularity_check_depth: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let opts: InterpreterOptions = serde_json::from_str(r#"{"max_steps": 10}"#).unwrap();
        assert_eq!(opts.max_steps, Some(10));
        assert!(opts.exhaustiveness_warnings);
        assert_eq!(opts.max_refinement_passes, 3);
    }
}
