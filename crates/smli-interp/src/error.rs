//! Error and warning types.
//!
//! - `ElaborationError`: static errors; abort the enclosing top-level declaration
//! - `EvaluationError`: dynamic faults, distinct from language-level exceptions
//! - `InterpreterError`: either of the two, for callers that run both phases
//! - `Warning`: advisory diagnostics collected alongside results

use serde::{Deserialize, Serialize};
use smli_ast::span::Span;
use smli_types::TypeClash;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ElaborationError {
    #[error("Unbound value identifier \"{name}\".")]
    UnboundIdentifier { name: String, span: Span },
    #[error("Unbound type \"{name}\".")]
    UnboundType { name: String, span: Span },
    #[error("Unbound structure \"{name}\".")]
    UnboundModule { name: String, span: Span },
    #[error("{source}")]
    TypeClash {
        #[source]
        source: TypeClash,
        span: Span,
    },
    #[error("You simply cannot rebind \"{name}\".")]
    IllegalRebind { name: String, span: Span },
    #[error("Unguarded type variable \"{name}\".")]
    UnguardedTypeVariable { name: String, span: Span },
    #[error("Label \"{label}\" occurs more than once in the same record.")]
    DuplicateLabel { label: String, span: Span },
    #[error("Circularity in the types of \"{names}\": the recursive bindings did not settle.")]
    Circularity { names: String, span: Span },
    #[error("Unresolved record type \"{ty}\"; add a type annotation.")]
    UnresolvedRecord { ty: String, span: Span },
    #[error("Type constructor \"{name}\" expects {expected} argument(s), got {got}.")]
    Arity { name: String, expected: usize, got: usize, span: Span },
    #[error("\"{name}\" {reason}")]
    IllegalUse { name: String, reason: String, span: Span },
    #[error("internal elaboration error: {message}")]
    Internal { message: String, span: Span },
}

impl ElaborationError {
    pub fn span(&self) -> Span {
        match self {
            ElaborationError::UnboundIdentifier { span, .. }
            | ElaborationError::UnboundType { span, .. }
            | ElaborationError::UnboundModule { span, .. }
            | ElaborationError::TypeClash { span, .. }
            | ElaborationError::IllegalRebind { span, .. }
            | ElaborationError::UnguardedTypeVariable { span, .. }
            | ElaborationError::DuplicateLabel { span, .. }
            | ElaborationError::Circularity { span, .. }
            | ElaborationError::UnresolvedRecord { span, .. }
            | ElaborationError::Arity { span, .. }
            | ElaborationError::IllegalUse { span, .. }
            | ElaborationError::Internal { span, .. } => *span,
        }
    }

    pub fn clash(source: TypeClash, span: Span) -> Self {
        ElaborationError::TypeClash { source, span }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ElaborationError::Internal { message: message.into(), span: Span::default() }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Unbound value identifier \"{name}\" at run time.")]
    Unbound { name: String, span: Span },
    #[error("Unbound structure \"{name}\" at run time.")]
    UnboundModule { name: String, span: Span },
    #[error("Cannot dereference \"{value}\".")]
    Dereference { value: String },
    #[error("Cannot assign through \"{value}\".")]
    BadAssignment { value: String },
    #[error("Cannot raise \"{value}\": not an exception.")]
    RaiseNonException { value: String, span: Span },
    #[error("Cannot apply \"{value}\": not a function.")]
    NotAFunction { value: String, span: Span },
    #[error("You simply cannot rebind \"{name}\".")]
    IllegalRebind { name: String, span: Span },
    #[error("Evaluation stopped after {steps} steps.")]
    StepLimit { steps: u64 },
    #[error("internal evaluation error: {message}")]
    Internal { message: String },
}

impl EvaluationError {
    pub fn internal(message: impl Into<String>) -> Self {
        EvaluationError::Internal { message: message.into() }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InterpreterError {
    #[error("elaboration failed: {0}")]
    Elaboration(#[from] ElaborationError),
    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    NonExhaustive,
    Redundant,
    FreeTypeVariable,
    CircularityCheckSkipped,
    /// Text printed by the program.
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    pub span: Span,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>, span: Span) -> Self {
        Self { kind, message: message.into(), span }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
