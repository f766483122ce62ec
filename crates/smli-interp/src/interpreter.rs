//! The `Interpreter` facade.
//!
//! Owns the committed state together with the run-scoped resources: the
//! elaboration context, the reference store and the dynamic generation
//! counters. Elaboration and evaluation never commit a partial result; a
//! declaration whose evaluation raises leaves the committed state untouched.

use crate::elab::{ElabContext, Elaborator};
use crate::error::{ElaborationError, EvaluationError, InterpreterError, Warning};
use crate::eval::{Machine, Outcome};
use crate::initial::initial_state;
use crate::library::Library;
use crate::options::InterpreterOptions;
use crate::state::{Generations, State};
use crate::store::Store;
use crate::value::Value;
use smli_ast::ast::{Decl, Expr};
use smli_ast::derived;
use smli_types::display::normalize;
use std::rc::Rc;

/// Result of elaborating one top-level declaration.
#[derive(Debug, Clone)]
pub struct Elaboration {
    pub state: State,
    pub warnings: Vec<Warning>,
    /// Fresh-name counter after the declaration.
    pub name_counter: u32,
}

/// Result of evaluating one top-level declaration.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub state: State,
    /// The exception that escaped, if any.
    pub raised: Option<Value>,
    pub warnings: Vec<Warning>,
    /// Cells allocated or written, with their contents afterwards.
    pub store_changes: Vec<(usize, Value)>,
    pub generation_changes: Vec<(String, u32)>,
}

impl Evaluation {
    pub fn has_thrown(&self) -> bool {
        self.raised.is_some()
    }
}

pub struct Interpreter {
    state: State,
    cx: ElabContext,
    store: Store,
    generations: Generations,
    options: InterpreterOptions,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_options(InterpreterOptions::default())
    }

    pub fn with_options(options: InterpreterOptions) -> Self {
        let mut cx = ElabContext::default();
        let mut generations = Generations::new();
        let state = initial_state(&mut cx, &mut generations);
        Self { state, cx, store: Store::new(), generations, options }
    }

    pub fn options(&self) -> &InterpreterOptions {
        &self.options
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn register_library(&mut self, library: &Library) {
        self.state = library.install(&self.state);
    }

    /// Elaborates `decl` against the committed state. The inference context
    /// is kept on success; the returned state is not committed.
    #[allow(clippy::result_large_err)]
    pub fn elaborate(&mut self, decl: &Decl) -> Result<Elaboration, ElaborationError> {
        let mut cx = self.cx.clone();
        let mut elaborator = Elaborator::new(&mut cx, &self.options);
        let state = elaborator.elaborate_top(&self.state, decl)?;
        let warnings = elaborator.into_warnings();
        let name_counter = cx.names.counter();
        cx.generations.forget_changes();
        self.cx = cx;
        Ok(Elaboration { state, warnings, name_counter })
    }

    /// Evaluates `decl` against the committed state and commits its bindings
    /// unless it raised.
    pub fn evaluate(&mut self, decl: &Rc<Decl>) -> Result<Evaluation, EvaluationError> {
        let base = self.state.clone();
        let evaluation = self.evaluate_in(&base, decl)?;
        self.commit(&evaluation);
        Ok(evaluation)
    }

    /// Elaborates and evaluates `decl`; both phases commit together.
    pub fn interpret(&mut self, decl: &Rc<Decl>) -> Result<Evaluation, InterpreterError> {
        let elaboration = self.elaborate(decl)?;
        let mut evaluation = self.evaluate_in(&elaboration.state, decl)?;
        self.commit(&evaluation);
        let mut warnings = elaboration.warnings;
        warnings.append(&mut evaluation.warnings);
        evaluation.warnings = warnings;
        Ok(evaluation)
    }

    /// Interprets `val it = expr`.
    pub fn interpret_expr(&mut self, expr: Rc<Expr>) -> Result<Evaluation, InterpreterError> {
        self.interpret(&derived::val_named("it", expr))
    }

    /// A machine positioned at the start of `decl`, for step-by-step driving.
    /// Nothing it produces is committed.
    pub fn machine(&mut self, decl: Rc<Decl>) -> Machine<'_> {
        let mut machine = Machine::new(&mut self.store, &mut self.generations, &self.options);
        machine.push_decl(decl, self.state.clone());
        machine
    }

    /// Normalized type of a top-level identifier.
    pub fn static_type(&self, name: &str) -> Option<String> {
        let (ty, _) = self.state.get_static_value(name)?;
        Some(normalize(&self.cx.subst.apply(ty)).to_string())
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.state.get_dynamic_value(name).map(|(v, _)| v)
    }

    /// Display form of `v`, with infix constructors and references resolved.
    pub fn show(&self, v: &Value) -> String {
        v.show(Some(&self.state), Some(&self.store))
    }

    fn evaluate_in(&mut self, start: &State, decl: &Rc<Decl>) -> Result<Evaluation, EvaluationError> {
        tracing::debug!(decl = %decl, "evaluate");
        let store_mark = self.store.mark();
        let generation_mark = self.generations.mark();
        let mut machine = Machine::new(&mut self.store, &mut self.generations, &self.options);
        machine.push_decl(decl.clone(), start.clone());
        let (outcome, warnings) = machine.run()?;
        let (state, raised) = match outcome {
            Outcome::Declared(state) => (state, None),
            Outcome::Raised(exn) => (self.state.clone(), Some(exn)),
            Outcome::Value(_) => return Err(EvaluationError::internal("a declaration produced a value")),
        };
        Ok(Evaluation {
            state,
            raised,
            warnings,
            store_changes: self.store.changes_since(store_mark),
            generation_changes: self.generations.changes_since(generation_mark),
        })
    }

    /// Restarts the change journals, then adds the bindings unless `evaluation` raised.
    fn commit(&mut self, evaluation: &Evaluation) {
        self.store.forget_changes();
        self.generations.forget_changes();
        if evaluation.has_thrown() {
            return;
        }
        let delta = evaluation.state.delta_since(&self.state);
        self.state = self.state.extend(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smli_ast::derived::*;

    #[test]
    fn journals_restart_after_each_commit() {
        let mut interp = Interpreter::new();
        interp.interpret(&val_named("cell", app(var("ref"), int(0)))).unwrap();
        for n in 1..=3 {
            interp.interpret(&exception("E", None)).unwrap();
            let evaluation = interp.interpret_expr(infix(":=", var("cell"), int(n))).unwrap();
            assert_eq!(evaluation.store_changes.len(), 1);
            assert_eq!(interp.store.mark(), 0);
            assert_eq!(interp.generations.mark(), 0);
            assert_eq!(interp.cx.generations.mark(), 0);
        }
        assert_eq!(interp.generations.current("E"), 3);
    }

    #[test]
    fn raised_declarations_do_not_commit() {
        let mut interp = Interpreter::new();
        let decl = val_named("x", raise(var("Div")));
        let evaluation = interp.interpret(&decl).unwrap();
        assert!(evaluation.has_thrown());
        assert!(interp.value("x").is_none());
    }

    #[test]
    fn elaboration_errors_keep_the_context() {
        let mut interp = Interpreter::new();
        let before = interp.cx.names.counter();
        let err = interp.elaborate(&val_named("y", app(int(1), int(2)))).unwrap_err();
        assert!(matches!(err, ElaborationError::TypeClash { .. }));
        assert_eq!(interp.cx.names.counter(), before);
    }
}
