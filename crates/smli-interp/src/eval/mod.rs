//! Explicit-stack evaluation.
//!
//! The machine keeps a stack of frames. A frame either starts work on a
//! node (`Expr`, `Decl`) or waits for the result of its child (every other
//! variant). Starting a node pushes the continuation first and the child on
//! top, so the child runs next. Applying a closure replaces the application
//! by the closure body without keeping a frame for the caller, which keeps
//! tail calls in constant stack space.
//!
//! A raised exception is an ordinary result (`Outcome::Raised`): every
//! continuation except `Handle` drops itself and passes it on.

mod decl;
mod expr;

use crate::error::{EvaluationError, Warning};
use crate::options::InterpreterOptions;
use crate::state::{Generations, State};
use crate::store::Store;
use crate::value::{Completion, Value};
use smli_ast::ast::{Decl, Expr, Match};
use smli_ast::span::Span;
use std::rc::Rc;

/// What a finished frame hands to the one below it.
#[derive(Debug, Clone)]
pub enum Outcome {
    Value(Value),
    Raised(Value),
    Declared(State),
}

impl Outcome {
    pub fn into_completion(self) -> Result<Completion, EvaluationError> {
        match self {
            Outcome::Value(v) => Ok(Completion::Normal(v)),
            Outcome::Raised(v) => Ok(Completion::Raised(v)),
            Outcome::Declared(_) => {
                Err(EvaluationError::internal("a declaration finished where a value was expected"))
            }
        }
    }
}

#[derive(Debug)]
enum Frame {
    Expr { expr: Rc<Expr>, env: State },
    Decl { decl: Rc<Decl>, env: State },
    /// Fields of the record `expr` evaluated so far, in order.
    RecordEntries { expr: Rc<Expr>, env: State, done: Vec<Value> },
    ApplyFunction { arg: Rc<Expr>, env: State, span: Span },
    ApplyArgument { func: Value, span: Span },
    Raise { span: Span },
    Handle { handler: Rc<Match>, env: State },
    LetBody { body: Rc<Expr> },
    /// Non-recursive right-hand sides of a value declaration; `next` is the
    /// binding whose value arrives next.
    ValueBindings { decl: Rc<Decl>, env: State, next: usize, values: Vec<Value> },
    Sequence { decl: Rc<Decl>, next: usize },
    LocalBody { body: Rc<Decl>, base: State },
    LocalEnd { base: State, hidden: State },
    Structure { decl: Rc<Decl>, env: State, next: usize, result: State },
}

pub struct Machine<'a> {
    stack: Vec<Frame>,
    result: Option<Outcome>,
    store: &'a mut Store,
    generations: &'a mut Generations,
    warnings: Vec<Warning>,
    options: &'a InterpreterOptions,
    steps: u64,
}

impl<'a> Machine<'a> {
    pub fn new(store: &'a mut Store, generations: &'a mut Generations, options: &'a InterpreterOptions) -> Self {
        Self { stack: Vec::new(), result: None, store, generations, warnings: Vec::new(), options, steps: 0 }
    }

    pub fn push_expr(&mut self, expr: Rc<Expr>, env: State) {
        self.stack.push(Frame::Expr { expr, env });
    }

    pub fn push_decl(&mut self, decl: Rc<Decl>, env: State) {
        self.stack.push(Frame::Decl { decl, env });
    }

    /// Schedules `func arg` with both values already computed.
    pub fn push_application(&mut self, func: Value, arg: Value) {
        self.stack.push(Frame::ApplyArgument { func, span: Span::default() });
        self.result = Some(Outcome::Value(arg));
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Runs one frame. Returns whether frames remain.
    pub fn step(&mut self) -> Result<bool, EvaluationError> {
        let Some(frame) = self.stack.pop() else { return Ok(false) };
        self.steps += 1;
        if let Some(limit) = self.options.max_steps {
            if self.steps > limit {
                return Err(EvaluationError::StepLimit { steps: limit });
            }
        }
        match frame {
            Frame::Expr { expr, env } => {
                if self.result.is_some() {
                    return Err(EvaluationError::internal("expression started with a pending result"));
                }
                self.start_expr(expr, env)?;
            }
            Frame::Decl { decl, env } => {
                if self.result.is_some() {
                    return Err(EvaluationError::internal("declaration started with a pending result"));
                }
                self.start_decl(decl, env)?;
            }
            frame => {
                let outcome = self
                    .result
                    .take()
                    .ok_or_else(|| EvaluationError::internal("continuation resumed without a result"))?;
                match outcome {
                    Outcome::Raised(exn) => match frame {
                        Frame::Handle { handler, env } => self.handle(exn, &handler, env)?,
                        _ => self.result = Some(Outcome::Raised(exn)),
                    },
                    Outcome::Value(v) => self.resume_with_value(frame, v)?,
                    Outcome::Declared(state) => self.resume_with_state(frame, state)?,
                }
            }
        }
        Ok(!self.stack.is_empty())
    }

    pub fn run(mut self) -> Result<(Outcome, Vec<Warning>), EvaluationError> {
        while self.step()? {}
        tracing::trace!(steps = self.steps, "evaluation finished");
        let outcome = self
            .result
            .take()
            .ok_or_else(|| EvaluationError::internal("evaluation finished without a result"))?;
        Ok((outcome, self.warnings))
    }

    fn finish(&mut self, outcome: Outcome) {
        self.result = Some(outcome);
    }

    fn raise_builtin(&mut self, name: &str) {
        self.finish(Outcome::Raised(Value::builtin_exception(name)));
    }

    fn resume_with_value(&mut self, frame: Frame, v: Value) -> Result<(), EvaluationError> {
        match frame {
            Frame::RecordEntries { expr, env, done } => self.record_entry(expr, env, done, v),
            Frame::ApplyFunction { arg, env, span } => {
                self.stack.push(Frame::ApplyArgument { func: v, span });
                self.push_expr(arg, env);
                Ok(())
            }
            Frame::ApplyArgument { func, span } => self.apply(func, v, span),
            Frame::Raise { span } => {
                if !v.is_exception() {
                    return Err(EvaluationError::RaiseNonException { value: v.to_string(), span });
                }
                self.finish(Outcome::Raised(v.construct()));
                Ok(())
            }
            Frame::Handle { .. } => {
                self.finish(Outcome::Value(v));
                Ok(())
            }
            Frame::ValueBindings { decl, env, next, mut values } => {
                values.push(v);
                self.value_bindings(decl, env, next, values)
            }
            other => Err(EvaluationError::internal(format!("{other:?} cannot take a value"))),
        }
    }

    fn resume_with_state(&mut self, frame: Frame, state: State) -> Result<(), EvaluationError> {
        match frame {
            Frame::LetBody { body } => {
                self.push_expr(body, state);
                Ok(())
            }
            Frame::Sequence { decl, next } => self.sequence(decl, next, state),
            Frame::LocalBody { body, base } => {
                self.stack.push(Frame::LocalEnd { base, hidden: state.clone() });
                self.push_decl(body, state);
                Ok(())
            }
            Frame::LocalEnd { base, hidden } => {
                self.finish(Outcome::Declared(base.extend(state.delta_since(&hidden))));
                Ok(())
            }
            Frame::Structure { decl, env, next, result } => {
                self.structure_done(decl, env, next, result, state)
            }
            other => Err(EvaluationError::internal(format!("{other:?} cannot take a declaration"))),
        }
    }
}
