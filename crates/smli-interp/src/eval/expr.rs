use super::{Frame, Machine, Outcome};
use crate::error::EvaluationError;
use crate::pattern::matches;
use crate::state::{IdentifierStatus, State};
use crate::value::{Closure, Constructed, NativeContext, Value, WORD_MASK};
use smli_ast::ast::{Constant, Expr, ExprKind, Match};
use smli_ast::span::Span;
use std::collections::BTreeMap;
use std::rc::Rc;

impl Machine<'_> {
    pub(super) fn start_expr(&mut self, expr: Rc<Expr>, env: State) -> Result<(), EvaluationError> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Constant(c) => match constant_value(c) {
                Some(v) => self.finish(Outcome::Value(v)),
                None => self.raise_builtin("Overflow"),
            },
            ExprKind::Identifier(id) => {
                let (v, _) = env
                    .lookup_dynamic_value(id)
                    .map_err(|name| EvaluationError::UnboundModule { name, span })?
                    .ok_or_else(|| EvaluationError::Unbound { name: id.to_string(), span })?;
                self.finish(Outcome::Value(v.clone().construct()));
            }
            ExprKind::Record(fields) => match fields.first() {
                None => self.finish(Outcome::Value(Value::unit())),
                Some((_, first)) => {
                    let first = first.clone();
                    self.stack.push(Frame::RecordEntries { expr: expr.clone(), env: env.clone(), done: Vec::new() });
                    self.push_expr(first, env);
                }
            },
            ExprKind::Let { decl, body } => {
                self.stack.push(Frame::LetBody { body: body.clone() });
                self.push_decl(decl.clone(), env);
            }
            ExprKind::Typed { expr: inner, .. } => self.push_expr(inner.clone(), env),
            ExprKind::Apply { func, arg } => {
                self.stack.push(Frame::ApplyFunction { arg: arg.clone(), env: env.clone(), span });
                self.push_expr(func.clone(), env);
            }
            ExprKind::Handle { expr: inner, handler } => {
                self.stack.push(Frame::Handle { handler: handler.clone(), env: env.clone() });
                self.push_expr(inner.clone(), env);
            }
            ExprKind::Raise(inner) => {
                self.stack.push(Frame::Raise { span });
                self.push_expr(inner.clone(), env);
            }
            ExprKind::Lambda(m) => self.finish(Outcome::Value(closure(env, m.clone()))),
        }
        Ok(())
    }

    pub(super) fn record_entry(
        &mut self,
        expr: Rc<Expr>,
        env: State,
        mut done: Vec<Value>,
        v: Value,
    ) -> Result<(), EvaluationError> {
        let ExprKind::Record(fields) = &expr.kind else {
            return Err(EvaluationError::internal("record frame over a non-record"));
        };
        done.push(v);
        if let Some((_, next)) = fields.get(done.len()) {
            let next = next.clone();
            self.stack.push(Frame::RecordEntries { expr: expr.clone(), env: env.clone(), done });
            self.push_expr(next, env);
            return Ok(());
        }
        let record: BTreeMap<String, Value> =
            fields.iter().map(|(l, _)| l.clone()).zip(done).collect();
        self.finish(Outcome::Value(Value::Record(Rc::new(record))));
        Ok(())
    }

    pub(super) fn apply(&mut self, func: Value, arg: Value, span: Span) -> Result<(), EvaluationError> {
        match &func {
            Value::Closure(c) => {
                let mut env = c.env.nested();
                for (name, sibling) in c.recursives.iter() {
                    if let Value::Closure(s) = sibling {
                        let rebound = Value::Closure(Rc::new(Closure {
                            env: s.env.clone(),
                            recursives: c.recursives.clone(),
                            body: s.body.clone(),
                        }));
                        env.set_dynamic_value(name, rebound, IdentifierStatus::ValueVariable);
                    }
                }
                for rule in &c.body.rules {
                    if let Some(bindings) = matches(&env, &*self.store, &rule.pattern, &arg)? {
                        for (name, v) in bindings {
                            env.set_dynamic_value(&name, v, IdentifierStatus::ValueVariable);
                        }
                        self.push_expr(rule.body.clone(), env);
                        return Ok(());
                    }
                }
                self.raise_builtin("Match");
            }
            Value::ValueConstructor(c) if &*c.name == "ref" && c.generation == 0 => {
                let addr = self.store.alloc(arg);
                self.finish(Outcome::Value(Value::Reference(addr)));
            }
            Value::ValueConstructor(c) if c.has_arg => {
                let built = Constructed { name: c.name.clone(), arg: Some(arg), generation: c.generation };
                self.finish(Outcome::Value(Value::Constructed(Rc::new(built))));
            }
            Value::ExceptionConstructor(c) if c.has_arg => {
                let built = Constructed { name: c.name.clone(), arg: Some(arg), generation: c.generation };
                self.finish(Outcome::Value(Value::Exception(Rc::new(built))));
            }
            Value::Native(f) => {
                let mut cx = NativeContext {
                    store: &mut *self.store,
                    generations: &mut *self.generations,
                    warnings: &mut self.warnings,
                    options: self.options,
                };
                let outcome = match f.call(arg, &mut cx)? {
                    crate::value::Completion::Normal(v) => Outcome::Value(v),
                    crate::value::Completion::Raised(v) => Outcome::Raised(v),
                };
                self.finish(outcome);
            }
            other => {
                return Err(EvaluationError::NotAFunction { value: other.to_string(), span });
            }
        }
        Ok(())
    }

    /// Selects the first handler rule matching `exn`; re-raises otherwise.
    pub(super) fn handle(&mut self, exn: Value, handler: &Match, env: State) -> Result<(), EvaluationError> {
        for rule in &handler.rules {
            if let Some(bindings) = matches(&env, &*self.store, &rule.pattern, &exn)? {
                let mut scope = env.nested();
                for (name, v) in bindings {
                    scope.set_dynamic_value(&name, v, IdentifierStatus::ValueVariable);
                }
                self.push_expr(rule.body.clone(), scope);
                return Ok(());
            }
        }
        self.finish(Outcome::Raised(exn));
        Ok(())
    }
}

pub(super) fn closure(env: State, body: Rc<Match>) -> Value {
    Value::Closure(Rc::new(Closure { env, recursives: Rc::new(Vec::new()), body }))
}

fn constant_value(c: &Constant) -> Option<Value> {
    Some(match c {
        Constant::Int(n) => return Value::int(*n),
        Constant::Real(x) => Value::Real(*x),
        Constant::Word(w) => Value::Word(w & WORD_MASK),
        Constant::Char(c) => Value::Char(*c),
        Constant::Str(s) => Value::string(s),
    })
}
