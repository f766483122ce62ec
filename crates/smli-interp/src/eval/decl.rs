use super::expr::closure;
use super::{Frame, Machine, Outcome};
use crate::error::EvaluationError;
use crate::pattern::matches;
use crate::state::{allows_rebind, IdentifierStatus, InfixStatus, State};
use crate::value::{Closure, Constructor, Value};
use smli_ast::ast::{
    Decl, DeclKind, ExceptionBinding, Expr, ExprKind, LongId, Pattern, PatternKind, StructureExpr,
};
use smli_ast::span::Span;
use std::rc::Rc;

impl Machine<'_> {
    pub(super) fn start_decl(&mut self, decl: Rc<Decl>, env: State) -> Result<(), EvaluationError> {
        let span = decl.span;
        match &decl.kind {
            DeclKind::Value { .. } => return self.value_bindings(decl.clone(), env, 0, Vec::new()),
            DeclKind::Type(_) | DeclKind::Empty => self.finish(Outcome::Declared(env)),
            DeclKind::Datatype { bindings, .. } => {
                for c in bindings.iter().flat_map(|b| &b.constructors) {
                    check_rebind(&c.name, span)?;
                }
                let mut result = env.nested();
                for b in bindings {
                    for c in &b.constructors {
                        let ctor = Constructor {
                            name: Rc::from(c.name.as_str()),
                            has_arg: c.arg.is_some(),
                            generation: self.generations.next(&c.name),
                        };
                        result.set_dynamic_value(
                            &c.name,
                            Value::ValueConstructor(Rc::new(ctor)),
                            IdentifierStatus::ValueConstructor,
                        );
                    }
                    result.set_dynamic_type(&b.name, b.constructors.iter().map(|c| c.name.clone()).collect());
                }
                self.finish(Outcome::Declared(result));
            }
            DeclKind::DatatypeReplication { name, original } => {
                let constructors = match env.get_and_resolve_dynamic_structure(&original.qualifiers) {
                    Ok(Some(basis)) => basis.types.get(&original.name).cloned(),
                    Ok(None) => env.get_dynamic_type(&original.name).cloned(),
                    Err(name) => return Err(EvaluationError::UnboundModule { name, span }),
                }
                .ok_or_else(|| EvaluationError::Unbound { name: original.to_string(), span })?;
                let mut result = env.nested();
                for ctor in &constructors {
                    let id = LongId { qualifiers: original.qualifiers.clone(), name: ctor.clone() };
                    let (v, status) = lookup(&env, &id, span)?;
                    result.set_dynamic_value(ctor, v, status);
                }
                result.set_dynamic_type(name, constructors);
                self.finish(Outcome::Declared(result));
            }
            DeclKind::Exception(bindings) => {
                for b in bindings {
                    let (ExceptionBinding::Direct { name, .. } | ExceptionBinding::Alias { name, .. }) = b;
                    check_rebind(name, span)?;
                }
                let mut result = env.nested();
                for b in bindings {
                    match b {
                        ExceptionBinding::Direct { name, arg } => {
                            let ctor = Constructor {
                                name: Rc::from(name.as_str()),
                                has_arg: arg.is_some(),
                                generation: self.generations.next(name),
                            };
                            result.set_dynamic_value(
                                name,
                                Value::ExceptionConstructor(Rc::new(ctor)),
                                IdentifierStatus::ExceptionConstructor,
                            );
                        }
                        ExceptionBinding::Alias { name, original } => {
                            let (v, status) = lookup(&env, original, span)?;
                            result.set_dynamic_value(name, v, status);
                        }
                    }
                }
                self.finish(Outcome::Declared(result));
            }
            DeclKind::Local { decl: hidden, body } => {
                self.stack.push(Frame::LocalBody { body: body.clone(), base: env.clone() });
                self.push_decl(hidden.clone(), env);
            }
            DeclKind::Open(paths) => {
                let mut result = env.nested();
                for path in paths {
                    let full: Vec<String> =
                        path.qualifiers.iter().cloned().chain(std::iter::once(path.name.clone())).collect();
                    let basis = env
                        .get_and_resolve_dynamic_structure(&full)
                        .map_err(|name| EvaluationError::UnboundModule { name, span })?
                        .ok_or_else(|| EvaluationError::UnboundModule { name: path.to_string(), span })?;
                    for (name, (v, status)) in &basis.values {
                        result.set_dynamic_value(name, v.clone(), *status);
                    }
                    for (name, ctors) in &basis.types {
                        result.set_dynamic_type(name, ctors.clone());
                    }
                    for (name, inner) in &basis.structures {
                        result.set_dynamic_structure(name, inner.clone());
                    }
                }
                self.finish(Outcome::Declared(result));
            }
            DeclKind::Sequence(_) => return self.sequence(decl.clone(), 0, env),
            DeclKind::Infix { precedence, names } | DeclKind::Infixr { precedence, names } => {
                let right_associative = matches!(decl.kind, DeclKind::Infixr { .. });
                let status = InfixStatus { infix: true, precedence: *precedence, right_associative };
                self.finish(Outcome::Declared(fixity(&env, names, status)));
            }
            DeclKind::Nonfix(names) => {
                let status = InfixStatus { infix: false, precedence: 0, right_associative: false };
                self.finish(Outcome::Declared(fixity(&env, names, status)));
            }
            DeclKind::Structure(_) => {
                let result = env.nested();
                return self.structures(decl.clone(), env, 0, result);
            }
        }
        Ok(())
    }

    /// Schedules the next non-recursive right-hand side of a value
    /// declaration, or binds the whole declaration once every value is in.
    pub(super) fn value_bindings(
        &mut self,
        decl: Rc<Decl>,
        env: State,
        next: usize,
        values: Vec<Value>,
    ) -> Result<(), EvaluationError> {
        let DeclKind::Value { bindings, .. } = &decl.kind else {
            return Err(EvaluationError::internal("value frame over a non-value declaration"));
        };
        if next == 0 {
            let mut names = Vec::new();
            for b in bindings {
                match (b.recursive, bound_name(&b.pattern)) {
                    (true, Some(name)) => names.push(name),
                    _ => binders(&env, &b.pattern, &mut names),
                }
            }
            for name in names {
                check_rebind(name, decl.span)?;
            }
        }
        if let Some((index, b)) = bindings.iter().enumerate().skip(next).find(|(_, b)| !b.recursive) {
            let expr = b.expr.clone();
            self.stack.push(Frame::ValueBindings { decl: decl.clone(), env: env.clone(), next: index + 1, values });
            self.push_expr(expr, env);
            return Ok(());
        }

        let mut result = env.nested();
        for (b, v) in bindings.iter().filter(|b| !b.recursive).zip(&values) {
            match matches(&env, &*self.store, &b.pattern, v)? {
                Some(bound) => {
                    for (name, v) in bound {
                        result.set_dynamic_value(&name, v, IdentifierStatus::ValueVariable);
                    }
                }
                None => {
                    self.raise_builtin("Bind");
                    return Ok(());
                }
            }
        }

        let mut group: Vec<(String, Value)> = Vec::new();
        for b in bindings.iter().filter(|b| b.recursive) {
            let name = bound_name(&b.pattern).ok_or_else(|| {
                EvaluationError::internal(format!("recursive binding of \"{}\"", b.pattern))
            })?;
            let m = lambda_of(&b.expr).ok_or_else(|| {
                EvaluationError::internal(format!("recursive binding of \"{name}\" to a non-function"))
            })?;
            group.push((name.to_string(), closure(env.clone(), m)));
        }
        let recursives = Rc::new(group);
        for (name, bare) in recursives.iter() {
            if let Value::Closure(c) = bare {
                let bound = Closure { env: c.env.clone(), recursives: recursives.clone(), body: c.body.clone() };
                result.set_dynamic_value(name, Value::Closure(Rc::new(bound)), IdentifierStatus::ValueVariable);
            }
        }
        self.finish(Outcome::Declared(result));
        Ok(())
    }

    pub(super) fn sequence(&mut self, decl: Rc<Decl>, next: usize, env: State) -> Result<(), EvaluationError> {
        let DeclKind::Sequence(decls) = &decl.kind else {
            return Err(EvaluationError::internal("sequence frame over a non-sequence"));
        };
        match decls.get(next) {
            Some(member) => {
                let member = member.clone();
                self.stack.push(Frame::Sequence { decl: decl.clone(), next: next + 1 });
                self.push_decl(member, env);
            }
            None => self.finish(Outcome::Declared(env)),
        }
        Ok(())
    }

    /// Evaluates structure bindings from `next` on; every body starts from `env`.
    fn structures(&mut self, decl: Rc<Decl>, env: State, next: usize, mut result: State) -> Result<(), EvaluationError> {
        let DeclKind::Structure(bindings) = &decl.kind else {
            return Err(EvaluationError::internal("structure frame over a non-structure"));
        };
        let span = decl.span;
        for (index, b) in bindings.iter().enumerate().skip(next) {
            match &b.body {
                StructureExpr::Struct(body) => {
                    let body = body.clone();
                    self.stack.push(Frame::Structure { decl: decl.clone(), env: env.clone(), next: index, result });
                    self.push_decl(body, env);
                    return Ok(());
                }
                StructureExpr::Path(path) => {
                    let full: Vec<String> =
                        path.qualifiers.iter().cloned().chain(std::iter::once(path.name.clone())).collect();
                    let basis = env
                        .get_and_resolve_dynamic_structure(&full)
                        .map_err(|name| EvaluationError::UnboundModule { name, span })?
                        .ok_or_else(|| EvaluationError::UnboundModule { name: path.to_string(), span })?
                        .clone();
                    result.set_dynamic_structure(&b.name, Rc::new(basis));
                }
            }
        }
        self.finish(Outcome::Declared(result));
        Ok(())
    }

    pub(super) fn structure_done(
        &mut self,
        decl: Rc<Decl>,
        env: State,
        index: usize,
        mut result: State,
        inner: State,
    ) -> Result<(), EvaluationError> {
        let DeclKind::Structure(bindings) = &decl.kind else {
            return Err(EvaluationError::internal("structure frame over a non-structure"));
        };
        let name = bindings
            .get(index)
            .map(|b| b.name.clone())
            .ok_or_else(|| EvaluationError::internal("structure frame past its bindings"))?;
        result.set_dynamic_structure(&name, Rc::new(inner.delta_since(&env).dynamics));
        self.structures(decl, env, index + 1, result)
    }
}

fn lookup(env: &State, id: &LongId, span: Span) -> Result<(Value, IdentifierStatus), EvaluationError> {
    env.lookup_dynamic_value(id)
        .map_err(|name| EvaluationError::UnboundModule { name, span })?
        .cloned()
        .ok_or_else(|| EvaluationError::Unbound { name: id.to_string(), span })
}

fn check_rebind(name: &str, span: Span) -> Result<(), EvaluationError> {
    if allows_rebind(name) {
        Ok(())
    } else {
        Err(EvaluationError::IllegalRebind { name: name.to_string(), span })
    }
}

/// Names a pattern binds: layered names and simple identifiers that are not
/// constructors in `env`.
fn binders<'p>(env: &State, p: &'p Pattern, out: &mut Vec<&'p str>) {
    match &p.kind {
        PatternKind::Identifier(id) if id.is_simple() => {
            let constructor = matches!(
                env.lookup_dynamic_value(id),
                Ok(Some((_, IdentifierStatus::ValueConstructor | IdentifierStatus::ExceptionConstructor)))
            );
            if !constructor {
                out.push(&id.name);
            }
        }
        PatternKind::Record { fields, .. } => {
            for (_, field) in fields {
                binders(env, field, out);
            }
        }
        PatternKind::Constructor { arg, .. } => binders(env, arg, out),
        PatternKind::Layered { name, pattern, .. } => {
            out.push(name);
            binders(env, pattern, out);
        }
        PatternKind::Typed { pattern, .. } => binders(env, pattern, out),
        PatternKind::Wildcard | PatternKind::Constant(_) | PatternKind::Identifier(_) => {}
    }
}

fn fixity(env: &State, names: &[String], status: InfixStatus) -> State {
    let mut result = env.nested();
    for name in names {
        result.set_infix_status(name, status);
    }
    result
}

fn bound_name(p: &Pattern) -> Option<&str> {
    match &p.kind {
        PatternKind::Identifier(id) if id.is_simple() => Some(&id.name),
        PatternKind::Typed { pattern, .. } => bound_name(pattern),
        _ => None,
    }
}

fn lambda_of(e: &Expr) -> Option<Rc<smli_ast::ast::Match>> {
    match &e.kind {
        ExprKind::Lambda(m) => Some(m.clone()),
        ExprKind::Typed { expr, .. } => lambda_of(expr),
        _ => None,
    }
}
