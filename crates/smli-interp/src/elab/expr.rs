use super::Elaborator;
use crate::error::ElaborationError;
use crate::exhaustive::{Checker, MatchRole};
use crate::state::{IdentifierStatus, State};
use smli_ast::ast::{Constant, Expr, ExprKind, Match};
use smli_types::{RecordType, Type};
use std::collections::BTreeMap;

pub(crate) fn constant_type(c: &Constant) -> Type {
    match c {
        Constant::Int(_) => Type::int(),
        Constant::Real(_) => Type::real(),
        Constant::Word(_) => Type::word(),
        Constant::Char(_) => Type::char(),
        Constant::Str(_) => Type::string(),
    }
}

impl Elaborator<'_> {
    #[allow(clippy::result_large_err)]
    pub(crate) fn expr(&mut self, state: &State, e: &Expr) -> Result<Type, ElaborationError> {
        let span = e.span;
        match &e.kind {
            ExprKind::Constant(c) => Ok(constant_type(c)),
            ExprKind::Identifier(id) => {
                let (ty, _) = state
                    .lookup_static_value(id)
                    .map_err(|name| ElaborationError::UnboundModule { name, span })?
                    .ok_or_else(|| ElaborationError::UnboundIdentifier { name: id.to_string(), span })?
                    .clone();
                Ok(self.instantiate(&ty))
            }
            ExprKind::Record(fields) => {
                let mut out = BTreeMap::new();
                for (label, field) in fields {
                    if out.contains_key(label) {
                        return Err(ElaborationError::DuplicateLabel { label: label.clone(), span });
                    }
                    let t = self.expr(state, field)?;
                    out.insert(label.clone(), t);
                }
                Ok(Type::Record(RecordType::complete(out)))
            }
            ExprKind::Let { decl, body } => {
                let inner = self.decl(state, decl, false)?;
                self.expr(&inner, body)
            }
            ExprKind::Typed { expr, ty } => {
                let t = self.expr(state, expr)?;
                let annotated = self.convert(state, ty, None, span)?;
                self.unify(&t, &annotated, span)
            }
            ExprKind::Apply { func, arg } => {
                let f = self.expr(state, func)?;
                let x = self.expr(state, arg)?;
                let r = self.fresh();
                self.unify(&f, &Type::fun(x, r.clone()), span)?;
                Ok(self.cx.subst.apply(&r))
            }
            ExprKind::Handle { expr, handler } => {
                let t = self.expr(state, expr)?;
                let h = self.match_type(state, handler, MatchRole::Handler)?;
                let Type::Function(_, result) = self.unify(&h, &Type::fun(Type::exn(), t), span)? else {
                    return Err(ElaborationError::Internal {
                        message: "handler is not a function".into(),
                        span,
                    });
                };
                Ok(*result)
            }
            ExprKind::Raise(inner) => {
                let t = self.expr(state, inner)?;
                self.unify(&t, &Type::exn(), span)?;
                Ok(self.fresh())
            }
            ExprKind::Lambda(m) => self.match_type(state, m, MatchRole::Function),
        }
    }

    /// Type of a match as a function from the matched value to the result.
    #[allow(clippy::result_large_err)]
    pub(crate) fn match_type(
        &mut self,
        state: &State,
        m: &Match,
        role: MatchRole,
    ) -> Result<Type, ElaborationError> {
        let arg = self.fresh();
        let result = self.fresh();
        for rule in &m.rules {
            let (bindings, pt) = self.pattern(state, &rule.pattern)?;
            self.unify(&arg, &pt, rule.pattern.span)?;
            let mut inner = state.nested();
            for (name, ty) in bindings {
                inner.set_static_value(&name, ty, IdentifierStatus::ValueVariable);
            }
            let bt = self.expr(&inner, &rule.body)?;
            self.unify(&result, &bt, rule.body.span)?;
        }
        if self.options.exhaustiveness_warnings {
            let patterns: Vec<_> = m.rules.iter().map(|r| &r.pattern).collect();
            let found = Checker::new(state, &self.cx.registry).check(&patterns, role, m.span);
            for w in found {
                self.warn(w.kind, w.message, w.span);
            }
        }
        Ok(self.cx.subst.apply(&Type::fun(arg, result)))
    }

    /// Non-expansive expressions, whose types may be generalized.
    pub(crate) fn is_safe(&self, state: &State, e: &Expr) -> bool {
        match &e.kind {
            ExprKind::Constant(_) | ExprKind::Identifier(_) | ExprKind::Lambda(_) => true,
            ExprKind::Record(fields) => fields.iter().all(|(_, f)| self.is_safe(state, f)),
            ExprKind::Typed { expr, .. } => self.is_safe(state, expr),
            ExprKind::Apply { func, arg } => {
                let ExprKind::Identifier(id) = &func.kind else { return false };
                let is_constructor = matches!(
                    state.lookup_static_value(id),
                    Ok(Some((
                        _,
                        IdentifierStatus::ValueConstructor | IdentifierStatus::ExceptionConstructor
                    )))
                );
                is_constructor && !(id.is_simple() && id.name == "ref") && self.is_safe(state, arg)
            }
            ExprKind::Let { .. } | ExprKind::Handle { .. } | ExprKind::Raise(_) => false,
        }
    }
}
