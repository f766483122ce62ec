//! Pattern typing.
//!
//! A pattern yields the variables it binds (name and monomorphic type) and
//! its own type. Identifiers that resolve to constructors or exceptions
//! match structurally; every other simple identifier binds a variable.

use super::expr::constant_type;
use super::Elaborator;
use crate::error::ElaborationError;
use crate::state::{allows_rebind, IdentifierStatus, State};
use smli_ast::ast::{LongId, Pattern, PatternKind};
use smli_ast::span::Span;
use smli_types::{RecordType, Type};
use std::collections::BTreeMap;

pub(crate) type PatternBindings = Vec<(String, Type)>;

impl Elaborator<'_> {
    #[allow(clippy::result_large_err)]
    pub(crate) fn pattern(
        &mut self,
        state: &State,
        p: &Pattern,
    ) -> Result<(PatternBindings, Type), ElaborationError> {
        let mut bindings = Vec::new();
        let ty = self.pattern_into(state, p, &mut bindings)?;
        Ok((bindings, ty))
    }

    #[allow(clippy::result_large_err)]
    fn pattern_into(
        &mut self,
        state: &State,
        p: &Pattern,
        out: &mut PatternBindings,
    ) -> Result<Type, ElaborationError> {
        let span = p.span;
        match &p.kind {
            PatternKind::Wildcard => Ok(self.fresh()),
            PatternKind::Constant(c) => Ok(constant_type(c)),
            PatternKind::Identifier(id) => match self.constructor_type(state, id, span)? {
                Some(ty) => {
                    if matches!(ty, Type::Function(..)) {
                        return Err(ElaborationError::IllegalUse {
                            name: id.to_string(),
                            reason: "needs an argument in a pattern.".into(),
                            span,
                        });
                    }
                    Ok(ty)
                }
                None if id.is_simple() => {
                    let t = self.fresh();
                    bind(out, &id.name, t.clone(), span)?;
                    Ok(t)
                }
                None => Err(ElaborationError::UnboundIdentifier { name: id.to_string(), span }),
            },
            PatternKind::Record { fields, complete } => {
                let mut types = BTreeMap::new();
                for (label, field) in fields {
                    if types.contains_key(label) {
                        return Err(ElaborationError::DuplicateLabel { label: label.clone(), span });
                    }
                    let t = self.pattern_into(state, field, out)?;
                    types.insert(label.clone(), t);
                }
                let row = if *complete { None } else { Some(self.cx.names.fresh_row()) };
                Ok(Type::Record(RecordType { fields: types, row }))
            }
            PatternKind::Constructor { name, arg } => {
                let Some(ty) = self.constructor_type(state, name, span)? else {
                    return Err(match state.lookup_static_value(name) {
                        Ok(Some(_)) => ElaborationError::IllegalUse {
                            name: name.to_string(),
                            reason: "is not a constructor.".into(),
                            span,
                        },
                        _ => ElaborationError::UnboundIdentifier { name: name.to_string(), span },
                    });
                };
                let Type::Function(param, result) = ty else {
                    return Err(ElaborationError::IllegalUse {
                        name: name.to_string(),
                        reason: "does not take an argument.".into(),
                        span,
                    });
                };
                let at = self.pattern_into(state, arg, out)?;
                self.unify(&param, &at, span)?;
                Ok(self.cx.subst.apply(&result))
            }
            PatternKind::Layered { name, ty, pattern } => {
                let mut t = self.pattern_into(state, pattern, out)?;
                if let Some(te) = ty {
                    let annotated = self.convert(state, te, None, span)?;
                    t = self.unify(&t, &annotated, span)?;
                }
                bind(out, name, t.clone(), span)?;
                Ok(t)
            }
            PatternKind::Typed { pattern, ty } => {
                let t = self.pattern_into(state, pattern, out)?;
                let annotated = self.convert(state, ty, None, span)?;
                self.unify(&t, &annotated, span)
            }
        }
    }

    /// Instantiated type of `id` if it names a constructor or exception.
    #[allow(clippy::result_large_err)]
    fn constructor_type(
        &mut self,
        state: &State,
        id: &LongId,
        span: Span,
    ) -> Result<Option<Type>, ElaborationError> {
        let found = state
            .lookup_static_value(id)
            .map_err(|name| ElaborationError::UnboundModule { name, span })?;
        match found {
            Some((ty, IdentifierStatus::ValueConstructor | IdentifierStatus::ExceptionConstructor)) => {
                let ty = ty.clone();
                Ok(Some(self.instantiate(&ty)))
            }
            _ => Ok(None),
        }
    }
}

#[allow(clippy::result_large_err)]
fn bind(out: &mut PatternBindings, name: &str, ty: Type, span: Span) -> Result<(), ElaborationError> {
    if !allows_rebind(name) {
        return Err(ElaborationError::IllegalRebind { name: name.to_string(), span });
    }
    if out.iter().any(|(n, _)| n == name) {
        return Err(ElaborationError::IllegalUse {
            name: name.to_string(),
            reason: "is bound twice in the same pattern.".into(),
            span,
        });
    }
    out.push((name.to_string(), ty));
    Ok(())
}
