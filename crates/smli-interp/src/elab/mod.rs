//! Static elaboration.
//!
//! This module implements Hindley-Milner inference over the core language:
//! - let-polymorphism with the value restriction
//! - recursive binding groups, refined to a fixpoint over a bounded number of passes
//! - generative datatypes and exceptions
//! - structures, `open`, `local` and qualified identifiers
//! - exhaustiveness and redundancy warnings for every match
//!
//! An `Elaborator` borrows the interpreter's `ElabContext` (substitution,
//! fresh names, static generations, datatype registry) for one top-level
//! declaration and hands back the extended state plus the warnings.

pub(crate) mod decl;
pub(crate) mod expr;
pub(crate) mod pattern;

use crate::error::{ElaborationError, Warning, WarningKind};
use crate::options::InterpreterOptions;
use crate::state::{DatatypeRegistry, Delta, Generations, State};
use smli_ast::ast::{Decl, DeclKind, TypeExpr};
use smli_ast::span::Span;
use smli_types::display::normalize;
use smli_types::{NameGen, Subst, TyVar, Type, Unifier};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Inference state that outlives a single declaration.
#[derive(Debug, Clone, Default)]
pub struct ElabContext {
    pub subst: Subst,
    pub names: NameGen,
    /// Static generations of datatype names.
    pub generations: Generations,
    pub registry: DatatypeRegistry,
    /// Free top-level variables that have been instantiated; their bindings
    /// survive pruning because older types still mention them.
    pub instantiated: BTreeSet<TyVar>,
    next_exception: u32,
}

impl ElabContext {
    /// A new static exception identity.
    pub fn fresh_exception(&mut self) -> u32 {
        self.next_exception += 1;
        self.next_exception
    }
}

pub struct Elaborator<'a> {
    pub(crate) cx: &'a mut ElabContext,
    pub(crate) options: &'a InterpreterOptions,
    pub(crate) warnings: Vec<Warning>,
    /// Explicit type variable frames; lookup is from last to first.
    pub(crate) tyvars: Vec<HashMap<String, TyVar>>,
    pub(crate) rec_depth: usize,
    /// Everything below this state is closed; environment variables are
    /// only collected above it.
    floor: State,
}

impl<'a> Elaborator<'a> {
    pub fn new(cx: &'a mut ElabContext, options: &'a InterpreterOptions) -> Self {
        Self {
            cx,
            options,
            warnings: Vec::new(),
            tyvars: Vec::new(),
            rec_depth: 0,
            floor: State::new(),
        }
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }

    /// Elaborates a top-level declaration. Members of a top-level sequence
    /// are finished one by one: overloaded variables are defaulted, free
    /// variables re-checked and the substitution pruned after each.
    #[allow(clippy::result_large_err)]
    pub fn elaborate_top(&mut self, state: &State, decl: &Decl) -> Result<State, ElaborationError> {
        match &decl.kind {
            DeclKind::Sequence(members) => {
                let mut cur = state.clone();
                for member in members {
                    cur = self.elaborate_top(&cur, member)?;
                }
                Ok(cur)
            }
            _ => {
                tracing::debug!(decl = %decl, "elaborate");
                self.floor = state.clone();
                let free_before: Vec<TyVar> = self
                    .cx
                    .subst
                    .free_vars()
                    .filter(|v| !self.cx.subst.is_bound(v))
                    .cloned()
                    .collect();
                let after = self.decl(state, decl, true)?;
                self.finish_member(state, &after, free_before, decl.span)
            }
        }
    }

    #[allow(clippy::result_large_err)]
    fn finish_member(
        &mut self,
        base: &State,
        after: &State,
        free_before: Vec<TyVar>,
        span: Span,
    ) -> Result<State, ElaborationError> {
        for (v, domain) in self.cx.subst.pending_domains() {
            if let Some(first) = domain.first() {
                self.unify(&Type::Var(v), first, span)?;
            }
        }
        for v in free_before {
            if !self.cx.subst.is_bound(&v) {
                continue;
            }
            let ty = self.cx.subst.apply(&Type::Var(v.clone()));
            if matches!(ty, Type::Var(_)) {
                continue;
            }
            self.warn(
                WarningKind::FreeTypeVariable,
                format!("The free type variable \"{v}\" has been instantiated to \"{}\".", normalize(&ty)),
                span,
            );
            self.cx.instantiated.insert(v);
        }
        let delta = after.delta_since(base);
        let subst = &self.cx.subst;
        let statics = delta.statics.map_types(&|t| subst.apply(t));
        let state = base.extend(Delta { statics, ..delta });
        let ElabContext { subst, instantiated, .. } = &mut *self.cx;
        subst.retain_reachable(instantiated.iter());
        tracing::trace!(bindings = subst.len(), "substitution pruned");
        Ok(state)
    }

    pub(crate) fn warn(&mut self, kind: WarningKind, message: String, span: Span) {
        tracing::warn!(?kind, %message, "warning");
        self.warnings.push(Warning::new(kind, message, span));
    }

    #[allow(clippy::result_large_err)]
    pub(crate) fn unify(&mut self, a: &Type, b: &Type, span: Span) -> Result<Type, ElaborationError> {
        let ElabContext { subst, names, registry, .. } = &mut *self.cx;
        Unifier::new(subst, names, registry)
            .merge(a, b)
            .map_err(|e| ElaborationError::clash(e, span))
    }

    pub(crate) fn fresh(&mut self) -> Type {
        Type::Var(self.cx.names.fresh())
    }

    pub(crate) fn instantiate(&mut self, t: &Type) -> Type {
        let ElabContext { subst, names, .. } = &mut *self.cx;
        smli_types::scheme::instantiate(t, subst, names)
    }

    pub(crate) fn lookup_tyvar(&self, name: &str) -> Option<&TyVar> {
        self.tyvars.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Type variables the environment above the floor mentions, plus the
    /// explicit variables of every enclosing frame except the innermost.
    pub(crate) fn environment_vars(&self, state: &State) -> HashSet<TyVar> {
        let mut out: HashSet<TyVar> = state
            .static_types_above(&self.floor)
            .into_iter()
            .flat_map(|t| self.cx.subst.apply(t).ftv())
            .collect();
        if let Some((_, outer)) = self.tyvars.split_last() {
            out.extend(outer.iter().flat_map(|f| f.values().cloned()));
        }
        out
    }

    /// Converts a type annotation. `params` maps the parameters of a type or
    /// datatype declaration; otherwise variables come from the explicit frames.
    #[allow(clippy::result_large_err)]
    pub(crate) fn convert(
        &self,
        state: &State,
        te: &TypeExpr,
        params: Option<&HashMap<String, TyVar>>,
        span: Span,
    ) -> Result<Type, ElaborationError> {
        match te {
            TypeExpr::Var(name) => {
                let found = match params {
                    Some(p) => p.get(name),
                    None => self.lookup_tyvar(name),
                };
                found
                    .map(|v| Type::Var(v.clone()))
                    .ok_or_else(|| ElaborationError::UnguardedTypeVariable { name: name.clone(), span })
            }
            TypeExpr::Record(fields) => {
                let mut out = std::collections::BTreeMap::new();
                for (label, t) in fields {
                    let t = self.convert(state, t, params, span)?;
                    if out.insert(label.clone(), t).is_some() {
                        return Err(ElaborationError::DuplicateLabel { label: label.clone(), span });
                    }
                }
                Ok(Type::Record(smli_types::RecordType::complete(out)))
            }
            TypeExpr::Function(a, b) => Ok(Type::fun(
                self.convert(state, a, params, span)?,
                self.convert(state, b, params, span)?,
            )),
            TypeExpr::Constructor { name, args } => {
                let info = state
                    .lookup_static_type(name)
                    .map_err(|m| ElaborationError::UnboundModule { name: m, span })?
                    .ok_or_else(|| ElaborationError::UnboundType { name: name.to_string(), span })?;
                if info.arity() != args.len() {
                    return Err(ElaborationError::Arity {
                        name: name.to_string(),
                        expected: info.arity(),
                        got: args.len(),
                        span,
                    });
                }
                let args = args
                    .iter()
                    .map(|a| self.convert(state, a, params, span))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(info.apply(&args))
            }
        }
    }
}
