//! Declarations: value bindings (with the recursive fixpoint), types,
//! datatypes, exceptions and the structural forms.

use super::{ElabContext, Elaborator};
use crate::error::{ElaborationError, WarningKind};
use crate::exhaustive::{Checker, MatchRole};
use crate::state::{allows_rebind, DatatypeInfo, IdentifierStatus, InfixStatus, State, TypeInfo};
use smli_ast::ast::{
    Decl, DeclKind, ExceptionBinding, Expr, ExprKind, LongId, Match, Pattern, PatternKind,
    DatatypeBinding, StructureExpr, TypeBinding, TypeExpr, ValueBinding,
};
use smli_ast::span::Span;
use smli_types::display::normalize;
use smli_types::scheme::generalize;
use smli_types::{Equality, EqualityOracle, TyVar, Type};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// A name bound by a value declaration, waiting for generalization.
struct Pending {
    name: String,
    ty: Type,
    safe: bool,
    span: Span,
}

impl Elaborator<'_> {
    /// Elaborates `decl` in `state` and returns the extended state. `top`
    /// is true outside of every `let`.
    #[allow(clippy::result_large_err)]
    pub(crate) fn decl(&mut self, state: &State, decl: &Decl, top: bool) -> Result<State, ElaborationError> {
        let span = decl.span;
        match &decl.kind {
            DeclKind::Value { tyvars, bindings } => self.value_decl(state, tyvars, bindings, top, span),
            DeclKind::Type(bindings) => self.type_decl(state, bindings, span),
            DeclKind::Datatype { bindings, with_types } => {
                self.datatype_decl(state, bindings, with_types, span)
            }
            DeclKind::DatatypeReplication { name, original } => {
                self.replicate_datatype(state, name, original, span)
            }
            DeclKind::Exception(bindings) => self.exception_decl(state, bindings, span),
            DeclKind::Local { decl, body } => {
                let hidden = self.decl(state, decl, top)?;
                let visible = self.decl(&hidden, body, top)?;
                Ok(state.extend(visible.delta_since(&hidden)))
            }
            DeclKind::Open(paths) => {
                let mut result = state.nested();
                for path in paths {
                    let basis = resolve_structure(state, path, span)?;
                    for (name, (ty, status)) in &basis.values {
                        match basis.exceptions.get(name) {
                            Some(identity) if *status == IdentifierStatus::ExceptionConstructor => {
                                result.set_static_exception(name, ty.clone(), *identity)
                            }
                            _ => result.set_static_value(name, ty.clone(), *status),
                        }
                    }
                    for (name, info) in &basis.types {
                        result.set_static_type(name, info.clone());
                    }
                    for (name, inner) in &basis.structures {
                        result.set_static_structure(name, inner.clone());
                    }
                }
                Ok(result)
            }
            DeclKind::Sequence(decls) => {
                let mut cur = state.clone();
                for d in decls {
                    cur = self.decl(&cur, d, top)?;
                }
                Ok(cur)
            }
            DeclKind::Infix { precedence, names } => {
                Ok(set_fixity(state, names, InfixStatus { infix: true, precedence: *precedence, right_associative: false }))
            }
            DeclKind::Infixr { precedence, names } => {
                Ok(set_fixity(state, names, InfixStatus { infix: true, precedence: *precedence, right_associative: true }))
            }
            DeclKind::Nonfix(names) => {
                Ok(set_fixity(state, names, InfixStatus { infix: false, precedence: 0, right_associative: false }))
            }
            DeclKind::Structure(bindings) => {
                let mut result = state.nested();
                for b in bindings {
                    let basis = match &b.body {
                        StructureExpr::Struct(body) => {
                            let inner = self.decl(state, body, top)?;
                            Rc::new(inner.delta_since(state).statics)
                        }
                        StructureExpr::Path(path) => Rc::new(resolve_structure(state, path, span)?.clone()),
                    };
                    result.set_static_structure(&b.name, basis);
                }
                Ok(result)
            }
            DeclKind::Empty => Ok(state.clone()),
        }
    }

    #[allow(clippy::result_large_err)]
    fn value_decl(
        &mut self,
        state: &State,
        explicit: &[String],
        bindings: &[ValueBinding],
        top: bool,
        span: Span,
    ) -> Result<State, ElaborationError> {
        let mut names: Vec<String> = explicit.to_vec();
        for b in bindings {
            scan_pattern(&b.pattern, &mut names);
            scan_expr(&b.expr, &mut names);
        }
        let scope = self.cx.names.fresh_scope();
        let frame: HashMap<String, TyVar> = names
            .into_iter()
            .filter(|n| explicit.contains(n) || self.lookup_tyvar(n).is_none())
            .map(|n| (n.clone(), TyVar::rigid(n, scope)))
            .collect();
        self.tyvars.push(frame);
        let result = self.value_bindings(state, bindings, top, span);
        self.tyvars.pop();
        result
    }

    #[allow(clippy::result_large_err)]
    fn value_bindings(
        &mut self,
        state: &State,
        bindings: &[ValueBinding],
        top: bool,
        span: Span,
    ) -> Result<State, ElaborationError> {
        let mut pending: Vec<Pending> = Vec::new();
        for b in bindings.iter().filter(|b| !b.recursive) {
            let t = self.expr(state, &b.expr)?;
            let (bound, pt) = self.pattern(state, &b.pattern)?;
            self.unify(&pt, &t, b.pattern.span)?;
            if self.options.exhaustiveness_warnings {
                let found = Checker::new(state, &self.cx.registry).check(
                    &[&b.pattern],
                    MatchRole::Binding,
                    b.pattern.span,
                );
                for w in found {
                    self.warn(w.kind, w.message, w.span);
                }
            }
            let safe = self.is_safe(state, &b.expr);
            pending.extend(bound.into_iter().map(|(name, ty)| Pending { name, ty, safe, span: b.pattern.span }));
        }
        let group: Vec<&ValueBinding> = bindings.iter().filter(|b| b.recursive).collect();
        if !group.is_empty() {
            for (name, ty) in self.rec_group(state, &group, span)? {
                pending.push(Pending { name, ty, safe: true, span });
            }
        }

        let env = self.environment_vars(state);
        let mut result = state.nested();
        for p in pending {
            let ty = if p.safe {
                generalize(&p.ty, &env, &self.cx.subst)
            } else if top {
                self.free_at_top_level(&p.ty, &env)
            } else {
                self.cx.subst.apply(&p.ty)
            };
            if top {
                if let Some(row) = ty.open_rows().into_iter().next() {
                    tracing::debug!(%row, "unresolved row");
                    return Err(ElaborationError::UnresolvedRecord {
                        ty: normalize(&ty).to_string(),
                        span: p.span,
                    });
                }
            }
            tracing::debug!(name = %p.name, ty = %normalize(&ty), "bound");
            result.set_static_value(&p.name, ty, IdentifierStatus::ValueVariable);
        }
        Ok(result)
    }

    /// Renames the variables of an ungeneralizable top-level binding to
    /// free names so later declarations may still instantiate them.
    fn free_at_top_level(&mut self, ty: &Type, env: &HashSet<TyVar>) -> Type {
        let resolved = self.cx.subst.apply(ty);
        for v in resolved.ftv() {
            let subst = &self.cx.subst;
            if env.contains(&v) || subst.is_free(&v) || v.is_free_name() || subst.domain(&v).is_some() {
                continue;
            }
            let free = self.cx.names.fresh_free(v.admits_equality());
            self.cx.subst.bind(v, Type::Var(free.clone()));
            self.cx.subst.mark_free(free);
        }
        self.cx.subst.apply(&resolved)
    }

    /// Elaborates a `val rec` group. Each pass re-elaborates every body with
    /// the names bound to the types of the previous pass; the group is done
    /// when a pass reproduces its assumptions.
    #[allow(clippy::result_large_err)]
    fn rec_group(
        &mut self,
        state: &State,
        group: &[&ValueBinding],
        span: Span,
    ) -> Result<Vec<(String, Type)>, ElaborationError> {
        let mut heads = Vec::with_capacity(group.len());
        for b in group {
            heads.push(rec_head(b)?);
        }
        self.rec_depth += 1;
        let result = self.rec_fixpoint(state, group, &heads, span);
        self.rec_depth -= 1;
        result
    }

    #[allow(clippy::result_large_err)]
    fn rec_fixpoint(
        &mut self,
        state: &State,
        group: &[&ValueBinding],
        heads: &[(&str, Option<&TypeExpr>)],
        span: Span,
    ) -> Result<Vec<(String, Type)>, ElaborationError> {
        let names = || heads.iter().map(|(n, _)| *n).collect::<Vec<_>>().join(", ");
        let skip = self.rec_depth > self.options.circularity_check_depth;
        if skip {
            self.warn(
                WarningKind::CircularityCheckSkipped,
                format!("Skipped the circularity check for \"{}\".", names()),
                span,
            );
        }
        let passes = if skip { 1 } else { self.options.max_refinement_passes + 1 };
        let snapshot: ElabContext = ElabContext {
            names: Default::default(),
            ..self.cx.clone()
        };
        let warning_mark = self.warnings.len();
        let mut assumed: Vec<Type> = (0..heads.len())
            .map(|_| Type::fun(self.fresh(), self.fresh()))
            .collect();
        let mut carried: Vec<(TyVar, Vec<Type>)> = Vec::new();
        for pass in 0..passes {
            if pass > 0 {
                self.restore(&snapshot);
                for (v, d) in &carried {
                    self.cx.subst.set_domain(v.clone(), d.clone());
                }
                self.warnings.truncate(warning_mark);
            }
            tracing::debug!(pass, names = %names(), "recursive binding pass");
            let mut inner = state.nested();
            for ((name, _), ty) in heads.iter().zip(&assumed) {
                inner.set_static_value(name, ty.clone(), IdentifierStatus::ValueVariable);
            }
            let mut found = Vec::with_capacity(heads.len());
            for ((b, (_, annotation)), ty) in group.iter().zip(heads).zip(&assumed) {
                let mut t = self.expr(&inner, &b.expr)?;
                if let Some(te) = annotation {
                    let annotated = self.convert(state, te, None, b.pattern.span)?;
                    t = self.unify(&t, &annotated, b.pattern.span)?;
                }
                self.unify(ty, &t, b.expr.span)?;
                found.push(t);
            }
            let found: Vec<Type> = found.iter().map(|t| self.cx.subst.apply(t)).collect();
            if skip {
                return Ok(heads.iter().map(|(n, _)| n.to_string()).zip(found).collect());
            }
            let settled = normalize(&Type::tuple(assumed.clone())) == normalize(&Type::tuple(found.clone()));
            if settled {
                return Ok(heads.iter().map(|(n, _)| n.to_string()).zip(found).collect());
            }
            carried = found
                .iter()
                .flat_map(Type::ftv)
                .filter_map(|v| self.cx.subst.domain(&v).map(|d| (v.clone(), d.to_vec())))
                .collect();
            assumed = found;
        }
        Err(ElaborationError::Circularity { names: names(), span })
    }

    /// Rolls the context back to `snapshot`, keeping the name counters.
    fn restore(&mut self, snapshot: &ElabContext) {
        self.cx.subst = snapshot.subst.clone();
        self.cx.generations = snapshot.generations.clone();
        self.cx.registry = snapshot.registry.clone();
        self.cx.instantiated = snapshot.instantiated.clone();
    }

    #[allow(clippy::result_large_err)]
    fn type_decl(&mut self, state: &State, bindings: &[TypeBinding], span: Span) -> Result<State, ElaborationError> {
        let mut result = state.nested();
        for b in bindings {
            let (params, map) = parameters(&b.tyvars);
            let body = self.convert(state, &b.ty, Some(&map), span)?;
            result.set_static_type(&b.name, TypeInfo { params, body, constructors: Vec::new() });
        }
        Ok(result)
    }

    #[allow(clippy::result_large_err)]
    fn datatype_decl(
        &mut self,
        state: &State,
        bindings: &[DatatypeBinding],
        with_types: &[TypeBinding],
        span: Span,
    ) -> Result<State, ElaborationError> {
        let mut result = state.nested();
        let mut declared: Vec<(Type, HashMap<String, TyVar>, Vec<TyVar>)> = Vec::new();
        for b in bindings {
            let generation = self.cx.generations.next(&b.name);
            let (params, map) = parameters(&b.tyvars);
            let body = Type::custom(&b.name, params.iter().cloned().map(Type::Var).collect(), generation);
            result.set_static_type(
                &b.name,
                TypeInfo {
                    params: params.clone(),
                    body: body.clone(),
                    constructors: b.constructors.iter().map(|c| c.name.clone()).collect(),
                },
            );
            self.cx.registry.insert(
                &b.name,
                generation,
                DatatypeInfo {
                    constructors: b.constructors.iter().map(|c| (c.name.clone(), c.arg.is_some())).collect(),
                    equality: Equality::IfArguments,
                },
            );
            declared.push((body, map, params));
        }
        for tb in with_types {
            let (params, map) = parameters(&tb.tyvars);
            let body = self.convert(&result, &tb.ty, Some(&map), span)?;
            result.set_static_type(&tb.name, TypeInfo { params, body, constructors: Vec::new() });
        }

        let mut arguments: Vec<Vec<Type>> = Vec::new();
        for (b, (body, map, params)) in bindings.iter().zip(&declared) {
            let mut args = Vec::new();
            for c in &b.constructors {
                if !allows_rebind(&c.name) {
                    return Err(ElaborationError::IllegalRebind { name: c.name.clone(), span });
                }
                let ty = match &c.arg {
                    Some(te) => {
                        let arg = self.convert(&result, te, Some(map), span)?;
                        args.push(arg.clone());
                        Type::fun(arg, body.clone())
                    }
                    None => body.clone(),
                };
                let scheme = Type::quantify(params.iter().map(|p| (p.clone(), Vec::new())).collect(), ty);
                result.set_static_value(&c.name, scheme, IdentifierStatus::ValueConstructor);
            }
            arguments.push(args);
        }
        self.settle_equality(&declared, &arguments);
        Ok(result)
    }

    /// Equality of a datatype group: assume every member admits equality and
    /// drop members whose constructor arguments do not, until nothing changes.
    fn settle_equality(&mut self, declared: &[(Type, HashMap<String, TyVar>, Vec<TyVar>)], arguments: &[Vec<Type>]) {
        let keys: Vec<(String, u32)> = declared
            .iter()
            .filter_map(|(body, _, _)| match body {
                Type::Custom(c) => Some((c.name.clone(), c.generation)),
                _ => None,
            })
            .collect();
        let mut admits: HashMap<(String, u32), bool> = keys.iter().map(|k| (k.clone(), true)).collect();
        loop {
            let mut changed = false;
            for (key, args) in keys.iter().zip(arguments) {
                if admits[key] && !args.iter().all(|t| group_admits_equality(t, &admits, &self.cx.registry)) {
                    admits.insert(key.clone(), false);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        for (name, generation) in keys {
            let eq = if admits[&(name.clone(), generation)] { Equality::IfArguments } else { Equality::Never };
            self.cx.registry.set_equality(&name, generation, eq);
        }
    }

    #[allow(clippy::result_large_err)]
    fn replicate_datatype(
        &mut self,
        state: &State,
        name: &str,
        original: &LongId,
        span: Span,
    ) -> Result<State, ElaborationError> {
        let info = state
            .lookup_static_type(original)
            .map_err(|m| ElaborationError::UnboundModule { name: m, span })?
            .ok_or_else(|| ElaborationError::UnboundType { name: original.to_string(), span })?
            .clone();
        let mut result = state.nested();
        for ctor in &info.constructors {
            let id = LongId { qualifiers: original.qualifiers.clone(), name: ctor.clone() };
            let (ty, status) = state
                .lookup_static_value(&id)
                .map_err(|m| ElaborationError::UnboundModule { name: m, span })?
                .ok_or_else(|| ElaborationError::UnboundIdentifier { name: id.to_string(), span })?
                .clone();
            result.set_static_value(ctor, ty, status);
        }
        result.set_static_type(name, info);
        Ok(result)
    }

    #[allow(clippy::result_large_err)]
    fn exception_decl(
        &mut self,
        state: &State,
        bindings: &[ExceptionBinding],
        span: Span,
    ) -> Result<State, ElaborationError> {
        let mut result = state.nested();
        for b in bindings {
            match b {
                ExceptionBinding::Direct { name, arg } => {
                    if !allows_rebind(name) {
                        return Err(ElaborationError::IllegalRebind { name: name.clone(), span });
                    }
                    let ty = match arg {
                        Some(te) => Type::fun(self.convert(state, te, None, span)?, Type::exn()),
                        None => Type::exn(),
                    };
                    let identity = self.cx.fresh_exception();
                    result.set_static_exception(name, ty, identity);
                }
                ExceptionBinding::Alias { name, original } => {
                    if !allows_rebind(name) {
                        return Err(ElaborationError::IllegalRebind { name: name.clone(), span });
                    }
                    let (ty, status) = state
                        .lookup_static_value(original)
                        .map_err(|m| ElaborationError::UnboundModule { name: m, span })?
                        .ok_or_else(|| ElaborationError::UnboundIdentifier { name: original.to_string(), span })?
                        .clone();
                    let identity = match state.lookup_static_exception(original) {
                        Ok(Some(identity)) if status == IdentifierStatus::ExceptionConstructor => identity,
                        _ => {
                            return Err(ElaborationError::IllegalUse {
                                name: original.to_string(),
                                reason: "is not an exception.".into(),
                                span,
                            })
                        }
                    };
                    result.set_static_exception(name, ty, identity);
                }
            }
        }
        Ok(result)
    }
}

/// Name and annotation of a recursive binding; anything but a (possibly
/// annotated) variable bound to a `fn` is rejected.
#[allow(clippy::result_large_err)]
fn rec_head(b: &ValueBinding) -> Result<(&str, Option<&TypeExpr>), ElaborationError> {
    let span = b.pattern.span;
    let head = match &b.pattern.kind {
        PatternKind::Identifier(id) if id.is_simple() => (id.name.as_str(), None),
        PatternKind::Typed { pattern, ty } => match &pattern.kind {
            PatternKind::Identifier(id) if id.is_simple() => (id.name.as_str(), Some(ty)),
            _ => return Err(not_a_variable(&b.pattern)),
        },
        _ => return Err(not_a_variable(&b.pattern)),
    };
    if !allows_rebind(head.0) {
        return Err(ElaborationError::IllegalRebind { name: head.0.to_string(), span });
    }
    if !is_lambda(&b.expr) {
        return Err(ElaborationError::IllegalUse {
            name: head.0.to_string(),
            reason: "must be bound to a function in a recursive binding.".into(),
            span: b.expr.span,
        });
    }
    Ok(head)
}

fn not_a_variable(p: &Pattern) -> ElaborationError {
    ElaborationError::IllegalUse {
        name: p.to_string(),
        reason: "is not a variable; recursive bindings bind plain names.".into(),
        span: p.span,
    }
}

fn is_lambda(e: &Expr) -> bool {
    match &e.kind {
        ExprKind::Lambda(_) => true,
        ExprKind::Typed { expr, .. } => is_lambda(expr),
        _ => false,
    }
}

fn parameters(tyvars: &[String]) -> (Vec<TyVar>, HashMap<String, TyVar>) {
    let params: Vec<TyVar> = tyvars.iter().map(TyVar::new).collect();
    let map = tyvars.iter().cloned().zip(params.iter().cloned()).collect();
    (params, map)
}

fn set_fixity(state: &State, names: &[String], status: InfixStatus) -> State {
    let mut result = state.nested();
    for name in names {
        result.set_infix_status(name, status);
    }
    result
}

#[allow(clippy::result_large_err)]
fn resolve_structure<'s>(
    state: &'s State,
    path: &LongId,
    span: Span,
) -> Result<&'s crate::state::StaticBasis, ElaborationError> {
    let full: Vec<String> = path.qualifiers.iter().cloned().chain(std::iter::once(path.name.clone())).collect();
    state
        .get_and_resolve_static_structure(&full)
        .map_err(|name| ElaborationError::UnboundModule { name, span })?
        .ok_or_else(|| ElaborationError::UnboundModule { name: path.to_string(), span })
}

fn group_admits_equality(
    t: &Type,
    group: &HashMap<(String, u32), bool>,
    registry: &crate::state::DatatypeRegistry,
) -> bool {
    match t {
        Type::Var(_) => true,
        Type::Function(..) | Type::Quantified { .. } => false,
        Type::Record(r) => r.fields.values().all(|f| group_admits_equality(f, group, registry)),
        Type::Custom(c) => {
            let own = match group.get(&(c.name.clone(), c.generation)) {
                Some(flag) => *flag,
                None => match registry.equality(c) {
                    Equality::Never => false,
                    Equality::Always => return true,
                    Equality::IfArguments => true,
                },
            };
            own && c.args.iter().all(|a| group_admits_equality(a, group, registry))
        }
    }
}

/// Collects the type variables mentioned by annotations.
fn scan_type(t: &TypeExpr, out: &mut Vec<String>) {
    match t {
        TypeExpr::Var(v) => {
            if !out.contains(v) {
                out.push(v.clone());
            }
        }
        TypeExpr::Record(fields) => fields.iter().for_each(|(_, t)| scan_type(t, out)),
        TypeExpr::Function(a, b) => {
            scan_type(a, out);
            scan_type(b, out);
        }
        TypeExpr::Constructor { args, .. } => args.iter().for_each(|a| scan_type(a, out)),
    }
}

fn scan_pattern(p: &Pattern, out: &mut Vec<String>) {
    match &p.kind {
        PatternKind::Wildcard | PatternKind::Constant(_) | PatternKind::Identifier(_) => {}
        PatternKind::Record { fields, .. } => fields.iter().for_each(|(_, p)| scan_pattern(p, out)),
        PatternKind::Constructor { arg, .. } => scan_pattern(arg, out),
        PatternKind::Layered { ty, pattern, .. } => {
            if let Some(t) = ty {
                scan_type(t, out);
            }
            scan_pattern(pattern, out);
        }
        PatternKind::Typed { pattern, ty } => {
            scan_pattern(pattern, out);
            scan_type(ty, out);
        }
    }
}

fn scan_match(m: &Match, out: &mut Vec<String>) {
    for rule in &m.rules {
        scan_pattern(&rule.pattern, out);
        scan_expr(&rule.body, out);
    }
}

fn scan_expr(e: &Expr, out: &mut Vec<String>) {
    match &e.kind {
        ExprKind::Constant(_) | ExprKind::Identifier(_) => {}
        ExprKind::Record(fields) => fields.iter().for_each(|(_, f)| scan_expr(f, out)),
        ExprKind::Let { decl, body } => {
            scan_decl(decl, out);
            scan_expr(body, out);
        }
        ExprKind::Typed { expr, ty } => {
            scan_expr(expr, out);
            scan_type(ty, out);
        }
        ExprKind::Apply { func, arg } => {
            scan_expr(func, out);
            scan_expr(arg, out);
        }
        ExprKind::Handle { expr, handler } => {
            scan_expr(expr, out);
            scan_match(handler, out);
        }
        ExprKind::Raise(inner) => scan_expr(inner, out),
        ExprKind::Lambda(m) => scan_match(m, out),
    }
}

fn scan_decl(d: &Decl, out: &mut Vec<String>) {
    match &d.kind {
        DeclKind::Value { bindings, .. } => {
            for b in bindings {
                scan_pattern(&b.pattern, out);
                scan_expr(&b.expr, out);
            }
        }
        DeclKind::Exception(bindings) => {
            for b in bindings {
                if let ExceptionBinding::Direct { arg: Some(t), .. } = b {
                    scan_type(t, out);
                }
            }
        }
        DeclKind::Local { decl, body } => {
            scan_decl(decl, out);
            scan_decl(body, out);
        }
        DeclKind::Sequence(decls) => decls.iter().for_each(|d| scan_decl(d, out)),
        _ => {}
    }
}
