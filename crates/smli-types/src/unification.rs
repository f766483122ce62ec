//! Unification (`merge`) over the substitution.
//!
//! Besides the usual structural cases this handles:
//! - overloaded variables, which may only be bound to a member of their domain
//! - equality variables (`''a`), which force equality on whatever they meet
//! - rigid variables from annotations, which only unify with themselves
//! - open records, via row variables
//! - the top-level "free" mark, which spreads to every variable a free one meets

use crate::display::{normalize, normalize_pair, pp_type};
use crate::error::TypeClash;
use crate::scheme::{NameGen, Subst};
use crate::types::{CustomType, RecordType, TyVar, Type};
use std::collections::BTreeMap;

/// Whether values of a custom type can be compared with `=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Equality {
    Never,
    Always,
    /// Admits equality when every type argument does.
    IfArguments,
}

/// Answers the equality attribute of named types; the static environment
/// implements it for user datatypes.
pub trait EqualityOracle {
    fn equality(&self, ty: &CustomType) -> Equality;
}

/// Equality attributes of the builtin types only.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinEquality;

impl EqualityOracle for BuiltinEquality {
    fn equality(&self, ty: &CustomType) -> Equality {
        match (ty.name.as_str(), ty.generation) {
            ("ref", 0) => Equality::Always,
            ("real", 0) | ("exn", 0) => Equality::Never,
            _ => Equality::IfArguments,
        }
    }
}

pub struct Unifier<'a> {
    pub subst: &'a mut Subst,
    pub names: &'a mut NameGen,
    pub oracle: &'a dyn EqualityOracle,
}

impl<'a> Unifier<'a> {
    pub fn new(subst: &'a mut Subst, names: &'a mut NameGen, oracle: &'a dyn EqualityOracle) -> Self {
        Self { subst, names, oracle }
    }

    /// Unifies `a` and `b` and returns their common, fully resolved type.
    pub fn merge(&mut self, a: &Type, b: &Type) -> Result<Type, TypeClash> {
        tracing::trace!(left = %a, right = %b, "merge");
        self.unify(a, b)?;
        Ok(self.subst.apply(a))
    }

    fn mismatch(&self, a: &Type, b: &Type) -> TypeClash {
        let (left, right) = normalize_pair(&self.subst.apply(a), &self.subst.apply(b));
        TypeClash::Mismatch { left: left.to_string(), right: right.to_string() }
    }

    fn members(&self, a: &Type, b: &Type, label: &str) -> TypeClash {
        let (left, right) = normalize_pair(&self.subst.apply(a), &self.subst.apply(b));
        TypeClash::Members { label: label.to_string(), left: left.to_string(), right: right.to_string() }
    }

    fn rigid(&self, v: &TyVar, t: &Type) -> TypeClash {
        TypeClash::Rigid { var: v.name.clone(), ty: normalize(&self.subst.apply(t)).to_string() }
    }

    fn unify(&mut self, a: &Type, b: &Type) -> Result<(), TypeClash> {
        let a = self.subst.shallow(a);
        let b = self.subst.shallow(b);
        match (&a, &b) {
            (Type::Var(x), Type::Var(y)) if x == y => Ok(()),
            (Type::Var(x), Type::Var(y)) => match (x.is_rigid(), y.is_rigid()) {
                (false, false) => self.unify_vars(x, y),
                (false, true) => self.bind_to_rigid(x, y),
                (true, false) => self.bind_to_rigid(y, x),
                (true, true) => Err(self.rigid(x, &b)),
            },
            (Type::Var(x), t) | (t, Type::Var(x)) => {
                if x.is_rigid() {
                    return Err(self.rigid(x, t));
                }
                self.bind_var(x, t)
            }
            (Type::Custom(c1), Type::Custom(c2)) => {
                if !c1.same_constructor(c2) || c1.args.len() != c2.args.len() {
                    return Err(self.mismatch(&a, &b));
                }
                for (x, y) in c1.args.iter().zip(&c2.args) {
                    self.unify(x, y)?;
                }
                Ok(())
            }
            (Type::Function(a1, b1), Type::Function(a2, b2)) => {
                self.unify(a1, a2)?;
                self.unify(b1, b2)
            }
            (Type::Record(r1), Type::Record(r2)) => self.unify_records(&a, r1, &b, r2),
            (Type::Quantified { .. }, _) | (_, Type::Quantified { .. }) => Err(TypeClash::Internal(
                format!("quantified type reached unification: {a} vs. {b}"),
            )),
            _ => Err(self.mismatch(&a, &b)),
        }
    }

    fn unify_vars(&mut self, x: &TyVar, y: &TyVar) -> Result<(), TypeClash> {
        let domain = match (self.subst.domain(x), self.subst.domain(y)) {
            (Some(dx), Some(dy)) => {
                let common: Vec<Type> = dx.iter().filter(|t| dy.contains(t)).cloned().collect();
                if common.is_empty() {
                    return Err(TypeClash::Domain {
                        var: x.name.clone(),
                        ty: pp_domain_list(dy),
                        domain: pp_domain_list(dx),
                    });
                }
                Some(common)
            }
            (Some(d), None) | (None, Some(d)) => Some(d.to_vec()),
            (None, None) => None,
        };
        let free = self.subst.is_free(x) || self.subst.is_free(y);
        // Keep the name that carries the most information: free over
        // inference variables, equality over plain ones.
        let rank = |v: &TyVar, s: &Subst| (s.is_free(v) || v.is_free_name(), v.admits_equality());
        let (from, to) = if rank(x, &*self.subst) > rank(y, &*self.subst) { (y, x) } else { (x, y) };
        let (from, to) = (from.clone(), to.clone());
        let mut domain = domain;
        if to.admits_equality() || from.admits_equality() {
            if let Some(d) = domain.take() {
                domain = Some(self.equality_domain(&to, d)?);
            }
        }
        let to = if from.admits_equality() && !to.admits_equality() {
            // `to` is free but not equality: promote it.
            let promoted = self.names.fresh_equality();
            self.subst.bind(to.clone(), Type::Var(promoted.clone()));
            promoted
        } else {
            to
        };
        self.subst.bind(from, Type::Var(to.clone()));
        if let Some(d) = domain {
            self.subst.set_domain(to.clone(), d);
        }
        if free {
            self.subst.mark_free(to);
        }
        Ok(())
    }

    fn equality_domain(&self, v: &TyVar, domain: Vec<Type>) -> Result<Vec<Type>, TypeClash> {
        let eq: Vec<Type> = domain.iter().filter(|t| self.admits_equality(t)).cloned().collect();
        if eq.is_empty() {
            return Err(TypeClash::Equality { ty: format!("{v} ∈ {{{}}}", pp_domain_list(&domain)) });
        }
        Ok(eq)
    }

    fn bind_to_rigid(&mut self, x: &TyVar, rigid: &TyVar) -> Result<(), TypeClash> {
        let target = Type::Var(rigid.clone());
        if self.subst.domain(x).is_some() {
            return Err(self.rigid(rigid, &Type::Var(x.clone())));
        }
        if x.admits_equality() && !rigid.admits_equality() {
            return Err(TypeClash::Equality { ty: rigid.name.clone() });
        }
        self.subst.bind(x.clone(), target);
        Ok(())
    }

    fn bind_var(&mut self, x: &TyVar, t: &Type) -> Result<(), TypeClash> {
        let t = &self.subst.apply(t);
        if t.mentions(x) {
            let (var, ty) = normalize_pair(&Type::Var(x.clone()), t);
            return Err(TypeClash::Circularity { var: var.to_string(), ty: ty.to_string() });
        }
        if let Some(domain) = self.subst.domain(x) {
            if !domain.contains(t) {
                return Err(TypeClash::Domain {
                    var: x.name.clone(),
                    ty: normalize(&self.subst.apply(t)).to_string(),
                    domain: pp_domain_list(domain),
                });
            }
        }
        if x.admits_equality() {
            self.make_equality(t)?;
        }
        if self.subst.is_free(x) {
            for v in t.ftv() {
                self.subst.mark_free(v);
            }
        }
        tracing::trace!(var = %x, ty = %t, "bind");
        self.subst.bind(x.clone(), t.clone());
        Ok(())
    }

    /// Whether a resolved type admits equality, without changing anything.
    pub fn admits_equality(&self, t: &Type) -> bool {
        match self.subst.shallow(t) {
            Type::Var(v) => v.admits_equality() || !v.is_rigid(),
            Type::Function(..) | Type::Quantified { .. } => false,
            Type::Custom(c) => match self.oracle.equality(&c) {
                Equality::Never => false,
                Equality::Always => true,
                Equality::IfArguments => c.args.iter().all(|a| self.admits_equality(a)),
            },
            Type::Record(r) => r.fields.values().all(|f| self.admits_equality(f)),
        }
    }

    /// Restricts `t` to equality types, turning its flexible variables into
    /// equality variables.
    pub fn make_equality(&mut self, t: &Type) -> Result<(), TypeClash> {
        let t = self.subst.shallow(t);
        match &t {
            Type::Var(v) if v.admits_equality() => Ok(()),
            Type::Var(v) if v.is_rigid() => Err(TypeClash::Equality { ty: v.name.clone() }),
            Type::Var(v) => {
                let eq = self.names.fresh_equality();
                if let Some(d) = self.subst.domain(v).map(<[Type]>::to_vec) {
                    let d = self.equality_domain(v, d)?;
                    self.subst.set_domain(eq.clone(), d);
                }
                if self.subst.is_free(v) {
                    self.subst.mark_free(eq.clone());
                }
                self.subst.bind(v.clone(), Type::Var(eq));
                Ok(())
            }
            Type::Function(..) => {
                Err(TypeClash::Equality { ty: normalize(&self.subst.apply(&t)).to_string() })
            }
            Type::Custom(c) => match self.oracle.equality(c) {
                Equality::Always => Ok(()),
                Equality::Never => {
                    Err(TypeClash::Equality { ty: normalize(&self.subst.apply(&t)).to_string() })
                }
                Equality::IfArguments => {
                    for a in &c.args {
                        self.make_equality(a)?;
                    }
                    Ok(())
                }
            },
            Type::Record(r) => {
                for f in r.fields.values() {
                    self.make_equality(f)?;
                }
                Ok(())
            }
            Type::Quantified { .. } => {
                Err(TypeClash::Internal(format!("equality requested on quantified type {t}")))
            }
        }
    }

    fn unify_records(
        &mut self,
        a: &Type,
        r1: &RecordType,
        b: &Type,
        r2: &RecordType,
    ) -> Result<(), TypeClash> {
        for (label, t1) in &r1.fields {
            if let Some(t2) = r2.fields.get(label) {
                self.unify(t1, t2)?;
            }
        }
        let only1: BTreeMap<String, Type> = extra_fields(r1, r2);
        let only2: BTreeMap<String, Type> = extra_fields(r2, r1);
        match (&r1.row, &r2.row) {
            (None, None) => match only1.keys().chain(only2.keys()).next() {
                Some(label) => Err(self.members(a, b, label)),
                None => Ok(()),
            },
            (None, Some(p)) => {
                if let Some(label) = only2.keys().next() {
                    return Err(self.members(a, b, label));
                }
                self.bind_row(p, only1, None)
            }
            (Some(p), None) => {
                if let Some(label) = only1.keys().next() {
                    return Err(self.members(a, b, label));
                }
                self.bind_row(p, only2, None)
            }
            (Some(p), Some(q)) if p == q => match only1.keys().chain(only2.keys()).next() {
                Some(label) => Err(self.members(a, b, label)),
                None => Ok(()),
            },
            (Some(p), Some(q)) => {
                let rest = self.names.fresh_row();
                self.bind_row(p, only2, Some(rest.clone()))?;
                self.bind_row(q, only1, Some(rest))
            }
        }
    }

    fn bind_row(
        &mut self,
        row: &TyVar,
        fields: BTreeMap<String, Type>,
        rest: Option<TyVar>,
    ) -> Result<(), TypeClash> {
        let ext = Type::Record(RecordType { fields, row: rest });
        if ext.mentions(row) {
            let (var, ty) = normalize_pair(&Type::Var(row.clone()), &self.subst.apply(&ext));
            return Err(TypeClash::Circularity { var: var.to_string(), ty: ty.to_string() });
        }
        self.subst.bind(row.clone(), ext);
        Ok(())
    }
}

fn extra_fields(r: &RecordType, other: &RecordType) -> BTreeMap<String, Type> {
    r.fields
        .iter()
        .filter(|(l, _)| !other.fields.contains_key(*l))
        .map(|(l, t)| (l.clone(), t.clone()))
        .collect()
}

fn pp_domain_list(d: &[Type]) -> String {
    d.iter().map(pp_type).collect::<Vec<_>>().join(", ")
}
