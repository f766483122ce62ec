//! Substitutions, fresh names, instantiation and generalization.
//!
//! - `Subst`: variable bindings plus per-variable side information (overload
//!   domains and the top-level "free" mark); every occurrence of a variable
//!   agrees on that information because it is keyed by the variable
//! - `NameGen`: fresh inference, equality, row and free variable names
//! - `instantiate`: peel quantifiers with fresh variables
//! - `generalize`: quantify what the environment does not mention

use crate::types::{CustomType, RecordType, TyVar, Type};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Fresh name generator. Counters only grow.
#[derive(Debug, Clone, Default)]
pub struct NameGen {
    next: u32,
    next_free: u32,
    next_scope: u32,
}

impl NameGen {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn fresh(&mut self) -> TyVar {
        TyVar::new(format!("'*t{}", self.bump()))
    }

    pub fn fresh_equality(&mut self) -> TyVar {
        TyVar::new(format!("''*t{}", self.bump()))
    }

    /// A fresh variable with the same equality attribute as `like`.
    pub fn fresh_like(&mut self, like: &TyVar) -> TyVar {
        if like.admits_equality() {
            self.fresh_equality()
        } else {
            self.fresh()
        }
    }

    pub fn fresh_row(&mut self) -> TyVar {
        TyVar::new(format!("'*r{}", self.bump()))
    }

    /// Names for variables left free at top level: `'~A`, `'~B`, ..., `'~Z`, `'~A1`, ...
    pub fn fresh_free(&mut self, equality: bool) -> TyVar {
        let n = self.next_free;
        self.next_free += 1;
        let letter = (b'A' + (n % 26) as u8) as char;
        let suffix = if n >= 26 { (n / 26).to_string() } else { String::new() };
        let quote = if equality { "''" } else { "'" };
        TyVar::new(format!("{quote}~{letter}{suffix}"))
    }

    /// A new generation for a scope of explicit type variables.
    pub fn fresh_scope(&mut self) -> u32 {
        self.next_scope += 1;
        self.next_scope
    }

    /// Counter value, reported as the elaboration's name counter.
    pub fn counter(&self) -> u32 {
        self.next
    }
}

/// Type variable bindings together with their overload domains and free marks.
#[derive(Debug, Clone, Default)]
pub struct Subst {
    bindings: HashMap<TyVar, Type>,
    domains: HashMap<TyVar, Vec<Type>>,
    free: BTreeSet<TyVar>,
}

impl Subst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, v: &TyVar) -> Option<&Type> {
        self.bindings.get(v)
    }

    pub fn is_bound(&self, v: &TyVar) -> bool {
        self.bindings.contains_key(v)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Records `v := t`. Callers are responsible for occurs and domain checks.
    pub fn bind(&mut self, v: TyVar, t: Type) {
        self.bindings.insert(v, t);
    }

    pub fn domain(&self, v: &TyVar) -> Option<&[Type]> {
        self.domains.get(v).map(Vec::as_slice)
    }

    pub fn set_domain(&mut self, v: TyVar, domain: Vec<Type>) {
        self.domains.insert(v, domain);
    }

    pub fn is_free(&self, v: &TyVar) -> bool {
        self.free.contains(v)
    }

    pub fn mark_free(&mut self, v: TyVar) {
        self.free.insert(v);
    }

    pub fn unmark_free(&mut self, v: &TyVar) {
        self.free.remove(v);
    }

    pub fn free_vars(&self) -> impl Iterator<Item = &TyVar> {
        self.free.iter()
    }

    /// Unbound variables that still carry an overload domain.
    pub fn pending_domains(&self) -> Vec<(TyVar, Vec<Type>)> {
        let mut out: Vec<(TyVar, Vec<Type>)> = self
            .domains
            .iter()
            .filter(|(v, _)| !self.bindings.contains_key(*v))
            .map(|(v, d)| (v.clone(), d.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Follows variable chains and flattens bound rows, one level deep.
    pub fn shallow(&self, t: &Type) -> Type {
        let mut cur = t.clone();
        loop {
            match cur {
                Type::Var(ref v) => match self.bindings.get(v) {
                    Some(next) => cur = next.clone(),
                    None => return cur,
                },
                Type::Record(ref r) => return Type::Record(self.flatten_record(r)),
                _ => return cur,
            }
        }
    }

    /// Merges the fields of every bound row into the record.
    pub fn flatten_record(&self, r: &RecordType) -> RecordType {
        let mut fields = r.fields.clone();
        let mut row = r.row.clone();
        while let Some(rv) = row.clone() {
            match self.bindings.get(&rv).map(|t| self.shallow_var(t)) {
                Some(Type::Record(ext)) => {
                    for (l, t) in ext.fields {
                        fields.entry(l).or_insert(t);
                    }
                    row = ext.row;
                }
                Some(Type::Var(other)) => row = Some(other),
                _ => break,
            }
        }
        RecordType { fields, row }
    }

    fn shallow_var(&self, t: &Type) -> Type {
        let mut cur = t.clone();
        while let Type::Var(v) = &cur {
            match self.bindings.get(v) {
                Some(next) => cur = next.clone(),
                None => break,
            }
        }
        cur
    }

    /// Resolves every bound variable and row in `t`.
    pub fn apply(&self, t: &Type) -> Type {
        match self.shallow(t) {
            Type::Var(v) => Type::Var(v),
            Type::Custom(c) => Type::Custom(CustomType {
                name: c.name,
                args: c.args.iter().map(|a| self.apply(a)).collect(),
                generation: c.generation,
            }),
            Type::Function(a, b) => Type::fun(self.apply(&a), self.apply(&b)),
            Type::Record(r) => Type::Record(RecordType {
                fields: r.fields.iter().map(|(l, t)| (l.clone(), self.apply(t))).collect(),
                row: r.row,
            }),
            Type::Quantified { var, domain, body } => {
                Type::Quantified { var, domain, body: Box::new(self.apply(&body)) }
            }
        }
    }

    /// Drops every binding that is not needed to resolve the currently free
    /// variables or `roots`.
    pub fn retain_reachable<'a>(&mut self, roots: impl IntoIterator<Item = &'a TyVar>) {
        let mut work: Vec<TyVar> = self.free.iter().cloned().collect();
        work.extend(roots.into_iter().cloned());
        let mut keep: HashSet<TyVar> = HashSet::new();
        while let Some(v) = work.pop() {
            if !keep.insert(v.clone()) {
                continue;
            }
            if let Some(t) = self.bindings.get(&v) {
                work.extend(t.ftv());
                work.extend(t.open_rows());
            }
        }
        self.bindings.retain(|v, _| keep.contains(v));
        self.domains.retain(|v, _| keep.contains(v));
    }
}

/// Replaces the leading quantifiers of `t` with fresh variables.
pub fn instantiate(t: &Type, subst: &mut Subst, names: &mut NameGen) -> Type {
    let (vars, body) = t.split_quantifiers();
    let mut out = body.clone();
    for (var, domain) in vars {
        let fresh = names.fresh_like(var);
        if !domain.is_empty() {
            subst.set_domain(fresh.clone(), domain.to_vec());
        }
        out = out.replace_var(var, &Type::Var(fresh));
    }
    subst.apply(&out)
}

/// Quantifies the variables of `t` not in `env_vars`, skipping top-level free
/// variables and overloaded ones. Returns the quantified type.
pub fn generalize(t: &Type, env_vars: &HashSet<TyVar>, subst: &Subst) -> Type {
    let resolved = subst.apply(t);
    let vars: Vec<(TyVar, Vec<Type>)> = resolved
        .ftv()
        .into_iter()
        .filter(|v| !env_vars.contains(v))
        .filter(|v| !subst.is_free(v) && !v.is_free_name())
        .filter(|v| subst.domain(v).is_none())
        .map(|v| (v, Vec::new()))
        .collect();
    Type::quantify(vars, resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn instantiate_carries_domains_to_fresh_variables() {
        let a = TyVar::new("'a");
        let t = Type::quantify(
            vec![(a.clone(), vec![Type::int(), Type::real()])],
            Type::fun(Type::Var(a.clone()), Type::Var(a)),
        );
        let mut s = Subst::new();
        let mut names = NameGen::new();
        let inst = instantiate(&t, &mut s, &mut names);
        let Type::Function(arg, _) = &inst else { panic!("expected function") };
        let Type::Var(v) = arg.as_ref() else { panic!("expected variable") };
        assert_eq!(s.domain(v).map(<[Type]>::len), Some(2));
    }

    #[test]
    fn generalize_skips_environment_variables() {
        let a = TyVar::new("'a");
        let b = TyVar::new("'b");
        let t = Type::fun(Type::Var(a.clone()), Type::Var(b.clone()));
        let env: HashSet<TyVar> = [a.clone()].into_iter().collect();
        let g = generalize(&t, &env, &Subst::new());
        let (vars, _) = g.split_quantifiers();
        assert_eq!(vars.into_iter().map(|(v, _)| v.clone()).collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn free_names_cycle_through_the_alphabet() {
        let mut names = NameGen::new();
        let first = names.fresh_free(false);
        assert_eq!(first.name, "'~A");
        for _ in 0..25 {
            names.fresh_free(false);
        }
        assert_eq!(names.fresh_free(true).name, "''~A1");
    }
}
