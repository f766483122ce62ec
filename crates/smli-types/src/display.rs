//! SML-style type printing and canonical renaming.

use crate::types::{CustomType, RecordType, TyVar, Type};
use std::collections::HashMap;
use std::fmt;

impl fmt::Display for TyVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&pp_type(self))
    }
}

fn pp_atomic(t: &Type) -> String {
    match t {
        Type::Function(..) | Type::Quantified { .. } => format!("({})", pp_type(t)),
        Type::Record(r) if r.tuple_arity().is_some() => format!("({})", pp_type(t)),
        _ => pp_type(t),
    }
}

/// Left of an arrow, `*` binds tighter than `->`.
fn pp_domain_side(t: &Type) -> String {
    match t {
        Type::Function(..) | Type::Quantified { .. } => format!("({})", pp_type(t)),
        _ => pp_type(t),
    }
}

fn pp_domain(domain: &[Type]) -> String {
    domain.iter().map(pp_type).collect::<Vec<_>>().join(", ")
}

fn pp_record(r: &RecordType) -> String {
    if r.fields.is_empty() {
        return if r.is_complete() { "unit".into() } else { "{...}".into() };
    }
    if r.tuple_arity().is_some() {
        return r.tuple_items().into_iter().map(pp_atomic).collect::<Vec<_>>().join(" * ");
    }
    let mut parts: Vec<String> =
        r.fields.iter().map(|(l, t)| format!("{l}: {}", pp_type(t))).collect();
    if !r.is_complete() {
        parts.push("...".into());
    }
    format!("{{{}}}", parts.join(", "))
}

fn pp_custom(c: &CustomType) -> String {
    match c.args.as_slice() {
        [] => c.name.clone(),
        [arg] => format!("{} {}", pp_atomic(arg), c.name),
        args => format!("({}) {}", args.iter().map(pp_type).collect::<Vec<_>>().join(", "), c.name),
    }
}

pub fn pp_type(t: &Type) -> String {
    match t {
        Type::Var(v) => v.name.clone(),
        Type::Custom(c) => pp_custom(c),
        Type::Function(a, b) => format!("{} -> {}", pp_domain_side(a), pp_type(b)),
        Type::Record(r) => pp_record(r),
        Type::Quantified { .. } => {
            let (vars, body) = t.split_quantifiers();
            let binders = vars
                .into_iter()
                .map(|(v, d)| {
                    if d.is_empty() {
                        v.name.clone()
                    } else {
                        format!("{}∈{{{}}}", v.name, pp_domain(d))
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("∀{binders} . {}", pp_type(body))
        }
    }
}

fn canonical_name(index: usize, equality: bool) -> String {
    let letter = (b'a' + (index % 26) as u8) as char;
    let suffix = if index >= 26 { (index / 26).to_string() } else { String::new() };
    let quote = if equality { "''" } else { "'" };
    format!("{quote}{letter}{suffix}")
}

#[derive(Default)]
struct Renamer {
    vars: HashMap<TyVar, TyVar>,
    rows: HashMap<TyVar, TyVar>,
}

impl Renamer {
    fn var(&mut self, v: &TyVar) -> TyVar {
        if v.is_free_name() {
            return TyVar::new(v.name.clone());
        }
        let next = self.vars.len();
        self.vars
            .entry(v.clone())
            .or_insert_with(|| TyVar::new(canonical_name(next, v.admits_equality())))
            .clone()
    }

    fn row(&mut self, v: &TyVar) -> TyVar {
        let next = self.rows.len();
        self.rows.entry(v.clone()).or_insert_with(|| TyVar::new(format!("'..{next}"))).clone()
    }

    fn rename(&mut self, t: &Type) -> Type {
        match t {
            Type::Var(v) => Type::Var(self.var(v)),
            Type::Custom(c) => Type::Custom(CustomType {
                name: c.name.clone(),
                args: c.args.iter().map(|a| self.rename(a)).collect(),
                generation: c.generation,
            }),
            Type::Function(a, b) => {
                let a = self.rename(a);
                Type::fun(a, self.rename(b))
            }
            Type::Record(r) => {
                let mut fields = std::collections::BTreeMap::new();
                for (l, t) in &r.fields {
                    fields.insert(l.clone(), self.rename(t));
                }
                let row = r.row.as_ref().map(|v| self.row(v));
                Type::Record(RecordType { fields, row })
            }
            Type::Quantified { var, domain, body } => {
                let var = self.var(var);
                let domain = domain.iter().map(|d| self.rename(d)).collect();
                Type::Quantified { var, domain, body: Box::new(self.rename(body)) }
            }
        }
    }
}

/// Renames variables by order of first appearance to `'a, 'b, ...` (`''a`
/// for equality variables) and drops rigid generations. Free top-level
/// variables keep their `'~A` names.
pub fn normalize(t: &Type) -> Type {
    Renamer::default().rename(t)
}

/// Normalizes two types with one shared renaming.
pub fn normalize_pair(a: &Type, b: &Type) -> (Type, Type) {
    let mut r = Renamer::default();
    let a = r.rename(a);
    let b = r.rename(b);
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn prints_core_forms() {
        let a = Type::var("'a");
        assert_eq!(Type::list(a.clone()).to_string(), "'a list");
        assert_eq!(Type::tuple(vec![Type::int(), Type::string()]).to_string(), "int * string");
        assert_eq!(
            Type::fun(Type::fun(Type::int(), Type::int()), Type::int()).to_string(),
            "(int -> int) -> int"
        );
        assert_eq!(
            Type::custom("t", vec![Type::int(), Type::string()], 1).to_string(),
            "(int, string) t"
        );
        assert_eq!(Type::unit().to_string(), "unit");
        assert_eq!(Type::list(Type::tuple(vec![Type::int(), Type::int()])).to_string(), "(int * int) list");
        assert_eq!(
            Type::fun(Type::tuple(vec![Type::int(), Type::int()]), Type::int()).to_string(),
            "int * int -> int"
        );
    }

    #[test]
    fn prints_quantifiers_with_domains() {
        let v = TyVar::new("'a");
        let t = Type::quantify(
            vec![(v.clone(), vec![Type::int(), Type::real()])],
            Type::fun(Type::Var(v.clone()), Type::Var(v)),
        );
        assert_eq!(t.to_string(), "∀'a∈{int, real} . 'a -> 'a");
    }

    #[test]
    fn normalize_renames_in_order_of_appearance() {
        let t = Type::fun(Type::var("'*t9"), Type::fun(Type::var("''*t2"), Type::var("'*t9")));
        assert_eq!(normalize(&t).to_string(), "'a -> ''b -> 'a");
        let rigid = Type::Var(TyVar::rigid("'x", 4));
        assert_eq!(normalize(&rigid), Type::var("'a"));
        assert_eq!(normalize(&Type::var("'~B")).to_string(), "'~B");
    }
}
