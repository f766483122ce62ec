use pretty_assertions::assert_eq;
use smli_types::display::normalize;
use smli_types::scheme::{generalize, instantiate};
use smli_types::{BuiltinEquality, NameGen, RecordType, Subst, TyVar, Type, TypeClash, Unifier};
use std::collections::{BTreeMap, HashSet};

struct Ctx {
    subst: Subst,
    names: NameGen,
}

impl Ctx {
    fn new() -> Self {
        Self { subst: Subst::new(), names: NameGen::new() }
    }

    fn merge(&mut self, a: &Type, b: &Type) -> Result<Type, TypeClash> {
        Unifier::new(&mut self.subst, &mut self.names, &BuiltinEquality).merge(a, b)
    }

    fn fresh(&mut self) -> Type {
        Type::Var(self.names.fresh())
    }
}

fn open_record(fields: Vec<(&str, Type)>, row: TyVar) -> Type {
    Type::Record(RecordType {
        fields: fields.into_iter().map(|(l, t)| (l.to_string(), t)).collect(),
        row: Some(row),
    })
}

#[test]
fn functions_unify_componentwise() {
    let mut cx = Ctx::new();
    let a = cx.fresh();
    let b = cx.fresh();
    let t = cx.merge(&Type::fun(a.clone(), Type::int()), &Type::fun(Type::string(), b.clone())).unwrap();
    assert_eq!(t.to_string(), "string -> int");
    assert_eq!(cx.subst.apply(&b), Type::int());
}

#[test]
fn generative_datatypes_with_the_same_name_clash() {
    let mut cx = Ctx::new();
    let err = cx.merge(&Type::custom("t", vec![], 1), &Type::custom("t", vec![], 2)).unwrap_err();
    assert!(matches!(err, TypeClash::Mismatch { .. }));
}

#[test]
fn occurs_check_reports_circularity() {
    let mut cx = Ctx::new();
    let a = cx.fresh();
    let err = cx.merge(&a, &Type::list(a.clone())).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Type clash. An expression of type \"'a\" cannot have type \"'a list\" because of circularity."
    );
}

#[test]
fn domain_restricted_variables_only_accept_members() {
    let mut cx = Ctx::new();
    let v = cx.names.fresh();
    cx.subst.set_domain(v.clone(), vec![Type::int(), Type::word(), Type::real()]);
    assert!(cx.merge(&Type::Var(v.clone()), &Type::string()).is_err());
    assert_eq!(cx.merge(&Type::Var(v), &Type::real()).unwrap(), Type::real());
}

#[test]
fn intersecting_domains_keeps_common_members() {
    let mut cx = Ctx::new();
    let x = cx.names.fresh();
    let y = cx.names.fresh();
    cx.subst.set_domain(x.clone(), vec![Type::int(), Type::word(), Type::real()]);
    cx.subst.set_domain(y.clone(), vec![Type::int(), Type::real()]);
    cx.merge(&Type::Var(x.clone()), &Type::Var(y)).unwrap();
    assert!(cx.merge(&Type::Var(x.clone()), &Type::word()).is_err());
}

#[test]
fn equality_variables_reject_functions_and_reals() {
    let mut cx = Ctx::new();
    let eq = Type::Var(cx.names.fresh_equality());
    assert!(matches!(
        cx.merge(&eq, &Type::fun(Type::int(), Type::int())),
        Err(TypeClash::Equality { .. })
    ));
    let eq = Type::Var(cx.names.fresh_equality());
    assert!(cx.merge(&eq, &Type::real()).is_err());
    let eq = Type::Var(cx.names.fresh_equality());
    assert!(cx.merge(&eq, &Type::reference(Type::fun(Type::int(), Type::int()))).is_ok());
}

#[test]
fn equality_spreads_into_list_elements() {
    let mut cx = Ctx::new();
    let a = cx.fresh();
    let eq = Type::Var(cx.names.fresh_equality());
    cx.merge(&eq, &Type::list(a.clone())).unwrap();
    assert_eq!(normalize(&cx.subst.apply(&a)).to_string(), "''a");
}

#[test]
fn rigid_variables_unify_only_with_themselves() {
    let mut cx = Ctx::new();
    let r = Type::Var(TyVar::rigid("'a", 1));
    assert!(matches!(cx.merge(&r, &Type::int()), Err(TypeClash::Rigid { .. })));
    assert!(cx.merge(&r, &Type::Var(TyVar::rigid("'b", 1))).is_err());
    let f = cx.fresh();
    assert_eq!(cx.merge(&f, &r).unwrap(), r);
}

#[test]
fn open_record_accepts_a_wider_complete_record() {
    let mut cx = Ctx::new();
    let row = cx.names.fresh_row();
    let x = cx.fresh();
    let pattern = open_record(vec![("a", x.clone())], row);
    let mut fields = BTreeMap::new();
    fields.insert("a".to_string(), Type::int());
    fields.insert("b".to_string(), Type::string());
    let full = Type::Record(RecordType::complete(fields));
    assert_eq!(cx.merge(&pattern, &full).unwrap().to_string(), "{a: int, b: string}");
    assert_eq!(cx.subst.apply(&x), Type::int());
}

#[test]
fn open_record_needing_a_missing_field_clashes() {
    let mut cx = Ctx::new();
    let row = cx.names.fresh_row();
    let pattern = open_record(vec![("c", Type::int())], row);
    let full = Type::tuple(vec![Type::int(), Type::int()]);
    assert!(matches!(cx.merge(&pattern, &full), Err(TypeClash::Members { .. })));
}

#[test]
fn two_open_records_share_a_fresh_rest() {
    let mut cx = Ctx::new();
    let p = cx.names.fresh_row();
    let q = cx.names.fresh_row();
    let left = open_record(vec![("a", Type::int())], p);
    let right = open_record(vec![("b", Type::string())], q);
    let t = cx.merge(&left, &right).unwrap();
    assert_eq!(t.to_string(), "{a: int, b: string, ...}");
    let closed = Type::Record(RecordType::complete(
        [("a".to_string(), Type::int()), ("b".to_string(), Type::string())].into_iter().collect(),
    ));
    cx.merge(&t, &closed).unwrap();
    assert_eq!(cx.subst.apply(&right).to_string(), "{a: int, b: string}");
}

#[test]
fn complete_records_must_agree_on_labels() {
    let mut cx = Ctx::new();
    let err = cx
        .merge(&Type::tuple(vec![Type::int(), Type::int()]), &Type::tuple(vec![Type::int()]))
        .unwrap_err();
    assert!(matches!(err, TypeClash::Members { .. }));
}

#[test]
fn instantiate_then_generalize_is_stable_under_normalization() {
    let mut cx = Ctx::new();
    let a = TyVar::new("'a");
    let scheme = Type::quantify(vec![(a.clone(), vec![])], Type::fun(Type::Var(a.clone()), Type::Var(a)));
    let inst = instantiate(&scheme, &mut cx.subst, &mut cx.names);
    let again = generalize(&inst, &HashSet::new(), &cx.subst);
    assert_eq!(normalize(&again), normalize(&scheme));
    assert_eq!(normalize(&again).to_string(), "∀'a . 'a -> 'a");
}

#[test]
fn free_mark_spreads_through_bindings() {
    let mut cx = Ctx::new();
    let free = cx.names.fresh_free(false);
    cx.subst.mark_free(free.clone());
    let inner = cx.names.fresh();
    cx.merge(&Type::Var(free), &Type::list(Type::Var(inner.clone()))).unwrap();
    assert!(cx.subst.is_free(&inner));
    let g = generalize(&Type::Var(inner.clone()), &HashSet::new(), &cx.subst);
    assert_eq!(g, Type::Var(inner));
}
