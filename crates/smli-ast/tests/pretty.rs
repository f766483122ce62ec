use pretty_assertions::assert_eq;
use smli_ast::ast::{Constant, Decl, DeclKind, ExprKind, LongId};
use smli_ast::derived::*;

#[test]
fn if_is_a_match_on_booleans() {
    let e = if_then_else(var("c"), int(1), int(-2));
    assert_eq!(e.to_string(), "((fn true => 1 | false => ~2) c)");
}

#[test]
fn list_literal_desugars_to_cons_cells() {
    let e = list(vec![int(1), int(2)]);
    assert_eq!(e.to_string(), "(:: (1, (:: (2, nil))))");
}

#[test]
fn patterns_print_in_source_syntax() {
    let p = p_cons(p_int(1), p_var("xs"));
    assert_eq!(p.to_string(), "1 :: xs");
    let r = p_record(vec![("a", p_wild())], false);
    assert_eq!(r.to_string(), "{a = _, ...}");
    assert_eq!(p_tuple(vec![p_var("x"), p_wild()]).to_string(), "(x, _)");
}

#[test]
fn curried_fun_clauses_become_nested_lambdas() {
    let d = fun(
        "f",
        vec![
            (vec![p_int(0), p_var("y")], var("y")),
            (vec![p_var("x"), p_wild()], var("x")),
        ],
    );
    let DeclKind::Value { bindings, .. } = &d.kind else { panic!("expected val") };
    assert!(bindings[0].recursive);
    assert_eq!(
        bindings[0].expr.to_string(),
        "(fn __arg1 => (fn __arg2 => ((fn (0, y) => y | (x, _) => x) (__arg1, __arg2))))"
    );
}

#[test]
fn constants_use_sml_notation() {
    assert_eq!(Constant::Real(-2.0).to_string(), "~2.0");
    assert_eq!(Constant::Str("a\nb".into()).to_string(), "\"a\\nb\"");
    assert_eq!(Constant::Char('x').to_string(), "#\"x\"");
    assert_eq!(Constant::Word(7).to_string(), "0w7");
}

#[test]
fn qualified_identifiers_parse_at_dots() {
    let id = LongId::parse("S.T.x");
    assert_eq!(id.qualifiers, vec!["S".to_string(), "T".to_string()]);
    assert_eq!(id.name, "x");
    assert!(LongId::parse("::").is_simple());
}

#[test]
fn trees_survive_json_encoding() {
    let d = sequence(vec![
        datatype(&["'a"], "tree", vec![("Leaf", None), ("Node", Some(t_var("'a")))]),
        val_named("x", app(var("Node"), int(3))),
    ]);
    let text = serde_json::to_string(&d).unwrap();
    let back: Decl = serde_json::from_str(&text).unwrap();
    assert_eq!(back, *d);
    let DeclKind::Sequence(items) = &back.kind else { panic!("expected sequence") };
    let DeclKind::Value { bindings, .. } = &items[1].kind else { panic!("expected val") };
    assert!(matches!(bindings[0].expr.kind, ExprKind::Apply { .. }));
}
