use pretty_assertions::assert_eq;
use smli_ast::ast::{ConstructorBinding, DatatypeBinding, Decl, DeclKind, LongId, TypeBinding};
use smli_ast::derived::*;
use smli_interp::{ElaborationError, Interpreter, InterpreterError, InterpreterOptions, WarningKind};
use std::rc::Rc;

fn rejected(interp: &mut Interpreter, decl: &Rc<Decl>) -> ElaborationError {
    match interp.interpret(decl) {
        Err(InterpreterError::Elaboration(e)) => e,
        other => panic!("expected an elaboration error, got {other:?}"),
    }
}

fn messages(interp: &mut Interpreter, decl: &Rc<Decl>) -> Vec<String> {
    interp.interpret(decl).unwrap().warnings.into_iter().map(|w| w.message).collect()
}

#[test]
fn literals_and_builtins_have_their_types() {
    let mut interp = Interpreter::new();
    interp.interpret(&val_named("s", infix("^", string("a"), string("b")))).unwrap();
    interp.interpret(&val_named("c", app(var("chr"), int(65)))).unwrap();
    interp.interpret(&val_named("l", list(vec![int(1), int(2)]))).unwrap();
    interp.interpret(&val_named("id", lam(p_var("x"), var("x")))).unwrap();
    assert_eq!(interp.static_type("s").as_deref(), Some("string"));
    assert_eq!(interp.static_type("c").as_deref(), Some("char"));
    assert_eq!(interp.static_type("l").as_deref(), Some("int list"));
    assert_eq!(interp.static_type("id").as_deref(), Some("∀'a . 'a -> 'a"));
}

#[test]
fn overloaded_operators_default_to_int() {
    let mut interp = Interpreter::new();
    let add = lam(p_tuple(vec![p_var("x"), p_var("y")]), infix("+", var("x"), var("y")));
    interp.interpret(&val_named("add", add)).unwrap();
    assert_eq!(interp.static_type("add").as_deref(), Some("int * int -> int"));

    let half = infix("/", real(1.0), real(2.0));
    interp.interpret(&val_named("half", half)).unwrap();
    assert_eq!(interp.static_type("half").as_deref(), Some("real"));
}

#[test]
fn equality_types_propagate_and_functions_are_refused() {
    let mut interp = Interpreter::new();
    let eq = lam(p_tuple(vec![p_var("x"), p_var("y")]), infix("=", var("x"), var("y")));
    interp.interpret(&val_named("same", eq)).unwrap();
    assert_eq!(interp.static_type("same").as_deref(), Some("∀''a . ''a * ''a -> bool"));

    let id = || lam(p_var("x"), var("x"));
    let err = rejected(&mut interp, &val_named("bad", infix("=", id(), id())));
    assert!(matches!(err, ElaborationError::TypeClash { .. }), "{err}");

    let real_eq = infix("=", real(1.0), real(1.0));
    let err = rejected(&mut interp, &val_named("bad", real_eq));
    assert!(matches!(err, ElaborationError::TypeClash { .. }), "{err}");
}

#[test]
fn redeclared_datatypes_are_distinct() {
    let mut interp = Interpreter::new();
    interp.interpret(&datatype(&[], "t", vec![("A", None)])).unwrap();
    interp.interpret(&val_named("a", var("A"))).unwrap();
    interp.interpret(&datatype(&[], "t", vec![("A", None)])).unwrap();
    interp.interpret(&val_named("b", var("A"))).unwrap();

    let err = rejected(&mut interp, &val_named("c", infix("=", var("a"), var("b"))));
    assert!(matches!(err, ElaborationError::TypeClash { .. }), "{err}");
    assert_eq!(interp.show(interp.value("a").unwrap()), "A");
    assert_eq!(interp.show(interp.value("b").unwrap()), "A/1");
}

#[test]
fn redeclared_exceptions_are_distinct() {
    let mut interp = Interpreter::new();
    interp.interpret(&exception("E", None)).unwrap();
    interp.interpret(&val_named("old", var("E"))).unwrap();
    interp.interpret(&exception("E", None)).unwrap();
    let caught = handle(
        raise(var("old")),
        vec![rule(p_con0("E"), string("new")), rule(p_wild(), string("old"))],
    );
    let evaluation = interp.interpret_expr(caught).unwrap();
    assert!(!evaluation.has_thrown());
    assert_eq!(interp.show(interp.value("it").unwrap()), "\"old\"");
}

#[test]
fn free_type_variables_are_instantiated_later() {
    let mut interp = Interpreter::new();
    interp.interpret(&val_named("r", app(var("ref"), var("nil")))).unwrap();
    assert_eq!(interp.static_type("r").as_deref(), Some("'~A list ref"));

    let store = val(p_wild(), infix(":=", var("r"), list(vec![int(1)])));
    assert_eq!(
        messages(&mut interp, &store),
        vec!["The free type variable \"'~A\" has been instantiated to \"int\".".to_string()]
    );
    assert_eq!(interp.static_type("r").as_deref(), Some("int list ref"));

    let err = rejected(&mut interp, &val(p_wild(), infix(":=", var("r"), list(vec![string("x")]))));
    assert!(matches!(err, ElaborationError::TypeClash { .. }), "{err}");
}

#[test]
fn let_bound_functions_are_polymorphic() {
    let mut interp = Interpreter::new();
    let body = tuple(vec![app(var("id"), int(1)), app(var("id"), string("x"))]);
    interp.interpret_expr(let_in(vec![val_named("id", lam(p_var("x"), var("x")))], body)).unwrap();
    assert_eq!(interp.static_type("it").as_deref(), Some("int * string"));
}

#[test]
fn mutual_recursion_settles() {
    let mut interp = Interpreter::new();
    let group = funs(vec![
        (
            "even",
            vec![
                (vec![p_int(0)], var("true")),
                (vec![p_var("n")], app(var("odd"), infix("-", var("n"), int(1)))),
            ],
        ),
        (
            "odd",
            vec![
                (vec![p_int(0)], var("false")),
                (vec![p_var("n")], app(var("even"), infix("-", var("n"), int(1)))),
            ],
        ),
    ]);
    interp.interpret(&group).unwrap();
    assert_eq!(interp.static_type("even").as_deref(), Some("int -> bool"));
    interp.interpret_expr(app(var("odd"), int(7))).unwrap();
    assert_eq!(interp.show(interp.value("it").unwrap()), "true");
}

#[test]
fn static_errors_are_reported() {
    let mut interp = Interpreter::new();
    let err = rejected(&mut interp, &val_named("x", var("nope")));
    assert_eq!(err.to_string(), "Unbound value identifier \"nope\".");

    let err = rejected(&mut interp, &datatype(&[], "t", vec![("nil", None)]));
    assert!(matches!(err, ElaborationError::IllegalRebind { ref name, .. } if name == "nil"));

    let twice = record(vec![("a", int(1)), ("a", int(2))]);
    let err = rejected(&mut interp, &val_named("r", twice));
    assert!(matches!(err, ElaborationError::DuplicateLabel { ref label, .. } if label == "a"));

    let err = rejected(&mut interp, &type_alias(&[], "t", t_con("list", vec![t_var("'a")])));
    assert!(matches!(err, ElaborationError::UnguardedTypeVariable { ref name, .. } if name == "'a"));

    let err = rejected(&mut interp, &val_named("y", var("M.x")));
    assert!(matches!(err, ElaborationError::UnboundModule { ref name, .. } if name == "M"));

    let err = rejected(&mut interp, &val_named("f", selector("a")));
    assert!(matches!(err, ElaborationError::UnresolvedRecord { .. }), "{err}");

    let err = rejected(&mut interp, &val_named("z", typed(int(1), t_name("nothing"))));
    assert!(matches!(err, ElaborationError::UnboundType { .. }), "{err}");
}

#[test]
fn annotated_selectors_resolve() {
    let mut interp = Interpreter::new();
    let get = typed(selector("a"), t_fun(t_record(vec![("a", t_name("int")), ("b", t_name("string"))]), t_name("int")));
    interp.interpret(&val_named("get", get)).unwrap();
    assert_eq!(interp.static_type("get").as_deref(), Some("{a: int, b: string} -> int"));
}

#[test]
fn failed_declarations_leave_no_trace() {
    let mut interp = Interpreter::new();
    let _ = rejected(&mut interp, &sequence(vec![val_named("ok", int(1)), val_named("bad", var("nope"))]));
    assert_eq!(interp.static_type("ok"), None);
    assert!(interp.value("ok").is_none());
}

#[test]
fn refinement_without_passes_is_circular() {
    let options = InterpreterOptions { max_refinement_passes: 0, ..InterpreterOptions::default() };
    let mut interp = Interpreter::with_options(options);
    let err = rejected(&mut interp, &fun("f", vec![(vec![p_var("x")], var("x"))]));
    assert!(matches!(err, ElaborationError::Circularity { ref names, .. } if names == "f"), "{err}");
}

#[test]
fn deep_recursive_groups_skip_the_circularity_check() {
    let mut interp = Interpreter::new();
    let f4 = fun("f4", vec![(vec![p_var("w")], var("w"))]);
    let f3 = fun("f3", vec![(vec![p_var("z")], let_in(vec![f4], app(var("f4"), var("z"))))]);
    let f2 = fun("f2", vec![(vec![p_var("y")], let_in(vec![f3], app(var("f3"), var("y"))))]);
    let f1 = fun("f1", vec![(vec![p_var("x")], let_in(vec![f2], app(var("f2"), var("x"))))]);
    let evaluation = interp.interpret(&f1).unwrap();
    let skipped: Vec<&str> = evaluation
        .warnings
        .iter()
        .filter(|w| w.kind == WarningKind::CircularityCheckSkipped)
        .map(|w| w.message.as_str())
        .collect();
    assert_eq!(skipped, vec!["Skipped the circularity check for \"f4\"."]);
    assert_eq!(interp.static_type("f1").as_deref(), Some("∀'a . 'a -> 'a"));
}

#[test]
fn redundant_rules_are_reported() {
    let mut interp = Interpreter::new();
    let duplicate = lambda(vec![
        rule(p_int(0), int(1)),
        rule(p_int(0), int(2)),
        rule(p_wild(), int(3)),
    ]);
    assert_eq!(
        messages(&mut interp, &val_named("f", duplicate)),
        vec!["Duplicate rule for \"0\" in pattern matching.".to_string()]
    );

    let shadowed = lambda(vec![
        rule(p_wild(), int(1)),
        rule(p_int(0), int(2)),
        rule(p_int(1), int(3)),
    ]);
    assert_eq!(
        messages(&mut interp, &val_named("g", shadowed)),
        vec!["Rules after \"_\" unused in pattern matching.".to_string()]
    );
}

#[test]
fn lists_and_datatypes_are_checked_for_coverage() {
    let mut interp = Interpreter::new();
    let head = lambda(vec![rule(p_cons(p_var("x"), p_wild()), var("x"))]);
    assert_eq!(
        messages(&mut interp, &val_named("hd", head)),
        vec!["Pattern matching is not exhaustive.".to_string()]
    );

    interp
        .interpret(&datatype(&[], "color", vec![("Red", None), ("Green", None), ("Blue", Some(t_name("int")))]))
        .unwrap();
    let total = lambda(vec![
        rule(p_con0("Red"), int(0)),
        rule(p_con0("Green"), int(1)),
        rule(p_con("Blue", p_var("n")), var("n")),
    ]);
    assert!(messages(&mut interp, &val_named("code", total)).is_empty());
}

#[test]
fn handlers_are_not_checked_for_coverage() {
    let mut interp = Interpreter::new();
    let e = handle(int(1), vec![rule(p_con0("Div"), int(0))]);
    let evaluation = interp.interpret_expr(e).unwrap();
    assert!(evaluation.warnings.is_empty());
}

#[test]
fn exception_aliases_are_the_same_handler_case() {
    let mut interp = Interpreter::new();
    interp.interpret(&exception("A", None)).unwrap();
    interp.interpret(&exception_alias("B", "A")).unwrap();
    let aliased = handle(raise(var("A")), vec![rule(p_con0("A"), int(1)), rule(p_con0("B"), int(2))]);
    assert_eq!(
        messages(&mut interp, &val_named("x", aliased)),
        vec!["Duplicate rule for \"B\" in pattern matching.".to_string()]
    );

    interp.interpret(&structure("S", exception("E", None))).unwrap();
    interp.interpret(&open(&["S"])).unwrap();
    let opened = handle(raise(var("E")), vec![rule(p_con0("S.E"), int(1)), rule(p_con0("E"), int(2))]);
    assert_eq!(
        messages(&mut interp, &val_named("y", opened)),
        vec!["Duplicate rule for \"E\" in pattern matching.".to_string()]
    );

    interp.interpret(&exception("A", None)).unwrap();
    let distinct = handle(raise(var("A")), vec![rule(p_con0("A"), int(1)), rule(p_con0("B"), int(2))]);
    assert!(messages(&mut interp, &val_named("z", distinct)).is_empty());
}

#[test]
fn disabled_coverage_checks_stay_silent() {
    let options = InterpreterOptions { exhaustiveness_warnings: false, ..InterpreterOptions::default() };
    let mut interp = Interpreter::with_options(options);
    let partial = fun("f", vec![(vec![p_int(0)], int(1))]);
    assert!(messages(&mut interp, &partial).is_empty());
}

#[test]
fn type_abbreviations_expand_and_check_arity() {
    let mut interp = Interpreter::new();
    let pair = t_tuple(vec![t_var("'a"), t_var("'a")]);
    interp.interpret(&type_alias(&["'a"], "pair", pair)).unwrap();
    let annotated = typed(tuple(vec![int(1), int(2)]), t_con("pair", vec![t_name("int")]));
    interp.interpret(&val_named("p", annotated)).unwrap();
    assert_eq!(interp.static_type("p").as_deref(), Some("int * int"));

    let err = rejected(&mut interp, &val_named("q", typed(int(1), t_name("pair"))));
    assert!(matches!(err, ElaborationError::Arity { expected: 1, got: 0, .. }), "{err}");
}

#[test]
fn withtype_abbreviations_reach_constructor_types() {
    let mut interp = Interpreter::new();
    let decl = Rc::new(Decl::new(DeclKind::Datatype {
        bindings: vec![DatatypeBinding {
            tyvars: Vec::new(),
            name: "tree".into(),
            constructors: vec![ConstructorBinding { name: "Node".into(), arg: Some(t_name("forest")) }],
        }],
        with_types: vec![TypeBinding {
            tyvars: Vec::new(),
            name: "forest".into(),
            ty: t_con("list", vec![t_name("tree")]),
        }],
    }));
    interp.interpret(&decl).unwrap();
    let leaf = app(var("Node"), var("nil"));
    interp.interpret(&val_named("t", app(var("Node"), list(vec![leaf])))).unwrap();
    assert_eq!(interp.static_type("t").as_deref(), Some("tree"));
    assert_eq!(interp.show(interp.value("t").unwrap()), "Node [Node []]");
}

#[test]
fn replicated_datatypes_share_constructors() {
    let mut interp = Interpreter::new();
    interp.interpret(&structure("S", datatype(&[], "t", vec![("A", None), ("B", None)]))).unwrap();
    let replicate = Rc::new(Decl::new(DeclKind::DatatypeReplication {
        name: "u".into(),
        original: LongId::parse("S.t"),
    }));
    interp.interpret(&replicate).unwrap();
    interp.interpret(&val_named("x", var("B"))).unwrap();
    interp.interpret(&val_named("same", infix("=", var("x"), var("S.B")))).unwrap();
    assert_eq!(interp.static_type("x").as_deref(), Some("t"));
    assert_eq!(interp.show(interp.value("same").unwrap()), "true");
}

#[test]
fn datatype_equality_follows_constructor_arguments() {
    let mut interp = Interpreter::new();
    let tree = datatype(
        &[],
        "tree",
        vec![("Leaf", None), ("Node", Some(t_tuple(vec![t_name("tree"), t_name("tree")])))],
    );
    interp.interpret(&tree).unwrap();
    let node = || app(var("Node"), tuple(vec![var("Leaf"), var("Leaf")]));
    interp.interpret_expr(infix("=", node(), node())).unwrap();
    assert_eq!(interp.show(interp.value("it").unwrap()), "true");

    let wrapped = datatype(&[], "wrapped", vec![("W", Some(t_fun(t_name("int"), t_name("int"))))]);
    interp.interpret(&wrapped).unwrap();
    let w = || app(var("W"), lam(p_var("n"), var("n")));
    let err = rejected(&mut interp, &val_named("bad", infix("=", w(), w())));
    assert!(matches!(err, ElaborationError::TypeClash { .. }), "{err}");
}
