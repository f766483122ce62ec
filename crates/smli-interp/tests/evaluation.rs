use pretty_assertions::assert_eq;
use smli_ast::derived::*;
use smli_interp::{
    Completion, EvaluationError, Interpreter, InterpreterError, InterpreterOptions, Library, Value, WarningKind,
};
use smli_types::Type;

fn shown(interp: &Interpreter, name: &str) -> String {
    interp.show(interp.value(name).expect("bound"))
}

fn raised(interp: &mut Interpreter, e: std::rc::Rc<smli_ast::ast::Expr>) -> Option<String> {
    interp.interpret_expr(e).unwrap().raised.map(|exn| exn.to_string())
}

#[test]
fn arithmetic_faults_raise_builtin_exceptions() {
    let mut interp = Interpreter::new();
    assert_eq!(raised(&mut interp, infix("div", int(1), int(0))), Some("Div".into()));
    assert_eq!(raised(&mut interp, infix("mod", int(1), int(0))), Some("Div".into()));
    assert_eq!(raised(&mut interp, infix("+", int(1_073_741_823), int(1))), Some("Overflow".into()));
    assert_eq!(raised(&mut interp, app(var("chr"), int(300))), Some("Chr".into()));
    assert_eq!(raised(&mut interp, infix("div", int(-5), int(2))), None);
    assert_eq!(shown(&interp, "it"), "~3");
    assert_eq!(raised(&mut interp, infix("mod", int(-5), int(2))), None);
    assert_eq!(shown(&interp, "it"), "1");
}

#[test]
fn failed_bindings_raise_bind() {
    let mut interp = Interpreter::new();
    let decl = val(p_tuple(vec![p_var("x"), p_int(1)]), tuple(vec![int(2), int(3)]));
    let evaluation = interp.interpret(&decl).unwrap();
    assert_eq!(evaluation.warnings.iter().map(|w| w.kind).collect::<Vec<_>>(), vec![WarningKind::NonExhaustive]);
    assert_eq!(evaluation.raised.map(|e| e.to_string()), Some("Bind".into()));
    assert!(interp.value("x").is_none());
}

#[test]
fn exceptions_carry_and_deliver_arguments() {
    let mut interp = Interpreter::new();
    interp.interpret(&exception("Oops", Some(t_name("int")))).unwrap();
    let e = handle(
        raise(app(var("Oops"), int(41))),
        vec![rule(p_con("Oops", p_var("n")), infix("+", var("n"), int(1)))],
    );
    interp.interpret_expr(e).unwrap();
    assert_eq!(shown(&interp, "it"), "42");

    let escaped = interp.interpret_expr(raise(app(var("Fail"), string("boom")))).unwrap();
    assert_eq!(escaped.raised.map(|e| interp.show(&e)), Some("Fail \"boom\"".into()));
}

#[test]
fn exception_aliases_share_identity() {
    let mut interp = Interpreter::new();
    interp.interpret(&exception_alias("Zero", "Div")).unwrap();
    let e = handle(infix("div", int(1), int(0)), vec![rule(p_con0("Zero"), int(-1))]);
    interp.interpret_expr(e).unwrap();
    assert_eq!(shown(&interp, "it"), "~1");
}

#[test]
fn infix_constructors_print_between_their_operands() {
    let mut interp = Interpreter::new();
    interp.interpret(&infix_decl(5, &["++"])).unwrap();
    let pair = t_tuple(vec![t_name("int"), t_name("int")]);
    interp.interpret(&datatype(&[], "pair", vec![("++", Some(pair))])).unwrap();
    interp.interpret(&val_named("p", infix("++", int(1), int(2)))).unwrap();
    assert_eq!(shown(&interp, "p"), "(1 ++ 2)");
    assert_eq!(interp.static_type("p").as_deref(), Some("pair"));
}

#[test]
fn values_print_in_source_notation() {
    let mut interp = Interpreter::new();
    interp.interpret(&val_named("l", list(vec![int(1), int(-2)]))).unwrap();
    interp.interpret(&val_named("r", record(vec![("name", string("x")), ("size", int(3))]))).unwrap();
    interp.interpret(&val_named("c", app(var("ref"), chr('a')))).unwrap();
    interp.interpret(&val_named("f", lam(p_var("x"), var("x")))).unwrap();
    assert_eq!(shown(&interp, "l"), "[1, ~2]");
    assert_eq!(shown(&interp, "r"), "{name = \"x\", size = 3}");
    assert_eq!(shown(&interp, "c"), "ref #\"a\"");
    assert_eq!(shown(&interp, "f"), "fn");
    assert_eq!(interp.static_type("r").as_deref(), Some("{name: string, size: int}"));
}

#[test]
fn structures_open_and_local_scope_names() {
    let mut interp = Interpreter::new();
    let body = sequence(vec![
        val_named("base", int(1)),
        fun("add", vec![(vec![p_var("y")], infix("+", var("y"), var("base")))]),
    ]);
    interp.interpret(&structure("M", body)).unwrap();
    interp.interpret(&val_named("a", app(var("M.add"), int(2)))).unwrap();
    assert_eq!(shown(&interp, "a"), "3");
    assert!(interp.value("add").is_none());

    interp.interpret(&open(&["M"])).unwrap();
    interp.interpret(&val_named("b", app(var("add"), int(10)))).unwrap();
    assert_eq!(shown(&interp, "b"), "11");
    assert_eq!(interp.static_type("add").as_deref(), Some("int -> int"));

    let hidden = val_named("hidden", int(5));
    let shown_decl = val_named("visible", infix("+", var("hidden"), int(1)));
    interp.interpret(&local(hidden, shown_decl)).unwrap();
    assert_eq!(shown(&interp, "visible"), "6");
    assert!(interp.value("hidden").is_none());
    assert_eq!(interp.static_type("hidden"), None);
}

#[test]
fn libraries_install_as_structures() {
    let mut interp = Interpreter::new();
    let a = Type::var("'a");
    let ty = Type::quantify(
        vec![(smli_types::TyVar::new("'a"), Vec::new())],
        Type::fun(Type::tuple(vec![Type::fun(a.clone(), a.clone()), a.clone()]), a),
    );
    let library = Library::new("Twice").function("apply", ty, |arg, cx| {
        let (Some(f), Some(x)) = (arg.field("1").cloned(), arg.field("2").cloned()) else {
            return Err(EvaluationError::internal("Twice.apply expects a pair"));
        };
        match cx.call(f.clone(), x)? {
            Completion::Normal(once) => cx.call(f, once),
            raised => Ok(raised),
        }
    });
    interp.register_library(&library);

    let add2 = lam(p_var("n"), infix("+", var("n"), int(2)));
    interp.interpret(&val_named("r", app(var("Twice.apply"), tuple(vec![add2, int(3)])))).unwrap();
    assert_eq!(shown(&interp, "r"), "7");
    assert_eq!(interp.static_type("r").as_deref(), Some("int"));

    interp.interpret(&open(&["Twice"])).unwrap();
    let shout = lam(p_var("s"), infix("^", var("s"), string("!")));
    interp.interpret(&val_named("s", app(var("apply"), tuple(vec![shout, string("hi")])))).unwrap();
    assert_eq!(shown(&interp, "s"), "\"hi!!\"");

    let failing = lam(p_var("n"), raise(var("Div")));
    let evaluation = interp.interpret_expr(app(var("apply"), tuple(vec![failing, int(0)]))).unwrap();
    assert_eq!(evaluation.raised.map(|e| e.to_string()), Some("Div".into()));
}

#[test]
fn step_limit_stops_runaway_programs() {
    let options = InterpreterOptions { max_steps: Some(1_000), ..InterpreterOptions::default() };
    let mut interp = Interpreter::with_options(options);
    interp.interpret(&fun("spin", vec![(vec![p_var("n")], app(var("spin"), var("n")))])).unwrap();
    let err = interp.interpret(&val_named("never", app(var("spin"), int(0)))).unwrap_err();
    assert_eq!(err, InterpreterError::Evaluation(EvaluationError::StepLimit { steps: 1_000 }));
    assert_eq!(err.to_string(), "evaluation failed: Evaluation stopped after 1000 steps.");
    assert!(interp.value("never").is_none());
}

#[test]
fn evaluations_report_store_and_generation_changes() {
    let mut interp = Interpreter::new();
    let allocated = interp.interpret(&val_named("cell", app(var("ref"), int(1)))).unwrap();
    assert_eq!(allocated.store_changes.len(), 1);
    let (addr, _) = &allocated.store_changes[0];
    let addr = *addr;

    let written = interp.interpret(&val(p_wild(), infix(":=", var("cell"), int(9)))).unwrap();
    assert_eq!(written.store_changes.len(), 1);
    assert_eq!(written.store_changes[0].0, addr);
    assert!(written.store_changes[0].1.equals(&Value::Integer(9)));
    assert!(interp.store().get(addr).unwrap().equals(&Value::Integer(9)));

    let declared = interp.interpret(&exception("E", None)).unwrap();
    assert_eq!(declared.generation_changes, vec![("E".to_string(), 1)]);
    let again = interp.interpret(&exception("E", None)).unwrap();
    assert_eq!(again.generation_changes, vec![("E".to_string(), 2)]);
}

#[test]
fn raised_declarations_keep_their_store_effects() {
    let mut interp = Interpreter::new();
    interp.interpret(&val_named("cell", app(var("ref"), int(0)))).unwrap();
    let write_then_fail = seq(vec![infix(":=", var("cell"), int(3)), raise(var("Div"))]);
    let evaluation = interp.interpret(&val_named("x", write_then_fail)).unwrap();
    assert!(evaluation.has_thrown());
    assert!(interp.value("x").is_none());
    interp.interpret_expr(app(var("!"), var("cell"))).unwrap();
    assert_eq!(shown(&interp, "it"), "3");
}

#[test]
fn while_loops_and_printing() {
    let mut interp = Interpreter::new();
    interp.interpret(&val_named("i", app(var("ref"), int(0)))).unwrap();
    let cond = infix("<", app(var("!"), var("i")), int(3));
    let body = seq(vec![
        app(var("print"), string("tick\n")),
        infix(":=", var("i"), infix("+", app(var("!"), var("i")), int(1))),
    ]);
    let evaluation = interp.interpret_expr(while_do(cond, body)).unwrap();
    let output: Vec<&str> = evaluation
        .warnings
        .iter()
        .filter(|w| w.kind == WarningKind::Output)
        .map(|w| w.message.as_str())
        .collect();
    assert_eq!(output, vec!["tick\n"; 3]);
    assert_eq!(shown(&interp, "it"), "()");
}

#[test]
fn strings_and_characters() {
    let mut interp = Interpreter::new();
    interp.interpret(&val_named("cs", app(var("explode"), string("ab")))).unwrap();
    assert_eq!(shown(&interp, "cs"), "[#\"a\", #\"b\"]");
    interp.interpret(&val_named("back", app(var("implode"), var("cs")))).unwrap();
    assert_eq!(shown(&interp, "back"), "\"ab\"");
    interp.interpret(&val_named("n", app(var("size"), var("back")))).unwrap();
    assert_eq!(shown(&interp, "n"), "2");
    interp.interpret(&val_named("o", app(var("ord"), chr('A')))).unwrap();
    assert_eq!(shown(&interp, "o"), "65");
}

#[test]
fn closures_capture_their_definition_scope() {
    let mut interp = Interpreter::new();
    interp.interpret(&val_named("k", int(10))).unwrap();
    interp.interpret(&fun("addk", vec![(vec![p_var("x")], infix("+", var("x"), var("k")))])).unwrap();
    interp.interpret(&val_named("k", int(100))).unwrap();
    interp.interpret_expr(app(var("addk"), int(1))).unwrap();
    assert_eq!(shown(&interp, "it"), "11");
}

#[test]
fn curried_functions_take_arguments_one_at_a_time() {
    let mut interp = Interpreter::new();
    let power = fun(
        "power",
        vec![
            (vec![p_var("b"), p_int(0)], int(1)),
            (
                vec![p_var("b"), p_var("e")],
                infix("*", var("b"), app(app(var("power"), var("b")), infix("-", var("e"), int(1)))),
            ),
        ],
    );
    interp.interpret(&power).unwrap();
    assert_eq!(interp.static_type("power").as_deref(), Some("int -> int -> int"));
    interp.interpret_expr(app(app(var("power"), int(2)), int(10))).unwrap();
    assert_eq!(shown(&interp, "it"), "1024");
}

#[test]
fn evaluation_refuses_to_rebind_fixed_names() {
    let mut interp = Interpreter::new();
    let refused = |r: Result<_, EvaluationError>| match r {
        Err(EvaluationError::IllegalRebind { name, .. }) => name,
        other => panic!("expected a rebind error, got {other:?}"),
    };
    assert_eq!(refused(interp.evaluate(&exception("true", None))), "true");
    assert_eq!(refused(interp.evaluate(&exception_alias("nil", "Div"))), "nil");
    assert_eq!(refused(interp.evaluate(&datatype(&[], "t", vec![("A", None), ("::", None)]))), "::");
    assert_eq!(refused(interp.evaluate(&val(p_as("false", p_wild()), int(1)))), "false");
    assert_eq!(refused(interp.evaluate(&fun("=", vec![(vec![p_var("x")], var("x"))]))), "=");

    interp.interpret_expr(var("true")).unwrap();
    assert_eq!(shown(&interp, "it"), "true");
    assert!(interp.value("A").is_none());
}
