//! The initial basis: builtin types, constructors, exceptions, operators and
//! their fixity.
//!
//! Every builtin consumes generation 0 of its name, statically for types and
//! dynamically for constructors and exceptions, so user declarations that
//! reuse a builtin name always get a distinct generation.

use crate::elab::ElabContext;
use crate::error::{EvaluationError, Warning, WarningKind};
use crate::state::{DatatypeInfo, Generations, IdentifierStatus, InfixStatus, State, TypeInfo};
use crate::value::{Completion, Constructor, NativeFunction, Value, WORD_MASK};
use smli_ast::span::Span;
use smli_types::{Equality, TyVar, Type};
use std::cmp::Ordering;
use std::rc::Rc;

pub const BUILTIN_EXCEPTIONS: [(&str, bool); 6] = [
    ("Match", false),
    ("Bind", false),
    ("Div", false),
    ("Overflow", false),
    ("Chr", false),
    ("Fail", true),
];

/// Builds the initial state, registering the builtin datatypes in `cx`.
pub fn initial_state(cx: &mut ElabContext, generations: &mut Generations) -> State {
    let mut state = State::new();
    builtin_types(&mut state, cx);
    builtin_constructors(&mut state, generations);
    builtin_exceptions(&mut state, cx, generations);
    builtin_values(&mut state);
    builtin_fixity(&mut state);
    state
}

fn tv(name: &str) -> TyVar {
    TyVar::new(name)
}

fn scheme(var: &str, domain: Vec<Type>, body: Type) -> Type {
    Type::quantify(vec![(tv(var), domain)], body)
}

fn builtin_types(state: &mut State, cx: &mut ElabContext) {
    let a = tv("'a");
    let simple = |body: Type, constructors: &[&str]| TypeInfo {
        params: Vec::new(),
        body,
        constructors: constructors.iter().map(|c| c.to_string()).collect(),
    };
    let infos = [
        ("unit", simple(Type::unit(), &[])),
        ("bool", simple(Type::bool(), &["true", "false"])),
        ("int", simple(Type::int(), &[])),
        ("word", simple(Type::word(), &[])),
        ("real", simple(Type::real(), &[])),
        ("string", simple(Type::string(), &[])),
        ("char", simple(Type::char(), &[])),
        ("exn", simple(Type::exn(), &[])),
        (
            "list",
            TypeInfo {
                params: vec![a.clone()],
                body: Type::list(Type::Var(a.clone())),
                constructors: vec!["nil".into(), "::".into()],
            },
        ),
        (
            "ref",
            TypeInfo {
                params: vec![a.clone()],
                body: Type::reference(Type::Var(a)),
                constructors: vec!["ref".into()],
            },
        ),
    ];
    for (name, info) in infos {
        cx.generations.next(name);
        state.set_dynamic_type(name, info.constructors.clone());
        state.set_static_type(name, info);
    }

    let datatypes: [(&str, &[(&str, bool)], Equality); 5] = [
        ("bool", &[("true", false), ("false", false)], Equality::IfArguments),
        ("list", &[("nil", false), ("::", true)], Equality::IfArguments),
        ("ref", &[("ref", true)], Equality::Always),
        ("real", &[], Equality::Never),
        ("exn", &[], Equality::Never),
    ];
    for (name, constructors, equality) in datatypes {
        let constructors = constructors.iter().map(|(c, arg)| (c.to_string(), *arg)).collect();
        cx.registry.insert(name, 0, DatatypeInfo { constructors, equality });
    }
}

fn builtin_constructors(state: &mut State, generations: &mut Generations) {
    let a = || Type::var("'a");
    let constructors = [
        ("true", Type::bool(), false),
        ("false", Type::bool(), false),
        ("nil", scheme("'a", Vec::new(), Type::list(a())), false),
        (
            "::",
            scheme("'a", Vec::new(), Type::fun(Type::tuple(vec![a(), Type::list(a())]), Type::list(a()))),
            true,
        ),
        ("ref", scheme("'a", Vec::new(), Type::fun(a(), Type::reference(a()))), true),
    ];
    for (name, ty, has_arg) in constructors {
        let ctor = Constructor { name: Rc::from(name), has_arg, generation: generations.next(name) };
        state.set_static_value(name, ty, IdentifierStatus::ValueConstructor);
        state.set_dynamic_value(name, Value::ValueConstructor(Rc::new(ctor)), IdentifierStatus::ValueConstructor);
    }
}

fn builtin_exceptions(state: &mut State, cx: &mut ElabContext, generations: &mut Generations) {
    for (name, has_arg) in BUILTIN_EXCEPTIONS {
        let ty = if has_arg { Type::fun(Type::string(), Type::exn()) } else { Type::exn() };
        let ctor = Constructor { name: Rc::from(name), has_arg, generation: generations.next(name) };
        state.set_static_exception(name, ty, cx.fresh_exception());
        state.set_dynamic_value(
            name,
            Value::ExceptionConstructor(Rc::new(ctor)),
            IdentifierStatus::ExceptionConstructor,
        );
    }
}

fn define(state: &mut State, ty: Type, f: NativeFunction) {
    let name = f.name.to_string();
    state.set_static_value(&name, ty, IdentifierStatus::ValueVariable);
    state.set_dynamic_value(&name, Value::Native(f), IdentifierStatus::ValueVariable);
}

fn builtin_values(state: &mut State) {
    let iwr = || vec![Type::int(), Type::word(), Type::real()];
    let iw = || vec![Type::int(), Type::word()];
    let ir = || vec![Type::int(), Type::real()];
    let ordered = || vec![Type::int(), Type::word(), Type::real(), Type::string(), Type::char()];
    let v = |name: &str| Type::var(name);
    let binary = |name: &str, result: Type| Type::fun(Type::tuple(vec![v(name), v(name)]), result);

    // + - * : 'iwr * 'iwr -> 'iwr
    for f in [
        arithmetic("+", |a, b| a + b, |a, b| a.wrapping_add(b), |a, b| a + b),
        arithmetic("-", |a, b| a - b, |a, b| a.wrapping_sub(b), |a, b| a - b),
        arithmetic("*", |a, b| a * b, |a, b| a.wrapping_mul(b), |a, b| a * b),
    ] {
        define(state, scheme("'iwr", iwr(), binary("'iwr", v("'iwr"))), f);
    }

    // div mod : 'iw * 'iw -> 'iw
    define(state, scheme("'iw", iw(), binary("'iw", v("'iw"))), integral("div", floor_div, |a, b| a / b));
    define(state, scheme("'iw", iw(), binary("'iw", v("'iw"))), integral("mod", floor_mod, |a, b| a % b));

    define(
        state,
        Type::fun(Type::tuple(vec![Type::real(), Type::real()]), Type::real()),
        NativeFunction::new("/", |arg, _| match pair("/", &arg)? {
            (Value::Real(a), Value::Real(b)) => normal(Value::Real(a / b)),
            _ => Err(mismatch("/", &arg)),
        }),
    );

    // ~ abs : 'ir -> 'ir
    define(
        state,
        scheme("'ir", ir(), Type::fun(v("'ir"), v("'ir"))),
        NativeFunction::new("~", |arg, _| match &arg {
            Value::Integer(n) => int_result(-n),
            Value::Real(x) => normal(Value::Real(-x)),
            _ => Err(mismatch("~", &arg)),
        }),
    );
    define(
        state,
        scheme("'ir", ir(), Type::fun(v("'ir"), v("'ir"))),
        NativeFunction::new("abs", |arg, _| match &arg {
            Value::Integer(n) => int_result(n.abs()),
            Value::Real(x) => normal(Value::Real(x.abs())),
            _ => Err(mismatch("abs", &arg)),
        }),
    );

    // < <= > >= : 'any * 'any -> bool
    for f in [
        comparison("<", Ordering::is_lt),
        comparison("<=", Ordering::is_le),
        comparison(">", Ordering::is_gt),
        comparison(">=", Ordering::is_ge),
    ] {
        define(state, scheme("'any", ordered(), binary("'any", Type::bool())), f);
    }

    // = <> : ''a * ''a -> bool
    define(
        state,
        scheme("''a", Vec::new(), binary("''a", Type::bool())),
        NativeFunction::new("=", |arg, _| {
            let (a, b) = pair("=", &arg)?;
            normal(Value::bool(a.equals(b)))
        }),
    );
    define(
        state,
        scheme("''a", Vec::new(), binary("''a", Type::bool())),
        NativeFunction::new("<>", |arg, _| {
            let (a, b) = pair("<>", &arg)?;
            normal(Value::bool(!a.equals(b)))
        }),
    );

    define(
        state,
        Type::fun(Type::tuple(vec![Type::string(), Type::string()]), Type::string()),
        NativeFunction::new("^", |arg, _| match pair("^", &arg)? {
            (Value::String(a), Value::String(b)) => normal(Value::string(&format!("{a}{b}"))),
            _ => Err(mismatch("^", &arg)),
        }),
    );
    define(
        state,
        Type::fun(Type::string(), Type::list(Type::char())),
        NativeFunction::new("explode", |arg, _| match &arg {
            Value::String(s) => normal(Value::list(s.chars().map(Value::Char).collect())),
            _ => Err(mismatch("explode", &arg)),
        }),
    );
    define(
        state,
        Type::fun(Type::list(Type::char()), Type::string()),
        NativeFunction::new("implode", |arg, _| {
            let items = arg.as_list().ok_or_else(|| mismatch("implode", &arg))?;
            let mut out = String::new();
            for item in items {
                match item {
                    Value::Char(c) => out.push(c),
                    other => return Err(mismatch("implode", &other)),
                }
            }
            normal(Value::string(&out))
        }),
    );
    define(
        state,
        Type::fun(Type::string(), Type::int()),
        NativeFunction::new("size", |arg, _| match &arg {
            Value::String(s) => int_result(s.chars().count() as i64),
            _ => Err(mismatch("size", &arg)),
        }),
    );
    define(
        state,
        Type::fun(Type::char(), Type::int()),
        NativeFunction::new("ord", |arg, _| match &arg {
            Value::Char(c) => normal(Value::Integer(*c as i64)),
            _ => Err(mismatch("ord", &arg)),
        }),
    );
    define(
        state,
        Type::fun(Type::int(), Type::char()),
        NativeFunction::new("chr", |arg, _| match &arg {
            Value::Integer(n) => match u8::try_from(*n) {
                Ok(b) => normal(Value::Char(char::from(b))),
                Err(_) => raise("Chr"),
            },
            _ => Err(mismatch("chr", &arg)),
        }),
    );
    define(
        state,
        Type::fun(Type::bool(), Type::bool()),
        NativeFunction::new("not", |arg, _| match arg.as_bool() {
            Some(b) => normal(Value::bool(!b)),
            None => Err(mismatch("not", &arg)),
        }),
    );

    // print printLn : 'a -> unit
    define(state, scheme("'a", Vec::new(), Type::fun(v("'a"), Type::unit())), output("print", ""));
    define(state, scheme("'a", Vec::new(), Type::fun(v("'a"), Type::unit())), output("printLn", "\n"));

    define(
        state,
        scheme("'a", Vec::new(), Type::fun(Type::tuple(vec![Type::reference(v("'a")), v("'a")]), Type::unit())),
        NativeFunction::new(":=", |arg, cx| match pair(":=", &arg)? {
            (Value::Reference(addr), v) if cx.store.set(*addr, v.clone()) => normal(Value::unit()),
            _ => Err(EvaluationError::BadAssignment { value: arg.to_string() }),
        }),
    );
    define(
        state,
        scheme("'a", Vec::new(), Type::fun(Type::reference(v("'a")), v("'a"))),
        NativeFunction::new("!", |arg, cx| {
            let found = match &arg {
                Value::Reference(addr) => cx.store.get(*addr).cloned(),
                _ => None,
            };
            found.map(Completion::Normal).ok_or_else(|| EvaluationError::Dereference { value: arg.to_string() })
        }),
    );
}

fn builtin_fixity(state: &mut State) {
    let table: [(u8, bool, &[&str]); 5] = [
        (7, false, &["*", "/", "div", "mod"]),
        (6, false, &["+", "-", "^"]),
        (5, true, &["::"]),
        (4, false, &["=", "<>", "<", ">", "<=", ">="]),
        (3, false, &[":="]),
    ];
    for (precedence, right_associative, names) in table {
        for name in names {
            state.set_infix_status(name, InfixStatus { infix: true, precedence, right_associative });
        }
    }
}

fn normal(v: Value) -> Result<Completion, EvaluationError> {
    Ok(Completion::Normal(v))
}

fn raise(name: &str) -> Result<Completion, EvaluationError> {
    Ok(Completion::Raised(Value::builtin_exception(name)))
}

fn int_result(n: i64) -> Result<Completion, EvaluationError> {
    match Value::int(n) {
        Some(v) => normal(v),
        None => raise("Overflow"),
    }
}

fn mismatch(name: &str, arg: &Value) -> EvaluationError {
    EvaluationError::internal(format!("builtin \"{name}\" applied to {arg}"))
}

fn pair<'v>(name: &str, arg: &'v Value) -> Result<(&'v Value, &'v Value), EvaluationError> {
    match (arg.field("1"), arg.field("2")) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(mismatch(name, arg)),
    }
}

fn arithmetic(
    name: &'static str,
    int: fn(i64, i64) -> i64,
    word: fn(u64, u64) -> u64,
    real: fn(f64, f64) -> f64,
) -> NativeFunction {
    NativeFunction::new(name, move |arg, _| match pair(name, &arg)? {
        (Value::Integer(a), Value::Integer(b)) => int_result(int(*a, *b)),
        (Value::Word(a), Value::Word(b)) => normal(Value::Word(word(*a, *b) & WORD_MASK)),
        (Value::Real(a), Value::Real(b)) => normal(Value::Real(real(*a, *b))),
        _ => Err(mismatch(name, &arg)),
    })
}

/// `div` and `mod`; both raise `Div` on a zero divisor.
fn integral(name: &'static str, int: fn(i64, i64) -> i64, word: fn(u64, u64) -> u64) -> NativeFunction {
    NativeFunction::new(name, move |arg, _| match pair(name, &arg)? {
        (Value::Integer(_), Value::Integer(0)) | (Value::Word(_), Value::Word(0)) => raise("Div"),
        (Value::Integer(a), Value::Integer(b)) => int_result(int(*a, *b)),
        (Value::Word(a), Value::Word(b)) => normal(Value::Word(word(*a, *b) & WORD_MASK)),
        _ => Err(mismatch(name, &arg)),
    })
}

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

fn floor_mod(a: i64, b: i64) -> i64 {
    a - b * floor_div(a, b)
}

fn comparison(name: &'static str, test: fn(Ordering) -> bool) -> NativeFunction {
    NativeFunction::new(name, move |arg, _| {
        let ordering = match pair(name, &arg)? {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Word(a), Value::Word(b)) => Some(a.cmp(b)),
            (Value::Real(a), Value::Real(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Char(a), Value::Char(b)) => Some(a.cmp(b)),
            _ => return Err(mismatch(name, &arg)),
        };
        normal(Value::bool(ordering.is_some_and(test)))
    })
}

/// Strings print raw, everything else as its display form.
fn output(name: &'static str, suffix: &'static str) -> NativeFunction {
    NativeFunction::new(name, move |arg, cx| {
        let text = match &arg {
            Value::String(s) => format!("{s}{suffix}"),
            other => format!("{}{suffix}", other.show(None, Some(&*cx.store))),
        };
        cx.warnings.push(Warning::new(WarningKind::Output, text, Span::default()));
        normal(Value::unit())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_division_rounds_toward_negative_infinity() {
        assert_eq!(floor_div(7, 2), 3);
        assert_eq!(floor_div(-7, 2), -4);
        assert_eq!(floor_mod(-7, 2), 1);
        assert_eq!(floor_mod(7, -2), -1);
    }

    #[test]
    fn builtins_take_generation_zero() {
        let mut cx = ElabContext::default();
        let mut generations = Generations::new();
        let state = initial_state(&mut cx, &mut generations);
        assert_eq!(generations.current("Match"), 1);
        assert_eq!(cx.generations.current("list"), 1);
        let (nil, status) = state.get_dynamic_value("nil").unwrap();
        assert_eq!(*status, IdentifierStatus::ValueConstructor);
        assert!(nil.clone().construct().equals(&Value::list(Vec::new())));
        assert!(state.get_infix_status("::").unwrap().right_associative);
    }
}
