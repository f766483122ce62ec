//! Builders for core-form trees, including the rewrites of derived forms.
//!
//! A desugaring front end (and most tests) build trees through these helpers:
//! - tuples become records labelled `"1"..="n"`, `()` the empty record
//! - `[a, b]` becomes `a :: b :: nil`
//! - `if`, `case`, `andalso`, `orelse`, `(a; b)` become applications of `fn`
//! - `fun` clauses become `val rec` bindings of nested lambdas
//! - `while` becomes a recursive local function
//! - `#lab` becomes `fn {lab = x, ...} => x`

use crate::ast::*;
use std::rc::Rc;

fn expr(kind: ExprKind) -> Rc<Expr> {
    Rc::new(Expr::new(kind))
}

fn decl(kind: DeclKind) -> Rc<Decl> {
    Rc::new(Decl::new(kind))
}

// Expressions

pub fn int(n: i64) -> Rc<Expr> {
    expr(ExprKind::Constant(Constant::Int(n)))
}
pub fn real(x: f64) -> Rc<Expr> {
    expr(ExprKind::Constant(Constant::Real(x)))
}
pub fn word(w: u64) -> Rc<Expr> {
    expr(ExprKind::Constant(Constant::Word(w)))
}
pub fn chr(c: char) -> Rc<Expr> {
    expr(ExprKind::Constant(Constant::Char(c)))
}
pub fn string(s: &str) -> Rc<Expr> {
    expr(ExprKind::Constant(Constant::Str(s.to_string())))
}

/// An identifier; `"S.x"` is read as a qualified name.
pub fn var(name: &str) -> Rc<Expr> {
    expr(ExprKind::Identifier(LongId::parse(name)))
}

pub fn app(func: Rc<Expr>, arg: Rc<Expr>) -> Rc<Expr> {
    expr(ExprKind::Apply { func, arg })
}

/// Infix application `a op b`, i.e. `op (a, b)`.
pub fn infix(op: &str, a: Rc<Expr>, b: Rc<Expr>) -> Rc<Expr> {
    app(expr(ExprKind::Identifier(LongId::simple(op))), tuple(vec![a, b]))
}

pub fn unit() -> Rc<Expr> {
    expr(ExprKind::Record(Vec::new()))
}

pub fn tuple(items: Vec<Rc<Expr>>) -> Rc<Expr> {
    expr(ExprKind::Record(
        items.into_iter().enumerate().map(|(i, e)| ((i + 1).to_string(), e)).collect(),
    ))
}

pub fn record(fields: Vec<(&str, Rc<Expr>)>) -> Rc<Expr> {
    expr(ExprKind::Record(fields.into_iter().map(|(l, e)| (l.to_string(), e)).collect()))
}

pub fn list(items: Vec<Rc<Expr>>) -> Rc<Expr> {
    items.into_iter().rev().fold(var("nil"), |tail, head| infix("::", head, tail))
}

pub fn rule(pattern: Pattern, body: Rc<Expr>) -> Rule {
    Rule { pattern, body }
}

pub fn matching(rules: Vec<Rule>) -> Rc<Match> {
    Rc::new(Match { rules, span: Default::default() })
}

pub fn lambda(rules: Vec<Rule>) -> Rc<Expr> {
    expr(ExprKind::Lambda(matching(rules)))
}

/// `fn pat => body`
pub fn lam(pattern: Pattern, body: Rc<Expr>) -> Rc<Expr> {
    lambda(vec![rule(pattern, body)])
}

pub fn case(scrutinee: Rc<Expr>, rules: Vec<Rule>) -> Rc<Expr> {
    app(lambda(rules), scrutinee)
}

pub fn if_then_else(cond: Rc<Expr>, then: Rc<Expr>, otherwise: Rc<Expr>) -> Rc<Expr> {
    case(cond, vec![rule(p_con0("true"), then), rule(p_con0("false"), otherwise)])
}

pub fn andalso(a: Rc<Expr>, b: Rc<Expr>) -> Rc<Expr> {
    if_then_else(a, b, var("false"))
}

pub fn orelse(a: Rc<Expr>, b: Rc<Expr>) -> Rc<Expr> {
    if_then_else(a, var("true"), b)
}

/// `(e1; e2; ...; en)`
pub fn seq(mut items: Vec<Rc<Expr>>) -> Rc<Expr> {
    let last = items.pop().unwrap_or_else(unit);
    items.into_iter().rev().fold(last, |rest, e| case(e, vec![rule(p_wild(), rest)]))
}

pub fn let_in(decls: Vec<Rc<Decl>>, body: Rc<Expr>) -> Rc<Expr> {
    let decl = if decls.len() == 1 {
        decls.into_iter().next().unwrap_or_else(|| decl(DeclKind::Empty))
    } else {
        sequence(decls)
    };
    expr(ExprKind::Let { decl, body })
}

pub fn typed(e: Rc<Expr>, ty: TypeExpr) -> Rc<Expr> {
    expr(ExprKind::Typed { expr: e, ty })
}

pub fn raise(e: Rc<Expr>) -> Rc<Expr> {
    expr(ExprKind::Raise(e))
}

pub fn handle(e: Rc<Expr>, rules: Vec<Rule>) -> Rc<Expr> {
    expr(ExprKind::Handle { expr: e, handler: matching(rules) })
}

/// `#label`
pub fn selector(label: &str) -> Rc<Expr> {
    lam(p_record(vec![(label, p_var("__sel"))], false), var("__sel"))
}

/// `while cond do body`
pub fn while_do(cond: Rc<Expr>, body: Rc<Expr>) -> Rc<Expr> {
    let again = app(var("__while"), unit());
    let step = lam(p_unit(), if_then_else(cond, seq(vec![body, again.clone()]), unit()));
    let_in(vec![val_rec("__while", step)], again)
}

// Patterns

fn pat(kind: PatternKind) -> Pattern {
    Pattern::new(kind)
}

pub fn p_wild() -> Pattern {
    pat(PatternKind::Wildcard)
}
pub fn p_var(name: &str) -> Pattern {
    pat(PatternKind::Identifier(LongId::simple(name)))
}
/// A nullary constructor (or exception) pattern; resolved by the same rule as [`p_var`].
pub fn p_con0(name: &str) -> Pattern {
    pat(PatternKind::Identifier(LongId::parse(name)))
}
pub fn p_con(name: &str, arg: Pattern) -> Pattern {
    pat(PatternKind::Constructor { name: LongId::parse(name), arg: Box::new(arg) })
}
pub fn p_int(n: i64) -> Pattern {
    pat(PatternKind::Constant(Constant::Int(n)))
}
pub fn p_string(s: &str) -> Pattern {
    pat(PatternKind::Constant(Constant::Str(s.to_string())))
}
pub fn p_char(c: char) -> Pattern {
    pat(PatternKind::Constant(Constant::Char(c)))
}
pub fn p_unit() -> Pattern {
    pat(PatternKind::Record { fields: Vec::new(), complete: true })
}
pub fn p_tuple(items: Vec<Pattern>) -> Pattern {
    pat(PatternKind::Record {
        fields: items.into_iter().enumerate().map(|(i, p)| ((i + 1).to_string(), p)).collect(),
        complete: true,
    })
}
pub fn p_record(fields: Vec<(&str, Pattern)>, complete: bool) -> Pattern {
    pat(PatternKind::Record {
        fields: fields.into_iter().map(|(l, p)| (l.to_string(), p)).collect(),
        complete,
    })
}
pub fn p_cons(head: Pattern, tail: Pattern) -> Pattern {
    p_con("::", p_tuple(vec![head, tail]))
}
pub fn p_list(items: Vec<Pattern>) -> Pattern {
    items.into_iter().rev().fold(p_con0("nil"), |tail, head| p_cons(head, tail))
}
pub fn p_as(name: &str, pattern: Pattern) -> Pattern {
    pat(PatternKind::Layered { name: name.to_string(), ty: None, pattern: Box::new(pattern) })
}
pub fn p_typed(pattern: Pattern, ty: TypeExpr) -> Pattern {
    pat(PatternKind::Typed { pattern: Box::new(pattern), ty })
}

// Declarations

pub fn val(pattern: Pattern, e: Rc<Expr>) -> Rc<Decl> {
    decl(DeclKind::Value {
        tyvars: Vec::new(),
        bindings: vec![ValueBinding { recursive: false, pattern, expr: e }],
    })
}

/// `val x = e`
pub fn val_named(name: &str, e: Rc<Expr>) -> Rc<Decl> {
    val(p_var(name), e)
}

pub fn val_rec(name: &str, e: Rc<Expr>) -> Rc<Decl> {
    decl(DeclKind::Value {
        tyvars: Vec::new(),
        bindings: vec![ValueBinding { recursive: true, pattern: p_var(name), expr: e }],
    })
}

/// One `fun` clause: argument patterns and body.
pub type Clause = (Vec<Pattern>, Rc<Expr>);

fn fun_lambda(clauses: Vec<Clause>) -> Rc<Expr> {
    let arity = clauses.first().map(|(ps, _)| ps.len()).unwrap_or(1);
    if arity == 1 {
        return lambda(
            clauses
                .into_iter()
                .map(|(mut ps, body)| rule(ps.pop().unwrap_or_else(p_wild), body))
                .collect(),
        );
    }
    let names: Vec<String> = (1..=arity).map(|i| format!("__arg{i}")).collect();
    let inner = case(
        tuple(names.iter().map(|n| var(n)).collect()),
        clauses.into_iter().map(|(ps, body)| rule(p_tuple(ps), body)).collect(),
    );
    names.iter().rev().fold(inner, |body, n| lam(p_var(n), body))
}

/// `fun f p1 ... pn = e | f q1 ... qn = e' | ...`
pub fn fun(name: &str, clauses: Vec<Clause>) -> Rc<Decl> {
    funs(vec![(name, clauses)])
}

/// Mutually recursive `fun f ... and g ...`.
pub fn funs(group: Vec<(&str, Vec<Clause>)>) -> Rc<Decl> {
    decl(DeclKind::Value {
        tyvars: Vec::new(),
        bindings: group
            .into_iter()
            .map(|(name, clauses)| ValueBinding {
                recursive: true,
                pattern: p_var(name),
                expr: fun_lambda(clauses),
            })
            .collect(),
    })
}

pub fn datatype(tyvars: &[&str], name: &str, constructors: Vec<(&str, Option<TypeExpr>)>) -> Rc<Decl> {
    decl(DeclKind::Datatype {
        bindings: vec![DatatypeBinding {
            tyvars: tyvars.iter().map(|s| s.to_string()).collect(),
            name: name.to_string(),
            constructors: constructors
                .into_iter()
                .map(|(n, arg)| ConstructorBinding { name: n.to_string(), arg })
                .collect(),
        }],
        with_types: Vec::new(),
    })
}

pub fn type_alias(tyvars: &[&str], name: &str, ty: TypeExpr) -> Rc<Decl> {
    decl(DeclKind::Type(vec![TypeBinding {
        tyvars: tyvars.iter().map(|s| s.to_string()).collect(),
        name: name.to_string(),
        ty,
    }]))
}

pub fn exception(name: &str, arg: Option<TypeExpr>) -> Rc<Decl> {
    decl(DeclKind::Exception(vec![ExceptionBinding::Direct { name: name.to_string(), arg }]))
}

pub fn exception_alias(name: &str, original: &str) -> Rc<Decl> {
    decl(DeclKind::Exception(vec![ExceptionBinding::Alias {
        name: name.to_string(),
        original: LongId::parse(original),
    }]))
}

pub fn sequence(decls: Vec<Rc<Decl>>) -> Rc<Decl> {
    decl(DeclKind::Sequence(decls))
}

pub fn local(d: Rc<Decl>, body: Rc<Decl>) -> Rc<Decl> {
    decl(DeclKind::Local { decl: d, body })
}

pub fn structure(name: &str, body: Rc<Decl>) -> Rc<Decl> {
    decl(DeclKind::Structure(vec![StructureBinding {
        name: name.to_string(),
        body: StructureExpr::Struct(body),
    }]))
}

pub fn open(paths: &[&str]) -> Rc<Decl> {
    decl(DeclKind::Open(paths.iter().map(|p| LongId::parse(p)).collect()))
}

pub fn infix_decl(precedence: u8, names: &[&str]) -> Rc<Decl> {
    decl(DeclKind::Infix { precedence, names: names.iter().map(|s| s.to_string()).collect() })
}

// Types

pub fn t_var(name: &str) -> TypeExpr {
    TypeExpr::Var(name.to_string())
}
pub fn t_con(name: &str, args: Vec<TypeExpr>) -> TypeExpr {
    TypeExpr::Constructor { name: LongId::parse(name), args }
}
pub fn t_name(name: &str) -> TypeExpr {
    t_con(name, Vec::new())
}
pub fn t_fun(a: TypeExpr, b: TypeExpr) -> TypeExpr {
    TypeExpr::Function(Box::new(a), Box::new(b))
}
pub fn t_tuple(items: Vec<TypeExpr>) -> TypeExpr {
    TypeExpr::Record(items.into_iter().enumerate().map(|(i, t)| ((i + 1).to_string(), t)).collect())
}
pub fn t_record(fields: Vec<(&str, TypeExpr)>) -> TypeExpr {
    TypeExpr::Record(fields.into_iter().map(|(l, t)| (l.to_string(), t)).collect())
}
