//! Core abstract syntax for the smli interpreter.
//!
//! The tree defined here is what remains after parsing and desugaring: tuples,
//! lists, `if`, `case`, `andalso`/`orelse`, `while`, sequences, `#label`
//! selectors and curried `fun` clauses have already been rewritten into the
//! handful of core forms below. See [`derived`] for builders that produce
//! exactly those rewrites.

pub mod derived;

pub mod span {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
    pub struct Span {
        pub offset: usize,
        pub len: usize,
    }
    impl Span {
        pub fn new(offset: usize, len: usize) -> Self {
            Self { offset, len }
        }
    }
}

pub mod ast {
    use crate::span::Span;
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use std::rc::Rc;

    /// Record label. Tuples use the labels `"1"`..`"n"`.
    pub type Label = String;

    /// A possibly structure-qualified identifier such as `S.T.x`.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct LongId {
        #[serde(default)]
        pub qualifiers: Vec<String>,
        pub name: String,
    }

    impl LongId {
        pub fn simple(name: impl Into<String>) -> Self {
            Self { qualifiers: Vec::new(), name: name.into() }
        }

        /// Splits `S.T.x` at dots. Symbolic identifiers containing no dot are kept whole.
        pub fn parse(path: &str) -> Self {
            let mut parts: Vec<String> = path.split('.').map(str::to_string).collect();
            if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
                return Self::simple(path);
            }
            let name = parts.pop().unwrap_or_default();
            Self { qualifiers: parts, name }
        }

        pub fn is_simple(&self) -> bool {
            self.qualifiers.is_empty()
        }
    }

    impl fmt::Display for LongId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            for q in &self.qualifiers {
                write!(f, "{q}.")?;
            }
            write!(f, "{}", self.name)
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub enum Constant {
        Int(i64),
        Real(f64),
        Word(u64),
        Char(char),
        Str(String),
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub enum TypeExpr {
        /// `'a` or `''a`; the name includes the quotes.
        Var(String),
        Record(Vec<(Label, TypeExpr)>),
        Function(Box<TypeExpr>, Box<TypeExpr>),
        Constructor { name: LongId, args: Vec<TypeExpr> },
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Pattern {
        pub kind: PatternKind,
        #[serde(default)]
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub enum PatternKind {
        Wildcard,
        Constant(Constant),
        /// A variable, or a nullary constructor/exception if the name resolves to one.
        Identifier(LongId),
        Record { fields: Vec<(Label, Pattern)>, complete: bool },
        Constructor { name: LongId, arg: Box<Pattern> },
        /// `x as pat`; `x` is always bound, whatever its current status.
        Layered { name: String, ty: Option<TypeExpr>, pattern: Box<Pattern> },
        Typed { pattern: Box<Pattern>, ty: TypeExpr },
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Rule {
        pub pattern: Pattern,
        pub body: Rc<Expr>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Match {
        pub rules: Vec<Rule>,
        #[serde(default)]
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Expr {
        pub kind: ExprKind,
        #[serde(default)]
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub enum ExprKind {
        Constant(Constant),
        Identifier(LongId),
        Record(Vec<(Label, Rc<Expr>)>),
        Let { decl: Rc<Decl>, body: Rc<Expr> },
        Typed { expr: Rc<Expr>, ty: TypeExpr },
        Apply { func: Rc<Expr>, arg: Rc<Expr> },
        Handle { expr: Rc<Expr>, handler: Rc<Match> },
        Raise(Rc<Expr>),
        Lambda(Rc<Match>),
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct ValueBinding {
        pub recursive: bool,
        pub pattern: Pattern,
        pub expr: Rc<Expr>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct TypeBinding {
        pub tyvars: Vec<String>,
        pub name: String,
        pub ty: TypeExpr,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct ConstructorBinding {
        pub name: String,
        pub arg: Option<TypeExpr>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct DatatypeBinding {
        pub tyvars: Vec<String>,
        pub name: String,
        pub constructors: Vec<ConstructorBinding>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub enum ExceptionBinding {
        Direct { name: String, arg: Option<TypeExpr> },
        Alias { name: String, original: LongId },
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub enum StructureExpr {
        Struct(Rc<Decl>),
        Path(LongId),
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct StructureBinding {
        pub name: String,
        pub body: StructureExpr,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Decl {
        #[serde(default)]
        pub id: u32,
        pub kind: DeclKind,
        #[serde(default)]
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub enum DeclKind {
        Value { tyvars: Vec<String>, bindings: Vec<ValueBinding> },
        Type(Vec<TypeBinding>),
        Datatype { bindings: Vec<DatatypeBinding>, with_types: Vec<TypeBinding> },
        DatatypeReplication { name: String, original: LongId },
        Exception(Vec<ExceptionBinding>),
        Local { decl: Rc<Decl>, body: Rc<Decl> },
        Open(Vec<LongId>),
        Sequence(Vec<Rc<Decl>>),
        Infix { precedence: u8, names: Vec<String> },
        Infixr { precedence: u8, names: Vec<String> },
        Nonfix(Vec<String>),
        Structure(Vec<StructureBinding>),
        Empty,
    }

    impl Expr {
        pub fn new(kind: ExprKind) -> Self {
            Self { kind, span: Span::default() }
        }
    }

    impl Pattern {
        pub fn new(kind: PatternKind) -> Self {
            Self { kind, span: Span::default() }
        }

        /// True for patterns that match every value without inspecting it.
        pub fn is_irrefutable_shape(&self) -> bool {
            match &self.kind {
                PatternKind::Wildcard => true,
                PatternKind::Typed { pattern, .. } | PatternKind::Layered { pattern, .. } => {
                    pattern.is_irrefutable_shape()
                }
                _ => false,
            }
        }
    }

    impl Decl {
        pub fn new(kind: DeclKind) -> Self {
            Self { id: 0, kind, span: Span::default() }
        }
    }

    impl fmt::Display for Constant {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&crate::pretty::print_constant(self))
        }
    }
    impl fmt::Display for TypeExpr {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&crate::pretty::print_type_expr(self))
        }
    }
    impl fmt::Display for Pattern {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&crate::pretty::print_pattern(self))
        }
    }
    impl fmt::Display for Expr {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&crate::pretty::print_expr(self))
        }
    }
    impl fmt::Display for Decl {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&crate::pretty::print_decl(self))
        }
    }
}

pub mod pretty {
    use crate::ast::*;

    /// Returns the labels of `fields` as a tuple arity if they are exactly `"1"..="n"`, n != 1.
    pub fn tuple_arity<T>(fields: &[(Label, T)]) -> Option<usize> {
        if fields.len() == 1 {
            return None;
        }
        let mut seen = vec![false; fields.len()];
        for (label, _) in fields {
            let idx: usize = label.parse().ok()?;
            if idx == 0 || idx > fields.len() || seen[idx - 1] {
                return None;
            }
            seen[idx - 1] = true;
        }
        Some(fields.len())
    }

    fn by_tuple_index<'a, T>(fields: &'a [(Label, T)]) -> Vec<&'a T> {
        let mut sorted: Vec<&(Label, T)> = fields.iter().collect();
        sorted.sort_by_key(|(l, _)| l.parse::<usize>().unwrap_or(0));
        sorted.into_iter().map(|(_, v)| v).collect()
    }

    pub fn escape_sml(s: &str) -> String {
        let mut out = String::new();
        for c in s.chars() {
            match c {
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                '\r' => out.push_str("\\r"),
                '\x07' => out.push_str("\\a"),
                '\x08' => out.push_str("\\b"),
                '\x0B' => out.push_str("\\v"),
                '\x0C' => out.push_str("\\f"),
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                c if (c as u32) < 32 => {
                    out.push_str("\\^");
                    out.push(char::from_u32(c as u32 + 64).unwrap_or('?'));
                }
                c if (c as u32) == 127 => out.push_str("\\127"),
                c => out.push(c),
            }
        }
        out
    }

    pub fn print_real(x: f64) -> String {
        let mut s = format!("{x}");
        if x.is_finite() && !s.contains('.') && !s.contains('e') {
            s.push_str(".0");
        }
        s.replace('-', "~")
    }

    pub fn print_constant(c: &Constant) -> String {
        match c {
            Constant::Int(n) => format!("{n}").replace('-', "~"),
            Constant::Real(x) => print_real(*x),
            Constant::Word(w) => format!("0w{w}"),
            Constant::Char(c) => format!("#\"{}\"", escape_sml(&c.to_string())),
            Constant::Str(s) => format!("\"{}\"", escape_sml(s)),
        }
    }

    pub fn print_type_expr(t: &TypeExpr) -> String {
        match t {
            TypeExpr::Var(v) => v.clone(),
            TypeExpr::Record(fields) if fields.is_empty() => "unit".into(),
            TypeExpr::Record(fields) => match tuple_arity(fields) {
                Some(_) => by_tuple_index(fields)
                    .into_iter()
                    .map(|t| match t {
                        TypeExpr::Function(..) | TypeExpr::Record(_) => {
                            format!("({})", print_type_expr(t))
                        }
                        _ => print_type_expr(t),
                    })
                    .collect::<Vec<_>>()
                    .join(" * "),
                None => {
                    let inner = fields
                        .iter()
                        .map(|(l, t)| format!("{l}: {}", print_type_expr(t)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{{{inner}}}")
                }
            },
            TypeExpr::Function(a, b) => {
                let left = match a.as_ref() {
                    TypeExpr::Function(..) => format!("({})", print_type_expr(a)),
                    _ => print_type_expr(a),
                };
                format!("{left} -> {}", print_type_expr(b))
            }
            TypeExpr::Constructor { name, args } => match args.len() {
                0 => name.to_string(),
                1 => match &args[0] {
                    TypeExpr::Function(..) | TypeExpr::Record(_) => {
                        format!("({}) {name}", print_type_expr(&args[0]))
                    }
                    a => format!("{} {name}", print_type_expr(a)),
                },
                _ => format!(
                    "({}) {name}",
                    args.iter().map(print_type_expr).collect::<Vec<_>>().join(", ")
                ),
            },
        }
    }

    fn atomic_pattern(p: &Pattern) -> String {
        match &p.kind {
            PatternKind::Wildcard
            | PatternKind::Constant(_)
            | PatternKind::Identifier(_)
            | PatternKind::Record { .. } => print_pattern(p),
            _ => format!("({})", print_pattern(p)),
        }
    }

    pub fn print_pattern(p: &Pattern) -> String {
        match &p.kind {
            PatternKind::Wildcard => "_".into(),
            PatternKind::Constant(c) => print_constant(c),
            PatternKind::Identifier(id) => id.to_string(),
            PatternKind::Record { fields, complete } => {
                if fields.is_empty() && *complete {
                    return "()".into();
                }
                if *complete && tuple_arity(fields).is_some() {
                    let inner = by_tuple_index(fields)
                        .into_iter()
                        .map(print_pattern)
                        .collect::<Vec<_>>()
                        .join(", ");
                    return format!("({inner})");
                }
                let mut parts: Vec<String> = fields
                    .iter()
                    .map(|(l, p)| format!("{l} = {}", print_pattern(p)))
                    .collect();
                if !complete {
                    parts.push("...".into());
                }
                format!("{{{}}}", parts.join(", "))
            }
            PatternKind::Constructor { name, arg } => {
                if let PatternKind::Record { fields, complete: true } = &arg.kind {
                    if fields.len() == 2 && name.name == "::" && tuple_arity(fields).is_some() {
                        let parts = by_tuple_index(fields);
                        return format!(
                            "{} :: {}",
                            atomic_pattern(parts[0]),
                            atomic_pattern(parts[1])
                        );
                    }
                }
                format!("{name} {}", atomic_pattern(arg))
            }
            PatternKind::Layered { name, ty, pattern } => match ty {
                Some(t) => format!("{name} : {} as {}", print_type_expr(t), print_pattern(pattern)),
                None => format!("{name} as {}", print_pattern(pattern)),
            },
            PatternKind::Typed { pattern, ty } => {
                format!("{} : {}", atomic_pattern(pattern), print_type_expr(ty))
            }
        }
    }

    pub fn print_match(m: &Match) -> String {
        m.rules
            .iter()
            .map(|r| format!("{} => {}", print_pattern(&r.pattern), print_expr(&r.body)))
            .collect::<Vec<_>>()
            .join(" | ")
    }

    pub fn print_expr(e: &Expr) -> String {
        match &e.kind {
            ExprKind::Constant(c) => print_constant(c),
            ExprKind::Identifier(id) => id.to_string(),
            ExprKind::Record(fields) => {
                if fields.is_empty() {
                    return "()".into();
                }
                if tuple_arity(fields).is_some() {
                    let inner = by_tuple_index(fields)
                        .into_iter()
                        .map(|e| print_expr(e))
                        .collect::<Vec<_>>()
                        .join(", ");
                    return format!("({inner})");
                }
                let inner = fields
                    .iter()
                    .map(|(l, e)| format!("{l} = {}", print_expr(e)))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{inner}}}")
            }
            ExprKind::Let { decl, body } => {
                format!("let {} in {} end", print_decl(decl), print_expr(body))
            }
            ExprKind::Typed { expr, ty } => {
                format!("({} : {})", print_expr(expr), print_type_expr(ty))
            }
            ExprKind::Apply { func, arg } => format!("({} {})", print_expr(func), print_expr(arg)),
            ExprKind::Handle { expr, handler } => {
                format!("({} handle {})", print_expr(expr), print_match(handler))
            }
            ExprKind::Raise(e) => format!("(raise {})", print_expr(e)),
            ExprKind::Lambda(m) => format!("(fn {})", print_match(m)),
        }
    }

    fn print_tyvar_seq(tyvars: &[String]) -> String {
        match tyvars.len() {
            0 => String::new(),
            1 => format!("{} ", tyvars[0]),
            _ => format!("({}) ", tyvars.join(", ")),
        }
    }

    pub fn print_decl(d: &Decl) -> String {
        match &d.kind {
            DeclKind::Value { tyvars, bindings } => {
                let mut out = format!("val {}", print_tyvar_seq(tyvars));
                for (i, b) in bindings.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" and ");
                    }
                    if b.recursive {
                        out.push_str("rec ");
                    }
                    out.push_str(&format!("{} = {}", print_pattern(&b.pattern), print_expr(&b.expr)));
                }
                out
            }
            DeclKind::Type(bindings) => format!("type {}", print_type_bindings(bindings)),
            DeclKind::Datatype { bindings, with_types } => {
                let body = bindings
                    .iter()
                    .map(|b| {
                        let ctors = b
                            .constructors
                            .iter()
                            .map(|c| match &c.arg {
                                Some(t) => format!("{} of {}", c.name, print_type_expr(t)),
                                None => c.name.clone(),
                            })
                            .collect::<Vec<_>>()
                            .join(" | ");
                        format!("{}{} = {}", print_tyvar_seq(&b.tyvars), b.name, ctors)
                    })
                    .collect::<Vec<_>>()
                    .join(" and ");
                if with_types.is_empty() {
                    format!("datatype {body}")
                } else {
                    format!("datatype {body} withtype {}", print_type_bindings(with_types))
                }
            }
            DeclKind::DatatypeReplication { name, original } => {
                format!("datatype {name} = datatype {original}")
            }
            DeclKind::Exception(bindings) => {
                let body = bindings
                    .iter()
                    .map(|b| match b {
                        ExceptionBinding::Direct { name, arg: Some(t) } => {
                            format!("{name} of {}", print_type_expr(t))
                        }
                        ExceptionBinding::Direct { name, arg: None } => name.clone(),
                        ExceptionBinding::Alias { name, original } => format!("{name} = {original}"),
                    })
                    .collect::<Vec<_>>()
                    .join(" and ");
                format!("exception {body}")
            }
            DeclKind::Local { decl, body } => {
                format!("local {} in {} end", print_decl(decl), print_decl(body))
            }
            DeclKind::Open(names) => format!(
                "open {}",
                names.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(" ")
            ),
            DeclKind::Sequence(decls) => {
                decls.iter().map(|d| print_decl(d)).collect::<Vec<_>>().join("; ")
            }
            DeclKind::Infix { precedence, names } => format!("infix {precedence} {}", names.join(" ")),
            DeclKind::Infixr { precedence, names } => {
                format!("infixr {precedence} {}", names.join(" "))
            }
            DeclKind::Nonfix(names) => format!("nonfix {}", names.join(" ")),
            DeclKind::Structure(bindings) => {
                let body = bindings
                    .iter()
                    .map(|b| match &b.body {
                        StructureExpr::Struct(d) => {
                            format!("{} = struct {} end", b.name, print_decl(d))
                        }
                        StructureExpr::Path(p) => format!("{} = {p}", b.name),
                    })
                    .collect::<Vec<_>>()
                    .join(" and ");
                format!("structure {body}")
            }
            DeclKind::Empty => String::new(),
        }
    }

    fn print_type_bindings(bindings: &[TypeBinding]) -> String {
        bindings
            .iter()
            .map(|b| format!("{}{} = {}", print_tyvar_seq(&b.tyvars), b.name, print_type_expr(&b.ty)))
            .collect::<Vec<_>>()
            .join(" and ")
    }
}
