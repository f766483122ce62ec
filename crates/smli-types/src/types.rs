use std::collections::{BTreeMap, HashMap};

/// A type variable.
///
/// Names start with `'`, equality variables with `''`. Inference variables have
/// `generation == 0`; explicitly scoped user variables (`'a` in an annotation)
/// get a positive generation and are rigid: they unify only with themselves and
/// with flexible variables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TyVar {
    pub name: String,
    pub generation: u32,
}

impl TyVar {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), generation: 0 }
    }

    pub fn rigid(name: impl Into<String>, generation: u32) -> Self {
        Self { name: name.into(), generation }
    }

    pub fn admits_equality(&self) -> bool {
        self.name.starts_with("''")
    }

    pub fn is_rigid(&self) -> bool {
        self.generation > 0
    }

    /// Top-level variables left ungeneralized by the value restriction.
    pub fn is_free_name(&self) -> bool {
        self.name.starts_with("'~")
    }
}

/// A named type constructor applied to arguments. Identity is `(name, generation)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomType {
    pub name: String,
    pub args: Vec<Type>,
    pub generation: u32,
}

impl CustomType {
    pub fn same_constructor(&self, other: &CustomType) -> bool {
        self.name == other.name && self.generation == other.generation
    }
}

/// A record type. `row == None` means the record is complete; otherwise the
/// record may hold more fields, described by whatever `row` gets bound to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordType {
    pub fields: BTreeMap<String, Type>,
    pub row: Option<TyVar>,
}

impl RecordType {
    pub fn complete(fields: BTreeMap<String, Type>) -> Self {
        Self { fields, row: None }
    }

    pub fn is_complete(&self) -> bool {
        self.row.is_none()
    }

    /// `Some(n)` if the labels are exactly `"1"..="n"` with `n != 1`.
    pub fn tuple_arity(&self) -> Option<usize> {
        if !self.is_complete() || self.fields.len() == 1 {
            return None;
        }
        (1..=self.fields.len())
            .all(|i| self.fields.contains_key(&i.to_string()))
            .then_some(self.fields.len())
    }

    /// Tuple components in positional order.
    pub fn tuple_items(&self) -> Vec<&Type> {
        (1..=self.fields.len()).filter_map(|i| self.fields.get(&i.to_string())).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Var(TyVar),
    Custom(CustomType),
    Function(Box<Type>, Box<Type>),
    Record(RecordType),
    /// `∀var ∈ domain . body`; an empty domain means unrestricted.
    Quantified { var: TyVar, domain: Vec<Type>, body: Box<Type> },
}

impl Type {
    pub fn var(name: &str) -> Type {
        Type::Var(TyVar::new(name))
    }

    pub fn custom(name: &str, args: Vec<Type>, generation: u32) -> Type {
        Type::Custom(CustomType { name: name.to_string(), args, generation })
    }

    pub fn builtin(name: &str) -> Type {
        Type::custom(name, Vec::new(), 0)
    }

    pub fn int() -> Type {
        Type::builtin("int")
    }
    pub fn real() -> Type {
        Type::builtin("real")
    }
    pub fn word() -> Type {
        Type::builtin("word")
    }
    pub fn char() -> Type {
        Type::builtin("char")
    }
    pub fn string() -> Type {
        Type::builtin("string")
    }
    pub fn exn() -> Type {
        Type::builtin("exn")
    }
    pub fn bool() -> Type {
        Type::builtin("bool")
    }
    pub fn list(elem: Type) -> Type {
        Type::custom("list", vec![elem], 0)
    }
    pub fn reference(elem: Type) -> Type {
        Type::custom("ref", vec![elem], 0)
    }
    pub fn unit() -> Type {
        Type::Record(RecordType::default())
    }

    pub fn fun(a: Type, b: Type) -> Type {
        Type::Function(Box::new(a), Box::new(b))
    }

    pub fn tuple(items: Vec<Type>) -> Type {
        Type::Record(RecordType::complete(
            items.into_iter().enumerate().map(|(i, t)| ((i + 1).to_string(), t)).collect(),
        ))
    }

    /// Wraps `body` in one quantifier per variable, outermost first.
    pub fn quantify(vars: Vec<(TyVar, Vec<Type>)>, body: Type) -> Type {
        vars.into_iter().rev().fold(body, |body, (var, domain)| Type::Quantified {
            var,
            domain,
            body: Box::new(body),
        })
    }

    /// Leading quantifiers and the body underneath them.
    pub fn split_quantifiers(&self) -> (Vec<(&TyVar, &[Type])>, &Type) {
        let mut vars = Vec::new();
        let mut cur = self;
        while let Type::Quantified { var, domain, body } = cur {
            vars.push((var, domain.as_slice()));
            cur = &**body;
        }
        (vars, cur)
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Type::Record(r) if r.fields.is_empty() && r.is_complete())
    }

    /// Free type variables in first-occurrence order, rows excluded.
    pub fn ftv(&self) -> Vec<TyVar> {
        let mut out = Vec::new();
        self.collect_ftv(&mut Vec::new(), &mut out);
        out
    }

    fn collect_ftv(&self, bound: &mut Vec<TyVar>, out: &mut Vec<TyVar>) {
        match self {
            Type::Var(v) => {
                if !bound.contains(v) && !out.contains(v) {
                    out.push(v.clone());
                }
            }
            Type::Custom(c) => {
                for a in &c.args {
                    a.collect_ftv(bound, out);
                }
            }
            Type::Function(a, b) => {
                a.collect_ftv(bound, out);
                b.collect_ftv(bound, out);
            }
            Type::Record(r) => {
                for t in r.fields.values() {
                    t.collect_ftv(bound, out);
                }
            }
            Type::Quantified { var, body, .. } => {
                bound.push(var.clone());
                body.collect_ftv(bound, out);
                bound.pop();
            }
        }
    }

    /// Row variables of records that are still open.
    pub fn open_rows(&self) -> Vec<TyVar> {
        let mut out = Vec::new();
        self.walk(&mut |t| {
            if let Type::Record(RecordType { row: Some(r), .. }) = t {
                if !out.contains(r) {
                    out.push(r.clone());
                }
            }
        });
        out
    }

    /// True if `v` occurs anywhere in the type, as a type or row variable.
    pub fn mentions(&self, v: &TyVar) -> bool {
        let mut found = false;
        self.walk(&mut |t| match t {
            Type::Var(x) if x == v => found = true,
            Type::Record(RecordType { row: Some(r), .. }) if r == v => found = true,
            _ => {}
        });
        found
    }

    /// Pre-order traversal of every node.
    pub fn walk(&self, f: &mut dyn FnMut(&Type)) {
        f(self);
        match self {
            Type::Var(_) => {}
            Type::Custom(c) => {
                for a in &c.args {
                    a.walk(f);
                }
            }
            Type::Function(a, b) => {
                a.walk(f);
                b.walk(f);
            }
            Type::Record(r) => {
                for t in r.fields.values() {
                    t.walk(f);
                }
            }
            Type::Quantified { body, .. } => body.walk(f),
        }
    }

    /// Replaces every free occurrence of `var` by `replacement`.
    pub fn replace_var(&self, var: &TyVar, replacement: &Type) -> Type {
        match self {
            Type::Var(v) if v == var => replacement.clone(),
            Type::Var(_) => self.clone(),
            Type::Custom(c) => Type::Custom(CustomType {
                name: c.name.clone(),
                args: c.args.iter().map(|a| a.replace_var(var, replacement)).collect(),
                generation: c.generation,
            }),
            Type::Function(a, b) => {
                Type::fun(a.replace_var(var, replacement), b.replace_var(var, replacement))
            }
            Type::Record(r) => Type::Record(RecordType {
                fields: r
                    .fields
                    .iter()
                    .map(|(l, t)| (l.clone(), t.replace_var(var, replacement)))
                    .collect(),
                row: r.row.clone(),
            }),
            Type::Quantified { var: bound, .. } if bound == var => self.clone(),
            Type::Quantified { var: bound, domain, body } => Type::Quantified {
                var: bound.clone(),
                domain: domain.clone(),
                body: Box::new(body.replace_var(var, replacement)),
            },
        }
    }

    /// Simultaneous replacement of free variables.
    pub fn substitute(&self, map: &HashMap<TyVar, Type>) -> Type {
        if map.is_empty() {
            return self.clone();
        }
        match self {
            Type::Var(v) => map.get(v).cloned().unwrap_or_else(|| self.clone()),
            Type::Custom(c) => Type::Custom(CustomType {
                name: c.name.clone(),
                args: c.args.iter().map(|a| a.substitute(map)).collect(),
                generation: c.generation,
            }),
            Type::Function(a, b) => Type::fun(a.substitute(map), b.substitute(map)),
            Type::Record(r) => Type::Record(RecordType {
                fields: r.fields.iter().map(|(l, t)| (l.clone(), t.substitute(map))).collect(),
                row: r.row.clone(),
            }),
            Type::Quantified { var, domain, body } => {
                let mut inner = map.clone();
                inner.remove(var);
                Type::Quantified { var: var.clone(), domain: domain.clone(), body: Box::new(body.substitute(&inner)) }
            }
        }
    }

    /// Whether the custom type `(name, generation)` appears anywhere in the type.
    pub fn mentions_custom(&self, name: &str, generation: u32) -> bool {
        let mut found = false;
        self.walk(&mut |t| {
            if let Type::Custom(c) = t {
                if c.name == name && c.generation == generation {
                    found = true;
                }
            }
        });
        found
    }
}
