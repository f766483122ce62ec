//! Runtime values.

use crate::error::{EvaluationError, Warning};
use crate::options::InterpreterOptions;
use crate::state::{Generations, State};
use crate::store::Store;
use smli_ast::ast::Match;
use smli_ast::pretty::{escape_sml, print_real};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

pub const MIN_INT: i64 = -1_073_741_824;
pub const MAX_INT: i64 = 1_073_741_823;
pub const WORD_MASK: u64 = 0x7FFF_FFFF;

/// Nesting depth past which `show` prints `...`.
pub const SHOW_DEPTH: usize = 200;

/// A datatype or exception value: constructor name, optional argument and
/// the generation of the declaration that introduced the constructor.
#[derive(Debug, Clone)]
pub struct Constructed {
    pub name: Rc<str>,
    pub arg: Option<Value>,
    pub generation: u32,
}

impl Drop for Constructed {
    /// Constructor chains such as long lists can be arbitrarily deep; uniquely
    /// owned children are unlinked onto a worklist instead of dropped in place.
    fn drop(&mut self) {
        let Some(arg) = self.arg.take() else { return };
        let mut work = vec![arg];
        while let Some(v) = work.pop() {
            match v {
                Value::Constructed(c) | Value::Exception(c) => {
                    if let Ok(mut inner) = Rc::try_unwrap(c) {
                        work.extend(inner.arg.take());
                    }
                }
                Value::Record(fields) => {
                    if let Ok(fields) = Rc::try_unwrap(fields) {
                        work.extend(fields.into_values());
                    }
                }
                _ => {}
            }
        }
    }
}

/// A datatype or exception constructor used as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constructor {
    pub name: Rc<str>,
    pub has_arg: bool,
    pub generation: u32,
}

#[derive(Debug)]
pub struct Closure {
    pub env: State,
    /// Sibling bindings of a `val rec` group, rebound on every application.
    pub recursives: Rc<Vec<(String, Value)>>,
    pub body: Rc<Match>,
}

/// Result of a computation that may raise a language-level exception.
#[derive(Debug, Clone)]
pub enum Completion {
    Normal(Value),
    Raised(Value),
}

/// Everything a native function may touch while it runs.
pub struct NativeContext<'a> {
    pub store: &'a mut Store,
    pub generations: &'a mut Generations,
    pub warnings: &'a mut Vec<Warning>,
    pub options: &'a InterpreterOptions,
}

impl NativeContext<'_> {
    /// Applies `func` to `arg` on a nested machine that shares this store.
    pub fn call(&mut self, func: Value, arg: Value) -> Result<Completion, EvaluationError> {
        let mut machine = crate::eval::Machine::new(self.store, self.generations, self.options);
        machine.push_application(func, arg);
        let (outcome, warnings) = machine.run()?;
        self.warnings.extend(warnings);
        outcome.into_completion()
    }
}

type NativeFn = dyn Fn(Value, &mut NativeContext<'_>) -> Result<Completion, EvaluationError>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: Rc<str>,
    func: Rc<NativeFn>,
}

impl NativeFunction {
    pub fn new(
        name: &str,
        func: impl Fn(Value, &mut NativeContext<'_>) -> Result<Completion, EvaluationError> + 'static,
    ) -> Self {
        Self { name: Rc::from(name), func: Rc::new(func) }
    }

    pub fn call(&self, arg: Value, cx: &mut NativeContext<'_>) -> Result<Completion, EvaluationError> {
        (self.func)(arg, cx)
    }

    fn same(&self, other: &NativeFunction) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Word(u64),
    Char(char),
    String(Rc<str>),
    /// Records and tuples (labels `"1".."n"`); the empty record is `()`.
    Record(Rc<BTreeMap<String, Value>>),
    Reference(usize),
    Constructed(Rc<Constructed>),
    Exception(Rc<Constructed>),
    ValueConstructor(Rc<Constructor>),
    ExceptionConstructor(Rc<Constructor>),
    Closure(Rc<Closure>),
    Native(NativeFunction),
}

impl Value {
    pub fn unit() -> Value {
        Value::Record(Rc::new(BTreeMap::new()))
    }

    pub fn string(s: &str) -> Value {
        Value::String(Rc::from(s))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Record(Rc::new(
            items.into_iter().enumerate().map(|(i, v)| ((i + 1).to_string(), v)).collect(),
        ))
    }

    pub fn bool(b: bool) -> Value {
        Value::constructed(if b { "true" } else { "false" }, None, 0)
    }

    pub fn constructed(name: &str, arg: Option<Value>, generation: u32) -> Value {
        Value::Constructed(Rc::new(Constructed { name: Rc::from(name), arg, generation }))
    }

    pub fn exception(name: &str, arg: Option<Value>, generation: u32) -> Value {
        Value::Exception(Rc::new(Constructed { name: Rc::from(name), arg, generation }))
    }

    /// A builtin exception from the initial basis.
    pub fn builtin_exception(name: &str) -> Value {
        Value::exception(name, None, 0)
    }

    pub fn list(items: Vec<Value>) -> Value {
        items.into_iter().rev().fold(Value::constructed("nil", None, 0), |tail, head| {
            Value::constructed("::", Some(Value::tuple(vec![head, tail])), 0)
        })
    }

    /// Checked 31-bit integer; `None` on overflow.
    pub fn int(n: i64) -> Option<Value> {
        (MIN_INT..=MAX_INT).contains(&n).then_some(Value::Integer(n))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Constructed(c) if c.generation == 0 && c.arg.is_none() => match &*c.name {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Items of a `::`/`nil` chain.
    pub fn as_list(&self) -> Option<Vec<Value>> {
        let mut items = Vec::new();
        let mut cur = self.clone();
        loop {
            let next = match &cur {
                Value::Constructed(c) if c.generation == 0 && &*c.name == "nil" => return Some(items),
                Value::Constructed(c) if c.generation == 0 && &*c.name == "::" => {
                    let Some(Value::Record(pair)) = &c.arg else { return None };
                    items.push(pair.get("1")?.clone());
                    pair.get("2")?.clone()
                }
                _ => return None,
            };
            cur = next;
        }
    }

    pub fn field(&self, label: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.get(label),
            _ => None,
        }
    }

    /// Niladic constructors stand for the value they construct.
    pub fn construct(self) -> Value {
        match self {
            Value::ValueConstructor(c) if !c.has_arg => Value::Constructed(Rc::new(Constructed {
                name: c.name.clone(),
                arg: None,
                generation: c.generation,
            })),
            Value::ExceptionConstructor(c) if !c.has_arg => Value::Exception(Rc::new(Constructed {
                name: c.name.clone(),
                arg: None,
                generation: c.generation,
            })),
            v => v,
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, Value::Exception(_))
            || matches!(self, Value::ExceptionConstructor(c) if !c.has_arg)
    }

    /// Structural equality. References compare by address, functions by
    /// identity, and a niladic constructor equals the value it constructs.
    pub fn equals(&self, other: &Value) -> bool {
        let mut work: Vec<(Value, Value)> = vec![(self.clone(), other.clone())];
        while let Some((a, b)) = work.pop() {
            let (a, b) = (a.construct(), b.construct());
            let same = match (&a, &b) {
                (Value::Integer(x), Value::Integer(y)) => x == y,
                (Value::Real(x), Value::Real(y)) => x == y || x.to_bits() == y.to_bits(),
                (Value::Word(x), Value::Word(y)) => x == y,
                (Value::Char(x), Value::Char(y)) => x == y,
                (Value::String(x), Value::String(y)) => x == y,
                (Value::Reference(x), Value::Reference(y)) => x == y,
                (Value::Record(x), Value::Record(y)) => {
                    if x.len() != y.len() {
                        false
                    } else {
                        let mut ok = true;
                        for ((lx, vx), (ly, vy)) in x.iter().zip(y.iter()) {
                            if lx != ly {
                                ok = false;
                                break;
                            }
                            work.push((vx.clone(), vy.clone()));
                        }
                        ok
                    }
                }
                (Value::Constructed(x), Value::Constructed(y))
                | (Value::Exception(x), Value::Exception(y)) => {
                    if x.name != y.name || x.generation != y.generation {
                        false
                    } else {
                        match (&x.arg, &y.arg) {
                            (None, None) => true,
                            (Some(u), Some(v)) => {
                                work.push((u.clone(), v.clone()));
                                true
                            }
                            _ => false,
                        }
                    }
                }
                (Value::ValueConstructor(x), Value::ValueConstructor(y))
                | (Value::ExceptionConstructor(x), Value::ExceptionConstructor(y)) => x == y,
                (Value::Closure(x), Value::Closure(y)) => Rc::ptr_eq(x, y),
                (Value::Native(x), Value::Native(y)) => x.same(y),
                _ => false,
            };
            if !same {
                return false;
            }
        }
        true
    }

    /// `toString` with infix constructors resolved through `state` and
    /// references shown through `store` when given.
    pub fn show(&self, state: Option<&State>, store: Option<&Store>) -> String {
        Printer { state, store }.value(self, 0)
    }
}

struct Printer<'a> {
    state: Option<&'a State>,
    store: Option<&'a Store>,
}

fn constructor_name(name: &str, generation: u32) -> String {
    if generation == 0 {
        name.to_string()
    } else {
        format!("{name}/{generation}")
    }
}

impl Printer<'_> {
    fn atomic(&self, v: &Value, depth: usize) -> String {
        let needs_parens = match v {
            Value::Constructed(c) | Value::Exception(c) => {
                c.arg.is_some() && v.as_list().is_none()
            }
            Value::Reference(_) => self.store.is_some(),
            _ => false,
        };
        let s = self.value(v, depth);
        if needs_parens && !s.starts_with('(') {
            format!("({s})")
        } else {
            s
        }
    }

    fn value(&self, v: &Value, depth: usize) -> String {
        if depth > SHOW_DEPTH {
            return "...".into();
        }
        let depth = depth + 1;
        match v {
            Value::Integer(n) => n.to_string().replace('-', "~"),
            Value::Real(x) => print_real(*x),
            Value::Word(w) => format!("0w{w}"),
            Value::Char(c) => format!("#\"{}\"", escape_sml(&c.to_string())),
            Value::String(s) => format!("\"{}\"", escape_sml(s)),
            Value::Record(fields) => self.record(fields, depth),
            Value::Reference(addr) => match self.store.and_then(|s| s.get(*addr)) {
                Some(inner) => format!("ref {}", self.atomic(inner, depth)),
                None => format!("${addr}"),
            },
            Value::Constructed(c) | Value::Exception(c) => {
                if let Some(items) = v.as_list() {
                    let inner = items.iter().map(|i| self.value(i, depth)).collect::<Vec<_>>();
                    return format!("[{}]", inner.join(", "));
                }
                let name = constructor_name(&c.name, c.generation);
                match &c.arg {
                    None => name,
                    Some(arg) => match (self.infix(&c.name), arg) {
                        (true, Value::Record(pair)) if pair.len() == 2 => {
                            match (pair.get("1"), pair.get("2")) {
                                (Some(l), Some(r)) => format!(
                                    "({} {name} {})",
                                    self.atomic(l, depth),
                                    self.atomic(r, depth)
                                ),
                                _ => format!("{name} {}", self.atomic(arg, depth)),
                            }
                        }
                        _ => format!("{name} {}", self.atomic(arg, depth)),
                    },
                }
            }
            Value::ValueConstructor(c) | Value::ExceptionConstructor(c) => {
                constructor_name(&c.name, c.generation)
            }
            Value::Closure(_) | Value::Native(_) => "fn".into(),
        }
    }

    fn infix(&self, name: &str) -> bool {
        self.state.and_then(|s| s.get_infix_status(name)).is_some_and(|i| i.infix)
    }

    fn record(&self, fields: &BTreeMap<String, Value>, depth: usize) -> String {
        if fields.is_empty() {
            return "()".into();
        }
        let n = fields.len();
        let is_tuple = n != 1 && (1..=n).all(|i| fields.contains_key(&i.to_string()));
        if is_tuple {
            let items = (1..=n)
                .filter_map(|i| fields.get(&i.to_string()))
                .map(|v| self.value(v, depth))
                .collect::<Vec<_>>();
            return format!("({})", items.join(", "));
        }
        let items = fields
            .iter()
            .map(|(l, v)| format!("{l} = {}", self.value(v, depth)))
            .collect::<Vec<_>>();
        format!("{{{}}}", items.join(", "))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.show(None, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn prints_values_in_sml_notation() {
        assert_eq!(Value::Integer(-3).to_string(), "~3");
        assert_eq!(Value::Real(2.0).to_string(), "2.0");
        assert_eq!(Value::Word(7).to_string(), "0w7");
        assert_eq!(Value::Char('c').to_string(), "#\"c\"");
        assert_eq!(Value::string("s\n").to_string(), "\"s\\n\"");
        assert_eq!(Value::unit().to_string(), "()");
        assert_eq!(Value::tuple(vec![Value::Integer(1), Value::Integer(2)]).to_string(), "(1, 2)");
        assert_eq!(
            Value::list(vec![Value::Integer(1), Value::Integer(2)]).to_string(),
            "[1, 2]"
        );
        let nested = Value::constructed(
            "Foo",
            Some(Value::constructed("Bar", Some(Value::Integer(1)), 0)),
            0,
        );
        assert_eq!(nested.to_string(), "Foo (Bar 1)");
        assert_eq!(Value::exception("E", None, 2).to_string(), "E/2");
        assert_eq!(Value::Reference(3).to_string(), "$3");
    }

    #[test]
    fn records_print_with_labels() {
        let mut fields = BTreeMap::new();
        fields.insert("a".to_string(), Value::Integer(1));
        fields.insert("b".to_string(), Value::string("x"));
        assert_eq!(Value::Record(Rc::new(fields)).to_string(), "{a = 1, b = \"x\"}");
    }

    #[test]
    fn niladic_constructor_equals_its_value() {
        let ctor = Value::ValueConstructor(Rc::new(Constructor {
            name: Rc::from("nil"),
            has_arg: false,
            generation: 0,
        }));
        assert!(Value::constructed("nil", None, 0).equals(&ctor));
        assert!(ctor.equals(&Value::constructed("nil", None, 0)));
        assert!(!Value::constructed("nil", None, 1).equals(&ctor));
    }

    #[test]
    fn deep_chains_print_to_a_bounded_depth() {
        let mut v = Value::constructed("Z", None, 1);
        for _ in 0..100_000 {
            v = Value::constructed("S", Some(v), 1);
        }
        let s = v.to_string();
        assert!(s.starts_with("S/1 (S/1 ("));
        assert!(s.ends_with("...))"));
        drop(v);
    }

    #[test]
    fn int_range_is_31_bits() {
        assert!(Value::int(MAX_INT).is_some());
        assert!(Value::int(MAX_INT + 1).is_none());
        assert!(Value::int(MIN_INT).is_some());
    }
}
