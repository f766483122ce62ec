//! Dynamic pattern matching.

use crate::error::EvaluationError;
use crate::state::{IdentifierStatus, State};
use crate::store::Store;
use crate::value::{Value, WORD_MASK};
use smli_ast::ast::{Constant, LongId, Pattern, PatternKind};

pub type Bindings = Vec<(String, Value)>;

/// Matches `value` against `pattern`. `Ok(None)` is an ordinary failed
/// match; `Err` means the pattern mentions something the state cannot resolve.
pub fn matches(
    state: &State,
    store: &Store,
    pattern: &Pattern,
    value: &Value,
) -> Result<Option<Bindings>, EvaluationError> {
    let mut out = Vec::new();
    Ok(match_into(state, store, pattern, value, &mut out)?.then_some(out))
}

fn match_into(
    state: &State,
    store: &Store,
    pattern: &Pattern,
    value: &Value,
    out: &mut Bindings,
) -> Result<bool, EvaluationError> {
    match &pattern.kind {
        PatternKind::Wildcard => Ok(true),
        PatternKind::Constant(c) => Ok(constant_matches(c, value)),
        PatternKind::Identifier(id) => match constructor(state, id, pattern)? {
            Some(ctor) => Ok(ctor.construct().equals(value)),
            None => {
                out.push((id.name.clone(), value.clone()));
                Ok(true)
            }
        },
        PatternKind::Record { fields, complete } => {
            let Value::Record(actual) = value else { return Ok(false) };
            if *complete && actual.len() != fields.len() {
                return Ok(false);
            }
            for (label, p) in fields {
                let Some(v) = actual.get(label) else { return Ok(false) };
                if !match_into(state, store, p, v, out)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        PatternKind::Constructor { name, arg } => {
            let Some(ctor) = constructor(state, name, pattern)? else {
                return Err(EvaluationError::internal(format!(
                    "\"{name}\" is not a constructor in pattern \"{pattern}\""
                )));
            };
            match (&ctor, value) {
                (Value::ValueConstructor(c), Value::Reference(addr))
                    if &*c.name == "ref" && c.generation == 0 =>
                {
                    let inner = store.get(*addr).ok_or_else(|| EvaluationError::Dereference {
                        value: value.to_string(),
                    })?;
                    match_into(state, store, arg, inner, out)
                }
                (Value::ValueConstructor(c), Value::Constructed(v))
                | (Value::ExceptionConstructor(c), Value::Exception(v)) => {
                    if c.name != v.name || c.generation != v.generation {
                        return Ok(false);
                    }
                    match &v.arg {
                        Some(inner) => match_into(state, store, arg, inner, out),
                        None => Ok(false),
                    }
                }
                _ => Ok(false),
            }
        }
        PatternKind::Layered { name, pattern: inner, .. } => {
            out.push((name.clone(), value.clone()));
            match_into(state, store, inner, value, out)
        }
        PatternKind::Typed { pattern: inner, .. } => match_into(state, store, inner, value, out),
    }
}

/// The constructor an identifier denotes, or `None` for a variable.
fn constructor(
    state: &State,
    id: &LongId,
    pattern: &Pattern,
) -> Result<Option<Value>, EvaluationError> {
    let found = state
        .lookup_dynamic_value(id)
        .map_err(|name| EvaluationError::UnboundModule { name, span: pattern.span })?;
    Ok(match found {
        Some((v, IdentifierStatus::ValueConstructor | IdentifierStatus::ExceptionConstructor)) => {
            Some(v.clone())
        }
        Some(_) | None if id.is_simple() => None,
        _ => return Err(EvaluationError::Unbound { name: id.to_string(), span: pattern.span }),
    })
}

fn constant_matches(c: &Constant, value: &Value) -> bool {
    match (c, value) {
        (Constant::Int(n), Value::Integer(m)) => n == m,
        (Constant::Real(x), Value::Real(y)) => x == y,
        (Constant::Word(w), Value::Word(v)) => (w & WORD_MASK) == *v,
        (Constant::Char(a), Value::Char(b)) => a == b,
        (Constant::Str(a), Value::String(b)) => a.as_str() == &**b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smli_ast::derived::*;
    use std::rc::Rc;

    fn with_list_constructors() -> State {
        let mut s = State::new();
        for (name, has_arg) in [("nil", false), ("::", true)] {
            s.set_dynamic_value(
                name,
                Value::ValueConstructor(Rc::new(crate::value::Constructor {
                    name: Rc::from(name),
                    has_arg,
                    generation: 0,
                })),
                IdentifierStatus::ValueConstructor,
            );
        }
        s
    }

    #[test]
    fn list_patterns_bind_head_and_tail() {
        let s = with_list_constructors();
        let v = Value::list(vec![Value::Integer(1), Value::Integer(2)]);
        let bindings = matches(&s, &Store::new(), &p_cons(p_var("x"), p_var("xs")), &v)
            .unwrap()
            .unwrap();
        assert_eq!(bindings[0].0, "x");
        assert!(bindings[0].1.equals(&Value::Integer(1)));
        assert!(bindings[1].1.equals(&Value::list(vec![Value::Integer(2)])));
    }

    #[test]
    fn mismatched_constructor_is_not_an_error() {
        let s = with_list_constructors();
        let v = Value::list(vec![]);
        assert!(matches(&s, &Store::new(), &p_cons(p_wild(), p_wild()), &v).unwrap().is_none());
        assert!(matches(&s, &Store::new(), &p_con0("nil"), &v).unwrap().is_some());
    }

    #[test]
    fn open_record_patterns_ignore_extra_fields() {
        let s = State::new();
        let v = Value::tuple(vec![Value::Integer(1), Value::Integer(2)]);
        let open = p_record(vec![("1", p_int(1))], false);
        let closed = p_record(vec![("1", p_int(1))], true);
        assert!(matches(&s, &Store::new(), &open, &v).unwrap().is_some());
        assert!(matches(&s, &Store::new(), &closed, &v).unwrap().is_none());
    }
}
