//! Exhaustiveness and redundancy of matches.
//!
//! Patterns are lowered to a small constructor language and checked with
//! the usefulness algorithm: a match is exhaustive when a wildcard row is not
//! useful after all its rules, and a rule is redundant when it is not useful
//! after the rules before it. Datatype constructors know their siblings via
//! the datatype registry; exceptions and literals never form a complete set.
//! Exceptions are told apart by their declaration, so aliases coincide.

use crate::error::{Warning, WarningKind};
use crate::state::{DatatypeRegistry, IdentifierStatus, State};
use crate::value::WORD_MASK;
use smli_ast::ast::{Constant, Pattern, PatternKind};
use smli_ast::span::Span;
use smli_types::Type;
use std::collections::BTreeMap;
use std::rc::Rc;

pub const NOT_EXHAUSTIVE: &str = "Pattern matching is not exhaustive.";

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConKey {
    Ctor(String, u32),
    Exn(u32),
    Int(i64),
    Word(u64),
    Real(u64),
    Char(char),
    Str(String),
}

#[derive(Debug, Clone)]
struct Con {
    key: ConKey,
    arity: usize,
    /// Every constructor of the datatype; `None` for open domains.
    siblings: Option<Rc<Vec<(String, bool)>>>,
}

#[derive(Debug, Clone)]
enum Pat {
    Wild,
    Con(Con, Vec<Pat>),
    Record(BTreeMap<String, Pat>),
}

/// What a match is used for; handlers and bindings are checked differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRole {
    Function,
    Handler,
    Binding,
}

pub struct Checker<'a> {
    state: &'a State,
    registry: &'a DatatypeRegistry,
}

impl<'a> Checker<'a> {
    pub fn new(state: &'a State, registry: &'a DatatypeRegistry) -> Self {
        Self { state, registry }
    }

    /// Warnings for the rules of one match, redundancy first.
    pub fn check(&self, patterns: &[&Pattern], role: MatchRole, span: Span) -> Vec<Warning> {
        let rows: Vec<Vec<Pat>> = patterns.iter().map(|p| vec![self.lower(p)]).collect();
        let mut warnings = Vec::new();
        let mut unused_reported = false;
        for (j, row) in rows.iter().enumerate() {
            if useful(&rows[..j], row) {
                continue;
            }
            match (0..j).find(|&k| !useful(&rows[..=k], &[Pat::Wild])) {
                Some(k) => {
                    if !unused_reported {
                        unused_reported = true;
                        warnings.push(Warning::new(
                            WarningKind::Redundant,
                            format!("Rules after \"{}\" unused in pattern matching.", patterns[k]),
                            span,
                        ));
                    }
                }
                None => warnings.push(Warning::new(
                    WarningKind::Redundant,
                    format!("Duplicate rule for \"{}\" in pattern matching.", patterns[j]),
                    patterns[j].span,
                )),
            }
        }
        if role != MatchRole::Handler && useful(&rows, &[Pat::Wild]) {
            warnings.push(Warning::new(WarningKind::NonExhaustive, NOT_EXHAUSTIVE, span));
        }
        warnings
    }

    fn lower(&self, p: &Pattern) -> Pat {
        match &p.kind {
            PatternKind::Wildcard => Pat::Wild,
            PatternKind::Constant(c) => Pat::Con(
                Con {
                    key: match c {
                        Constant::Int(n) => ConKey::Int(*n),
                        Constant::Word(w) => ConKey::Word(w & WORD_MASK),
                        Constant::Real(x) => ConKey::Real(x.to_bits()),
                        Constant::Char(c) => ConKey::Char(*c),
                        Constant::Str(s) => ConKey::Str(s.clone()),
                    },
                    arity: 0,
                    siblings: None,
                },
                Vec::new(),
            ),
            PatternKind::Identifier(id) => match self.constructor(id, 0) {
                Some(con) => Pat::Con(con, Vec::new()),
                None => Pat::Wild,
            },
            PatternKind::Constructor { name, arg } => match self.constructor(name, 1) {
                Some(con) => Pat::Con(con, vec![self.lower(arg)]),
                None => Pat::Wild,
            },
            PatternKind::Record { fields, .. } => {
                Pat::Record(fields.iter().map(|(l, p)| (l.clone(), self.lower(p))).collect())
            }
            PatternKind::Layered { pattern, .. } | PatternKind::Typed { pattern, .. } => {
                self.lower(pattern)
            }
        }
    }

    fn constructor(&self, id: &smli_ast::ast::LongId, arity: usize) -> Option<Con> {
        let (ty, status) = self.state.lookup_static_value(id).ok()??;
        match status {
            IdentifierStatus::ValueVariable => None,
            IdentifierStatus::ExceptionConstructor => {
                let identity = self.state.lookup_static_exception(id).ok()??;
                Some(Con { key: ConKey::Exn(identity), arity, siblings: None })
            }
            IdentifierStatus::ValueConstructor => {
                let (_, body) = ty.split_quantifiers();
                let result = match body {
                    Type::Function(_, r) => r.as_ref(),
                    t => t,
                };
                let Type::Custom(c) = result else { return None };
                let siblings = self
                    .registry
                    .get(&c.name, c.generation)
                    .map(|info| Rc::new(info.constructors.clone()));
                Some(Con { key: ConKey::Ctor(id.name.clone(), c.generation), arity, siblings })
            }
        }
    }
}

/// Whether some value matched by `q` is matched by no row of `rows`.
fn useful(rows: &[Vec<Pat>], q: &[Pat]) -> bool {
    let Some((head, rest)) = q.split_first() else { return rows.is_empty() };
    let column_has_record = matches!(head, Pat::Record(_))
        || rows.iter().any(|r| matches!(r.first(), Some(Pat::Record(_))));
    if column_has_record {
        let labels = record_labels(rows, head);
        let rows: Vec<Vec<Pat>> = rows.iter().filter_map(|r| expand_record(r, &labels)).collect();
        return match expand_record(q, &labels) {
            Some(q) => useful(&rows, &q),
            None => false,
        };
    }
    match head {
        Pat::Con(con, args) => {
            let mut q2 = args.clone();
            q2.extend_from_slice(rest);
            useful(&specialize(rows, con), &q2)
        }
        Pat::Wild => {
            let heads = column_constructors(rows);
            if is_complete(&heads) {
                heads.iter().any(|con| {
                    let mut q2 = vec![Pat::Wild; con.arity];
                    q2.extend_from_slice(rest);
                    useful(&specialize(rows, con), &q2)
                })
            } else {
                let default: Vec<Vec<Pat>> = rows
                    .iter()
                    .filter(|r| matches!(r.first(), Some(Pat::Wild)))
                    .map(|r| r[1..].to_vec())
                    .collect();
                useful(&default, rest)
            }
        }
        Pat::Record(_) => false,
    }
}

fn record_labels(rows: &[Vec<Pat>], head: &Pat) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for p in rows.iter().filter_map(|r| r.first()).chain(std::iter::once(head)) {
        if let Pat::Record(fields) = p {
            for l in fields.keys() {
                if !labels.contains(l) {
                    labels.push(l.clone());
                }
            }
        }
    }
    labels.sort();
    labels
}

fn expand_record(row: &[Pat], labels: &[String]) -> Option<Vec<Pat>> {
    let (head, rest) = row.split_first()?;
    let mut out: Vec<Pat> = match head {
        Pat::Record(fields) => {
            labels.iter().map(|l| fields.get(l).cloned().unwrap_or(Pat::Wild)).collect()
        }
        Pat::Wild => vec![Pat::Wild; labels.len()],
        Pat::Con(..) => return None,
    };
    out.extend_from_slice(rest);
    Some(out)
}

fn specialize(rows: &[Vec<Pat>], con: &Con) -> Vec<Vec<Pat>> {
    rows.iter()
        .filter_map(|row| {
            let (head, rest) = row.split_first()?;
            let mut out = match head {
                Pat::Con(c, args) if c.key == con.key => args.clone(),
                Pat::Con(..) | Pat::Record(_) => return None,
                Pat::Wild => vec![Pat::Wild; con.arity],
            };
            out.extend_from_slice(rest);
            Some(out)
        })
        .collect()
}

fn column_constructors(rows: &[Vec<Pat>]) -> Vec<Con> {
    let mut out: Vec<Con> = Vec::new();
    for row in rows {
        if let Some(Pat::Con(c, _)) = row.first() {
            if !out.iter().any(|o| o.key == c.key) {
                out.push(c.clone());
            }
        }
    }
    out
}

fn is_complete(heads: &[Con]) -> bool {
    let Some(siblings) = heads.first().and_then(|c| c.siblings.as_ref()) else { return false };
    siblings.iter().all(|(name, _)| {
        heads.iter().any(|h| matches!(&h.key, ConKey::Ctor(n, _) if n == name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(n: i64) -> Pat {
        Pat::Con(Con { key: ConKey::Int(n), arity: 0, siblings: None }, Vec::new())
    }

    fn boolean(b: bool) -> Pat {
        let siblings = Rc::new(vec![("true".to_string(), false), ("false".to_string(), false)]);
        let name = if b { "true" } else { "false" };
        Pat::Con(
            Con { key: ConKey::Ctor(name.into(), 0), arity: 0, siblings: Some(siblings) },
            Vec::new(),
        )
    }

    #[test]
    fn literals_need_a_catch_all() {
        let rows = vec![vec![lit(1)], vec![lit(2)]];
        assert!(useful(&rows, &[Pat::Wild]));
        let rows = vec![vec![lit(1)], vec![Pat::Wild]];
        assert!(!useful(&rows, &[Pat::Wild]));
    }

    #[test]
    fn all_constructors_cover_the_type() {
        let rows = vec![vec![boolean(true)], vec![boolean(false)]];
        assert!(!useful(&rows, &[Pat::Wild]));
        assert!(!useful(&rows[..1], &[boolean(true)]));
    }

    #[test]
    fn records_are_checked_column_by_column() {
        let pair = |a: Pat, b: Pat| {
            Pat::Record([("1".to_string(), a), ("2".to_string(), b)].into_iter().collect())
        };
        let rows = vec![
            vec![pair(boolean(true), Pat::Wild)],
            vec![pair(Pat::Wild, boolean(false))],
        ];
        assert!(useful(&rows, &[Pat::Wild]));
        let mut rows = rows;
        rows.push(vec![pair(boolean(false), boolean(true))]);
        assert!(!useful(&rows, &[Pat::Wild]));
    }
}
