//! Environments.
//!
//! A `State` is an immutable, parent-linked chain of scope nodes. Each node
//! holds a static basis (types of identifiers, type constructors, structures)
//! and a dynamic basis (values, constructor lists, structures). Declarations
//! never modify the state they are given: they return a new child, so a
//! closure that captured a state keeps seeing exactly that scope.
//!
//! `local` and structure bodies are folded back into a single node on top of
//! the scope they started from (`delta_since` + `extend`), which drops the
//! hidden intermediate scopes.

use crate::value::Value;
use ahash::AHashMap;
use smli_ast::ast::LongId;
use smli_types::{CustomType, Equality, EqualityOracle, TyVar, Type};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierStatus {
    ValueVariable,
    ValueConstructor,
    ExceptionConstructor,
}

/// Identifiers user declarations may not rebind.
pub const FIXED_IDENTIFIERS: [&str; 6] = ["true", "false", "nil", "::", "ref", "="];

pub fn allows_rebind(name: &str) -> bool {
    !FIXED_IDENTIFIERS.contains(&name)
}

/// A type constructor: `body` with `params` substituted by the arguments.
/// Datatypes have a `Custom` body over their own parameters; abbreviations
/// have their expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    pub params: Vec<TyVar>,
    pub body: Type,
    pub constructors: Vec<String>,
}

impl TypeInfo {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn apply(&self, args: &[Type]) -> Type {
        let map: HashMap<TyVar, Type> =
            self.params.iter().cloned().zip(args.iter().cloned()).collect();
        self.body.substitute(&map)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticBasis {
    pub values: HashMap<String, (Type, IdentifierStatus)>,
    pub types: HashMap<String, TypeInfo>,
    pub structures: HashMap<String, Rc<StaticBasis>>,
    /// Identity of every exception constructor bound here; aliases share
    /// the identity of their original.
    pub exceptions: HashMap<String, u32>,
}

impl StaticBasis {
    fn absorb(&mut self, nearer: &StaticBasis) {
        for (k, v) in &nearer.values {
            self.values.insert(k.clone(), v.clone());
        }
        for (k, v) in &nearer.exceptions {
            self.exceptions.insert(k.clone(), *v);
        }
        for (k, v) in &nearer.types {
            self.types.insert(k.clone(), v.clone());
        }
        for (k, v) in &nearer.structures {
            self.structures.insert(k.clone(), v.clone());
        }
    }

    pub fn map_types(&self, f: &dyn Fn(&Type) -> Type) -> StaticBasis {
        StaticBasis {
            values: self.values.iter().map(|(k, (t, s))| (k.clone(), (f(t), *s))).collect(),
            types: self.types.clone(),
            structures: self
                .structures
                .iter()
                .map(|(k, b)| (k.clone(), Rc::new(b.map_types(f))))
                .collect(),
            exceptions: self.exceptions.clone(),
        }
    }

    fn collect_types<'a>(&'a self, out: &mut Vec<&'a Type>) {
        out.extend(self.values.values().map(|(t, _)| t));
        for s in self.structures.values() {
            s.collect_types(out);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DynamicBasis {
    pub values: HashMap<String, (Value, IdentifierStatus)>,
    /// Datatype name to constructor names.
    pub types: HashMap<String, Vec<String>>,
    pub structures: HashMap<String, Rc<DynamicBasis>>,
}

impl DynamicBasis {
    fn absorb(&mut self, nearer: &DynamicBasis) {
        for (k, v) in &nearer.values {
            self.values.insert(k.clone(), v.clone());
        }
        for (k, v) in &nearer.types {
            self.types.insert(k.clone(), v.clone());
        }
        for (k, v) in &nearer.structures {
            self.structures.insert(k.clone(), v.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfixStatus {
    pub infix: bool,
    pub precedence: u8,
    pub right_associative: bool,
}

/// Bindings added by a run of nodes, nearest binding winning.
#[derive(Debug, Clone, Default)]
pub struct Delta {
    pub statics: StaticBasis,
    pub dynamics: DynamicBasis,
    pub infix: HashMap<String, InfixStatus>,
}

#[derive(Clone, Default)]
struct StateNode {
    id: u32,
    parent: Option<State>,
    statics: StaticBasis,
    dynamics: DynamicBasis,
    infix: HashMap<String, InfixStatus>,
}

#[derive(Clone, Default)]
pub struct State(Rc<StateNode>);

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "State#{}", self.0.id)
    }
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> u32 {
        self.0.id
    }

    pub fn parent(&self) -> Option<&State> {
        self.0.parent.as_ref()
    }

    pub fn same(&self, other: &State) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// A fresh, empty child scope.
    pub fn nested(&self) -> State {
        State(Rc::new(StateNode {
            id: self.0.id + 1,
            parent: Some(self.clone()),
            ..StateNode::default()
        }))
    }

    fn node_mut(&mut self) -> &mut StateNode {
        Rc::make_mut(&mut self.0)
    }

    fn chain(&self) -> impl Iterator<Item = &State> {
        std::iter::successors(Some(self), |s| s.parent())
    }

    pub fn set_static_value(&mut self, name: &str, ty: Type, status: IdentifierStatus) {
        self.node_mut().statics.values.insert(name.to_string(), (ty, status));
    }

    pub fn set_static_exception(&mut self, name: &str, ty: Type, identity: u32) {
        let node = self.node_mut();
        node.statics.values.insert(name.to_string(), (ty, IdentifierStatus::ExceptionConstructor));
        node.statics.exceptions.insert(name.to_string(), identity);
    }

    pub fn set_static_type(&mut self, name: &str, info: TypeInfo) {
        self.node_mut().statics.types.insert(name.to_string(), info);
    }

    pub fn set_static_structure(&mut self, name: &str, basis: Rc<StaticBasis>) {
        self.node_mut().statics.structures.insert(name.to_string(), basis);
    }

    pub fn set_dynamic_value(&mut self, name: &str, value: Value, status: IdentifierStatus) {
        self.node_mut().dynamics.values.insert(name.to_string(), (value, status));
    }

    pub fn set_dynamic_type(&mut self, name: &str, constructors: Vec<String>) {
        self.node_mut().dynamics.types.insert(name.to_string(), constructors);
    }

    pub fn set_dynamic_structure(&mut self, name: &str, basis: Rc<DynamicBasis>) {
        self.node_mut().dynamics.structures.insert(name.to_string(), basis);
    }

    pub fn set_infix_status(&mut self, name: &str, status: InfixStatus) {
        self.node_mut().infix.insert(name.to_string(), status);
    }

    pub fn get_infix_status(&self, name: &str) -> Option<InfixStatus> {
        self.chain().find_map(|s| s.0.infix.get(name).copied())
    }

    pub fn get_static_value(&self, name: &str) -> Option<&(Type, IdentifierStatus)> {
        self.chain().find_map(|s| s.0.statics.values.get(name))
    }

    pub fn get_static_type(&self, name: &str) -> Option<&TypeInfo> {
        self.chain().find_map(|s| s.0.statics.types.get(name))
    }

    pub fn get_static_structure(&self, name: &str) -> Option<&Rc<StaticBasis>> {
        self.chain().find_map(|s| s.0.statics.structures.get(name))
    }

    pub fn get_dynamic_value(&self, name: &str) -> Option<&(Value, IdentifierStatus)> {
        self.chain().find_map(|s| s.0.dynamics.values.get(name))
    }

    pub fn get_dynamic_type(&self, name: &str) -> Option<&Vec<String>> {
        self.chain().find_map(|s| s.0.dynamics.types.get(name))
    }

    pub fn get_dynamic_structure(&self, name: &str) -> Option<&Rc<DynamicBasis>> {
        self.chain().find_map(|s| s.0.dynamics.structures.get(name))
    }

    /// Follows a structure path. `Ok(None)` for an empty path; `Err` names the
    /// first missing segment.
    pub fn get_and_resolve_static_structure(
        &self,
        path: &[String],
    ) -> Result<Option<&StaticBasis>, String> {
        let Some((first, rest)) = path.split_first() else { return Ok(None) };
        let mut cur: &StaticBasis =
            self.get_static_structure(first).map(Rc::as_ref).ok_or_else(|| first.clone())?;
        for seg in rest {
            cur = cur.structures.get(seg).map(Rc::as_ref).ok_or_else(|| seg.clone())?;
        }
        Ok(Some(cur))
    }

    pub fn get_and_resolve_dynamic_structure(
        &self,
        path: &[String],
    ) -> Result<Option<&DynamicBasis>, String> {
        let Some((first, rest)) = path.split_first() else { return Ok(None) };
        let mut cur: &DynamicBasis =
            self.get_dynamic_structure(first).map(Rc::as_ref).ok_or_else(|| first.clone())?;
        for seg in rest {
            cur = cur.structures.get(seg).map(Rc::as_ref).ok_or_else(|| seg.clone())?;
        }
        Ok(Some(cur))
    }

    /// Static binding of a possibly qualified identifier; `Err` names a
    /// missing structure.
    pub fn lookup_static_value(&self, id: &LongId) -> Result<Option<&(Type, IdentifierStatus)>, String> {
        Ok(match self.get_and_resolve_static_structure(&id.qualifiers)? {
            Some(basis) => basis.values.get(&id.name),
            None => self.get_static_value(&id.name),
        })
    }

    /// Identity of the exception constructor `id` names, if it names one.
    pub fn lookup_static_exception(&self, id: &LongId) -> Result<Option<u32>, String> {
        if !matches!(self.lookup_static_value(id)?, Some((_, IdentifierStatus::ExceptionConstructor))) {
            return Ok(None);
        }
        Ok(match self.get_and_resolve_static_structure(&id.qualifiers)? {
            Some(basis) => basis.exceptions.get(&id.name).copied(),
            None => self.chain().find_map(|s| s.0.statics.exceptions.get(&id.name)).copied(),
        })
    }

    pub fn lookup_static_type(&self, id: &LongId) -> Result<Option<&TypeInfo>, String> {
        Ok(match self.get_and_resolve_static_structure(&id.qualifiers)? {
            Some(basis) => basis.types.get(&id.name),
            None => self.get_static_type(&id.name),
        })
    }

    pub fn lookup_dynamic_value(&self, id: &LongId) -> Result<Option<&(Value, IdentifierStatus)>, String> {
        Ok(match self.get_and_resolve_dynamic_structure(&id.qualifiers)? {
            Some(basis) => basis.values.get(&id.name),
            None => self.get_dynamic_value(&id.name),
        })
    }

    /// The bindings made between `base` (exclusive) and `self`.
    pub fn delta_since(&self, base: &State) -> Delta {
        let nodes: Vec<&State> = self.chain().take_while(|s| !s.same(base)).collect();
        let mut delta = Delta::default();
        for node in nodes.into_iter().rev() {
            delta.statics.absorb(&node.0.statics);
            delta.dynamics.absorb(&node.0.dynamics);
            for (k, v) in &node.0.infix {
                delta.infix.insert(k.clone(), *v);
            }
        }
        delta
    }

    /// A child holding exactly `delta`.
    pub fn extend(&self, delta: Delta) -> State {
        State(Rc::new(StateNode {
            id: self.0.id + 1,
            parent: Some(self.clone()),
            statics: delta.statics,
            dynamics: delta.dynamics,
            infix: delta.infix,
        }))
    }

    /// Types of every value bound strictly above `floor`, structures included.
    pub fn static_types_above(&self, floor: &State) -> Vec<&Type> {
        let mut out = Vec::new();
        for node in self.chain().take_while(|s| !s.same(floor)) {
            node.0.statics.collect_types(&mut out);
        }
        out
    }
}

/// Generation counters keyed by identifier. `next` hands out the current
/// value and then increments it.
#[derive(Debug, Clone, Default)]
pub struct Generations {
    counters: AHashMap<String, u32>,
    journal: Vec<(String, u32)>,
}

impl Generations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, name: &str) -> u32 {
        let counter = self.counters.entry(name.to_string()).or_insert(0);
        let id = *counter;
        *counter += 1;
        self.journal.push((name.to_string(), *counter));
        id
    }

    pub fn current(&self, name: &str) -> u32 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn mark(&self) -> usize {
        self.journal.len()
    }

    /// Drops the journal; counters are kept and earlier marks become meaningless.
    pub fn forget_changes(&mut self) {
        self.journal.clear();
    }

    /// Latest counter value of every name incremented since `mark`.
    pub fn changes_since(&self, mark: usize) -> Vec<(String, u32)> {
        let latest: BTreeMap<&str, u32> =
            self.journal.iter().skip(mark).map(|(n, c)| (n.as_str(), *c)).collect();
        latest.into_iter().map(|(n, c)| (n.to_string(), c)).collect()
    }
}

#[derive(Debug, Clone)]
pub struct DatatypeInfo {
    /// Constructor names with whether they take an argument, in declaration order.
    pub constructors: Vec<(String, bool)>,
    pub equality: Equality,
}

/// Every datatype ever declared, by `(name, generation)`.
#[derive(Debug, Clone, Default)]
pub struct DatatypeRegistry {
    datatypes: AHashMap<(String, u32), DatatypeInfo>,
}

impl DatatypeRegistry {
    pub fn insert(&mut self, name: &str, generation: u32, info: DatatypeInfo) {
        self.datatypes.insert((name.to_string(), generation), info);
    }

    pub fn get(&self, name: &str, generation: u32) -> Option<&DatatypeInfo> {
        self.datatypes.get(&(name.to_string(), generation))
    }

    pub fn set_equality(&mut self, name: &str, generation: u32, equality: Equality) {
        if let Some(info) = self.datatypes.get_mut(&(name.to_string(), generation)) {
            info.equality = equality;
        }
    }
}

impl EqualityOracle for DatatypeRegistry {
    fn equality(&self, ty: &CustomType) -> Equality {
        match self.get(&ty.name, ty.generation) {
            Some(info) => info.equality,
            None => smli_types::BuiltinEquality.equality(ty),
        }
    }
}
