//! Native libraries installed as structures.
//!
//! A library is a named set of native functions with their type schemes.
//! Registration adds one structure to both bases, so its members are reached
//! as `Name.member` or brought into scope with `open Name`.

use crate::error::EvaluationError;
use crate::state::{DynamicBasis, IdentifierStatus, StaticBasis, State};
use crate::value::{Completion, NativeContext, NativeFunction, Value};
use smli_types::Type;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct LibraryEntry {
    pub name: String,
    /// Type scheme, quantified with `Type::quantify` when polymorphic.
    pub ty: Type,
    pub function: NativeFunction,
}

#[derive(Debug, Clone)]
pub struct Library {
    pub name: String,
    pub entries: Vec<LibraryEntry>,
}

impl Library {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), entries: Vec::new() }
    }

    pub fn function(
        mut self,
        name: &str,
        ty: Type,
        f: impl Fn(Value, &mut NativeContext<'_>) -> Result<Completion, EvaluationError> + 'static,
    ) -> Self {
        self.entries.push(LibraryEntry { name: name.to_string(), ty, function: NativeFunction::new(name, f) });
        self
    }

    /// `state` with the library bound as a structure.
    pub(crate) fn install(&self, state: &State) -> State {
        let mut statics = StaticBasis::default();
        let mut dynamics = DynamicBasis::default();
        for entry in &self.entries {
            statics.values.insert(entry.name.clone(), (entry.ty.clone(), IdentifierStatus::ValueVariable));
            dynamics
                .values
                .insert(entry.name.clone(), (Value::Native(entry.function.clone()), IdentifierStatus::ValueVariable));
        }
        let mut result = state.nested();
        result.set_static_structure(&self.name, Rc::new(statics));
        result.set_dynamic_structure(&self.name, Rc::new(dynamics));
        tracing::debug!(library = %self.name, entries = self.entries.len(), "library registered");
        result
    }
}
