//! smli-types: the type algebra shared by the elaborator.
//!
//! - `types`: the `Type` representation and constructors for the builtin types
//! - `scheme`: substitutions, fresh names, instantiation and generalization
//! - `unification`: `merge` with domain-restricted, equality and row variables
//! - `display`: SML-style printing and `normalize`
//! - `error`: `TypeClash`

pub mod display;
pub mod error;
pub mod scheme;
pub mod types;
pub mod unification;

pub use error::TypeClash;
pub use scheme::{NameGen, Subst};
pub use types::{CustomType, RecordType, TyVar, Type};
pub use unification::{BuiltinEquality, Equality, EqualityOracle, Unifier};
