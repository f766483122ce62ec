//! Unification failures.
//!
//! Types inside a `TypeClash` are already resolved through the substitution
//! and normalized together, so the same pair always prints the same way.

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeClash {
    #[error("Type clash: \"{left}\" vs. \"{right}\".")]
    Mismatch { left: String, right: String },
    #[error("Records don't agree on members (\"{label}\" occurs only once): \"{left}\" vs. \"{right}\".")]
    Members { label: String, left: String, right: String },
    #[error("Type clash. An expression of type \"{var}\" cannot have type \"{ty}\" because of circularity.")]
    Circularity { var: String, ty: String },
    #[error("Type \"{ty}\" does not admit equality.")]
    Equality { ty: String },
    #[error("Type \"{ty}\" is not among the types {{{domain}}} allowed for \"{var}\".")]
    Domain { var: String, ty: String, domain: String },
    #[error("Type variable \"{var}\" is fixed by an annotation and cannot be \"{ty}\".")]
    Rigid { var: String, ty: String },
    #[error("internal error during unification: {0}")]
    Internal(String),
}
