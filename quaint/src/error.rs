use thiserror::Error;

use crate::dialect::Dialect;

/// A requested operation has no safe expression in the active dialect. This
/// is surfaced, never silently downgraded to a different (semantically
/// weaker) rendering.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{operation} is not supported by the {dialect:?} dialect")]
pub struct DialectUnsupported {
    pub dialect: Dialect,
    pub operation: String,
}
