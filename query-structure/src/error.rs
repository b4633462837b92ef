use thiserror::Error;

/// Errors raised while resolving or validating metadata. These map onto the
/// `ResourceNotFound` and `InternalError` kinds of the top-level error
/// taxonomy; `query-core` wraps them with request context before they reach
/// a caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("table '{0}' is not declared in the metadata view")]
    TableNotFound(String),

    #[error("table '{table}' has no field or relation named '{property}'")]
    PropertyNotFound { table: String, property: String },

    #[error("relation '{relation}' on table '{table}' has no resolvable inverse on '{target}'")]
    UnresolvableInverse {
        table: String,
        relation: String,
        target: String,
    },

    #[error("table '{table}' violates a metadata invariant: {reason}")]
    InvalidTable { table: String, reason: String },
}
