//! The connector-facing error taxonomy. Every failure mode a caller of
//! [`crate::Connector`] can observe collapses into one of these variants;
//! executor-internal detail (which dialect, which SQL, which driver error)
//! is carried as context rather than as new top-level variants.

use thiserror::Error;

/// Errors a connector can return while planning or executing a query.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The request itself is malformed: an unknown field or relation name,
    /// an operator applied to a type that doesn't support it, a filter
    /// combining `_in`/`_not_in` with another operator on the same relation,
    /// a page size below 1, and so on.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// A request addressed a table, column or relation that metadata does
    /// not know about.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The active dialect cannot express a requested operation.
    #[error(transparent)]
    DialectUnsupported(#[from] quaint::DialectUnsupported),

    /// The query was well-formed and supported but the backend rejected it
    /// (a driver-reported SQL error, a Mongo command error).
    #[error("query error: {0}")]
    QueryError(String),

    /// The connection to the backend failed or was lost mid-request.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Anything else: a bug, an invariant violation, a metadata error that
    /// should have been caught earlier.
    #[error("internal error: {0}")]
    InternalError(String),
}

impl From<query_structure::MetadataError> for ConnectorError {
    fn from(e: query_structure::MetadataError) -> Self {
        use query_structure::MetadataError::*;

        match e {
            TableNotFound(_) | PropertyNotFound { .. } => ConnectorError::ResourceNotFound(e.to_string()),
            UnresolvableInverse { .. } | InvalidTable { .. } => ConnectorError::InternalError(e.to_string()),
        }
    }
}

impl ConnectorError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ConnectorError::ValidationError(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ConnectorError::ResourceNotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ConnectorError::InternalError(msg.into())
    }
}
