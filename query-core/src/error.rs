//! The top-level error taxonomy returned by this crate's `find`. Wraps the
//! connector taxonomy rather than re-stating it, since every failure mode a
//! connector can raise remains a valid failure mode one layer up.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Connector(#[from] query_connector::ConnectorError),

    /// The wire-level request itself didn't parse (bad JSON shape, an
    /// operator token the filter grammar doesn't recognise).
    #[error("request error: {0}")]
    RequestError(String),

    /// A hook in the pipeline rejected or failed the operation.
    #[error("hook error: {0}")]
    HookError(String),

    /// The operation did not complete within its allotted time.
    #[error("operation timed out: {0}")]
    Timeout(String),
}

impl CoreError {
    pub fn request(msg: impl Into<String>) -> Self {
        CoreError::RequestError(msg.into())
    }

    pub fn hook(msg: impl Into<String>) -> Self {
        CoreError::HookError(msg.into())
    }
}
