//! The boundary `sql-query-connector` and `mongodb-query-connector`
//! implement. `query-core` talks to whichever one matches the active
//! dialect purely through this trait.

use async_trait::async_trait;
use query_structure::{MetadataView, Record};
use serde::Serialize;

use crate::error::ConnectorError;
use crate::query_arguments::QueryArguments;

/// Per-relation summary counts returned when `meta` was requested inside a
/// `deep` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationMeta {
    pub total_count: Option<i64>,
    pub filter_count: Option<i64>,
}

/// Everything a `find` call can hand back besides the rows themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultMeta {
    pub total_count: Option<i64>,
    pub filter_count: Option<i64>,
    pub deep: std::collections::BTreeMap<String, Vec<RelationMeta>>,
}

/// The outcome of one `find` call, before the top-level debug envelope is
/// attached by `query-core`. `debug_rendered` carries the backend-specific
/// text of the query actually run (SQL, or a Mongo pipeline debug-printed)
/// when the caller asked for it via `QueryArguments::debug_mode`; it is
/// `None` otherwise, so producing it costs nothing on the common path.
#[derive(Debug, Clone)]
pub struct ConnectorResult {
    pub data: Vec<Record>,
    pub meta: ResultMeta,
    pub debug_rendered: Option<String>,
}

/// A single read entry point, implemented once per backend family. Every
/// method receives the metadata view it should resolve table/column/
/// relation names against; connectors hold no metadata of their own.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn find(&self, metadata: &MetadataView, args: QueryArguments) -> Result<ConnectorResult, ConnectorError>;
}
