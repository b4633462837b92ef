//! The wire-level response (spec §6): the normalised rows, any requested
//! summary counts (including per-parent counts for `deep` relations), the
//! debug envelope, and any non-fatal warnings collected along the way (the
//! deep-relation resolver's primary use of this last field).

use std::collections::BTreeMap;
use std::time::Duration;

use query_connector::{RelationMeta, ResultMeta};
use query_structure::Record;
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_count: Option<i64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub deep: BTreeMap<String, Vec<RelationMeta>>,
}

impl From<ResultMeta> for ResponseMeta {
    fn from(meta: ResultMeta) -> Self {
        ResponseMeta {
            total_count: meta.total_count,
            filter_count: meta.filter_count,
            deep: meta.deep,
        }
    }
}

/// The rendered query text plus how long the call actually took, attached
/// only when the request asked for `debug: true`.
#[derive(Debug, Clone, Serialize)]
pub struct DebugInfo {
    pub rendered: Option<String>,
    pub elapsed_ms: u128,
}

impl DebugInfo {
    pub fn new(rendered: Option<String>, elapsed: Duration) -> Self {
        DebugInfo { rendered, elapsed_ms: elapsed.as_millis() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub data: Vec<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
