//! The thin facade an embedding host calls into: parse the wire-level JSON
//! request, drive `query_core::find`, serialise the response back to JSON.
//! Everything named out of scope in the core's purpose statement — the
//! HTTP layer, authentication, the sandboxed script runtime, and the
//! cross-process RPC that talks to it — lives on the far side of this
//! boundary, not in this crate.

use std::sync::Arc;
use std::time::Duration;

use query_connector::Connector;
use query_core::{Config, CoreError, HookRegistry, Request};
use query_structure::MetadataView;
use serde_json::Value as Json;
use thiserror::Error;

/// Everything this facade can fail with, beyond what `query_core` itself
/// raises: the inbound JSON not matching the `Request` shape at all.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("failed to serialise response: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Runs one request end to end: deserialise, parse into `QueryArguments`,
/// call `query_core::find`, serialise the response. The host owns
/// `connector`/`metadata`/`hooks` for its whole lifetime and passes them in
/// by reference/clone on every call rather than this facade rebuilding them
/// per request. `deadline`, if given, bounds the whole call including any
/// deep-relation fan-out (spec §5 "Cancellation and timeouts"); the wire
/// request shape itself carries no deadline field, since that is a
/// property of the call, not of the query it describes.
pub async fn handle(
    connector: Arc<dyn Connector>,
    metadata: Arc<MetadataView>,
    config: &Config,
    hooks: &HookRegistry,
    request: Json,
    deadline: Option<Duration>,
) -> Result<Json, HandlerError> {
    let request: Request = serde_json::from_value(request).map_err(|e| HandlerError::MalformedRequest(e.to_string()))?;
    let args = request.into_query_arguments(config.query_default_limit)?;
    let outcome = query_core::find(connector, metadata, config, hooks, args, deadline).await?;
    Ok(serde_json::to_value(outcome.into_response())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use query_connector::{ConnectorError, ConnectorResult, QueryArguments, ResultMeta};
    use query_structure::{Column, ColumnType, MetadataProvider, Record, Table, Value};
    use query_core::DbType;

    struct FixedProvider(Vec<Arc<Table>>);
    impl MetadataProvider for FixedProvider {
        fn get_table(&self, name: &str) -> Option<Arc<Table>> {
            self.0.iter().find(|t| t.name == name).cloned()
        }
        fn list_tables(&self) -> Vec<Arc<Table>> {
            self.0.clone()
        }
    }

    struct FixtureConnector;

    #[async_trait]
    impl Connector for FixtureConnector {
        async fn find(&self, _metadata: &MetadataView, _args: QueryArguments) -> Result<ConnectorResult, ConnectorError> {
            let mut row = Record::new();
            row.insert("id".to_string(), Value::Int(1));
            Ok(ConnectorResult { data: vec![row], meta: ResultMeta::default(), debug_rendered: None })
        }
    }

    fn user_table() -> Table {
        Table {
            name: "user".to_string(),
            system: false,
            unique_keys: vec![],
            indexes: vec![],
            columns: vec![Column::new("id", ColumnType::Integer).primary_key()],
            relations: vec![],
        }
    }

    #[tokio::test]
    async fn handle_round_trips_a_minimal_request() {
        let metadata = Arc::new(MetadataView::new(Arc::new(FixedProvider(vec![Arc::new(user_table())]))));
        let connector: Arc<dyn Connector> = Arc::new(FixtureConnector);
        let config = Config { db_type: DbType::Sqlite, metadata_ttl_secs: 60, deep_parallelism: 4, query_default_limit: 20 };
        let hooks = HookRegistry::new();

        let request = serde_json::json!({ "tableName": "user" });
        let response = handle(connector, metadata, &config, &hooks, request, None).await.unwrap();
        assert_eq!(response["data"][0]["id"], 1);
    }

    #[tokio::test]
    async fn handle_rejects_a_request_missing_the_table_field() {
        let metadata = Arc::new(MetadataView::new(Arc::new(FixedProvider(vec![]))));
        let connector: Arc<dyn Connector> = Arc::new(FixtureConnector);
        let config = Config { db_type: DbType::Sqlite, metadata_ttl_secs: 60, deep_parallelism: 4, query_default_limit: 20 };
        let hooks = HookRegistry::new();

        let request = serde_json::json!({ "fields": "id" });
        let err = handle(connector, metadata, &config, &hooks, request, None).await.unwrap_err();
        assert!(matches!(err, HandlerError::MalformedRequest(_)));
    }
}
