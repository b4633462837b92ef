//! Ties the connector-agnostic pieces together into the two states of the
//! spec's request state machine that live above a single `Connector::find`
//! call: the deep-relation resolver and the hook pipeline. `dispatch`
//! decides which connector crate backs a given [`Config`]; everything above
//! this crate talks only to [`find`].

pub mod config;
pub mod deep;
pub mod dispatch;
pub mod error;
pub mod hooks;
pub mod request;
pub mod response;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use query_connector::{Connector, QueryArguments};
use query_structure::{MetadataView, Record};

pub use config::{Config, DbType};
pub use dispatch::{build_connector, Connections};
pub use error::CoreError;
pub use hooks::HookRegistry;
pub use request::Request;
pub use response::{DebugInfo, Response, ResponseMeta};

/// The fully resolved outcome of one call to [`find`]: the top-level fetch,
/// hooks applied, and deep relations attached.
pub struct FindOutcome {
    pub data: Vec<Record>,
    pub meta: ResponseMeta,
    pub debug: Option<DebugInfo>,
    pub warnings: Vec<String>,
}

/// Runs the request state machine, optionally bounded by `deadline` (spec
/// §5 "Cancellation and timeouts"). When the deadline elapses the whole
/// operation — including any deep-relation children still in flight — is
/// dropped and `CoreError::Timeout` is returned; there is no partial
/// result, since the dropped future never reaches the point of returning
/// one. A child fan-out call never wraps its own timeout: it shares the
/// parent's single deadline via `find_inner`, never starting a fresh clock
/// of its own.
pub async fn find(
    connector: Arc<dyn Connector>,
    metadata: Arc<MetadataView>,
    config: &Config,
    hooks: &HookRegistry,
    args: QueryArguments,
    deadline: Option<Duration>,
) -> Result<FindOutcome, CoreError> {
    match deadline {
        None => find_inner(connector, metadata, config, hooks, args).await,
        Some(duration) => tokio::time::timeout(duration, find_inner(connector, metadata, config, hooks, args))
            .await
            .map_err(|_| CoreError::Timeout(format!("operation exceeded {duration:?}")))?,
    }
}

/// The state machine's outer two states, `Deep?` and hooks, run around a
/// single connector call: `before-select hook → Connector::find →
/// after-select hook → Deep-Relation Resolver → Emit`. Shared by both the
/// deadline-bounded and unbounded paths through [`find`], and called
/// directly (never re-wrapped) by each deep-relation fan-out task so the
/// whole request tree shares one deadline.
pub(crate) async fn find_inner(
    connector: Arc<dyn Connector>,
    metadata: Arc<MetadataView>,
    config: &Config,
    hooks: &HookRegistry,
    mut args: QueryArguments,
) -> Result<FindOutcome, CoreError> {
    let start = Instant::now();
    let debug_mode = args.debug_mode;

    hooks.run_before_select(&mut args)?;

    let table = metadata.table(&args.table_name)?;
    let deep_requests = args.deep.clone();

    let mut result = connector.find(&metadata, args).await?;
    hooks.run_after_select(&mut result.data)?;

    let mut warnings = Vec::new();
    let deep_meta: BTreeMap<_, _> = if deep_requests.is_empty() {
        BTreeMap::new()
    } else {
        deep::resolve(connector, metadata, config, hooks, &table, &mut result.data, &deep_requests, &mut warnings).await?
    };

    let mut meta = ResponseMeta::from(result.meta);
    meta.deep = deep_meta;

    Ok(FindOutcome {
        data: result.data,
        meta,
        debug: debug_mode.then(|| DebugInfo::new(result.debug_rendered, start.elapsed())),
        warnings,
    })
}

impl FindOutcome {
    /// `meta` is only non-`None` in the response when something about it was
    /// actually asked for: a summary count, or a resolved `deep` relation.
    pub fn into_response(self) -> Response {
        let meta_requested = self.meta.total_count.is_some() || self.meta.filter_count.is_some() || !self.meta.deep.is_empty();
        Response {
            data: self.data,
            meta: meta_requested.then_some(self.meta),
            debug: self.debug,
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use query_connector::{ConnectorError, ConnectorResult, MetaRequest, Pagination, ResultMeta};
    use query_structure::{Column, ColumnType, MetadataProvider, Record, Table, Value};

    struct FixedProvider(Vec<Arc<Table>>);
    impl MetadataProvider for FixedProvider {
        fn get_table(&self, name: &str) -> Option<Arc<Table>> {
            self.0.iter().find(|t| t.name == name).cloned()
        }
        fn list_tables(&self) -> Vec<Arc<Table>> {
            self.0.clone()
        }
    }

    struct FixtureConnector(Vec<Record>);

    #[async_trait]
    impl Connector for FixtureConnector {
        async fn find(&self, _metadata: &MetadataView, args: QueryArguments) -> Result<ConnectorResult, ConnectorError> {
            Ok(ConnectorResult {
                data: self.0.clone(),
                meta: ResultMeta { total_count: args.meta.total_count.then_some(self.0.len() as i64), ..Default::default() },
                debug_rendered: args.debug_mode.then(|| "fixture".to_string()),
            })
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

    fn args() -> QueryArguments {
        QueryArguments {
            table_name: "user".to_string(),
            fields: ["id"].iter().map(|s| s.to_string()).collect(),
            filter: None,
            sort: vec![],
            pagination: Pagination { page: 1, limit: 20 },
            meta: MetaRequest::default(),
            deep: Default::default(),
            debug_mode: false,
        }
    }

    #[tokio::test]
    async fn find_omits_meta_when_nothing_requested_it() {
        let metadata = Arc::new(MetadataView::new(Arc::new(FixedProvider(vec![Arc::new(user_table())]))));
        let mut row = Record::new();
        row.insert("id".to_string(), Value::Int(1));
        let connector: Arc<dyn Connector> = Arc::new(FixtureConnector(vec![row]));
        let config = Config { db_type: DbType::Sqlite, metadata_ttl_secs: 60, deep_parallelism: 4, query_default_limit: 20 };
        let hooks = HookRegistry::new();

        let outcome = find(connector, metadata, &config, &hooks, args(), None).await.unwrap();
        let response = outcome.into_response();
        assert_eq!(response.data.len(), 1);
        assert!(response.meta.is_none());
    }

    #[tokio::test]
    async fn find_surfaces_debug_info_only_when_requested() {
        let metadata = Arc::new(MetadataView::new(Arc::new(FixedProvider(vec![Arc::new(user_table())]))));
        let connector: Arc<dyn Connector> = Arc::new(FixtureConnector(vec![]));
        let config = Config { db_type: DbType::Sqlite, metadata_ttl_secs: 60, deep_parallelism: 4, query_default_limit: 20 };
        let hooks = HookRegistry::new();

        let mut debug_args = args();
        debug_args.debug_mode = true;
        let outcome = find(connector, metadata, &config, &hooks, debug_args, None).await.unwrap();
        assert!(outcome.debug.is_some());
        assert_eq!(outcome.debug.unwrap().rendered.as_deref(), Some("fixture"));
    }

    #[tokio::test]
    async fn find_reports_a_timeout_instead_of_a_partial_result() {
        struct SlowConnector;

        #[async_trait]
        impl Connector for SlowConnector {
            async fn find(&self, _metadata: &MetadataView, _args: QueryArguments) -> Result<ConnectorResult, ConnectorError> {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                Ok(ConnectorResult { data: vec![], meta: ResultMeta::default(), debug_rendered: None })
            }
        }

        let metadata = Arc::new(MetadataView::new(Arc::new(FixedProvider(vec![Arc::new(user_table())]))));
        let connector: Arc<dyn Connector> = Arc::new(SlowConnector);
        let config = Config { db_type: DbType::Sqlite, metadata_ttl_secs: 60, deep_parallelism: 4, query_default_limit: 20 };
        let hooks = HookRegistry::new();

        let result = find(connector, metadata, &config, &hooks, args(), Some(Duration::from_millis(1))).await;
        assert!(matches!(result, Err(CoreError::Timeout(_))));
    }
}
