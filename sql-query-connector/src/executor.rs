//! The SQL executor (spec §4.5): `Parse → Plan → Count? → Fetch →
//! PostFetchCollections → Normalise → Emit`. The remaining two states from
//! the spec's state machine, `Deep?` and the hook pipeline, are owned by
//! `query-core`, one layer up — this connector's `find` always returns one
//! already-normalised page, inline relations and all.

use std::sync::Arc;

use async_trait::async_trait;
use quaint::ast::{Expression, Function, Value as SqlValue};
use quaint::visitor::visitor_for;
use query_connector::{Connector, ConnectorError, ConnectorResult, QueryArguments, ResultMeta};
use query_structure::MetadataView;

use crate::connection::{ColumnHint, RawValue, SqlConnection};
use crate::fields::FieldGroups;
use crate::planner::{self, ProjectedColumn};
use crate::postfetch::{self, raw_key};
use crate::walker::WalkContext;

pub struct SqlConnector {
    conn: Arc<dyn SqlConnection>,
}

impl SqlConnector {
    pub fn new(conn: Arc<dyn SqlConnection>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Connector for SqlConnector {
    async fn find(&self, metadata: &MetadataView, args: QueryArguments) -> Result<ConnectorResult, ConnectorError> {
        let table = metadata.table(&args.table_name)?;
        let ctx = WalkContext { metadata, dialect: self.conn.dialect() };

        let plan = planner::plan_root(&ctx, &table, &args)?;
        let hints = column_hints(&plan.projections, &plan.pk_type, plan.pk_index);

        let mut meta = ResultMeta { total_count: None, filter_count: None, deep: Default::default() };

        if args.meta.filter_count {
            let mut shell = plan.select.as_count_shell();
            let pk = Expression::Column(quaint::ast::ColumnRef::new(plan.root_alias.clone(), table.primary_key_column_name(false)));
            shell = shell.column(Expression::Function(Function::CountDistinct(Box::new(pk))), None);
            let (sql, params) = visitor_for(ctx.dialect).visit_select(&shell);
            meta.filter_count = Some(self.conn.query_scalar_count(&sql, params).await?);
        }
        if args.meta.total_count {
            let mut shell = plan.select.as_count_shell();
            shell.conditions = None;
            shell = shell.column(Expression::Function(Function::Count(None)), None);
            let (sql, params) = visitor_for(ctx.dialect).visit_select(&shell);
            meta.total_count = Some(self.conn.query_scalar_count(&sql, params).await?);
        }

        let (sql, params) = visitor_for(ctx.dialect).visit_select(&plan.select);
        let debug_rendered = args.debug_mode.then(|| sql.clone());
        let rows = self.conn.query(&sql, params, &hints).await?;

        let mut records = Vec::with_capacity(rows.len());
        let mut parent_ids: Vec<SqlValue> = Vec::with_capacity(rows.len());
        let mut parent_keys: Vec<String> = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(crate::normalize::normalize_row(row, &plan.projections));
            let pk_raw = row.get(plan.pk_index).cloned().unwrap_or(RawValue::Null);
            parent_keys.push(raw_key(&pk_raw));
            parent_ids.push(raw_sql_value(&pk_raw));
        }

        for relation_property in &plan.deferred_many_to_many {
            let groups = FieldGroups::from_paths(&args.fields).children.get(relation_property).cloned().unwrap_or_default();
            let grouped = postfetch::fetch_many_to_many(
                self.conn.as_ref(),
                &ctx,
                &table,
                relation_property,
                &plan.pk_type,
                parent_ids.clone(),
                &groups,
            )
            .await?;

            for (record, key) in records.iter_mut().zip(parent_keys.iter()) {
                let values = grouped.get(key).cloned().unwrap_or_default();
                record.insert(relation_property.clone(), query_structure::Value::List(values));
            }
        }

        Ok(ConnectorResult { data: records, meta, debug_rendered })
    }
}

fn column_hints(projections: &[ProjectedColumn], pk_type: &query_structure::ColumnType, pk_index: usize) -> Vec<ColumnHint> {
    let mut hints: Vec<ColumnHint> = projections
        .iter()
        .map(|p| match p {
            ProjectedColumn::Scalar { column_type, .. } => ColumnHint::Scalar(column_type.clone()),
            ProjectedColumn::OwnerRef { .. } => ColumnHint::Scalar(pk_type.clone()),
            ProjectedColumn::SingleJson { .. } | ProjectedColumn::CollectionJson { .. } => ColumnHint::Json,
        })
        .collect();

    if pk_index >= hints.len() {
        hints.push(ColumnHint::Scalar(pk_type.clone()));
    }
    hints
}

fn raw_sql_value(raw: &RawValue) -> SqlValue {
    match raw {
        RawValue::Null => SqlValue::Null,
        RawValue::Bool(b) => SqlValue::Boolean(*b),
        RawValue::Int(n) => SqlValue::Int64(*n),
        RawValue::Float(f) => SqlValue::Double(*f),
        RawValue::Text(s) => SqlValue::Text(s.clone()),
        RawValue::Bytes(b) => SqlValue::Text(String::from_utf8_lossy(b).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::fixture::FixtureConnection;
    use crate::connection::SqlRow;
    use query_connector::query_arguments::{MetaRequest, Pagination};
    use query_structure::{Column, ColumnType, Table};
    use quaint::dialect::Dialect;
    use serde_json::json;
    use std::sync::Arc;

    fn user_table() -> Table {
        Table {
            name: "user".to_string(),
            system: false,
            unique_keys: vec![],
            indexes: vec![],
            columns: vec![Column::new("id", ColumnType::Integer).primary_key(), Column::new("name", ColumnType::Text)],
            relations: vec![],
        }
    }

    struct FixedProvider(Vec<Arc<Table>>);
    impl query_structure::MetadataProvider for FixedProvider {
        fn get_table(&self, name: &str) -> Option<Arc<Table>> {
            self.0.iter().find(|t| t.name == name).cloned()
        }
        fn list_tables(&self) -> Vec<Arc<Table>> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn find_normalises_rows_from_the_fixture_connection() {
        let metadata = MetadataView::new(Arc::new(FixedProvider(vec![Arc::new(user_table())])));
        let rows = vec![SqlRow(vec![RawValue::Int(1), RawValue::Text("ada".to_string())])];
        let conn = Arc::new(FixtureConnection::new(Dialect::Sqlite, vec![rows]));
        let connector = SqlConnector::new(conn);

        let args = QueryArguments {
            table_name: "user".to_string(),
            fields: ["id", "name"].iter().map(|s| s.to_string()).collect(),
            filter: None,
            sort: vec![],
            pagination: Pagination { page: 1, limit: 20 },
            meta: MetaRequest::default(),
            deep: Default::default(),
            debug_mode: false,
        };

        let result = connector.find(&metadata, args).await.unwrap();
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.data[0].get("name"), Some(&query_structure::Value::Text("ada".to_string())));
    }

    #[test]
    fn json_payload_round_trips_through_serde() {
        let payload = json!({"id": 1});
        assert_eq!(payload["id"], 1);
    }
}
