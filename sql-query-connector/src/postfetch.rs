//! Batches a many-to-many relation fetch across an entire page of parent
//! rows instead of joining the junction table into the row stream (spec
//! §4.5's PostFetchCollections step): one query over
//! `junction ⋈ target`, grouped in memory by the junction's source column,
//! regardless of how many parent rows matched.

use std::collections::HashMap;

use quaint::ast::{ColumnRef, Compare, ConditionTree, Expression, Function, Select, TableRef, Value as SqlValue};
use query_connector::ConnectorError;
use query_structure::{ColumnType, Table, Value};

use crate::alias::SubqueryAliasAllocator;
use crate::connection::{ColumnHint, RawValue, SqlConnection};
use crate::fields::FieldGroups;
use crate::normalize::json_to_value;
use crate::planner::projection_pairs;
use crate::walker::WalkContext;

/// The fetched, grouped many-to-many result: parent id (as its raw-string
/// form) to the list of related records.
pub type GroupedRelations = HashMap<String, Vec<Value>>;

pub async fn fetch_many_to_many(
    conn: &dyn SqlConnection,
    ctx: &WalkContext<'_>,
    table: &Table,
    relation_property: &str,
    parent_pk_type: &ColumnType,
    parent_ids: Vec<SqlValue>,
    groups: &FieldGroups,
) -> Result<GroupedRelations, ConnectorError> {
    if parent_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let relation = table
        .relation(relation_property)
        .ok_or_else(|| ConnectorError::not_found(format!("table '{}' has no relation named '{relation_property}'", table.name)))?;
    let junction = ctx.metadata.junction_for(table, relation_property)?;
    let target = ctx.metadata.table(&relation.target_table)?;

    let junction_alias = "j".to_string();
    let target_alias = "t".to_string();
    let mut alloc = SubqueryAliasAllocator::new();
    let pairs = projection_pairs(ctx, &target, &target_alias, groups, &mut alloc)?;

    let select = Select::from_table(TableRef::aliased(junction.table_name.clone(), junction_alias.clone()))
        .column(
            Expression::Column(ColumnRef::new(junction_alias.clone(), junction.source_column.clone())),
            Some("parent_id"),
        )
        .column(Expression::Function(Function::JsonObject(pairs)), Some("record"))
        .inner_join(
            TableRef::aliased(target.name.clone(), target_alias.clone()),
            ConditionTree::Compare(Compare::Equals(
                Expression::Column(ColumnRef::new(junction_alias.clone(), junction.target_column.clone())),
                Expression::Column(ColumnRef::new(target_alias, target.primary_key_column_name(false))),
            )),
        )
        .and_where(ConditionTree::Compare(Compare::In(
            Expression::Column(ColumnRef::new(junction_alias, junction.source_column.clone())),
            parent_ids.into_iter().map(Expression::Value).collect(),
        )));

    let visitor = quaint::visitor::visitor_for(conn.dialect());
    let (sql, params) = visitor.visit_select(&select);
    let hints = vec![ColumnHint::Scalar(parent_pk_type.clone()), ColumnHint::Json];
    let rows = conn.query(&sql, params, &hints).await?;

    let mut grouped: GroupedRelations = HashMap::new();
    for row in rows {
        let parent_key = raw_key(row.get(0).unwrap_or(&RawValue::Null));
        let record_value = match row.get(1) {
            Some(RawValue::Text(text)) => json_to_value(&serde_json::from_str(text).unwrap_or(serde_json::Value::Null)),
            _ => Value::Null,
        };
        grouped.entry(parent_key).or_default().push(record_value);
    }
    Ok(grouped)
}

/// The stable string key used to group post-fetched rows by parent id,
/// independent of whether the primary key is numeric or textual.
pub fn raw_key(raw: &RawValue) -> String {
    match raw {
        RawValue::Null => String::new(),
        RawValue::Bool(b) => b.to_string(),
        RawValue::Int(n) => n.to_string(),
        RawValue::Float(f) => f.to_string(),
        RawValue::Text(s) => s.clone(),
        RawValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
    }
}
