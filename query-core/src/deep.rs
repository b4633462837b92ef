//! The Deep-Relation Resolver (spec §4.7): for each relation named in a
//! request's `deep` map, runs a full recursive `find` once per parent row,
//! fanned out concurrently but bounded by `Config::deep_parallelism` so it
//! never starves the connection pool the ordinary fetch path also competes
//! for. A relation whose target table or inverse property can't be pinned
//! down records a warning and attaches `[]` rather than failing the whole
//! request.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use indexmap::IndexMap;
use query_connector::{Connector, DeepRequests, FilterTree, FilterValue, Operator, OperatorValue, QueryArguments, RelationMeta};
use query_structure::{MetadataView, Record, Table, Value};
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::error::CoreError;
use crate::hooks::HookRegistry;

pub async fn resolve(
    connector: Arc<dyn Connector>,
    metadata: Arc<MetadataView>,
    config: &Config,
    hooks: &HookRegistry,
    table: &Table,
    parents: &mut [Record],
    deep: &DeepRequests,
    warnings: &mut Vec<String>,
) -> Result<BTreeMap<String, Vec<RelationMeta>>, CoreError> {
    let semaphore = Arc::new(Semaphore::new(config.deep_parallelism.max(1)));
    let mut deep_meta = BTreeMap::new();

    for (relation_name, child_args) in deep {
        match resolve_relation(&connector, &metadata, config, hooks, table, relation_name, child_args, parents, &semaphore).await? {
            Some(relation_meta) if !relation_meta.is_empty() => {
                deep_meta.insert(relation_name.clone(), relation_meta);
            }
            Some(_) => {}
            None => {
                warnings.push(format!("deep relation '{relation_name}' on '{}' could not be resolved", table.name));
                for parent in parents.iter_mut() {
                    parent.insert(relation_name.clone(), Value::List(Vec::new()));
                }
            }
        }
    }

    Ok(deep_meta)
}

/// Resolves one `deep` entry against every parent row, attaching the fetched
/// children directly. Returns `None` (parents untouched) when the relation,
/// its target table, or its inverse property can't be determined.
async fn resolve_relation(
    connector: &Arc<dyn Connector>,
    metadata: &Arc<MetadataView>,
    config: &Config,
    hooks: &HookRegistry,
    table: &Table,
    relation_name: &str,
    child_args: &QueryArguments,
    parents: &mut [Record],
    semaphore: &Arc<Semaphore>,
) -> Result<Option<Vec<RelationMeta>>, CoreError> {
    let Some(relation) = table.relation(relation_name) else {
        return Ok(None);
    };
    let Some(inverse_prop) = relation.inverse_property_name.clone() else {
        return Ok(None);
    };
    let Ok(target) = metadata.table(&relation.target_table) else {
        return Ok(None);
    };
    if target.relation(&inverse_prop).is_none() {
        return Ok(None);
    }
    let target_table = relation.target_table.clone();

    let tasks = parents.iter().map(|parent| {
        let connector = connector.clone();
        let metadata = metadata.clone();
        let semaphore = semaphore.clone();
        let parent_id = parent.get("id").cloned().unwrap_or(Value::Null);
        let args = build_child_args(child_args, &target_table, &inverse_prop, parent_id);

        async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
            let args = args?;
            Box::pin(crate::find_inner(connector, metadata, config, hooks, args)).await
        }
    });

    let results = join_all(tasks).await;

    let mut relation_meta = Vec::with_capacity(parents.len());
    for (parent, result) in parents.iter_mut().zip(results.into_iter()) {
        let outcome = result?;
        parent.insert(relation_name.to_string(), Value::List(outcome.data.into_iter().map(Value::Record).collect()));
        if child_args.meta.any() {
            relation_meta.push(RelationMeta {
                total_count: outcome.meta.total_count,
                filter_count: outcome.meta.filter_count,
            });
        }
    }

    Ok(Some(relation_meta))
}

fn build_child_args(child_args: &QueryArguments, target_table: &str, inverse_prop: &str, parent_id: Value) -> Result<QueryArguments, CoreError> {
    let operand = serde_json::to_value(&parent_id).map_err(|e| CoreError::request(format!("parent id is not representable as a filter operand: {e}")))?;

    let mut id_match = IndexMap::with_capacity(1);
    id_match.insert("id".to_string(), FilterValue::Operators(vec![OperatorValue { op: Operator::Eq, operand }]));

    let mut relation_match = IndexMap::with_capacity(1);
    relation_match.insert(inverse_prop.to_string(), FilterValue::Nested(FilterTree::Leaf(id_match)));
    let implicit = FilterTree::Leaf(relation_match);

    let filter = match &child_args.filter {
        Some(existing) => FilterTree::And(vec![existing.clone(), implicit]),
        None => implicit,
    };

    let mut args = child_args.clone();
    args.table_name = target_table.to_string();
    args.filter = Some(filter);
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_connector::{MetaRequest, Pagination};

    fn empty_args(table: &str) -> QueryArguments {
        QueryArguments {
            table_name: table.to_string(),
            fields: ["id"].iter().map(|s| s.to_string()).collect(),
            filter: None,
            sort: vec![],
            pagination: Pagination { page: 1, limit: 20 },
            meta: MetaRequest::default(),
            deep: Default::default(),
            debug_mode: false,
        }
    }

    #[test]
    fn child_args_filter_combines_with_the_implicit_parent_match() {
        let mut child = empty_args("post");
        child.filter = Some(FilterTree::parse(serde_json::json!({ "published": true })).unwrap());

        let built = build_child_args(&child, "post", "author", Value::Int(7)).unwrap();
        assert_eq!(built.table_name, "post");
        match built.filter.unwrap() {
            FilterTree::And(parts) => assert_eq!(parts.len(), 2),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn child_args_without_an_existing_filter_gets_just_the_implicit_match() {
        let child = empty_args("post");
        let built = build_child_args(&child, "post", "author", Value::Int(7)).unwrap();
        match built.filter.unwrap() {
            FilterTree::Leaf(map) => assert!(map.contains_key("author")),
            other => panic!("expected Leaf, got {other:?}"),
        }
    }
}
