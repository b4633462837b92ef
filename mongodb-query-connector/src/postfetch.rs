//! Batches a many-to-many relation fetch across an entire page of parent
//! documents instead of a per-row `$lookup` (spec §4.5's
//! PostFetchCollections step): one aggregation over the junction
//! collection, grouped in memory by its source column, regardless of how
//! many parent documents matched. Mirrors `sql-query-connector::postfetch`'s
//! "never inline many-to-many" decision (see DESIGN.md).

use std::collections::HashMap;

use bson::{doc, Bson, Document};
use futures::stream::TryStreamExt;
use mongodb::Database;
use query_connector::{ConnectorError, FieldGroups};
use query_structure::{MetadataView, Table, Value};

use crate::normalize::document_to_record;
use crate::pipeline::lookup_inner_pipeline;

/// The fetched, grouped many-to-many result: parent id (as its raw-string
/// form) to the list of related records.
pub type GroupedRelations = HashMap<String, Vec<Value>>;

pub async fn fetch_many_to_many(
    db: &Database,
    metadata: &MetadataView,
    table: &Table,
    relation_property: &str,
    parent_ids: &[Bson],
    groups: &FieldGroups,
) -> Result<GroupedRelations, ConnectorError> {
    if parent_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let relation = table
        .relation(relation_property)
        .ok_or_else(|| ConnectorError::not_found(format!("table '{}' has no relation named '{relation_property}'", table.name)))?;
    let junction = metadata.junction_for(table, relation_property)?;
    let target = metadata.table(&relation.target_table)?;

    let inner_pipeline = lookup_inner_pipeline(metadata, &target, groups)?;

    let pipeline = vec![
        doc! { "$match": { junction.source_column.clone(): { "$in": parent_ids.to_vec() } } },
        doc! {
            "$lookup": {
                "from": target.name.clone(),
                "let": { "tid": format!("${}", junction.target_column) },
                "pipeline": std::iter::once(doc! { "$match": { "$expr": { "$eq": ["$_id", "$$tid"] } } })
                    .chain(inner_pipeline)
                    .collect::<Vec<_>>(),
                "as": "target",
            }
        },
        doc! { "$unwind": "$target" },
        doc! { "$project": { "_parent": format!("${}", junction.source_column), "record": "$target" } },
    ];

    let collection = db.collection::<Document>(&junction.table_name);
    let mut cursor = collection.aggregate(pipeline, None).await.map_err(|e| ConnectorError::internal(e.to_string()))?;

    let mut grouped: GroupedRelations = HashMap::new();
    while let Some(doc) = cursor.try_next().await.map_err(|e| ConnectorError::internal(e.to_string()))? {
        let parent_key = doc.get("_parent").map(raw_key).unwrap_or_default();
        let record = match doc.get_document("record") {
            Ok(inner) => Value::Record(document_to_record(inner)),
            Err(_) => Value::Null,
        };
        grouped.entry(parent_key).or_default().push(record);
    }

    Ok(grouped)
}

/// The stable string key used to group post-fetched documents by parent id,
/// independent of whether it's an `ObjectId`, a string, or a number.
pub fn raw_key(bson: &Bson) -> String {
    match bson {
        Bson::Null => String::new(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(f) => f.to_string(),
        Bson::Boolean(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_parent_key_is_its_hex_form() {
        let oid = bson::oid::ObjectId::new();
        assert_eq!(raw_key(&Bson::ObjectId(oid)), oid.to_hex());
    }

    #[test]
    fn string_and_numeric_parent_keys_stringify_plainly() {
        assert_eq!(raw_key(&Bson::String("abc".to_string())), "abc");
        assert_eq!(raw_key(&Bson::Int64(42)), "42");
        assert_eq!(raw_key(&Bson::Null), "");
    }
}
