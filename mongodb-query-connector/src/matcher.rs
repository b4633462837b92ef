//! Turns a parsed [`FilterTree`] into a `$match` document (spec §4.3, §4.6).
//! Field-level predicates translate directly into Mongo's comparison
//! operators. Relation-level predicates split in two: an owner-side
//! relation's foreign key is a field on this same document, so it compiles
//! to a direct match exactly like a field predicate; everything reaching
//! through a `$lookup`-produced array (inverse collections, many-to-many)
//! cannot be expressed before that lookup runs, so it is built by
//! [`relation_stage_after_lookup`] and inserted as a second `$match`
//! immediately following the relevant pipeline stage, per spec §4.6's
//! pipeline ordering.

use bson::{doc, Bson, Document};
use query_connector::{ConnectorError, FilterTree, FilterValue, Operator};
use query_structure::{Column, MetadataView, Property, Relation, RelationSide, Table};

use crate::coerce::{coerce_list, coerce_scalar};

pub struct MatchContext<'a> {
    pub metadata: &'a MetadataView,
}

/// Builds the root `$match` document: field predicates everywhere, and
/// relation predicates only where they're an owner-side membership or
/// id-equality test that needs no lookup.
pub fn walk_root(ctx: &MatchContext, table: &Table, tree: &FilterTree) -> Result<Document, ConnectorError> {
    match tree {
        FilterTree::And(parts) => {
            let docs = parts.iter().map(|p| walk_root(ctx, table, p)).collect::<Result<Vec<_>, _>>()?;
            Ok(doc! { "$and": docs })
        }
        FilterTree::Or(parts) => {
            let docs = parts.iter().map(|p| walk_root(ctx, table, p)).collect::<Result<Vec<_>, _>>()?;
            Ok(doc! { "$or": docs })
        }
        FilterTree::Not(inner) => {
            let inner_doc = walk_root(ctx, table, inner)?;
            Ok(doc! { "$nor": [inner_doc] })
        }
        FilterTree::Leaf(map) => {
            let mut merged = Document::new();
            for (key, value) in map {
                let property = table
                    .resolve(key)
                    .ok_or_else(|| ConnectorError::not_found(format!("table '{}' has no field or relation named '{key}'", table.name)))?;
                let part = match property {
                    Property::Field(column) => field_condition(column, value)?,
                    Property::Relation(relation) => owner_relation_condition(ctx, relation, value)?,
                };
                merged.extend(part);
            }
            Ok(merged)
        }
    }
}

/// The physical Mongo field backing a column: every document's primary key
/// is physically `_id` regardless of the logical name metadata gives it
/// (kept as `id` so results stay shaped the same across backends); every
/// other column's physical field is just its declared name.
pub(crate) fn mongo_field_name(column: &Column) -> String {
    if column.is_primary_key {
        "_id".to_string()
    } else {
        column.name.clone()
    }
}

fn field_condition(column: &Column, value: &FilterValue) -> Result<Document, ConnectorError> {
    let FilterValue::Operators(ops) = value else {
        return Err(ConnectorError::validation(format!("field '{}' does not accept a nested relation-style filter", column.name)));
    };

    let field = mongo_field_name(column);
    let is_id_field = column.is_primary_key;
    let mut conditions = Document::new();

    for op in ops {
        match op.op {
            Operator::Eq => {
                conditions.insert("$eq", coerce_scalar(&op.operand, &column.r#type, is_id_field)?);
            }
            Operator::Neq => {
                conditions.insert("$ne", coerce_scalar(&op.operand, &column.r#type, is_id_field)?);
            }
            Operator::Gt => {
                conditions.insert("$gt", coerce_scalar(&op.operand, &column.r#type, is_id_field)?);
            }
            Operator::Gte => {
                conditions.insert("$gte", coerce_scalar(&op.operand, &column.r#type, is_id_field)?);
            }
            Operator::Lt => {
                conditions.insert("$lt", coerce_scalar(&op.operand, &column.r#type, is_id_field)?);
            }
            Operator::Lte => {
                conditions.insert("$lte", coerce_scalar(&op.operand, &column.r#type, is_id_field)?);
            }
            Operator::In => {
                let empty = matches!(&op.operand, serde_json::Value::Array(a) if a.is_empty());
                if empty {
                    return Ok(doc! { "_id": { "$exists": false } });
                }
                conditions.insert("$in", coerce_list(&op.operand, &column.r#type, is_id_field)?);
            }
            Operator::NotIn => {
                let empty = matches!(&op.operand, serde_json::Value::Array(a) if a.is_empty());
                if empty {
                    return Ok(Document::new());
                }
                conditions.insert("$nin", coerce_list(&op.operand, &column.r#type, is_id_field)?);
            }
            Operator::Between => {
                let Some(bounds) = op.operand.as_array() else {
                    return Err(ConnectorError::validation("_between expects a two-element array"));
                };
                if bounds.len() != 2 {
                    return Err(ConnectorError::validation("_between expects exactly two elements"));
                }
                conditions.insert("$gte", coerce_scalar(&bounds[0], &column.r#type, is_id_field)?);
                conditions.insert("$lte", coerce_scalar(&bounds[1], &column.r#type, is_id_field)?);
            }
            Operator::Contains | Operator::StartsWith | Operator::EndsWith => {
                let needle = op.operand.as_str().ok_or_else(|| ConnectorError::validation("substring operator expects a string operand"))?;
                // `$regex`/`$options: "i"` only folds case. Unlike
                // `quaint::Dialect::substring_predicate`'s postgres branch
                // (`unaccent(lower(...))`), Mongo has no server-side
                // diacritic folding short of a `$function` (server-side JS,
                // disabled on many deployments); accent folding for this
                // operator is left undone, same as the mysql/sqlite
                // branches of that function, which only approximate it via
                // collation rather than truly unaccenting. See
                // "Mongo Executor" in SPEC_FULL.md.
                let escaped = regex_escape(needle);
                let pattern = match op.op {
                    Operator::StartsWith => format!("^{escaped}"),
                    Operator::EndsWith => format!("{escaped}$"),
                    _ => escaped,
                };
                conditions.insert("$regex", Bson::String(pattern));
                conditions.insert("$options", Bson::String("i".to_string()));
            }
            Operator::IsNull => {
                return Ok(doc! { field.clone(): Bson::Null });
            }
            Operator::IsNotNull => {
                conditions.insert("$ne", Bson::Null);
            }
            Operator::Count | Operator::Sum | Operator::Avg | Operator::Min | Operator::Max => {
                return Err(ConnectorError::validation(format!("aggregate operator '{}' cannot be applied to field '{}'", op.op, column.name)));
            }
        }
    }

    Ok(doc! { field: conditions })
}

fn owner_relation_condition(ctx: &MatchContext, relation: &Relation, value: &FilterValue) -> Result<Document, ConnectorError> {
    let target = ctx.metadata.table(&relation.target_table)?;

    match (&relation.side, value) {
        (RelationSide::Owner { foreign_key_column }, FilterValue::Operators(ops)) if ops.len() == 1 && ops[0].op.is_membership() => {
            let op = &ops[0];
            let pk = target.primary_key_column().ok_or_else(|| ConnectorError::internal(format!("table '{}' has no primary key", target.name)))?;
            let mongo_op = if op.op == Operator::In { "$in" } else { "$nin" };
            let ids = coerce_list(&op.operand, &pk.r#type, true)?;
            Ok(doc! { foreign_key_column.clone(): { mongo_op: ids } })
        }
        (RelationSide::Owner { foreign_key_column }, FilterValue::Nested(FilterTree::Leaf(inner))) if inner.len() == 1 && inner.contains_key("id") => {
            let pk = target.primary_key_column().ok_or_else(|| ConnectorError::internal("target has no primary key"))?;
            let fk_column = Column { name: foreign_key_column.clone(), ..pk.clone() };
            field_condition(&fk_column, &inner["id"])
        }
        _ => Err(ConnectorError::validation(format!(
            "relation '{}' filter requires a prior $lookup; it is resolved by the pipeline builder, not the root match",
            relation.property_name
        ))),
    }
}

/// Escapes regex metacharacters in a literal substring operand before it is
/// embedded in a `$regex` pattern.
fn regex_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if "\\.^$|?*+()[]{}".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Builds the `$match` stage placed right after a relation's `$lookup` in
/// the pipeline, for the filter shapes a root match can't express:
/// aggregate predicates (`_count`/`_sum`/`_avg`/`_min`/`_max`) and general
/// nested filters over a to-many relation. `array_field` is the name the
/// preceding `$lookup` wrote its results to (conventionally the relation's
/// property name). Returns the `$match` fragment plus any extra pipeline
/// stages (a dedicated `$lookup` + `$group` for `_sum`/`_avg`/`_min`/`_max`)
/// that must be spliced into the pipeline before that match runs.
pub fn relation_stage_after_lookup(ctx: &MatchContext, table: &Table, relation: &Relation, array_field: &str, value: &FilterValue) -> Result<(Document, Vec<Document>), ConnectorError> {
    match value {
        FilterValue::Operators(ops) if ops.len() == 1 && ops[0].op == Operator::Count => {
            let op = &ops[0];
            let cmp = FilterValue::parse_operand(op.operand.clone())?;
            let cmp = cmp.single()?;
            let mongo_op = mongo_compare_op(cmp.op)?;
            let value = cmp.operand.as_i64().ok_or_else(|| ConnectorError::validation("_count comparison expects an integer"))?;
            Ok((doc! { "$expr": { mongo_op: [ { "$size": format!("${array_field}") }, value ] } }, Vec::new()))
        }
        FilterValue::Operators(ops) if ops.len() == 1 && matches!(ops[0].op, Operator::Sum | Operator::Avg | Operator::Min | Operator::Max) => {
            aggregate_lookup_and_match(ctx, table, relation, &ops[0])
        }
        FilterValue::Nested(_) => Ok((doc! { format!("{array_field}.0"): { "$exists": true } }, Vec::new())),
        FilterValue::Operators(ops) => Err(ConnectorError::validation(format!(
            "relation '{}' filter combines incompatible operators ({} entries); reject rather than guess",
            relation.property_name,
            ops.len()
        ))),
    }
}

/// Builds a dedicated `$lookup` (grouped to a single aggregate value, mirroring
/// `sql-query-connector::walker::aggregate_condition`'s correlated scalar
/// subquery) for `_sum`/`_avg`/`_min`/`_max`, independent of whatever `$lookup`
/// the field projection side of the pipeline may or may not have produced for
/// this relation — the aggregated field need not be among the requested
/// fields. Returns the `$expr` match fragment plus the `$lookup` stage that
/// must run before it.
fn aggregate_lookup_and_match(ctx: &MatchContext, table: &Table, relation: &Relation, op: &query_connector::OperatorValue) -> Result<(Document, Vec<Document>), ConnectorError> {
    let agg = op.op;
    let target = ctx.metadata.table(&relation.target_table)?;
    let fk = relation_target_fk(ctx, table, relation, &target)?;

    let Some(obj) = op.operand.as_object() else {
        return Err(ConnectorError::validation(format!("'{agg}' expects an object naming the aggregated field")));
    };
    if obj.len() != 1 {
        return Err(ConnectorError::validation(format!("'{agg}' expects exactly one aggregated field")));
    }
    let (field_name, inner) = obj.iter().next().expect("checked len == 1");
    let column = target
        .column(field_name)
        .ok_or_else(|| ConnectorError::not_found(format!("table '{}' has no field named '{field_name}'", target.name)))?;
    let cmp = FilterValue::parse_operand(inner.clone())?;
    let cmp = cmp.single()?;
    let mongo_op = mongo_compare_op(cmp.op)?;
    let coerced = coerce_scalar(&cmp.operand, &column.r#type, false)?;

    let accumulator = match agg {
        Operator::Sum => "$sum",
        Operator::Avg => "$avg",
        Operator::Min => "$min",
        Operator::Max => "$max",
        _ => unreachable!("agg is one of Sum/Avg/Min/Max here"),
    };

    let agg_field = format!("__agg_{}", relation.property_name);
    let lookup = doc! {
        "$lookup": {
            "from": target.name.clone(),
            "let": { "pid": "$_id" },
            "pipeline": [
                doc! { "$match": { "$expr": { "$eq": [format!("${fk}"), "$$pid"] } } },
                doc! { "$group": { "_id": Bson::Null, "value": { accumulator: format!("${}", mongo_field_name(column)) } } },
            ],
            "as": agg_field.clone(),
        }
    };
    let match_doc = doc! {
        "$expr": { mongo_op: [ { "$arrayElemAt": [format!("${agg_field}.value"), 0] }, coerced ] }
    };
    Ok((match_doc, vec![lookup]))
}

/// Whether `tree` contains a predicate over a relation that needs a prior
/// `$lookup` (an inverse collection, an inverse single, or a many-to-many
/// relation). `pipeline.rs` uses this to decide whether the root `$match`
/// alone already expresses the whole filter or whether a second `$match`
/// stage must run after the lookups.
pub fn requires_post_lookup(table: &Table, tree: &FilterTree) -> Result<bool, ConnectorError> {
    match tree {
        FilterTree::And(parts) | FilterTree::Or(parts) => {
            for part in parts {
                if requires_post_lookup(table, part)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        FilterTree::Not(inner) => requires_post_lookup(table, inner),
        FilterTree::Leaf(map) => {
            for key in map.keys() {
                let property = table
                    .resolve(key)
                    .ok_or_else(|| ConnectorError::not_found(format!("table '{}' has no field or relation named '{key}'", table.name)))?;
                if let Property::Relation(relation) = property {
                    if !matches!(relation.side, RelationSide::Owner { .. }) {
                        return Ok(true);
                    }
                }
            }
            Ok(false)
        }
    }
}

/// Builds the complete `$match` document once every relation's `$lookup`
/// has already run: field and owner-relation predicates compile exactly as
/// in [`walk_root`]; a to-many relation predicate compiles against its own
/// `$lookup`-produced array field (named after the relation's property
/// name, the pipeline's `as` convention) via
/// [`relation_stage_after_lookup`]. Returns the `$match` document alongside
/// any extra pipeline stages an aggregate predicate needed — the caller
/// must splice those in right before pushing the returned document as a
/// `$match` stage.
pub fn walk_full(ctx: &MatchContext, table: &Table, tree: &FilterTree) -> Result<(Document, Vec<Document>), ConnectorError> {
    match tree {
        FilterTree::And(parts) => {
            let mut docs = Vec::new();
            let mut stages = Vec::new();
            for part in parts {
                let (doc, extra) = walk_full(ctx, table, part)?;
                docs.push(doc);
                stages.extend(extra);
            }
            Ok((doc! { "$and": docs }, stages))
        }
        FilterTree::Or(parts) => {
            let mut docs = Vec::new();
            let mut stages = Vec::new();
            for part in parts {
                let (doc, extra) = walk_full(ctx, table, part)?;
                docs.push(doc);
                stages.extend(extra);
            }
            Ok((doc! { "$or": docs }, stages))
        }
        FilterTree::Not(inner) => {
            let (inner_doc, stages) = walk_full(ctx, table, inner)?;
            Ok((doc! { "$nor": [inner_doc] }, stages))
        }
        FilterTree::Leaf(map) => {
            let mut merged = Document::new();
            let mut stages = Vec::new();
            for (key, value) in map {
                let property = table
                    .resolve(key)
                    .ok_or_else(|| ConnectorError::not_found(format!("table '{}' has no field or relation named '{key}'", table.name)))?;
                let part = match property {
                    Property::Field(column) => field_condition(column, value)?,
                    Property::Relation(relation) if matches!(relation.side, RelationSide::Owner { .. }) => owner_relation_condition(ctx, relation, value)?,
                    Property::Relation(relation) => {
                        let (doc, extra) = relation_stage_after_lookup(ctx, table, relation, &relation.property_name, value)?;
                        stages.extend(extra);
                        doc
                    }
                };
                merged.extend(part);
            }
            Ok((merged, stages))
        }
    }
}

/// The field on `target` that correlates an aggregate sub-lookup back to
/// `table`'s own row, mirroring `sql-query-connector::walker::relation_target_fk`.
fn relation_target_fk(ctx: &MatchContext, table: &Table, relation: &Relation, target: &Table) -> Result<String, ConnectorError> {
    match &relation.side {
        RelationSide::Owner { foreign_key_column } => Ok(foreign_key_column.clone()),
        RelationSide::Collection | RelationSide::InverseSingle => {
            let owner = ctx
                .metadata
                .owner_relation_on(target, &table.name, relation.inverse_property_name.as_deref())
                .ok_or_else(|| ConnectorError::internal("no owner relation found for aggregate subquery"))?;
            owner.foreign_key_column().map(String::from).ok_or_else(|| ConnectorError::internal("owner relation has no fk column"))
        }
        RelationSide::Junction(_) => Err(ConnectorError::validation("aggregate predicates over many-to-many relations are not supported")),
    }
}

fn mongo_compare_op(op: Operator) -> Result<&'static str, ConnectorError> {
    Ok(match op {
        Operator::Eq => "$eq",
        Operator::Neq => "$ne",
        Operator::Gt => "$gt",
        Operator::Gte => "$gte",
        Operator::Lt => "$lt",
        Operator::Lte => "$lte",
        other => return Err(ConnectorError::validation(format!("aggregate comparison does not accept operator '{other}'"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_structure::{Cardinality, Column, ColumnType, MetadataProvider, MetadataView, Table};
    use serde_json::json;
    use std::sync::Arc;

    fn order_table() -> Table {
        Table {
            name: "order".to_string(),
            system: false,
            unique_keys: vec![],
            indexes: vec![],
            columns: vec![Column::new("_id", ColumnType::Text).primary_key(), Column::new("total", ColumnType::Float)],
            relations: vec![],
        }
    }

    struct FixedProvider(Vec<Arc<Table>>);
    impl MetadataProvider for FixedProvider {
        fn get_table(&self, name: &str) -> Option<Arc<Table>> {
            self.0.iter().find(|t| t.name == name).cloned()
        }
        fn list_tables(&self) -> Vec<Arc<Table>> {
            self.0.clone()
        }
    }

    #[test]
    fn equality_on_a_scalar_field_matches_directly() {
        let metadata = MetadataView::new(Arc::new(FixedProvider(vec![Arc::new(order_table())])));
        let ctx = MatchContext { metadata: &metadata };
        let tree = FilterTree::parse(json!({ "total": { "_gt": 10.0 } })).unwrap();
        let doc = walk_root(&ctx, &order_table(), &tree).unwrap();
        assert_eq!(doc.get_document("total").unwrap().get_f64("$gt").unwrap(), 10.0);
    }

    #[test]
    fn id_equality_on_the_primary_key_maps_to_underscore_id() {
        let metadata = MetadataView::new(Arc::new(FixedProvider(vec![Arc::new(order_table())])));
        let ctx = MatchContext { metadata: &metadata };
        let tree = FilterTree::parse(json!({ "_id": "507f1f77bcf86cd799439011" })).unwrap();
        let doc = walk_root(&ctx, &order_table(), &tree).unwrap();
        let inner = doc.get_document("_id").unwrap();
        assert!(matches!(inner.get("$eq"), Some(Bson::ObjectId(_))));
    }

    #[test]
    fn empty_in_list_collapses_to_a_constant_false_match() {
        let metadata = MetadataView::new(Arc::new(FixedProvider(vec![Arc::new(order_table())])));
        let ctx = MatchContext { metadata: &metadata };
        let tree = FilterTree::parse(json!({ "total": { "_in": [] } })).unwrap();
        let doc = walk_root(&ctx, &order_table(), &tree).unwrap();
        assert_eq!(doc, doc! { "_id": { "$exists": false } });
    }

    #[test]
    fn count_aggregate_after_lookup_compiles_to_expr_size() {
        let relation = Relation {
            property_name: "items".to_string(),
            cardinality: Cardinality::OneToMany,
            source_table: "order".to_string(),
            target_table: "item".to_string(),
            inverse_property_name: Some("order".to_string()),
            owner: false,
            side: RelationSide::Collection,
            on_delete_cascade: false,
        };
        let metadata = MetadataView::new(Arc::new(FixedProvider(vec![Arc::new(order_table())])));
        let ctx = MatchContext { metadata: &metadata };
        let value = FilterValue::parse_operand(json!({ "_count": { "_gt": 2 } })).unwrap();
        let (doc, extra_stages) = relation_stage_after_lookup(&ctx, &order_table(), &relation, "items", &value).unwrap();
        assert!(doc.contains_key("$expr"));
        assert!(extra_stages.is_empty());
    }

    #[test]
    fn sum_aggregate_after_lookup_builds_a_dedicated_grouped_lookup() {
        let relation = Relation {
            property_name: "items".to_string(),
            cardinality: Cardinality::OneToMany,
            source_table: "order".to_string(),
            target_table: "item".to_string(),
            inverse_property_name: Some("order".to_string()),
            owner: false,
            side: RelationSide::Collection,
            on_delete_cascade: false,
        };
        let item_table = Table {
            name: "item".to_string(),
            system: false,
            unique_keys: vec![],
            indexes: vec![],
            columns: vec![
                Column::new("_id", ColumnType::Text).primary_key(),
                Column::new("price", ColumnType::Float),
                Column::new("orderId", ColumnType::Text),
            ],
            relations: vec![Relation {
                property_name: "order".to_string(),
                cardinality: Cardinality::ManyToOne,
                source_table: "item".to_string(),
                target_table: "order".to_string(),
                inverse_property_name: Some("items".to_string()),
                owner: false,
                side: RelationSide::Owner { foreign_key_column: "orderId".to_string() },
                on_delete_cascade: false,
            }],
        };
        let metadata = MetadataView::new(Arc::new(FixedProvider(vec![Arc::new(order_table()), Arc::new(item_table)])));
        let ctx = MatchContext { metadata: &metadata };
        let value = FilterValue::parse_operand(json!({ "_sum": { "price": { "_gt": 100.0 } } })).unwrap();
        let (doc, extra_stages) = relation_stage_after_lookup(&ctx, &order_table(), &relation, "items", &value).unwrap();
        assert!(doc.contains_key("$expr"));
        assert_eq!(extra_stages.len(), 1);
        assert!(extra_stages[0].contains_key("$lookup"));
    }
}
