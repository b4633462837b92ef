//! The Mongo field & join planner (spec §4.4, §4.6): turns a requested field
//! tree into an aggregation pipeline stage list, in the order spec §4.6
//! fixes: `$match`, one `$lookup` per inline relation (owner relations
//! unwound to a single embedded document; inverse collections kept as an
//! embedded array), a second `$match` for any filter predicate that needed
//! those lookups, `$sort`, `$skip`, `$limit`, `$project`. Many-to-many
//! relations are never inlined here, mirroring
//! `sql-query-connector::planner`: they are always left to
//! `crate::postfetch` as one batched query per relation per page.

use bson::{doc, Bson, Document};
use query_connector::{ConnectorError, Direction, FieldGroups, QueryArguments, SortField};
use query_structure::{ColumnType, MetadataView, RelationSide, Table};

use crate::matcher::{self, mongo_field_name, MatchContext};

#[derive(Debug, Clone)]
pub enum ProjectedField {
    /// `physical_field` is `_id` for the primary key, `property` otherwise
    /// — every Mongo document's primary key lives under `_id` regardless
    /// of the logical column name metadata gives it.
    Scalar { property: String, physical_field: String, column_type: ColumnType },
    /// The local foreign-key value only, shaped into `{ id: … }` (or
    /// `null`) by the normaliser — no `$lookup` needed.
    OwnerRef { property: String, foreign_key_field: String },
    /// An embedded document produced by `$lookup` + `$unwind`.
    Embedded { property: String },
    /// An embedded array produced by `$lookup` (no unwind).
    EmbeddedArray { property: String },
}

pub struct MongoPlan {
    pub stages: Vec<Document>,
    pub projections: Vec<ProjectedField>,
    pub deferred_many_to_many: Vec<String>,
    pub pk_field: String,
}

pub fn build_pipeline(metadata: &MetadataView, table: &Table, args: &QueryArguments) -> Result<MongoPlan, ConnectorError> {
    let groups = FieldGroups::from_paths(&args.fields);
    let ctx = MatchContext { metadata };

    let mut stages = Vec::new();
    let mut projections = Vec::new();
    let mut deferred_many_to_many = Vec::new();
    let mut post_lookup_match = None;
    let mut post_lookup_stages = Vec::new();

    if let Some(filter) = &args.filter {
        let root_match = matcher::walk_root(&ctx, table, filter)?;
        if !root_match.is_empty() {
            stages.push(doc! { "$match": root_match });
        }
        if matcher::requires_post_lookup(table, filter)? {
            let (doc, extra) = matcher::walk_full(&ctx, table, filter)?;
            post_lookup_match = Some(doc);
            post_lookup_stages = extra;
        }
    }

    for column in table.scalar_columns() {
        let owning_relation = table.relation_for_foreign_key(&column.name);
        let requested = groups.scalars.contains(&column.name) || (groups.wildcard && owning_relation.is_none());
        if !requested {
            continue;
        }
        projections.push(ProjectedField::Scalar {
            property: column.name.clone(),
            physical_field: mongo_field_name(column),
            column_type: column.r#type.clone(),
        });
    }

    for relation in &table.relations {
        let requested_explicitly = groups.children.contains_key(&relation.property_name);
        let auto_included = groups.wildcard && relation.is_owner_side() && !requested_explicitly;
        if !requested_explicitly && !auto_included {
            continue;
        }

        let child_groups = groups.children.get(&relation.property_name).cloned().unwrap_or_default();

        match &relation.side {
            RelationSide::Junction(_) => {
                deferred_many_to_many.push(relation.property_name.clone());
            }
            RelationSide::Owner { foreign_key_column } => {
                if !requested_explicitly || is_id_only(&child_groups) {
                    projections.push(ProjectedField::OwnerRef {
                        property: relation.property_name.clone(),
                        foreign_key_field: foreign_key_column.clone(),
                    });
                } else {
                    let target = metadata.table(&relation.target_table)?;
                    let inner_pipeline = lookup_inner_pipeline(metadata, &target, &child_groups)?;
                    stages.push(doc! {
                        "$lookup": {
                            "from": target.name.clone(),
                            "let": { "fk": format!("${foreign_key_column}") },
                            "pipeline": [
                                doc! { "$match": { "$expr": { "$eq": ["$_id", "$$fk"] } } },
                            ]
                            .into_iter()
                            .chain(inner_pipeline)
                            .collect::<Vec<_>>(),
                            "as": relation.property_name.clone(),
                        }
                    });
                    push_unwind_and_null(&mut stages, &relation.property_name);
                    projections.push(ProjectedField::Embedded { property: relation.property_name.clone() });
                }
            }
            RelationSide::InverseSingle => {
                let target = metadata.table(&relation.target_table)?;
                let owner = metadata
                    .owner_relation_on(&target, &table.name, relation.inverse_property_name.as_deref())
                    .ok_or_else(|| ConnectorError::internal(format!("no owner relation found back to '{}'", table.name)))?;
                let fk = owner.foreign_key_column().ok_or_else(|| ConnectorError::internal("owner relation has no fk column"))?.to_string();

                let inner_pipeline = lookup_inner_pipeline(metadata, &target, &child_groups)?;
                stages.push(doc! {
                    "$lookup": {
                        "from": target.name.clone(),
                        "let": { "pid": "$_id" },
                        "pipeline": [
                            doc! { "$match": { "$expr": { "$eq": [format!("${fk}"), "$$pid"] } } },
                        ]
                        .into_iter()
                        .chain(inner_pipeline)
                        .collect::<Vec<_>>(),
                        "as": relation.property_name.clone(),
                    }
                });
                push_unwind_and_null(&mut stages, &relation.property_name);
                projections.push(ProjectedField::Embedded { property: relation.property_name.clone() });
            }
            RelationSide::Collection => {
                let target = metadata.table(&relation.target_table)?;
                let owner = metadata
                    .owner_relation_on(&target, &table.name, relation.inverse_property_name.as_deref())
                    .ok_or_else(|| ConnectorError::internal(format!("no owner relation found back to '{}'", table.name)))?;
                let fk = owner.foreign_key_column().ok_or_else(|| ConnectorError::internal("owner relation has no fk column"))?.to_string();

                let mut inner_pipeline = vec![doc! { "$match": { "$expr": { "$eq": [format!("${fk}"), "$$pid"] } } }];
                for sort in nested_sort_for(&args.sort, &relation.property_name) {
                    if let Some(column) = target.column(&sort.path[0]) {
                        inner_pipeline.push(doc! { "$sort": { column.name.clone(): mongo_sort_direction(sort.direction) } });
                    }
                }
                inner_pipeline.extend(lookup_inner_pipeline(metadata, &target, &child_groups)?);

                stages.push(doc! {
                    "$lookup": {
                        "from": target.name.clone(),
                        "let": { "pid": "$_id" },
                        "pipeline": inner_pipeline,
                        "as": relation.property_name.clone(),
                    }
                });
                projections.push(ProjectedField::EmbeddedArray { property: relation.property_name.clone() });
            }
        }
    }

    if let Some(doc) = post_lookup_match {
        stages.extend(post_lookup_stages);
        if !doc.is_empty() {
            stages.push(doc! { "$match": doc });
        }
    }

    for sort in &args.sort {
        if sort.path.len() == 1 {
            if let Some(column) = table.column(&sort.path[0]) {
                stages.push(doc! { "$sort": { column.name.clone(): mongo_sort_direction(sort.direction) } });
            }
        }
        // A sort path reaching through a relation is left out, matching
        // `sql-query-connector::planner`'s own scope limit.
    }

    if args.pagination.offset() > 0 {
        stages.push(doc! { "$skip": args.pagination.offset() as i64 });
    }
    if args.pagination.limit > 0 {
        stages.push(doc! { "$limit": args.pagination.limit as i64 });
    }

    Ok(MongoPlan {
        stages,
        projections,
        deferred_many_to_many,
        pk_field: "_id".to_string(),
    })
}

/// Builds the part of a `$lookup`'s sub-pipeline that projects the
/// requested fields of the looked-up document, recursing to any depth into
/// its own owner/inverse/collection relations (mirroring
/// `sql-query-connector::planner::projection_pairs`). Sorting a nested
/// collection relation is left unsupported below the first level, matching
/// `build_pipeline`'s own single-level `$sort` restriction.
pub(crate) fn lookup_inner_pipeline(metadata: &MetadataView, target: &Table, groups: &FieldGroups) -> Result<Vec<Document>, ConnectorError> {
    if groups.wildcard && groups.children.is_empty() {
        return Ok(Vec::new());
    }

    let mut projection = Document::new();
    for column in target.scalar_columns() {
        let owning_relation = target.relation_for_foreign_key(&column.name);
        let requested = groups.scalars.contains(&column.name) || (groups.wildcard && owning_relation.is_none());
        if requested {
            projection.insert(mongo_field_name(column), 1);
        }
    }

    let mut nested_lookups = Vec::new();
    for relation in &target.relations {
        let requested_explicitly = groups.children.contains_key(&relation.property_name);
        let auto_included = groups.wildcard && relation.is_owner_side() && !requested_explicitly;
        if !requested_explicitly && !auto_included {
            continue;
        }
        let child_groups = groups.children.get(&relation.property_name).cloned().unwrap_or_default();

        match &relation.side {
            RelationSide::Junction(_) => continue,
            RelationSide::Owner { foreign_key_column } => {
                if !requested_explicitly || is_id_only(&child_groups) {
                    projection.insert(foreign_key_column.clone(), 1);
                    // `normalize.rs` reshapes this fk value into the
                    // relation's own `{ id }` shape under `property_name`.
                } else {
                    let grandchild = metadata.table(&relation.target_table)?;
                    let inner = lookup_inner_pipeline(metadata, &grandchild, &child_groups)?;
                    nested_lookups.push(doc! {
                        "$lookup": {
                            "from": grandchild.name.clone(),
                            "let": { "fk": format!("${foreign_key_column}") },
                            "pipeline": [doc! { "$match": { "$expr": { "$eq": ["$_id", "$$fk"] } } }]
                                .into_iter()
                                .chain(inner)
                                .collect::<Vec<_>>(),
                            "as": relation.property_name.clone(),
                        }
                    });
                    nested_lookups.push(doc! {
                        "$unwind": { "path": format!("${}", relation.property_name), "preserveNullAndEmptyArrays": true }
                    });
                    projection.insert(relation.property_name.clone(), 1);
                }
            }
            RelationSide::InverseSingle => {
                let grandchild = metadata.table(&relation.target_table)?;
                let owner = metadata
                    .owner_relation_on(&grandchild, &target.name, relation.inverse_property_name.as_deref())
                    .ok_or_else(|| ConnectorError::internal(format!("no owner relation found back to '{}'", target.name)))?;
                let fk = owner.foreign_key_column().ok_or_else(|| ConnectorError::internal("owner relation has no fk column"))?.to_string();

                let inner = lookup_inner_pipeline(metadata, &grandchild, &child_groups)?;
                nested_lookups.push(doc! {
                    "$lookup": {
                        "from": grandchild.name.clone(),
                        "let": { "pid": "$_id" },
                        "pipeline": [doc! { "$match": { "$expr": { "$eq": [format!("${fk}"), "$$pid"] } } }]
                            .into_iter()
                            .chain(inner)
                            .collect::<Vec<_>>(),
                        "as": relation.property_name.clone(),
                    }
                });
                nested_lookups.push(doc! {
                    "$unwind": { "path": format!("${}", relation.property_name), "preserveNullAndEmptyArrays": true }
                });
                nested_lookups.push(doc! {
                    "$addFields": { relation.property_name.clone(): { "$ifNull": [format!("${}", relation.property_name), Bson::Null] } }
                });
                projection.insert(relation.property_name.clone(), 1);
            }
            RelationSide::Collection => {
                let grandchild = metadata.table(&relation.target_table)?;
                let owner = metadata
                    .owner_relation_on(&grandchild, &target.name, relation.inverse_property_name.as_deref())
                    .ok_or_else(|| ConnectorError::internal(format!("no owner relation found back to '{}'", target.name)))?;
                let fk = owner.foreign_key_column().ok_or_else(|| ConnectorError::internal("owner relation has no fk column"))?.to_string();

                let inner = lookup_inner_pipeline(metadata, &grandchild, &child_groups)?;
                nested_lookups.push(doc! {
                    "$lookup": {
                        "from": grandchild.name.clone(),
                        "let": { "pid": "$_id" },
                        "pipeline": [doc! { "$match": { "$expr": { "$eq": [format!("${fk}"), "$$pid"] } } }]
                            .into_iter()
                            .chain(inner)
                            .collect::<Vec<_>>(),
                        "as": relation.property_name.clone(),
                    }
                });
                projection.insert(relation.property_name.clone(), 1);
            }
        }
    }

    let mut pipeline = nested_lookups;
    if !projection.is_empty() {
        projection.insert("_id", 1);
        pipeline.push(doc! { "$project": projection });
    }
    Ok(pipeline)
}

/// After `$lookup` + `$unwind(preserveNullAndEmptyArrays)`, a relation with
/// no matching document ends up with its field entirely absent rather than
/// `null` (Mongo's unwind semantics). This stage normalises that to an
/// explicit `null` so `normalize.rs` doesn't have to special-case "missing
/// vs. null".
fn push_unwind_and_null(stages: &mut Vec<Document>, field: &str) {
    stages.push(doc! { "$unwind": { "path": format!("${field}"), "preserveNullAndEmptyArrays": true } });
    stages.push(doc! { "$addFields": { field: { "$ifNull": [format!("${field}"), Bson::Null] } } });
}

fn is_id_only(groups: &FieldGroups) -> bool {
    !groups.wildcard && groups.children.is_empty() && groups.scalars.len() == 1 && groups.scalars.contains("id")
}

fn nested_sort_for<'a>(sort: &'a [SortField], property: &str) -> impl Iterator<Item = &'a SortField> {
    sort.iter().filter(move |s| s.path.len() == 2 && s.path[0] == property)
}

fn mongo_sort_direction(direction: Direction) -> i32 {
    match direction {
        Direction::Asc => 1,
        Direction::Desc => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_connector::query_arguments::{MetaRequest, Pagination};
    use query_structure::{Cardinality, Column, MetadataProvider, Relation};
    use std::sync::Arc;

    fn user_table() -> Table {
        Table {
            name: "user".to_string(),
            system: false,
            unique_keys: vec![],
            indexes: vec![],
            columns: vec![Column::new("_id", ColumnType::Text).primary_key(), Column::new("name", ColumnType::Text)],
            relations: vec![Relation {
                property_name: "posts".to_string(),
                cardinality: Cardinality::OneToMany,
                source_table: "user".to_string(),
                target_table: "post".to_string(),
                inverse_property_name: Some("author".to_string()),
                owner: false,
                side: RelationSide::Collection,
                on_delete_cascade: false,
            }],
        }
    }

    fn post_table() -> Table {
        Table {
            name: "post".to_string(),
            system: false,
            unique_keys: vec![],
            indexes: vec![],
            columns: vec![
                Column::new("_id", ColumnType::Text).primary_key(),
                Column::new("title", ColumnType::Text),
                Column::new("authorId", ColumnType::Text),
            ],
            relations: vec![Relation {
                property_name: "author".to_string(),
                cardinality: Cardinality::ManyToOne,
                source_table: "post".to_string(),
                target_table: "user".to_string(),
                inverse_property_name: Some("posts".to_string()),
                owner: false,
                side: RelationSide::Owner { foreign_key_column: "authorId".to_string() },
                on_delete_cascade: false,
            }],
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

    fn metadata() -> MetadataView {
        MetadataView::new(Arc::new(FixedProvider(vec![Arc::new(user_table()), Arc::new(post_table())])))
    }

    fn args(table: &str, fields: &[&str]) -> QueryArguments {
        QueryArguments {
            table_name: table.to_string(),
            fields: fields.iter().map(|s| s.to_string()).collect(),
            filter: None,
            sort: vec![],
            pagination: Pagination { page: 1, limit: 20 },
            meta: MetaRequest::default(),
            deep: Default::default(),
            debug_mode: false,
        }
    }

    #[test]
    fn requested_collection_becomes_a_lookup_with_no_unwind() {
        let metadata = metadata();
        let plan = build_pipeline(&metadata, &user_table(), &args("user", &["_id", "posts._id", "posts.title"])).unwrap();
        assert!(plan.stages.iter().any(|s| s.contains_key("$lookup")));
        assert!(!plan.stages.iter().any(|s| s.contains_key("$unwind")));
        assert!(plan.projections.iter().any(|p| matches!(p, ProjectedField::EmbeddedArray { property } if property == "posts")));
    }

    #[test]
    fn requested_owner_with_real_fields_unwinds_to_an_embedded_doc() {
        let metadata = metadata();
        let plan = build_pipeline(&metadata, &post_table(), &args("post", &["_id", "author._id", "author.name"])).unwrap();
        assert!(plan.stages.iter().any(|s| s.contains_key("$unwind")));
        assert!(plan.projections.iter().any(|p| matches!(p, ProjectedField::Embedded { property } if property == "author")));
    }

    #[test]
    fn id_only_owner_request_stays_a_plain_foreign_key_projection() {
        let metadata = metadata();
        let plan = build_pipeline(&metadata, &post_table(), &args("post", &["_id", "author._id"])).unwrap();
        assert!(plan.projections.iter().any(|p| matches!(p, ProjectedField::OwnerRef { property, .. } if property == "author")));
        assert!(!plan.stages.iter().any(|s| s.contains_key("$lookup")));
    }
}
