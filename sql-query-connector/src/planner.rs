//! The field & join planner (spec §4.4): turns a requested field tree into
//! a root [`Select`] whose column list carries everything needed to
//! reconstruct a [`query_structure::Record`].
//!
//! Projection strategy by relation kind:
//! - owner (many-to-one / owning one-to-one), `id`-only or unrequested:
//!   the local foreign-key column directly, wrapped into `{ id: … }` shape
//!   by the normaliser — no subquery.
//! - owner with real fields requested: a correlated scalar subquery
//!   selecting a single `JSON_OBJECT(...)` row.
//! - inverse one-to-one: same shape, correlated on the target's own
//!   foreign key.
//! - one-to-many: a correlated scalar subquery aggregating rows with
//!   `JSON_ARRAYAGG`/`json_agg`, wrapped in `COALESCE(..., '[]')` so an
//!   empty match reads as an empty array rather than SQL `NULL`.
//! - many-to-many: never inlined here. The junction-backed fan-out is
//!   cheaper as one batched query over all parent ids, so it is left to
//!   `crate::postfetch` and returned from this module only as a deferred
//!   relation name the executor still owes the caller.
use quaint::ast::{ColumnRef, Compare, ConditionTree, Direction as SqlDirection, Expression, Function, Select, TableRef};
use query_connector::{ConnectorError, Direction, QueryArguments, SortField};
use query_structure::{Column, ColumnType, RelationSide, Table};

use crate::alias::SubqueryAliasAllocator;
use crate::fields::FieldGroups;
use crate::walker::{self, WalkContext};

/// Tags a root projection column with enough shape information for the
/// result normaliser to rebuild the right [`query_structure::Value`]
/// variant without re-deriving it from metadata a second time.
#[derive(Debug, Clone)]
pub enum ProjectedColumn {
    Scalar { property: String, column_type: ColumnType },
    /// `{ id: <fk value> }`, or `null` if the fk column is null.
    OwnerRef { property: String },
    /// A `JSON_OBJECT(...)` subquery result, or `null`.
    SingleJson { property: String },
    /// A `JSON_ARRAYAGG`/`json_agg` subquery result, always an array.
    CollectionJson { property: String },
}

pub struct Plan {
    pub select: Select,
    pub root_alias: String,
    pub projections: Vec<ProjectedColumn>,
    /// Many-to-many relations requested but left for `crate::postfetch`.
    pub deferred_many_to_many: Vec<String>,
    /// Index into `select`'s column list (and the decoded row) of the
    /// primary key, needed to correlate post-fetched many-to-many rows
    /// back onto their parent even when the caller didn't request `id`.
    /// Always >= `projections.len()` when `id` wasn't itself requested, in
    /// which case it names a column appended after every requested one;
    /// `normalize_row` only reads `projections.len()` columns, so the
    /// appended column is naturally excluded from the output record.
    pub pk_index: usize,
    pub pk_type: ColumnType,
}

pub fn plan_root(ctx: &WalkContext, table: &Table, args: &QueryArguments) -> Result<Plan, ConnectorError> {
    let root_alias = root_alias_for(&table.name);
    let groups = FieldGroups::from_paths(&args.fields);

    let mut select = Select::from_table(TableRef::aliased(table.name.clone(), root_alias.clone()));
    let mut projections = Vec::new();
    let mut deferred_many_to_many = Vec::new();

    for column in table.scalar_columns() {
        let owning_relation = table.relation_for_foreign_key(&column.name);
        let requested = groups.scalars.contains(&column.name) || (groups.wildcard && owning_relation.is_none());
        if !requested {
            continue;
        }
        select = select.column(Expression::Column(ColumnRef::new(root_alias.clone(), column.name.clone())), Some(&column.name));
        projections.push(ProjectedColumn::Scalar {
            property: column.name.clone(),
            column_type: column.r#type.clone(),
        });
    }

    for relation in &table.relations {
        let requested_explicitly = groups.children.contains_key(&relation.property_name);
        // A root wildcard auto-adds unrequested owner relations (reference
        // only) but never auto-expands inverse/collection relations — the
        // metadata graph can be cyclic and unexpanded relations are the
        // only thing that bounds it.
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
                let fk_column = table.column(foreign_key_column).ok_or_else(|| {
                    ConnectorError::internal(format!("owner relation '{}' has no fk column on its own table", relation.property_name))
                })?;

                if !requested_explicitly || is_id_only(&child_groups) {
                    select = select.column(Expression::Column(ColumnRef::new(root_alias.clone(), foreign_key_column.clone())), Some(&relation.property_name));
                    projections.push(ProjectedColumn::OwnerRef { property: relation.property_name.clone() });
                } else {
                    let target = ctx.metadata.table(&relation.target_table)?;
                    let mut alloc = SubqueryAliasAllocator::new();
                    let child_alias = alloc.next_table_alias();
                    let pairs = projection_pairs(ctx, &target, &child_alias, &child_groups, &mut alloc)?;
                    let target_pk = target.primary_key_column_name(false);
                    let subquery = Select::from_table(TableRef::aliased(target.name.clone(), child_alias.clone()))
                        .column(Expression::Function(Function::JsonObject(pairs)), None)
                        .and_where(ConditionTree::Compare(Compare::Equals(
                            Expression::Column(ColumnRef::new(child_alias, target_pk)),
                            Expression::Column(ColumnRef::new(root_alias.clone(), foreign_key_column.clone())),
                        )))
                        .limit(1);
                    select = select.column(Expression::Subquery(Box::new(subquery)), Some(&relation.property_name));
                    projections.push(ProjectedColumn::SingleJson { property: relation.property_name.clone() });
                }
            }
            RelationSide::InverseSingle => {
                let target = ctx.metadata.table(&relation.target_table)?;
                let owner = ctx
                    .metadata
                    .owner_relation_on(&target, &table.name, relation.inverse_property_name.as_deref())
                    .ok_or_else(|| ConnectorError::internal(format!("no owner relation found back to '{}'", table.name)))?;
                let fk = owner.foreign_key_column().ok_or_else(|| ConnectorError::internal("owner relation has no fk column"))?.to_string();

                let mut alloc = SubqueryAliasAllocator::new();
                let child_alias = alloc.next_table_alias();
                let pairs = projection_pairs(ctx, &target, &child_alias, &child_groups, &mut alloc)?;
                let subquery = Select::from_table(TableRef::aliased(target.name.clone(), child_alias.clone()))
                    .column(Expression::Function(Function::JsonObject(pairs)), None)
                    .and_where(ConditionTree::Compare(Compare::Equals(
                        Expression::Column(ColumnRef::new(child_alias, fk)),
                        Expression::Column(ColumnRef::new(root_alias.clone(), table.primary_key_column_name(false))),
                    )))
                    .limit(1);
                select = select.column(Expression::Subquery(Box::new(subquery)), Some(&relation.property_name));
                projections.push(ProjectedColumn::SingleJson { property: relation.property_name.clone() });
            }
            RelationSide::Collection => {
                let target = ctx.metadata.table(&relation.target_table)?;
                let owner = ctx
                    .metadata
                    .owner_relation_on(&target, &table.name, relation.inverse_property_name.as_deref())
                    .ok_or_else(|| ConnectorError::internal(format!("no owner relation found back to '{}'", table.name)))?;
                let fk = owner.foreign_key_column().ok_or_else(|| ConnectorError::internal("owner relation has no fk column"))?.to_string();

                let mut alloc = SubqueryAliasAllocator::new();
                let child_alias = alloc.next_table_alias();
                let pairs = projection_pairs(ctx, &target, &child_alias, &child_groups, &mut alloc)?;
                let mut inner = Select::from_table(TableRef::aliased(target.name.clone(), child_alias.clone()))
                    .column(Expression::Function(Function::JsonObject(pairs)), None)
                    .and_where(ConditionTree::Compare(Compare::Equals(
                        Expression::Column(ColumnRef::new(child_alias.clone(), fk)),
                        Expression::Column(ColumnRef::new(root_alias.clone(), table.primary_key_column_name(false))),
                    )));

                for sort in nested_sort_for(&args.sort, &relation.property_name) {
                    if let Some(column) = target.column(&sort.path[0]) {
                        inner = inner.order_by(Expression::Column(ColumnRef::new(child_alias.clone(), column.name.clone())), sql_direction(sort.direction));
                    }
                }

                let agg = Function::JsonArrayAgg(Box::new(inner.columns[0].expr.clone()));
                let subquery = Select {
                    columns: vec![quaint::ast::SelectColumn {
                        expr: Expression::Function(Function::Coalesce(vec![
                            Expression::Function(agg),
                            Expression::Raw(ctx.dialect.empty_json_array_literal().to_string()),
                        ])),
                        alias: None,
                    }],
                    ..inner
                };
                select = select.column(Expression::Subquery(Box::new(subquery)), Some(&relation.property_name));
                projections.push(ProjectedColumn::CollectionJson { property: relation.property_name.clone() });
            }
        }
    }

    if let Some(filter) = &args.filter {
        let cond = walker::walk(ctx, table, &root_alias, filter, 0)?;
        select = select.and_where(cond);
    }

    for sort in &args.sort {
        if sort.path.len() == 1 {
            if let Some(column) = table.column(&sort.path[0]) {
                select = select.order_by(Expression::Column(ColumnRef::new(root_alias.clone(), column.name.clone())), sql_direction(sort.direction));
            }
        }
        // Sorting by a field reached through a joined relation is left out
        // of this planner; none of the request shapes in scope need it and
        // it would require promoting the relation from a correlated
        // subquery to a real join just for the ORDER BY clause.
    }

    if args.pagination.limit > 0 {
        select = select.limit(args.pagination.limit as u64);
    }
    if args.pagination.offset() > 0 {
        select = select.offset(args.pagination.offset());
    }

    let pk = table.primary_key_column().ok_or_else(|| ConnectorError::internal(format!("table '{}' has no primary key", table.name)))?;
    let pk_index = match projections.iter().position(|p| matches!(p, ProjectedColumn::Scalar { property, .. } if property == &pk.name)) {
        Some(index) => index,
        None => {
            let index = projections.len();
            select = select.column(Expression::Column(ColumnRef::new(root_alias.clone(), pk.name.clone())), Some("__pk"));
            index
        }
    };

    Ok(Plan {
        select,
        root_alias,
        projections,
        deferred_many_to_many,
        pk_index,
        pk_type: pk.r#type.clone(),
    })
}

/// Builds the `JSON_OBJECT` key/value pairs for one related table reached
/// at `alias`, recursing into its own owner/inverse/collection relations to
/// any depth. Many-to-many relations are still omitted at nested depth —
/// there is no post-fetch pass that reaches inside an already-aggregated
/// JSON object, so a nested `_posts.tags_` request simply returns without
/// that field rather than guessing at a second aggregation layer; sorting a
/// nested collection is likewise left unsupported below the first level,
/// matching `plan_root`'s own single-level `ORDER BY` restriction.
pub(crate) fn projection_pairs(
    ctx: &WalkContext,
    target: &Table,
    alias: &str,
    groups: &FieldGroups,
    alloc: &mut SubqueryAliasAllocator,
) -> Result<Vec<(String, Expression)>, ConnectorError> {
    let mut pairs = Vec::new();

    for column in target.scalar_columns() {
        let owning_relation = target.relation_for_foreign_key(&column.name);
        let requested = groups.scalars.contains(&column.name) || (groups.wildcard && owning_relation.is_none());
        if !requested {
            continue;
        }
        pairs.push((column.name.clone(), Expression::Column(ColumnRef::new(alias, column.name.clone()))));
    }

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
                    pairs.push((
                        relation.property_name.clone(),
                        Expression::Column(ColumnRef::new(alias, foreign_key_column.clone())),
                    ));
                } else {
                    let grandchild = ctx.metadata.table(&relation.target_table)?;
                    let child_alias = alloc.next_table_alias();
                    let inner_pairs = projection_pairs(ctx, &grandchild, &child_alias, &child_groups, alloc)?;
                    let target_pk = grandchild.primary_key_column_name(false);
                    let subquery = Select::from_table(TableRef::aliased(grandchild.name.clone(), child_alias.clone()))
                        .column(Expression::Function(Function::JsonObject(inner_pairs)), None)
                        .and_where(ConditionTree::Compare(Compare::Equals(
                            Expression::Column(ColumnRef::new(child_alias, target_pk)),
                            Expression::Column(ColumnRef::new(alias, foreign_key_column.clone())),
                        )))
                        .limit(1);
                    pairs.push((relation.property_name.clone(), Expression::Subquery(Box::new(subquery))));
                }
            }
            RelationSide::InverseSingle => {
                let grandchild = ctx.metadata.table(&relation.target_table)?;
                let owner = ctx
                    .metadata
                    .owner_relation_on(&grandchild, &target.name, relation.inverse_property_name.as_deref())
                    .ok_or_else(|| ConnectorError::internal(format!("no owner relation found back to '{}'", target.name)))?;
                let fk = owner.foreign_key_column().ok_or_else(|| ConnectorError::internal("owner relation has no fk column"))?.to_string();

                let child_alias = alloc.next_table_alias();
                let inner_pairs = projection_pairs(ctx, &grandchild, &child_alias, &child_groups, alloc)?;
                let subquery = Select::from_table(TableRef::aliased(grandchild.name.clone(), child_alias.clone()))
                    .column(Expression::Function(Function::JsonObject(inner_pairs)), None)
                    .and_where(ConditionTree::Compare(Compare::Equals(
                        Expression::Column(ColumnRef::new(child_alias, fk)),
                        Expression::Column(ColumnRef::new(alias, target.primary_key_column_name(false))),
                    )))
                    .limit(1);
                pairs.push((relation.property_name.clone(), Expression::Subquery(Box::new(subquery))));
            }
            RelationSide::Collection => {
                let grandchild = ctx.metadata.table(&relation.target_table)?;
                let owner = ctx
                    .metadata
                    .owner_relation_on(&grandchild, &target.name, relation.inverse_property_name.as_deref())
                    .ok_or_else(|| ConnectorError::internal(format!("no owner relation found back to '{}'", target.name)))?;
                let fk = owner.foreign_key_column().ok_or_else(|| ConnectorError::internal("owner relation has no fk column"))?.to_string();

                let child_alias = alloc.next_table_alias();
                let inner_pairs = projection_pairs(ctx, &grandchild, &child_alias, &child_groups, alloc)?;
                let inner = Select::from_table(TableRef::aliased(grandchild.name.clone(), child_alias.clone()))
                    .column(Expression::Function(Function::JsonObject(inner_pairs)), None)
                    .and_where(ConditionTree::Compare(Compare::Equals(
                        Expression::Column(ColumnRef::new(child_alias.clone(), fk)),
                        Expression::Column(ColumnRef::new(alias, target.primary_key_column_name(false))),
                    )));

                let agg = Function::JsonArrayAgg(Box::new(inner.columns[0].expr.clone()));
                let subquery = Select {
                    columns: vec![quaint::ast::SelectColumn {
                        expr: Expression::Function(Function::Coalesce(vec![
                            Expression::Function(agg),
                            Expression::Raw(ctx.dialect.empty_json_array_literal().to_string()),
                        ])),
                        alias: None,
                    }],
                    ..inner
                };
                pairs.push((relation.property_name.clone(), Expression::Subquery(Box::new(subquery))));
            }
        }
    }

    Ok(pairs)
}

fn is_id_only(groups: &FieldGroups) -> bool {
    !groups.wildcard && groups.children.is_empty() && groups.scalars.len() == 1 && groups.scalars.contains("id")
}

fn nested_sort_for<'a>(sort: &'a [SortField], property: &str) -> impl Iterator<Item = &'a SortField> {
    sort.iter().filter(move |s| s.path.len() == 2 && s.path[0] == property)
}

fn sql_direction(direction: Direction) -> SqlDirection {
    match direction {
        Direction::Asc => SqlDirection::Ascending,
        Direction::Desc => SqlDirection::Descending,
    }
}

fn root_alias_for(table_name: &str) -> String {
    let head: String = table_name.chars().take(1).collect();
    format!("{}0", head.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quaint::dialect::Dialect;
    use quaint::visitor::{MysqlVisitor, Visitor};
    use query_connector::query_arguments::{MetaRequest, Pagination};
    use query_structure::MetadataView;
    use std::sync::Arc;

    fn user_table() -> Table {
        Table {
            name: "user".to_string(),
            system: false,
            unique_keys: vec![],
            indexes: vec![],
            columns: vec![Column::new("id", ColumnType::Integer).primary_key(), Column::new("name", ColumnType::Text)],
            relations: vec![query_structure::Relation {
                property_name: "posts".to_string(),
                cardinality: query_structure::Cardinality::OneToMany,
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
                Column::new("id", ColumnType::Integer).primary_key(),
                Column::new("title", ColumnType::Text),
                Column::new("authorId", ColumnType::Integer),
            ],
            relations: vec![query_structure::Relation {
                property_name: "author".to_string(),
                cardinality: query_structure::Cardinality::ManyToOne,
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
    impl query_structure::MetadataProvider for FixedProvider {
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
    fn wildcard_root_includes_owner_fk_but_not_collection() {
        let metadata = metadata();
        let ctx = WalkContext { metadata: &metadata, dialect: Dialect::Mysql };
        let plan = plan_root(&ctx, &post_table(), &args("post", &["*"])).unwrap();
        assert!(plan.projections.iter().any(|p| matches!(p, ProjectedColumn::OwnerRef { property } if property == "author")));
    }

    #[test]
    fn requested_collection_becomes_json_array_subquery() {
        let metadata = metadata();
        let ctx = WalkContext { metadata: &metadata, dialect: Dialect::Mysql };
        let plan = plan_root(&ctx, &user_table(), &args("user", &["id", "posts.id", "posts.title"])).unwrap();
        assert!(plan.projections.iter().any(|p| matches!(p, ProjectedColumn::CollectionJson { property } if property == "posts")));
        let (sql, _) = MysqlVisitor.visit_select(&plan.select);
        assert!(sql.contains("JSON_ARRAYAGG"), "sql: {sql}");
        assert!(sql.contains("COALESCE"), "sql: {sql}");
    }

    #[test]
    fn requested_owner_with_real_fields_becomes_scalar_subquery() {
        let metadata = metadata();
        let ctx = WalkContext { metadata: &metadata, dialect: Dialect::Mysql };
        let plan = plan_root(&ctx, &post_table(), &args("post", &["id", "author.id", "author.name"])).unwrap();
        assert!(plan.projections.iter().any(|p| matches!(p, ProjectedColumn::SingleJson { property } if property == "author")));
    }

    #[test]
    fn id_only_owner_request_stays_a_plain_column() {
        let metadata = metadata();
        let ctx = WalkContext { metadata: &metadata, dialect: Dialect::Mysql };
        let plan = plan_root(&ctx, &post_table(), &args("post", &["id", "author.id"])).unwrap();
        assert!(plan.projections.iter().any(|p| matches!(p, ProjectedColumn::OwnerRef { property } if property == "author")));
    }
}
