//! Turns a parsed [`FilterTree`] into a [`ConditionTree`] bound against a
//! given table alias. Combinators descend structurally; a key that
//! resolves to a field becomes a direct column comparison, a key that
//! resolves to a relation becomes a membership test, a correlated
//! aggregate subquery, or an `EXISTS`, depending on what the relation's
//! value mapping contains (spec §4.3).

use quaint::ast::{Compare, CompareOp, ColumnRef, ConditionTree, Expression, Function, Select, SelectColumn, SubstringMode, TableRef, Value as SqlValue};
use quaint::dialect::Dialect;
use query_connector::{ConnectorError, FilterTree, FilterValue, Operator};
use query_structure::{MetadataView, Property, Relation, RelationSide, Table};

use crate::coerce::{coerce_list, coerce_scalar};

/// A filter tree bound to a specific table and alias.
pub struct WalkContext<'a> {
    pub metadata: &'a MetadataView,
    pub dialect: Dialect,
}

/// Walks `tree` against `table`'s columns/relations at `alias`, producing a
/// SQL condition tree. `depth` feeds the subquery alias scheme for any
/// relation predicate that needs its own correlated subquery.
pub fn walk(ctx: &WalkContext, table: &Table, alias: &str, tree: &FilterTree, depth: usize) -> Result<ConditionTree, ConnectorError> {
    match tree {
        FilterTree::And(parts) => Ok(ConditionTree::and(
            parts.iter().map(|p| walk(ctx, table, alias, p, depth)).collect::<Result<_, _>>()?,
        )),
        FilterTree::Or(parts) => Ok(ConditionTree::or(
            parts.iter().map(|p| walk(ctx, table, alias, p, depth)).collect::<Result<_, _>>()?,
        )),
        FilterTree::Not(inner) => Ok(walk(ctx, table, alias, inner, depth)?.not()),
        FilterTree::Leaf(map) => {
            let mut parts = Vec::with_capacity(map.len());
            for (key, value) in map {
                let property = table.resolve(key).ok_or_else(|| {
                    ConnectorError::not_found(format!("table '{}' has no field or relation named '{key}'", table.name))
                })?;
                let part = match property {
                    Property::Field(column) => field_condition(ctx, alias, column, value)?,
                    Property::Relation(relation) => relation_condition(ctx, table, alias, relation, value, depth)?,
                };
                parts.push(part);
            }
            Ok(ConditionTree::and(parts))
        }
    }
}

fn column_expr(_ctx: &WalkContext, alias: &str, column: &query_structure::Column) -> Expression {
    Expression::Column(ColumnRef::new(alias, column.name.clone()))
}

fn value_expr(ctx: &WalkContext, column_type: &query_structure::ColumnType, value: SqlValue) -> Expression {
    let expr = Expression::Value(value);
    if ctx.dialect == Dialect::Postgres && column_type.is_uuid() {
        Expression::Function(Function::CastToUuid(Box::new(expr)))
    } else {
        expr
    }
}

fn field_condition(
    ctx: &WalkContext,
    alias: &str,
    column: &query_structure::Column,
    value: &FilterValue,
) -> Result<ConditionTree, ConnectorError> {
    let FilterValue::Operators(ops) = value else {
        return Err(ConnectorError::validation(format!(
            "field '{}' does not accept a nested relation-style filter",
            column.name
        )));
    };

    let mut parts = Vec::with_capacity(ops.len());
    for op in ops {
        let col = column_expr(ctx, alias, column);
        let compare = match op.op {
            Operator::Eq => Compare::Equals(col, value_expr(ctx, &column.r#type, coerce_scalar(&op.operand, &column.r#type)?)),
            Operator::Neq => Compare::NotEquals(col, value_expr(ctx, &column.r#type, coerce_scalar(&op.operand, &column.r#type)?)),
            Operator::Gt => Compare::GreaterThan(col, value_expr(ctx, &column.r#type, coerce_scalar(&op.operand, &column.r#type)?)),
            Operator::Gte => {
                Compare::GreaterThanOrEquals(col, value_expr(ctx, &column.r#type, coerce_scalar(&op.operand, &column.r#type)?))
            }
            Operator::Lt => Compare::LessThan(col, value_expr(ctx, &column.r#type, coerce_scalar(&op.operand, &column.r#type)?)),
            Operator::Lte => {
                Compare::LessThanOrEquals(col, value_expr(ctx, &column.r#type, coerce_scalar(&op.operand, &column.r#type)?))
            }
            Operator::In => {
                let values = coerce_list(&op.operand, &column.r#type)?;
                let exprs = values.into_iter().map(|v| value_expr(ctx, &column.r#type, v)).collect();
                Compare::In(col, exprs)
            }
            Operator::NotIn => {
                let values = coerce_list(&op.operand, &column.r#type)?;
                let exprs = values.into_iter().map(|v| value_expr(ctx, &column.r#type, v)).collect();
                Compare::NotIn(col, exprs)
            }
            Operator::Between => {
                let Some(bounds) = op.operand.as_array() else {
                    return Err(ConnectorError::validation("_between expects a two-element array"));
                };
                if bounds.len() != 2 {
                    return Err(ConnectorError::validation("_between expects exactly two elements"));
                }
                let lo = value_expr(ctx, &column.r#type, coerce_scalar(&bounds[0], &column.r#type)?);
                let hi = value_expr(ctx, &column.r#type, coerce_scalar(&bounds[1], &column.r#type)?);
                Compare::Between(col, lo, hi)
            }
            Operator::Contains | Operator::StartsWith | Operator::EndsWith => {
                let mode = match op.op {
                    Operator::Contains => SubstringMode::Contains,
                    Operator::StartsWith => SubstringMode::StartsWith,
                    _ => SubstringMode::EndsWith,
                };
                let needle = op.operand.as_str().ok_or_else(|| ConnectorError::validation("substring operator expects a string operand"))?;
                let haystack = if column.r#type.is_uuid() {
                    Expression::Function(Function::CastToText(Box::new(col)))
                } else {
                    col
                };
                Compare::Substring {
                    haystack,
                    mode,
                    needle: Expression::Value(SqlValue::text(needle)),
                }
            }
            Operator::IsNull => Compare::IsNull(col),
            Operator::IsNotNull => Compare::IsNotNull(col),
            Operator::Count | Operator::Sum | Operator::Avg | Operator::Min | Operator::Max => {
                return Err(ConnectorError::validation(format!(
                    "aggregate operator '{}' cannot be applied to field '{}'",
                    op.op, column.name
                )))
            }
        };
        parts.push(ConditionTree::Compare(compare));
    }
    Ok(ConditionTree::and(parts))
}

fn relation_condition(
    ctx: &WalkContext,
    table: &Table,
    alias: &str,
    relation: &Relation,
    value: &FilterValue,
    depth: usize,
) -> Result<ConditionTree, ConnectorError> {
    let target = ctx.metadata.table(&relation.target_table)?;

    match value {
        // `{ _in: […] }` / `{ _not_in: […] }` — membership against the
        // target's primary key. No other operator may share the mapping.
        FilterValue::Operators(ops) if ops.len() == 1 && ops[0].op.is_membership() => {
            let op = &ops[0];
            let pk = target.primary_key_column().ok_or_else(|| {
                ConnectorError::internal(format!("table '{}' has no primary key", target.name))
            })?;
            let ids = coerce_list(&op.operand, &pk.r#type)?;
            let empty = ids.is_empty();

            match &relation.side {
                RelationSide::Junction(junction) => {
                    let junction_alias = format!("j_{}_{}", relation.property_name, depth);
                    let source_pk = table.primary_key_column_name(false);
                    let inner = Select::from_table(TableRef::aliased(junction.table_name.clone(), junction_alias.clone()))
                        .column(Expression::Value(SqlValue::Int32(1)), None)
                        .and_where(ConditionTree::Compare(Compare::Equals(
                            Expression::Column(ColumnRef::new(junction_alias.clone(), junction.source_column.clone())),
                            Expression::Column(ColumnRef::new(alias, source_pk)),
                        )))
                        .and_where(membership_tree(
                            Expression::Column(ColumnRef::new(junction_alias, junction.target_column.clone())),
                            op.op,
                            ids,
                        ));
                    let exists = ConditionTree::Exists(Box::new(inner));
                    Ok(if op.op == Operator::In {
                        if empty { ConditionTree::ConstFalse } else { exists }
                    } else if empty {
                        ConditionTree::ConstTrue
                    } else {
                        exists.not()
                    })
                }
                RelationSide::Owner { foreign_key_column } => {
                    let col = Expression::Column(ColumnRef::new(alias, foreign_key_column.clone()));
                    Ok(membership_tree(col, op.op, ids))
                }
                RelationSide::Collection | RelationSide::InverseSingle => {
                    let owner = ctx
                        .metadata
                        .owner_relation_on(&target, &table.name, relation.inverse_property_name.as_deref())
                        .ok_or_else(|| ConnectorError::internal(format!("no owner relation found back to '{}'", table.name)))?;
                    let fk = owner.foreign_key_column().ok_or_else(|| ConnectorError::internal("owner relation has no fk column"))?.to_string();
                    let child_alias = format!("sub_{}_{}", relation.property_name, depth);
                    let target_pk = target.primary_key_column_name(false);
                    let inner = Select::from_table(TableRef::aliased(target.name.clone(), child_alias.clone()))
                        .column(Expression::Value(SqlValue::Int32(1)), None)
                        .and_where(ConditionTree::Compare(Compare::Equals(
                            Expression::Column(ColumnRef::new(child_alias.clone(), fk)),
                            Expression::Column(ColumnRef::new(alias, table.primary_key_column_name(false))),
                        )))
                        .and_where(membership_tree(
                            Expression::Column(ColumnRef::new(child_alias, target_pk)),
                            Operator::In,
                            ids.clone(),
                        ));
                    let exists = ConditionTree::Exists(Box::new(inner));
                    Ok(if op.op == Operator::In {
                        if empty { ConditionTree::ConstFalse } else { exists }
                    } else if empty {
                        ConditionTree::ConstTrue
                    } else {
                        exists.not()
                    })
                }
            }
        }
        // `{ id: { … } }` against an owner-side FK column: rewrite to a
        // direct comparison on the local FK, no subquery.
        FilterValue::Nested(FilterTree::Leaf(inner)) if inner.len() == 1 && inner.contains_key("id") && relation.is_owner_side() => {
            let fk = relation.foreign_key_column().expect("owner side has an fk").to_string();
            let pk = target.primary_key_column().ok_or_else(|| ConnectorError::internal("target has no primary key"))?;
            field_condition(ctx, alias, &pk_as_local_column(&fk, pk), &inner["id"])
        }
        // Aggregate predicate: `{ _count: { _gt: 5 } }` etc.
        FilterValue::Operators(ops) if ops.len() == 1 && ops[0].op.is_aggregate() => {
            aggregate_condition(ctx, table, alias, relation, &target, &ops[0], depth)
        }
        // Anything else is a nested filter on the related table, compiled
        // as a correlated EXISTS (or membership through the junction for
        // many-to-many).
        FilterValue::Nested(inner) => exists_condition(ctx, table, alias, relation, &target, inner, depth),
        FilterValue::Operators(ops) => Err(ConnectorError::validation(format!(
            "relation '{}' filter combines incompatible operators ({} entries); reject rather than guess",
            relation.property_name,
            ops.len()
        ))),
    }
}

fn membership_tree(col: Expression, op: Operator, ids: Vec<SqlValue>) -> ConditionTree {
    let empty = ids.is_empty();
    let exprs: Vec<Expression> = ids.into_iter().map(Expression::Value).collect();
    match op {
        Operator::In if empty => ConditionTree::ConstFalse,
        Operator::NotIn if empty => ConditionTree::ConstTrue,
        Operator::In => ConditionTree::Compare(Compare::In(col, exprs)),
        Operator::NotIn => ConditionTree::Compare(Compare::NotIn(col, exprs)),
        _ => unreachable!("membership_tree only called for _in/_not_in"),
    }
}

fn pk_as_local_column(fk_name: &str, pk: &query_structure::Column) -> query_structure::Column {
    let mut column = pk.clone();
    column.name = fk_name.to_string();
    column
}

fn aggregate_condition(
    ctx: &WalkContext,
    table: &Table,
    alias: &str,
    relation: &Relation,
    target: &Table,
    op: &query_connector::OperatorValue,
    depth: usize,
) -> Result<ConditionTree, ConnectorError> {
    let agg = op.op;
    let target_alias = format!("agg_{}_{}", relation.property_name, depth);

    // `_count` compares directly against `{ <cmp_op>: value }`; the other
    // aggregates nest one level further to name the summed/averaged field:
    // `{ <fieldName>: { <cmp_op>: value } }`.
    let (function, cmp, value_type) = if agg == Operator::Count {
        let cmp = query_connector::FilterValue::parse_operand(op.operand.clone())?;
        let cmp = cmp.single()?.clone();
        (Function::Count(None), cmp, query_structure::ColumnType::BigInt)
    } else {
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
        let cmp = query_connector::FilterValue::parse_operand(inner.clone())?;
        let cmp = cmp.single()?.clone();
        let column_expr = Expression::Column(ColumnRef::new(target_alias.clone(), column.name.clone()));
        let function = match agg {
            Operator::Sum => Function::Sum(Box::new(column_expr)),
            Operator::Avg => Function::Avg(Box::new(column_expr)),
            Operator::Min => Function::Min(Box::new(column_expr)),
            Operator::Max => Function::Max(Box::new(column_expr)),
            _ => unreachable!("agg is one of Sum/Avg/Min/Max here"),
        };
        (function, cmp, column.r#type.clone())
    };

    let cmp_op = match cmp.op {
        Operator::Eq => CompareOp::Eq,
        Operator::Neq => CompareOp::Neq,
        Operator::Gt => CompareOp::Gt,
        Operator::Gte => CompareOp::Gte,
        Operator::Lt => CompareOp::Lt,
        Operator::Lte => CompareOp::Lte,
        other => return Err(ConnectorError::validation(format!("aggregate comparison does not accept operator '{other}'"))),
    };

    let fk_col = relation_target_fk(ctx, table, relation, target)?;
    let correlation = ConditionTree::Compare(Compare::Equals(
        Expression::Column(ColumnRef::new(target_alias.clone(), fk_col)),
        Expression::Column(ColumnRef::new(alias, table.primary_key_column_name(false))),
    ));

    let subquery = Select::from_table(TableRef::aliased(target.name.clone(), target_alias))
        .column(Expression::Function(function), None)
        .and_where(correlation);

    let value = value_expr(ctx, &value_type, coerce_scalar(&cmp.operand, &value_type)?);

    Ok(ConditionTree::ScalarCompare {
        subquery: Box::new(subquery),
        op: cmp_op,
        value,
    })
}

fn relation_target_fk(ctx: &WalkContext, table: &Table, relation: &Relation, target: &Table) -> Result<String, ConnectorError> {
    match &relation.side {
        RelationSide::Owner { foreign_key_column } => Ok(foreign_key_column.clone()),
        RelationSide::Collection | RelationSide::InverseSingle => {
            let owner = ctx
                .metadata
                .owner_relation_on(target, &table.name, relation.inverse_property_name.as_deref())
                .ok_or_else(|| ConnectorError::internal("no owner relation found for aggregate subquery"))?;
            owner
                .foreign_key_column()
                .map(String::from)
                .ok_or_else(|| ConnectorError::internal("owner relation has no fk column"))
        }
        RelationSide::Junction(_) => Err(ConnectorError::validation("aggregate predicates over many-to-many relations are not supported")),
    }
}

fn exists_condition(
    ctx: &WalkContext,
    table: &Table,
    alias: &str,
    relation: &Relation,
    target: &Table,
    inner_filter: &FilterTree,
    depth: usize,
) -> Result<ConditionTree, ConnectorError> {
    let child_alias = format!("sub_{}_{}", relation.property_name, depth);

    let (from, correlation) = match &relation.side {
        RelationSide::Owner { foreign_key_column } => (
            TableRef::aliased(target.name.clone(), child_alias.clone()),
            ConditionTree::Compare(Compare::Equals(
                Expression::Column(ColumnRef::new(alias, foreign_key_column.clone())),
                Expression::Column(ColumnRef::new(child_alias.clone(), target.primary_key_column_name(false))),
            )),
        ),
        RelationSide::Collection | RelationSide::InverseSingle => {
            let owner = ctx
                .metadata
                .owner_relation_on(target, &table.name, relation.inverse_property_name.as_deref())
                .ok_or_else(|| ConnectorError::internal("no owner relation found for EXISTS subquery"))?;
            let fk = owner.foreign_key_column().ok_or_else(|| ConnectorError::internal("owner relation has no fk column"))?;
            (
                TableRef::aliased(target.name.clone(), child_alias.clone()),
                ConditionTree::Compare(Compare::Equals(
                    Expression::Column(ColumnRef::new(child_alias.clone(), fk.to_string())),
                    Expression::Column(ColumnRef::new(alias, table.primary_key_column_name(false))),
                )),
            )
        }
        RelationSide::Junction(junction) => {
            let junction_alias = format!("j_{}_{}", relation.property_name, depth);
            let source_pk = table.primary_key_column_name(false);
            let target_pk = target.primary_key_column_name(false);
            let select = Select::from_table(TableRef::aliased(junction.table_name.clone(), junction_alias.clone()))
                .column(Expression::Value(SqlValue::Int32(1)), None)
                .inner_join(
                    TableRef::aliased(target.name.clone(), child_alias.clone()),
                    ConditionTree::Compare(Compare::Equals(
                        Expression::Column(ColumnRef::new(junction_alias.clone(), junction.target_column.clone())),
                        Expression::Column(ColumnRef::new(child_alias.clone(), target_pk)),
                    )),
                )
                .and_where(ConditionTree::Compare(Compare::Equals(
                    Expression::Column(ColumnRef::new(junction_alias, junction.source_column.clone())),
                    Expression::Column(ColumnRef::new(alias, source_pk)),
                )))
                .and_where(walk(ctx, &target, &child_alias, inner_filter, depth + 1)?);
            return Ok(ConditionTree::Exists(Box::new(select)));
        }
    };

    let select = Select {
        columns: vec![SelectColumn { expr: Expression::Value(SqlValue::Int32(1)), alias: None }],
        from: Some(from),
        ..Default::default()
    }
    .and_where(correlation)
    .and_where(walk(ctx, &target, &child_alias, inner_filter, depth + 1)?);

    Ok(ConditionTree::Exists(Box::new(select)))
}
