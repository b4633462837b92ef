use super::conditions::ConditionTree;
use super::expression::Expression;

#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), alias: None }
    }

    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self { name: name.into(), alias: Some(alias.into()) }
    }

    /// The identifier a column reference against this table should use.
    pub fn reference(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Left,
    Inner,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub table: TableRef,
    pub on: ConditionTree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expression,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectColumn {
    pub expr: Expression,
    pub alias: Option<String>,
}

/// A `WITH <name> AS (<select>)` fragment. Used by the join planner to
/// pre-select the primary keys of a page before fanning out aggregate
/// subqueries, so those subqueries run once per page row instead of once
/// per row of the whole table.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub select: Box<Select>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Select {
    pub ctes: Vec<Cte>,
    pub distinct: bool,
    pub columns: Vec<SelectColumn>,
    pub from: Option<TableRef>,
    pub joins: Vec<Join>,
    pub conditions: Option<ConditionTree>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Select {
    pub fn from_table(table: TableRef) -> Self {
        Self { from: Some(table), ..Default::default() }
    }

    pub fn column(mut self, expr: impl Into<Expression>, alias: Option<&str>) -> Self {
        self.columns.push(SelectColumn { expr: expr.into(), alias: alias.map(str::to_string) });
        self
    }

    pub fn and_where(mut self, condition: ConditionTree) -> Self {
        self.conditions = Some(match self.conditions.take() {
            Some(existing) => ConditionTree::and(vec![existing, condition]),
            None => condition,
        });
        self
    }

    pub fn left_join(mut self, table: TableRef, on: ConditionTree) -> Self {
        self.joins.push(Join { join_type: JoinType::Left, table, on });
        self
    }

    pub fn inner_join(mut self, table: TableRef, on: ConditionTree) -> Self {
        self.joins.push(Join { join_type: JoinType::Inner, table, on });
        self
    }

    pub fn order_by(mut self, expr: impl Into<Expression>, direction: Direction) -> Self {
        self.order_by.push(OrderByExpr { expr: expr.into(), direction });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_cte(mut self, cte: Cte) -> Self {
        self.ctes.push(cte);
        self
    }

    /// A copy of this select stripped of its projection and ordering, for
    /// use as a `COUNT(DISTINCT pk)` filtered-count query.
    pub fn as_count_shell(&self) -> Select {
        Select {
            ctes: self.ctes.clone(),
            distinct: false,
            columns: vec![],
            from: self.from.clone(),
            joins: self.joins.clone(),
            conditions: self.conditions.clone(),
            order_by: vec![],
            limit: None,
            offset: None,
        }
    }
}
