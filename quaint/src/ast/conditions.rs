use super::expression::Expression;
use super::select::Select;

#[derive(Debug, Clone, PartialEq)]
pub enum Compare {
    Equals(Expression, Expression),
    NotEquals(Expression, Expression),
    GreaterThan(Expression, Expression),
    GreaterThanOrEquals(Expression, Expression),
    LessThan(Expression, Expression),
    LessThanOrEquals(Expression, Expression),
    In(Expression, Vec<Expression>),
    NotIn(Expression, Vec<Expression>),
    InSelect(Expression, Box<Select>),
    NotInSelect(Expression, Box<Select>),
    Between(Expression, Expression, Expression),
    /// A case- and accent-insensitive substring test. Rendering (operator,
    /// pattern wrapping, collation) is entirely the dialect visitor's
    /// responsibility — see `crate::dialect`.
    Substring { haystack: Expression, mode: SubstringMode, needle: Expression },
    IsNull(Expression),
    IsNotNull(Expression),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstringMode {
    Contains,
    StartsWith,
    EndsWith,
}

/// A boolean condition tree. `_and`/`_or`/`_not` in the filter tree compile
/// directly onto these variants; `Exists`/`NotExists` back relation
/// predicates that can't be rewritten onto a local foreign key.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionTree {
    And(Vec<ConditionTree>),
    Or(Vec<ConditionTree>),
    Not(Box<ConditionTree>),
    Compare(Compare),
    Exists(Box<Select>),
    NotExists(Box<Select>),
    /// A correlated scalar subquery compared against a value, used for
    /// aggregate relation predicates (`_count`, `_sum`, …).
    ScalarCompare { subquery: Box<Select>, op: CompareOp, value: Expression },
    ConstTrue,
    ConstFalse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl ConditionTree {
    pub fn and(parts: Vec<ConditionTree>) -> Self {
        if parts.len() == 1 {
            parts.into_iter().next().unwrap()
        } else {
            ConditionTree::And(parts)
        }
    }

    pub fn or(parts: Vec<ConditionTree>) -> Self {
        if parts.len() == 1 {
            parts.into_iter().next().unwrap()
        } else {
            ConditionTree::Or(parts)
        }
    }

    pub fn not(self) -> Self {
        match self {
            // `_not: { _not: F }` cancels, keeping the emitted tree
            // minimal and making the idempotence law easy to verify by
            // inspection of the plan rather than by trusting double
            // negation at render time.
            ConditionTree::Not(inner) => *inner,
            ConditionTree::ConstTrue => ConditionTree::ConstFalse,
            ConditionTree::ConstFalse => ConditionTree::ConstTrue,
            other => ConditionTree::Not(Box::new(other)),
        }
    }
}
