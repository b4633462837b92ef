use super::select::Select;
use super::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    pub fn unqualified(name: impl Into<String>) -> Self {
        Self {
            table: None,
            name: name.into(),
        }
    }
}

/// A named aggregate/scalar function call. Kept as a small closed set
/// rather than a generic `Function(String, Vec<Expression>)` because every
/// call site in this crate needs dialect-specific naming (`JSON_ARRAYAGG`
/// vs `json_agg`) rather than a literal function name.
#[derive(Debug, Clone, PartialEq)]
pub enum Function {
    Count(Option<Box<Expression>>),
    /// `COUNT(DISTINCT expr)`, used for a root row count where a join could
    /// otherwise multiply rows (the filter-count shell never joins
    /// collection relations in, but stays explicit about the distinction
    /// rather than relying on that coincidence).
    CountDistinct(Box<Expression>),
    Sum(Box<Expression>),
    Avg(Box<Expression>),
    Min(Box<Expression>),
    Max(Box<Expression>),
    Coalesce(Vec<Expression>),
    /// `JSON_OBJECT('k1', v1, 'k2', v2, …)`, emitted with the dialect's
    /// object-constructor function name.
    JsonObject(Vec<(String, Expression)>),
    /// `JSON_ARRAYAGG(inner)` / `json_agg(inner)`, emitted with the
    /// dialect's array-aggregate function name.
    JsonArrayAgg(Box<Expression>),
    /// Casts `expr` to text for cross-type comparison (postgres `::text`,
    /// pass-through elsewhere).
    CastToText(Box<Expression>),
    /// Casts `expr` to a UUID literal (postgres only).
    CastToUuid(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Column(ColumnRef),
    Value(Value),
    Function(Function),
    Row(Vec<Expression>),
    /// A correlated scalar subquery used in a projection's column list —
    /// the join planner's way of attaching a related record or a
    /// `JSON_ARRAYAGG`/`json_agg` collection to a row without joining the
    /// relation into the row stream.
    Subquery(Box<Select>),
    /// An escape hatch for a pre-rendered fragment the dialect layer
    /// produced directly (e.g. `CONCAT('%', ?, '%')`). The string is never
    /// built from unescaped user input — only from literal SQL syntax
    /// around already-parameterised sub-expressions rendered by the
    /// visitor.
    Raw(String),
    Asterisk,
}

impl From<ColumnRef> for Expression {
    fn from(c: ColumnRef) -> Self {
        Expression::Column(c)
    }
}
impl From<Value> for Expression {
    fn from(v: Value) -> Self {
        Expression::Value(v)
    }
}
impl From<Function> for Expression {
    fn from(f: Function) -> Self {
        Expression::Function(f)
    }
}
