mod conditions;
mod expression;
mod mutation;
mod select;
mod value;

pub use conditions::{Compare, CompareOp, ConditionTree, SubstringMode};
pub use expression::{ColumnRef, Expression, Function};
pub use mutation::{Delete, Insert, Update};
pub use select::{Cte, Direction, Join, JoinType, OrderByExpr, Select, SelectColumn, TableRef};
pub use value::Value;
