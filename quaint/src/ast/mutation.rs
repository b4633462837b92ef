use super::conditions::ConditionTree;
use super::select::TableRef;
use super::value::Value;

/// A minimal write AST. The core of this crate is the read path; these
/// three shapes exist only so the hook pipeline (`query-core::hooks`) has
/// something concrete to wrap — full DML/migration planning is out of
/// scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: TableRef,
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: TableRef,
    pub assignments: Vec<(String, Value)>,
    pub conditions: Option<ConditionTree>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: TableRef,
    pub conditions: Option<ConditionTree>,
}
