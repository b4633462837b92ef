//! The filter tree: a recursive, metadata-independent shape mirroring the
//! wire-level request. Resolving a key to a field or a relation needs
//! metadata and therefore happens downstream, in each connector's own
//! filter walker; this module only owns the structural parse.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::error::ConnectorError;

/// The closed set of operator tokens from the wire contract. Field-level
/// operators and relation aggregate operators share one enum because both
/// are parsed the same way (`_token: operand`); callers reject the
/// combinations that don't make sense in context (e.g. `_contains` on a
/// relation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Between,
    Contains,
    StartsWith,
    EndsWith,
    IsNull,
    IsNotNull,
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Operator {
    pub fn token(self) -> &'static str {
        match self {
            Operator::Eq => "_eq",
            Operator::Neq => "_neq",
            Operator::Gt => "_gt",
            Operator::Gte => "_gte",
            Operator::Lt => "_lt",
            Operator::Lte => "_lte",
            Operator::In => "_in",
            Operator::NotIn => "_not_in",
            Operator::Between => "_between",
            Operator::Contains => "_contains",
            Operator::StartsWith => "_starts_with",
            Operator::EndsWith => "_ends_with",
            Operator::IsNull => "_is_null",
            Operator::IsNotNull => "_is_not_null",
            Operator::Count => "_count",
            Operator::Sum => "_sum",
            Operator::Avg => "_avg",
            Operator::Min => "_min",
            Operator::Max => "_max",
        }
    }

    pub fn from_token(token: &str) -> Option<Operator> {
        Some(match token {
            "_eq" => Operator::Eq,
            "_neq" => Operator::Neq,
            "_gt" => Operator::Gt,
            "_gte" => Operator::Gte,
            "_lt" => Operator::Lt,
            "_lte" => Operator::Lte,
            "_in" => Operator::In,
            "_not_in" => Operator::NotIn,
            "_between" => Operator::Between,
            "_contains" => Operator::Contains,
            "_starts_with" => Operator::StartsWith,
            "_ends_with" => Operator::EndsWith,
            "_is_null" => Operator::IsNull,
            "_is_not_null" => Operator::IsNotNull,
            "_count" => Operator::Count,
            "_sum" => Operator::Sum,
            "_avg" => Operator::Avg,
            "_min" => Operator::Min,
            "_max" => Operator::Max,
            _ => return None,
        })
    }

    pub fn is_aggregate(self) -> bool {
        matches!(self, Operator::Count | Operator::Sum | Operator::Avg | Operator::Min | Operator::Max)
    }

    pub fn is_membership(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A single `operator: operand` pair inside a field or aggregate mapping.
#[derive(Debug, Clone)]
pub struct OperatorValue {
    pub op: Operator,
    pub operand: Json,
}

/// The content of one key in a filter mapping, before it has been
/// classified as a field or a relation (that classification needs
/// metadata). Either a bare scalar/array (implicit `_eq`), or an explicit
/// operator mapping, or a nested object whose keys are themselves
/// field/relation names (a nested relation filter).
#[derive(Debug, Clone)]
pub enum FilterValue {
    Operators(Vec<OperatorValue>),
    Nested(FilterTree),
}

impl FilterValue {
    /// Parses a single key's raw operand the same way a filter-tree leaf
    /// value is parsed. Exposed for callers that need to interpret a
    /// nested operand on their own terms (the aggregate-relation operator
    /// family nests a field name one level inside `_sum`/`_avg`/`_min`/`_max`).
    pub fn parse_operand(value: Json) -> Result<FilterValue, ConnectorError> {
        Self::parse(value)
    }

    fn parse(value: Json) -> Result<FilterValue, ConnectorError> {
        match value {
            Json::Object(map) if !map.is_empty() && map.keys().all(|k| Operator::from_token(k).is_some()) => {
                let mut ops = Vec::with_capacity(map.len());
                for (token, operand) in map {
                    let op = Operator::from_token(&token).expect("checked above");
                    ops.push(OperatorValue { op, operand });
                }
                Ok(FilterValue::Operators(ops))
            }
            Json::Object(_) => Ok(FilterValue::Nested(FilterTree::parse(value)?)),
            scalar => Ok(FilterValue::Operators(vec![OperatorValue {
                op: Operator::Eq,
                operand: scalar,
            }])),
        }
    }

    /// Convenience for the common single-operator case; errors if more than
    /// one operator was supplied where exactly one is expected (e.g. a
    /// relation membership test).
    pub fn single(&self) -> Result<&OperatorValue, ConnectorError> {
        match self {
            FilterValue::Operators(ops) if ops.len() == 1 => Ok(&ops[0]),
            FilterValue::Operators(ops) => Err(ConnectorError::validation(format!(
                "expected exactly one operator, found {}",
                ops.len()
            ))),
            FilterValue::Nested(_) => Err(ConnectorError::validation("expected an operator mapping, found a nested filter")),
        }
    }
}

/// A parsed filter tree. `Leaf` maps field/relation names to their (still
/// metadata-unresolved) [`FilterValue`]; combinators recurse.
#[derive(Debug, Clone)]
pub enum FilterTree {
    And(Vec<FilterTree>),
    Or(Vec<FilterTree>),
    Not(Box<FilterTree>),
    Leaf(IndexMap<String, FilterValue>),
}

impl FilterTree {
    pub fn parse(value: Json) -> Result<FilterTree, ConnectorError> {
        let Json::Object(map) = value else {
            return Err(ConnectorError::validation("filter tree must be an object at every level"));
        };

        if let Some(raw) = map.get("_and") {
            return Ok(FilterTree::And(parse_list(raw)?));
        }
        if let Some(raw) = map.get("_or") {
            return Ok(FilterTree::Or(parse_list(raw)?));
        }
        if let Some(raw) = map.get("_not") {
            return Ok(FilterTree::Not(Box::new(FilterTree::parse(raw.clone())?)));
        }

        let mut leaf = IndexMap::with_capacity(map.len());
        for (key, value) in map {
            leaf.insert(key, FilterValue::parse(value)?);
        }
        Ok(FilterTree::Leaf(leaf))
    }
}

fn parse_list(raw: &Json) -> Result<Vec<FilterTree>, ConnectorError> {
    let Json::Array(items) = raw else {
        return Err(ConnectorError::validation("_and/_or expect an array of filter trees"));
    };
    items.iter().cloned().map(FilterTree::parse).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_field_value_is_implicit_eq() {
        let tree = FilterTree::parse(json!({ "name": "ada" })).unwrap();
        let FilterTree::Leaf(map) = tree else { panic!("expected leaf") };
        let FilterValue::Operators(ops) = &map["name"] else { panic!("expected operators") };
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op, Operator::Eq);
        assert_eq!(ops[0].operand, json!("ada"));
    }

    #[test]
    fn combinators_recurse() {
        let tree = FilterTree::parse(json!({
            "_and": [
                { "name": { "_eq": "ada" } },
                { "_not": { "age": { "_lt": 18 } } },
            ]
        }))
        .unwrap();

        let FilterTree::And(items) = tree else { panic!("expected and") };
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], FilterTree::Not(_)));
    }

    #[test]
    fn aggregate_and_membership_tokens_parse_as_operators() {
        let tree = FilterTree::parse(json!({ "posts": { "_count": { "_gt": 5 } } })).unwrap();
        let FilterTree::Leaf(map) = tree else { panic!("expected leaf") };
        let FilterValue::Operators(ops) = &map["posts"] else { panic!("expected operators") };
        assert_eq!(ops[0].op, Operator::Count);
        // The aggregate's own operand is itself an operator mapping, parsed
        // as a nested JSON value the walker interprets once it knows
        // `posts` is a relation.
        assert_eq!(ops[0].operand, json!({ "_gt": 5 }));
    }

    #[test]
    fn plain_nested_object_is_a_relation_filter() {
        let tree = FilterTree::parse(json!({ "posts": { "published": true } })).unwrap();
        let FilterTree::Leaf(map) = tree else { panic!("expected leaf") };
        assert!(matches!(map["posts"], FilterValue::Nested(_)));
    }

    #[test]
    fn non_object_top_level_is_rejected() {
        assert!(FilterTree::parse(json!(["nope"])).is_err());
    }
}
