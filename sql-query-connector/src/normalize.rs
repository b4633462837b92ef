//! Turns decoded driver rows into [`Record`]s (spec §4.5's Normalise step):
//! mysql's `0`/`1` integers become real booleans (handled upstream, in
//! [`crate::connection`], where the driver-specific type tag is still
//! available), JSON/text blobs from relation subqueries parse into nested
//! records, and a relation that matched no rows reads as `null` (singular)
//! or `[]` (collection) rather than being absent from the record.

use chrono::{DateTime, NaiveDate, Utc};
use query_structure::{ColumnType, Record, Value};
use serde_json::Value as Json;

use crate::connection::{RawValue, SqlRow};
use crate::planner::ProjectedColumn;

pub fn normalize_row(row: &SqlRow, projections: &[ProjectedColumn]) -> Record {
    let mut record = Record::new();

    for (index, projection) in projections.iter().enumerate() {
        let raw = row.get(index).cloned().unwrap_or(RawValue::Null);
        let (name, value) = match projection {
            ProjectedColumn::Scalar { property, column_type } => (property.clone(), scalar_value(raw, column_type)),
            ProjectedColumn::OwnerRef { property } => (
                property.clone(),
                match raw {
                    RawValue::Null => Value::Null,
                    other => Value::reference(raw_to_value(other)),
                },
            ),
            ProjectedColumn::SingleJson { property } => (
                property.clone(),
                match raw {
                    RawValue::Null => Value::Null,
                    RawValue::Text(text) => json_to_value(&parse_json(&text)),
                    other => raw_to_value(other),
                },
            ),
            ProjectedColumn::CollectionJson { property } => (
                property.clone(),
                match raw {
                    RawValue::Text(text) => json_to_value(&parse_json(&text)),
                    _ => Value::List(Vec::new()),
                },
            ),
        };
        record.insert(name, value);
    }

    record
}

fn parse_json(text: &str) -> Json {
    serde_json::from_str(text).unwrap_or(Json::Null)
}

fn scalar_value(raw: RawValue, column_type: &ColumnType) -> Value {
    match (raw, column_type) {
        (RawValue::Null, _) => Value::Null,
        (RawValue::Bool(b), _) => Value::Boolean(b),
        (RawValue::Int(n), ColumnType::Boolean) => Value::Boolean(n != 0),
        (RawValue::Int(n), ColumnType::Float | ColumnType::Decimal) => Value::Float(n as f64),
        (RawValue::Int(n), _) => Value::Int(n),
        (RawValue::Float(f), _) => Value::Float(f),
        (RawValue::Text(s), ColumnType::Uuid) => uuid::Uuid::parse_str(&s).map(Value::Uuid).unwrap_or(Value::Text(s)),
        (RawValue::Text(s), ColumnType::Date) => NaiveDate::parse_from_str(&s, "%Y-%m-%d").map(Value::Date).unwrap_or(Value::Text(s)),
        (RawValue::Text(s), ColumnType::DateTime | ColumnType::Timestamp) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
            .unwrap_or(Value::Text(s)),
        (RawValue::Text(s), ColumnType::Json) => Value::Json(parse_json(&s)),
        (RawValue::Text(s), ColumnType::Boolean) => Value::Boolean(s == "1" || s.eq_ignore_ascii_case("true")),
        (RawValue::Text(s), ColumnType::Decimal) => s.parse::<bigdecimal::BigDecimal>().map(Value::Decimal).unwrap_or(Value::Text(s)),
        (RawValue::Text(s), ColumnType::Enum { .. } | ColumnType::Text) => Value::Text(s),
        (RawValue::Text(s), _) => Value::Text(s),
        (RawValue::Bytes(b), _) => Value::Text(String::from_utf8_lossy(&b).into_owned()),
    }
}

fn raw_to_value(raw: RawValue) -> Value {
    match raw {
        RawValue::Null => Value::Null,
        RawValue::Bool(b) => Value::Boolean(b),
        RawValue::Int(n) => Value::Int(n),
        RawValue::Float(f) => Value::Float(f),
        RawValue::Text(s) => Value::Text(s),
        RawValue::Bytes(b) => Value::Text(String::from_utf8_lossy(&b).into_owned()),
    }
}

/// JSON produced by `JSON_OBJECT`/`JSON_ARRAYAGG` carries no column-type
/// information beyond what JSON itself has, so a nested uuid/date column
/// normalises to `Value::Text` rather than `Value::Uuid`/`Value::Date` —
/// the caller already has the string form it needs either way.
pub(crate) fn json_to_value(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => n.as_i64().map(Value::Int).unwrap_or_else(|| Value::Float(n.as_f64().unwrap_or_default())),
        Json::String(s) => Value::Text(s.clone()),
        Json::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
        Json::Object(map) => Value::Record(map.iter().map(|(k, v)| (k.clone(), json_to_value(v))).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mysql_boolean_int_normalises_to_bool() {
        let value = scalar_value(RawValue::Int(1), &ColumnType::Boolean);
        assert_eq!(value, Value::Boolean(true));
    }

    #[test]
    fn missing_collection_defaults_to_empty_list() {
        let row = SqlRow(vec![RawValue::Null]);
        let record = normalize_row(&row, &[ProjectedColumn::CollectionJson { property: "posts".to_string() }]);
        assert_eq!(record.get("posts"), Some(&Value::List(vec![])));
    }

    #[test]
    fn single_json_parses_nested_record() {
        let row = SqlRow(vec![RawValue::Text(json!({"id": 1, "name": "ada"}).to_string())]);
        let record = normalize_row(&row, &[ProjectedColumn::SingleJson { property: "author".to_string() }]);
        let Some(Value::Record(r)) = record.get("author") else { panic!("expected a record") };
        assert_eq!(r.get("name"), Some(&Value::Text("ada".to_string())));
    }

    #[test]
    fn null_owner_ref_stays_null() {
        let row = SqlRow(vec![RawValue::Null]);
        let record = normalize_row(&row, &[ProjectedColumn::OwnerRef { property: "author".to_string() }]);
        assert_eq!(record.get("author"), Some(&Value::Null));
    }
}
