//! Coerces a filter operand (arbitrary JSON off the wire) into the SQL
//! builder's bind value, according to a column's logical type. Coercion
//! failures are fatal for the branch they occur in (spec §4.3 rule 2).

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use query_connector::ConnectorError;
use query_structure::ColumnType;
use quaint::ast::Value as SqlValue;
use serde_json::Value as Json;
use uuid::Uuid;

fn coercion_error(json: &Json, target: &str) -> ConnectorError {
    ConnectorError::validation(format!("cannot coerce {json} to {target}"))
}

/// Coerces a single scalar JSON value to the bind value for `column_type`.
pub fn coerce_scalar(json: &Json, column_type: &ColumnType) -> Result<SqlValue, ConnectorError> {
    if json.is_null() {
        return Ok(SqlValue::Null);
    }

    match column_type {
        ColumnType::Integer => json
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(SqlValue::Int32)
            .ok_or_else(|| coercion_error(json, "integer")),
        ColumnType::BigInt => json.as_i64().map(SqlValue::Int64).ok_or_else(|| coercion_error(json, "bigint")),
        ColumnType::Float => json.as_f64().map(SqlValue::Double).ok_or_else(|| coercion_error(json, "float")),
        ColumnType::Decimal => json
            .as_str()
            .and_then(|s| s.parse::<BigDecimal>().ok())
            .or_else(|| json.as_f64().and_then(|f| BigDecimal::try_from(f).ok()))
            .map(SqlValue::Numeric)
            .ok_or_else(|| coercion_error(json, "decimal")),
        ColumnType::Boolean => json.as_bool().map(SqlValue::Boolean).ok_or_else(|| coercion_error(json, "boolean")),
        ColumnType::Uuid => json
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(SqlValue::Uuid)
            .ok_or_else(|| coercion_error(json, "uuid")),
        ColumnType::Date => json
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .map(SqlValue::Date)
            .ok_or_else(|| coercion_error(json, "date")),
        ColumnType::DateTime | ColumnType::Timestamp => json
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| SqlValue::DateTime(dt.with_timezone(&Utc)))
            .ok_or_else(|| coercion_error(json, "datetime")),
        ColumnType::Text | ColumnType::Enum { .. } => json
            .as_str()
            .map(|s| SqlValue::Text(s.to_string()))
            .ok_or_else(|| coercion_error(json, "text")),
        ColumnType::Json => Ok(SqlValue::Json(json.clone())),
    }
}

/// Coerces `_in`/`_not_in`/`_between` operands, which accept either a JSON
/// array or a comma-separated string (spec §3 operator table).
pub fn coerce_list(json: &Json, column_type: &ColumnType) -> Result<Vec<SqlValue>, ConnectorError> {
    match json {
        Json::Array(items) => items.iter().map(|item| coerce_scalar(item, column_type)).collect(),
        Json::String(csv) => csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| coerce_scalar(&Json::String(s.to_string()), column_type))
            .collect(),
        other => Err(coercion_error(other, "array or csv string")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_integer() {
        assert_eq!(coerce_scalar(&json!(5), &ColumnType::Integer).unwrap(), SqlValue::Int32(5));
    }

    #[test]
    fn coerces_boolean() {
        assert_eq!(coerce_scalar(&json!(true), &ColumnType::Boolean).unwrap(), SqlValue::Boolean(true));
    }

    #[test]
    fn rejects_wrong_type() {
        assert!(coerce_scalar(&json!("nope"), &ColumnType::Integer).is_err());
    }

    #[test]
    fn csv_string_splits_into_list() {
        let values = coerce_list(&json!("1,2,3"), &ColumnType::Integer).unwrap();
        assert_eq!(values, vec![SqlValue::Int32(1), SqlValue::Int32(2), SqlValue::Int32(3)]);
    }

    #[test]
    fn null_coerces_to_sql_null() {
        assert_eq!(coerce_scalar(&json!(null), &ColumnType::Text).unwrap(), SqlValue::Null);
    }
}
