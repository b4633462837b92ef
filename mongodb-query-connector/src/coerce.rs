//! Coerces a filter operand into a [`Bson`] value, the way
//! `sql-query-connector::coerce` coerces the same operand into a SQL bind
//! value. The one Mongo-specific wrinkle (spec §4.6): a string operand
//! against an id field that looks like a 24-hex-character ObjectId is
//! converted rather than bound as text.

use bson::oid::ObjectId;
use bson::Bson;
use chrono::{DateTime, NaiveDate, Utc};
use query_connector::ConnectorError;
use query_structure::ColumnType;
use serde_json::Value as Json;

fn coercion_error(json: &Json, target: &str) -> ConnectorError {
    ConnectorError::validation(format!("cannot coerce {json} to {target}"))
}

/// A 24-hex-character string, the textual form of an ObjectId.
pub fn looks_like_object_id(s: &str) -> bool {
    s.len() == 24 && s.chars().all(|c| c.is_ascii_hexdigit())
}

pub fn coerce_scalar(json: &Json, column_type: &ColumnType, is_id_field: bool) -> Result<Bson, ConnectorError> {
    if json.is_null() {
        return Ok(Bson::Null);
    }

    if is_id_field {
        if let Some(s) = json.as_str() {
            if looks_like_object_id(s) {
                return Ok(Bson::ObjectId(ObjectId::parse_str(s).map_err(|_| coercion_error(json, "ObjectId"))?));
            }
        }
    }

    match column_type {
        ColumnType::Integer => json.as_i64().and_then(|v| i32::try_from(v).ok()).map(Bson::Int32).ok_or_else(|| coercion_error(json, "integer")),
        ColumnType::BigInt => json.as_i64().map(Bson::Int64).ok_or_else(|| coercion_error(json, "bigint")),
        ColumnType::Float | ColumnType::Decimal => json.as_f64().map(Bson::Double).ok_or_else(|| coercion_error(json, "float")),
        ColumnType::Boolean => json.as_bool().map(Bson::Boolean).ok_or_else(|| coercion_error(json, "boolean")),
        ColumnType::Uuid => json.as_str().map(|s| Bson::String(s.to_string())).ok_or_else(|| coercion_error(json, "uuid")),
        ColumnType::Date => json
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Bson::DateTime(bson::DateTime::from_millis(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).timestamp_millis())))
            .ok_or_else(|| coercion_error(json, "date")),
        ColumnType::DateTime | ColumnType::Timestamp => json
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| Bson::DateTime(bson::DateTime::from_millis(dt.timestamp_millis())))
            .ok_or_else(|| coercion_error(json, "datetime")),
        ColumnType::Json => Ok(bson::to_bson(json).map_err(|_| coercion_error(json, "json"))?),
        ColumnType::Enum { options } => {
            let s = json.as_str().ok_or_else(|| coercion_error(json, "enum"))?;
            if !options.iter().any(|o| o == s) {
                return Err(coercion_error(json, "enum"));
            }
            Ok(Bson::String(s.to_string()))
        }
        ColumnType::Text => json.as_str().map(|s| Bson::String(s.to_string())).ok_or_else(|| coercion_error(json, "text")),
    }
}

pub fn coerce_list(json: &Json, column_type: &ColumnType, is_id_field: bool) -> Result<Vec<Bson>, ConnectorError> {
    match json {
        Json::Array(items) => items.iter().map(|v| coerce_scalar(v, column_type, is_id_field)).collect(),
        Json::String(csv) => csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| coerce_scalar(&Json::String(s.to_string()), column_type, is_id_field))
            .collect(),
        _ => Err(coercion_error(json, "a list")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hex_string_on_id_field_becomes_object_id() {
        let value = coerce_scalar(&json!("507f1f77bcf86cd799439011"), &ColumnType::Text, true).unwrap();
        assert!(matches!(value, Bson::ObjectId(_)));
    }

    #[test]
    fn non_id_field_keeps_string_as_text() {
        let value = coerce_scalar(&json!("507f1f77bcf86cd799439011"), &ColumnType::Text, false).unwrap();
        assert_eq!(value, Bson::String("507f1f77bcf86cd799439011".to_string()));
    }

    #[test]
    fn csv_string_splits_into_a_list() {
        let values = coerce_list(&json!("1,2,3"), &ColumnType::Integer, false).unwrap();
        assert_eq!(values, vec![Bson::Int32(1), Bson::Int32(2), Bson::Int32(3)]);
    }
}
