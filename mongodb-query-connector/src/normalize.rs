//! Turns a decoded Mongo aggregation result document into a [`Record`]
//! (spec §4.5's Normalise step): every `_id` key renames to `id` (including
//! inside embedded documents/arrays produced by `$lookup`, so results stay
//! shaped the same as the SQL connector's), an `ObjectId` decodes to its hex
//! string, and a relation that matched no document reads as `null`
//! (singular) or `[]` (collection) rather than being absent from the
//! record.

use bson::{Bson, Document};
use query_structure::{ColumnType, Record, Value};

use crate::pipeline::ProjectedField;

pub fn normalize_document(doc: &Document, projections: &[ProjectedField]) -> Record {
    let mut record = Record::new();

    for projection in projections {
        let (name, value) = match projection {
            ProjectedField::Scalar { property, physical_field, column_type } => {
                (property.clone(), scalar_value(doc.get(physical_field), column_type))
            }
            ProjectedField::OwnerRef { property, foreign_key_field } => {
                let value = match doc.get(foreign_key_field) {
                    None | Some(Bson::Null) => Value::Null,
                    Some(bson) => Value::reference(bson_to_value(bson)),
                };
                (property.clone(), value)
            }
            ProjectedField::Embedded { property } => {
                let value = match doc.get(property) {
                    Some(Bson::Document(inner)) => Value::Record(document_to_record(inner)),
                    _ => Value::Null,
                };
                (property.clone(), value)
            }
            ProjectedField::EmbeddedArray { property } => {
                let value = match doc.get(property) {
                    Some(Bson::Array(items)) => Value::List(
                        items
                            .iter()
                            .filter_map(|item| item.as_document().map(document_to_record).map(Value::Record))
                            .collect(),
                    ),
                    _ => Value::List(Vec::new()),
                };
                (property.clone(), value)
            }
        };
        record.insert(name, value);
    }

    record
}

fn scalar_value(bson: Option<&Bson>, column_type: &ColumnType) -> Value {
    match (bson, column_type) {
        (None | Some(Bson::Null), _) => Value::Null,
        (Some(Bson::ObjectId(oid)), _) => Value::Text(oid.to_hex()),
        (Some(Bson::Boolean(b)), _) => Value::Boolean(*b),
        (Some(Bson::Int32(n)), ColumnType::Boolean) => Value::Boolean(*n != 0),
        (Some(Bson::Int64(n)), ColumnType::Boolean) => Value::Boolean(*n != 0),
        (Some(Bson::Int32(n)), ColumnType::Float | ColumnType::Decimal) => Value::Float(*n as f64),
        (Some(Bson::Int64(n)), ColumnType::Float | ColumnType::Decimal) => Value::Float(*n as f64),
        (Some(Bson::Int32(n)), _) => Value::Int(*n as i64),
        (Some(Bson::Int64(n)), _) => Value::Int(*n),
        (Some(Bson::Double(f)), ColumnType::Integer | ColumnType::BigInt) => Value::Int(*f as i64),
        (Some(Bson::Double(f)), _) => Value::Float(*f),
        (Some(Bson::Decimal128(d)), _) => d.to_string().parse::<bigdecimal::BigDecimal>().map(Value::Decimal).unwrap_or_else(|_| Value::Text(d.to_string())),
        (Some(Bson::String(s)), ColumnType::Uuid) => uuid::Uuid::parse_str(s).map(Value::Uuid).unwrap_or_else(|_| Value::Text(s.clone())),
        (Some(Bson::String(s)), ColumnType::Date) => {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").map(Value::Date).unwrap_or_else(|_| Value::Text(s.clone()))
        }
        (Some(Bson::String(s)), ColumnType::Json) => serde_json::from_str(s).map(Value::Json).unwrap_or_else(|_| Value::Text(s.clone())),
        (Some(Bson::String(s)), ColumnType::Enum { .. } | ColumnType::Text) => Value::Text(s.clone()),
        (Some(Bson::String(s)), _) => Value::Text(s.clone()),
        (Some(Bson::DateTime(dt)), _) => Value::DateTime(dt.to_chrono()),
        (Some(Bson::Document(inner)), _) => Value::Record(document_to_record(inner)),
        (Some(Bson::Array(items)), _) => Value::List(items.iter().map(bson_to_value).collect()),
        (Some(other), _) => Value::Text(other.to_string()),
    }
}

/// Untyped conversion used for embedded documents/arrays, where no column
/// metadata is available beyond the document's own BSON type tags.
pub(crate) fn bson_to_value(bson: &Bson) -> Value {
    match bson {
        Bson::Null => Value::Null,
        Bson::ObjectId(oid) => Value::Text(oid.to_hex()),
        Bson::Boolean(b) => Value::Boolean(*b),
        Bson::Int32(n) => Value::Int(*n as i64),
        Bson::Int64(n) => Value::Int(*n),
        Bson::Double(f) => Value::Float(*f),
        Bson::Decimal128(d) => d.to_string().parse::<bigdecimal::BigDecimal>().map(Value::Decimal).unwrap_or_else(|_| Value::Text(d.to_string())),
        Bson::String(s) => Value::Text(s.clone()),
        Bson::DateTime(dt) => Value::DateTime(dt.to_chrono()),
        Bson::Document(inner) => Value::Record(document_to_record(inner)),
        Bson::Array(items) => Value::List(items.iter().map(bson_to_value).collect()),
        other => Value::Text(other.to_string()),
    }
}

/// Converts an embedded document to a [`Record`], renaming its own `_id`
/// field to `id` so a nested relation's shape matches the SQL connector's.
pub(crate) fn document_to_record(doc: &Document) -> Record {
    let mut record = Record::new();
    for (key, value) in doc {
        let name = if key == "_id" { "id".to_string() } else { key.clone() };
        record.insert(name, bson_to_value(value));
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn scalar_projection_reads_its_physical_field() {
        let document = doc! { "_id": "abc", "name": "ada" };
        let projections = vec![ProjectedField::Scalar {
            property: "id".to_string(),
            physical_field: "_id".to_string(),
            column_type: ColumnType::Text,
        }];
        let record = normalize_document(&document, &projections);
        assert_eq!(record.get("id"), Some(&Value::Text("abc".to_string())));
    }

    #[test]
    fn missing_embedded_array_defaults_to_empty_list() {
        let document = doc! { "_id": "abc" };
        let projections = vec![ProjectedField::EmbeddedArray { property: "posts".to_string() }];
        let record = normalize_document(&document, &projections);
        assert_eq!(record.get("posts"), Some(&Value::List(vec![])));
    }

    #[test]
    fn null_owner_ref_stays_null() {
        let document = doc! { "_id": "abc", "authorId": Bson::Null };
        let projections = vec![ProjectedField::OwnerRef { property: "author".to_string(), foreign_key_field: "authorId".to_string() }];
        let record = normalize_document(&document, &projections);
        assert_eq!(record.get("author"), Some(&Value::Null));
    }

    #[test]
    fn embedded_document_renames_underscore_id_to_id() {
        let document = doc! { "_id": "post1", "author": { "_id": "user1", "name": "ada" } };
        let projections = vec![ProjectedField::Embedded { property: "author".to_string() }];
        let record = normalize_document(&document, &projections);
        let Some(Value::Record(author)) = record.get("author") else { panic!("expected a record") };
        assert_eq!(author.get("id"), Some(&Value::Text("user1".to_string())));
    }
}
