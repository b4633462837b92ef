use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// A dynamically tagged record value. Records are open maps keyed by
/// metadata-declared names (see the design notes on "dynamic tagged
/// records"): rather than generating a struct per table, a `Value` carries
/// enough type information that the result normaliser can always produce a
/// stable, backend-independent shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Decimal(BigDecimal),
    Boolean(bool),
    Text(String),
    Uuid(Uuid),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Json(serde_json::Value),
    Enum(String),
    Record(Record),
    List(Vec<Value>),
}

impl Value {
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The reference-only shape for a singular relation: `{ id: v }`.
    pub fn reference(id: Value) -> Value {
        let mut record = Record::new();
        record.insert("id".to_string(), id);
        Value::Record(record)
    }

    /// The reference-only shape for a collection relation: `[{ id: v }, …]`.
    pub fn reference_list(ids: impl IntoIterator<Item = Value>) -> Value {
        Value::List(ids.into_iter().map(Value::reference).collect())
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Decimal(v) => serializer.serialize_str(&v.to_string()),
            Value::Boolean(v) => serializer.serialize_bool(*v),
            Value::Text(v) => serializer.serialize_str(v),
            Value::Uuid(v) => serializer.serialize_str(&v.to_string()),
            Value::Date(v) => serializer.serialize_str(&v.format("%Y-%m-%d").to_string()),
            Value::DateTime(v) => serializer.serialize_str(&v.to_rfc3339()),
            Value::Json(v) => v.serialize(serializer),
            Value::Enum(v) => serializer.serialize_str(v),
            Value::Record(r) => r.serialize(serializer),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

/// An ordered map of field/relation name to value. Order follows the order
/// columns and relations were inserted by the planner, which in turn
/// follows the table's declared column order — this keeps repeated
/// identical requests byte-identical (see the result-stability invariant).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(IndexMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn insert(&mut self, key: String, value: Value) -> Option<Value> {
        self.0.insert(key, value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(IndexMap::from_iter(iter))
    }
}
