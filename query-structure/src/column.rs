use serde::{Deserialize, Serialize};

/// The logical type of a column, independent of any SQL dialect's physical
/// representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ColumnType {
    Integer,
    BigInt,
    Uuid,
    Text,
    Boolean,
    Decimal,
    Float,
    Date,
    DateTime,
    Timestamp,
    Enum { options: Vec<String> },
    Json,
}

impl ColumnType {
    /// Primary-key columns are restricted to the types that a generator can
    /// mint a fresh value for without consulting application state.
    pub fn is_valid_primary_key_type(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::BigInt | ColumnType::Uuid)
    }

    pub fn is_json(&self) -> bool {
        matches!(self, ColumnType::Json)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, ColumnType::Boolean)
    }

    pub fn is_uuid(&self) -> bool {
        matches!(self, ColumnType::Uuid)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::DateTime | ColumnType::Timestamp)
    }
}

/// A single column on a [`crate::table::Table`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    pub r#type: ColumnType,
    pub nullable: bool,
    pub generated: bool,
    pub system: bool,
    pub hidden: bool,
    pub updatable: bool,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub placeholder: Option<serde_json::Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, r#type: ColumnType) -> Self {
        Self {
            name: name.into(),
            r#type,
            nullable: false,
            generated: false,
            system: false,
            hidden: false,
            updatable: true,
            is_primary_key: false,
            default: None,
            description: None,
            placeholder: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self.updatable = false;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn not_updatable(mut self) -> Self {
        self.updatable = false;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}
