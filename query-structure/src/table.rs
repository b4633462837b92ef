use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::column::Column;
use crate::error::MetadataError;
use crate::relation::Relation;

/// A property resolved against a table's metadata: either a scalar column
/// or a relation. Resolution is how the filter walker and join planner find
/// out what a requested field path segment actually refers to.
#[derive(Debug, Clone, Copy)]
pub enum Property<'a> {
    Field(&'a Column),
    Relation(&'a Relation),
}

/// A composite unique key: an ordered set of column names that together must
/// be unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniqueKey(pub Vec<String>);

/// A composite index: an ordered set of column names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index(pub Vec<String>);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub system: bool,
    #[serde(default)]
    pub unique_keys: Vec<UniqueKey>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl Table {
    /// Validates the invariants declared in the spec's data model: exactly
    /// one primary-key column, column names unique within the table, and
    /// relation property names unique within the table.
    pub fn validate(&self) -> Result<(), MetadataError> {
        let pk_count = self.columns.iter().filter(|c| c.is_primary_key).count();
        if pk_count != 1 {
            return Err(MetadataError::InvalidTable {
                table: self.name.clone(),
                reason: format!("expected exactly one primary-key column, found {pk_count}"),
            });
        }

        if let Some(pk) = self.columns.iter().find(|c| c.is_primary_key) {
            if !pk.r#type.is_valid_primary_key_type() {
                return Err(MetadataError::InvalidTable {
                    table: self.name.clone(),
                    reason: format!(
                        "primary key column '{}' has a type that cannot be a primary key",
                        pk.name
                    ),
                });
            }
        }

        let mut seen_columns = HashSet::new();
        for column in &self.columns {
            if !seen_columns.insert(column.name.as_str()) {
                return Err(MetadataError::InvalidTable {
                    table: self.name.clone(),
                    reason: format!("duplicate column name '{}'", column.name),
                });
            }
        }

        let mut seen_relations = HashSet::new();
        for relation in &self.relations {
            if !seen_relations.insert(relation.property_name.as_str()) {
                return Err(MetadataError::InvalidTable {
                    table: self.name.clone(),
                    reason: format!("duplicate relation property name '{}'", relation.property_name),
                });
            }
            if seen_columns.contains(relation.property_name.as_str()) {
                return Err(MetadataError::InvalidTable {
                    table: self.name.clone(),
                    reason: format!(
                        "relation property '{}' collides with a column of the same name",
                        relation.property_name
                    ),
                });
            }
        }

        Ok(())
    }

    pub fn primary_key_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.is_primary_key)
    }

    /// Resolves the table's primary-key column name, falling back to the
    /// conventional name when no column is flagged explicitly. SQL backends
    /// fall back to `id`; the document store falls back to `_id`.
    pub fn primary_key_column_name(&self, is_mongo: bool) -> String {
        self.primary_key_column()
            .map(|c| c.name.clone())
            .unwrap_or_else(|| if is_mongo { "_id".to_string() } else { "id".to_string() })
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn relation(&self, property_name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.property_name == property_name)
    }

    /// Resolves a property name to either a field or a relation, per the
    /// metadata view's `field | relation | absent` contract.
    pub fn resolve(&self, property_name: &str) -> Option<Property<'_>> {
        if let Some(column) = self.column(property_name) {
            return Some(Property::Field(column));
        }
        if let Some(relation) = self.relation(property_name) {
            return Some(Property::Relation(relation));
        }
        None
    }

    /// Owner-side relations (many-to-one, or owning one-to-one) whose
    /// foreign-key column is physically present on this table.
    pub fn owned_relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.iter().filter(|r| r.is_owner_side())
    }

    /// The relation, if any, whose owner-side foreign key is `column_name`.
    /// Used when `*` expansion hides a foreign-key column behind its
    /// relation property.
    pub fn relation_for_foreign_key(&self, column_name: &str) -> Option<&Relation> {
        self.relations
            .iter()
            .find(|r| r.foreign_key_column() == Some(column_name))
    }

    pub fn scalar_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.hidden)
    }
}
