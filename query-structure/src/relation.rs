use serde::{Deserialize, Serialize};

/// The four cardinalities a relation can carry. The shape of the data each
/// side owns differs by cardinality — see [`RelationSide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl Cardinality {
    pub fn is_collection(self) -> bool {
        matches!(self, Cardinality::OneToMany | Cardinality::ManyToMany)
    }

    pub fn is_single(self) -> bool {
        !self.is_collection()
    }
}

/// The junction-table triple backing a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JunctionTable {
    pub table_name: String,
    pub source_column: String,
    pub target_column: String,
}

impl JunctionTable {
    /// The fallback naming convention when metadata doesn't carry an explicit
    /// junction triple: `<sourceTable>_<propertyName>`, with `sourceId`/`targetId`
    /// columns. This mirrors the convention a migration generator would use
    /// when it autogenerates a link table for a many-to-many field.
    pub fn by_convention(source_table: &str, property_name: &str, target_table: &str) -> Self {
        JunctionTable {
            table_name: format!("{source_table}_{property_name}"),
            source_column: format!("{source_table}Id"),
            target_column: format!("{target_table}Id"),
        }
    }
}

/// The cardinality-specific data a relation carries. This is the sum type
/// called for in the design notes: each variant holds exactly what that side
/// of the relation physically owns, so the planner never has to guess which
/// fields are meaningful for a given cardinality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RelationSide {
    /// Many-to-one, or the owning side of a one-to-one: a foreign-key column
    /// lives on the source table.
    Owner { foreign_key_column: String },
    /// The non-owning side of a one-to-one: no local column, consult the
    /// target table's `Owner` relation through `inverse_property_name`.
    InverseSingle,
    /// One-to-many: no local column, consult the target table's `Owner`
    /// relation to find the foreign-key column pointing back here.
    Collection,
    /// Many-to-many: both sides are symmetric, linked through a junction
    /// table.
    Junction(JunctionTable),
}

/// A relation (foreign-key based or junction-based link) declared on a
/// [`crate::table::Table`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub property_name: String,
    pub cardinality: Cardinality,
    pub source_table: String,
    pub target_table: String,
    #[serde(default)]
    pub inverse_property_name: Option<String>,
    /// Only meaningful for one-to-one: true on the side carrying the foreign
    /// key.
    #[serde(default)]
    pub owner: bool,
    pub side: RelationSide,
    /// Present only when `side` is `Collection`/`InverseSingle` and
    /// `on_delete = CASCADE` is declared for the inverse relation. See
    /// DESIGN.md for the resolved Open Question on when cascade fires.
    #[serde(default)]
    pub on_delete_cascade: bool,
}

impl Relation {
    pub fn is_owner_side(&self) -> bool {
        matches!(self.side, RelationSide::Owner { .. })
    }

    pub fn foreign_key_column(&self) -> Option<&str> {
        match &self.side {
            RelationSide::Owner { foreign_key_column } => Some(foreign_key_column),
            _ => None,
        }
    }

    pub fn junction(&self) -> Option<&JunctionTable> {
        match &self.side {
            RelationSide::Junction(j) => Some(j),
            _ => None,
        }
    }
}
