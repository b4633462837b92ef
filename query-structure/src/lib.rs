//! The metadata view: a read-only façade over runtime-loaded table, column
//! and relation descriptions, plus the dynamically tagged `Value`/`Record`
//! types every other crate in the workspace builds its results out of.

pub mod column;
pub mod error;
pub mod metadata;
pub mod relation;
pub mod table;
pub mod value;

pub use column::{Column, ColumnType};
pub use error::MetadataError;
pub use metadata::{InMemoryMetadataCache, MetadataProvider, MetadataView};
pub use relation::{Cardinality, JunctionTable, Relation, RelationSide};
pub use table::{Index, Property, Table, UniqueKey};
pub use value::{Record, Value};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn user_table() -> Table {
        Table {
            name: "user".to_string(),
            system: false,
            unique_keys: vec![],
            indexes: vec![],
            columns: vec![
                Column::new("id", ColumnType::Integer).primary_key(),
                Column::new("name", ColumnType::Text),
            ],
            relations: vec![Relation {
                property_name: "posts".to_string(),
                cardinality: Cardinality::OneToMany,
                source_table: "user".to_string(),
                target_table: "post".to_string(),
                inverse_property_name: Some("author".to_string()),
                owner: false,
                side: RelationSide::Collection,
                on_delete_cascade: false,
            }],
        }
    }

    fn post_table() -> Table {
        Table {
            name: "post".to_string(),
            system: false,
            unique_keys: vec![],
            indexes: vec![],
            columns: vec![
                Column::new("id", ColumnType::Integer).primary_key(),
                Column::new("userId", ColumnType::Integer),
                Column::new("title", ColumnType::Text),
            ],
            relations: vec![Relation {
                property_name: "author".to_string(),
                cardinality: Cardinality::ManyToOne,
                source_table: "post".to_string(),
                target_table: "user".to_string(),
                inverse_property_name: Some("posts".to_string()),
                owner: true,
                side: RelationSide::Owner {
                    foreign_key_column: "userId".to_string(),
                },
                on_delete_cascade: false,
            }],
        }
    }

    struct FixedProvider(Vec<Arc<Table>>);

    impl MetadataProvider for FixedProvider {
        fn get_table(&self, name: &str) -> Option<Arc<Table>> {
            self.0.iter().find(|t| t.name == name).cloned()
        }
        fn list_tables(&self) -> Vec<Arc<Table>> {
            self.0.clone()
        }
    }

    #[test]
    fn table_validates_exactly_one_primary_key() {
        let mut table = user_table();
        table.columns[0].is_primary_key = false;
        assert!(table.validate().is_err());
    }

    #[test]
    fn table_rejects_duplicate_relation_names() {
        let mut table = user_table();
        let dup = table.relations[0].clone();
        table.relations.push(dup);
        assert!(table.validate().is_err());
    }

    #[test]
    fn resolve_distinguishes_field_from_relation() {
        let table = user_table();
        assert!(matches!(table.resolve("name"), Some(Property::Field(_))));
        assert!(matches!(table.resolve("posts"), Some(Property::Relation(_))));
        assert!(table.resolve("nope").is_none());
    }

    #[test]
    fn primary_key_falls_back_to_convention() {
        let mut table = user_table();
        table.columns[0].is_primary_key = false;
        assert_eq!(table.primary_key_column_name(false), "id");
        assert_eq!(table.primary_key_column_name(true), "_id");
    }

    #[test]
    fn inverse_owner_resolves_the_foreign_key_side() {
        let user = Arc::new(user_table());
        let post = Arc::new(post_table());
        let provider = FixedProvider(vec![user.clone(), post.clone()]);
        let view = MetadataView::new(Arc::new(provider));

        let posts_relation = user.relation("posts").unwrap();
        let owner_table = view.inverse_owner(&user, posts_relation).unwrap();
        assert_eq!(owner_table.name, "post");

        let owner_relation = view
            .owner_relation_on(&owner_table, "user", Some("posts"))
            .unwrap();
        assert_eq!(owner_relation.foreign_key_column(), Some("userId"));
    }

    #[test]
    fn junction_falls_back_to_naming_convention() {
        let mut article = Table {
            name: "article".to_string(),
            system: false,
            unique_keys: vec![],
            indexes: vec![],
            columns: vec![Column::new("id", ColumnType::Integer).primary_key()],
            relations: vec![],
        };
        article.relations.push(Relation {
            property_name: "tags".to_string(),
            cardinality: Cardinality::ManyToMany,
            source_table: "article".to_string(),
            target_table: "tag".to_string(),
            inverse_property_name: Some("articles".to_string()),
            owner: false,
            side: RelationSide::Junction(JunctionTable {
                table_name: "".to_string(),
                source_column: "".to_string(),
                target_column: "".to_string(),
            }),
            on_delete_cascade: false,
        });
        // Simulate metadata that never filled in the junction triple.
        article.relations[0].side = RelationSide::Collection;

        let provider = FixedProvider(vec![Arc::new(article.clone())]);
        let view = MetadataView::new(Arc::new(provider));
        let junction = view.junction_for(&article, "tags").unwrap();
        assert_eq!(junction.table_name, "article_tags");
        assert_eq!(junction.source_column, "articleId");
        assert_eq!(junction.target_column, "tagId");
    }
}
