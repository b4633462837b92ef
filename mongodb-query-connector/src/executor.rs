//! The Mongo executor (spec §4.5): `Parse → Plan → Count? → Fetch →
//! PostFetchCollections → Normalise → Emit`. As in `sql-query-connector`,
//! the remaining two states from the spec's state machine, `Deep?` and the
//! hook pipeline, are owned by `query-core` one layer up — this connector's
//! `find` always returns one already-normalised page, inline relations and
//! all.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::stream::TryStreamExt;
use mongodb::Database;
use query_connector::{Connector, ConnectorError, ConnectorResult, QueryArguments, ResultMeta};
use query_structure::{MetadataView, Record, Value};

use crate::normalize;
use crate::pipeline;
use crate::postfetch;

pub struct MongoConnector {
    db: Database,
}

impl MongoConnector {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn find(&self, metadata: &MetadataView, args: QueryArguments) -> Result<ConnectorResult, ConnectorError> {
        let table = metadata.table(&args.table_name)?;
        tracing::debug!(table = %table.name, "mongo find");

        let plan = pipeline::build_pipeline(metadata, &table, &args)?;
        let collection = self.db.collection::<Document>(&table.name);

        let mut meta = ResultMeta::default();

        if args.meta.filter_count {
            let stages = count_pipeline(&plan.stages);
            let mut cursor = collection.aggregate(stages, None).await.map_err(mongo_error)?;
            meta.filter_count = Some(match cursor.try_next().await.map_err(mongo_error)? {
                Some(doc) => doc.get_i32("count").unwrap_or(0) as i64,
                None => 0,
            });
        }
        if args.meta.total_count {
            let count = collection.count_documents(doc! {}, None).await.map_err(mongo_error)?;
            meta.total_count = Some(count as i64);
        }

        let debug_rendered = args.debug_mode.then(|| format!("{:#?}", plan.stages));
        let mut cursor = collection.aggregate(plan.stages.clone(), None).await.map_err(mongo_error)?;
        let mut documents = Vec::new();
        while let Some(document) = cursor.try_next().await.map_err(mongo_error)? {
            documents.push(document);
        }

        let mut records: Vec<Record> = documents.iter().map(|document| normalize::normalize_document(document, &plan.projections)).collect();

        if !plan.deferred_many_to_many.is_empty() {
            let parent_ids: Vec<Bson> = documents.iter().map(|document| document.get(&plan.pk_field).cloned().unwrap_or(Bson::Null)).collect();
            let parent_keys: Vec<String> = parent_ids.iter().map(postfetch::raw_key).collect();

            for relation_property in &plan.deferred_many_to_many {
                let groups = query_connector::FieldGroups::from_paths(&args.fields).children.get(relation_property).cloned().unwrap_or_default();
                let grouped = postfetch::fetch_many_to_many(&self.db, metadata, &table, relation_property, &parent_ids, &groups).await?;

                for (record, key) in records.iter_mut().zip(parent_keys.iter()) {
                    let values = grouped.get(key).cloned().unwrap_or_default();
                    record.insert(relation_property.clone(), Value::List(values));
                }
            }
        }

        Ok(ConnectorResult { data: records, meta, debug_rendered })
    }
}

fn mongo_error(err: mongodb::error::Error) -> ConnectorError {
    ConnectorError::internal(err.to_string())
}

/// The stage list for a `filter_count`: every stage up to (but not
/// including) pagination, followed by `$count`. Reusing the plan's own
/// `$match`/`$lookup` stages keeps a relation-reaching filter's count exact
/// rather than approximate.
fn count_pipeline(stages: &[Document]) -> Vec<Document> {
    stages
        .iter()
        .filter(|stage| !stage.contains_key("$skip") && !stage.contains_key("$limit"))
        .cloned()
        .chain(std::iter::once(doc! { "$count": "count" }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_pipeline_strips_pagination_and_appends_count() {
        let stages = vec![doc! { "$match": { "active": true } }, doc! { "$skip": 10 }, doc! { "$limit": 20 }];
        let counted = count_pipeline(&stages);
        assert_eq!(counted.len(), 2);
        assert!(counted[0].contains_key("$match"));
        assert!(counted[1].contains_key("$count"));
    }

    #[test]
    fn count_pipeline_on_an_unfiltered_plan_is_just_count() {
        let counted = count_pipeline(&[]);
        assert_eq!(counted, vec![doc! { "$count": "count" }]);
    }
}
