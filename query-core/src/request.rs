//! The wire-level request (spec §6): what a caller actually sends, before
//! it is turned into a connector-agnostic [`query_connector::QueryArguments`].

use std::collections::BTreeMap;

use query_connector::{MetaRequest, QueryArguments};
use serde::Deserialize;
use serde_json::Value as Json;

use crate::error::CoreError;

/// `fields`/`sort` may arrive as a bare string or as an array of strings;
/// both mean the same comma-joined path list downstream.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    fn joined(&self) -> String {
        match self {
            StringOrList::One(s) => s.clone(),
            StringOrList::Many(items) => items.join(","),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(rename = "tableName")]
    pub table: String,
    #[serde(default)]
    pub fields: Option<StringOrList>,
    #[serde(default)]
    pub filter: Option<Json>,
    #[serde(default)]
    pub sort: Option<StringOrList>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub meta: Option<String>,
    #[serde(default)]
    pub deep: BTreeMap<String, Request>,
    #[serde(default, rename = "debugMode")]
    pub debug: bool,
}

impl Request {
    /// Parses this request into connector-agnostic `QueryArguments`. Nested
    /// `deep` entries are parsed recursively; the deep-relation resolver
    /// decides later whether a given relation can actually be resolved.
    pub fn into_query_arguments(self, default_limit: u32) -> Result<QueryArguments, CoreError> {
        let fields = QueryArguments::parse_fields(self.fields.as_ref().map(StringOrList::joined).as_deref());
        let sort = QueryArguments::parse_sort(self.sort.as_ref().map(StringOrList::joined).as_deref())?;
        let pagination = QueryArguments::parse_pagination(self.page, self.limit, default_limit)?;
        let meta = self.meta.as_deref().map(MetaRequest::parse).unwrap_or_default();
        let filter = self.filter.map(query_connector::FilterTree::parse).transpose()?;

        let mut deep = query_connector::DeepRequests::new();
        for (name, request) in self.deep {
            deep.insert(name, request.into_query_arguments(default_limit)?);
        }

        Ok(QueryArguments {
            table_name: self.table,
            fields,
            filter,
            sort,
            pagination,
            meta,
            deep,
            debug_mode: self.debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_string_fields_and_array_fields_join_the_same_way() {
        let one = StringOrList::One("id,name".to_string());
        let many = StringOrList::Many(vec!["id".to_string(), "name".to_string()]);
        assert_eq!(one.joined(), many.joined());
    }

    #[test]
    fn parses_nested_deep_requests_recursively() {
        let json = serde_json::json!({
            "tableName": "user",
            "deep": {
                "posts": { "tableName": "post", "limit": 5 }
            }
        });
        let request: Request = serde_json::from_value(json).unwrap();
        let args = request.into_query_arguments(20).unwrap();
        assert_eq!(args.table_name, "user");
        let nested = args.deep.get("posts").unwrap();
        assert_eq!(nested.table_name, "post");
        assert_eq!(nested.pagination.limit, 5);
    }

    #[test]
    fn debug_defaults_to_false() {
        let json = serde_json::json!({ "tableName": "user" });
        let request: Request = serde_json::from_value(json).unwrap();
        assert!(!request.debug);
    }

    #[test]
    fn deserializes_the_wire_field_names_verbatim() {
        let json = serde_json::json!({ "tableName": "user", "debugMode": true });
        let request: Request = serde_json::from_value(json).unwrap();
        assert_eq!(request.table, "user");
        assert!(request.debug);
    }
}
