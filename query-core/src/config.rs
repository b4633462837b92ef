//! Host-supplied configuration (spec §6): which backend family to dial,
//! how long a cached metadata table stays fresh, how much the deep-relation
//! resolver is allowed to fan out, and the default page size when a request
//! doesn't say.

use std::time::Duration;

use serde::Deserialize;

/// The backend family a [`Config`] targets. Distinct from `quaint::Dialect`,
/// which only ever describes SQL rendering and has no Mongo variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DbType {
    Mysql,
    Postgres,
    Sqlite,
    Mongo,
}

fn default_metadata_ttl() -> u64 {
    60
}

fn default_deep_parallelism() -> usize {
    8
}

fn default_query_limit() -> u32 {
    20
}

/// Parsed from the dotted wire keys in spec §6's configuration table
/// (`dbType`, `metadata.ttl`, `deep.parallelism`, `query.defaultLimit`).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub db_type: DbType,
    #[serde(rename = "metadata.ttl", default = "default_metadata_ttl")]
    pub metadata_ttl_secs: u64,
    #[serde(rename = "deep.parallelism", default = "default_deep_parallelism")]
    pub deep_parallelism: usize,
    #[serde(rename = "query.defaultLimit", default = "default_query_limit")]
    pub query_default_limit: u32,
}

impl Config {
    pub fn metadata_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_dotted_wire_keys() {
        let json = serde_json::json!({
            "dbType": "postgres",
            "metadata.ttl": 30,
            "deep.parallelism": 4,
            "query.defaultLimit": 50,
        });
        let config: Config = serde_json::from_value(json).unwrap();
        assert_eq!(config.db_type, DbType::Postgres);
        assert_eq!(config.metadata_ttl(), Duration::from_secs(30));
        assert_eq!(config.deep_parallelism, 4);
        assert_eq!(config.query_default_limit, 50);
    }

    #[test]
    fn missing_optional_keys_fall_back_to_defaults() {
        let json = serde_json::json!({ "dbType": "mongo" });
        let config: Config = serde_json::from_value(json).unwrap();
        assert_eq!(config.db_type, DbType::Mongo);
        assert_eq!(config.metadata_ttl_secs, 60);
        assert_eq!(config.deep_parallelism, 8);
        assert_eq!(config.query_default_limit, 20);
    }
}
