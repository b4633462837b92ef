//! The single place that decides which connector crate handles a request.
//! Nothing above this module ever names `sql-query-connector` or
//! `mongodb-query-connector` directly.

use std::sync::Arc;

use mongodb::Database;
use mongodb_query_connector::MongoConnector;
use query_connector::Connector;
use sql_query_connector::{SqlConnection, SqlConnector};

use crate::config::{Config, DbType};
use crate::error::CoreError;

/// The host-provided, already-open connection handed to [`build_connector`].
/// Which variant is valid is determined entirely by `Config::db_type`.
pub enum Connections {
    Sql(Arc<dyn SqlConnection>),
    Mongo(Database),
}

pub fn build_connector(config: &Config, connection: Connections) -> Result<Arc<dyn Connector>, CoreError> {
    match (config.db_type, connection) {
        (DbType::Mysql | DbType::Postgres | DbType::Sqlite, Connections::Sql(conn)) => Ok(Arc::new(SqlConnector::new(conn))),
        (DbType::Mongo, Connections::Mongo(db)) => Ok(Arc::new(MongoConnector::new(db))),
        (DbType::Mongo, Connections::Sql(_)) => Err(CoreError::request("config selects mongo but an sql connection was supplied")),
        (_, Connections::Mongo(_)) => Err(CoreError::request("config selects an sql dialect but a mongo connection was supplied")),
    }
}
