//! The `Connector` implementation for the three pooled SQL drivers
//! (mysql_async, tokio-postgres, rusqlite): alias allocation, filter
//! coercion and the filter tree walker, the field & join planner, the
//! decode-layer driver abstraction, result normalisation, the many-to-many
//! post-fetch step, and the executor that ties them together behind
//! `query_connector::Connector::find`.

pub mod alias;
pub mod coerce;
pub mod connection;
pub mod executor;
pub mod fields;
pub mod normalize;
pub mod planner;
pub mod postfetch;
pub mod walker;

pub use connection::SqlConnection;
pub use executor::SqlConnector;
