//! The `Connector` implementation for MongoDB: filter operand coercion, the
//! filter tree matcher (split into a pre-lookup and a post-lookup pass), the
//! field & join pipeline planner, result normalisation, the many-to-many
//! post-fetch step, and the executor that ties them together behind
//! `query_connector::Connector::find`.

pub mod coerce;
pub mod executor;
pub mod matcher;
pub mod normalize;
pub mod pipeline;
pub mod postfetch;

pub use executor::MongoConnector;
