//! Backend-agnostic query types shared by every connector: the filter
//! tree, the parsed request (`QueryArguments`), the `Connector` trait the
//! SQL and Mongo connectors implement, and the error taxonomy both of them
//! raise into.

pub mod error;
pub mod fields;
pub mod filter;
pub mod interface;
pub mod query_arguments;

pub use error::ConnectorError;
pub use fields::FieldGroups;
pub use filter::{FilterTree, FilterValue, Operator, OperatorValue};
pub use interface::{Connector, ConnectorResult, RelationMeta, ResultMeta};
pub use query_arguments::{DeepRequests, Direction, MetaRequest, Pagination, QueryArguments, SortField};
