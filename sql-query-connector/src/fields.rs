//! Field-path grouping is backend-agnostic (spec §4.4 step 1), so it lives
//! in `query-connector` and is shared with the Mongo pipeline builder.

pub use query_connector::FieldGroups;
