//! Dialect-aware SQL construction: an AST independent of any one backend,
//! a set of pure dialect functions (identifier quoting, JSON function
//! names, casts, substring matching), and a visitor that renders the AST
//! into parameterised SQL text for mysql, postgres or sqlite.

pub mod ast;
pub mod dialect;
pub mod error;
pub mod visitor;

pub use dialect::Dialect;
pub use error::DialectUnsupported;
