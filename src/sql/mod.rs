//! SQL utilities
//!
//! Identifier sanitization, DDL generation, query building, filter parsing
//! and the prepared statement cache.

pub mod builder;
pub mod ddl;
pub mod filter;
pub mod sanitize;
pub mod stmt_cache;

pub use builder::{QueryBuilder, SqlValue};
pub use ddl::DdlGenerator;
pub use filter::{Filter, FilterOp, Sort, parse_filter, parse_sort};
pub use sanitize::{SQLITE_RESERVED_WORDS, quote_identifier, validate_identifier};
pub use stmt_cache::StatementCache;
