//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PostgresWriter`]: target engine for PostgreSQL databases

mod dialect;
mod writer;

pub use dialect::PostgresDialect;
pub use writer::PostgresWriter;
