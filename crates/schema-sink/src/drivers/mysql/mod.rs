//! MySQL/MariaDB driver.
//!
//! - [`MysqlDialect`]: SQL syntax strategy
//! - [`MysqlWriter`]: target engine
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+
//!
//! MySQL has no schemas separate from databases: a table's schema part names
//! the database, and an unqualified table lives in the connection's database.

mod dialect;
mod writer;

pub use dialect::MysqlDialect;
pub use writer::MysqlWriter;
