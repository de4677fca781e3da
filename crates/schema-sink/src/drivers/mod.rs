//! Database driver implementations.
//!
//! - [`postgres`]: PostgreSQL driver
//! - [`mysql`]: MySQL/MariaDB driver
//! - [`memory`]: in-process engine for dry runs and tests
//!
//! # Architecture
//!
//! Each database driver module implements:
//! - `Dialect`: SQL syntax strategy for the database engine
//! - `TargetEngine`: DDL and data operations against a live connection
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement `Dialect` and `TargetEngine`
//! 3. Add an enum variant to `DialectImpl` and a branch to [`connect`]
//! 4. Accept the type name in config validation

pub mod memory;
pub mod mysql;
pub mod postgres;

use std::sync::Arc;

pub use memory::MemoryEngine;
pub use mysql::{MysqlDialect, MysqlWriter};
pub use postgres::{PostgresDialect, PostgresWriter};

use crate::config::TargetConfig;
use crate::core::traits::{Dialect, TargetEngine};
use crate::core::{ColumnDescriptor, SqlType, TableName};
use crate::error::{Result, SinkError};

/// Enum-based static dispatch for dialects.
///
/// Note: We use a manual impl instead of a dispatch macro; the compiler
/// generates the same match either way.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Postgres(PostgresDialect),
    Mysql(MysqlDialect),
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        match self {
            DialectImpl::Postgres(d) => d.name(),
            DialectImpl::Mysql(d) => d.name(),
        }
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        match self {
            DialectImpl::Postgres(d) => d.quote_ident(name),
            DialectImpl::Mysql(d) => d.quote_ident(name),
        }
    }

    fn native_boolean(&self) -> bool {
        match self {
            DialectImpl::Postgres(d) => d.native_boolean(),
            DialectImpl::Mysql(d) => d.native_boolean(),
        }
    }

    fn render_type(&self, ty: &SqlType) -> String {
        match self {
            DialectImpl::Postgres(d) => d.render_type(ty),
            DialectImpl::Mysql(d) => d.render_type(ty),
        }
    }

    fn parse_type(
        &self,
        data_type: &str,
        char_length: Option<i64>,
        precision: Option<i64>,
        scale: Option<i64>,
    ) -> SqlType {
        match self {
            DialectImpl::Postgres(d) => d.parse_type(data_type, char_length, precision, scale),
            DialectImpl::Mysql(d) => d.parse_type(data_type, char_length, precision, scale),
        }
    }

    fn param_placeholder(&self, index: usize) -> String {
        match self {
            DialectImpl::Postgres(d) => d.param_placeholder(index),
            DialectImpl::Mysql(d) => d.param_placeholder(index),
        }
    }

    fn render_column_type(&self, column: &ColumnDescriptor) -> String {
        match self {
            DialectImpl::Postgres(d) => d.render_column_type(column),
            DialectImpl::Mysql(d) => d.render_column_type(column),
        }
    }

    fn check_primary_key(&self, table: &TableName, keys: &[&ColumnDescriptor]) -> Result<()> {
        match self {
            DialectImpl::Postgres(d) => d.check_primary_key(table, keys),
            DialectImpl::Mysql(d) => d.check_primary_key(table, keys),
        }
    }

    fn build_alter_column(&self, table: &TableName, column: &str, ty: &SqlType) -> Result<String> {
        match self {
            DialectImpl::Postgres(d) => d.build_alter_column(table, column, ty),
            DialectImpl::Mysql(d) => d.build_alter_column(table, column, ty),
        }
    }

    fn build_create_staging(&self, staging: &TableName, target: &TableName) -> Result<String> {
        match self {
            DialectImpl::Postgres(d) => d.build_create_staging(staging, target),
            DialectImpl::Mysql(d) => d.build_create_staging(staging, target),
        }
    }

    fn build_merge_update(
        &self,
        target: &TableName,
        staging: &TableName,
        columns: &[String],
        keys: &[String],
    ) -> Result<Option<String>> {
        match self {
            DialectImpl::Postgres(d) => d.build_merge_update(target, staging, columns, keys),
            DialectImpl::Mysql(d) => d.build_merge_update(target, staging, columns, keys),
        }
    }
}

impl DialectImpl {
    /// Create a dialect implementation from a database type string.
    ///
    /// # Errors
    ///
    /// Returns an error if the database type is not recognized.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        match db_type.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DialectImpl::Postgres(PostgresDialect::new())),
            "mysql" | "mariadb" => Ok(DialectImpl::Mysql(MysqlDialect::new())),
            other => Err(SinkError::Config(format!(
                "Unknown database type: '{}'. Supported types: postgres, mysql",
                other
            ))),
        }
    }
}

/// Open the target engine a configuration names.
pub async fn connect(config: &TargetConfig) -> Result<Arc<dyn TargetEngine>> {
    match config.r#type.to_lowercase().as_str() {
        "postgres" | "postgresql" | "pg" => Ok(Arc::new(PostgresWriter::new(config).await?)),
        "mysql" | "mariadb" => Ok(Arc::new(MysqlWriter::new(config).await?)),
        "memory" => Ok(Arc::new(MemoryEngine::new())),
        other => Err(SinkError::Config(format!(
            "Unknown target type: '{}'. Supported types: postgres, mysql, memory",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_impl_from_db_type() {
        let postgres = DialectImpl::from_db_type("postgres").unwrap();
        assert_eq!(postgres.name(), "postgres");

        let mysql = DialectImpl::from_db_type("MariaDB").unwrap();
        assert_eq!(mysql.name(), "mysql");

        assert!(DialectImpl::from_db_type("pg").is_ok());
        assert!(DialectImpl::from_db_type("mssql").is_err());
    }

    #[test]
    fn test_dialect_impl_dispatch() {
        let dialect = DialectImpl::Mysql(MysqlDialect::new());
        assert_eq!(dialect.quote_ident("t").unwrap(), "`t`");
        assert_eq!(dialect.param_placeholder(3), "?");
        // Default methods route through the dispatched quoting.
        assert_eq!(
            dialect
                .build_drop_table(&TableName::new(Some("db".into()), "t"))
                .unwrap(),
            "DROP TABLE IF EXISTS `db`.`t`"
        );
    }

    #[tokio::test]
    async fn test_connect_memory() {
        let config = TargetConfig {
            r#type: "memory".into(),
            ..TargetConfig::default()
        };
        let engine = connect(&config).await.unwrap();
        assert_eq!(engine.name(), "memory");
        assert!(engine.native_boolean());
    }
}
