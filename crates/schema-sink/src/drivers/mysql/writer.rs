//! MySQL/MariaDB target engine.
//!
//! Uses mysql_async for connection pooling and batched multi-row INSERT.
//! Merges run as an `UPDATE … JOIN` of matched rows followed by an anti-join
//! `INSERT … SELECT`, both inside one explicit transaction.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, TxOpts};
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::traits::{Dialect, TargetEngine};
use crate::core::{
    ColumnDescriptor, ExistingColumn, SqlType, SqlValue, TableDescriptor, TableName,
};
use crate::error::{Result, SinkError};

use super::MysqlDialect;

/// MySQL caps a prepared statement at 65,535 placeholders.
const MYSQL_MAX_PLACEHOLDERS: usize = 65_535;

const DESCRIBE_SQL: &str = r#"
    SELECT COLUMN_NAME,
           DATA_TYPE,
           CAST(CHARACTER_MAXIMUM_LENGTH AS SIGNED),
           CAST(NUMERIC_PRECISION AS SIGNED),
           CAST(NUMERIC_SCALE AS SIGNED)
    FROM information_schema.columns
    WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
      AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

type DescribeRow = (String, String, Option<i64>, Option<i64>, Option<i64>);

/// MySQL target engine.
pub struct MysqlWriter {
    pool: Pool,
    dialect: MysqlDialect,
}

impl MysqlWriter {
    /// Connect to MySQL and verify the connection.
    pub async fn new(config: &TargetConfig) -> Result<Self> {
        let builder = match &config.url {
            Some(url) => OptsBuilder::from_opts(
                Opts::from_url(url)
                    .map_err(|e| SinkError::Config(format!("target.url is invalid: {}", e)))?,
            ),
            None => OptsBuilder::default()
                .ip_or_hostname(&config.host)
                .tcp_port(config.effective_port())
                .db_name(Some(&config.database))
                .user(Some(&config.user))
                .pass(Some(&config.password)),
        }
        // Use utf8mb4 for full Unicode support
        .init(vec!["SET NAMES utf8mb4"]);

        let constraints = PoolConstraints::new(1, config.max_connections).ok_or_else(|| {
            SinkError::Config(format!(
                "target.max_connections must be at least 1, got {}",
                config.max_connections
            ))
        })?;
        let pool_opts = PoolOpts::new().with_constraints(constraints);

        warn!("MySQL connections are not encrypted; use a trusted network or a local socket.");
        let opts: Opts = builder.pool_opts(pool_opts).into();
        let pool = Pool::new(opts);

        // Test connection
        let mut conn = pool
            .get_conn()
            .await
            .map_err(|e| SinkError::pool(e, "creating MySQL target pool"))?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| SinkError::pool(e, "testing MySQL target connection"))?;
        drop(conn);

        info!("Connected to MySQL target: {}", config.endpoint());

        Ok(Self {
            pool,
            dialect: MysqlDialect::new(),
        })
    }

    pub fn dialect(&self) -> &MysqlDialect {
        &self.dialect
    }

    async fn conn(&self) -> Result<Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| SinkError::pool(e, "getting MySQL connection"))
    }

    /// Run one statement, wrapping failures with the statement text.
    async fn execute(&self, sql: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        debug!("{}", sql);
        conn.query_drop(sql)
            .await
            .map_err(|e| SinkError::execution(sql, e))
    }
}

#[async_trait]
impl TargetEngine for MysqlWriter {
    fn name(&self) -> &str {
        "mysql"
    }

    fn native_boolean(&self) -> bool {
        self.dialect.native_boolean()
    }

    async fn create_schema(&self, schema: &str) -> Result<()> {
        let sql = self.dialect.build_create_schema(schema)?;
        self.execute(&sql).await?;
        debug!("Created database '{}'", schema);
        Ok(())
    }

    async fn describe_table(&self, table: &TableName) -> Result<Option<Vec<ExistingColumn>>> {
        let mut conn = self.conn().await?;
        let rows: Vec<DescribeRow> = conn
            .exec(DESCRIBE_SQL, (table.schema.as_deref(), table.name.as_str()))
            .await
            .map_err(|e| SinkError::execution(format!("describing {}", table), e))?;

        if rows.is_empty() {
            return Ok(None);
        }

        let columns = rows
            .into_iter()
            .map(|(name, data_type, char_len, precision, scale)| ExistingColumn {
                name,
                sql_type: self
                    .dialect
                    .parse_type(&data_type, char_len, precision, scale),
            })
            .collect();
        Ok(Some(columns))
    }

    async fn create_table(&self, table: &TableDescriptor) -> Result<()> {
        let ddl = self.dialect.build_create_table(table)?;
        self.execute(&ddl).await?;
        debug!("Created table {}", table.name);
        Ok(())
    }

    async fn add_column(&self, table: &TableName, column: &ColumnDescriptor) -> Result<()> {
        let sql = self.dialect.build_add_column(table, column)?;
        self.execute(&sql).await
    }

    async fn alter_column_type(
        &self,
        table: &TableName,
        column: &str,
        ty: &SqlType,
    ) -> Result<()> {
        let sql = self.dialect.build_alter_column(table, column, ty)?;
        self.execute(&sql).await
    }

    async fn create_staging_table(&self, staging: &TableName, target: &TableName) -> Result<()> {
        let sql = self.dialect.build_create_staging(staging, target)?;
        self.execute(&sql).await
    }

    async fn drop_table(&self, table: &TableName) -> Result<()> {
        let sql = self.dialect.build_drop_table(table)?;
        self.execute(&sql).await
    }

    async fn insert_rows(
        &self,
        table: &TableName,
        columns: &[String],
        rows: Vec<Vec<SqlValue<'static>>>,
    ) -> Result<u64> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(0);
        }

        let max_rows_per_statement = (MYSQL_MAX_PLACEHOLDERS / columns.len()).max(1);
        let mut conn = self.conn().await?;
        let mut written = 0u64;

        for chunk in rows.chunks(max_rows_per_statement) {
            let sql = self.dialect.build_insert(table, columns, chunk.len())?;
            let params: Vec<mysql_async::Value> = chunk
                .iter()
                .flat_map(|row| row.iter().map(sql_value_to_mysql))
                .collect();

            conn.exec_drop(&sql, params)
                .await
                .map_err(|e| SinkError::execution(format!("INSERT INTO {}", table), e))?;
            written += chunk.len() as u64;
        }

        debug!("MySQL: wrote {} rows to {}", written, table);
        Ok(written)
    }

    async fn merge_upsert(
        &self,
        staging: &TableName,
        target: &TableName,
        columns: &[String],
        keys: &[String],
    ) -> Result<u64> {
        let statements = self.dialect.build_merge(target, staging, columns, keys)?;

        let mut conn = self.conn().await?;
        let mut tx = conn
            .start_transaction(TxOpts::default())
            .await
            .map_err(|e| SinkError::execution(format!("BEGIN (merge into {})", target), e))?;
        let mut affected = 0u64;
        for sql in &statements {
            debug!("{}", sql);
            tx.query_drop(sql.as_str())
                .await
                .map_err(|e| SinkError::execution(sql.as_str(), e))?;
            affected += tx.affected_rows();
        }
        tx.commit()
            .await
            .map_err(|e| SinkError::execution(format!("COMMIT (merge into {})", target), e))?;

        debug!("Merged into {} ({} affected rows)", target, affected);
        Ok(affected)
    }

    async fn close(&self) {
        self.pool.clone().disconnect().await.ok();
    }
}

/// Convert a SqlValue to a mysql_async parameter.
///
/// Decimal and temporal values travel as strings; the server casts them to
/// the column type.
fn sql_value_to_mysql(value: &SqlValue<'_>) -> mysql_async::Value {
    match value {
        SqlValue::Null(_) => mysql_async::Value::NULL,
        SqlValue::Bool(b) => mysql_async::Value::from(*b),
        SqlValue::I64(i) => mysql_async::Value::from(*i),
        SqlValue::F64(f) => mysql_async::Value::from(*f),
        SqlValue::Text(s) => mysql_async::Value::from(s.as_ref()),
        SqlValue::Decimal(d) => mysql_async::Value::from(d.to_string()),
        SqlValue::DateTime(dt) => {
            mysql_async::Value::from(dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
        }
        SqlValue::Date(d) => mysql_async::Value::from(d.format("%Y-%m-%d").to_string()),
        SqlValue::Time(t) => mysql_async::Value::from(t.format("%H:%M:%S%.6f").to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    #[test]
    fn test_null_binds_as_null() {
        assert_eq!(
            sql_value_to_mysql(&SqlValue::null_for(&SqlType::Timestamp)),
            mysql_async::Value::NULL
        );
    }

    #[test]
    fn test_temporal_and_decimal_bind_as_text() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        assert_eq!(
            sql_value_to_mysql(&SqlValue::DateTime(ts)),
            mysql_async::Value::Bytes(b"2024-03-01 12:30:00.000000".to_vec())
        );
        assert_eq!(
            sql_value_to_mysql(&SqlValue::Decimal(Decimal::new(-105, 1))),
            mysql_async::Value::Bytes(b"-10.5".to_vec())
        );
    }
}
