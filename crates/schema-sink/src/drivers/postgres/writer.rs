//! PostgreSQL target engine.
//!
//! Uses deadpool-postgres for connection pooling and text-format COPY for
//! bulk loads. Merges run as an `UPDATE … FROM` of matched rows followed by
//! an anti-join `INSERT … SELECT`, both inside one explicit transaction.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use futures::SinkExt;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::traits::{Dialect, TargetEngine};
use crate::core::{
    ColumnDescriptor, ExistingColumn, SqlType, SqlValue, TableDescriptor, TableName,
};
use crate::error::{Result, SinkError};

use super::PostgresDialect;

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

const DESCRIBE_SQL: &str = r#"
    SELECT column_name::text,
           data_type::text,
           character_maximum_length::int4,
           numeric_precision::int4,
           numeric_scale::int4
    FROM information_schema.columns
    WHERE table_schema::text = COALESCE($1::text, current_schema()::text)
      AND table_name::text = $2::text
    ORDER BY ordinal_position
"#;

/// PostgreSQL target engine.
pub struct PostgresWriter {
    pool: Pool,
    dialect: PostgresDialect,
}

impl PostgresWriter {
    /// Connect to PostgreSQL and verify the connection.
    pub async fn new(config: &TargetConfig) -> Result<Self> {
        let mut pg_config = match &config.url {
            Some(url) => url
                .parse::<PgConfig>()
                .map_err(|e| SinkError::Config(format!("target.url is invalid: {}", e)))?,
            None => {
                let mut pg_config = PgConfig::new();
                pg_config.host(&config.host);
                pg_config.port(config.effective_port());
                pg_config.dbname(&config.database);
                pg_config.user(&config.user);
                pg_config.password(&config.password);
                pg_config
            }
        };
        pg_config.application_name("schema-sink");

        // Connection options for reliability
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(POOL_CONNECTION_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        warn!("PostgreSQL connections are not encrypted; use a trusted network or a local socket.");
        let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(config.max_connections)
            .build()
            .map_err(|e| SinkError::pool(e, "creating PostgreSQL target pool"))?;

        // Test connection
        let client = pool
            .get()
            .await
            .map_err(|e| SinkError::pool(e, "testing PostgreSQL target connection"))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| SinkError::pool(e, "testing PostgreSQL target connection"))?;

        info!("Connected to PostgreSQL target: {}", config.endpoint());

        Ok(Self {
            pool,
            dialect: PostgresDialect::new(),
        })
    }

    pub fn dialect(&self) -> &PostgresDialect {
        &self.dialect
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| SinkError::pool(e, "getting PostgreSQL connection"))
    }

    /// Run one statement, wrapping failures with the statement text.
    async fn execute(&self, sql: &str) -> Result<u64> {
        let client = self.client().await?;
        debug!("{}", sql);
        client
            .execute(sql, &[])
            .await
            .map_err(|e| SinkError::execution(sql, e))
    }
}

#[async_trait]
impl TargetEngine for PostgresWriter {
    fn name(&self) -> &str {
        "postgres"
    }

    fn native_boolean(&self) -> bool {
        self.dialect.native_boolean()
    }

    async fn create_schema(&self, schema: &str) -> Result<()> {
        let sql = self.dialect.build_create_schema(schema)?;
        self.execute(&sql).await?;
        debug!("Created schema '{}'", schema);
        Ok(())
    }

    async fn describe_table(&self, table: &TableName) -> Result<Option<Vec<ExistingColumn>>> {
        let client = self.client().await?;
        let rows = client
            .query(DESCRIBE_SQL, &[&table.schema.as_deref(), &table.name.as_str()])
            .await
            .map_err(|e| SinkError::execution(format!("describing {}", table), e))?;

        if rows.is_empty() {
            return Ok(None);
        }

        let columns = rows
            .iter()
            .map(|row| {
                let name: String = row.get(0);
                let data_type: String = row.get(1);
                let char_len: Option<i32> = row.get(2);
                let precision: Option<i32> = row.get(3);
                let scale: Option<i32> = row.get(4);
                ExistingColumn {
                    name,
                    sql_type: self.dialect.parse_type(
                        &data_type,
                        char_len.map(i64::from),
                        precision.map(i64::from),
                        scale.map(i64::from),
                    ),
                }
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
        self.execute(&sql).await?;
        Ok(())
    }

    async fn alter_column_type(
        &self,
        table: &TableName,
        column: &str,
        ty: &SqlType,
    ) -> Result<()> {
        let sql = self.dialect.build_alter_column(table, column, ty)?;
        self.execute(&sql).await?;
        Ok(())
    }

    async fn create_staging_table(&self, staging: &TableName, target: &TableName) -> Result<()> {
        let sql = self.dialect.build_create_staging(staging, target)?;
        self.execute(&sql).await?;
        Ok(())
    }

    async fn drop_table(&self, table: &TableName) -> Result<()> {
        let sql = self.dialect.build_drop_table(table)?;
        self.execute(&sql).await?;
        Ok(())
    }

    async fn insert_rows(
        &self,
        table: &TableName,
        columns: &[String],
        rows: Vec<Vec<SqlValue<'static>>>,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let col_list = columns
            .iter()
            .map(|c| self.dialect.quote_ident(c))
            .collect::<Result<Vec<_>>>()?;
        let copy_sql = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT TEXT)",
            self.dialect.qualify(table)?,
            col_list.join(", ")
        );

        let mut text_buf = String::with_capacity(rows.len() * 128);
        for row in &rows {
            for (i, value) in row.iter().enumerate() {
                if i > 0 {
                    text_buf.push('\t');
                }
                text_buf.push_str(&value_to_text(value));
            }
            text_buf.push('\n');
        }

        let client = self.client().await?;
        debug!("{} ({} rows)", copy_sql, rows.len());
        let sink = client
            .copy_in(&copy_sql)
            .await
            .map_err(|e| SinkError::execution(copy_sql.as_str(), e))?;
        tokio::pin!(sink);
        sink.send(bytes::Bytes::from(text_buf))
            .await
            .map_err(|e| SinkError::execution(copy_sql.as_str(), e))?;
        let written = sink
            .finish()
            .await
            .map_err(|e| SinkError::execution(copy_sql.as_str(), e))?;

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

        let mut client = self.client().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| SinkError::execution(format!("BEGIN (merge into {})", target), e))?;
        let mut merged = 0u64;
        for sql in &statements {
            debug!("{}", sql);
            merged += tx
                .execute(sql.as_str(), &[])
                .await
                .map_err(|e| SinkError::execution(sql.as_str(), e))?;
        }
        tx.commit()
            .await
            .map_err(|e| SinkError::execution(format!("COMMIT (merge into {})", target), e))?;

        debug!("Merged {} rows into {}", merged, target);
        Ok(merged)
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// Render a value in COPY text format.
fn value_to_text(value: &SqlValue<'_>) -> String {
    match value {
        SqlValue::Null(_) => "\\N".to_string(),
        SqlValue::Bool(b) => (if *b { "t" } else { "f" }).to_string(),
        SqlValue::I64(i) => i.to_string(),
        SqlValue::F64(f) => f.to_string(),
        SqlValue::Text(s) => escape_copy_text(s),
        SqlValue::Decimal(d) => d.to_string(),
        SqlValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        SqlValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        SqlValue::Time(t) => t.format("%H:%M:%S%.f").to_string(),
    }
}

/// Escape text for PostgreSQL COPY.
fn escape_copy_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\t' => result.push_str("\\t"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}
