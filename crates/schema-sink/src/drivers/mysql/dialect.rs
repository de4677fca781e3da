//! MySQL/MariaDB SQL dialect (Strategy pattern).

use crate::core::identifier::quote_mysql;
use crate::core::traits::Dialect;
use crate::core::{ColumnDescriptor, SqlType, TableName};
use crate::error::{Result, SinkError};

/// Longest text kept inline as VARCHAR; wider text goes to the TEXT family
/// so wide tables stay under the 65,535-byte row size limit.
const MAX_VARCHAR_LENGTH: u32 = 255;
/// Character capacity of TEXT and MEDIUMTEXT with 4-byte utf8mb4 characters.
const TEXT_CAPACITY: u32 = 16_383;
const MEDIUMTEXT_CAPACITY: u32 = 4_194_303;
/// InnoDB index key limit.
const MAX_KEY_BYTES: u64 = 3072;
/// Bytes per character in utf8mb4.
const UTF8MB4_BYTES: u64 = 4;

/// MySQL/MariaDB dialect implementation.
///
/// Compatible with MySQL 5.7+, 8.0+, and MariaDB 10.2+.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mysql(name)
    }

    fn native_boolean(&self) -> bool {
        false
    }

    fn render_type(&self, ty: &SqlType) -> String {
        match ty {
            SqlType::Text { length: Some(n) } if *n <= MAX_VARCHAR_LENGTH => {
                format!("varchar({})", n)
            }
            SqlType::Text { length: Some(n) } if *n <= TEXT_CAPACITY => "text".to_string(),
            SqlType::Text { length: Some(n) } if *n <= MEDIUMTEXT_CAPACITY => {
                "mediumtext".to_string()
            }
            SqlType::Text { .. } => "longtext".to_string(),
            SqlType::Integer => "bigint".to_string(),
            SqlType::Numeric { precision, scale } => format!("decimal({},{})", precision, scale),
            SqlType::Float => "double".to_string(),
            SqlType::Boolean => "boolean".to_string(),
            SqlType::Date => "date".to_string(),
            SqlType::Time => "time(6)".to_string(),
            SqlType::Timestamp => "datetime(6)".to_string(),
            SqlType::Other(name) => name.clone(),
        }
    }

    fn parse_type(
        &self,
        data_type: &str,
        char_length: Option<i64>,
        precision: Option<i64>,
        scale: Option<i64>,
    ) -> SqlType {
        match data_type.to_lowercase().as_str() {
            "varchar" | "char" => SqlType::text(char_length.and_then(|n| u32::try_from(n).ok())),
            "tinytext" => SqlType::text(Some(MAX_VARCHAR_LENGTH)),
            "text" => SqlType::text(Some(TEXT_CAPACITY)),
            "mediumtext" => SqlType::text(Some(MEDIUMTEXT_CAPACITY)),
            "longtext" | "json" => SqlType::text(None),
            "bigint" | "int" | "integer" | "mediumint" | "smallint" | "tinyint" => {
                SqlType::Integer
            }
            "decimal" | "numeric" => {
                let p = precision.and_then(|p| u32::try_from(p).ok()).unwrap_or(10);
                let s = scale.and_then(|s| u32::try_from(s).ok()).unwrap_or(0);
                SqlType::numeric(p, s)
            }
            "double" | "float" | "real" => SqlType::Float,
            "date" => SqlType::Date,
            "time" => SqlType::Time,
            "datetime" | "timestamp" => SqlType::Timestamp,
            other => SqlType::Other(other.to_string()),
        }
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Text key columns stay VARCHAR whatever their length, so the whole
    /// value is indexed.
    fn render_column_type(&self, column: &ColumnDescriptor) -> String {
        match column.sql_type {
            SqlType::Text { length: Some(n) } if column.primary_key => format!("varchar({})", n),
            ref other => self.render_type(other),
        }
    }

    fn check_primary_key(&self, table: &TableName, keys: &[&ColumnDescriptor]) -> Result<()> {
        let mut total = 0u64;
        for key in keys {
            total += key_bytes(&key.sql_type).ok_or_else(|| {
                SinkError::schema(
                    table.to_string(),
                    format!(
                        "primary key column '{}' is unbounded text; declare a maxLength",
                        key.name
                    ),
                )
            })?;
        }
        if total > MAX_KEY_BYTES {
            return Err(SinkError::schema(
                table.to_string(),
                format!(
                    "primary key needs {} bytes but MySQL indexes at most {}; \
                     declare a smaller maxLength on its text columns \
                     (at most {} characters in total)",
                    total,
                    MAX_KEY_BYTES,
                    MAX_KEY_BYTES / UTF8MB4_BYTES
                ),
            ));
        }
        Ok(())
    }

    fn build_alter_column(&self, table: &TableName, column: &str, ty: &SqlType) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} MODIFY COLUMN {} {}",
            self.qualify(table)?,
            self.quote_ident(column)?,
            self.render_type(ty)
        ))
    }

    fn build_create_staging(&self, staging: &TableName, target: &TableName) -> Result<String> {
        Ok(format!(
            "CREATE TABLE {} LIKE {}",
            self.qualify(staging)?,
            self.qualify(target)?
        ))
    }

    fn build_merge_update(
        &self,
        target: &TableName,
        staging: &TableName,
        columns: &[String],
        keys: &[String],
    ) -> Result<Option<String>> {
        let mut assignments = Vec::new();
        for c in columns.iter().filter(|c| !keys.contains(c)) {
            let q = self.quote_ident(c)?;
            assignments.push(format!("t.{} = s.{}", q, q));
        }
        if assignments.is_empty() {
            return Ok(None);
        }

        Ok(Some(format!(
            "UPDATE {} AS t JOIN {} AS s ON {} SET {}",
            self.qualify(target)?,
            self.qualify(staging)?,
            self.build_key_join(keys)?,
            assignments.join(", ")
        )))
    }
}

/// Index bytes one key column takes, or `None` for unbounded text.
fn key_bytes(ty: &SqlType) -> Option<u64> {
    match ty {
        SqlType::Text { length } => length.map(|n| u64::from(n) * UTF8MB4_BYTES),
        SqlType::Numeric { precision, .. } => Some(u64::from(*precision) / 2 + 1),
        SqlType::Boolean => Some(1),
        SqlType::Date => Some(3),
        SqlType::Time => Some(6),
        SqlType::Integer | SqlType::Float | SqlType::Timestamp | SqlType::Other(_) => Some(8),
    }
}
