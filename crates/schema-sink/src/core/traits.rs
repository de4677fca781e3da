//! Core traits for engine-agnostic loading.
//!
//! - [`Dialect`]: SQL syntax strategy for one relational engine
//! - [`TargetEngine`]: the relational engine session the loader drives
//! - [`BatchSource`]: supplies validated batches
//!
//! # Design Patterns
//!
//! - **Strategy**: `Dialect` provides interchangeable SQL rendering
//! - **Template Method**: default `Dialect` methods build DDL from the
//!   primitives each engine overrides

use async_trait::async_trait;

use crate::error::{Result, SinkError};

use super::schema::{Batch, ColumnDescriptor, ExistingColumn, TableDescriptor, TableName};
use super::sql_type::SqlType;
use super::value::SqlValue;

/// SQL syntax strategy for different database engines.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g., "postgres", "mysql").
    fn name(&self) -> &str;

    /// Validate and quote an identifier.
    fn quote_ident(&self, name: &str) -> Result<String>;

    /// Quote a possibly schema-qualified table name.
    fn qualify(&self, table: &TableName) -> Result<String> {
        match &table.schema {
            Some(schema) => Ok(format!(
                "{}.{}",
                self.quote_ident(schema)?,
                self.quote_ident(&table.name)?
            )),
            None => self.quote_ident(&table.name),
        }
    }

    /// Whether the engine has a native boolean column type.
    fn native_boolean(&self) -> bool;

    /// DDL spelling of a column type.
    fn render_type(&self, ty: &SqlType) -> String;

    /// Map catalog metadata (`information_schema.columns`) back to a type.
    fn parse_type(
        &self,
        data_type: &str,
        char_length: Option<i64>,
        precision: Option<i64>,
        scale: Option<i64>,
    ) -> SqlType;

    /// Get a parameter placeholder for the given 1-based index.
    fn param_placeholder(&self, index: usize) -> String;

    fn build_create_schema(&self, schema: &str) -> Result<String> {
        Ok(format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            self.quote_ident(schema)?
        ))
    }

    /// CREATE TABLE with every column nullable and a primary-key constraint
    /// when keys are declared.
    fn build_create_table(&self, table: &TableDescriptor) -> Result<String> {
        let keys: Vec<&ColumnDescriptor> = table.columns.iter().filter(|c| c.primary_key).collect();
        self.check_primary_key(&table.name, &keys)?;

        let mut defs = Vec::with_capacity(table.columns.len() + 1);
        for col in &table.columns {
            let not_null = if col.primary_key { " NOT NULL" } else { "" };
            defs.push(format!(
                "{} {}{}",
                self.quote_ident(&col.name)?,
                self.render_column_type(col),
                not_null
            ));
        }

        if !keys.is_empty() {
            let parts = keys
                .iter()
                .map(|c| self.quote_ident(&c.name))
                .collect::<Result<Vec<_>>>()?;
            defs.push(format!("PRIMARY KEY ({})", parts.join(", ")));
        }

        Ok(format!(
            "CREATE TABLE {} ({})",
            self.qualify(&table.name)?,
            defs.join(", ")
        ))
    }

    /// Column type in CREATE TABLE; key columns may need a different
    /// spelling than other columns of the same type.
    fn render_column_type(&self, column: &ColumnDescriptor) -> String {
        self.render_type(&column.sql_type)
    }

    /// Reject a primary key the engine cannot index over its full values.
    fn check_primary_key(&self, _table: &TableName, _keys: &[&ColumnDescriptor]) -> Result<()> {
        Ok(())
    }

    fn build_add_column(&self, table: &TableName, column: &ColumnDescriptor) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.qualify(table)?,
            self.quote_ident(&column.name)?,
            self.render_type(&column.sql_type)
        ))
    }

    fn build_alter_column(&self, table: &TableName, column: &str, ty: &SqlType) -> Result<String>;

    fn build_drop_table(&self, table: &TableName) -> Result<String> {
        Ok(format!("DROP TABLE IF EXISTS {}", self.qualify(table)?))
    }

    /// Structure-only copy of `target` named `staging`.
    fn build_create_staging(&self, staging: &TableName, target: &TableName) -> Result<String>;

    /// Multi-row INSERT with positional placeholders.
    fn build_insert(&self, table: &TableName, columns: &[String], rows: usize) -> Result<String> {
        let cols = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Result<Vec<_>>>()?;

        let mut values = Vec::with_capacity(rows);
        let mut index = 1;
        for _ in 0..rows {
            let row: Vec<String> = (0..columns.len())
                .map(|i| self.param_placeholder(index + i))
                .collect();
            index += columns.len();
            values.push(format!("({})", row.join(", ")));
        }

        Ok(format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.qualify(table)?,
            cols.join(", "),
            values.join(", ")
        ))
    }

    /// `t.k = s.k AND …` over `keys`, for target alias `t` and staging
    /// alias `s`.
    fn build_key_join(&self, keys: &[String]) -> Result<String> {
        let terms = keys
            .iter()
            .map(|k| {
                let q = self.quote_ident(k)?;
                Ok(format!("t.{} = s.{}", q, q))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(terms.join(" AND "))
    }

    /// UPDATE every target row matching a staging row on `keys` with the
    /// staging row's non-key columns. `None` when every column is a key.
    fn build_merge_update(
        &self,
        target: &TableName,
        staging: &TableName,
        columns: &[String],
        keys: &[String],
    ) -> Result<Option<String>>;

    /// INSERT the staging rows that match no target row on `keys`.
    fn build_merge_insert(
        &self,
        target: &TableName,
        staging: &TableName,
        columns: &[String],
        keys: &[String],
    ) -> Result<String> {
        let quoted = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Result<Vec<_>>>()?;
        let select_cols: Vec<String> = quoted.iter().map(|c| format!("s.{}", c)).collect();
        let first_key = keys
            .first()
            .ok_or_else(|| SinkError::schema(target.to_string(), "merge requires key columns"))?;

        Ok(format!(
            "INSERT INTO {} ({}) SELECT {} FROM {} AS s LEFT JOIN {} AS t ON {} WHERE t.{} IS NULL",
            self.qualify(target)?,
            quoted.join(", "),
            select_cols.join(", "),
            self.qualify(staging)?,
            self.qualify(target)?,
            self.build_key_join(keys)?,
            self.quote_ident(first_key)?
        ))
    }

    /// Statements merging staging rows into the target by equality on
    /// `keys`: matched rows get every non-key column overwritten, unmatched
    /// rows are inserted. Run in order inside one transaction.
    ///
    /// Matching uses `keys` alone, so the merge neither needs nor is
    /// affected by unique constraints on the target.
    fn build_merge(
        &self,
        target: &TableName,
        staging: &TableName,
        columns: &[String],
        keys: &[String],
    ) -> Result<Vec<String>> {
        let mut statements = Vec::with_capacity(2);
        if let Some(update) = self.build_merge_update(target, staging, columns, keys)? {
            statements.push(update);
        }
        statements.push(self.build_merge_insert(target, staging, columns, keys)?);
        Ok(statements)
    }
}

/// The relational engine session the loader drives.
///
/// Every method runs its statement to completion; errors carry the statement
/// context. `merge_upsert` is atomic and commits before returning.
#[async_trait]
pub trait TargetEngine: Send + Sync {
    /// Get the engine identifier (e.g., "postgres", "memory").
    fn name(&self) -> &str;

    /// Whether booleans can be stored natively.
    fn native_boolean(&self) -> bool;

    /// Create a schema if it doesn't exist.
    async fn create_schema(&self, schema: &str) -> Result<()>;

    /// Current columns of a table, in ordinal order, or `None` when absent.
    async fn describe_table(&self, table: &TableName) -> Result<Option<Vec<ExistingColumn>>>;

    async fn create_table(&self, table: &TableDescriptor) -> Result<()>;

    /// Add a nullable column.
    async fn add_column(&self, table: &TableName, column: &ColumnDescriptor) -> Result<()>;

    async fn alter_column_type(&self, table: &TableName, column: &str, ty: &SqlType)
        -> Result<()>;

    /// Create `staging` with the same columns as `target` and no rows.
    async fn create_staging_table(&self, staging: &TableName, target: &TableName) -> Result<()>;

    /// Drop a table if it exists.
    async fn drop_table(&self, table: &TableName) -> Result<()>;

    /// Append rows. Returns the number of rows written.
    async fn insert_rows(
        &self,
        table: &TableName,
        columns: &[String],
        rows: Vec<Vec<SqlValue<'static>>>,
    ) -> Result<u64>;

    /// Merge `staging` into `target` on `keys` and commit.
    async fn merge_upsert(
        &self,
        staging: &TableName,
        target: &TableName,
        columns: &[String],
        keys: &[String],
    ) -> Result<u64>;

    /// Close the connection pool.
    async fn close(&self);
}

/// Supplies batches to the sink, one at a time.
#[async_trait]
pub trait BatchSource: Send {
    /// Next batch, or `None` when exhausted. Errors are upstream errors.
    async fn next_batch(&mut self) -> Result<Option<Batch>>;
}

#[async_trait]
impl BatchSource for std::vec::IntoIter<Batch> {
    async fn next_batch(&mut self) -> Result<Option<Batch>> {
        Ok(self.next())
    }
}
