//! Batch loading: append or merge-upsert through a staging table.
//!
//! Every batch goes through the same sequence:
//!
//! 1. conform property and stream names
//! 2. map declared types to column types
//! 3. reconcile the physical table ([`TableEvolutionManager`])
//! 4. move the rows in
//!
//! Batches without primary keys are appended. Keyed batches are deduplicated
//! on their key (last record wins), bulk-loaded into a staging table and
//! merged into the target in one committed statement; the staging table is
//! dropped whether the load succeeds or not.

mod sink;
mod staging;

pub use sink::{Sink, SinkSummary};
pub use staging::{staging_name, StagingTable, MAX_STAGING_NAME_BYTES, STAGING_PREFIX};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::LoadConfig;
use crate::core::value::null_default;
use crate::core::{
    Batch, ColumnDescriptor, FieldKind, IdentifierConformer, Record, Records, SqlType, SqlValue,
    TableDescriptor, TableName, TargetEngine,
};
use crate::error::{Result, SinkError};
use crate::evolution::{EvolutionPlan, TableEvolutionManager};
use crate::typemap::SchemaTypeMapper;

/// Rows written by one load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCount {
    /// The batch was materialized and this many records were loaded.
    Exact(u64),
    /// The batch was streamed; no count is available.
    Unknown,
}

impl RowCount {
    pub fn exact(&self) -> Option<u64> {
        match self {
            RowCount::Exact(n) => Some(*n),
            RowCount::Unknown => None,
        }
    }
}

impl fmt::Display for RowCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowCount::Exact(n) => write!(f, "{}", n),
            RowCount::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of loading one batch.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub table: TableName,
    pub rows: RowCount,
    pub evolution: EvolutionPlan,
    pub upserted: bool,
}

/// How one property of the batch lands in its column.
#[derive(Debug, Clone)]
struct ColumnBinding {
    source: String,
    column: String,
    kind: FieldKind,
    sql_type: SqlType,
}

/// Per-batch settings threaded through row conversion.
#[derive(Debug, Clone, Copy)]
pub struct BatchContext<'a> {
    pub replace_null_with_type_default: bool,
    bindings: &'a [ColumnBinding],
}

impl<'a> BatchContext<'a> {
    /// Convert one record into a row ordered like the bindings. Unknown
    /// properties are dropped and missing ones become NULL.
    fn row(&self, record: &Record) -> Result<Vec<SqlValue<'static>>> {
        self.bindings
            .iter()
            .map(|b| {
                let value = record.get(&b.source).unwrap_or(&Value::Null);
                if value.is_null() && self.replace_null_with_type_default {
                    if let Some(default) = null_default(b.kind) {
                        return SqlValue::from_json(&default, b.kind, &b.sql_type, &b.column);
                    }
                }
                SqlValue::from_json(value, b.kind, &b.sql_type, &b.column)
            })
            .collect()
    }
}

/// Loads batches into one target engine.
pub struct BatchLoader {
    engine: Arc<dyn TargetEngine>,
    config: LoadConfig,
    conformer: IdentifierConformer,
    mapper: SchemaTypeMapper,
}

impl BatchLoader {
    pub fn new(engine: Arc<dyn TargetEngine>, config: LoadConfig) -> Self {
        let conformer = IdentifierConformer::new(config.lower_case_identifiers);
        let mapper = SchemaTypeMapper::new(config.type_map_options(engine.native_boolean()));
        Self {
            engine,
            config,
            conformer,
            mapper,
        }
    }

    pub fn engine(&self) -> &Arc<dyn TargetEngine> {
        &self.engine
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// Target table of a stream.
    pub fn table_for(&self, stream: &str) -> TableName {
        TableName::from_stream(
            stream,
            self.config.default_target_schema.as_deref(),
            &self.conformer,
        )
    }

    /// Table definition a batch requires.
    pub fn describe_batch(&self, batch: &Batch) -> Result<TableDescriptor> {
        let table = self.table_for(&batch.stream);
        let schema = &batch.schema;

        for key in &batch.key_properties {
            if schema.get(key).is_none() {
                return Err(SinkError::schema(
                    table.to_string(),
                    format!("primary key '{}' is not a schema property", key),
                ));
            }
        }

        let names = self.conformer.conform_properties(schema.names())?;
        let columns = schema
            .properties()
            .iter()
            .zip(names)
            .map(|((source, field), name)| ColumnDescriptor {
                name,
                sql_type: self.mapper.map(field),
                primary_key: batch.key_properties.contains(source),
            })
            .collect();

        TableDescriptor::new(table, columns)
    }

    /// Load one batch. Evolution, load and merge complete before this returns.
    pub async fn load(&self, batch: Batch) -> Result<LoadOutcome> {
        let desired = self.describe_batch(&batch)?;

        let manager =
            TableEvolutionManager::new(self.engine.as_ref(), self.config.evolution_policy());
        let evolution = manager.reconcile(&desired).await?;

        let bindings: Vec<ColumnBinding> = batch
            .schema
            .properties()
            .iter()
            .zip(&desired.columns)
            .map(|((source, field), col)| ColumnBinding {
                source: source.clone(),
                column: col.name.clone(),
                kind: field.kind,
                sql_type: evolution
                    .column_types
                    .get(&col.name)
                    .cloned()
                    .unwrap_or_else(|| col.sql_type.clone()),
            })
            .collect();
        let ctx = BatchContext {
            replace_null_with_type_default: self.config.replace_null_with_type_default,
            bindings: &bindings,
        };

        let keys: Vec<String> = desired
            .primary_key()
            .into_iter()
            .map(str::to_string)
            .collect();
        let countable = batch.records.is_countable();
        let table = desired.name.clone();

        let (loaded, upserted) = if keys.is_empty() {
            (self.append(&table, &ctx, batch.records).await?, false)
        } else {
            (self.upsert(&table, &ctx, &keys, batch.records).await?, true)
        };

        let rows = if countable {
            RowCount::Exact(loaded)
        } else {
            RowCount::Unknown
        };
        info!(
            "{}: loaded {} rows ({})",
            table,
            rows,
            if upserted { "upsert" } else { "append" }
        );

        Ok(LoadOutcome {
            table,
            rows,
            evolution,
            upserted,
        })
    }

    fn columns(ctx: &BatchContext<'_>) -> Vec<String> {
        ctx.bindings.iter().map(|b| b.column.clone()).collect()
    }

    /// Insert every record as-is, in chunks.
    ///
    /// A materialized batch is converted in full before the first insert, so
    /// a record that does not convert writes nothing. A streamed batch is
    /// converted chunk by chunk; chunks written before a failing record stay.
    async fn append(
        &self,
        table: &TableName,
        ctx: &BatchContext<'_>,
        records: Records,
    ) -> Result<u64> {
        let columns = Self::columns(ctx);
        let chunk_size = self.config.insert_batch_size.max(1);

        let iter = match records {
            Records::Materialized(records) => {
                let rows = records
                    .iter()
                    .map(|r| ctx.row(r))
                    .collect::<Result<Vec<_>>>()?;
                let total = rows.len() as u64;
                self.insert_chunked(table, &columns, rows).await?;
                return Ok(total);
            }
            Records::Streaming(iter) => iter,
        };

        let mut total = 0u64;
        let mut chunk = Vec::with_capacity(chunk_size);
        for record in iter {
            chunk.push(ctx.row(&record)?);
            if chunk.len() == chunk_size {
                let rows = std::mem::replace(&mut chunk, Vec::with_capacity(chunk_size));
                self.engine.insert_rows(table, &columns, rows).await?;
                total += chunk_size as u64;
            }
        }
        if !chunk.is_empty() {
            let n = chunk.len() as u64;
            self.engine.insert_rows(table, &columns, chunk).await?;
            total += n;
        }
        Ok(total)
    }

    async fn insert_chunked(
        &self,
        table: &TableName,
        columns: &[String],
        rows: Vec<Vec<SqlValue<'static>>>,
    ) -> Result<()> {
        let chunk_size = self.config.insert_batch_size.max(1);
        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            let chunk: Vec<_> = rows.by_ref().take(chunk_size).collect();
            self.engine.insert_rows(table, columns, chunk).await?;
        }
        Ok(())
    }

    /// Deduplicate on `keys`, stage, merge and release the staging table.
    async fn upsert(
        &self,
        table: &TableName,
        ctx: &BatchContext<'_>,
        keys: &[String],
        records: Records,
    ) -> Result<u64> {
        let columns = Self::columns(ctx);
        let key_idx: Vec<usize> = keys
            .iter()
            .filter_map(|k| columns.iter().position(|c| c == k))
            .collect();

        let mut received = 0u64;
        let mut rows: Vec<Vec<SqlValue<'static>>> = Vec::new();
        let mut positions: HashMap<Vec<KeyPart>, usize> = HashMap::new();
        for record in into_iter(records) {
            received += 1;
            let row = ctx.row(&record)?;
            let key = row_key(&row, &key_idx, ctx.bindings);
            match positions.get(&key) {
                Some(&pos) => rows[pos] = row,
                None => {
                    positions.insert(key, rows.len());
                    rows.push(row);
                }
            }
        }
        if rows.len() as u64 != received {
            debug!(
                "{}: {} records collapsed to {} distinct keys",
                table,
                received,
                rows.len()
            );
        }
        if rows.is_empty() {
            return Ok(0);
        }

        let staging = StagingTable::acquire(self.engine.as_ref(), table).await?;
        let outcome = self
            .stage_and_merge(staging.name(), table, &columns, keys, rows)
            .await;
        staging.release(outcome).await?;
        Ok(received)
    }

    async fn stage_and_merge(
        &self,
        staging: &TableName,
        target: &TableName,
        columns: &[String],
        keys: &[String],
        rows: Vec<Vec<SqlValue<'static>>>,
    ) -> Result<u64> {
        self.insert_chunked(staging, columns, rows).await?;
        self.engine
            .merge_upsert(staging, target, columns, keys)
            .await
    }
}

fn into_iter(records: Records) -> Box<dyn Iterator<Item = Record> + Send> {
    match records {
        Records::Materialized(rows) => Box::new(rows.into_iter()),
        Records::Streaming(iter) => iter,
    }
}

/// A key value as the target compares it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
    Decimal(Decimal),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl KeyPart {
    fn of(value: &SqlValue<'_>, sql_type: &SqlType) -> Self {
        match value {
            SqlValue::Null(_) => KeyPart::Null,
            SqlValue::Bool(b) => KeyPart::Bool(*b),
            SqlValue::I64(i) => KeyPart::Int(*i),
            // 0.0 and -0.0 compare equal
            SqlValue::F64(f) if *f == 0.0 => KeyPart::Float(0),
            SqlValue::F64(f) => KeyPart::Float(f.to_bits()),
            SqlValue::Text(s) => KeyPart::Text(s.to_string()),
            SqlValue::Decimal(d) => {
                // The column stores the value rounded to its scale.
                let stored = match sql_type {
                    SqlType::Numeric { scale, .. } => {
                        d.round_dp_with_strategy(*scale, RoundingStrategy::MidpointAwayFromZero)
                    }
                    _ => *d,
                };
                KeyPart::Decimal(stored.normalize())
            }
            SqlValue::DateTime(v) => KeyPart::DateTime(*v),
            SqlValue::Date(v) => KeyPart::Date(*v),
            SqlValue::Time(v) => KeyPart::Time(*v),
        }
    }
}

/// Identity of a row's key values.
fn row_key(row: &[SqlValue<'_>], key_idx: &[usize], bindings: &[ColumnBinding]) -> Vec<KeyPart> {
    key_idx
        .iter()
        .map(|&i| KeyPart::of(&row[i], &bindings[i].sql_type))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldType, Schema};
    use crate::drivers::MemoryEngine;
    use serde_json::json;

    fn loader(config: LoadConfig) -> BatchLoader {
        BatchLoader::new(Arc::new(MemoryEngine::new()), config)
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_describe_batch_conforms_names() {
        let loader = loader(LoadConfig::default());
        let schema = Schema::new(vec![
            ("userId".into(), FieldType::new(FieldKind::Integer)),
            ("First Name".into(), FieldType::string(Some(40))),
        ]);
        let batch = Batch::new("crm-Contacts", schema, Vec::new()).with_keys(["userId"]);
        let table = loader.describe_batch(&batch).unwrap();

        assert_eq!(table.name.to_string(), "crm.contacts");
        assert_eq!(table.columns[0].name, "user_id");
        assert!(table.columns[0].primary_key);
        assert_eq!(table.columns[1].name, "first_name");
        assert_eq!(table.columns[1].sql_type, SqlType::text(Some(40)));
    }

    #[test]
    fn test_describe_batch_rejects_unknown_key() {
        let loader = loader(LoadConfig::default());
        let schema = Schema::new(vec![("id".into(), FieldType::new(FieldKind::Integer))]);
        let batch = Batch::new("t", schema, Vec::new()).with_keys(["uuid"]);
        let err = loader.describe_batch(&batch).unwrap_err();
        assert!(matches!(err, SinkError::SchemaDefinition { .. }));
    }

    #[test]
    fn test_describe_batch_rejects_collision() {
        let loader = loader(LoadConfig::default());
        let schema = Schema::new(vec![
            ("createdAt".into(), FieldType::new(FieldKind::DateTime)),
            ("created_at".into(), FieldType::new(FieldKind::DateTime)),
        ]);
        let batch = Batch::new("t", schema, Vec::new());
        let err = loader.describe_batch(&batch).unwrap_err();
        assert!(matches!(err, SinkError::IdentifierCollision { .. }));
    }

    #[test]
    fn test_row_conversion_with_null_replacement() {
        let bindings = vec![
            ColumnBinding {
                source: "name".into(),
                column: "name".into(),
                kind: FieldKind::String,
                sql_type: SqlType::text(Some(10)),
            },
            ColumnBinding {
                source: "seen".into(),
                column: "seen".into(),
                kind: FieldKind::DateTime,
                sql_type: SqlType::Timestamp,
            },
        ];
        let ctx = BatchContext {
            replace_null_with_type_default: true,
            bindings: &bindings,
        };
        let row = ctx.row(&record(json!({"name": null, "extra": 1}))).unwrap();
        assert_eq!(row[0], SqlValue::Text("".into()));
        assert!(row[1].is_null());
    }

    fn key_binding(sql_type: SqlType) -> Vec<ColumnBinding> {
        vec![ColumnBinding {
            source: "k".into(),
            column: "k".into(),
            kind: FieldKind::Number,
            sql_type,
        }]
    }

    #[test]
    fn test_row_key_distinguishes_types() {
        let bindings = key_binding(SqlType::Integer);
        let a = vec![SqlValue::I64(1)];
        let b = vec![SqlValue::Text("1".into())];
        assert_ne!(row_key(&a, &[0], &bindings), row_key(&b, &[0], &bindings));
    }

    #[test]
    fn test_row_key_treats_equal_decimals_as_one_key() {
        let bindings = key_binding(SqlType::numeric(38, 16));
        let decimal = |s: &str| vec![SqlValue::Decimal(s.parse().unwrap())];
        assert_eq!(
            row_key(&decimal("1.0"), &[0], &bindings),
            row_key(&decimal("1.00"), &[0], &bindings)
        );
        assert_ne!(
            row_key(&decimal("1.5"), &[0], &bindings),
            row_key(&decimal("1.50001"), &[0], &bindings)
        );

        // Digits beyond the column scale are rounded away by the target.
        let bindings = key_binding(SqlType::numeric(10, 2));
        assert_eq!(
            row_key(&decimal("2.345"), &[0], &bindings),
            row_key(&decimal("2.35"), &[0], &bindings)
        );
    }

    #[test]
    fn test_row_key_treats_signed_zero_as_one_key() {
        let bindings = key_binding(SqlType::Float);
        assert_eq!(
            row_key(&[SqlValue::F64(0.0)], &[0], &bindings),
            row_key(&[SqlValue::F64(-0.0)], &[0], &bindings)
        );
    }
}
