//! In-process target engine.
//!
//! Keeps tables in memory and enforces the same rules a database would:
//! tables must exist before they are written, primary keys stay unique and
//! bounded text columns reject longer values. Used by `type: memory`
//! configurations and by tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use crate::core::traits::TargetEngine;
use crate::core::{
    ColumnDescriptor, ExistingColumn, SqlType, SqlValue, TableDescriptor, TableName,
};
use crate::error::{Result, SinkError};

#[derive(Debug, Clone)]
struct MemoryTable {
    columns: Vec<ExistingColumn>,
    primary_key: Vec<String>,
    rows: Vec<Vec<SqlValue<'static>>>,
}

impl MemoryTable {
    fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == column)
    }

    fn key_positions(&self) -> Vec<usize> {
        self.primary_key
            .iter()
            .filter_map(|k| self.position(k))
            .collect()
    }

    fn find_by_key(&self, key_pos: &[usize], row: &[SqlValue<'static>]) -> Option<usize> {
        if key_pos.is_empty() {
            return None;
        }
        self.rows
            .iter()
            .position(|existing| key_pos.iter().all(|&i| existing[i] == row[i]))
    }

    /// Lay out `values` (ordered as `columns`) in table column order.
    fn shape_row(
        &self,
        table: &TableName,
        columns: &[String],
        values: Vec<SqlValue<'static>>,
    ) -> Result<Vec<SqlValue<'static>>> {
        let mut row: Vec<SqlValue<'static>> = self
            .columns
            .iter()
            .map(|c| SqlValue::null_for(&c.sql_type))
            .collect();
        for (name, value) in columns.iter().zip(values) {
            let pos = self.position(name).ok_or_else(|| {
                failure(
                    format!("INSERT INTO {}", table),
                    format!("column \"{}\" does not exist", name),
                )
            })?;
            check_fits(table, &self.columns[pos], &value)?;
            row[pos] = value;
        }
        Ok(row)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    schemas: HashSet<String>,
    tables: HashMap<TableName, MemoryTable>,
    ddl: Vec<String>,
}

/// Target engine backed by in-process tables.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    state: Mutex<MemoryState>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| SinkError::pool("memory engine state poisoned", "locking memory engine"))
    }

    pub fn table_exists(&self, table: &TableName) -> bool {
        self.state
            .lock()
            .map(|s| s.tables.contains_key(table))
            .unwrap_or(false)
    }

    /// Qualified names of all tables, sorted.
    pub fn tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .map(|s| s.tables.keys().map(|t| t.to_string()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn columns(&self, table: &TableName) -> Option<Vec<ExistingColumn>> {
        let state = self.state.lock().ok()?;
        state.tables.get(table).map(|t| t.columns.clone())
    }

    /// Rows in insertion order, values in column order.
    pub fn rows(&self, table: &TableName) -> Option<Vec<Vec<SqlValue<'static>>>> {
        let state = self.state.lock().ok()?;
        state.tables.get(table).map(|t| t.rows.clone())
    }

    pub fn row_count(&self, table: &TableName) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.tables.get(table).map(|t| t.rows.len()))
            .unwrap_or(0)
    }

    /// Schema changes applied so far, one line per statement.
    pub fn ddl_log(&self) -> Vec<String> {
        self.state.lock().map(|s| s.ddl.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TargetEngine for MemoryEngine {
    fn name(&self) -> &str {
        "memory"
    }

    fn native_boolean(&self) -> bool {
        true
    }

    async fn create_schema(&self, schema: &str) -> Result<()> {
        let mut state = self.state()?;
        if state.schemas.insert(schema.to_string()) {
            state.ddl.push(format!("CREATE SCHEMA {}", schema));
        }
        Ok(())
    }

    async fn describe_table(&self, table: &TableName) -> Result<Option<Vec<ExistingColumn>>> {
        let state = self.state()?;
        Ok(state.tables.get(table).map(|t| t.columns.clone()))
    }

    async fn create_table(&self, table: &TableDescriptor) -> Result<()> {
        let context = format!("CREATE TABLE {}", table.name);
        let mut state = self.state()?;
        if let Some(schema) = &table.name.schema {
            if !state.schemas.contains(schema) {
                return Err(failure(context, format!("schema \"{}\" does not exist", schema)));
            }
        }
        if state.tables.contains_key(&table.name) {
            return Err(failure(context, "relation already exists"));
        }
        let mut seen = HashSet::new();
        for column in &table.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(failure(
                    context,
                    format!("column \"{}\" specified more than once", column.name),
                ));
            }
        }

        state.tables.insert(
            table.name.clone(),
            MemoryTable {
                columns: table
                    .columns
                    .iter()
                    .map(|c| ExistingColumn {
                        name: c.name.clone(),
                        sql_type: c.sql_type.clone(),
                    })
                    .collect(),
                primary_key: table.primary_key().iter().map(|k| k.to_string()).collect(),
                rows: Vec::new(),
            },
        );
        state.ddl.push(context);
        Ok(())
    }

    async fn add_column(&self, table: &TableName, column: &ColumnDescriptor) -> Result<()> {
        let context = format!("ALTER TABLE {} ADD COLUMN {}", table, column.name);
        let mut state = self.state()?;
        let target = table_mut(&mut state, table, &context)?;
        if target.position(&column.name).is_some() {
            return Err(failure(context, "column already exists"));
        }
        target.columns.push(ExistingColumn {
            name: column.name.clone(),
            sql_type: column.sql_type.clone(),
        });
        let null = SqlValue::null_for(&column.sql_type);
        for row in &mut target.rows {
            row.push(null.clone());
        }
        state.ddl.push(context);
        Ok(())
    }

    async fn alter_column_type(
        &self,
        table: &TableName,
        column: &str,
        ty: &SqlType,
    ) -> Result<()> {
        let context = format!("ALTER TABLE {} ALTER COLUMN {} TYPE {}", table, column, ty);
        let mut state = self.state()?;
        let target = table_mut(&mut state, table, &context)?;
        let pos = target
            .position(column)
            .ok_or_else(|| failure(context.clone(), "column does not exist"))?;
        target.columns[pos].sql_type = ty.clone();
        state.ddl.push(context);
        Ok(())
    }

    async fn create_staging_table(&self, staging: &TableName, target: &TableName) -> Result<()> {
        let context = format!("CREATE TABLE {} (LIKE {})", staging, target);
        let mut state = self.state()?;
        if state.tables.contains_key(staging) {
            return Err(failure(context, "relation already exists"));
        }
        let template = state
            .tables
            .get(target)
            .ok_or_else(|| failure(context.clone(), "relation does not exist"))?;
        let copy = MemoryTable {
            columns: template.columns.clone(),
            primary_key: template.primary_key.clone(),
            rows: Vec::new(),
        };
        state.tables.insert(staging.clone(), copy);
        debug!("{}", context);
        Ok(())
    }

    async fn drop_table(&self, table: &TableName) -> Result<()> {
        let mut state = self.state()?;
        if state.tables.remove(table).is_some() {
            debug!("DROP TABLE {}", table);
        }
        Ok(())
    }

    async fn insert_rows(
        &self,
        table: &TableName,
        columns: &[String],
        rows: Vec<Vec<SqlValue<'static>>>,
    ) -> Result<u64> {
        let context = format!("INSERT INTO {}", table);
        let mut state = self.state()?;
        let target = table_mut(&mut state, table, &context)?;

        // Validate everything before touching the table so a failed insert
        // leaves no partial rows behind.
        let key_pos = target.key_positions();
        let mut shaped: Vec<Vec<SqlValue<'static>>> = Vec::with_capacity(rows.len());
        for values in rows {
            let row = target.shape_row(table, columns, values)?;
            let same_key = |other: &Vec<SqlValue<'static>>| {
                !key_pos.is_empty() && key_pos.iter().all(|&i| other[i] == row[i])
            };
            if target.find_by_key(&key_pos, &row).is_some() || shaped.iter().any(same_key) {
                return Err(failure(context, "duplicate key value violates primary key"));
            }
            shaped.push(row);
        }

        let written = shaped.len() as u64;
        target.rows.extend(shaped);
        Ok(written)
    }

    async fn merge_upsert(
        &self,
        staging: &TableName,
        target: &TableName,
        columns: &[String],
        keys: &[String],
    ) -> Result<u64> {
        let context = format!("MERGE {} INTO {}", staging, target);
        let mut state = self.state()?;
        let source = state
            .tables
            .get(staging)
            .ok_or_else(|| failure(context.clone(), format!("relation {} does not exist", staging)))?
            .clone();
        let dest = table_mut(&mut state, target, &context)?;

        let mut key_pos = Vec::with_capacity(keys.len());
        for key in keys {
            let pos = dest
                .position(key)
                .ok_or_else(|| failure(context.clone(), format!("key column \"{}\" does not exist", key)))?;
            key_pos.push(pos);
        }
        let mut copy_pos = Vec::with_capacity(columns.len());
        for column in columns {
            let from = source.position(column);
            let to = dest.position(column);
            match (from, to) {
                (Some(from), Some(to)) => copy_pos.push((from, to)),
                _ => {
                    return Err(failure(
                        context,
                        format!("column \"{}\" does not exist", column),
                    ))
                }
            }
        }

        let mut merged = 0u64;
        for staged in &source.rows {
            let mut row: Vec<SqlValue<'static>> = dest
                .columns
                .iter()
                .map(|c| SqlValue::null_for(&c.sql_type))
                .collect();
            for &(from, to) in &copy_pos {
                row[to] = staged[from].clone();
            }
            // Match on the given keys, not the table's own primary key; a
            // NULL key matches nothing.
            let matches: Vec<usize> = dest
                .rows
                .iter()
                .enumerate()
                .filter(|(_, existing)| {
                    key_pos
                        .iter()
                        .all(|&i| !row[i].is_null() && existing[i] == row[i])
                })
                .map(|(pos, _)| pos)
                .collect();
            if matches.is_empty() {
                dest.rows.push(row);
            } else {
                for existing in matches {
                    for &(_, to) in &copy_pos {
                        dest.rows[existing][to] = row[to].clone();
                    }
                }
            }
            merged += 1;
        }

        debug!("Merged {} rows into {}", merged, target);
        Ok(merged)
    }

    async fn close(&self) {}
}

fn table_mut<'s>(
    state: &'s mut MemoryState,
    table: &TableName,
    context: &str,
) -> Result<&'s mut MemoryTable> {
    state
        .tables
        .get_mut(table)
        .ok_or_else(|| failure(context, format!("relation {} does not exist", table)))
}

fn check_fits(table: &TableName, column: &ExistingColumn, value: &SqlValue<'_>) -> Result<()> {
    if let (SqlType::Text { length: Some(max) }, SqlValue::Text(s)) = (&column.sql_type, value) {
        if s.chars().count() > *max as usize {
            return Err(failure(
                format!("INSERT INTO {}", table),
                format!(
                    "value too long for type {} in column \"{}\"",
                    column.sql_type, column.name
                ),
            ));
        }
    }
    Ok(())
}

fn failure(context: impl Into<String>, message: impl Into<String>) -> SinkError {
    SinkError::execution(context, std::io::Error::other(message.into()))
}
