//! Core abstractions for engine-agnostic loading.
//!
//! - [`identifier`]: name conformance, validation and quoting
//! - [`schema`]: batches, declared field types, table metadata
//! - [`sql_type`]: concrete column types
//! - [`value`]: SQL values and conversion from JSON records
//! - [`traits`]: dialect, engine and batch source traits
//!
//! Driver modules (`drivers/postgres`, `drivers/mysql`, `drivers/memory`)
//! implement the traits; the loader above depends only on them.

pub mod identifier;
pub mod schema;
pub mod sql_type;
pub mod traits;
pub mod value;

pub use identifier::IdentifierConformer;
pub use schema::{
    Batch, ColumnDescriptor, ExistingColumn, FieldKind, FieldType, Record, Records, Schema,
    TableDescriptor, TableName,
};
pub use sql_type::{SqlType, TypeFamily};
pub use traits::{BatchSource, Dialect, TargetEngine};
pub use value::{SqlNullType, SqlValue};
