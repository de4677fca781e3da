//! # schema-sink
//!
//! Loading engine for schema-driven database sinks.
//!
//! Typed batches of JSON records arrive with a declared property schema and
//! an optional primary key. The engine:
//!
//! - **Conforms names** of streams and properties into safe SQL identifiers
//! - **Maps and merges types** from declared property types to column types
//! - **Evolves tables** by creating them, adding columns and widening types,
//!   as far as configuration permits
//! - **Loads rows** by appending, or by merge-upsert through a staging table
//!   when the batch is keyed
//!
//! Targets: PostgreSQL, MySQL/MariaDB, and an in-process memory engine.
//!
//! ## Example
//!
//! ```rust,no_run
//! use schema_sink::{drivers, BatchLoader, Config, JsonBatchSource, Sink};
//!
//! #[tokio::main]
//! async fn main() -> schema_sink::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let engine = drivers::connect(&config.target).await?;
//!     let sink = Sink::new(BatchLoader::new(engine, config.load));
//!     let mut source = JsonBatchSource::from_path("batches.json")?;
//!     let summary = sink.run(&mut source).await?;
//!     println!("Loaded {} rows", summary.rows);
//!     sink.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod evolution;
pub mod loader;
pub mod source;
pub mod typemap;

// Re-exports for convenient access
pub use config::{Config, LoadConfig, TargetConfig};
pub use core::{
    Batch, BatchSource, Dialect, FieldKind, FieldType, IdentifierConformer, Record, Records,
    Schema, SqlType, SqlValue, TableDescriptor, TableName, TargetEngine,
};
pub use error::{Result, SinkError};
pub use evolution::{plan_evolution, EvolutionPlan, EvolutionPolicy, TableEvolutionManager};
pub use loader::{BatchLoader, LoadOutcome, RowCount, Sink, SinkSummary};
pub use source::JsonBatchSource;
pub use typemap::{merge_types, SchemaTypeMapper, TypeMapOptions};
