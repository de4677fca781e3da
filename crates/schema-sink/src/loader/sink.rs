//! Drives batches from a source through the loader.

use std::collections::BTreeSet;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::core::BatchSource;
use crate::error::{Result, SinkError};

use super::{BatchLoader, RowCount};

/// Totals of one sink run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SinkSummary {
    pub batches: usize,
    /// Rows of batches whose count is known.
    pub rows: u64,
    /// Batches that were streamed and reported no count.
    pub uncounted_batches: usize,
    /// Qualified names of the tables written.
    pub tables: BTreeSet<String>,
}

/// Loads every batch of a source, one at a time.
pub struct Sink {
    loader: BatchLoader,
}

impl Sink {
    pub fn new(loader: BatchLoader) -> Self {
        Self { loader }
    }

    pub fn loader(&self) -> &BatchLoader {
        &self.loader
    }

    /// Run until the source is exhausted or a batch fails.
    ///
    /// The first failure stops the run; batches before it stay committed.
    pub async fn run<S>(&self, source: &mut S) -> Result<SinkSummary>
    where
        S: BatchSource + ?Sized,
    {
        let started = Instant::now();
        let mut summary = SinkSummary::default();

        while let Some(batch) = source.next_batch().await.map_err(upstream)? {
            let outcome = self.loader.load(batch).await?;
            summary.batches += 1;
            match outcome.rows {
                RowCount::Exact(n) => summary.rows += n,
                RowCount::Unknown => summary.uncounted_batches += 1,
            }
            summary.tables.insert(outcome.table.to_string());
        }

        info!(
            "Loaded {} batches ({} rows) into {} tables in {:.2}s",
            summary.batches,
            summary.rows,
            summary.tables.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(summary)
    }

    pub async fn close(&self) {
        self.loader.engine().close().await;
    }
}

/// Source errors surface as upstream errors.
fn upstream(err: SinkError) -> SinkError {
    match err {
        SinkError::Upstream(_) => err,
        other => SinkError::Upstream(other.to_string()),
    }
}
