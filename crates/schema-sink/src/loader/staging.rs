//! Scoped staging tables for keyed loads.

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::core::{TableName, TargetEngine};
use crate::error::Result;

/// Prefix of staging table names. Conformed identifiers never start with
/// `_`, so a staging table cannot shadow a user table.
pub const STAGING_PREFIX: &str = "_staging_";

/// Longest staging name every engine keeps intact: PostgreSQL truncates
/// identifiers at 63 bytes and MySQL rejects names over 64 characters.
pub const MAX_STAGING_NAME_BYTES: usize = 63;

const DIGEST_CHARS: usize = 8;

/// Staging table for one target, in the target's schema.
///
/// Names that would run past [`MAX_STAGING_NAME_BYTES`] keep a prefix of the
/// table name and end in a digest of the full name, so distinct tables still
/// get distinct staging tables.
pub fn staging_name(target: &TableName) -> TableName {
    let full = format!("{}{}", STAGING_PREFIX, target.name);
    if full.len() <= MAX_STAGING_NAME_BYTES {
        return target.sibling(full);
    }

    let digest = format!("{:x}", Sha256::digest(target.name.as_bytes()));
    let mut cut = MAX_STAGING_NAME_BYTES - STAGING_PREFIX.len() - 1 - DIGEST_CHARS;
    while !target.name.is_char_boundary(cut) {
        cut -= 1;
    }
    target.sibling(format!(
        "{}{}_{}",
        STAGING_PREFIX,
        &target.name[..cut],
        &digest[..DIGEST_CHARS]
    ))
}

/// A staging table that exists until [`StagingTable::release`] is called.
///
/// Async code cannot drop tables from `Drop`, so callers must route every
/// exit path through `release`, passing the result of the work done with the
/// table.
#[must_use = "a staging table must be released"]
pub struct StagingTable<'a> {
    engine: &'a dyn TargetEngine,
    name: TableName,
}

impl<'a> StagingTable<'a> {
    /// Drop any leftover staging table for `target` and create an empty one
    /// with the target's structure.
    pub async fn acquire(engine: &'a dyn TargetEngine, target: &TableName) -> Result<Self> {
        let name = staging_name(target);

        if let Err(e) = engine.drop_table(&name).await {
            debug!("Ignoring failure to drop stale staging table {}: {}", name, e);
        }

        if let Err(e) = engine.create_staging_table(&name, target).await {
            // Creation may have left a partial table behind.
            if let Err(drop_err) = engine.drop_table(&name).await {
                warn!("Failed to drop staging table {}: {}", name, drop_err);
            }
            return Err(e);
        }

        debug!("Created staging table {}", name);
        Ok(Self { engine, name })
    }

    pub fn name(&self) -> &TableName {
        &self.name
    }

    /// Drop the staging table and pass `outcome` through.
    ///
    /// If `outcome` is an error it wins over any drop failure, which is only
    /// logged. After a successful load a drop failure is returned.
    pub async fn release<T>(self, outcome: Result<T>) -> Result<T> {
        let dropped = self.engine.drop_table(&self.name).await;

        match (outcome, dropped) {
            (Ok(value), Ok(())) => {
                debug!("Dropped staging table {}", self.name);
                Ok(value)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(drop_err)) => {
                warn!(
                    "Failed to drop staging table {} after error: {}",
                    self.name, drop_err
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_name_keeps_schema() {
        let target = TableName::new(Some("sales".into()), "orders");
        let staging = staging_name(&target);
        assert_eq!(staging.schema.as_deref(), Some("sales"));
        assert_eq!(staging.name, "_staging_orders");
    }

    #[test]
    fn test_long_staging_names_fit_and_stay_distinct() {
        let base = "a".repeat(100);
        let first = staging_name(&TableName::new(None, format!("{}_first", base)));
        let second = staging_name(&TableName::new(None, format!("{}_second", base)));

        assert!(first.name.len() <= MAX_STAGING_NAME_BYTES);
        assert!(second.name.len() <= MAX_STAGING_NAME_BYTES);
        assert!(first.name.starts_with(STAGING_PREFIX));
        assert_ne!(first.name, second.name);

        // Same table, same name.
        assert_eq!(
            first,
            staging_name(&TableName::new(None, format!("{}_first", base)))
        );
    }

    #[test]
    fn test_long_staging_name_cuts_on_char_boundary() {
        let staging = staging_name(&TableName::new(None, "é".repeat(60)));
        assert!(staging.name.len() <= MAX_STAGING_NAME_BYTES);
        assert!(staging.name.starts_with("_staging_é"));
    }
}
