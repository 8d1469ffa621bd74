//! `trendlake backfill` - register discovered partitions with the catalog.
//!
//! The manual-recovery path for partitions whose registration events were
//! lost (or for a freshly attached catalog). Idempotent by construction:
//! already-registered partitions are skipped, so re-running is always safe.

use anyhow::Result;
use clap::Args;

use trendlake_catalog::{AddOutcome, Catalog as _};
use trendlake_core::Stage;

use crate::Context;

/// Arguments for the backfill command.
#[derive(Debug, Args)]
pub struct BackfillArgs {
    /// Limit the backfill to one table.
    #[arg(long)]
    pub table: Option<String>,
}

/// Executes the backfill command.
///
/// # Errors
///
/// Fails on lake or catalog access errors, or an unknown table filter.
pub async fn execute(args: &BackfillArgs, context: &Context) -> Result<()> {
    let mut added = 0_usize;
    let mut skipped = 0_usize;

    for stage in Stage::ALL {
        let Some(table) = stage.table() else {
            continue;
        };
        if args.table.as_deref().is_some_and(|t| t != table) {
            continue;
        }

        for artifact in context.store.list(stage, None).await? {
            let outcome = context
                .catalog
                .add_partition(table, &artifact.partition_key, &artifact.location)
                .await?;
            match outcome {
                AddOutcome::Added => {
                    println!("ADD  {table}  {}", artifact.partition_key);
                    added += 1;
                }
                AddOutcome::AlreadyExists { .. } => skipped += 1,
            }
        }
    }

    println!("backfill complete: {added} added, {skipped} already registered");
    Ok(())
}
