//! `trendlake drop-partitions` - remove catalog registrations.
//!
//! Catalog-only: artifacts are immutable and stay in the lake. A dropped
//! partition disappears from query results until it is backfilled again.

use anyhow::Result;
use clap::Args;

use trendlake_catalog::Catalog as _;
use trendlake_core::{ProcessedAt, Profile};

use crate::Context;

/// Arguments for the drop-partitions command.
#[derive(Debug, Args)]
pub struct DropPartitionsArgs {
    /// Table to drop partitions from.
    #[arg(long)]
    pub table: String,

    /// Limit the drop to one profile.
    #[arg(long)]
    pub profile: Option<String>,

    /// Limit the drop to one run timestamp (`YYYYMMDDTHHMMSSZ`).
    #[arg(long)]
    pub processed_at: Option<String>,
}

/// Executes the drop-partitions command.
///
/// # Errors
///
/// Fails on catalog access errors, an unknown table, or invalid filters.
pub async fn execute(args: &DropPartitionsArgs, context: &Context) -> Result<()> {
    let profile = args.profile.as_deref().map(Profile::new).transpose()?;
    let processed_at = args
        .processed_at
        .as_deref()
        .map(ProcessedAt::parse)
        .transpose()?;

    let entries = context.catalog.list_partitions(&args.table).await?;
    let mut dropped = 0_usize;

    for entry in entries {
        if let Some(ref profile) = profile {
            if entry.partition_key.profile() != profile {
                continue;
            }
        }
        if let Some(processed_at) = processed_at {
            if entry.partition_key.processed_at() != processed_at {
                continue;
            }
        }

        if context
            .catalog
            .drop_partition(&args.table, &entry.partition_key)
            .await?
        {
            println!("DROP  {}  {}", args.table, entry.partition_key);
            dropped += 1;
        }
    }

    println!("dropped {dropped} partitions from {}", args.table);
    Ok(())
}
