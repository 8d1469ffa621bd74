//! `trendlake status` - derived pipeline state per partition.
//!
//! State is a pure function of artifact existence, so this command needs
//! nothing but the lake listing: no run database, no coordinator.

use anyhow::Result;
use clap::Args;
use std::collections::BTreeSet;

use trendlake_core::{PartitionKey, Profile, Stage};
use trendlake_flow::coordinator::run_state;

use crate::Context;

/// Arguments for the status command.
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Limit output to one profile.
    #[arg(long)]
    pub profile: Option<String>,
}

/// Executes the status command.
///
/// # Errors
///
/// Fails on lake access errors or an invalid profile filter.
pub async fn execute(args: &StatusArgs, context: &Context) -> Result<()> {
    let profile = args
        .profile
        .as_deref()
        .map(Profile::new)
        .transpose()?;

    // Every run has a metadata artifact first, so the metadata listing is
    // the complete set of known partitions; later stages refine the state.
    let mut keys: BTreeSet<PartitionKey> = BTreeSet::new();
    for stage in Stage::ALL {
        for artifact in context.store.list(stage, profile.as_ref()).await? {
            keys.insert(artifact.partition_key);
        }
    }

    if keys.is_empty() {
        println!("no partitions found");
        return Ok(());
    }

    for key in keys {
        let state = run_state(&context.store, &key).await?;
        let failures = count_failures(context, &key).await?;
        if failures == 0 {
            println!("{key}  {state}");
        } else {
            println!("{key}  {state}  ({failures} failed items)");
        }
    }
    Ok(())
}

async fn count_failures(context: &Context, key: &PartitionKey) -> Result<usize> {
    let mut total = 0;
    for stage in Stage::ALL {
        total += context.store.read_failures(stage, key).await?.len();
    }
    Ok(total)
}
