//! # trendlake-cli
//!
//! Operator command-line interface for the Trendlake data lake.
//!
//! ## Commands
//!
//! - `trendlake status` - Derive per-partition pipeline state from the lake
//! - `trendlake backfill` - Register every discovered partition with the
//!   catalog (the manual-recovery equivalent of the event-driven registrar)
//! - `trendlake drop-partitions` - Remove catalog registrations (artifacts
//!   stay immutable in the lake)
//!
//! ## Configuration
//!
//! Commands operate on a local lake directory; the catalog is persisted
//! beside it under `_catalog/`. Cloud deployments point the same commands
//! at their object store via `TRENDLAKE_DATA_DIR`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use object_store::local::LocalFileSystem;

use trendlake_catalog::StorageCatalog;
use trendlake_core::{LakePaths, ObjectStoreBackend, StorageBackend};
use trendlake_lake::ArtifactStore;

/// Trendlake CLI - data lake operator tooling.
#[derive(Debug, Parser)]
#[command(name = "trendlake")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Lake data directory.
    #[arg(long, env = "TRENDLAKE_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Prefix under the data directory holding artifacts.
    #[arg(long, env = "TRENDLAKE_LAKE_ROOT", default_value = "videos")]
    pub lake_root: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show derived pipeline state per partition.
    Status(commands::status::StatusArgs),
    /// Register all discovered partitions with the catalog.
    Backfill(commands::backfill::BackfillArgs),
    /// Remove partition registrations from the catalog.
    DropPartitions(commands::drop_partitions::DropPartitionsArgs),
}

/// Shared handles for command execution.
pub struct Context {
    /// The artifact store over the lake directory.
    pub store: ArtifactStore,
    /// The catalog persisted beside the lake.
    pub catalog: StorageCatalog,
}

impl Cli {
    /// Opens the store and catalog this invocation operates on.
    ///
    /// # Errors
    ///
    /// Fails if the data directory cannot be opened or the lake root is
    /// invalid.
    pub fn context(&self) -> anyhow::Result<Context> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("creating data directory {}", self.data_dir.display()))?;
        let local = LocalFileSystem::new_with_prefix(&self.data_dir)
            .with_context(|| format!("opening data directory {}", self.data_dir.display()))?;
        let backend: Arc<dyn StorageBackend> = Arc::new(ObjectStoreBackend::new(Arc::new(local)));

        let paths = LakePaths::new(&self.lake_root)
            .with_context(|| format!("invalid lake root '{}'", self.lake_root))?;

        Ok(Context {
            store: ArtifactStore::new(Arc::clone(&backend), paths),
            catalog: StorageCatalog::new(backend),
        })
    }
}
