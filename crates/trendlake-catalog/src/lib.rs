//! # trendlake-catalog
//!
//! The catalog interface and the partition registrar.
//!
//! The catalog itself is an external transactional metadata service (Glue,
//! Hive metastore, or similar) accessed through a narrow idempotent-add
//! interface; this crate defines that interface, the built-in table
//! definitions for the two queryable tables, and the registrar that
//! consumes artifact-written events and makes new partitions queryable
//! without manual intervention or periodic discovery scans.
//!
//! ## Guarantees
//!
//! - **Idempotent registration**: any number of duplicate deliveries for
//!   the same partition key produce exactly one catalog entry
//! - **First registration wins**: artifacts are write-once, so every
//!   registration for a key describes identical data; a conflicting add is
//!   treated as success
//! - **Partition isolation**: a failing partition never blocks registration
//!   of other partitions

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod error;
pub mod metrics;
pub mod registrar;
pub mod storage_catalog;
pub mod tables;

pub use catalog::{AddOutcome, Catalog, MemoryCatalog, PartitionEntry};
pub use error::{CatalogError, Result};
pub use registrar::PartitionRegistrar;
pub use storage_catalog::StorageCatalog;
pub use tables::{ColumnDef, TableDef};
