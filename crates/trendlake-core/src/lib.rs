//! # trendlake-core
//!
//! Core abstractions for the Trendlake social-video data lake.
//!
//! This crate provides the foundational types used across all Trendlake
//! components:
//!
//! - **Identifiers**: Strongly-typed IDs for events and videos
//! - **Partitioning**: Hive-style partition keys shared by every stage
//! - **Domain Records**: Row types for the metadata, transcript, and
//!   text-analysis tables
//! - **Storage Backends**: Abstract object-storage interface with
//!   conditional-write support
//! - **Lake Paths**: Deterministic path derivation for artifacts
//!
//! ## Crate Boundary
//!
//! `trendlake-core` is the only crate allowed to define shared primitives.
//! The lake, catalog, and flow crates depend on it and never on each other's
//! internals.
//!
//! ## Example
//!
//! ```rust
//! use trendlake_core::prelude::*;
//!
//! let profile = Profile::new("alice").unwrap();
//! let key = PartitionKey::new(profile, ProcessedAt::now());
//! assert!(key.hive_segment().starts_with("profile=alice/processed_at="));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod event;
pub mod id;
pub mod observability;
pub mod partition;
pub mod paths;
pub mod records;
pub mod stage;
pub mod storage;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use trendlake_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::event::StageEvent;
    pub use crate::id::{EventId, VideoId};
    pub use crate::partition::{PartitionKey, ProcessedAt, Profile};
    pub use crate::paths::LakePaths;
    pub use crate::records::{AnalysisRecord, TranscriptRecord, VideoRecord};
    pub use crate::stage::Stage;
    pub use crate::storage::{
        MemoryBackend, ObjectMeta, ObjectStoreBackend, StorageBackend, WritePrecondition,
        WriteResult,
    };
}

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::StageEvent;
pub use id::{EventId, VideoId};
pub use observability::{init_logging, LogFormat};
pub use partition::{PartitionKey, ProcessedAt, Profile};
pub use paths::LakePaths;
pub use records::{AnalysisRecord, TranscriptRecord, VideoRecord};
pub use stage::Stage;
pub use storage::{
    MemoryBackend, ObjectMeta, ObjectStoreBackend, StorageBackend, WritePrecondition, WriteResult,
};
