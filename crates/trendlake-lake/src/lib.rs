//! # trendlake-lake
//!
//! The artifact store: immutable, partitioned Parquet files over an object
//! storage backend.
//!
//! Every stage of the pipeline writes exactly one artifact per partition
//! key. Artifacts are write-once: a second write to the same `(stage,
//! partition)` fails with `ArtifactExists` unless overwrite is explicitly
//! requested, which makes duplicate stage triggers cheap no-ops and lets
//! the catalog treat every registration for a key as describing identical
//! data.
//!
//! Writes go through a staging path and are promoted to the canonical path
//! with a does-not-exist precondition, so a crashed or cancelled write can
//! never surface a partial artifact to discovery or the query engine.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod codec;
pub mod store;

pub use store::{Artifact, ArtifactStore, ItemFailure, StageRows, WriteOptions};
