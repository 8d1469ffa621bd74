//! Typed path helpers for lake artifacts.
//!
//! All object keys in the lake are derived here so the layout stays
//! consistent between writers, the registrar, discovery, and the query
//! engine's external table locations:
//!
//! ```text
//! <root>/<stage-folder>/profile=<p>/processed_at=<t>/<artifact-file>
//! <root>/_staging/<stage-folder>/profile=<p>/processed_at=<t>/<token>.parquet
//! <root>/_failures/<stage-folder>/profile=<p>/processed_at=<t>/failures.jsonl
//! ```
//!
//! Underscore-prefixed folders are control-plane side channels; discovery
//! skips them, so half-written staging output is never visible as data.

use crate::error::{Error, Result};
use crate::partition::PartitionKey;
use crate::stage::Stage;

/// Staging prefix for in-flight writes.
const STAGING_FOLDER: &str = "_staging";

/// Sidecar prefix for per-item failure records.
const FAILURES_FOLDER: &str = "_failures";

/// Deterministic path derivation rooted at one lake prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LakePaths {
    root: String,
}

impl LakePaths {
    /// Default lake root.
    pub const DEFAULT_ROOT: &'static str = "videos";

    /// Creates path derivation under the given root prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the root is empty after trimming
    /// slashes.
    pub fn new(root: impl AsRef<str>) -> Result<Self> {
        let root = root.as_ref().trim_matches('/').to_string();
        if root.is_empty() {
            return Err(Error::InvalidInput("lake root must not be empty".into()));
        }
        Ok(Self { root })
    }

    /// Returns the lake root prefix.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Returns the prefix holding all partitions of one stage.
    #[must_use]
    pub fn stage_prefix(&self, stage: Stage) -> String {
        format!("{}/{}/", self.root, stage.folder())
    }

    /// Returns the prefix holding one profile's partitions for one stage.
    #[must_use]
    pub fn profile_prefix(&self, stage: Stage, profile: &crate::partition::Profile) -> String {
        format!("{}/{}/profile={profile}/", self.root, stage.folder())
    }

    /// Returns the canonical partition directory for a stage.
    #[must_use]
    pub fn partition_dir(&self, stage: Stage, key: &PartitionKey) -> String {
        format!("{}/{}/{}", self.root, stage.folder(), key.hive_segment())
    }

    /// Returns the canonical artifact path for a stage and partition key.
    #[must_use]
    pub fn artifact_file(&self, stage: Stage, key: &PartitionKey) -> String {
        format!(
            "{}/{}",
            self.partition_dir(stage, key),
            stage.artifact_file_name()
        )
    }

    /// Returns a staging path for an in-flight write identified by `token`.
    #[must_use]
    pub fn staging_file(&self, stage: Stage, key: &PartitionKey, token: &str) -> String {
        format!(
            "{}/{STAGING_FOLDER}/{}/{}/{token}.parquet",
            self.root,
            stage.folder(),
            key.hive_segment()
        )
    }

    /// Returns the failure-sidecar path for a stage and partition key.
    #[must_use]
    pub fn failures_file(&self, stage: Stage, key: &PartitionKey) -> String {
        format!(
            "{}/{FAILURES_FOLDER}/{}/{}/failures.jsonl",
            self.root,
            stage.folder(),
            key.hive_segment()
        )
    }

    /// Parses a canonical artifact path back into its stage and key.
    ///
    /// Returns `None` for anything outside the canonical layout: foreign
    /// roots, control-plane folders (`_staging`, `_failures`), unexpected
    /// file names, or malformed partition segments. Discovery relies on this
    /// to ignore everything that is not a committed artifact.
    #[must_use]
    pub fn parse_artifact_path(&self, path: &str) -> Option<(Stage, PartitionKey)> {
        let rest = path.strip_prefix(&self.root)?.strip_prefix('/')?;
        let (folder, rest) = rest.split_once('/')?;
        let stage = Stage::from_folder(folder)?;
        let (segment, file) = rest.rsplit_once('/')?;
        if file != stage.artifact_file_name() {
            return None;
        }
        let key = PartitionKey::parse_segment(segment).ok()?;
        Some((stage, key))
    }
}

impl Default for LakePaths {
    fn default() -> Self {
        Self {
            root: Self::DEFAULT_ROOT.to_string(),
        }
    }
}
