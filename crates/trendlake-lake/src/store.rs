//! The write-once artifact store.
//!
//! All lake writes go through [`ArtifactStore`]. The store owns two
//! invariants:
//!
//! 1. **Write-once**: the canonical path for a `(stage, partition)` is
//!    written at most once. Promotion uses a does-not-exist precondition,
//!    so concurrent duplicate writers race safely and the loser gets
//!    [`Error::ArtifactExists`] with the winner's artifact untouched.
//! 2. **No partial artifacts**: payloads land under `_staging/` first and
//!    are promoted in a single conditional put. A crash or cancellation
//!    between the two leaves only staging garbage, which discovery ignores.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use ulid::Ulid;

use trendlake_core::error::{Error, Result};
use trendlake_core::records::{AnalysisRecord, TranscriptRecord, VideoRecord};
use trendlake_core::storage::{StorageBackend, WritePrecondition, WriteResult};
use trendlake_core::{LakePaths, PartitionKey, Profile, Stage, VideoId};

use crate::codec;

/// One written output file for one stage and partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Producing stage.
    pub stage: Stage,
    /// Partition key shared by the whole run.
    pub partition_key: PartitionKey,
    /// Canonical path under the lake root.
    pub location: String,
    /// Row count, when known.
    ///
    /// `None` for artifacts discovered via listing, where reading every
    /// footer would defeat the point of a listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<u64>,
    /// When the artifact was written.
    pub written_at: DateTime<Utc>,
    /// SHA-256 of the Parquet payload, when written by this process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl Artifact {
    /// Builds the stage event announcing this artifact.
    ///
    /// One write emits exactly one event; re-publishing the same artifact
    /// produces a new `event_id` but the same natural key.
    #[must_use]
    pub fn to_event(&self) -> trendlake_core::StageEvent {
        trendlake_core::StageEvent::new(
            self.stage,
            self.partition_key.clone(),
            self.location.clone(),
            self.record_count.unwrap_or(0),
        )
    }
}

/// Typed rows for one artifact write.
///
/// The variant determines the target stage, so a caller can never write
/// transcript rows into the metadata folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageRows {
    /// Metadata rows.
    Metadata(Vec<VideoRecord>),
    /// Transcript rows.
    Transcripts(Vec<TranscriptRecord>),
    /// Text-analysis rows.
    Analysis(Vec<AnalysisRecord>),
}

impl StageRows {
    /// Returns the stage these rows belong to.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Metadata(_) => Stage::Metadata,
            Self::Transcripts(_) => Stage::Transcripts,
            Self::Analysis(_) => Stage::TextAnalysis,
        }
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Metadata(rows) => rows.len(),
            Self::Transcripts(rows) => rows.len(),
            Self::Analysis(rows) => rows.len(),
        }
    }

    /// Returns true if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn encode(&self) -> Result<Bytes> {
        match self {
            Self::Metadata(rows) => codec::encode_metadata(rows),
            Self::Transcripts(rows) => codec::encode_transcripts(rows),
            Self::Analysis(rows) => codec::encode_analysis(rows),
        }
    }
}

/// Options for artifact writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Replace an existing artifact instead of failing with
    /// `ArtifactExists`. Operator-only; the pipeline never overwrites.
    pub overwrite: bool,
}

impl WriteOptions {
    /// Creates default options (write-once enforced).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables overwrite.
    #[must_use]
    pub const fn with_overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }
}

/// A per-item failure recorded beside an artifact.
///
/// Item failures never block sibling items; they are written to the
/// `_failures/` sidecar so operators can retry the failed items later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    /// The video the failure applies to.
    pub video_id: VideoId,
    /// Stage where the item failed.
    pub stage: Stage,
    /// Error description.
    pub error: String,
    /// How many attempts were made before giving up.
    pub attempts: u32,
    /// When the item was given up on.
    pub failed_at: DateTime<Utc>,
}

/// Write-once partitioned artifact store over a storage backend.
#[derive(Clone)]
pub struct ArtifactStore {
    backend: Arc<dyn StorageBackend>,
    paths: LakePaths,
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

impl ArtifactStore {
    /// Creates a store over the given backend and path layout.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, paths: LakePaths) -> Self {
        Self { backend, paths }
    }

    /// Returns the path layout used by this store.
    #[must_use]
    pub const fn paths(&self) -> &LakePaths {
        &self.paths
    }

    /// Writes an artifact for a partition key.
    ///
    /// The payload is staged first and promoted with a does-not-exist
    /// precondition, so the canonical path flips from absent to complete in
    /// one step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArtifactExists`] if the partition already has an
    /// artifact and `options.overwrite` is false; the existing artifact is
    /// unchanged. Storage failures surface as retryable [`Error::Storage`].
    #[tracing::instrument(skip(self, rows), fields(stage = %rows.stage(), partition = %key, rows = rows.len()))]
    pub async fn write(
        &self,
        key: &PartitionKey,
        rows: &StageRows,
        options: WriteOptions,
    ) -> Result<Artifact> {
        let stage = rows.stage();
        let canonical = self.paths.artifact_file(stage, key);

        // Cheap pre-check; the promotion precondition still guards the race.
        if !options.overwrite && self.backend.head(&canonical).await?.is_some() {
            return Err(Error::ArtifactExists { path: canonical });
        }

        let payload = rows.encode()?;
        let content_hash = hex_digest(&payload);
        let record_count = rows.len() as u64;

        let staging = self
            .paths
            .staging_file(stage, key, &Ulid::new().to_string());
        self.backend
            .put(&staging, payload.clone(), WritePrecondition::None)
            .await?;

        let precondition = if options.overwrite {
            WritePrecondition::None
        } else {
            WritePrecondition::DoesNotExist
        };
        let promoted = self.backend.put(&canonical, payload, precondition).await;

        // Staging is scratch either way; leftover cleanup failures are
        // logged, not surfaced.
        if let Err(e) = self.backend.delete(&staging).await {
            tracing::warn!(path = %staging, error = %e, "failed to clean staging object");
        }

        match promoted? {
            WriteResult::Success => {
                tracing::info!(path = %canonical, rows = record_count, "artifact written");
                Ok(Artifact {
                    stage,
                    partition_key: key.clone(),
                    location: canonical,
                    record_count: Some(record_count),
                    written_at: Utc::now(),
                    content_hash: Some(content_hash),
                })
            }
            WriteResult::PreconditionFailed => Err(Error::ArtifactExists { path: canonical }),
        }
    }

    /// Returns true if an artifact exists for the stage and key.
    ///
    /// This is the idempotency check stage runners make before doing any
    /// expensive work.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failure.
    pub async fn exists(&self, stage: Stage, key: &PartitionKey) -> Result<bool> {
        let canonical = self.paths.artifact_file(stage, key);
        Ok(self.backend.head(&canonical).await?.is_some())
    }

    /// Returns the artifact reference for a stage and key, if present.
    ///
    /// Metadata only (`record_count` is `None`); use [`Self::read`] for rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failure.
    pub async fn get(&self, stage: Stage, key: &PartitionKey) -> Result<Option<Artifact>> {
        let canonical = self.paths.artifact_file(stage, key);
        Ok(self.backend.head(&canonical).await?.map(|meta| Artifact {
            stage,
            partition_key: key.clone(),
            location: canonical,
            record_count: None,
            written_at: meta.last_modified.unwrap_or_else(Utc::now),
            content_hash: None,
        }))
    }

    /// Reads and decodes the artifact rows for a stage and key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no artifact exists,
    /// [`Error::Serialization`] if the payload does not match the stage
    /// schema.
    pub async fn read(&self, stage: Stage, key: &PartitionKey) -> Result<StageRows> {
        let canonical = self.paths.artifact_file(stage, key);
        let bytes = self.backend.get(&canonical).await?;
        Ok(match stage {
            Stage::Metadata => StageRows::Metadata(codec::decode_metadata(bytes)?),
            Stage::Transcripts => StageRows::Transcripts(codec::decode_transcripts(bytes)?),
            Stage::TextAnalysis => StageRows::Analysis(codec::decode_analysis(bytes)?),
        })
    }

    /// Lists committed artifacts for a stage, optionally narrowed to one
    /// profile.
    ///
    /// Deterministic: results are sorted by location. Staging and failure
    /// sidecars are never returned. Restartable: pure function of the
    /// current listing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failure.
    pub async fn list(&self, stage: Stage, profile: Option<&Profile>) -> Result<Vec<Artifact>> {
        let prefix = match profile {
            Some(profile) => self.paths.profile_prefix(stage, profile),
            None => self.paths.stage_prefix(stage),
        };

        let mut artifacts: Vec<Artifact> = self
            .backend
            .list(&prefix)
            .await?
            .into_iter()
            .filter_map(|meta| {
                let (parsed_stage, key) = self.paths.parse_artifact_path(&meta.path)?;
                (parsed_stage == stage).then(|| Artifact {
                    stage,
                    partition_key: key,
                    location: meta.path,
                    record_count: None,
                    written_at: meta.last_modified.unwrap_or_else(Utc::now),
                    content_hash: None,
                })
            })
            .collect();
        artifacts.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(artifacts)
    }

    /// Records per-item failures for a stage and key.
    ///
    /// Overwrites any previous sidecar for the same partition: the sidecar
    /// reflects the most recent attempt, and the canonical artifact it sits
    /// beside is write-once anyway.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failure.
    pub async fn record_failures(
        &self,
        stage: Stage,
        key: &PartitionKey,
        failures: &[ItemFailure],
    ) -> Result<()> {
        if failures.is_empty() {
            return Ok(());
        }
        let path = self.paths.failures_file(stage, key);
        let mut lines = String::new();
        for failure in failures {
            let line = serde_json::to_string(failure)
                .map_err(|e| Error::serialization(format!("failed to encode failure: {e}")))?;
            lines.push_str(&line);
            lines.push('\n');
        }
        self.backend
            .put(&path, Bytes::from(lines), WritePrecondition::None)
            .await?;
        tracing::warn!(path = %path, count = failures.len(), "recorded item failures");
        Ok(())
    }

    /// Reads the failure sidecar for a stage and key.
    ///
    /// Returns an empty vec if no sidecar exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failure,
    /// [`Error::Serialization`] on a corrupt sidecar.
    pub async fn read_failures(&self, stage: Stage, key: &PartitionKey) -> Result<Vec<ItemFailure>> {
        let path = self.paths.failures_file(stage, key);
        let bytes = match self.backend.get(&path).await {
            Ok(bytes) => bytes,
            Err(Error::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let text = std::str::from_utf8(&bytes)
            .map_err(|e| Error::serialization(format!("failure sidecar is not utf8: {e}")))?;
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| Error::serialization(format!("failed to decode failure: {e}")))
            })
            .collect()
    }
}

fn hex_digest(payload: &Bytes) -> String {
    hex::encode(Sha256::digest(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use trendlake_core::{MemoryBackend, ProcessedAt};

    fn store() -> ArtifactStore {
        ArtifactStore::new(Arc::new(MemoryBackend::new()), LakePaths::default())
    }

    fn key(profile: &str) -> PartitionKey {
        PartitionKey::new(
            Profile::new(profile).unwrap(),
            ProcessedAt::parse("20250209T110228Z").unwrap(),
        )
    }

    fn transcript_rows() -> StageRows {
        StageRows::Transcripts(vec![TranscriptRecord {
            id: VideoId::new("v1").unwrap(),
            title: Some("t".into()),
            description: None,
            transcript: Some("hello".into()),
        }])
    }

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let store = store();
        let key = key("alice");
        let rows = transcript_rows();

        let artifact = store
            .write(&key, &rows, WriteOptions::new())
            .await
            .expect("write should succeed");
        assert_eq!(artifact.record_count, Some(1));
        assert_eq!(
            artifact.location,
            "videos/transcripts/profile=alice/processed_at=20250209T110228Z/transcripts.parquet"
        );
        assert!(artifact.content_hash.is_some());

        let read = store.read(Stage::Transcripts, &key).await.expect("read");
        assert_eq!(read, rows);
    }

    #[tokio::test]
    async fn second_write_fails_and_leaves_original() {
        let store = store();
        let key = key("alice");

        store
            .write(&key, &transcript_rows(), WriteOptions::new())
            .await
            .expect("first write");

        let other = StageRows::Transcripts(vec![TranscriptRecord {
            id: VideoId::new("v2").unwrap(),
            title: None,
            description: None,
            transcript: None,
        }]);
        let err = store
            .write(&key, &other, WriteOptions::new())
            .await
            .expect_err("second write must fail");
        assert!(matches!(err, Error::ArtifactExists { .. }));

        // Original rows unchanged.
        let read = store.read(Stage::Transcripts, &key).await.unwrap();
        assert_eq!(read, transcript_rows());
    }

    #[tokio::test]
    async fn overwrite_is_explicit() {
        let store = store();
        let key = key("alice");

        store
            .write(&key, &transcript_rows(), WriteOptions::new())
            .await
            .unwrap();

        let replacement = StageRows::Transcripts(vec![]);
        let artifact = store
            .write(&key, &replacement, WriteOptions::new().with_overwrite())
            .await
            .expect("overwrite should succeed");
        assert_eq!(artifact.record_count, Some(0));
    }

    #[tokio::test]
    async fn exists_matches_write_state() {
        let store = store();
        let key = key("alice");

        assert!(!store.exists(Stage::Transcripts, &key).await.unwrap());
        store
            .write(&key, &transcript_rows(), WriteOptions::new())
            .await
            .unwrap();
        assert!(store.exists(Stage::Transcripts, &key).await.unwrap());
        // Other stages unaffected.
        assert!(!store.exists(Stage::Metadata, &key).await.unwrap());
    }

    #[tokio::test]
    async fn list_is_sorted_and_skips_sidecars() {
        let store = store();

        for profile in ["zoe", "alice", "mia"] {
            store
                .write(&key(profile), &transcript_rows(), WriteOptions::new())
                .await
                .unwrap();
        }
        store
            .record_failures(
                Stage::Transcripts,
                &key("alice"),
                &[ItemFailure {
                    video_id: VideoId::new("v9").unwrap(),
                    stage: Stage::Transcripts,
                    error: "timeout".into(),
                    attempts: 3,
                    failed_at: Utc::now(),
                }],
            )
            .await
            .unwrap();

        let artifacts = store.list(Stage::Transcripts, None).await.unwrap();
        let profiles: Vec<&str> = artifacts
            .iter()
            .map(|a| a.partition_key.profile().as_str())
            .collect();
        assert_eq!(profiles, vec!["alice", "mia", "zoe"]);

        let only_mia = store
            .list(Stage::Transcripts, Some(&Profile::new("mia").unwrap()))
            .await
            .unwrap();
        assert_eq!(only_mia.len(), 1);
    }

    #[tokio::test]
    async fn failure_sidecar_roundtrip() {
        let store = store();
        let key = key("alice");
        let failures = vec![
            ItemFailure {
                video_id: VideoId::new("v1").unwrap(),
                stage: Stage::Transcripts,
                error: "download timed out".into(),
                attempts: 3,
                failed_at: Utc::now(),
            },
            ItemFailure {
                video_id: VideoId::new("v2").unwrap(),
                stage: Stage::Transcripts,
                error: "no audio stream".into(),
                attempts: 1,
                failed_at: Utc::now(),
            },
        ];

        store
            .record_failures(Stage::Transcripts, &key, &failures)
            .await
            .unwrap();
        let read = store.read_failures(Stage::Transcripts, &key).await.unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].video_id.as_str(), "v1");

        // No sidecar -> empty, not an error.
        let none = store
            .read_failures(Stage::Metadata, &key)
            .await
            .expect("missing sidecar is fine");
        assert!(none.is_empty());
    }
}
