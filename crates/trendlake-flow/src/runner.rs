//! The stage-runner contract.
//!
//! A stage runner executes one processing stage against one partition key.
//! The contract has one load-bearing rule: **check the artifact store
//! before doing expensive work**. That check is the idempotency boundary
//! that makes duplicate triggers safe and cheap: a redelivered event finds
//! the artifact already present and short-circuits without touching the
//! network, the GPU, or the judgment model.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use trendlake_core::records::{TranscriptRecord, VideoRecord};
use trendlake_core::{PartitionKey, Stage};
use trendlake_lake::Artifact;

use crate::error::{Error, Result};

/// Input handed to a stage runner by the coordinator.
///
/// The variant carries exactly what the stage needs, extracted from the
/// upstream artifact named in the triggering event.
#[derive(Debug, Clone)]
pub enum StageInput {
    /// Metadata extraction needs nothing beyond the partition key.
    Metadata,
    /// Transcription needs the video list from the metadata artifact.
    Transcripts {
        /// Videos found by metadata extraction. May be empty.
        videos: Vec<VideoRecord>,
    },
    /// Text analysis needs transcripts joined with their metadata.
    Analysis {
        /// Rows from the transcript artifact.
        transcripts: Vec<TranscriptRecord>,
        /// Rows from the sibling metadata artifact, for the join.
        videos: Vec<VideoRecord>,
    },
}

impl StageInput {
    /// Returns the stage this input belongs to.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Metadata => Stage::Metadata,
            Self::Transcripts { .. } => Stage::Transcripts,
            Self::Analysis { .. } => Stage::TextAnalysis,
        }
    }
}

/// Result of a stage invocation.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    /// The stage ran and wrote a new artifact.
    Wrote(Artifact),
    /// An artifact already existed; the invocation was a no-op.
    AlreadyExists(Artifact),
}

impl StageOutcome {
    /// Returns the artifact, whether freshly written or pre-existing.
    #[must_use]
    pub const fn artifact(&self) -> &Artifact {
        match self {
            Self::Wrote(artifact) | Self::AlreadyExists(artifact) => artifact,
        }
    }

    /// Returns true if the invocation short-circuited.
    #[must_use]
    pub const fn was_noop(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

/// Executes one stage over one partition.
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// The stage this runner implements.
    fn stage(&self) -> Stage;

    /// Runs the stage for a partition key.
    ///
    /// Implementations must short-circuit on an existing artifact, isolate
    /// per-item failures, and honor `cancel` between items. A cancelled
    /// invocation never writes to the canonical path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InputMismatch`] for input of the wrong stage,
    /// [`Error::Cancelled`] if cancellation was requested, and retryable
    /// errors for transient whole-partition failures.
    async fn run(
        &self,
        key: &PartitionKey,
        input: StageInput,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome>;
}

/// Fails with [`Error::InputMismatch`] if `input` is for another stage.
pub(crate) fn ensure_input_stage(stage: Stage, input: &StageInput) -> Result<()> {
    if input.stage() == stage {
        Ok(())
    } else {
        Err(Error::InputMismatch {
            stage,
            got: input.stage(),
        })
    }
}

/// Fails with [`Error::Cancelled`] if cancellation was requested.
pub(crate) fn ensure_not_cancelled(
    stage: Stage,
    key: &PartitionKey,
    cancel: &CancellationToken,
) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled {
            stage,
            partition: key.hive_segment(),
        })
    } else {
        Ok(())
    }
}

/// Applies a per-call timeout to a black-box suspension point.
pub(crate) async fn with_timeout<T, F>(operation: &str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            seconds: limit.as_secs(),
        }),
    }
}
