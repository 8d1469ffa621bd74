//! Metadata extraction stage.
//!
//! Fetches the full video listing for a profile and writes it as the
//! partition's metadata artifact. Zero videos is not an error: the empty
//! artifact is written anyway so the pipeline can complete vacuously.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use trendlake_core::observability::stage_span;
use trendlake_core::{PartitionKey, Stage};
use trendlake_lake::{ArtifactStore, StageRows, WriteOptions};

use crate::error::Result;
use crate::metrics;
use crate::runner::{
    ensure_input_stage, ensure_not_cancelled, with_timeout, StageInput, StageOutcome, StageRunner,
};
use crate::stages::MediaGateway;

/// Stage runner for metadata extraction.
pub struct MetadataStage {
    store: ArtifactStore,
    gateway: Arc<dyn MediaGateway>,
    call_timeout: Duration,
}

impl MetadataStage {
    /// Default timeout for the profile listing call.
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

    /// Creates the stage over a store and gateway.
    #[must_use]
    pub fn new(store: ArtifactStore, gateway: Arc<dyn MediaGateway>) -> Self {
        Self {
            store,
            gateway,
            call_timeout: Self::DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for MetadataStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl StageRunner for MetadataStage {
    fn stage(&self) -> Stage {
        Stage::Metadata
    }

    async fn run(
        &self,
        key: &PartitionKey,
        input: StageInput,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome> {
        ensure_input_stage(Stage::Metadata, &input)?;
        let span = stage_span("run", Stage::Metadata.as_label(), &key.hive_segment());
        let _guard = span.enter();
        let started = std::time::Instant::now();
        metrics::record_stage_invocation(Stage::Metadata.as_label());

        if let Some(existing) = self.store.get(Stage::Metadata, key).await? {
            tracing::debug!("metadata artifact already present, skipping");
            metrics::record_stage_noop(Stage::Metadata.as_label());
            return Ok(StageOutcome::AlreadyExists(existing));
        }
        ensure_not_cancelled(Stage::Metadata, key, cancel)?;

        let mut videos = with_timeout(
            "profile_videos",
            self.call_timeout,
            self.gateway.profile_videos(key.profile()),
        )
        .await?;
        // Deterministic artifact contents regardless of listing order.
        videos.sort_by(|a, b| a.id.cmp(&b.id));

        if videos.is_empty() {
            tracing::info!(profile = %key.profile(), "profile has no eligible videos");
        }

        ensure_not_cancelled(Stage::Metadata, key, cancel)?;
        let rows = StageRows::Metadata(videos);
        let artifact = match self.store.write(key, &rows, WriteOptions::new()).await {
            Ok(artifact) => StageOutcome::Wrote(artifact),
            // Lost a race with a duplicate trigger; the winner's artifact
            // is authoritative.
            Err(trendlake_core::Error::ArtifactExists { .. }) => {
                metrics::record_stage_noop(Stage::Metadata.as_label());
                let existing = self.store.get(Stage::Metadata, key).await?.ok_or_else(|| {
                    trendlake_core::Error::internal("artifact vanished after conflict")
                })?;
                StageOutcome::AlreadyExists(existing)
            }
            Err(e) => return Err(e.into()),
        };

        metrics::record_stage_duration(Stage::Metadata.as_label(), started.elapsed());
        Ok(artifact)
    }
}
