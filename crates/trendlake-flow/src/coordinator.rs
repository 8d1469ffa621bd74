//! The pipeline coordinator.
//!
//! Maps each stage's completion event to the next stage's invocation,
//! supplying exactly the inputs that stage needs from the upstream
//! artifact. The coordinator holds no per-partition state: idempotency
//! lives at the stage-runner boundary, retry lives in the bus, and run
//! state is derived from artifact existence alone, so there is no tracked
//! state that could diverge from storage.
//!
//! Within one partition the stages are strictly sequential because each is
//! triggered by the previous stage's event and reads the previous stage's
//! artifact; across partitions everything runs independently.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use trendlake_core::records::{TranscriptRecord, VideoRecord};
use trendlake_core::{PartitionKey, Stage, StageEvent};
use trendlake_lake::{ArtifactStore, StageRows};

use crate::bus::{stage_topic, EventHandler, NotificationBus};
use crate::error::{Error, Result};
use crate::metrics;
use crate::runner::{StageInput, StageRunner};

/// Derived progress of one partition through the pipeline.
///
/// A pure function of artifact existence; see [`run_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No artifacts yet; metadata extraction has not completed.
    MetadataPending,
    /// Metadata artifact exists; waiting on transcription.
    TranscriptsPending,
    /// Transcript artifact exists; waiting on text analysis.
    AnalysisPending,
    /// The terminal analysis artifact exists.
    Complete,
}

impl RunState {
    /// Returns true for the terminal success state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MetadataPending => write!(f, "METADATA_PENDING"),
            Self::TranscriptsPending => write!(f, "TRANSCRIPTS_PENDING"),
            Self::AnalysisPending => write!(f, "ANALYSIS_PENDING"),
            Self::Complete => write!(f, "COMPLETE"),
        }
    }
}

/// Derives a partition's run state from the artifacts present.
///
/// Absence of the terminal artifact is itself the "incomplete" signal;
/// failure detail lives in the dead-letter queue and failure sidecars.
///
/// # Errors
///
/// Returns [`Error::Core`] on storage failure.
pub async fn run_state(store: &ArtifactStore, key: &PartitionKey) -> Result<RunState> {
    if store.exists(Stage::TextAnalysis, key).await? {
        return Ok(RunState::Complete);
    }
    if store.exists(Stage::Transcripts, key).await? {
        return Ok(RunState::AnalysisPending);
    }
    if store.exists(Stage::Metadata, key).await? {
        return Ok(RunState::TranscriptsPending);
    }
    Ok(RunState::MetadataPending)
}

/// Ties stage completion events to next-stage invocations.
pub struct PipelineCoordinator {
    store: ArtifactStore,
    bus: Arc<dyn NotificationBus>,
    transcription: Arc<dyn StageRunner>,
    analysis: Arc<dyn StageRunner>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for PipelineCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCoordinator").finish_non_exhaustive()
    }
}

impl PipelineCoordinator {
    /// Creates a coordinator over the store, bus, and downstream runners.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a runner is registered for the
    /// wrong stage.
    pub fn new(
        store: ArtifactStore,
        bus: Arc<dyn NotificationBus>,
        transcription: Arc<dyn StageRunner>,
        analysis: Arc<dyn StageRunner>,
    ) -> Result<Self> {
        if transcription.stage() != Stage::Transcripts {
            return Err(Error::configuration(format!(
                "transcription slot holds a {} runner",
                transcription.stage()
            )));
        }
        if analysis.stage() != Stage::TextAnalysis {
            return Err(Error::configuration(format!(
                "analysis slot holds a {} runner",
                analysis.stage()
            )));
        }
        Ok(Self {
            store,
            bus,
            transcription,
            analysis,
            cancel: CancellationToken::new(),
        })
    }

    /// Returns the cancellation token governing in-flight stage work.
    ///
    /// Cancelling it aborts item processing at the next checkpoint; no
    /// partially processed partition ever reaches the canonical path.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn read_metadata(rows: StageRows) -> Result<Vec<VideoRecord>> {
        match rows {
            StageRows::Metadata(videos) => Ok(videos),
            other => Err(trendlake_core::Error::internal(format!(
                "expected metadata rows, found {} artifact",
                other.stage()
            ))
            .into()),
        }
    }

    fn read_transcripts(rows: StageRows) -> Result<Vec<TranscriptRecord>> {
        match rows {
            StageRows::Transcripts(transcripts) => Ok(transcripts),
            other => Err(trendlake_core::Error::internal(format!(
                "expected transcript rows, found {} artifact",
                other.stage()
            ))
            .into()),
        }
    }

    async fn on_metadata_written(&self, event: &StageEvent) -> Result<()> {
        let key = &event.partition_key;
        // The read doubles as the causal guard: if the event raced ahead of
        // the artifact (or the artifact is gone), this fails retryable and
        // the bus redelivers.
        let videos = Self::read_metadata(self.store.read(Stage::Metadata, key).await?)?;

        // Zero eligible videos is not an error: transcription still runs
        // and writes an empty artifact so the chain completes vacuously.
        let outcome = self
            .transcription
            .run(key, StageInput::Transcripts { videos }, &self.cancel)
            .await?;

        // Republishing after a no-op heals a chain that stalled between
        // artifact write and event delivery.
        self.bus
            .publish(
                stage_topic(Stage::Transcripts),
                outcome.artifact().to_event(),
            )
            .await
    }

    async fn on_transcripts_written(&self, event: &StageEvent) -> Result<()> {
        let key = &event.partition_key;
        let transcripts =
            Self::read_transcripts(self.store.read(Stage::Transcripts, key).await?)?;
        let videos = Self::read_metadata(self.store.read(Stage::Metadata, key).await?)?;

        let outcome = self
            .analysis
            .run(
                key,
                StageInput::Analysis {
                    transcripts,
                    videos,
                },
                &self.cancel,
            )
            .await?;

        self.bus
            .publish(
                stage_topic(Stage::TextAnalysis),
                outcome.artifact().to_event(),
            )
            .await
    }

    fn on_analysis_written(event: &StageEvent) {
        metrics::record_pipeline_completed();
        tracing::info!(
            partition = %event.partition_key,
            location = %event.location,
            rows = event.record_count,
            "pipeline complete"
        );
    }
}

#[async_trait]
impl EventHandler for PipelineCoordinator {
    fn name(&self) -> &str {
        "pipeline-coordinator"
    }

    async fn handle(&self, event: &StageEvent) -> Result<()> {
        match event.stage {
            Stage::Metadata => self.on_metadata_written(event).await,
            Stage::Transcripts => self.on_transcripts_written(event).await,
            Stage::TextAnalysis => {
                Self::on_analysis_written(event);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::retry::RetryPolicy;
    use crate::runner::StageOutcome;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use trendlake_core::{LakePaths, MemoryBackend, ProcessedAt, Profile};
    use trendlake_lake::WriteOptions;

    fn store() -> ArtifactStore {
        ArtifactStore::new(Arc::new(MemoryBackend::new()), LakePaths::default())
    }

    fn key() -> PartitionKey {
        PartitionKey::new(
            Profile::new("alice").unwrap(),
            ProcessedAt::parse("20250209T110228Z").unwrap(),
        )
    }

    fn bus() -> Arc<InMemoryBus> {
        Arc::new(InMemoryBus::new(RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }))
    }

    /// Runner that writes an empty artifact for its stage.
    struct RecordingRunner {
        stage: Stage,
        store: ArtifactStore,
        invocations: AtomicU32,
    }

    impl RecordingRunner {
        fn new(stage: Stage, store: ArtifactStore) -> Arc<Self> {
            Arc::new(Self {
                stage,
                store,
                invocations: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl StageRunner for RecordingRunner {
        fn stage(&self) -> Stage {
            self.stage
        }

        async fn run(
            &self,
            key: &PartitionKey,
            _input: StageInput,
            _cancel: &CancellationToken,
        ) -> Result<StageOutcome> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            if let Some(existing) = self.store.get(self.stage, key).await? {
                return Ok(StageOutcome::AlreadyExists(existing));
            }
            let rows = match self.stage {
                Stage::Metadata => StageRows::Metadata(vec![]),
                Stage::Transcripts => StageRows::Transcripts(vec![]),
                Stage::TextAnalysis => StageRows::Analysis(vec![]),
            };
            let artifact = self.store.write(key, &rows, WriteOptions::new()).await?;
            Ok(StageOutcome::Wrote(artifact))
        }
    }

    async fn write_empty(store: &ArtifactStore, stage: Stage, key: &PartitionKey) {
        let rows = match stage {
            Stage::Metadata => StageRows::Metadata(vec![]),
            Stage::Transcripts => StageRows::Transcripts(vec![]),
            Stage::TextAnalysis => StageRows::Analysis(vec![]),
        };
        store.write(key, &rows, WriteOptions::new()).await.unwrap();
    }

    #[tokio::test]
    async fn run_state_follows_artifact_existence() {
        let store = store();
        let key = key();

        assert_eq!(
            run_state(&store, &key).await.unwrap(),
            RunState::MetadataPending
        );
        write_empty(&store, Stage::Metadata, &key).await;
        assert_eq!(
            run_state(&store, &key).await.unwrap(),
            RunState::TranscriptsPending
        );
        write_empty(&store, Stage::Transcripts, &key).await;
        assert_eq!(
            run_state(&store, &key).await.unwrap(),
            RunState::AnalysisPending
        );
        write_empty(&store, Stage::TextAnalysis, &key).await;
        assert_eq!(run_state(&store, &key).await.unwrap(), RunState::Complete);
        assert!(run_state(&store, &key).await.unwrap().is_terminal());
    }

    #[tokio::test]
    async fn metadata_event_triggers_transcription() {
        let store = store();
        let bus = bus();
        let transcription = RecordingRunner::new(Stage::Transcripts, store.clone());
        let analysis = RecordingRunner::new(Stage::TextAnalysis, store.clone());
        let coordinator = PipelineCoordinator::new(
            store.clone(),
            bus.clone(),
            transcription.clone(),
            analysis.clone(),
        )
        .unwrap();

        write_empty(&store, Stage::Metadata, &key()).await;
        let event = StageEvent::new(Stage::Metadata, key(), "loc", 0);
        coordinator.handle(&event).await.unwrap();

        assert_eq!(transcription.invocations.load(Ordering::SeqCst), 1);
        assert_eq!(analysis.invocations.load(Ordering::SeqCst), 0);
        assert!(store.exists(Stage::Transcripts, &key()).await.unwrap());
    }

    #[tokio::test]
    async fn metadata_event_without_artifact_fails_retryable() {
        let store = store();
        let coordinator = PipelineCoordinator::new(
            store.clone(),
            bus(),
            RecordingRunner::new(Stage::Transcripts, store.clone()),
            RecordingRunner::new(Stage::TextAnalysis, store),
        )
        .unwrap();

        // Event arrived but the artifact is not there: transcription must
        // not be invocable, and the error must be retryable so the bus
        // redelivers once the artifact lands.
        let event = StageEvent::new(Stage::Metadata, key(), "loc", 0);
        let err = coordinator.handle(&event).await.expect_err("must fail");
        assert!(matches!(
            err,
            Error::Core(trendlake_core::Error::NotFound(_))
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn analysis_event_is_terminal() {
        let store = store();
        let transcription = RecordingRunner::new(Stage::Transcripts, store.clone());
        let analysis = RecordingRunner::new(Stage::TextAnalysis, store.clone());
        let coordinator = PipelineCoordinator::new(
            store.clone(),
            bus(),
            transcription.clone(),
            analysis.clone(),
        )
        .unwrap();

        let event = StageEvent::new(Stage::TextAnalysis, key(), "loc", 2);
        coordinator.handle(&event).await.unwrap();

        assert_eq!(transcription.invocations.load(Ordering::SeqCst), 0);
        assert_eq!(analysis.invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn misconfigured_runner_slots_are_rejected() {
        let store = store();
        let wrong = RecordingRunner::new(Stage::Metadata, store.clone());
        let analysis = RecordingRunner::new(Stage::TextAnalysis, store.clone());
        let result = PipelineCoordinator::new(store, bus(), wrong, analysis);
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }
}
