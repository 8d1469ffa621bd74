//! End-to-end pipeline wiring.
//!
//! [`Pipeline`] assembles the store, bus, registrar, coordinator, and the
//! three stage runners into a running system: the registrar and the
//! coordinator subscribe to every stage topic, and `start_run` kicks off
//! metadata extraction for one profile. Everything downstream of the first
//! artifact is driven purely by events.

use std::sync::Arc;

use trendlake_catalog::{Catalog, PartitionRegistrar};
use trendlake_core::{PartitionKey, ProcessedAt, Profile, Stage, StageEvent};
use trendlake_lake::ArtifactStore;

use crate::bus::{stage_topic, EventHandler, NotificationBus};
use crate::coordinator::{run_state, PipelineCoordinator, RunState};
use crate::error::{Error, Result};
use crate::runner::{StageInput, StageRunner};
use crate::stages::{
    AnalysisStage, ContentJudge, MediaGateway, MetadataStage, SpeechToText, TranscriptionStage,
};

/// Adapts the registrar to the bus handler contract.
struct RegistrarHandler {
    inner: PartitionRegistrar,
}

#[async_trait::async_trait]
impl EventHandler for RegistrarHandler {
    fn name(&self) -> &str {
        "partition-registrar"
    }

    async fn handle(&self, event: &StageEvent) -> Result<()> {
        self.inner
            .on_artifact_event(event)
            .await
            .map(|_| ())
            .map_err(Error::from)
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    store: ArtifactStore,
    bus: Arc<dyn NotificationBus>,
    catalog: Arc<dyn Catalog>,
    gateway: Option<Arc<dyn MediaGateway>>,
    speech: Option<Arc<dyn SpeechToText>>,
    judge: Option<Arc<dyn ContentJudge>>,
    categories: Option<Vec<String>>,
    max_videos_per_profile: Option<usize>,
}

impl PipelineBuilder {
    /// Sets the media gateway black box.
    #[must_use]
    pub fn with_media_gateway(mut self, gateway: Arc<dyn MediaGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Sets the speech-to-text black box.
    #[must_use]
    pub fn with_speech_to_text(mut self, speech: Arc<dyn SpeechToText>) -> Self {
        self.speech = Some(speech);
        self
    }

    /// Sets the content-judgment black box.
    #[must_use]
    pub fn with_content_judge(mut self, judge: Arc<dyn ContentJudge>) -> Self {
        self.judge = Some(judge);
        self
    }

    /// Overrides the analysis category taxonomy.
    #[must_use]
    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = Some(categories);
        self
    }

    /// Caps transcriptions per profile run.
    #[must_use]
    pub const fn with_max_videos_per_profile(mut self, cap: usize) -> Self {
        self.max_videos_per_profile = Some(cap);
        self
    }

    /// Builds the pipeline and subscribes its handlers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a black box is missing,
    /// [`Error::Bus`] if a subscription fails.
    pub async fn build(self) -> Result<Pipeline> {
        let gateway = self
            .gateway
            .ok_or_else(|| Error::configuration("media gateway is required"))?;
        let speech = self
            .speech
            .ok_or_else(|| Error::configuration("speech-to-text is required"))?;
        let judge = self
            .judge
            .ok_or_else(|| Error::configuration("content judge is required"))?;

        let metadata = Arc::new(MetadataStage::new(self.store.clone(), gateway.clone()));

        let mut transcription =
            TranscriptionStage::new(self.store.clone(), gateway, speech);
        if let Some(cap) = self.max_videos_per_profile {
            transcription = transcription.with_max_videos_per_profile(cap);
        }
        let transcription: Arc<dyn StageRunner> = Arc::new(transcription);

        let mut analysis = AnalysisStage::new(self.store.clone(), judge);
        if let Some(categories) = self.categories {
            analysis = analysis.with_categories(categories);
        }
        let analysis: Arc<dyn StageRunner> = Arc::new(analysis);

        let coordinator = Arc::new(PipelineCoordinator::new(
            self.store.clone(),
            Arc::clone(&self.bus),
            transcription,
            analysis,
        )?);

        let registrar = Arc::new(RegistrarHandler {
            inner: PartitionRegistrar::new(self.catalog),
        });

        for stage in Stage::ALL {
            let topic = stage_topic(stage);
            self.bus
                .subscribe(topic, Arc::clone(&coordinator) as Arc<dyn EventHandler>)
                .await?;
            self.bus
                .subscribe(topic, Arc::clone(&registrar) as Arc<dyn EventHandler>)
                .await?;
        }

        Ok(Pipeline {
            store: self.store,
            bus: self.bus,
            coordinator,
            metadata,
        })
    }
}

/// The assembled pipeline.
pub struct Pipeline {
    store: ArtifactStore,
    bus: Arc<dyn NotificationBus>,
    coordinator: Arc<PipelineCoordinator>,
    metadata: Arc<MetadataStage>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Starts building a pipeline.
    #[must_use]
    pub fn builder(
        store: ArtifactStore,
        bus: Arc<dyn NotificationBus>,
        catalog: Arc<dyn Catalog>,
    ) -> PipelineBuilder {
        PipelineBuilder {
            store,
            bus,
            catalog,
            gateway: None,
            speech: None,
            judge: None,
            categories: None,
            max_videos_per_profile: None,
        }
    }

    /// Starts a new run for a profile, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Propagates metadata-stage and publish failures.
    pub async fn start_run(&self, profile: Profile) -> Result<PartitionKey> {
        self.start_run_at(profile, ProcessedAt::now()).await
    }

    /// Starts a new run for a profile at an explicit run timestamp.
    ///
    /// The timestamp becomes the partition key for every stage of this run.
    ///
    /// # Errors
    ///
    /// Propagates metadata-stage and publish failures.
    pub async fn start_run_at(
        &self,
        profile: Profile,
        processed_at: ProcessedAt,
    ) -> Result<PartitionKey> {
        let key = PartitionKey::new(profile, processed_at);
        tracing::info!(partition = %key, "starting pipeline run");

        let outcome = self
            .metadata
            .run(&key, StageInput::Metadata, &self.coordinator.cancel_token())
            .await?;
        self.bus
            .publish(stage_topic(Stage::Metadata), outcome.artifact().to_event())
            .await?;
        Ok(key)
    }

    /// Requests cancellation of all in-flight stage work.
    pub fn cancel(&self) {
        self.coordinator.cancel_token().cancel();
    }

    /// Derives the run state for a partition from artifact existence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Core`] on storage failure.
    pub async fn run_state(&self, key: &PartitionKey) -> Result<RunState> {
        run_state(&self.store, key).await
    }
}
