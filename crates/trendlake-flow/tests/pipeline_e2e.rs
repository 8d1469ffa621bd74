//! End-to-end pipeline scenarios over in-memory backends.
//!
//! These tests drive the full event chain: metadata extraction publishes,
//! the coordinator triggers transcription and analysis, and the registrar
//! makes partitions queryable, all through the bus, never by direct call.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use trendlake_catalog::{Catalog, MemoryCatalog};
use trendlake_core::records::VideoRecord;
use trendlake_core::{
    LakePaths, MemoryBackend, PartitionKey, ProcessedAt, Profile, Stage, StageEvent, VideoId,
};
use trendlake_flow::bus::{stage_topic, InMemoryBus, NotificationBus};
use trendlake_flow::coordinator::RunState;
use trendlake_flow::error::Result;
use trendlake_flow::pipeline::Pipeline;
use trendlake_flow::retry::RetryPolicy;
use trendlake_flow::stages::{
    ContentJudge, JudgmentRequest, MediaGateway, SpeechToText, DEFAULT_CATEGORIES,
};
use trendlake_lake::{ArtifactStore, StageRows};

fn video(id: &str, uploader: &str) -> VideoRecord {
    VideoRecord {
        id: VideoId::new(id).unwrap(),
        title: Some(format!("title {id}")),
        description: Some(format!("description {id}")),
        upload_date: 1_739_092_948_000,
        like_count: 100,
        repost_count: 5,
        comment_count: 10,
        view_count: 2_000,
        duration: 25,
        webpage_url: format!("https://example.com/@{uploader}/video/{id}"),
        channel: Some(uploader.to_string()),
        timestamp: 1_739_092_948,
        track: Some("original sound".into()),
        artists: vec![uploader.to_string()],
        artist: Some(uploader.to_string()),
        uploader: Some(uploader.to_string()),
    }
}

/// Gateway serving fixed listings per profile.
struct FixtureGateway {
    listings: HashMap<String, Vec<VideoRecord>>,
}

impl FixtureGateway {
    fn new(listings: HashMap<String, Vec<VideoRecord>>) -> Arc<Self> {
        Arc::new(Self { listings })
    }
}

#[async_trait]
impl MediaGateway for FixtureGateway {
    async fn profile_videos(&self, profile: &Profile) -> Result<Vec<VideoRecord>> {
        Ok(self
            .listings
            .get(profile.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_audio(&self, _profile: &Profile, video: &VideoId) -> Result<Bytes> {
        Ok(Bytes::from(format!("audio:{video}")))
    }
}

/// Speech stub; configured video ids always fail.
struct FixtureSpeech {
    broken: HashSet<String>,
}

impl FixtureSpeech {
    fn reliable() -> Arc<Self> {
        Arc::new(Self {
            broken: HashSet::new(),
        })
    }

    fn broken_for(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            broken: ids.iter().map(ToString::to_string).collect(),
        })
    }
}

#[async_trait]
impl SpeechToText for FixtureSpeech {
    async fn transcribe(&self, audio: Bytes) -> Result<String> {
        let payload = String::from_utf8(audio.to_vec()).unwrap();
        let id = payload.trim_start_matches("audio:");
        if self.broken.contains(id) {
            return Err(trendlake_flow::error::Error::Timeout {
                operation: "transcribe".into(),
                seconds: 1,
            });
        }
        Ok(format!("spoken words of {id}"))
    }
}

/// Judge emitting a well-formed answer derived from the request.
struct FixtureJudge;

#[async_trait]
impl ContentJudge for FixtureJudge {
    async fn judge(&self, request: &JudgmentRequest) -> Result<String> {
        Ok(serde_json::json!({
            "language": "english",
            "category": request.categories[0],
            "summary": format!("summary of: {}", request.transcript),
            "keywords": ["one", "two", "three", "four", "five"],
        })
        .to_string())
    }
}

struct Harness {
    store: ArtifactStore,
    catalog: Arc<MemoryCatalog>,
    bus: Arc<InMemoryBus>,
    pipeline: Pipeline,
}

async fn harness(
    listings: HashMap<String, Vec<VideoRecord>>,
    speech: Arc<FixtureSpeech>,
) -> Harness {
    let store = ArtifactStore::new(Arc::new(MemoryBackend::new()), LakePaths::default());
    let catalog = Arc::new(MemoryCatalog::new());
    let bus = Arc::new(InMemoryBus::new(RetryPolicy {
        max_attempts: 5,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    }));

    let pipeline = Pipeline::builder(
        store.clone(),
        bus.clone() as Arc<dyn NotificationBus>,
        catalog.clone() as Arc<dyn Catalog>,
    )
    .with_media_gateway(FixtureGateway::new(listings))
    .with_speech_to_text(speech)
    .with_content_judge(Arc::new(FixtureJudge))
    .build()
    .await
    .expect("pipeline builds");

    Harness {
        store,
        catalog,
        bus,
        pipeline,
    }
}

fn alice_listings() -> HashMap<String, Vec<VideoRecord>> {
    HashMap::from([(
        "alice".to_string(),
        vec![video("v1", "alice"), video("v2", "alice")],
    )])
}

#[tokio::test]
async fn two_video_profile_flows_end_to_end() {
    let h = harness(alice_listings(), FixtureSpeech::reliable()).await;

    let key = h
        .pipeline
        .start_run_at(
            Profile::new("alice").unwrap(),
            ProcessedAt::parse("20250209T110228Z").unwrap(),
        )
        .await
        .unwrap();
    h.bus.settled().await;

    // All three artifacts exist under the canonical layout.
    assert_eq!(h.pipeline.run_state(&key).await.unwrap(), RunState::Complete);
    let StageRows::Metadata(metadata) = h.store.read(Stage::Metadata, &key).await.unwrap() else {
        panic!("expected metadata rows");
    };
    assert_eq!(metadata.len(), 2);

    let StageRows::Transcripts(transcripts) =
        h.store.read(Stage::Transcripts, &key).await.unwrap()
    else {
        panic!("expected transcript rows");
    };
    assert_eq!(transcripts.len(), 2);
    assert_eq!(
        transcripts[0].transcript.as_deref(),
        Some("spoken words of v1")
    );

    let StageRows::Analysis(analysis) = h.store.read(Stage::TextAnalysis, &key).await.unwrap()
    else {
        panic!("expected analysis rows");
    };
    assert_eq!(analysis.len(), 2);
    for row in &analysis {
        assert_eq!(row.language, "english");
        assert!(DEFAULT_CATEGORIES.contains(&row.category.as_str()));
        assert!(!row.summary.is_empty());
        assert_eq!(row.keywords.len(), 5);
    }

    // Exactly one new partition per queryable table; transcripts stay out
    // of the catalog.
    let metadata_partitions = h.catalog.list_partitions("metadata").await.unwrap();
    let text_partitions = h.catalog.list_partitions("text_analysis").await.unwrap();
    assert_eq!(metadata_partitions.len(), 1);
    assert_eq!(text_partitions.len(), 1);
    assert_eq!(
        metadata_partitions[0].location,
        "videos/metadata/profile=alice/processed_at=20250209T110228Z/metadata.parquet"
    );

    assert!(h.bus.dead_letters().is_empty().unwrap());
}

#[tokio::test]
async fn zero_video_profile_completes_vacuously() {
    let h = harness(HashMap::new(), FixtureSpeech::reliable()).await;

    let key = h
        .pipeline
        .start_run(Profile::new("ghost_profile").unwrap())
        .await
        .unwrap();
    h.bus.settled().await;

    // Empty input is not an error: the chain reaches the terminal state
    // with zero-row artifacts at every stage.
    assert_eq!(h.pipeline.run_state(&key).await.unwrap(), RunState::Complete);
    for stage in Stage::ALL {
        let rows = h.store.read(stage, &key).await.unwrap();
        assert!(rows.is_empty(), "{stage} artifact should be empty");
    }
    assert!(h.bus.dead_letters().is_empty().unwrap());
}

#[tokio::test(start_paused = true)]
async fn partial_transcription_failure_does_not_block_the_run() {
    let h = harness(alice_listings(), FixtureSpeech::broken_for(&["v2"])).await;

    let key = h
        .pipeline
        .start_run(Profile::new("alice").unwrap())
        .await
        .unwrap();
    h.bus.settled().await;

    assert_eq!(h.pipeline.run_state(&key).await.unwrap(), RunState::Complete);

    // N - M successes flow through; the failed item is recorded.
    let StageRows::Transcripts(transcripts) =
        h.store.read(Stage::Transcripts, &key).await.unwrap()
    else {
        panic!("expected transcript rows");
    };
    assert_eq!(transcripts.len(), 1);
    assert_eq!(transcripts[0].id.as_str(), "v1");

    let StageRows::Analysis(analysis) = h.store.read(Stage::TextAnalysis, &key).await.unwrap()
    else {
        panic!("expected analysis rows");
    };
    assert_eq!(analysis.len(), 1);

    let failures = h
        .store
        .read_failures(Stage::Transcripts, &key)
        .await
        .unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].video_id.as_str(), "v2");
}

#[tokio::test]
async fn duplicate_event_delivery_converges() {
    let h = harness(alice_listings(), FixtureSpeech::reliable()).await;

    let key = h
        .pipeline
        .start_run(Profile::new("alice").unwrap())
        .await
        .unwrap();
    h.bus.settled().await;

    // Redeliver the metadata event as the bus is allowed to do. Downstream
    // stages short-circuit on their existing artifacts and the catalog
    // stays at one entry per table.
    let metadata_artifact = h.store.get(Stage::Metadata, &key).await.unwrap().unwrap();
    for _ in 0..3 {
        h.bus
            .publish(stage_topic(Stage::Metadata), metadata_artifact.to_event())
            .await
            .unwrap();
    }
    h.bus.settled().await;

    assert_eq!(h.pipeline.run_state(&key).await.unwrap(), RunState::Complete);
    assert_eq!(h.catalog.list_partitions("metadata").await.unwrap().len(), 1);
    assert_eq!(
        h.catalog
            .list_partitions("text_analysis")
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(h.bus.dead_letters().is_empty().unwrap());
}

#[tokio::test(start_paused = true)]
async fn premature_event_dead_letters_after_bounded_retries() {
    let h = harness(alice_listings(), FixtureSpeech::reliable()).await;

    // A transcript event for a partition that has no artifacts at all:
    // the coordinator cannot read its inputs, retries its bound, and the
    // event lands in the dead-letter channel instead of looping forever.
    let key = PartitionKey::new(
        Profile::new("nobody").unwrap(),
        ProcessedAt::parse("20250209T110228Z").unwrap(),
    );
    let premature = StageEvent::new(
        Stage::Transcripts,
        key.clone(),
        "videos/transcripts/profile=nobody/processed_at=20250209T110228Z/transcripts.parquet",
        1,
    );
    h.bus
        .publish(stage_topic(Stage::Transcripts), premature)
        .await
        .unwrap();
    h.bus.settled().await;

    let letters = h.bus.dead_letters().drain().unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].attempts, 5);
    assert_eq!(letters[0].handler, "pipeline-coordinator");

    // Causal ordering held: no analysis work happened for that partition.
    assert!(!h.store.exists(Stage::TextAnalysis, &key).await.unwrap());
    assert_eq!(
        h.pipeline.run_state(&key).await.unwrap(),
        RunState::MetadataPending
    );
}

#[tokio::test]
async fn reruns_use_fresh_partitions_and_never_mutate_old_ones() {
    let h = harness(alice_listings(), FixtureSpeech::reliable()).await;
    let profile = Profile::new("alice").unwrap();

    let first = h
        .pipeline
        .start_run_at(profile.clone(), ProcessedAt::parse("20250209T110228Z").unwrap())
        .await
        .unwrap();
    h.bus.settled().await;

    let second = h
        .pipeline
        .start_run_at(profile, ProcessedAt::parse("20250210T090000Z").unwrap())
        .await
        .unwrap();
    h.bus.settled().await;

    assert_ne!(first, second);
    assert_eq!(h.catalog.list_partitions("metadata").await.unwrap().len(), 2);

    // Both runs remain complete and independently queryable.
    assert_eq!(
        h.pipeline.run_state(&first).await.unwrap(),
        RunState::Complete
    );
    assert_eq!(
        h.pipeline.run_state(&second).await.unwrap(),
        RunState::Complete
    );
}
