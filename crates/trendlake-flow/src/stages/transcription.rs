//! Transcription stage.
//!
//! Pulls audio for each video in the metadata artifact and runs it through
//! the speech-to-text black box. Item failures are isolated: a video whose
//! download or transcription keeps failing is recorded in the failure
//! sidecar and excluded from the artifact, never allowed to discard its
//! siblings or block the partition.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use trendlake_core::observability::stage_span;
use trendlake_core::records::{TranscriptRecord, VideoRecord};
use trendlake_core::{PartitionKey, Stage};
use trendlake_lake::{ArtifactStore, ItemFailure, StageRows, WriteOptions};

use crate::error::Result;
use crate::metrics;
use crate::retry::RetryPolicy;
use crate::runner::{
    ensure_not_cancelled, with_timeout, StageInput, StageOutcome, StageRunner,
};
use crate::stages::{MediaGateway, SpeechToText};

/// Stage runner for audio transcription.
pub struct TranscriptionStage {
    store: ArtifactStore,
    gateway: Arc<dyn MediaGateway>,
    speech: Arc<dyn SpeechToText>,
    call_timeout: Duration,
    item_retry: RetryPolicy,
    max_videos_per_profile: Option<usize>,
}

impl TranscriptionStage {
    /// Default timeout for one download or inference call.
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(300);

    /// Creates the stage over a store and the two black boxes.
    #[must_use]
    pub fn new(
        store: ArtifactStore,
        gateway: Arc<dyn MediaGateway>,
        speech: Arc<dyn SpeechToText>,
    ) -> Self {
        Self {
            store,
            gateway,
            speech,
            call_timeout: Self::DEFAULT_CALL_TIMEOUT,
            item_retry: RetryPolicy::with_max_attempts(3),
            max_videos_per_profile: None,
        }
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Overrides the per-item retry policy.
    #[must_use]
    pub const fn with_item_retry(mut self, retry: RetryPolicy) -> Self {
        self.item_retry = retry;
        self
    }

    /// Caps how many videos are transcribed per profile run.
    ///
    /// Selection is deterministic: videos are processed in id order and the
    /// cap keeps the prefix.
    #[must_use]
    pub const fn with_max_videos_per_profile(mut self, cap: usize) -> Self {
        self.max_videos_per_profile = Some(cap);
        self
    }

    async fn transcribe_one(
        &self,
        key: &PartitionKey,
        video: &VideoRecord,
    ) -> std::result::Result<TranscriptRecord, ItemFailure> {
        let mut attempt = 0_u32;
        loop {
            attempt += 1;
            let result = async {
                let audio = with_timeout(
                    "fetch_audio",
                    self.call_timeout,
                    self.gateway.fetch_audio(key.profile(), &video.id),
                )
                .await?;
                with_timeout("transcribe", self.call_timeout, self.speech.transcribe(audio)).await
            }
            .await;

            match result {
                Ok(text) => {
                    return Ok(TranscriptRecord {
                        id: video.id.clone(),
                        title: video.title.clone(),
                        description: video.description.clone(),
                        transcript: Some(text),
                    })
                }
                Err(e) if e.is_retryable() && self.item_retry.allows_retry(attempt) => {
                    tracing::warn!(
                        video = %video.id,
                        attempt,
                        error = %e,
                        "transcription attempt failed, retrying"
                    );
                    tokio::time::sleep(self.item_retry.delay_for(attempt)).await;
                }
                Err(e) => {
                    tracing::warn!(video = %video.id, attempts = attempt, error = %e, "giving up on item");
                    return Err(ItemFailure {
                        video_id: video.id.clone(),
                        stage: Stage::Transcripts,
                        error: e.to_string(),
                        attempts: attempt,
                        failed_at: Utc::now(),
                    });
                }
            }
        }
    }
}

impl std::fmt::Debug for TranscriptionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionStage")
            .field("max_videos_per_profile", &self.max_videos_per_profile)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StageRunner for TranscriptionStage {
    fn stage(&self) -> Stage {
        Stage::Transcripts
    }

    async fn run(
        &self,
        key: &PartitionKey,
        input: StageInput,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome> {
        let mut videos = match input {
            StageInput::Transcripts { videos } => videos,
            other => {
                return Err(crate::error::Error::InputMismatch {
                    stage: Stage::Transcripts,
                    got: other.stage(),
                })
            }
        };

        let span = stage_span("run", Stage::Transcripts.as_label(), &key.hive_segment());
        let _guard = span.enter();
        let started = std::time::Instant::now();
        metrics::record_stage_invocation(Stage::Transcripts.as_label());

        if let Some(existing) = self.store.get(Stage::Transcripts, key).await? {
            tracing::debug!("transcript artifact already present, skipping");
            metrics::record_stage_noop(Stage::Transcripts.as_label());
            return Ok(StageOutcome::AlreadyExists(existing));
        }

        videos.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(cap) = self.max_videos_per_profile {
            videos.truncate(cap);
        }

        let mut rows = Vec::with_capacity(videos.len());
        let mut failures = Vec::new();
        for video in &videos {
            ensure_not_cancelled(Stage::Transcripts, key, cancel)?;
            match self.transcribe_one(key, video).await {
                Ok(record) => rows.push(record),
                Err(failure) => failures.push(failure),
            }
        }

        ensure_not_cancelled(Stage::Transcripts, key, cancel)?;
        let rows = StageRows::Transcripts(rows);
        let outcome = match self.store.write(key, &rows, WriteOptions::new()).await {
            Ok(artifact) => StageOutcome::Wrote(artifact),
            Err(trendlake_core::Error::ArtifactExists { .. }) => {
                metrics::record_stage_noop(Stage::Transcripts.as_label());
                let existing = self.store.get(Stage::Transcripts, key).await?.ok_or_else(
                    || trendlake_core::Error::internal("artifact vanished after conflict"),
                )?;
                return Ok(StageOutcome::AlreadyExists(existing));
            }
            Err(e) => return Err(e.into()),
        };

        metrics::record_items_failed(Stage::Transcripts.as_label(), failures.len() as u64);
        self.store
            .record_failures(Stage::Transcripts, key, &failures)
            .await?;
        metrics::record_stage_duration(Stage::Transcripts.as_label(), started.elapsed());
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use trendlake_core::{LakePaths, MemoryBackend, ProcessedAt, Profile, VideoId};

    fn video(id: &str) -> VideoRecord {
        VideoRecord {
            id: VideoId::new(id).unwrap(),
            title: Some(format!("title {id}")),
            description: Some("desc".into()),
            upload_date: 0,
            like_count: 0,
            repost_count: 0,
            comment_count: 0,
            view_count: 0,
            duration: 10,
            webpage_url: format!("https://example.com/v/{id}"),
            channel: None,
            timestamp: 0,
            track: None,
            artists: vec![],
            artist: None,
            uploader: Some("alice".into()),
        }
    }

    struct FixtureGateway;

    #[async_trait]
    impl MediaGateway for FixtureGateway {
        async fn profile_videos(&self, _profile: &Profile) -> Result<Vec<VideoRecord>> {
            Ok(vec![])
        }

        async fn fetch_audio(&self, _profile: &Profile, video: &VideoId) -> Result<Bytes> {
            Ok(Bytes::from(video.as_str().to_string()))
        }
    }

    /// Speech stub scripted per audio payload; counts calls.
    struct ScriptedSpeech {
        // audio payload -> number of failures before success; missing key
        // means always succeed.
        failures: HashMap<String, u32>,
        calls: AtomicU32,
        seen: std::sync::Mutex<HashMap<String, u32>>,
    }

    impl ScriptedSpeech {
        fn new(failures: HashMap<String, u32>) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicU32::new(0),
                seen: std::sync::Mutex::new(HashMap::new()),
            })
        }

        fn reliable() -> Arc<Self> {
            Self::new(HashMap::new())
        }
    }

    #[async_trait]
    impl SpeechToText for ScriptedSpeech {
        async fn transcribe(&self, audio: Bytes) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let id = String::from_utf8(audio.to_vec()).unwrap();
            let mut seen = self.seen.lock().unwrap();
            let attempt = seen.entry(id.clone()).or_insert(0);
            *attempt += 1;
            if let Some(&failures) = self.failures.get(&id) {
                if *attempt <= failures {
                    return Err(Error::Timeout {
                        operation: "transcribe".into(),
                        seconds: 1,
                    });
                }
            }
            Ok(format!("transcript of {id}"))
        }
    }

    fn store() -> ArtifactStore {
        ArtifactStore::new(Arc::new(MemoryBackend::new()), LakePaths::default())
    }

    fn key() -> PartitionKey {
        PartitionKey::new(
            Profile::new("alice").unwrap(),
            ProcessedAt::parse("20250209T110228Z").unwrap(),
        )
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn transcribes_all_videos() {
        let store = store();
        let stage = TranscriptionStage::new(
            store.clone(),
            Arc::new(FixtureGateway),
            ScriptedSpeech::reliable(),
        );

        let input = StageInput::Transcripts {
            videos: vec![video("v2"), video("v1")],
        };
        let outcome = stage
            .run(&key(), input, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.artifact().record_count, Some(2));

        let StageRows::Transcripts(rows) = store.read(Stage::Transcripts, &key()).await.unwrap()
        else {
            panic!("expected transcript rows");
        };
        assert_eq!(rows[0].id.as_str(), "v1");
        assert_eq!(rows[0].transcript.as_deref(), Some("transcript of v1"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_item_is_excluded_and_recorded() {
        let store = store();
        let speech = ScriptedSpeech::new(HashMap::from([("v2".to_string(), u32::MAX)]));
        let stage =
            TranscriptionStage::new(store.clone(), Arc::new(FixtureGateway), speech)
                .with_item_retry(fast_retry(3));

        let input = StageInput::Transcripts {
            videos: vec![video("v1"), video("v2"), video("v3")],
        };
        let outcome = stage
            .run(&key(), input, &CancellationToken::new())
            .await
            .unwrap();

        // N - M successes in the artifact.
        assert_eq!(outcome.artifact().record_count, Some(2));

        let failures = store.read_failures(Stage::Transcripts, &key()).await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].video_id.as_str(), "v2");
        assert_eq!(failures[0].attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_item_failure_recovers_within_bound() {
        let store = store();
        let speech = ScriptedSpeech::new(HashMap::from([("v1".to_string(), 2)]));
        let stage = TranscriptionStage::new(store.clone(), Arc::new(FixtureGateway), speech)
            .with_item_retry(fast_retry(3));

        let input = StageInput::Transcripts {
            videos: vec![video("v1")],
        };
        let outcome = stage
            .run(&key(), input, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.artifact().record_count, Some(1));
        assert!(store
            .read_failures(Stage::Transcripts, &key())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn empty_input_writes_vacuous_artifact() {
        let store = store();
        let stage = TranscriptionStage::new(
            store.clone(),
            Arc::new(FixtureGateway),
            ScriptedSpeech::reliable(),
        );

        let outcome = stage
            .run(
                &key(),
                StageInput::Transcripts { videos: vec![] },
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.artifact().record_count, Some(0));
        assert!(store.exists(Stage::Transcripts, &key()).await.unwrap());
    }

    #[tokio::test]
    async fn profile_cap_keeps_id_order_prefix() {
        let store = store();
        let stage = TranscriptionStage::new(
            store.clone(),
            Arc::new(FixtureGateway),
            ScriptedSpeech::reliable(),
        )
        .with_max_videos_per_profile(2);

        let input = StageInput::Transcripts {
            videos: vec![video("v3"), video("v1"), video("v2")],
        };
        stage
            .run(&key(), input, &CancellationToken::new())
            .await
            .unwrap();

        let StageRows::Transcripts(rows) = store.read(Stage::Transcripts, &key()).await.unwrap()
        else {
            panic!("expected transcript rows");
        };
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v2"]);
    }

    #[tokio::test]
    async fn duplicate_trigger_short_circuits_before_expensive_work() {
        let store = store();
        let speech = ScriptedSpeech::reliable();
        let stage =
            TranscriptionStage::new(store, Arc::new(FixtureGateway), speech.clone());
        let cancel = CancellationToken::new();

        let input = StageInput::Transcripts {
            videos: vec![video("v1")],
        };
        stage.run(&key(), input.clone(), &cancel).await.unwrap();
        let calls_after_first = speech.calls.load(Ordering::SeqCst);

        let second = stage.run(&key(), input, &cancel).await.unwrap();
        assert!(second.was_noop());
        assert_eq!(speech.calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn cancellation_leaves_no_canonical_artifact() {
        let store = store();
        let stage = TranscriptionStage::new(
            store.clone(),
            Arc::new(FixtureGateway),
            ScriptedSpeech::reliable(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = stage
            .run(
                &key(),
                StageInput::Transcripts {
                    videos: vec![video("v1")],
                },
                &cancel,
            )
            .await
            .expect_err("cancelled run must fail");
        assert!(matches!(err, Error::Cancelled { .. }));
        assert!(!store.exists(Stage::Transcripts, &key()).await.unwrap());
    }
}
