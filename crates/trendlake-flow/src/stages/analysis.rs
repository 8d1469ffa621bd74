//! Text-analysis stage.
//!
//! Joins transcripts with their metadata and asks the judgment black box
//! for language, category, summary, and keywords per video. The model's
//! output is plain text and is never trusted: it must parse as a JSON
//! object with exactly the expected keys and value shapes, and any
//! deviation is a retryable parse failure, re-asked with the same input a
//! bounded number of times and then recorded as a failed item.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use trendlake_core::observability::stage_span;
use trendlake_core::records::{AnalysisRecord, TranscriptRecord, VideoRecord};
use trendlake_core::{PartitionKey, Stage, VideoId};
use trendlake_lake::{ArtifactStore, ItemFailure, StageRows, WriteOptions};

use crate::error::{Error, Result};
use crate::metrics;
use crate::retry::RetryPolicy;
use crate::runner::{
    ensure_not_cancelled, with_timeout, StageInput, StageOutcome, StageRunner,
};
use crate::stages::ContentJudge;

/// The content taxonomy offered to the judgment model.
pub const DEFAULT_CATEGORIES: [&str; 20] = [
    "Dance",
    "Comedy/Skits",
    "Education/Tutorials",
    "Fitness/Workouts",
    "Beauty/Makeup",
    "Fashion/Style",
    "Food/Cooking",
    "Travel/Adventure",
    "Technology/Gadgets",
    "Motivational/Inspirational",
    "DIY/Crafts",
    "Gaming",
    "Pets/Animals",
    "Music/Singing",
    "Life Hacks",
    "Relationships/Dating",
    "Parenting/Family",
    "Memes/Trends",
    "Health/Wellness",
    "Science/Experiments",
];

/// Upper bound for the judgment summary, in characters.
pub const SUMMARY_MAX_CHARS: usize = 512;

/// Exact number of keywords a judgment must carry.
pub const KEYWORD_COUNT: usize = 5;

/// Input to the judgment black box for one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgmentRequest {
    /// Video title (empty if unknown).
    pub title: String,
    /// Video description (empty if unknown).
    pub description: String,
    /// The transcript text.
    pub transcript: String,
    /// Categories the model must choose from.
    pub categories: Vec<String>,
}

/// A validated judgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgment {
    /// Detected language, lowercase.
    pub language: String,
    /// One of the offered categories.
    pub category: String,
    /// Bounded-length summary.
    pub summary: String,
    /// Exactly [`KEYWORD_COUNT`] keywords.
    pub keywords: Vec<String>,
}

impl Judgment {
    /// Parses and validates raw model output.
    ///
    /// The output must be a JSON object with exactly the keys `language`
    /// (lowercase string), `category` (one of `categories`), `summary`
    /// (non-empty, at most [`SUMMARY_MAX_CHARS`] chars), and `keywords`
    /// (array of exactly [`KEYWORD_COUNT`] non-empty strings).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedOutput`] on any deviation.
    pub fn parse(raw: &str, categories: &[String]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| Error::malformed(format!("not valid JSON: {e}")))?;
        let object = value
            .as_object()
            .ok_or_else(|| Error::malformed("output is not a JSON object"))?;

        const EXPECTED_KEYS: [&str; 4] = ["language", "category", "summary", "keywords"];
        for key in EXPECTED_KEYS {
            if !object.contains_key(key) {
                return Err(Error::malformed(format!("missing key '{key}'")));
            }
        }
        for key in object.keys() {
            if !EXPECTED_KEYS.contains(&key.as_str()) {
                return Err(Error::malformed(format!("unexpected key '{key}'")));
            }
        }

        let language = object["language"]
            .as_str()
            .ok_or_else(|| Error::malformed("'language' is not a string"))?;
        if language.is_empty() || language != language.to_lowercase() {
            return Err(Error::malformed(format!(
                "'language' must be a non-empty lowercase string, got '{language}'"
            )));
        }

        let category = object["category"]
            .as_str()
            .ok_or_else(|| Error::malformed("'category' is not a string"))?;
        if !categories.iter().any(|c| c == category) {
            return Err(Error::malformed(format!(
                "'category' value '{category}' is not in the offered list"
            )));
        }

        let summary = object["summary"]
            .as_str()
            .ok_or_else(|| Error::malformed("'summary' is not a string"))?;
        if summary.is_empty() || summary.chars().count() > SUMMARY_MAX_CHARS {
            return Err(Error::malformed(format!(
                "'summary' must be 1..={SUMMARY_MAX_CHARS} chars, got {}",
                summary.chars().count()
            )));
        }

        let keywords = object["keywords"]
            .as_array()
            .ok_or_else(|| Error::malformed("'keywords' is not an array"))?;
        if keywords.len() != KEYWORD_COUNT {
            return Err(Error::malformed(format!(
                "'keywords' must have exactly {KEYWORD_COUNT} entries, got {}",
                keywords.len()
            )));
        }
        let keywords = keywords
            .iter()
            .map(|k| {
                k.as_str()
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .ok_or_else(|| Error::malformed("'keywords' entries must be non-empty strings"))
            })
            .collect::<Result<Vec<String>>>()?;

        Ok(Self {
            language: language.to_string(),
            category: category.to_string(),
            summary: summary.to_string(),
            keywords,
        })
    }
}

/// Stage runner for text analysis.
pub struct AnalysisStage {
    store: ArtifactStore,
    judge: Arc<dyn ContentJudge>,
    categories: Vec<String>,
    call_timeout: Duration,
    item_retry: RetryPolicy,
}

impl AnalysisStage {
    /// Default timeout for one judgment call.
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

    /// Creates the stage with the default category taxonomy.
    #[must_use]
    pub fn new(store: ArtifactStore, judge: Arc<dyn ContentJudge>) -> Self {
        Self {
            store,
            judge,
            categories: DEFAULT_CATEGORIES.iter().map(ToString::to_string).collect(),
            call_timeout: Self::DEFAULT_CALL_TIMEOUT,
            item_retry: RetryPolicy::with_max_attempts(3),
        }
    }

    /// Overrides the category taxonomy.
    #[must_use]
    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
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

    async fn judge_one(
        &self,
        transcript: &TranscriptRecord,
        text: &str,
        video: Option<&VideoRecord>,
    ) -> std::result::Result<AnalysisRecord, ItemFailure> {
        let request = JudgmentRequest {
            title: transcript.title.clone().unwrap_or_default(),
            description: transcript.description.clone().unwrap_or_default(),
            transcript: text.to_string(),
            categories: self.categories.clone(),
        };

        let mut attempt = 0_u32;
        loop {
            attempt += 1;
            let result = async {
                let raw =
                    with_timeout("judge", self.call_timeout, self.judge.judge(&request)).await?;
                Judgment::parse(&raw, &self.categories)
            }
            .await;

            match result {
                Ok(judgment) => {
                    return Ok(AnalysisRecord {
                        id: transcript.id.clone(),
                        uploader: video.and_then(|v| v.uploader.clone()),
                        description: transcript.description.clone(),
                        title: transcript.title.clone(),
                        transcript: text.to_string(),
                        language: judgment.language,
                        category: judgment.category,
                        summary: judgment.summary,
                        keywords: judgment.keywords,
                    })
                }
                Err(e) if e.is_retryable() && self.item_retry.allows_retry(attempt) => {
                    tracing::warn!(
                        video = %transcript.id,
                        attempt,
                        error = %e,
                        "judgment attempt failed, retrying with same input"
                    );
                    tokio::time::sleep(self.item_retry.delay_for(attempt)).await;
                }
                Err(e) => {
                    tracing::warn!(video = %transcript.id, attempts = attempt, error = %e, "giving up on item");
                    return Err(ItemFailure {
                        video_id: transcript.id.clone(),
                        stage: Stage::TextAnalysis,
                        error: e.to_string(),
                        attempts: attempt,
                        failed_at: Utc::now(),
                    });
                }
            }
        }
    }
}

impl std::fmt::Debug for AnalysisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisStage")
            .field("categories", &self.categories.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StageRunner for AnalysisStage {
    fn stage(&self) -> Stage {
        Stage::TextAnalysis
    }

    async fn run(
        &self,
        key: &PartitionKey,
        input: StageInput,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome> {
        let (transcripts, videos) = match input {
            StageInput::Analysis {
                transcripts,
                videos,
            } => (transcripts, videos),
            other => {
                return Err(Error::InputMismatch {
                    stage: Stage::TextAnalysis,
                    got: other.stage(),
                })
            }
        };

        let span = stage_span("run", Stage::TextAnalysis.as_label(), &key.hive_segment());
        let _guard = span.enter();
        let started = std::time::Instant::now();
        metrics::record_stage_invocation(Stage::TextAnalysis.as_label());

        if let Some(existing) = self.store.get(Stage::TextAnalysis, key).await? {
            tracing::debug!("analysis artifact already present, skipping");
            metrics::record_stage_noop(Stage::TextAnalysis.as_label());
            return Ok(StageOutcome::AlreadyExists(existing));
        }

        let by_id: HashMap<&VideoId, &VideoRecord> =
            videos.iter().map(|v| (&v.id, v)).collect();

        let mut rows = Vec::new();
        let mut failures = Vec::new();
        for transcript in &transcripts {
            ensure_not_cancelled(Stage::TextAnalysis, key, cancel)?;

            // Items that failed transcription carry no text; they were
            // already recorded upstream and are not re-failed here.
            let Some(text) = transcript.transcript.as_deref() else {
                tracing::debug!(video = %transcript.id, "no transcript text, skipping");
                continue;
            };

            match self
                .judge_one(transcript, text, by_id.get(&transcript.id).copied())
                .await
            {
                Ok(record) => rows.push(record),
                Err(failure) => failures.push(failure),
            }
        }

        ensure_not_cancelled(Stage::TextAnalysis, key, cancel)?;
        let rows = StageRows::Analysis(rows);
        let outcome = match self.store.write(key, &rows, WriteOptions::new()).await {
            Ok(artifact) => StageOutcome::Wrote(artifact),
            Err(trendlake_core::Error::ArtifactExists { .. }) => {
                metrics::record_stage_noop(Stage::TextAnalysis.as_label());
                let existing = self.store.get(Stage::TextAnalysis, key).await?.ok_or_else(
                    || trendlake_core::Error::internal("artifact vanished after conflict"),
                )?;
                return Ok(StageOutcome::AlreadyExists(existing));
            }
            Err(e) => return Err(e.into()),
        };

        metrics::record_items_failed(Stage::TextAnalysis.as_label(), failures.len() as u64);
        self.store
            .record_failures(Stage::TextAnalysis, key, &failures)
            .await?;
        metrics::record_stage_duration(Stage::TextAnalysis.as_label(), started.elapsed());
        Ok(outcome)
    }
}
