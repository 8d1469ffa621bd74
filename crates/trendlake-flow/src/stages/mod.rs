//! Concrete stage runners and the black-box collaborator traits.
//!
//! The expensive parts of every stage (scraping a profile, pulling audio,
//! speech-to-text, the judgment model) live behind traits. The runners own
//! everything around those calls: idempotency, per-item isolation and
//! retries, timeouts, cancellation, output validation, and artifact
//! writing.

mod analysis;
mod metadata;
mod transcription;

pub use analysis::{AnalysisStage, Judgment, JudgmentRequest, DEFAULT_CATEGORIES};
pub use metadata::MetadataStage;
pub use transcription::TranscriptionStage;

use async_trait::async_trait;
use bytes::Bytes;

use trendlake_core::records::VideoRecord;
use trendlake_core::{Profile, VideoId};

use crate::error::Result;

/// Access to the social-video platform.
///
/// Implementations wrap the scraping/download tooling; per-call failures
/// must surface as errors, never panics.
#[async_trait]
pub trait MediaGateway: Send + Sync {
    /// Lists all public videos of a profile with their metadata.
    ///
    /// An empty vec is a valid answer (private or empty profile).
    ///
    /// # Errors
    ///
    /// Returns a retryable error on network failure.
    async fn profile_videos(&self, profile: &Profile) -> Result<Vec<VideoRecord>>;

    /// Downloads the audio track of one video.
    ///
    /// # Errors
    ///
    /// Returns a retryable error on network failure, a terminal error if
    /// the video has no audio.
    async fn fetch_audio(&self, profile: &Profile, video: &VideoId) -> Result<Bytes>;
}

/// Speech-to-text black box: audio bytes in, transcript text out.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribes one audio payload.
    ///
    /// # Errors
    ///
    /// Returns a retryable error on inference failure.
    async fn transcribe(&self, audio: Bytes) -> Result<String>;
}

/// Content-judgment black box.
///
/// Returns raw text that is *never* trusted: the analysis stage validates
/// it against the expected JSON shape and treats any deviation as a
/// retryable parse failure.
#[async_trait]
pub trait ContentJudge: Send + Sync {
    /// Produces a raw judgment for one video's text.
    ///
    /// # Errors
    ///
    /// Returns a retryable error on model failure.
    async fn judge(&self, request: &JudgmentRequest) -> Result<String>;
}
