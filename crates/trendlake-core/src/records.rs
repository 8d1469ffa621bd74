//! Row types for the lake tables.
//!
//! These structs are the contract between the stage runners, the Parquet
//! codec, and the catalog table definitions. Column sets match the external
//! `metadata` and `text_analysis` tables; transcripts are an intermediate
//! handoff schema. Keep changes backwards-compatible; the SQL engine reads
//! these columns directly.

use serde::{Deserialize, Serialize};

use crate::id::VideoId;

/// Row stored in metadata artifacts (`metadata` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    /// Platform video ID.
    pub id: VideoId,
    /// Video title.
    pub title: Option<String>,
    /// Video description.
    pub description: Option<String>,
    /// Upload date (ms since epoch).
    pub upload_date: i64,
    /// Like count at extraction time.
    pub like_count: i64,
    /// Repost count at extraction time.
    pub repost_count: i64,
    /// Comment count at extraction time.
    pub comment_count: i64,
    /// View count at extraction time.
    pub view_count: i64,
    /// Duration in seconds.
    pub duration: i64,
    /// Canonical watch URL.
    pub webpage_url: String,
    /// Channel name.
    pub channel: Option<String>,
    /// Publish timestamp (seconds since epoch).
    pub timestamp: i64,
    /// Original sound name.
    pub track: Option<String>,
    /// Credited artists.
    #[serde(default)]
    pub artists: Vec<String>,
    /// Main artist.
    pub artist: Option<String>,
    /// Uploader handle.
    pub uploader: Option<String>,
}

/// Row stored in transcript artifacts.
///
/// `transcript` is nullable: transcription can fail per item and a null
/// transcript must not block sibling rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    /// Platform video ID.
    pub id: VideoId,
    /// Video title (carried from metadata).
    pub title: Option<String>,
    /// Video description (carried from metadata).
    pub description: Option<String>,
    /// Transcribed speech, if transcription succeeded.
    pub transcript: Option<String>,
}

/// Row stored in text-analysis artifacts (`text_analysis` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Platform video ID.
    pub id: VideoId,
    /// Uploader handle.
    pub uploader: Option<String>,
    /// Video description.
    pub description: Option<String>,
    /// Video title.
    pub title: Option<String>,
    /// Transcript the judgment was made from.
    pub transcript: String,
    /// Detected language (lowercase).
    pub language: String,
    /// Assigned content category (one of the configured taxonomy).
    pub category: String,
    /// Bounded-length content summary.
    pub summary: String,
    /// Exactly five keywords.
    pub keywords: Vec<String>,
}
