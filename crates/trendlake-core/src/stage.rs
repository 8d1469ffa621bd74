//! Pipeline stages and their storage/catalog mapping.
//!
//! The pipeline is a fixed three-stage chain. Each stage owns one folder in
//! the lake; the first and last stages additionally own a catalog table.
//! Transcripts are an intermediate handoff between the GPU and text tiers
//! and are never registered with the catalog.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One processing stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Profile metadata extraction.
    Metadata,
    /// Audio transcription.
    Transcripts,
    /// Language/category/summary/keyword judgment over transcripts.
    TextAnalysis,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Self; 3] = [Self::Metadata, Self::Transcripts, Self::TextAnalysis];

    /// Returns the stage folder under the lake root.
    #[must_use]
    pub const fn folder(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Transcripts => "transcripts",
            Self::TextAnalysis => "text",
        }
    }

    /// Returns the artifact file name written into a partition directory.
    #[must_use]
    pub const fn artifact_file_name(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata.parquet",
            Self::Transcripts => "transcripts.parquet",
            Self::TextAnalysis => "analysis.parquet",
        }
    }

    /// Returns the catalog table fed by this stage, if any.
    ///
    /// Transcript artifacts are intermediate and have no table.
    #[must_use]
    pub const fn table(&self) -> Option<&'static str> {
        match self {
            Self::Metadata => Some("metadata"),
            Self::Transcripts => None,
            Self::TextAnalysis => Some("text_analysis"),
        }
    }

    /// Returns the stage triggered by this stage's completion, if any.
    #[must_use]
    pub const fn next(&self) -> Option<Self> {
        match self {
            Self::Metadata => Some(Self::Transcripts),
            Self::Transcripts => Some(Self::TextAnalysis),
            Self::TextAnalysis => None,
        }
    }

    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Transcripts => "transcripts",
            Self::TextAnalysis => "text_analysis",
        }
    }

    /// Resolves a stage from its lake folder name.
    #[must_use]
    pub fn from_folder(folder: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.folder() == folder)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
