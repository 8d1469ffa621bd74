//! Strongly-typed identifiers for Trendlake entities.
//!
//! Event identifiers are ULIDs:
//! - **Lexicographically sortable**: ULIDs encode creation time and sort
//!   naturally in the dead-letter queue and event logs
//! - **Globally unique**: no coordination required for generation
//!
//! Video identifiers come from the upstream platform and are opaque strings;
//! they are validated, never generated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::{Error, Result};

/// A unique identifier for one emission of a stage event.
///
/// The bus may deliver the same emission more than once; consumers use the
/// event ID (or the natural (stage, partition) key) for de-duplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Ulid);

impl EventId {
    /// Generates a new unique event ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Creates an event ID from a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Returns the creation timestamp encoded in the ID.
    #[must_use]
    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        let ms = self.0.timestamp_ms();
        chrono::DateTime::from_timestamp_millis(ms as i64).unwrap_or_else(chrono::Utc::now)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| Error::InvalidId {
                message: format!("invalid event ID '{s}': {e}"),
            })
    }
}

/// A platform-assigned video identifier.
///
/// Video IDs join metadata rows to transcript and analysis rows across
/// stages. They are opaque upstream strings, validated for key safety only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    /// Maximum accepted length for a video ID.
    pub const MAX_LEN: usize = 64;

    /// Creates a validated video ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if the ID is empty, longer than
    /// [`Self::MAX_LEN`], or contains non-graphic ASCII or path separators.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.len() > Self::MAX_LEN {
            return Err(Error::InvalidId {
                message: format!("video ID must be 1..={} bytes, got {}", Self::MAX_LEN, id.len()),
            });
        }
        if !id.chars().all(|c| c.is_ascii_graphic() && c != '/') {
            return Err(Error::InvalidId {
                message: format!("video ID contains unsupported characters: {id:?}"),
            });
        }
        Ok(Self(id))
    }

    /// Returns the ID string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VideoId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
