//! Partition keys with deterministic Hive-style encoding.
//!
//! Every artifact in the lake is keyed by `(profile, processed_at)`. The
//! canonical path segment is:
//!
//! ```text
//! profile=<handle>/processed_at=<YYYYMMDDTHHMMSSZ>
//! ```
//!
//! The timestamp uses basic ISO 8601 (UTC, second precision) so partition
//! values are object-key and URL safe and sort chronologically when compared
//! as strings. The encoding round-trips: `PartitionKey::parse_segment`
//! inverts `PartitionKey::hive_segment`.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Timestamp layout for partition values (basic ISO 8601, UTC).
const PROCESSED_AT_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// A validated social-video profile handle.
///
/// Handles are restricted to characters that are safe in object keys and
/// Hive partition values, so no escaping layer is needed anywhere downstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile(String);

impl Profile {
    /// Maximum accepted handle length.
    pub const MAX_LEN: usize = 64;

    /// Creates a validated profile handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the handle is empty, longer than
    /// [`Self::MAX_LEN`], starts with a dot, or contains characters outside
    /// `[A-Za-z0-9._]`.
    pub fn new(handle: impl Into<String>) -> Result<Self> {
        let handle = handle.into();
        if handle.is_empty() || handle.len() > Self::MAX_LEN {
            return Err(Error::InvalidInput(format!(
                "profile handle must be 1..={} bytes, got {}",
                Self::MAX_LEN,
                handle.len()
            )));
        }
        if handle.starts_with('.') {
            return Err(Error::InvalidInput(format!(
                "profile handle must not start with '.': {handle}"
            )));
        }
        if !handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            return Err(Error::InvalidInput(format!(
                "profile handle contains unsupported characters: {handle:?}"
            )));
        }
        Ok(Self(handle))
    }

    /// Returns the handle string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Profile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// The run timestamp shared by all three stages of one profile run.
///
/// Assigned once when metadata extraction starts and carried through every
/// downstream artifact so outputs from the same run share a partition key.
/// Truncated to second precision to match the partition-value layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessedAt(DateTime<Utc>);

impl ProcessedAt {
    /// Creates a run timestamp, truncating to second precision.
    #[must_use]
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at.trunc_subsecs(0))
    }

    /// Creates a run timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    /// Returns the underlying UTC timestamp.
    #[must_use]
    pub const fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Returns the canonical partition value (`YYYYMMDDTHHMMSSZ`).
    #[must_use]
    pub fn as_partition_value(&self) -> String {
        self.0.format(PROCESSED_AT_FORMAT).to_string()
    }

    /// Parses a canonical partition value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the value is not in the
    /// `YYYYMMDDTHHMMSSZ` layout.
    pub fn parse(value: &str) -> Result<Self> {
        let naive = NaiveDateTime::parse_from_str(value, PROCESSED_AT_FORMAT).map_err(|e| {
            Error::InvalidInput(format!("invalid processed_at value '{value}': {e}"))
        })?;
        Ok(Self(naive.and_utc()))
    }
}

impl fmt::Display for ProcessedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_partition_value())
    }
}

impl FromStr for ProcessedAt {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ProcessedAt {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_partition_value())
    }
}

impl<'de> Deserialize<'de> for ProcessedAt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// The `(profile, processed_at)` pair identifying one run's artifacts
/// across all stages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionKey {
    profile: Profile,
    processed_at: ProcessedAt,
}

impl PartitionKey {
    /// Creates a partition key.
    #[must_use]
    pub const fn new(profile: Profile, processed_at: ProcessedAt) -> Self {
        Self {
            profile,
            processed_at,
        }
    }

    /// Returns the profile dimension.
    #[must_use]
    pub const fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Returns the run-timestamp dimension.
    #[must_use]
    pub const fn processed_at(&self) -> ProcessedAt {
        self.processed_at
    }

    /// Returns the canonical Hive-style path segment.
    ///
    /// Deterministic: the same logical key always produces the same segment.
    #[must_use]
    pub fn hive_segment(&self) -> String {
        format!(
            "profile={}/processed_at={}",
            self.profile,
            self.processed_at.as_partition_value()
        )
    }

    /// Parses a canonical path segment back into a key.
    ///
    /// This is the inverse of [`Self::hive_segment`]. Round-trip property:
    /// `PartitionKey::parse_segment(&key.hive_segment()) == Ok(key)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the segment is malformed.
    pub fn parse_segment(segment: &str) -> Result<Self> {
        let mut parts = segment.splitn(2, '/');
        let profile_part = parts.next().unwrap_or_default();
        let processed_part = parts.next().ok_or_else(|| {
            Error::InvalidInput(format!("partition segment missing '/': {segment}"))
        })?;

        let profile = profile_part
            .strip_prefix("profile=")
            .ok_or_else(|| {
                Error::InvalidInput(format!("expected 'profile=' prefix in: {profile_part}"))
            })
            .and_then(Profile::new)?;
        let processed_at = processed_part
            .strip_prefix("processed_at=")
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "expected 'processed_at=' prefix in: {processed_part}"
                ))
            })
            .and_then(ProcessedAt::parse)?;

        Ok(Self {
            profile,
            processed_at,
        })
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hive_segment())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    fn key(profile: &str, ts: &str) -> PartitionKey {
        PartitionKey::new(
            Profile::new(profile).unwrap(),
            ProcessedAt::parse(ts).unwrap(),
        )
    }

    #[test]
    fn hive_segment_layout() {
        let k = key("alice", "20250209T110228Z");
        assert_eq!(
            k.hive_segment(),
            "profile=alice/processed_at=20250209T110228Z"
        );
    }

    #[test]
    fn segment_roundtrip() {
        let k = key("noonessafe_pranks", "20250209T110228Z");
        let parsed = PartitionKey::parse_segment(&k.hive_segment()).expect("should parse");
        assert_eq!(k, parsed);
    }

    #[test]
    fn processed_at_truncates_subseconds() {
        let at = Utc.with_ymd_and_hms(2025, 2, 9, 11, 2, 28).unwrap()
            + chrono::Duration::milliseconds(750);
        let processed = ProcessedAt::new(at);
        assert_eq!(processed.as_partition_value(), "20250209T110228Z");
    }

    #[test]
    fn processed_at_sorts_chronologically_as_string() {
        let earlier = ProcessedAt::parse("20250209T110228Z").unwrap();
        let later = ProcessedAt::parse("20250210T090000Z").unwrap();
        assert!(earlier < later);
        assert!(earlier.as_partition_value() < later.as_partition_value());
    }

    #[test]
    fn profile_validation() {
        assert!(Profile::new("alice").is_ok());
        assert!(Profile::new("user.name_99").is_ok());
        assert!(Profile::new("").is_err());
        assert!(Profile::new(".hidden").is_err());
        assert!(Profile::new("has space").is_err());
        assert!(Profile::new("slash/y").is_err());
        assert!(Profile::new("x".repeat(65)).is_err());
    }

    #[test]
    fn parse_segment_rejects_malformed() {
        assert!(PartitionKey::parse_segment("profile=alice").is_err());
        assert!(PartitionKey::parse_segment("alice/processed_at=20250209T110228Z").is_err());
        assert!(PartitionKey::parse_segment("profile=alice/processed_at=2025-02-09").is_err());
    }

    #[test]
    fn processed_at_serde_uses_partition_value() {
        let k = ProcessedAt::parse("20250209T110228Z").unwrap();
        let json = serde_json::to_string(&k).unwrap();
        assert_eq!(json, "\"20250209T110228Z\"");
        let back: ProcessedAt = serde_json::from_str(&json).unwrap();
        assert_eq!(back, k);
    }
}
