//! Stage events carried on the notification bus.
//!
//! One artifact write emits exactly one [`StageEvent`], but the bus may
//! deliver it more than once. Consumers de-duplicate on `event_id`, or on
//! the natural `(stage, partition)` key, since within a stage a partition
//! key is written at most once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::EventId;
use crate::partition::PartitionKey;
use crate::stage::Stage;

/// An "artifact written" notification.
///
/// Serialized payload is flat: `{eventId, stage, profile, processedAt,
/// location, recordCount, emittedAt}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageEvent {
    /// Unique per emission; the de-duplication key.
    pub event_id: EventId,
    /// The stage that completed.
    pub stage: Stage,
    /// Partition the artifact was written under.
    #[serde(flatten)]
    pub partition_key: PartitionKey,
    /// Canonical artifact location under the lake root.
    pub location: String,
    /// Rows in the artifact. Zero is valid (vacuous completion).
    pub record_count: u64,
    /// When the event was emitted.
    pub emitted_at: DateTime<Utc>,
}

impl StageEvent {
    /// Creates an event for a freshly written artifact.
    #[must_use]
    pub fn new(
        stage: Stage,
        partition_key: PartitionKey,
        location: impl Into<String>,
        record_count: u64,
    ) -> Self {
        Self {
            event_id: EventId::generate(),
            stage,
            partition_key,
            location: location.into(),
            record_count,
            emitted_at: Utc::now(),
        }
    }

    /// Returns the natural idempotency key `(stage, partition)`.
    ///
    /// Stable across re-emissions of the same logical completion, unlike
    /// `event_id`.
    #[must_use]
    pub fn natural_key(&self) -> String {
        format!("{}/{}", self.stage, self.partition_key.hive_segment())
    }
}
