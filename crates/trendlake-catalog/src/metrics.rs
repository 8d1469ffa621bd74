//! Catalog metrics.
//!
//! Counters for partition registration outcomes. These complement the
//! structured logging already in place.

use metrics::{counter, describe_counter};

/// Partitions newly registered.
pub const PARTITIONS_REGISTERED: &str = "trendlake_partitions_registered_total";

/// Duplicate deliveries short-circuited as already registered.
pub const PARTITIONS_REPLAYED: &str = "trendlake_partitions_replayed_total";

/// Divergent-location conflicts detected.
pub const REGISTRATION_CONFLICTS: &str = "trendlake_registration_conflicts_total";

/// Registration failures (transient and terminal).
pub const REGISTRATION_FAILURES: &str = "trendlake_registration_failures_total";

/// Registers all catalog metric descriptions.
///
/// Call once at application startup after initializing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(PARTITIONS_REGISTERED, "Partitions newly registered");
    describe_counter!(
        PARTITIONS_REPLAYED,
        "Duplicate deliveries resolved as already registered"
    );
    describe_counter!(
        REGISTRATION_CONFLICTS,
        "Partition adds refused due to divergent locations"
    );
    describe_counter!(REGISTRATION_FAILURES, "Failed registration attempts");
}

/// Records a successful first registration.
pub fn record_registered(table: &str) {
    counter!(PARTITIONS_REGISTERED, "table" => table.to_string()).increment(1);
}

/// Records an idempotent replay.
pub fn record_replayed(table: &str) {
    counter!(PARTITIONS_REPLAYED, "table" => table.to_string()).increment(1);
}

/// Records a divergent-location conflict.
pub fn record_conflict(table: &str) {
    counter!(REGISTRATION_CONFLICTS, "table" => table.to_string()).increment(1);
}

/// Records a failed registration attempt.
pub fn record_failure(table: &str) {
    counter!(REGISTRATION_FAILURES, "table" => table.to_string()).increment(1);
}
