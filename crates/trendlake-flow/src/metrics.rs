//! Orchestration metrics.
//!
//! Counters and histograms for stage execution and event dispatch.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Stage invocations, by stage.
pub const STAGE_INVOCATIONS: &str = "trendlake_stage_invocations_total";

/// Stage invocations short-circuited at the idempotency boundary.
pub const STAGE_NOOPS: &str = "trendlake_stage_noops_total";

/// Items that exhausted their retries inside a stage.
pub const ITEMS_FAILED: &str = "trendlake_items_failed_total";

/// Pipelines that reached the terminal analysis artifact.
pub const PIPELINES_COMPLETED: &str = "trendlake_pipelines_completed_total";

/// Events routed to the dead-letter channel.
pub const EVENTS_DEAD_LETTERED: &str = "trendlake_events_dead_lettered_total";

/// Handler redeliveries after a retryable failure.
pub const EVENTS_REDELIVERED: &str = "trendlake_events_redelivered_total";

/// Stage wall-clock duration.
pub const STAGE_DURATION: &str = "trendlake_stage_duration_seconds";

/// Registers all orchestration metric descriptions.
///
/// Call once at application startup after initializing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(STAGE_INVOCATIONS, "Stage invocations");
    describe_counter!(
        STAGE_NOOPS,
        "Stage invocations that found an existing artifact"
    );
    describe_counter!(ITEMS_FAILED, "Items that exhausted retries in a stage");
    describe_counter!(
        PIPELINES_COMPLETED,
        "Pipelines that reached the terminal analysis artifact"
    );
    describe_counter!(EVENTS_DEAD_LETTERED, "Events routed to the dead-letter channel");
    describe_counter!(EVENTS_REDELIVERED, "Event redeliveries after retryable failures");
    describe_histogram!(STAGE_DURATION, "Stage wall-clock duration in seconds");
}

/// Records a stage invocation.
pub fn record_stage_invocation(stage: &str) {
    counter!(STAGE_INVOCATIONS, "stage" => stage.to_string()).increment(1);
}

/// Records an idempotent stage no-op.
pub fn record_stage_noop(stage: &str) {
    counter!(STAGE_NOOPS, "stage" => stage.to_string()).increment(1);
}

/// Records items that exhausted retries.
pub fn record_items_failed(stage: &str, count: u64) {
    if count > 0 {
        counter!(ITEMS_FAILED, "stage" => stage.to_string()).increment(count);
    }
}

/// Records a completed pipeline.
pub fn record_pipeline_completed() {
    counter!(PIPELINES_COMPLETED).increment(1);
}

/// Records a dead-lettered event.
pub fn record_dead_letter(handler: &str) {
    counter!(EVENTS_DEAD_LETTERED, "handler" => handler.to_string()).increment(1);
}

/// Records an event redelivery.
pub fn record_redelivery(handler: &str) {
    counter!(EVENTS_REDELIVERED, "handler" => handler.to_string()).increment(1);
}

/// Records stage duration.
pub fn record_stage_duration(stage: &str, duration: Duration) {
    histogram!(STAGE_DURATION, "stage" => stage.to_string()).record(duration.as_secs_f64());
}
