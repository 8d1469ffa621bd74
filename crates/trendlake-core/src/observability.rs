//! Observability infrastructure for Trendlake.
//!
//! Structured logging with consistent spans across all components. This
//! module provides initialization helpers and span constructors so every
//! stage invocation and registration carries the same fields.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `trendlake_flow=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for one stage invocation over one partition.
#[must_use]
pub fn stage_span(operation: &str, stage: &str, partition: &str) -> Span {
    tracing::info_span!(
        "stage",
        op = operation,
        stage = stage,
        partition = partition,
    )
}

/// Creates a span for catalog registration operations.
#[must_use]
pub fn registrar_span(operation: &str, table: &str, partition: &str) -> Span {
    tracing::info_span!(
        "registrar",
        op = operation,
        table = table,
        partition = partition,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty); // Second call should be no-op
    }

    #[test]
    fn span_helpers_create_spans() {
        let span = stage_span("run", "metadata", "profile=alice");
        let _guard = span.enter();
        tracing::info!("test message in span");
    }
}
