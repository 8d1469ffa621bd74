//! Error types for the orchestration domain.

use trendlake_core::Stage;

/// The result type used throughout trendlake-flow.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in orchestration operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A black-box call exceeded its per-call timeout.
    ///
    /// Retryable: timeouts are transient by definition.
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The configured timeout in seconds.
        seconds: u64,
    },

    /// Black-box output failed schema validation.
    ///
    /// Retried a bounded number of times with the same input at the item
    /// level; if still malformed the item is recorded as failed and
    /// excluded from the artifact.
    #[error("malformed black-box output: {message}")]
    MalformedOutput {
        /// What made the output invalid.
        message: String,
    },

    /// The invocation was cancelled by the operator.
    ///
    /// Never retried automatically; no canonical artifact is written.
    #[error("stage {stage} cancelled for {partition}")]
    Cancelled {
        /// The stage that was cancelled.
        stage: Stage,
        /// The partition being processed.
        partition: String,
    },

    /// A stage runner was invoked with input for a different stage.
    #[error("stage {stage} received {got} input")]
    InputMismatch {
        /// The runner's stage.
        stage: Stage,
        /// The stage the input belongs to.
        got: Stage,
    },

    /// A bus operation failed.
    #[error("bus error: {message}")]
    Bus {
        /// Description of the bus failure.
        message: String,
    },

    /// Required configuration is missing or invalid.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// An error from the catalog.
    #[error("catalog error: {0}")]
    Catalog(#[from] trendlake_catalog::CatalogError),

    /// An error from trendlake-core (storage, serialization, validation).
    #[error("core error: {0}")]
    Core(#[from] trendlake_core::Error),
}

impl Error {
    /// Creates a new bus error.
    #[must_use]
    pub fn bus(message: impl Into<String>) -> Self {
        Self::Bus {
            message: message.into(),
        }
    }

    /// Creates a new malformed-output error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedOutput {
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns true if the operation may succeed on retry.
    ///
    /// The bus uses this to decide between redelivery-with-backoff and the
    /// dead-letter channel.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::MalformedOutput { .. } => true,
            Self::Catalog(e) => e.is_retryable(),
            // NotFound on the event path usually means the event outran the
            // artifact's visibility on an eventually consistent store, so
            // redelivery (bounded by the bus) is the right response.
            Self::Core(e) => matches!(e, trendlake_core::Error::NotFound(_)) || e.is_retryable(),
            Self::Cancelled { .. }
            | Self::InputMismatch { .. }
            | Self::Bus { .. }
            | Self::Configuration { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_retryable() {
        let err = Error::Timeout {
            operation: "transcribe".into(),
            seconds: 30,
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("transcribe"));
    }

    #[test]
    fn cancellation_is_terminal() {
        let err = Error::Cancelled {
            stage: Stage::Transcripts,
            partition: "profile=alice".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn catalog_retryability_passes_through() {
        let transient: Error = trendlake_catalog::CatalogError::unavailable("502").into();
        assert!(transient.is_retryable());

        let conflict: Error = trendlake_catalog::CatalogError::UnknownTable {
            table: "nope".into(),
        }
        .into();
        assert!(!conflict.is_retryable());
    }
}
