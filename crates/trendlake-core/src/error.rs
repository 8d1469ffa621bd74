//! Error types and result aliases for Trendlake.
//!
//! This module defines the shared error types used across all Trendlake
//! components. Errors carry an explicit retryability classification so
//! callers on the event path can decide between backoff and dead-lettering
//! without string matching.

/// The result type used throughout Trendlake.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Trendlake operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A path or object was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A storage operation failed (network, I/O, backend unavailability).
    ///
    /// Storage failures are treated as transient and retryable.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An artifact already exists at the target partition.
    ///
    /// This is the write-once signal, not a failure: callers re-entering an
    /// idempotent path treat it as success and reuse the existing artifact.
    #[error("artifact already exists at {path}")]
    ArtifactExists {
        /// The canonical path that is already occupied.
        path: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// Required configuration is missing or invalid.
    ///
    /// Configuration errors are fatal: the run is marked failed immediately
    /// and never retried.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
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

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the operation may succeed on retry.
    ///
    /// Only storage-class failures are transient. `ArtifactExists` is not
    /// retryable because retrying cannot change the outcome; callers handle
    /// it as the idempotent-success case instead.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn storage_error_is_retryable() {
        assert!(Error::storage("connection reset").is_retryable());
    }

    #[test]
    fn artifact_exists_is_not_retryable() {
        let err = Error::ArtifactExists {
            path: "videos/metadata/profile=alice".into(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn configuration_error_is_not_retryable() {
        assert!(!Error::configuration("missing bucket").is_retryable());
    }

    #[test]
    fn storage_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::storage_with_source("failed to read object", source);
        assert!(err.to_string().contains("storage error"));
        assert!(StdError::source(&err).is_some());
    }
}
