//! Error types for trendlake-catalog operations.

use thiserror::Error;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog service is temporarily unreachable.
    ///
    /// Retryable: the registrar backs off and tries again.
    #[error("catalog unavailable: {message}")]
    Unavailable {
        /// Description of the outage.
        message: String,
    },

    /// The target table does not exist in the catalog.
    #[error("unknown table: {table}")]
    UnknownTable {
        /// The table that was addressed.
        table: String,
    },

    /// The artifact schema is incompatible with the catalog table.
    ///
    /// Non-retryable: escalates to the dead-letter path and blocks only the
    /// affected partition.
    #[error("schema mismatch for table {table}: {message}")]
    SchemaMismatch {
        /// The table the artifact was registered against.
        table: String,
        /// Description of the incompatibility.
        message: String,
    },

    /// A partition key is already registered under a different location.
    ///
    /// Write-once artifacts make this unreachable in a healthy system;
    /// reaching it means an invariant broke, so it is non-retryable and
    /// loud.
    #[error(
        "partition {partition} of table {table} already registered at {existing_location}, refusing {attempted_location}"
    )]
    PartitionConflict {
        /// The table the partition belongs to.
        table: String,
        /// The canonical partition segment.
        partition: String,
        /// The location already in the catalog.
        existing_location: String,
        /// The location the caller attempted to register.
        attempted_location: String,
    },

    /// An error from trendlake-core.
    #[error("core error: {0}")]
    Core(#[from] trendlake_core::Error),
}

impl CatalogError {
    /// Creates a new unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Returns true if the operation may succeed on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::Core(e) => e.is_retryable(),
            Self::UnknownTable { .. }
            | Self::SchemaMismatch { .. }
            | Self::PartitionConflict { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_classification() {
        assert!(CatalogError::unavailable("502").is_retryable());
        assert!(!CatalogError::UnknownTable {
            table: "missing".into()
        }
        .is_retryable());
        assert!(!CatalogError::SchemaMismatch {
            table: "metadata".into(),
            message: "column drift".into()
        }
        .is_retryable());
    }

    #[test]
    fn conflict_names_both_locations() {
        let err = CatalogError::PartitionConflict {
            table: "metadata".into(),
            partition: "profile=alice/processed_at=20250209T110228Z".into(),
            existing_location: "videos/metadata/a".into(),
            attempted_location: "videos/metadata/b".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("videos/metadata/a"));
        assert!(msg.contains("videos/metadata/b"));
    }
}
