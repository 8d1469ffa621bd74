//! The partition registrar.
//!
//! Consumes artifact-written events and registers the partition with the
//! catalog so it becomes immediately queryable. Registration must be safe
//! under the bus's at-least-once delivery: any number of duplicate
//! deliveries for the same key converge on exactly one catalog entry.
//!
//! Retry policy lives one layer up: transient catalog errors surface as
//! retryable and the bus redelivers with backoff; non-retryable errors
//! (schema mismatch, divergent location) go straight to the dead-letter
//! channel and block only the affected partition.

use std::sync::Arc;

use trendlake_core::observability::registrar_span;
use trendlake_core::StageEvent;

use crate::catalog::{AddOutcome, Catalog};
use crate::error::{CatalogError, Result};
use crate::metrics;

/// Outcome of processing one artifact event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The partition was registered by this delivery.
    Registered {
        /// The catalog table the partition was added to.
        table: String,
    },
    /// The partition was already registered; this delivery was a no-op.
    AlreadyRegistered {
        /// The catalog table holding the partition.
        table: String,
    },
    /// The event's stage feeds no catalog table (transcripts).
    NotCatalogued,
}

/// Registers artifact partitions with the catalog.
#[derive(Clone)]
pub struct PartitionRegistrar {
    catalog: Arc<dyn Catalog>,
}

impl std::fmt::Debug for PartitionRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionRegistrar").finish_non_exhaustive()
    }
}

impl PartitionRegistrar {
    /// Creates a registrar over the given catalog.
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// Processes one artifact-written event.
    ///
    /// Idempotent: safe to call any number of times with the same event or
    /// with distinct emissions for the same `(stage, partition)`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Unavailable`] (retryable) on transient
    /// catalog failure, [`CatalogError::PartitionConflict`] (non-retryable)
    /// if the key is already registered under a different location.
    pub async fn on_artifact_event(&self, event: &StageEvent) -> Result<RegistrationOutcome> {
        let Some(table) = event.stage.table() else {
            tracing::debug!(
                stage = %event.stage,
                partition = %event.partition_key,
                "stage feeds no catalog table, skipping"
            );
            return Ok(RegistrationOutcome::NotCatalogued);
        };

        let span = registrar_span("add_partition", table, &event.partition_key.hive_segment());
        let _guard = span.enter();

        // Idempotent short-circuit before issuing a write.
        if let Some(existing) = self
            .catalog
            .get_partition(table, &event.partition_key)
            .await
            .inspect_err(|_| metrics::record_failure(table))?
        {
            return self.resolve_existing(table, event, &existing.location);
        }

        let outcome = self
            .catalog
            .add_partition(table, &event.partition_key, &event.location)
            .await
            .inspect_err(|_| metrics::record_failure(table))?;

        match outcome {
            AddOutcome::Added => {
                tracing::info!(location = %event.location, "partition registered");
                metrics::record_registered(table);
                Ok(RegistrationOutcome::Registered {
                    table: table.to_string(),
                })
            }
            // Lost the race to a concurrent delivery; the winner's
            // registration describes the same write-once artifact.
            AddOutcome::AlreadyExists { existing_location } => {
                self.resolve_existing(table, event, &existing_location)
            }
        }
    }

    fn resolve_existing(
        &self,
        table: &str,
        event: &StageEvent,
        existing_location: &str,
    ) -> Result<RegistrationOutcome> {
        if existing_location == event.location {
            tracing::debug!(partition = %event.partition_key, "already registered");
            metrics::record_replayed(table);
            return Ok(RegistrationOutcome::AlreadyRegistered {
                table: table.to_string(),
            });
        }

        tracing::error!(
            partition = %event.partition_key,
            existing = %existing_location,
            attempted = %event.location,
            "divergent partition registration"
        );
        metrics::record_conflict(table);
        Err(CatalogError::PartitionConflict {
            table: table.to_string(),
            partition: event.partition_key.hive_segment(),
            existing_location: existing_location.to_string(),
            attempted_location: event.location.to_string(),
        })
    }
}
