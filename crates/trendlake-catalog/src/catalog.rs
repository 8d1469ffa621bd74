//! The catalog abstraction and its in-memory implementation.
//!
//! The real catalog is an external transactional metadata service reached
//! through this trait. The surface is intentionally narrow: the pipeline
//! only ever adds partitions idempotently, reads them back, and (for
//! operator tooling) drops them. Nothing here assumes in-process shared
//! memory; [`MemoryCatalog`] exists for tests and the CLI's local mode.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use trendlake_core::PartitionKey;

use crate::error::{CatalogError, Result};
use crate::tables::TableDef;

/// One registered partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionEntry {
    /// Owning table.
    pub table: String,
    /// The partition key.
    pub partition_key: PartitionKey,
    /// Physical location of the partition's data.
    pub location: String,
    /// When the partition was first registered.
    pub registered_at: DateTime<Utc>,
}

/// Result of an idempotent partition add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// The partition was newly registered.
    Added,
    /// A partition was already registered under this key.
    ///
    /// Carries the existing location so callers can distinguish a benign
    /// duplicate from a divergent registration.
    AlreadyExists {
        /// Location already recorded in the catalog.
        existing_location: String,
    },
}

impl AddOutcome {
    /// Returns true if this call created the registration.
    #[must_use]
    pub const fn is_added(&self) -> bool {
        matches!(self, Self::Added)
    }
}

/// Narrow idempotent-upsert interface over the external catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Registers a partition if absent.
    ///
    /// Never fails on a duplicate key: concurrent duplicate adds converge
    /// on `AlreadyExists` with the first writer's location.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownTable`] for an unregistered table,
    /// [`CatalogError::Unavailable`] on transient service failure.
    async fn add_partition(
        &self,
        table: &str,
        key: &PartitionKey,
        location: &str,
    ) -> Result<AddOutcome>;

    /// Looks up a partition registration.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownTable`] for an unregistered table,
    /// [`CatalogError::Unavailable`] on transient service failure.
    async fn get_partition(&self, table: &str, key: &PartitionKey)
        -> Result<Option<PartitionEntry>>;

    /// Lists all partitions of a table in key order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownTable`] for an unregistered table,
    /// [`CatalogError::Unavailable`] on transient service failure.
    async fn list_partitions(&self, table: &str) -> Result<Vec<PartitionEntry>>;

    /// Removes a partition registration. Returns true if one was removed.
    ///
    /// Catalog-only: the underlying artifact stays immutable in the lake.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownTable`] for an unregistered table,
    /// [`CatalogError::Unavailable`] on transient service failure.
    async fn drop_partition(&self, table: &str, key: &PartitionKey) -> Result<bool>;

    /// Returns a table definition by name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Unavailable`] on transient service failure.
    async fn table_def(&self, table: &str) -> Result<Option<TableDef>>;
}

#[derive(Debug, Default)]
struct CatalogState {
    // table name -> (canonical partition segment -> entry); BTreeMap keeps
    // listings in key order.
    partitions: HashMap<String, BTreeMap<String, PartitionEntry>>,
}

/// In-memory catalog for tests and local runs.
#[derive(Debug)]
pub struct MemoryCatalog {
    tables: HashMap<String, TableDef>,
    state: RwLock<CatalogState>,
}

impl MemoryCatalog {
    /// Creates a catalog holding the built-in Trendlake tables.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tables(TableDef::builtin())
    }

    /// Creates a catalog holding the given tables.
    #[must_use]
    pub fn with_tables(tables: Vec<TableDef>) -> Self {
        Self {
            tables: tables.into_iter().map(|t| (t.name.clone(), t)).collect(),
            state: RwLock::new(CatalogState::default()),
        }
    }

    fn check_table(&self, table: &str) -> Result<()> {
        if self.tables.contains_key(table) {
            Ok(())
        } else {
            Err(CatalogError::UnknownTable {
                table: table.to_string(),
            })
        }
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> CatalogError {
    CatalogError::unavailable("catalog lock poisoned")
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn add_partition(
        &self,
        table: &str,
        key: &PartitionKey,
        location: &str,
    ) -> Result<AddOutcome> {
        self.check_table(table)?;
        let mut state = self.state.write().map_err(|_| poisoned())?;
        let partitions = state.partitions.entry(table.to_string()).or_default();

        if let Some(existing) = partitions.get(&key.hive_segment()) {
            return Ok(AddOutcome::AlreadyExists {
                existing_location: existing.location.clone(),
            });
        }

        partitions.insert(
            key.hive_segment(),
            PartitionEntry {
                table: table.to_string(),
                partition_key: key.clone(),
                location: location.to_string(),
                registered_at: Utc::now(),
            },
        );
        drop(state);
        Ok(AddOutcome::Added)
    }

    async fn get_partition(
        &self,
        table: &str,
        key: &PartitionKey,
    ) -> Result<Option<PartitionEntry>> {
        self.check_table(table)?;
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .partitions
            .get(table)
            .and_then(|partitions| partitions.get(&key.hive_segment()).cloned()))
    }

    async fn list_partitions(&self, table: &str) -> Result<Vec<PartitionEntry>> {
        self.check_table(table)?;
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .partitions
            .get(table)
            .map(|partitions| partitions.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn drop_partition(&self, table: &str, key: &PartitionKey) -> Result<bool> {
        self.check_table(table)?;
        let mut state = self.state.write().map_err(|_| poisoned())?;
        Ok(state
            .partitions
            .get_mut(table)
            .is_some_and(|partitions| partitions.remove(&key.hive_segment()).is_some()))
    }

    async fn table_def(&self, table: &str) -> Result<Option<TableDef>> {
        Ok(self.tables.get(table).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trendlake_core::{ProcessedAt, Profile};

    fn key(profile: &str, ts: &str) -> PartitionKey {
        PartitionKey::new(
            Profile::new(profile).unwrap(),
            ProcessedAt::parse(ts).unwrap(),
        )
    }

    #[tokio::test]
    async fn add_is_idempotent_and_first_wins() {
        let catalog = MemoryCatalog::new();
        let key = key("alice", "20250209T110228Z");

        let first = catalog
            .add_partition("metadata", &key, "videos/metadata/a")
            .await
            .unwrap();
        assert!(first.is_added());

        let second = catalog
            .add_partition("metadata", &key, "videos/metadata/b")
            .await
            .unwrap();
        assert_eq!(
            second,
            AddOutcome::AlreadyExists {
                existing_location: "videos/metadata/a".into()
            }
        );

        let entry = catalog
            .get_partition("metadata", &key)
            .await
            .unwrap()
            .expect("registered");
        assert_eq!(entry.location, "videos/metadata/a");
    }

    #[tokio::test]
    async fn unknown_table_is_rejected() {
        let catalog = MemoryCatalog::new();
        let result = catalog
            .add_partition("transcripts", &key("alice", "20250209T110228Z"), "loc")
            .await;
        assert!(matches!(result, Err(CatalogError::UnknownTable { .. })));
    }

    #[tokio::test]
    async fn list_is_in_key_order() {
        let catalog = MemoryCatalog::new();
        for (profile, ts) in [
            ("zoe", "20250209T110228Z"),
            ("alice", "20250210T000000Z"),
            ("alice", "20250209T110228Z"),
        ] {
            catalog
                .add_partition("metadata", &key(profile, ts), "loc")
                .await
                .unwrap();
        }

        let listed = catalog.list_partitions("metadata").await.unwrap();
        let segments: Vec<String> = listed
            .iter()
            .map(|e| e.partition_key.hive_segment())
            .collect();
        let mut sorted = segments.clone();
        sorted.sort();
        assert_eq!(segments, sorted);
        assert_eq!(listed.len(), 3);
    }

    #[tokio::test]
    async fn drop_partition_removes_only_catalog_entry() {
        let catalog = MemoryCatalog::new();
        let key = key("alice", "20250209T110228Z");
        catalog
            .add_partition("metadata", &key, "loc")
            .await
            .unwrap();

        assert!(catalog.drop_partition("metadata", &key).await.unwrap());
        assert!(!catalog.drop_partition("metadata", &key).await.unwrap());
        assert!(catalog
            .get_partition("metadata", &key)
            .await
            .unwrap()
            .is_none());
    }
}
