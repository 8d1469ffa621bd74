//! Catalog implementation persisted in object storage.
//!
//! Keeps one JSON document per table under `_catalog/tables/<table>.json`.
//! This backs the operator CLI and local runs, where the external metadata
//! service is not available; the document layout is trivial to inspect and
//! survives process restarts.
//!
//! Single-writer only: updates are read-modify-write without compare-and-
//! swap, so concurrent registrars must use a transactional catalog service
//! behind the same [`Catalog`] trait instead.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use trendlake_core::storage::{StorageBackend, WritePrecondition};
use trendlake_core::{Error as CoreError, PartitionKey};

use crate::catalog::{AddOutcome, Catalog, PartitionEntry};
use crate::error::{CatalogError, Result};
use crate::tables::TableDef;

/// Root prefix for catalog documents.
const CATALOG_PREFIX: &str = "_catalog/tables";

/// Object-storage-backed catalog for operator tooling and local runs.
#[derive(Clone)]
pub struct StorageCatalog {
    backend: Arc<dyn StorageBackend>,
    tables: HashMap<String, TableDef>,
}

impl std::fmt::Debug for StorageCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageCatalog").finish_non_exhaustive()
    }
}

impl StorageCatalog {
    /// Creates a catalog over the given backend with the built-in tables.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            tables: TableDef::builtin()
                .into_iter()
                .map(|t| (t.name.clone(), t))
                .collect(),
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

    fn document_path(table: &str) -> String {
        format!("{CATALOG_PREFIX}/{table}.json")
    }

    async fn load(&self, table: &str) -> Result<Vec<PartitionEntry>> {
        match self.backend.get(&Self::document_path(table)).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                CatalogError::Core(CoreError::serialization(format!(
                    "corrupt catalog document for {table}: {e}"
                )))
            }),
            Err(CoreError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(CatalogError::unavailable(format!(
                "failed to read catalog document for {table}: {e}"
            ))),
        }
    }

    async fn save(&self, table: &str, entries: &[PartitionEntry]) -> Result<()> {
        let json = serde_json::to_vec_pretty(entries).map_err(|e| {
            CatalogError::Core(CoreError::serialization(format!(
                "failed to encode catalog document for {table}: {e}"
            )))
        })?;
        self.backend
            .put(
                &Self::document_path(table),
                Bytes::from(json),
                WritePrecondition::None,
            )
            .await
            .map_err(|e| {
                CatalogError::unavailable(format!(
                    "failed to write catalog document for {table}: {e}"
                ))
            })?;
        Ok(())
    }
}

#[async_trait]
impl Catalog for StorageCatalog {
    async fn add_partition(
        &self,
        table: &str,
        key: &PartitionKey,
        location: &str,
    ) -> Result<AddOutcome> {
        self.check_table(table)?;
        let mut entries = self.load(table).await?;

        if let Some(existing) = entries.iter().find(|e| &e.partition_key == key) {
            return Ok(AddOutcome::AlreadyExists {
                existing_location: existing.location.clone(),
            });
        }

        entries.push(PartitionEntry {
            table: table.to_string(),
            partition_key: key.clone(),
            location: location.to_string(),
            registered_at: Utc::now(),
        });
        entries.sort_by(|a, b| a.partition_key.cmp(&b.partition_key));
        self.save(table, &entries).await?;
        Ok(AddOutcome::Added)
    }

    async fn get_partition(
        &self,
        table: &str,
        key: &PartitionKey,
    ) -> Result<Option<PartitionEntry>> {
        self.check_table(table)?;
        Ok(self
            .load(table)
            .await?
            .into_iter()
            .find(|e| &e.partition_key == key))
    }

    async fn list_partitions(&self, table: &str) -> Result<Vec<PartitionEntry>> {
        self.check_table(table)?;
        self.load(table).await
    }

    async fn drop_partition(&self, table: &str, key: &PartitionKey) -> Result<bool> {
        self.check_table(table)?;
        let mut entries = self.load(table).await?;
        let before = entries.len();
        entries.retain(|e| &e.partition_key != key);
        if entries.len() == before {
            return Ok(false);
        }
        self.save(table, &entries).await?;
        Ok(true)
    }

    async fn table_def(&self, table: &str) -> Result<Option<TableDef>> {
        Ok(self.tables.get(table).cloned())
    }
}
