//! Storage backend abstraction for the artifact lake (S3, GCS, local).
//!
//! The contract is the minimum surface the lake needs:
//! - Conditional writes (`DoesNotExist`) are the primitive that enforces
//!   write-once semantics under concurrent duplicate attempts
//! - Listing and head support discovery/backfill and idempotency checks
//! - Deletes are idempotent (staging cleanup may race)
//!
//! Production deployments use [`ObjectStoreBackend`] over the `object_store`
//! crate (local filesystem, S3, GCS share one code path); tests use
//! [`MemoryBackend`].

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutMode, PutOptions};

use crate::error::{Error, Result};

/// Precondition for conditional writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePrecondition {
    /// Write only if the object does not exist.
    DoesNotExist,
    /// Write unconditionally.
    None,
}

/// Result of a conditional write.
///
/// A failed precondition is a normal result, never an error: the write-once
/// caller decides whether it means "already done" or "conflict".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    /// Write succeeded.
    Success,
    /// The object already existed and the precondition was `DoesNotExist`.
    PreconditionFailed,
}

/// Metadata about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Object path (key).
    pub path: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modification timestamp.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Storage backend trait for object storage.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Reads an entire object.
    ///
    /// Returns [`Error::NotFound`] if the object doesn't exist.
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// Writes with an optional precondition.
    ///
    /// Returns `WriteResult::PreconditionFailed` if the precondition is not
    /// met; precondition failure is never surfaced as an error.
    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult>;

    /// Deletes an object.
    ///
    /// Succeeds even if the object doesn't exist (idempotent).
    async fn delete(&self, path: &str) -> Result<()>;

    /// Lists objects with the given prefix.
    ///
    /// Returns an empty vec if no objects match. Ordering is arbitrary and
    /// may vary between backends; callers requiring deterministic order must
    /// sort the results.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;

    /// Gets object metadata without reading content.
    ///
    /// Returns `None` if the object doesn't exist.
    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>>;
}

/// In-memory storage backend for testing.
///
/// Thread-safe via `RwLock`. Not suitable for production.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

impl MemoryBackend {
    /// Creates a new empty memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        objects
            .get(path)
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::NotFound(format!("object not found: {path}")))
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let mut objects = self.objects.write().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        if precondition == WritePrecondition::DoesNotExist && objects.contains_key(path) {
            return Ok(WriteResult::PreconditionFailed);
        }

        objects.insert(
            path.to_string(),
            StoredObject {
                data,
                last_modified: Utc::now(),
            },
        );
        drop(objects);

        Ok(WriteResult::Success)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?
            .remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        Ok(objects
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(path, obj)| ObjectMeta {
                path: path.clone(),
                size: obj.data.len() as u64,
                last_modified: Some(obj.last_modified),
            })
            .collect())
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        Ok(objects.get(path).map(|obj| ObjectMeta {
            path: path.to_string(),
            size: obj.data.len() as u64,
            last_modified: Some(obj.last_modified),
        }))
    }
}

/// Storage backend over any [`object_store::ObjectStore`] implementation.
///
/// Covers local filesystem (CLI and integration tests) and cloud object
/// stores with the same conditional-write semantics: `PutMode::Create` maps
/// to [`WritePrecondition::DoesNotExist`].
#[derive(Clone)]
pub struct ObjectStoreBackend {
    inner: Arc<dyn ObjectStore>,
}

impl ObjectStoreBackend {
    /// Creates a backend over the given object store.
    #[must_use]
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }

    fn object_path(path: &str) -> Result<ObjectPath> {
        ObjectPath::parse(path)
            .map_err(|e| Error::InvalidInput(format!("invalid object path '{path}': {e}")))
    }
}

impl std::fmt::Debug for ObjectStoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreBackend").finish_non_exhaustive()
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let location = Self::object_path(path)?;
        let result = self.inner.get(&location).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => {
                Error::NotFound(format!("object not found: {path}"))
            }
            other => Error::storage_with_source(format!("get {path} failed"), other),
        })?;

        result
            .bytes()
            .await
            .map_err(|e| Error::storage_with_source(format!("read {path} failed"), e))
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let location = Self::object_path(path)?;
        let options = PutOptions::from(match precondition {
            WritePrecondition::DoesNotExist => PutMode::Create,
            WritePrecondition::None => PutMode::Overwrite,
        });

        match self.inner.put_opts(&location, data.into(), options).await {
            Ok(_) => Ok(WriteResult::Success),
            Err(object_store::Error::AlreadyExists { .. }) => Ok(WriteResult::PreconditionFailed),
            Err(e) => Err(Error::storage_with_source(format!("put {path} failed"), e)),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let location = Self::object_path(path)?;
        match self.inner.delete(&location).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(Error::storage_with_source(
                format!("delete {path} failed"),
                e,
            )),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let location = Self::object_path(prefix.trim_end_matches('/'))?;
        let entries: Vec<object_store::ObjectMeta> = self
            .inner
            .list(Some(&location))
            .try_collect()
            .await
            .map_err(|e| Error::storage_with_source(format!("list {prefix} failed"), e))?;

        Ok(entries
            .into_iter()
            .map(|meta| ObjectMeta {
                path: meta.location.to_string(),
                size: meta.size as u64,
                last_modified: Some(meta.last_modified),
            })
            .collect())
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let location = Self::object_path(path)?;
        match self.inner.head(&location).await {
            Ok(meta) => Ok(Some(ObjectMeta {
                path: meta.location.to_string(),
                size: meta.size as u64,
                last_modified: Some(meta.last_modified),
            })),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(Error::storage_with_source(format!("head {path} failed"), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_roundtrip() {
        let backend = MemoryBackend::new();
        let data = Bytes::from("hello world");

        let result = backend
            .put("test/file.txt", data.clone(), WritePrecondition::None)
            .await
            .expect("put should succeed");
        assert_eq!(result, WriteResult::Success);

        let retrieved = backend
            .get("test/file.txt")
            .await
            .expect("get should succeed");
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn precondition_does_not_exist() {
        let backend = MemoryBackend::new();

        let result = backend
            .put(
                "new.txt",
                Bytes::from("data"),
                WritePrecondition::DoesNotExist,
            )
            .await
            .expect("should succeed");
        assert_eq!(result, WriteResult::Success);

        // Second write with DoesNotExist must fail the precondition and
        // leave the original object unchanged.
        let result = backend
            .put(
                "new.txt",
                Bytes::from("data2"),
                WritePrecondition::DoesNotExist,
            )
            .await
            .expect("should succeed");
        assert_eq!(result, WriteResult::PreconditionFailed);
        assert_eq!(backend.get("new.txt").await.unwrap(), Bytes::from("data"));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let backend = MemoryBackend::new();

        backend
            .put("del.txt", Bytes::from("data"), WritePrecondition::None)
            .await
            .unwrap();
        backend.delete("del.txt").await.expect("should succeed");
        backend
            .delete("del.txt")
            .await
            .expect("second delete should also succeed");
        assert!(backend.head("del.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_with_prefix() {
        let backend = MemoryBackend::new();

        for path in ["a/1.txt", "a/2.txt", "b/1.txt"] {
            backend
                .put(path, Bytes::from("x"), WritePrecondition::None)
                .await
                .unwrap();
        }

        let list_a = backend.list("a/").await.expect("should succeed");
        assert_eq!(list_a.len(), 2);

        let list_b = backend.list("b/").await.expect("should succeed");
        assert_eq!(list_b.len(), 1);
    }

    #[tokio::test]
    async fn object_store_backend_over_local_fs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = object_store::local::LocalFileSystem::new_with_prefix(dir.path())
            .expect("local store");
        let backend = ObjectStoreBackend::new(Arc::new(store));

        let result = backend
            .put(
                "videos/metadata/test.parquet",
                Bytes::from("payload"),
                WritePrecondition::DoesNotExist,
            )
            .await
            .expect("put should succeed");
        assert_eq!(result, WriteResult::Success);

        let result = backend
            .put(
                "videos/metadata/test.parquet",
                Bytes::from("other"),
                WritePrecondition::DoesNotExist,
            )
            .await
            .expect("conflict is a result, not an error");
        assert_eq!(result, WriteResult::PreconditionFailed);

        let listed = backend.list("videos/").await.expect("list should succeed");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, "videos/metadata/test.parquet");

        assert_eq!(
            backend.get("videos/metadata/test.parquet").await.unwrap(),
            Bytes::from("payload")
        );
        assert!(matches!(
            backend.get("videos/metadata/missing.parquet").await,
            Err(Error::NotFound(_))
        ));
    }
}
