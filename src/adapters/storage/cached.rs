//! Read-through Cache Store
//!
//! Wraps the canonical object store with a node-local cache store (usually
//! a `LocalObjectStore` under `cache_dir`). Reads are served from the cache
//! only while the canonical object still matches by size, `version_id` and
//! body digest;
//! writes and deletes go to the canonical store first and then evict the
//! cached copy.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::error::Result;
use crate::ports::object_store::{ObjectMeta, ObjectStore, StoredObject};

pub struct CachedObjectStore {
    canonical: Arc<dyn ObjectStore>,
    cache: Arc<dyn ObjectStore>,
}

impl CachedObjectStore {
    pub fn new(canonical: Arc<dyn ObjectStore>, cache: Arc<dyn ObjectStore>) -> Self {
        Self { canonical, cache }
    }

    async fn evict(&self, bucket: &str, key: &str) {
        if let Err(e) = self.cache.delete(bucket, key).await {
            warn!(bucket, key, error = %e, "Failed to evict cached object");
        }
    }
}

/// A canonical store without digests falls back to size and `version_id`.
fn matches_canonical(cached: &StoredObject, canonical: &ObjectMeta) -> bool {
    cached.body.len() as u64 == canonical.size
        && cached.metadata.get("version_id") == canonical.metadata.get("version_id")
        && canonical.etag.as_ref().is_none_or(|etag| *etag == cached.etag())
}

#[async_trait]
impl ObjectStore for CachedObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        self.canonical.ensure_bucket(bucket).await?;
        self.cache.ensure_bucket(bucket).await
    }

    async fn put(&self, bucket: &str, key: &str, object: StoredObject) -> Result<()> {
        self.canonical.put(bucket, key, object).await?;
        self.evict(bucket, key).await;
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<StoredObject>> {
        let Some(current) = self.canonical.head(bucket, key).await? else {
            self.evict(bucket, key).await;
            return Ok(None);
        };

        match self.cache.get(bucket, key).await {
            Ok(Some(cached)) if matches_canonical(&cached, &current) => return Ok(Some(cached)),
            Ok(_) => {}
            Err(e) => warn!(bucket, key, error = %e, "Cache read failed, falling back"),
        }

        let Some(object) = self.canonical.get(bucket, key).await? else {
            return Ok(None);
        };
        if let Err(e) = self.cache.put(bucket, key, object.clone()).await {
            warn!(bucket, key, error = %e, "Failed to populate cache");
        }
        Ok(Some(object))
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>> {
        self.canonical.head(bucket, key).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool> {
        let deleted = self.canonical.delete(bucket, key).await?;
        self.evict(bucket, key).await;
        Ok(deleted)
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>> {
        self.canonical.list(bucket, prefix).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::memory::InMemoryObjectStore;

    fn object(body: &[u8], version: &str) -> StoredObject {
        StoredObject {
            body: body.to_vec(),
            ..StoredObject::default()
        }
        .with_metadata("version_id", version)
    }

    #[tokio::test]
    async fn test_read_populates_cache() {
        let canonical = Arc::new(InMemoryObjectStore::new());
        let cache = Arc::new(InMemoryObjectStore::new());
        canonical.put("b", "k", object(b"one", "v1")).await.unwrap();

        let store = CachedObjectStore::new(canonical.clone(), cache.clone());
        assert_eq!(store.get("b", "k").await.unwrap().unwrap().body, b"one");
        assert!(cache.exists("b", "k").await.unwrap());
    }

    #[tokio::test]
    async fn test_cache_never_shadows_canonical_writes() {
        let canonical = Arc::new(InMemoryObjectStore::new());
        let cache = Arc::new(InMemoryObjectStore::new());
        let store = CachedObjectStore::new(canonical.clone(), cache.clone());

        store.put("b", "k", object(b"one", "v1")).await.unwrap();
        store.get("b", "k").await.unwrap();

        // Another writer replaces the canonical object behind our back
        canonical.put("b", "k", object(b"two", "v2")).await.unwrap();
        assert_eq!(store.get("b", "k").await.unwrap().unwrap().body, b"two");

        canonical.delete("b", "k").await.unwrap();
        assert!(store.get("b", "k").await.unwrap().is_none());
        assert!(!cache.exists("b", "k").await.unwrap());
    }

    #[tokio::test]
    async fn test_same_size_overwrite_without_version() {
        let canonical = Arc::new(InMemoryObjectStore::new());
        let cache = Arc::new(InMemoryObjectStore::new());
        let store = CachedObjectStore::new(canonical.clone(), cache);

        let live = |body: &[u8]| StoredObject::gzip_json(body.to_vec());
        store.put("live-auctions", "us-earthen-ring.json.gz", live(b"aaaa")).await.unwrap();
        store.get("live-auctions", "us-earthen-ring.json.gz").await.unwrap();

        canonical
            .put("live-auctions", "us-earthen-ring.json.gz", live(b"bbbb"))
            .await
            .unwrap();
        let read = store.get("live-auctions", "us-earthen-ring.json.gz").await.unwrap().unwrap();
        assert_eq!(read.body, b"bbbb");
    }

    #[tokio::test]
    async fn test_delete_evicts() {
        let canonical = Arc::new(InMemoryObjectStore::new());
        let cache = Arc::new(InMemoryObjectStore::new());
        let store = CachedObjectStore::new(canonical, cache.clone());

        store.put("b", "k", object(b"one", "v1")).await.unwrap();
        store.get("b", "k").await.unwrap();
        assert!(store.delete("b", "k").await.unwrap());
        assert!(!cache.exists("b", "k").await.unwrap());
    }
}
