//! In-Memory Object Store
//!
//! Bucket map held behind a `tokio::sync::RwLock`. Used by tests and by
//! single-node runs that do not need durability. Buckets are created on
//! first write.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::error::Result;
use crate::ports::object_store::{ObjectMeta, ObjectStore, StoredObject};

#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    buckets: RwLock<HashMap<String, BTreeMap<String, StoredObject>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently held in a bucket.
    pub async fn object_count(&self, bucket: &str) -> usize {
        self.buckets.read().await.get(bucket).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }

    async fn put(&self, bucket: &str, key: &str, object: StoredObject) -> Result<()> {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), object);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<StoredObject>> {
        Ok(self
            .buckets
            .read()
            .await
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned())
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>> {
        Ok(self
            .buckets
            .read()
            .await
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.meta(key)))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self
            .buckets
            .write()
            .await
            .get_mut(bucket)
            .is_some_and(|objects| objects.remove(key).is_some()))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let buckets = self.buckets.read().await;
        let Some(objects) = buckets.get(bucket) else {
            return Ok(Vec::new());
        };
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| object.meta(key))
            .collect())
    }
}
