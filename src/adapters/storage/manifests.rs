//! Manifest Store
//!
//! One manifest per `(realm, day)` under
//! `auctions-manifest/{region}/{realm}/{day}.json`, listing the snapshot
//! timestamps taken that day. Each realm has a single acquirer per cycle,
//! so read-append-write needs no lock.

use std::sync::Arc;

use tracing::{debug, instrument};

use super::codec;
use super::AUCTIONS_MANIFEST_BUCKET;
use crate::domain::error::Result;
use crate::domain::manifest::AuctionManifest;
use crate::domain::timestamp::{normalize, parse_key_timestamp, UnixTimestamp};
use crate::ports::object_store::{ObjectStore, StoredObject};

#[derive(Clone)]
pub struct ManifestStore {
    store: Arc<dyn ObjectStore>,
}

impl ManifestStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn key(region: &str, realm: &str, day: UnixTimestamp) -> String {
        format!("{region}/{realm}/{day}.json")
    }

    fn prefix(region: &str, realm: &str) -> String {
        format!("{region}/{realm}/")
    }

    /// Read the manifest for a day; `None` when the day has none.
    pub async fn get(&self, region: &str, realm: &str, day: UnixTimestamp) -> Result<Option<AuctionManifest>> {
        match self
            .store
            .get(AUCTIONS_MANIFEST_BUCKET, &Self::key(region, realm, day))
            .await?
        {
            Some(object) => Ok(Some(codec::decode_json(&object)?)),
            None => Ok(None),
        }
    }

    /// Record a snapshot timestamp in its day's manifest.
    ///
    /// Appending a timestamp already present leaves the stored manifest
    /// untouched.
    #[instrument(skip(self))]
    pub async fn append(&self, region: &str, realm: &str, ts: UnixTimestamp) -> Result<AuctionManifest> {
        let day = normalize(ts);
        let mut manifest = self.get(region, realm, day).await?.unwrap_or_default();
        if !manifest.append(ts) {
            debug!(region, realm, ts, "Snapshot already in manifest");
            return Ok(manifest);
        }

        let object = StoredObject::gzip_json(codec::encode_json(&manifest)?);
        self.store
            .put(AUCTIONS_MANIFEST_BUCKET, &Self::key(region, realm, day), object)
            .await?;
        Ok(manifest)
    }

    /// Normalized days that have a manifest, ascending.
    pub async fn days(&self, region: &str, realm: &str) -> Result<Vec<UnixTimestamp>> {
        let mut days: Vec<UnixTimestamp> = self
            .store
            .list(AUCTIONS_MANIFEST_BUCKET, &Self::prefix(region, realm))
            .await?
            .iter()
            .filter_map(|meta| parse_key_timestamp(&meta.key))
            .collect();
        days.sort_unstable();
        Ok(days)
    }

    pub async fn delete(&self, region: &str, realm: &str, day: UnixTimestamp) -> Result<bool> {
        self.store
            .delete(AUCTIONS_MANIFEST_BUCKET, &Self::key(region, realm, day))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::memory::InMemoryObjectStore;

    #[tokio::test]
    async fn test_append_creates_and_extends() {
        let store = ManifestStore::new(Arc::new(InMemoryObjectStore::new()));
        store.append("us", "earthen-ring", 1_700_000_000).await.unwrap();
        store.append("us", "earthen-ring", 1_700_003_600).await.unwrap();
        store.append("us", "earthen-ring", 1_700_003_600).await.unwrap();

        let manifest = store.get("us", "earthen-ring", 1_699_920_000).await.unwrap().unwrap();
        assert_eq!(manifest.timestamps().collect::<Vec<_>>(), vec![1_700_000_000, 1_700_003_600]);
    }

    #[tokio::test]
    async fn test_stored_as_gzip_json_array() {
        let memory = Arc::new(InMemoryObjectStore::new());
        let store = ManifestStore::new(memory.clone());
        store.append("us", "earthen-ring", 1_700_000_000).await.unwrap();

        let object = memory
            .get(AUCTIONS_MANIFEST_BUCKET, "us/earthen-ring/1699920000.json")
            .await
            .unwrap()
            .unwrap();
        assert!(object.is_gzip());
        assert_eq!(codec::body(&object).unwrap(), b"[1700000000]");
    }

    #[tokio::test]
    async fn test_days_lists_only_realm() {
        let store = ManifestStore::new(Arc::new(InMemoryObjectStore::new()));
        store.append("us", "earthen-ring", 1_700_100_000).await.unwrap();
        store.append("us", "earthen-ring", 1_700_000_000).await.unwrap();
        store.append("us", "earthen-ring-2", 1_600_000_000).await.unwrap();

        assert_eq!(
            store.days("us", "earthen-ring").await.unwrap(),
            vec![1_699_920_000, 1_700_092_800]
        );
    }
}
