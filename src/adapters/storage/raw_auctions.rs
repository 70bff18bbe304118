//! Raw Snapshot Store
//!
//! Persists each accepted upstream snapshot verbatim (gzip-compressed)
//! under `raw-auctions/{region}/{realm}/{ts}.json.gz`.

use std::sync::Arc;

use tracing::{debug, instrument};

use super::codec;
use super::RAW_AUCTIONS_BUCKET;
use crate::domain::auction::AuctionsBody;
use crate::domain::error::{PipelineError, Result};
use crate::domain::timestamp::UnixTimestamp;
use crate::ports::object_store::{ObjectStore, StoredObject};

#[derive(Clone)]
pub struct RawAuctionStore {
    store: Arc<dyn ObjectStore>,
}

impl RawAuctionStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn key(region: &str, realm: &str, ts: UnixTimestamp) -> String {
        format!("{region}/{realm}/{ts}.json.gz")
    }

    /// Write the upstream body as received.
    #[instrument(skip(self, upstream_json), fields(size = upstream_json.len()))]
    pub async fn put(&self, region: &str, realm: &str, ts: UnixTimestamp, upstream_json: &[u8]) -> Result<()> {
        let key = Self::key(region, realm, ts);
        let object = StoredObject::gzip_json(codec::gzip(upstream_json)?);
        self.store.put(RAW_AUCTIONS_BUCKET, &key, object).await?;
        debug!(key = %key, "Raw snapshot stored");
        Ok(())
    }

    /// Read and parse a stored snapshot.
    ///
    /// # Errors
    /// `StorageMissing` when no snapshot exists for `ts`.
    pub async fn get(&self, region: &str, realm: &str, ts: UnixTimestamp) -> Result<AuctionsBody> {
        let key = Self::key(region, realm, ts);
        let object = self
            .store
            .get(RAW_AUCTIONS_BUCKET, &key)
            .await?
            .ok_or_else(|| PipelineError::missing(RAW_AUCTIONS_BUCKET, &key))?;
        codec::decode_json(&object)
    }

    pub async fn exists(&self, region: &str, realm: &str, ts: UnixTimestamp) -> Result<bool> {
        self.store
            .exists(RAW_AUCTIONS_BUCKET, &Self::key(region, realm, ts))
            .await
    }

    /// Delete a snapshot; false when it was already gone.
    pub async fn delete(&self, region: &str, realm: &str, ts: UnixTimestamp) -> Result<bool> {
        self.store
            .delete(RAW_AUCTIONS_BUCKET, &Self::key(region, realm, ts))
            .await
    }
}
