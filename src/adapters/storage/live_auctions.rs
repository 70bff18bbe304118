//! Live-Auction Store
//!
//! Current deduplicated listing set of each realm, overwritten every
//! cycle at `live-auctions/{region}-{realm}.json.gz`.

use std::sync::Arc;

use tracing::{info, instrument};

use super::codec;
use super::LIVE_AUCTIONS_BUCKET;
use crate::domain::auction::MiniAuction;
use crate::domain::error::{PipelineError, Result};
use crate::ports::object_store::{ObjectStore, StoredObject};

#[derive(Clone)]
pub struct LiveAuctionStore {
    store: Arc<dyn ObjectStore>,
}

impl LiveAuctionStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn key(region: &str, realm: &str) -> String {
        format!("{region}-{realm}.json.gz")
    }

    /// Replace a realm's live auctions.
    #[instrument(skip(self, auctions), fields(count = auctions.len()))]
    pub async fn put(&self, region: &str, realm: &str, auctions: &[MiniAuction]) -> Result<()> {
        let object = StoredObject::gzip_json(codec::encode_json(auctions)?);
        self.store
            .put(LIVE_AUCTIONS_BUCKET, &Self::key(region, realm), object)
            .await?;
        info!(region, realm, count = auctions.len(), "Live auctions written");
        Ok(())
    }

    /// Load a realm's live auctions.
    ///
    /// # Errors
    /// `StorageMissing` before the realm's first compute.
    pub async fn get(&self, region: &str, realm: &str) -> Result<Vec<MiniAuction>> {
        let key = Self::key(region, realm);
        let object = self
            .store
            .get(LIVE_AUCTIONS_BUCKET, &key)
            .await?
            .ok_or_else(|| PipelineError::missing(LIVE_AUCTIONS_BUCKET, &key))?;
        codec::decode_json(&object)
    }
}
