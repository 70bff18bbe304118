//! Boot data: the region list and upstream client credentials.

use std::sync::Arc;

use super::codec;
use super::BOOT_BUCKET;
use crate::adapters::api::auth::ClientCredentials;
use crate::domain::error::{PipelineError, Result};
use crate::domain::region::Region;
use crate::ports::object_store::{ObjectStore, StoredObject, CONTENT_TYPE_JSON};

const REGIONS_KEY: &str = "regions.json.gz";
const CREDENTIALS_KEY: &str = "blizzard-credentials.json";

#[derive(Clone)]
pub struct BootStore {
    store: Arc<dyn ObjectStore>,
}

impl BootStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub async fn regions(&self) -> Result<Vec<Region>> {
        let object = self
            .store
            .get(BOOT_BUCKET, REGIONS_KEY)
            .await?
            .ok_or_else(|| PipelineError::missing(BOOT_BUCKET, REGIONS_KEY))?;
        codec::decode_json(&object)
    }

    pub async fn put_regions(&self, regions: &[Region]) -> Result<()> {
        let object = StoredObject::gzip_json(codec::encode_json(regions)?);
        self.store.put(BOOT_BUCKET, REGIONS_KEY, object).await
    }

    pub async fn credentials(&self) -> Result<ClientCredentials> {
        let object = self
            .store
            .get(BOOT_BUCKET, CREDENTIALS_KEY)
            .await?
            .ok_or_else(|| PipelineError::missing(BOOT_BUCKET, CREDENTIALS_KEY))?;
        codec::decode_json(&object)
    }

    pub async fn put_credentials(&self, credentials: &ClientCredentials) -> Result<()> {
        let body = serde_json::to_vec(credentials)
            .map_err(|e| PipelineError::StorageIo(e.to_string()))?;
        let object = StoredObject {
            body,
            content_type: CONTENT_TYPE_JSON.to_string(),
            ..StoredObject::default()
        };
        self.store.put(BOOT_BUCKET, CREDENTIALS_KEY, object).await
    }
}
