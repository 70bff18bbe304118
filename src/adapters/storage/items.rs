//! Item catalog and icon stores.
//!
//! Items live at `sotah-items/{id}.json.gz`; icons at
//! `item-icons/{name}.jpg`, world-readable and not compressed.

use std::sync::Arc;

use super::codec;
use super::{ITEMS_BUCKET, ITEM_ICONS_BUCKET};
use crate::domain::auction::ItemId;
use crate::domain::error::Result;
use crate::domain::item::Item;
use crate::domain::timestamp::parse_key_timestamp;
use crate::ports::object_store::{ObjectStore, StoredObject, CONTENT_TYPE_JPEG};

#[derive(Clone)]
pub struct ItemStore {
    store: Arc<dyn ObjectStore>,
}

impl ItemStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn item_key(id: ItemId) -> String {
        format!("{id}.json.gz")
    }

    fn icon_key(name: &str) -> String {
        format!("{name}.jpg")
    }

    pub async fn get(&self, id: ItemId) -> Result<Option<Item>> {
        match self.store.get(ITEMS_BUCKET, &Self::item_key(id)).await? {
            Some(object) => Ok(Some(codec::decode_json(&object)?)),
            None => Ok(None),
        }
    }

    pub async fn put(&self, item: &Item) -> Result<()> {
        let object = StoredObject::gzip_json(codec::encode_json(item)?);
        self.store
            .put(ITEMS_BUCKET, &Self::item_key(item.id), object)
            .await
    }

    pub async fn exists(&self, id: ItemId) -> Result<bool> {
        self.store.exists(ITEMS_BUCKET, &Self::item_key(id)).await
    }

    /// Ids of every stored item, ascending.
    pub async fn ids(&self) -> Result<Vec<ItemId>> {
        let mut ids: Vec<ItemId> = self
            .store
            .list(ITEMS_BUCKET, "")
            .await?
            .iter()
            .filter_map(|meta| parse_key_timestamp(&meta.key))
            .filter_map(|id| ItemId::try_from(id).ok())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Load the full catalog.
    pub async fn load_all(&self) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        for id in self.ids().await? {
            if let Some(item) = self.get(id).await? {
                items.push(item);
            }
        }
        Ok(items)
    }

    pub async fn icon_exists(&self, name: &str) -> Result<bool> {
        self.store.exists(ITEM_ICONS_BUCKET, &Self::icon_key(name)).await
    }

    pub async fn put_icon(&self, name: &str, image: Vec<u8>) -> Result<()> {
        let object = StoredObject {
            body: image,
            content_type: CONTENT_TYPE_JPEG.to_string(),
            content_encoding: None,
            public_read: true,
            ..StoredObject::default()
        };
        self.store
            .put(ITEM_ICONS_BUCKET, &Self::icon_key(name), object)
            .await
    }
}
