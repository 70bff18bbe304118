//! Price-History Store
//!
//! One shard per `(realm, day)` at
//! `pricelist-histories/{game_version}/{region}/{realm}/{day}.txt.gz`.
//!
//! Shard body: one line per item, `item_id,base64(gzip(history_json))`.
//! The whole body is gzip-encoded again at the object layer. Readers that
//! want a handful of items only decode the inner blobs of those rows.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::codec;
use super::PRICELIST_HISTORIES_BUCKET;
use crate::domain::auction::ItemId;
use crate::domain::error::{PipelineError, Result};
use crate::domain::pricelist::{merge_snapshot, window, ItemPriceHistories, PriceHistory, PriceList};
use crate::domain::timestamp::{day_span, normalize, parse_key_timestamp, UnixTimestamp};
use crate::ports::object_store::{ObjectStore, StoredObject, CONTENT_TYPE_TEXT, ENCODING_GZIP};

/// Metadata key carrying the shard generation.
pub const VERSION_ID: &str = "version_id";

/// A shard with its rows split out but the inner blobs still encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Shard {
    /// Generation written into the object metadata.
    pub version_id: Option<String>,
    /// Item id to `base64(gzip(json))` blob.
    pub rows: HashMap<ItemId, String>,
}

impl Shard {
    /// Split a plain (outer-gunzipped) shard body into rows.
    pub fn parse(plain: &[u8], version_id: Option<String>) -> Result<Self> {
        let text = std::str::from_utf8(plain)
            .map_err(|e| PipelineError::StorageIo(format!("shard is not utf-8: {e}")))?;

        let mut rows = HashMap::new();
        for line in text.lines().filter(|l| !l.is_empty()) {
            let (id, blob) = line
                .split_once(',')
                .ok_or_else(|| PipelineError::StorageIo(format!("malformed shard row: {line}")))?;
            let id: ItemId = id
                .parse()
                .map_err(|e| PipelineError::StorageIo(format!("bad item id in shard row: {e}")))?;
            rows.insert(id, blob.to_string());
        }
        Ok(Self { version_id, rows })
    }

    /// Decode the rows of the requested items; `None` decodes all of them.
    pub fn decode(&self, item_ids: Option<&HashSet<ItemId>>) -> Result<ItemPriceHistories> {
        self.rows
            .iter()
            .filter(|(id, _)| item_ids.is_none_or(|wanted| wanted.contains(*id)))
            .map(|(id, blob)| Ok((*id, decode_blob(blob)?)))
            .collect()
    }
}

/// Encode one item's history as `base64(gzip(json))`.
pub fn encode_blob(history: &PriceHistory) -> Result<String> {
    Ok(STANDARD.encode(codec::encode_json(history)?))
}

/// Decode a `base64(gzip(json))` blob.
pub fn decode_blob(blob: &str) -> Result<PriceHistory> {
    let packed = STANDARD
        .decode(blob.trim())
        .map_err(|e| PipelineError::StorageIo(format!("bad base64 in shard: {e}")))?;
    serde_json::from_slice(&codec::gunzip(&packed)?)
        .map_err(|e| PipelineError::StorageIo(format!("bad history json in shard: {e}")))
}

/// Render the plain (not yet outer-gzipped) shard body, rows ordered by item id.
pub fn encode_shard(histories: &ItemPriceHistories) -> Result<Vec<u8>> {
    let mut ids: Vec<&ItemId> = histories.keys().collect();
    ids.sort_unstable();

    let mut out = String::new();
    for id in ids {
        let _ = writeln!(out, "{id},{}", encode_blob(&histories[id])?);
    }
    Ok(out.into_bytes())
}

#[derive(Clone)]
pub struct PriceHistoryStore {
    store: Arc<dyn ObjectStore>,
    game_version: String,
}

impl PriceHistoryStore {
    pub fn new(store: Arc<dyn ObjectStore>, game_version: impl Into<String>) -> Self {
        Self {
            store,
            game_version: game_version.into(),
        }
    }

    pub fn key(&self, region: &str, realm: &str, day: UnixTimestamp) -> String {
        format!("{}/{region}/{realm}/{day}.txt.gz", self.game_version)
    }

    fn prefix(&self, region: &str, realm: &str) -> String {
        format!("{}/{region}/{realm}/", self.game_version)
    }

    /// Current generation of a shard; `None` when the shard is absent.
    pub async fn version(&self, region: &str, realm: &str, day: UnixTimestamp) -> Result<Option<String>> {
        Ok(self
            .store
            .head(PRICELIST_HISTORIES_BUCKET, &self.key(region, realm, day))
            .await?
            .map(|meta| meta.metadata.get(VERSION_ID).cloned().unwrap_or_default()))
    }

    /// Load a shard with its rows split but not decoded.
    pub async fn load(&self, region: &str, realm: &str, day: UnixTimestamp) -> Result<Option<Shard>> {
        let Some(object) = self
            .store
            .get(PRICELIST_HISTORIES_BUCKET, &self.key(region, realm, day))
            .await?
        else {
            return Ok(None);
        };
        let version_id = object.metadata.get(VERSION_ID).cloned();
        Ok(Some(Shard::parse(&codec::body(&object)?, version_id)?))
    }

    /// Merge one snapshot's price list into its day shard.
    ///
    /// Returns the number of items in the shard after the merge.
    #[instrument(skip(self, prices), fields(items = prices.len()))]
    pub async fn merge(&self, region: &str, realm: &str, ts: UnixTimestamp, prices: &PriceList) -> Result<usize> {
        let day = normalize(ts);
        let mut histories = match self.load(region, realm, day).await? {
            Some(shard) => shard.decode(None)?,
            None => ItemPriceHistories::new(),
        };
        merge_snapshot(&mut histories, ts, prices);

        let object = StoredObject {
            body: codec::gzip(&encode_shard(&histories)?)?,
            content_type: CONTENT_TYPE_TEXT.to_string(),
            content_encoding: Some(ENCODING_GZIP.to_string()),
            ..StoredObject::default()
        }
        .with_metadata(VERSION_ID, Uuid::new_v4().to_string());

        self.store
            .put(PRICELIST_HISTORIES_BUCKET, &self.key(region, realm, day), object)
            .await?;
        debug!(region, realm, day, items = histories.len(), "History shard written");
        Ok(histories.len())
    }

    /// Normalized days that have a shard, ascending.
    pub async fn days(&self, region: &str, realm: &str) -> Result<Vec<UnixTimestamp>> {
        let mut days: Vec<UnixTimestamp> = self
            .store
            .list(PRICELIST_HISTORIES_BUCKET, &self.prefix(region, realm))
            .await?
            .iter()
            .filter_map(|meta| parse_key_timestamp(&meta.key))
            .collect();
        days.sort_unstable();
        Ok(days)
    }

    /// Stored shard days intersecting `[lower, upper]`, ascending.
    ///
    /// Work is bounded by the shards that exist, not by the window width.
    pub async fn days_within(
        &self,
        region: &str,
        realm: &str,
        lower: UnixTimestamp,
        upper: UnixTimestamp,
    ) -> Result<Vec<UnixTimestamp>> {
        let Some((first, last)) = day_span(lower, upper) else {
            return Ok(Vec::new());
        };
        let mut days = self.days(region, realm).await?;
        days.retain(|day| (first..=last).contains(day));
        Ok(days)
    }

    pub async fn delete(&self, region: &str, realm: &str, day: UnixTimestamp) -> Result<bool> {
        self.store
            .delete(PRICELIST_HISTORIES_BUCKET, &self.key(region, realm, day))
            .await
    }
}

/// Fold decoded shard histories into `merged`, keeping only `[lower, upper]`.
pub fn merge_window(
    merged: &mut ItemPriceHistories,
    decoded: ItemPriceHistories,
    lower: UnixTimestamp,
    upper: UnixTimestamp,
) {
    for (id, history) in decoded {
        merged.entry(id).or_default().extend(window(&history, lower, upper));
    }
}
