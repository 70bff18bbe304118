//! Query Engine - Auctions, Owners, Items, Prices
//!
//! Read side of the pipeline. Live auctions and decoded history shards
//! are held in `moka` caches:
//! - live lists per realm, dropped on `auctionsIntake`
//! - history shards per day, re-validated against the shard `version_id`
//!
//! The item blacklist is applied here and never at ingest.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, instrument};

use crate::adapters::storage::pricelist_histories::{merge_window, Shard};
use crate::adapters::storage::{LiveAuctionStore, PriceHistoryStore};
use crate::domain::auction::{ItemId, MiniAuction};
use crate::domain::error::{PipelineError, Result};
use crate::domain::jobs::RegionRealmTimestampTuple;
use crate::domain::pricelist::{price_list_for, ItemPriceHistories};
use crate::domain::query::{
  owners, rank_items, ItemsQueryRequest, ItemsQueryResponse, ItemsRequest, ItemsResponse, OwnersRequest,
  OwnersResponse, PriceHistoryRequest, PriceHistoryResponse, PriceListRequest, PriceListResponse,
  QueryAuctionsRequest, QueryAuctionsResponse, SEARCH_LIMIT,
};
use crate::domain::timestamp::UnixTimestamp;
use crate::usecases::state::ServiceState;

const LIVE_CACHE_CAPACITY: u64 = 1_024;
const LIVE_CACHE_TTL: Duration = Duration::from_secs(900);
const SHARD_CACHE_CAPACITY: u64 = 4_096;

pub struct QueryEngine {
  live: LiveAuctionStore,
  histories: PriceHistoryStore,
  state: Arc<ServiceState>,
  live_cache: Cache<String, Arc<Vec<MiniAuction>>>,
  shard_cache: Cache<String, Arc<Shard>>,
}

impl QueryEngine {
  pub fn new(live: LiveAuctionStore, histories: PriceHistoryStore, state: Arc<ServiceState>) -> Self {
    let live_cache = Cache::builder()
      .max_capacity(LIVE_CACHE_CAPACITY)
      .time_to_live(LIVE_CACHE_TTL)
      .build();
    let shard_cache = Cache::builder().max_capacity(SHARD_CACHE_CAPACITY).build();

    Self {
      live,
      histories,
      state,
      live_cache,
      shard_cache,
    }
  }

  /// An unknown region or realm in a query is the caller's mistake.
  async fn known_realm(&self, region: &str, realm: &str) -> Result<()> {
    match self.state.realm(region, realm).await {
      Ok(_) => Ok(()),
      Err(PipelineError::NotFound(msg)) => Err(PipelineError::UserInput(msg)),
      Err(e) => Err(e),
    }
  }

  async fn minis(&self, region: &str, realm: &str) -> Result<Arc<Vec<MiniAuction>>> {
    let key = LiveAuctionStore::key(region, realm);
    if let Some(cached) = self.live_cache.get(&key).await {
      return Ok(cached);
    }

    let minis = Arc::new(self.live.get(region, realm).await?);
    self.live_cache.insert(key, Arc::clone(&minis)).await;
    debug!(region, realm, groups = minis.len(), "Live auctions cached");
    Ok(minis)
  }

  fn allowed_ids(&self, ids: &[ItemId]) -> HashSet<ItemId> {
    ids
      .iter()
      .copied()
      .filter(|id| !self.state.is_blacklisted(*id))
      .collect()
  }

  #[instrument(skip(self, req), fields(region = %req.region_name, realm = %req.realm_slug))]
  pub async fn auctions(&self, req: &QueryAuctionsRequest) -> Result<QueryAuctionsResponse> {
    req.validate()?;
    self.known_realm(&req.region_name, &req.realm_slug).await?;

    let minis: Vec<MiniAuction> = self
      .minis(&req.region_name, &req.realm_slug)
      .await?
      .iter()
      .filter(|m| !self.state.is_blacklisted(m.item_id))
      .cloned()
      .collect();
    req.apply(minis)
  }

  pub async fn owners(&self, req: &OwnersRequest) -> Result<OwnersResponse> {
    self.known_realm(&req.region_name, &req.realm_slug).await?;
    let minis = self.minis(&req.region_name, &req.realm_slug).await?;
    Ok(OwnersResponse {
      owners: owners(&minis, &req.query, Some(SEARCH_LIMIT)),
    })
  }

  pub async fn items_query(&self, req: &ItemsQueryRequest) -> ItemsQueryResponse {
    let catalog = self.state.catalog().await;
    ItemsQueryResponse {
      items: rank_items(&catalog, &req.query),
    }
  }

  pub async fn items(&self, req: &ItemsRequest) -> ItemsResponse {
    let ids: Vec<ItemId> = req
      .item_ids
      .iter()
      .copied()
      .filter(|id| !self.state.is_blacklisted(*id))
      .collect();
    ItemsResponse {
      items: self.state.items_by_id(&ids).await,
    }
  }

  pub async fn price_list(&self, req: &PriceListRequest) -> Result<PriceListResponse> {
    self.known_realm(&req.region_name, &req.realm_slug).await?;
    let wanted = self.allowed_ids(&req.item_ids);
    let minis = self.minis(&req.region_name, &req.realm_slug).await?;
    Ok(PriceListResponse {
      price_list: price_list_for(&minis, &wanted),
    })
  }

  /// A day shard, served from cache while its `version_id` is unchanged.
  async fn shard(&self, region: &str, realm: &str, day: UnixTimestamp) -> Result<Option<Arc<Shard>>> {
    let key = self.histories.key(region, realm, day);
    let Some(version) = self.histories.version(region, realm, day).await? else {
      self.shard_cache.invalidate(&key).await;
      return Ok(None);
    };

    if let Some(cached) = self
      .shard_cache
      .get(&key)
      .await
      .filter(|s| s.version_id.as_deref() == Some(version.as_str()))
    {
      return Ok(Some(cached));
    }

    let Some(shard) = self.histories.load(region, realm, day).await? else {
      return Ok(None);
    };
    let shard = Arc::new(shard);
    self.shard_cache.insert(key, Arc::clone(&shard)).await;
    Ok(Some(shard))
  }

  #[instrument(skip(self, req), fields(region = %req.region_name, realm = %req.realm_slug, items = req.item_ids.len()))]
  pub async fn price_history(&self, req: &PriceHistoryRequest) -> Result<PriceHistoryResponse> {
    req.validate()?;
    self.known_realm(&req.region_name, &req.realm_slug).await?;

    let wanted = self.allowed_ids(&req.item_ids);
    if wanted.is_empty() {
      return Err(PipelineError::Blacklisted(req.item_ids[0]));
    }

    let mut history = ItemPriceHistories::new();
    let days = self
      .histories
      .days_within(&req.region_name, &req.realm_slug, req.lower_bounds, req.upper_bounds)
      .await?;
    for day in days {
      if let Some(shard) = self.shard(&req.region_name, &req.realm_slug, day).await? {
        merge_window(&mut history, shard.decode(Some(&wanted))?, req.lower_bounds, req.upper_bounds);
      }
    }
    Ok(PriceHistoryResponse { history })
  }

  /// Drop cached live lists of realms that were just recomputed.
  pub async fn invalidate_live(&self, tuples: &[RegionRealmTimestampTuple]) {
    for t in tuples {
      self
        .live_cache
        .invalidate(&LiveAuctionStore::key(&t.region_name, &t.realm_slug))
        .await;
    }
  }

  /// Drop cached shards of the days that were just rewritten.
  pub async fn invalidate_histories(&self, tuples: &[RegionRealmTimestampTuple]) {
    for t in tuples {
      let key = self
        .histories
        .key(&t.region_name, &t.realm_slug, t.normalized_target_timestamp);
      self.shard_cache.invalidate(&key).await;
    }
  }
}
