//! Compute Use Case - Live Auctions and Price Histories
//!
//! Both stages start from a persisted raw snapshot, so they can run
//! concurrently after acquisition and can be replayed for any timestamp
//! still in the raw store.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::adapters::storage::{LiveAuctionStore, PriceHistoryStore, RawAuctionStore};
use crate::domain::auction::{dedupe, MiniAuction};
use crate::domain::error::Result;
use crate::domain::jobs::{ComputeJobResponse, LoadRegionRealmTimestampsInJob};
use crate::domain::pricelist::price_list;

pub struct Computer {
  raw: RawAuctionStore,
  live: LiveAuctionStore,
  histories: PriceHistoryStore,
}

impl Computer {
  pub fn new(raw: RawAuctionStore, live: LiveAuctionStore, histories: PriceHistoryStore) -> Arc<Self> {
    Arc::new(Self { raw, live, histories })
  }

  async fn minis(&self, job: &LoadRegionRealmTimestampsInJob) -> Result<Vec<MiniAuction>> {
    let body = self
      .raw
      .get(&job.region_name, &job.realm_slug, job.target_timestamp)
      .await?;
    Ok(dedupe(&body.auctions))
  }

  /// Dedupe a snapshot and overwrite the realm's live auctions.
  #[instrument(skip(self), fields(region = %job.region_name, realm = %job.realm_slug, ts = job.target_timestamp))]
  pub async fn compute_live(&self, job: &LoadRegionRealmTimestampsInJob) -> Result<ComputeJobResponse> {
    let minis = self.minis(job).await?;
    self.live.put(&job.region_name, &job.realm_slug, &minis).await?;

    Ok(ComputeJobResponse {
      region_name: job.region_name.clone(),
      realm_slug: job.realm_slug.clone(),
      target_timestamp: job.target_timestamp,
      item_count: minis.len(),
    })
  }

  /// Fold a snapshot's price list into its day's history shard.
  #[instrument(skip(self), fields(region = %job.region_name, realm = %job.realm_slug, ts = job.target_timestamp))]
  pub async fn compute_history(&self, job: &LoadRegionRealmTimestampsInJob) -> Result<ComputeJobResponse> {
    let minis = self.minis(job).await?;
    let prices = price_list(&minis);
    let shard_items = self
      .histories
      .merge(&job.region_name, &job.realm_slug, job.target_timestamp, &prices)
      .await?;

    info!(items = prices.len(), shard_items, "Price history merged");
    Ok(ComputeJobResponse {
      region_name: job.region_name.clone(),
      realm_slug: job.realm_slug.clone(),
      target_timestamp: job.target_timestamp,
      item_count: prices.len(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::storage::InMemoryObjectStore;
  use std::collections::HashSet;

  const BODY: &str = r#"{"auctions":[
    {"auc":100,"item":25,"owner":"Lokien","ownerRealm":"Earthen Ring","bid":10,"buyout":500,"quantity":5,"timeLeft":"LONG"},
    {"auc":101,"item":25,"owner":"Lokien","ownerRealm":"Earthen Ring","bid":10,"buyout":500,"quantity":5,"timeLeft":"LONG"},
    {"auc":102,"item":30,"owner":"Anduin","ownerRealm":"Earthen Ring","bid":5,"buyout":90,"quantity":1,"timeLeft":"SHORT"}]}"#;

  fn job(ts: i64) -> LoadRegionRealmTimestampsInJob {
    LoadRegionRealmTimestampsInJob {
      region_name: "us".to_string(),
      realm_slug: "earthen-ring".to_string(),
      target_timestamp: ts,
    }
  }

  async fn setup() -> (Arc<Computer>, LiveAuctionStore, PriceHistoryStore) {
    let store = Arc::new(InMemoryObjectStore::new());
    let raw = RawAuctionStore::new(store.clone());
    raw.put("us", "earthen-ring", 1_700_000_000, BODY.as_bytes()).await.unwrap();
    let live = LiveAuctionStore::new(store.clone());
    let histories = PriceHistoryStore::new(store, "retail");
    (Computer::new(raw, live.clone(), histories.clone()), live, histories)
  }

  #[tokio::test]
  async fn test_compute_live_dedupes() {
    let (computer, live, _) = setup().await;
    let response = computer.compute_live(&job(1_700_000_000)).await.unwrap();
    assert_eq!(response.item_count, 2);

    let minis = live.get("us", "earthen-ring").await.unwrap();
    let listings: usize = minis.iter().map(MiniAuction::listing_count).sum();
    assert_eq!(listings, 3);
  }

  #[tokio::test]
  async fn test_compute_history_writes_shard_rows() {
    let (computer, _, histories) = setup().await;
    computer.compute_history(&job(1_700_000_000)).await.unwrap();

    let shard = histories.load("us", "earthen-ring", 1_699_920_000).await.unwrap().unwrap();
    let ids: HashSet<u64> = shard.rows.keys().copied().collect();
    assert_eq!(ids, HashSet::from([25, 30]));
    let decoded = shard.decode(None).unwrap();
    assert_eq!(decoded[&25][&1_700_000_000].volume, 10);
  }

  #[tokio::test]
  async fn test_missing_snapshot_is_reported() {
    let (computer, _, _) = setup().await;
    assert!(computer.compute_live(&job(1)).await.unwrap_err().is_missing());
  }
}
