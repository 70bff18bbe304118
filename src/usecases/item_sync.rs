//! Item Sync Use Case
//!
//! Keeps the item catalog bucket and the in-memory catalog in step with
//! the item ids seen in snapshots. Only records and icons that are not
//! stored yet are fetched from upstream.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::adapters::storage::ItemStore;
use crate::domain::auction::ItemId;
use crate::domain::error::{PipelineError, Result};
use crate::domain::item::Item;
use crate::domain::jobs::{
  ReceiveSyncedItemsRequest, SyncItemIconsRequest, SyncItemIconsResponse, SyncItemsRequest, SyncItemsResponse,
};
use crate::ports::upstream::UpstreamApi;
use crate::usecases::state::ServiceState;
use crate::usecases::worker_pool::{self, STORAGE_WIDTH};

enum Fetched {
  Stored(Item),
  Present,
  Failed(ItemId),
}

enum IconOutcome {
  Synced,
  Skipped,
  Failed,
}

pub struct ItemSync {
  upstream: Arc<dyn UpstreamApi>,
  items: ItemStore,
  state: Arc<ServiceState>,
}

impl ItemSync {
  pub fn new(upstream: Arc<dyn UpstreamApi>, items: ItemStore, state: Arc<ServiceState>) -> Arc<Self> {
    Arc::new(Self { upstream, items, state })
  }

  /// Load every stored item record into the catalog.
  pub async fn load_catalog(&self) -> Result<usize> {
    let items = self.items.load_all().await?;
    let count = self.state.merge_items(items).await;
    info!(items = count, "Item catalog loaded");
    Ok(count)
  }

  async fn fetch(&self, region_name: &str, id: ItemId) -> Fetched {
    match self.items.exists(id).await {
      Ok(true) => return Fetched::Present,
      Ok(false) => {}
      Err(e) => {
        warn!(item = id, error = %e, "Item lookup failed");
        return Fetched::Failed(id);
      }
    }

    let stored = async {
      let region = self.state.region(region_name)?;
      let item = self.upstream.item(region, id).await?;
      self.items.put(&item).await?;
      Ok::<_, PipelineError>(item)
    };
    match stored.await {
      Ok(item) => Fetched::Stored(item),
      Err(e) => {
        warn!(item = id, error = %e, "Item sync failed");
        Fetched::Failed(id)
      }
    }
  }

  /// Fetch and store every requested item that is not stored yet, then
  /// merge the new records into the catalog.
  ///
  /// Returns the response plus the records that were written.
  #[instrument(skip(self, req), fields(region = %req.region_name, requested = req.item_ids.len()))]
  pub async fn sync_items(self: &Arc<Self>, req: SyncItemsRequest) -> Result<(SyncItemsResponse, Vec<Item>)> {
    self.state.region(&req.region_name)?;

    let ids: Vec<ItemId> = req.item_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
    let sync = Arc::clone(self);
    let region_name = req.region_name.clone();
    let outcomes = worker_pool::fan_out(STORAGE_WIDTH, ids, move |id| {
      let sync = Arc::clone(&sync);
      let region_name = region_name.clone();
      async move { sync.fetch(&region_name, id).await }
    })
    .await;

    let mut response = SyncItemsResponse::default();
    let mut stored = Vec::new();
    for outcome in outcomes {
      match outcome {
        Fetched::Stored(item) => {
          response.synced.push(item.id);
          stored.push(item);
        }
        Fetched::Present => {}
        Fetched::Failed(id) => response.failed.push(id),
      }
    }
    response.synced.sort_unstable();
    response.failed.sort_unstable();

    self.state.merge_items(stored.clone()).await;
    info!(
      synced = response.synced.len(),
      failed = response.failed.len(),
      "Item sync complete"
    );
    Ok((response, stored))
  }

  async fn fetch_icon(&self, name: &str) -> IconOutcome {
    let result = async {
      if self.items.icon_exists(name).await? {
        return Ok(IconOutcome::Skipped);
      }
      let image = self.upstream.item_icon(name).await?;
      self.items.put_icon(name, image).await?;
      Ok::<_, PipelineError>(IconOutcome::Synced)
    };
    match result.await {
      Ok(outcome) => outcome,
      Err(e) => {
        warn!(icon = name, error = %e, "Icon sync failed");
        IconOutcome::Failed
      }
    }
  }

  /// Fetch every icon not yet in the icon bucket.
  #[instrument(skip(self, req), fields(requested = req.icon_names.len()))]
  pub async fn sync_icons(self: &Arc<Self>, req: SyncItemIconsRequest) -> SyncItemIconsResponse {
    let names: Vec<String> = req
      .icon_names
      .into_iter()
      .filter(|name| !name.is_empty())
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect();

    let sync = Arc::clone(self);
    let outcomes = worker_pool::fan_out(STORAGE_WIDTH, names, move |name| {
      let sync = Arc::clone(&sync);
      async move { sync.fetch_icon(&name).await }
    })
    .await;

    let mut response = SyncItemIconsResponse::default();
    for outcome in outcomes {
      match outcome {
        IconOutcome::Synced => response.synced += 1,
        IconOutcome::Skipped => response.skipped += 1,
        IconOutcome::Failed => response.failed += 1,
      }
    }
    info!(
      synced = response.synced,
      skipped = response.skipped,
      failed = response.failed,
      "Icon sync complete"
    );
    response
  }

  /// Merge records synced by another instance into the catalog.
  pub async fn receive_synced_items(&self, req: ReceiveSyncedItemsRequest) -> usize {
    self.state.merge_items(req.items).await
  }
}
