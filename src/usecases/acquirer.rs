//! Acquirer Use Case - Snapshot Acquisition
//!
//! Per realm: fetch the upstream index, skip when the snapshot is not
//! newer than the one remembered, otherwise download it, persist it to
//! the raw store and record it in the day's manifest.
//!
//! Flow:
//! 1. `auction_info` for the realm
//! 2. `last_modified <= remembered` → no new data
//! 3. download + parse (a malformed body is `UpstreamParse`)
//! 4. raw snapshot write, then manifest append
//! 5. remember the new `last_modified`

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::adapters::storage::{ManifestStore, RawAuctionStore};
use crate::domain::auction::{AuctionsBody, ItemId};
use crate::domain::error::{PipelineError, Result};
use crate::domain::jobs::{CollectAuctionsJob, RegionRealmTimestampTuple};
use crate::domain::timestamp::{display, normalize};
use crate::ports::upstream::UpstreamApi;
use crate::usecases::state::ServiceState;
use crate::usecases::worker_pool::{self, ACQUIRE_WIDTH};

pub struct Acquirer {
  upstream: Arc<dyn UpstreamApi>,
  raw: RawAuctionStore,
  manifests: ManifestStore,
  state: Arc<ServiceState>,
}

impl Acquirer {
  pub fn new(
    upstream: Arc<dyn UpstreamApi>,
    raw: RawAuctionStore,
    manifests: ManifestStore,
    state: Arc<ServiceState>,
  ) -> Self {
    Self {
      upstream,
      raw,
      manifests,
      state,
    }
  }

  /// Acquire the newest snapshot of one realm.
  ///
  /// Returns `None` when upstream has nothing newer than what we hold.
  #[instrument(skip(self), fields(region = %job.region_name, realm = %job.realm_slug))]
  pub async fn collect(&self, job: &CollectAuctionsJob) -> Result<Option<RegionRealmTimestampTuple>> {
    let region = self.state.region(&job.region_name)?.clone();
    let realm = self.state.realm(&job.region_name, &job.realm_slug).await?;

    let info = self.upstream.auction_info(&region, &realm).await?;
    if info.last_modified <= realm.last_modified {
      info!(
        last_modified = info.last_modified,
        remembered = realm.last_modified,
        "No new snapshot"
      );
      return Ok(None);
    }

    let body = self.upstream.download(&info.url).await?;
    let parsed: AuctionsBody =
      serde_json::from_slice(&body).map_err(|e| PipelineError::UpstreamParse(e.to_string()))?;

    self
      .raw
      .put(&job.region_name, &job.realm_slug, info.last_modified, &body)
      .await?;
    self
      .manifests
      .append(&job.region_name, &job.realm_slug, info.last_modified)
      .await?;
    self
      .state
      .record_last_modified(&job.region_name, &job.realm_slug, info.last_modified)
      .await;

    let item_ids: Vec<ItemId> = parsed
      .auctions
      .iter()
      .map(|a| a.item_id)
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect();

    info!(
      snapshot = %display(info.last_modified),
      auctions = parsed.auctions.len(),
      items = item_ids.len(),
      "Snapshot acquired"
    );

    Ok(Some(RegionRealmTimestampTuple {
      region_name: job.region_name.clone(),
      realm_slug: job.realm_slug.clone(),
      target_timestamp: info.last_modified,
      normalized_target_timestamp: normalize(info.last_modified),
      item_ids,
    }))
  }

  /// Acquire many realms with at most four in flight.
  ///
  /// A failing realm is logged and reported; the others carry on.
  pub async fn collect_all(
    self: &Arc<Self>,
    jobs: Vec<CollectAuctionsJob>,
  ) -> Vec<(CollectAuctionsJob, Result<Option<RegionRealmTimestampTuple>>)> {
    let acquirer = Arc::clone(self);
    worker_pool::fan_out(ACQUIRE_WIDTH, jobs, move |job| {
      let acquirer = Arc::clone(&acquirer);
      async move {
        let result = acquirer.collect(&job).await;
        if let Err(e) = &result {
          warn!(region = %job.region_name, realm = %job.realm_slug, error = %e, "Acquisition failed");
        }
        (job, result)
      }
    })
    .await
  }
}
