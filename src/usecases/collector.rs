//! Collector Cycle - Acquire, Compute, Announce
//!
//! One cycle over every whitelisted realm:
//! 1. bulk `downloadAuctions`, one `CollectAuctionsJob` per realm
//! 2. `receiveRealms` with the realms that moved forward
//! 3. bulk `computeLiveAuctions` and `computePricelistHistories`, run
//!    concurrently
//! 4. `auctionsIntake` / `pricelistsIntake` for the realms that computed
//! 5. `syncAllItems` per region with the item ids seen
//!
//! Failures stay per realm: a realm that fails acquisition or compute is
//! counted and logged, and the rest of the cycle carries on.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::auction::ItemId;
use crate::domain::error::Result;
use crate::domain::jobs::{
  CollectAuctionsJob, ComputeAllResponse, IntakeRequest, LoadRegionRealmTimestampsInJob, RealmTimestampUpdates,
  RegionRealmTimestampTuple, SyncItemsRequest,
};
use crate::domain::message::Subject;
use crate::domain::region::RegionName;
use crate::usecases::messenger::{Messenger, COMPUTE_TIMEOUT, DEFAULT_TIMEOUT, DOWNLOAD_TIMEOUT};
use crate::usecases::state::ServiceState;

/// Totals of one collector cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
  pub realms: usize,
  pub collected: usize,
  pub acquire_failures: usize,
  pub live: ComputeAllResponse,
  pub histories: ComputeAllResponse,
}

fn tuple_id(region: &str, realm: &str) -> String {
  format!("{region}/{realm}")
}

pub struct Collector {
  messenger: Messenger,
  state: Arc<ServiceState>,
  metrics: Arc<MetricsRegistry>,
}

impl Collector {
  pub fn new(messenger: Messenger, state: Arc<ServiceState>) -> Self {
    let metrics = Arc::clone(messenger.metrics());
    Self {
      messenger,
      state,
      metrics,
    }
  }

  /// Run one full cycle.
  #[instrument(skip(self))]
  pub async fn run_cycle(&self) -> Result<CycleSummary> {
    let timer = self.metrics.cycle_seconds.start_timer();
    let mut summary = CycleSummary::default();

    let (tuples, failures) = self.download_all(&mut summary).await?;
    summary.collected = tuples.len();
    summary.acquire_failures = failures;
    self.metrics.collected_realms.inc_by(tuples.len() as u64);

    if tuples.is_empty() {
      info!(realms = summary.realms, failures, "No realm produced a new snapshot");
      timer.observe_duration();
      return Ok(summary);
    }

    self.announce_realms(&tuples).await;

    let (live, histories) = tokio::try_join!(
      self.compute_all_live(tuples.clone()),
      self.compute_all_histories(tuples.clone()),
    )?;
    summary.live = live;
    summary.histories = histories;

    self.request_item_sync(&tuples).await;

    timer.observe_duration();
    info!(
      realms = summary.realms,
      collected = summary.collected,
      failures = summary.acquire_failures,
      live = summary.live.included_realms,
      histories = summary.histories.included_realms,
      "Collector cycle complete"
    );
    Ok(summary)
  }

  async fn download_all(&self, summary: &mut CycleSummary) -> Result<(Vec<RegionRealmTimestampTuple>, usize)> {
    let realms = self.state.whitelisted_realms().await;
    summary.realms = realms.len();

    let mut regions: HashMap<String, RegionName> = HashMap::with_capacity(realms.len());
    let mut requests = Vec::with_capacity(realms.len());
    for (region, realm) in &realms {
      let job = CollectAuctionsJob {
        region_name: region.name.clone(),
        realm_slug: realm.slug().to_string(),
      };
      let id = tuple_id(&region.name, realm.slug());
      regions.insert(id.clone(), region.name.clone());
      requests.push((id, serde_json::to_string(&job)?));
    }

    let replies = self
      .messenger
      .bulk_request(Subject::DownloadAuctions, requests, DOWNLOAD_TIMEOUT)
      .await?;

    let mut tuples = Vec::new();
    let mut failures = 0;
    for (id, reply) in replies {
      if !reply.is_ok() {
        warn!(realm = %id, code = reply.code_or_blank().label(), error = ?reply.error, "Download failed");
        let region = regions.get(&id).map_or("unknown", String::as_str);
        self.metrics.acquire_failures.with_label_values(&[region]).inc();
        failures += 1;
        continue;
      }
      // Empty data: upstream had nothing newer
      if reply.data.is_empty() {
        continue;
      }
      match reply.decode_data::<RegionRealmTimestampTuple>() {
        Ok(tuple) => tuples.push(tuple),
        Err(e) => {
          warn!(realm = %id, error = %e, "Undecodable download reply");
          failures += 1;
        }
      }
    }
    tuples.sort_by(|a, b| (&a.region_name, &a.realm_slug).cmp(&(&b.region_name, &b.realm_slug)));
    Ok((tuples, failures))
  }

  async fn announce_realms(&self, tuples: &[RegionRealmTimestampTuple]) {
    let updates = RealmTimestampUpdates {
      updates: tuples.to_vec(),
    };
    let outcome = match serde_json::to_string(&updates) {
      Ok(data) => self.messenger.request(Subject::ReceiveRealms, data, DEFAULT_TIMEOUT).await,
      Err(e) => Err(e.into()),
    };
    match outcome {
      Ok(reply) if reply.is_ok() => {}
      Ok(reply) => warn!(error = ?reply.error, "receiveRealms rejected"),
      Err(e) => warn!(error = %e, "receiveRealms failed"),
    }
  }

  /// Fan one compute subject out over `tuples`; returns the counts and
  /// the tuples that computed.
  async fn fan_compute(
    &self,
    subject: Subject,
    tuples: Vec<RegionRealmTimestampTuple>,
  ) -> Result<(ComputeAllResponse, Vec<RegionRealmTimestampTuple>)> {
    let mut by_id: BTreeMap<String, RegionRealmTimestampTuple> = BTreeMap::new();
    let mut requests = Vec::with_capacity(tuples.len());
    for tuple in tuples {
      let id = tuple_id(&tuple.region_name, &tuple.realm_slug);
      requests.push((id.clone(), serde_json::to_string(&LoadRegionRealmTimestampsInJob::from(&tuple))?));
      by_id.insert(id, tuple);
    }

    let replies = self.messenger.bulk_request(subject, requests, COMPUTE_TIMEOUT).await?;

    let mut response = ComputeAllResponse::default();
    let mut included = Vec::new();
    for (id, tuple) in by_id {
      match replies.get(&id) {
        Some(reply) if reply.is_ok() => {
          response.included_realms += 1;
          included.push(tuple);
        }
        Some(reply) => {
          warn!(subject = %subject, realm = %id, error = ?reply.error, "Compute failed");
          response.failed_realms += 1;
        }
        None => response.failed_realms += 1,
      }
    }
    Ok((response, included))
  }

  /// Recompute live auctions for `tuples` and announce the result.
  pub async fn compute_all_live(&self, tuples: Vec<RegionRealmTimestampTuple>) -> Result<ComputeAllResponse> {
    let (response, included) = self.fan_compute(Subject::ComputeLiveAuctions, tuples).await?;
    self
      .metrics
      .included_realms
      .set(i64::try_from(response.included_realms).unwrap_or(i64::MAX));

    if !included.is_empty() {
      let intake = IntakeRequest { tuples: included };
      self
        .messenger
        .publish(Subject::AuctionsIntake, serde_json::to_string(&intake)?)
        .await?;
    }
    info!(
      included = response.included_realms,
      failed = response.failed_realms,
      "Live auctions computed"
    );
    Ok(response)
  }

  /// Fold `tuples` into their history shards and announce the result.
  pub async fn compute_all_histories(&self, tuples: Vec<RegionRealmTimestampTuple>) -> Result<ComputeAllResponse> {
    let (response, included) = self
      .fan_compute(Subject::ComputePricelistHistories, tuples)
      .await?;

    if !included.is_empty() {
      let intake = IntakeRequest { tuples: included };
      self
        .messenger
        .publish(Subject::PricelistsIntake, serde_json::to_string(&intake)?)
        .await?;
    }
    info!(
      included = response.included_realms,
      failed = response.failed_realms,
      "Price histories computed"
    );
    Ok(response)
  }

  async fn request_item_sync(&self, tuples: &[RegionRealmTimestampTuple]) {
    let mut by_region: BTreeMap<&str, BTreeSet<ItemId>> = BTreeMap::new();
    for tuple in tuples {
      by_region
        .entry(tuple.region_name.as_str())
        .or_default()
        .extend(tuple.item_ids.iter().copied());
    }

    for (region, ids) in by_region {
      let request = SyncItemsRequest {
        region_name: region.to_string(),
        item_ids: ids.into_iter().collect(),
      };
      let published = match serde_json::to_string(&request) {
        Ok(data) => self.messenger.publish(Subject::SyncAllItems, data).await,
        Err(e) => Err(e.into()),
      };
      if let Err(e) = published {
        warn!(region, error = %e, "Failed to request item sync");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::bus::InMemoryBus;
  use crate::domain::error::PipelineError;
  use crate::domain::message::Message;
  use crate::ports::message_bus::MessageBus;
  use crate::usecases::messenger::handler;
  use crate::usecases::state::fixtures::state_with;
  use crate::usecases::worker_pool::LISTENER_WIDTH;

  fn tuple(realm: &str) -> RegionRealmTimestampTuple {
    RegionRealmTimestampTuple {
      region_name: "us".to_string(),
      realm_slug: realm.to_string(),
      target_timestamp: 1_700_000_000,
      normalized_target_timestamp: 1_699_920_000,
      item_ids: vec![25, 30],
    }
  }

  async fn setup(realms: &[(&str, &str)]) -> (Collector, Messenger, Arc<InMemoryBus>) {
    let bus = Arc::new(InMemoryBus::new());
    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    let messenger = Messenger::new(bus.clone(), metrics);
    let state = Arc::new(state_with(realms, vec![]).await);
    (Collector::new(messenger.clone(), state), messenger, bus)
  }

  #[tokio::test]
  async fn test_cycle_computes_collected_realms_only() {
    let (collector, messenger, bus) = setup(&[("us", "earthen-ring"), ("us", "stormrage")]).await;

    let download = messenger
      .listen(
        Subject::DownloadAuctions,
        LISTENER_WIDTH,
        handler(|msg: Message| async move {
          let job: CollectAuctionsJob = serde_json::from_str(&msg.data).unwrap();
          if job.realm_slug == "earthen-ring" {
            Message::encode(&tuple("earthen-ring")).unwrap()
          } else {
            Message::blank()
          }
        }),
      )
      .await
      .unwrap();
    let receive = messenger
      .listen(Subject::ReceiveRealms, 1, handler(|_| async { Message::blank() }))
      .await
      .unwrap();
    let live = messenger
      .listen(Subject::ComputeLiveAuctions, 2, handler(|_| async { Message::blank() }))
      .await
      .unwrap();
    let hist = messenger
      .listen(Subject::ComputePricelistHistories, 2, handler(|_| async { Message::blank() }))
      .await
      .unwrap();
    let mut intake = bus.subscribe("auctionsIntake").await.unwrap();
    let mut sync = bus.subscribe("syncAllItems").await.unwrap();

    let summary = collector.run_cycle().await.unwrap();
    assert_eq!(summary.realms, 2);
    assert_eq!(summary.collected, 1);
    assert_eq!(summary.live.included_realms, 1);
    assert_eq!(summary.histories.included_realms, 1);
    assert_eq!(collector.metrics.included_realms.get(), 1);

    let announced = Message::from_bytes(&intake.receiver.recv().await.unwrap().payload).unwrap();
    let request: IntakeRequest = serde_json::from_str(&announced.data).unwrap();
    assert_eq!(request.tuples, vec![tuple("earthen-ring")]);

    let sync_msg = Message::from_bytes(&sync.receiver.recv().await.unwrap().payload).unwrap();
    let sync_req: SyncItemsRequest = serde_json::from_str(&sync_msg.data).unwrap();
    assert_eq!(sync_req.item_ids, vec![25, 30]);

    for listener in [download, receive, live, hist] {
      listener.stop(bus.as_ref()).await.unwrap();
    }
  }

  #[tokio::test]
  async fn test_download_failures_counted_per_region() {
    let (collector, messenger, bus) = setup(&[("us", "earthen-ring")]).await;
    let download = messenger
      .listen(
        Subject::DownloadAuctions,
        1,
        handler(|_| async { Message::failure(&PipelineError::UpstreamUnreachable("reset".into())) }),
      )
      .await
      .unwrap();

    let summary = collector.run_cycle().await.unwrap();
    assert_eq!(summary.collected, 0);
    assert_eq!(summary.acquire_failures, 1);
    assert_eq!(
      collector.metrics.acquire_failures.with_label_values(&["us"]).get(),
      1
    );
    download.stop(bus.as_ref()).await.unwrap();
  }

  #[tokio::test]
  async fn test_compute_partial_failure_sets_gauge() {
    let (collector, messenger, bus) = setup(&[("us", "earthen-ring")]).await;
    let live = messenger
      .listen(
        Subject::ComputeLiveAuctions,
        4,
        handler(|msg: Message| async move {
          let job: LoadRegionRealmTimestampsInJob = serde_json::from_str(&msg.data).unwrap();
          if job.realm_slug.ends_with('3') {
            Message::failure(&PipelineError::StorageIo("disk".into()))
          } else {
            Message::blank()
          }
        }),
      )
      .await
      .unwrap();

    let tuples: Vec<_> = (0..5).map(|n| tuple(&format!("realm-{n}"))).collect();
    let response = collector.compute_all_live(tuples).await.unwrap();
    assert_eq!(response.included_realms, 4);
    assert_eq!(response.failed_realms, 1);
    assert_eq!(collector.metrics.included_realms.get(), 4);
    live.stop(bus.as_ref()).await.unwrap();
  }
}
