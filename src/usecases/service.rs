//! Pipeline Service - Subject Wiring
//!
//! Builds every use case over one object store, one upstream and one
//! messenger, binds each bus subject to its use case and drives the
//! collector and cleanup timers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::adapters::storage::{ItemStore, LiveAuctionStore, ManifestStore, PriceHistoryStore, RawAuctionStore};
use crate::domain::error::Result;
use crate::domain::jobs::{
  CleanupAuctionManifestJob, CleanupPricelistPayload, CollectAuctionsJob, IntakeRequest,
  LoadRegionRealmTimestampsInJob, RealmTimestampUpdates, ReceiveSyncedItemsRequest, RuntimeInfo,
  StatusRequest, SyncItemIconsRequest, SyncItemsRequest, SyncItemsResponse,
};
use crate::domain::message::{Code, Message, Subject};
use crate::domain::query::{
  ItemsQueryRequest, ItemsRequest, OwnersRequest, PriceHistoryRequest, PriceListRequest, QueryAuctionsRequest,
};
use crate::domain::region::Realm;
use crate::domain::timestamp;
use crate::ports::message_bus::MessageBus;
use crate::ports::object_store::ObjectStore;
use crate::ports::upstream::UpstreamApi;
use crate::usecases::acquirer::Acquirer;
use crate::usecases::cleanup::{Cleanup, CleanupSweeper};
use crate::usecases::collector::Collector;
use crate::usecases::compute::Computer;
use crate::usecases::item_sync::ItemSync;
use crate::usecases::messenger::{handler, Handler, Listener, Messenger};
use crate::usecases::query::QueryEngine;
use crate::usecases::scheduler::PeriodicTask;
use crate::usecases::state::ServiceState;
use crate::usecases::worker_pool::{ACQUIRE_WIDTH, CPU_WIDTH, LISTENER_WIDTH, STORAGE_WIDTH};

/// Every subject this service answers.
pub const SERVED_SUBJECTS: [Subject; 30] = [
  Subject::Boot,
  Subject::Status,
  Subject::Regions,
  Subject::Auctions,
  Subject::AuctionsIntake,
  Subject::AuctionsQuery,
  Subject::Owners,
  Subject::OwnersQuery,
  Subject::Items,
  Subject::ItemsQuery,
  Subject::ItemClasses,
  Subject::PriceList,
  Subject::PriceListHistory,
  Subject::PricelistsIntake,
  Subject::DownloadAuctions,
  Subject::ComputeLiveAuctions,
  Subject::ComputePricelistHistories,
  Subject::ComputeAllLiveAuctions,
  Subject::ComputeAllPricelistHistories,
  Subject::CleanupAllExpiredManifests,
  Subject::CleanupExpiredManifest,
  Subject::CleanupAllPricelistHistories,
  Subject::CleanupPricelistHistories,
  Subject::ReceiveRealms,
  Subject::SyncAllItems,
  Subject::SyncItemIcons,
  Subject::ReceiveSyncedItems,
  Subject::SessionSecret,
  Subject::RuntimeInfo,
  Subject::GenericTestErrors,
];

/// Decode the request payload as `Req`, run `f`, encode its result.
///
/// A payload that does not decode is answered with `ParseError`.
pub fn json_handler<Req, Resp, F, Fut>(f: F) -> Handler
where
  Req: DeserializeOwned + Send + 'static,
  Resp: Serialize + Send + 'static,
  F: Fn(Req) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<Resp>> + Send + 'static,
{
  handler(move |msg: Message| {
    let pending = msg.decode_data::<Req>().map(&f);
    async move {
      match pending {
        Ok(fut) => Message::from_result(fut.await),
        Err(e) => Message::failure(&e),
      }
    }
  })
}

/// Fetch every region's realm list from upstream into the service state.
///
/// A region whose list cannot be fetched keeps no realms and is logged.
pub async fn load_realms(upstream: &dyn UpstreamApi, state: &ServiceState) -> usize {
  let mut total = 0;
  for region in state.regions() {
    match upstream.realms(region).await {
      Ok(records) => {
        let realms: Vec<Realm> = records
          .into_iter()
          .map(|record| Realm::new(record, region.name.clone()))
          .collect();
        match state.set_realms(&region.name, realms).await {
          Ok(count) => total += count,
          Err(e) => warn!(region = %region.name, error = %e, "Failed to install realms"),
        }
      }
      Err(e) => warn!(region = %region.name, error = %e, "Failed to fetch realms"),
    }
  }
  info!(realms = total, "Whitelisted realms loaded");
  total
}

pub struct PipelineService {
  state: Arc<ServiceState>,
  messenger: Messenger,
  acquirer: Arc<Acquirer>,
  computer: Arc<Computer>,
  cleanup: Arc<Cleanup>,
  sweeper: Arc<CleanupSweeper>,
  query: Arc<QueryEngine>,
  item_sync: Arc<ItemSync>,
  collector: Arc<Collector>,
}

impl PipelineService {
  pub fn new(
    store: Arc<dyn ObjectStore>,
    upstream: Arc<dyn UpstreamApi>,
    messenger: Messenger,
    state: Arc<ServiceState>,
    retention_days: i64,
  ) -> Arc<Self> {
    let raw = RawAuctionStore::new(Arc::clone(&store));
    let manifests = ManifestStore::new(Arc::clone(&store));
    let live = LiveAuctionStore::new(Arc::clone(&store));
    let histories = PriceHistoryStore::new(Arc::clone(&store), state.game_version());
    let items = ItemStore::new(store);

    let acquirer = Arc::new(Acquirer::new(
      Arc::clone(&upstream),
      raw.clone(),
      manifests.clone(),
      Arc::clone(&state),
    ));
    let computer = Computer::new(raw.clone(), live.clone(), histories.clone());
    let cleanup = Arc::new(Cleanup::new(
      raw,
      manifests,
      histories.clone(),
      Arc::clone(&state),
      retention_days,
    ));
    let sweeper = Arc::new(CleanupSweeper::new(
      Arc::clone(&cleanup),
      messenger.clone(),
      Arc::clone(messenger.metrics()),
    ));
    let query = Arc::new(QueryEngine::new(live, histories, Arc::clone(&state)));
    let item_sync = ItemSync::new(upstream, items, Arc::clone(&state));
    let collector = Arc::new(Collector::new(messenger.clone(), Arc::clone(&state)));

    Arc::new(Self {
      state,
      messenger,
      acquirer,
      computer,
      cleanup,
      sweeper,
      query,
      item_sync,
      collector,
    })
  }

  pub fn state(&self) -> &Arc<ServiceState> {
    &self.state
  }

  pub fn collector(&self) -> &Arc<Collector> {
    &self.collector
  }

  pub fn item_sync(&self) -> &Arc<ItemSync> {
    &self.item_sync
  }

  fn runtime_info(&self) -> RuntimeInfo {
    RuntimeInfo {
      version: env!("CARGO_PKG_VERSION").to_string(),
      game_version: self.state.game_version().to_string(),
      subjects: SERVED_SUBJECTS.iter().map(|s| s.as_str().to_string()).collect(),
    }
  }

  /// Bind every subject in `SERVED_SUBJECTS`.
  pub async fn start(self: &Arc<Self>) -> Result<Vec<Listener>> {
    let mut listeners = Vec::with_capacity(SERVED_SUBJECTS.len());
    for subject in SERVED_SUBJECTS {
      let (width, serve) = self.route(subject);
      listeners.push(self.messenger.listen(subject, width, serve).await?);
    }
    info!(subjects = listeners.len(), "All subjects bound");
    Ok(listeners)
  }

  /// Worker width and handler of one subject.
  #[allow(clippy::too_many_lines)]
  fn route(self: &Arc<Self>, subject: Subject) -> (usize, Handler) {
    let svc = Arc::clone(self);
    match subject {
      Subject::Boot => (
        LISTENER_WIDTH,
        handler(move |_| {
          let boot = svc.state.boot();
          async move { Message::from_result(Ok(boot)) }
        }),
      ),
      Subject::Regions => (
        LISTENER_WIDTH,
        handler(move |_| {
          let regions = svc.state.regions().to_vec();
          async move { Message::from_result(Ok(regions)) }
        }),
      ),
      Subject::ItemClasses => (
        LISTENER_WIDTH,
        handler(move |_| {
          let classes = svc.state.item_classes().to_vec();
          async move { Message::from_result(Ok(classes)) }
        }),
      ),
      Subject::SessionSecret => (
        LISTENER_WIDTH,
        handler(move |_| {
          let secret = svc.state.session_secret().to_string();
          async move { Message::ok(secret) }
        }),
      ),
      Subject::RuntimeInfo => (
        LISTENER_WIDTH,
        handler(move |_| {
          let info = svc.runtime_info();
          async move { Message::from_result(Ok(info)) }
        }),
      ),
      Subject::GenericTestErrors => (
        CPU_WIDTH,
        handler(|_| async { Message::with_code(Code::GenericError, "test error") }),
      ),
      Subject::Status => (
        LISTENER_WIDTH,
        json_handler(move |req: StatusRequest| {
          let svc = Arc::clone(&svc);
          async move { svc.state.status(&req.region_name).await }
        }),
      ),
      Subject::Auctions | Subject::AuctionsQuery => (
        LISTENER_WIDTH,
        json_handler(move |req: QueryAuctionsRequest| {
          let svc = Arc::clone(&svc);
          async move { svc.query.auctions(&req).await }
        }),
      ),
      Subject::Owners | Subject::OwnersQuery => (
        LISTENER_WIDTH,
        json_handler(move |req: OwnersRequest| {
          let svc = Arc::clone(&svc);
          async move { svc.query.owners(&req).await }
        }),
      ),
      Subject::Items => (
        LISTENER_WIDTH,
        json_handler(move |req: ItemsRequest| {
          let svc = Arc::clone(&svc);
          async move { Ok(svc.query.items(&req).await) }
        }),
      ),
      Subject::ItemsQuery => (
        LISTENER_WIDTH,
        json_handler(move |req: ItemsQueryRequest| {
          let svc = Arc::clone(&svc);
          async move { Ok(svc.query.items_query(&req).await) }
        }),
      ),
      Subject::PriceList => (
        LISTENER_WIDTH,
        json_handler(move |req: PriceListRequest| {
          let svc = Arc::clone(&svc);
          async move { svc.query.price_list(&req).await }
        }),
      ),
      Subject::PriceListHistory => (
        LISTENER_WIDTH,
        json_handler(move |req: PriceHistoryRequest| {
          let svc = Arc::clone(&svc);
          async move { svc.query.price_history(&req).await }
        }),
      ),
      Subject::AuctionsIntake => (
        CPU_WIDTH,
        handler(move |msg: Message| {
          let svc = Arc::clone(&svc);
          async move {
            match msg.decode_data::<IntakeRequest>() {
              Ok(req) => {
                svc.query.invalidate_live(&req.tuples).await;
                Message::blank()
              }
              Err(e) => Message::failure(&e),
            }
          }
        }),
      ),
      Subject::PricelistsIntake => (
        CPU_WIDTH,
        handler(move |msg: Message| {
          let svc = Arc::clone(&svc);
          async move {
            match msg.decode_data::<IntakeRequest>() {
              Ok(req) => {
                svc.query.invalidate_histories(&req.tuples).await;
                Message::blank()
              }
              Err(e) => Message::failure(&e),
            }
          }
        }),
      ),
      Subject::DownloadAuctions => (
        ACQUIRE_WIDTH,
        handler(move |msg: Message| {
          let svc = Arc::clone(&svc);
          async move {
            let job = match msg.decode_data::<CollectAuctionsJob>() {
              Ok(job) => job,
              Err(e) => return Message::failure(&e),
            };
            match svc.acquirer.collect(&job).await {
              Ok(Some(tuple)) => Message::from_result(Ok(tuple)),
              Ok(None) => Message::blank(),
              Err(e) => Message::failure(&e),
            }
          }
        }),
      ),
      Subject::ComputeLiveAuctions => (
        STORAGE_WIDTH,
        json_handler(move |job: LoadRegionRealmTimestampsInJob| {
          let svc = Arc::clone(&svc);
          async move { svc.computer.compute_live(&job).await }
        }),
      ),
      Subject::ComputePricelistHistories => (
        STORAGE_WIDTH,
        json_handler(move |job: LoadRegionRealmTimestampsInJob| {
          let svc = Arc::clone(&svc);
          async move { svc.computer.compute_history(&job).await }
        }),
      ),
      Subject::ComputeAllLiveAuctions => (
        CPU_WIDTH,
        json_handler(move |req: IntakeRequest| {
          let svc = Arc::clone(&svc);
          async move { svc.collector.compute_all_live(req.tuples).await }
        }),
      ),
      Subject::ComputeAllPricelistHistories => (
        CPU_WIDTH,
        json_handler(move |req: IntakeRequest| {
          let svc = Arc::clone(&svc);
          async move { svc.collector.compute_all_histories(req.tuples).await }
        }),
      ),
      Subject::CleanupAllExpiredManifests => (
        CPU_WIDTH,
        handler(move |_| {
          let svc = Arc::clone(&svc);
          async move { Message::from_result(svc.sweeper.sweep_manifests(timestamp::now()).await) }
        }),
      ),
      Subject::CleanupExpiredManifest => (
        STORAGE_WIDTH,
        json_handler(move |job: CleanupAuctionManifestJob| {
          let svc = Arc::clone(&svc);
          async move { svc.cleanup.cleanup_manifest(&job).await }
        }),
      ),
      Subject::CleanupAllPricelistHistories => (
        CPU_WIDTH,
        handler(move |_| {
          let svc = Arc::clone(&svc);
          async move { Message::from_result(svc.sweeper.sweep_histories().await) }
        }),
      ),
      Subject::CleanupPricelistHistories => (
        STORAGE_WIDTH,
        json_handler(move |payload: CleanupPricelistPayload| {
          let svc = Arc::clone(&svc);
          async move { svc.cleanup.cleanup_histories(&payload, timestamp::now()).await }
        }),
      ),
      Subject::ReceiveRealms => (
        CPU_WIDTH,
        handler(move |msg: Message| {
          let svc = Arc::clone(&svc);
          async move {
            let updates = match msg.decode_data::<RealmTimestampUpdates>() {
              Ok(updates) => updates,
              Err(e) => return Message::failure(&e),
            };
            for t in &updates.updates {
              svc
                .state
                .record_last_modified(&t.region_name, &t.realm_slug, t.target_timestamp)
                .await;
            }
            Message::blank()
          }
        }),
      ),
      Subject::SyncAllItems => (
        CPU_WIDTH,
        json_handler(move |req: SyncItemsRequest| {
          let svc = Arc::clone(&svc);
          async move { svc.sync_all_items(req).await }
        }),
      ),
      Subject::SyncItemIcons => (
        CPU_WIDTH,
        json_handler(move |req: SyncItemIconsRequest| {
          let svc = Arc::clone(&svc);
          async move { Ok(svc.item_sync.sync_icons(req).await) }
        }),
      ),
      Subject::ReceiveSyncedItems => (
        CPU_WIDTH,
        handler(move |msg: Message| {
          let svc = Arc::clone(&svc);
          async move {
            match msg.decode_data::<ReceiveSyncedItemsRequest>() {
              Ok(req) => {
                svc.item_sync.receive_synced_items(req).await;
                Message::blank()
              }
              Err(e) => Message::failure(&e),
            }
          }
        }),
      ),
    }
  }

  /// Sync item records, then their icons, then tell the other instances.
  async fn sync_all_items(&self, req: SyncItemsRequest) -> Result<SyncItemsResponse> {
    let (response, stored) = self.item_sync.sync_items(req).await?;
    if stored.is_empty() {
      return Ok(response);
    }

    let icons = SyncItemIconsRequest {
      icon_names: stored.iter().map(|item| item.icon.clone()).collect(),
    };
    self.item_sync.sync_icons(icons).await;

    let announce = ReceiveSyncedItemsRequest { items: stored };
    self
      .messenger
      .publish(Subject::ReceiveSyncedItems, serde_json::to_string(&announce)?)
      .await?;
    Ok(response)
  }

  /// Start the collector and cleanup timers.
  pub fn spawn_timers(self: &Arc<Self>, collect_every: Duration, cleanup_every: Duration) -> Vec<PeriodicTask> {
    let collector = Arc::clone(&self.collector);
    let collect = PeriodicTask::spawn("collector", collect_every, move || {
      let collector = Arc::clone(&collector);
      async move {
        if let Err(e) = collector.run_cycle().await {
          error!(error = %e, "Collector cycle failed");
        }
      }
    });

    let sweeper = Arc::clone(&self.sweeper);
    let cleanup = PeriodicTask::spawn("cleanup", cleanup_every, move || {
      let sweeper = Arc::clone(&sweeper);
      async move {
        if let Err(e) = sweeper.sweep_manifests(timestamp::now()).await {
          error!(error = %e, "Manifest sweep failed");
        }
        if let Err(e) = sweeper.sweep_histories().await {
          error!(error = %e, "History sweep failed");
        }
      }
    });

    vec![collect, cleanup]
  }
}

/// Unsubscribe every listener and wait for in-flight requests.
pub async fn stop_listeners(bus: &dyn MessageBus, listeners: Vec<Listener>) {
  for listener in listeners {
    let subject = listener.subject;
    if let Err(e) = listener.stop(bus).await {
      warn!(subject = %subject, error = %e, "Failed to stop listener");
    }
  }
}
