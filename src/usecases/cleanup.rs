//! Retention & Cleanup Use Case
//!
//! Deletes everything older than the retention window:
//! - expired manifests, after first deleting every raw snapshot they list
//! - expired price-history shards
//!
//! Per-object work is exposed as jobs (`cleanup_manifest`,
//! `cleanup_histories`) that run behind bus subjects; the sweeps fan those
//! jobs out over the bus and roll the results up into metrics. Missing
//! objects are treated as already cleaned.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::adapters::metrics::MetricsRegistry;
use crate::adapters::storage::{ManifestStore, PriceHistoryStore, RawAuctionStore};
use crate::domain::error::Result;
use crate::domain::jobs::{
  CleanupAuctionManifestJob, CleanupAuctionManifestJobResponse, CleanupPricelistPayload,
  CleanupPricelistPayloadResponse, CleanupSweepResponse,
};
use crate::domain::message::Subject;
use crate::domain::timestamp::{display, retention_cutoff, UnixTimestamp};
use crate::usecases::messenger::{Messenger, CLEANUP_TIMEOUT};
use crate::usecases::state::ServiceState;

/// Default retention window in days.
pub const DEFAULT_RETENTION_DAYS: i64 = 14;

/// Expired manifests found by a sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiredManifests {
  pub jobs: Vec<CleanupAuctionManifestJob>,
  /// Realms whose manifest listing failed.
  pub failed_realms: usize,
}

pub struct Cleanup {
  raw: RawAuctionStore,
  manifests: ManifestStore,
  histories: PriceHistoryStore,
  state: Arc<ServiceState>,
  retention_days: i64,
}

impl Cleanup {
  pub fn new(
    raw: RawAuctionStore,
    manifests: ManifestStore,
    histories: PriceHistoryStore,
    state: Arc<ServiceState>,
    retention_days: i64,
  ) -> Self {
    Self {
      raw,
      manifests,
      histories,
      state,
      retention_days,
    }
  }

  fn cutoff(&self, now: UnixTimestamp) -> UnixTimestamp {
    retention_cutoff(now, self.retention_days)
  }

  /// One job per expired manifest across every whitelisted realm.
  ///
  /// A realm whose manifests cannot be listed is counted in
  /// `failed_realms` and skipped; the other realms are still swept.
  pub async fn expired_manifest_jobs(&self, now: UnixTimestamp) -> ExpiredManifests {
    let cutoff = self.cutoff(now);
    let mut expired = ExpiredManifests::default();
    for (region, realm) in self.state.whitelisted_realms().await {
      let days = match self.manifests.days(&region.name, realm.slug()).await {
        Ok(days) => days,
        Err(e) => {
          warn!(region = %region.name, realm = %realm.slug(), error = %e, "Failed to list manifests");
          expired.failed_realms += 1;
          continue;
        }
      };
      expired.jobs.extend(days.into_iter().filter(|day| *day < cutoff).map(|day| {
        CleanupAuctionManifestJob {
          region_name: region.name.clone(),
          realm_slug: realm.slug().to_string(),
          target_timestamp: day,
        }
      }));
    }
    expired
  }

  /// Delete the raw snapshots a manifest lists, then the manifest itself.
  #[instrument(skip(self), fields(region = %job.region_name, realm = %job.realm_slug, day = job.target_timestamp))]
  pub async fn cleanup_manifest(&self, job: &CleanupAuctionManifestJob) -> Result<CleanupAuctionManifestJobResponse> {
    let Some(manifest) = self
      .manifests
      .get(&job.region_name, &job.realm_slug, job.target_timestamp)
      .await?
    else {
      return Ok(CleanupAuctionManifestJobResponse::default());
    };

    let mut snapshots_deleted = 0;
    for ts in manifest.timestamps() {
      if self.raw.delete(&job.region_name, &job.realm_slug, ts).await? {
        snapshots_deleted += 1;
      }
    }

    // Manifest goes last so an interrupted job is simply re-run next cycle
    let removed = self
      .manifests
      .delete(&job.region_name, &job.realm_slug, job.target_timestamp)
      .await?;

    info!(
      day = %display(job.target_timestamp),
      snapshots_deleted,
      "Expired manifest cleaned"
    );
    Ok(CleanupAuctionManifestJobResponse {
      total_deleted: usize::from(removed),
      snapshots_deleted,
    })
  }

  /// Delete every expired history shard of one realm.
  #[instrument(skip(self), fields(region = %payload.region_name, realm = %payload.realm_slug))]
  pub async fn cleanup_histories(
    &self,
    payload: &CleanupPricelistPayload,
    now: UnixTimestamp,
  ) -> Result<CleanupPricelistPayloadResponse> {
    let cutoff = self.cutoff(now);
    let mut total_deleted = 0;
    for day in self.histories.days(&payload.region_name, &payload.realm_slug).await? {
      if day < cutoff && self.histories.delete(&payload.region_name, &payload.realm_slug, day).await? {
        total_deleted += 1;
      }
    }
    Ok(CleanupPricelistPayloadResponse { total_deleted })
  }
}

/// Drives cleanup sweeps over the bus.
pub struct CleanupSweeper {
  cleanup: Arc<Cleanup>,
  messenger: Messenger,
  metrics: Arc<MetricsRegistry>,
}

impl CleanupSweeper {
  pub fn new(cleanup: Arc<Cleanup>, messenger: Messenger, metrics: Arc<MetricsRegistry>) -> Self {
    Self {
      cleanup,
      messenger,
      metrics,
    }
  }

  /// Fan out one `cleanupExpiredManifest` request per expired manifest.
  #[instrument(skip(self))]
  pub async fn sweep_manifests(&self, now: UnixTimestamp) -> Result<CleanupSweepResponse> {
    let ExpiredManifests { jobs, failed_realms } = self.cleanup.expired_manifest_jobs(now).await;
    let requests = jobs
      .iter()
      .map(|job| -> Result<(String, String)> {
        let id = format!("{}/{}/{}", job.region_name, job.realm_slug, job.target_timestamp);
        Ok((id, serde_json::to_string(job)?))
      })
      .collect::<Result<Vec<_>>>()?;

    let replies = self
      .messenger
      .bulk_request(Subject::CleanupExpiredManifest, requests, CLEANUP_TIMEOUT)
      .await?;

    let mut summary = CleanupSweepResponse {
      jobs: jobs.len(),
      failed_jobs: failed_realms,
      ..CleanupSweepResponse::default()
    };
    for (id, reply) in replies {
      match reply.decode_data::<CleanupAuctionManifestJobResponse>() {
        Ok(response) if reply.is_ok() => summary.total_deleted += response.total_deleted,
        _ => {
          warn!(job = %id, error = ?reply.error, "Manifest cleanup job failed");
          summary.failed_jobs += 1;
        }
      }
    }

    self.metrics.expired_manifests_removed.inc_by(summary.total_deleted as u64);
    info!(
      jobs = summary.jobs,
      removed = summary.total_deleted,
      failed = summary.failed_jobs,
      "Manifest retention sweep complete"
    );
    Ok(summary)
  }

  /// Fan out one `cleanupPricelistHistories` request per whitelisted realm.
  #[instrument(skip(self))]
  pub async fn sweep_histories(&self) -> Result<CleanupSweepResponse> {
    let realms = self.cleanup.state.whitelisted_realms().await;
    let requests = realms
      .iter()
      .map(|(region, realm)| -> Result<(String, String)> {
        let payload = CleanupPricelistPayload {
          region_name: region.name.clone(),
          realm_slug: realm.slug().to_string(),
        };
        Ok((format!("{}/{}", region.name, realm.slug()), serde_json::to_string(&payload)?))
      })
      .collect::<Result<Vec<_>>>()?;

    let replies = self
      .messenger
      .bulk_request(Subject::CleanupPricelistHistories, requests, CLEANUP_TIMEOUT)
      .await?;

    let mut summary = CleanupSweepResponse {
      jobs: realms.len(),
      ..CleanupSweepResponse::default()
    };
    for (id, reply) in replies {
      match reply.decode_data::<CleanupPricelistPayloadResponse>() {
        Ok(response) if reply.is_ok() => summary.total_deleted += response.total_deleted,
        _ => {
          warn!(realm = %id, error = ?reply.error, "History cleanup job failed");
          summary.failed_jobs += 1;
        }
      }
    }

    self.metrics.pricelist_histories_removed.inc_by(summary.total_deleted as u64);
    info!(
      jobs = summary.jobs,
      removed = summary.total_deleted,
      failed = summary.failed_jobs,
      "History retention sweep complete"
    );
    Ok(summary)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::storage::InMemoryObjectStore;
  use crate::domain::error::PipelineError;
  use crate::domain::pricelist::{PriceList, PricePoint};
  use crate::ports::object_store::{ObjectMeta, ObjectStore, StoredObject};
  use crate::usecases::state::fixtures::state_with;
  use async_trait::async_trait;
  use mockall::mock;

  mock! {
    pub Store {}

    #[async_trait]
    impl ObjectStore for Store {
      async fn ensure_bucket(&self, bucket: &str) -> Result<()>;
      async fn put(&self, bucket: &str, key: &str, object: StoredObject) -> Result<()>;
      async fn get(&self, bucket: &str, key: &str) -> Result<Option<StoredObject>>;
      async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>>;
      async fn delete(&self, bucket: &str, key: &str) -> Result<bool>;
      async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>>;
    }
  }

  /// 2024-01-20T00:00:00Z
  const NOW: UnixTimestamp = 1_705_708_800;
  /// 2024-01-01T00:00:00Z
  const OLD_DAY: UnixTimestamp = 1_704_067_200;

  async fn setup() -> (Cleanup, RawAuctionStore, ManifestStore, PriceHistoryStore) {
    let store = Arc::new(InMemoryObjectStore::new());
    let raw = RawAuctionStore::new(store.clone());
    let manifests = ManifestStore::new(store.clone());
    let histories = PriceHistoryStore::new(store, "retail");
    let state = Arc::new(state_with(&[("us", "earthen-ring")], vec![]).await);
    let cleanup = Cleanup::new(
      raw.clone(),
      manifests.clone(),
      histories.clone(),
      state,
      DEFAULT_RETENTION_DAYS,
    );
    (cleanup, raw, manifests, histories)
  }

  #[tokio::test]
  async fn test_expired_manifest_deletes_snapshots_then_manifest() {
    let (cleanup, raw, manifests, _) = setup().await;
    for ts in [OLD_DAY + 3_600, OLD_DAY + 7_200] {
      raw.put("us", "earthen-ring", ts, br#"{"auctions":[]}"#).await.unwrap();
      manifests.append("us", "earthen-ring", ts).await.unwrap();
    }
    // A fresh day must survive
    manifests.append("us", "earthen-ring", NOW - 3_600).await.unwrap();

    let jobs = cleanup.expired_manifest_jobs(NOW).await.jobs;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].target_timestamp, OLD_DAY);

    let response = cleanup.cleanup_manifest(&jobs[0]).await.unwrap();
    assert_eq!(response.total_deleted, 1);
    assert_eq!(response.snapshots_deleted, 2);
    assert!(!raw.exists("us", "earthen-ring", OLD_DAY + 3_600).await.unwrap());
    assert!(manifests.get("us", "earthen-ring", OLD_DAY).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_missing_manifest_is_noop() {
    let (cleanup, _, _, _) = setup().await;
    let job = CleanupAuctionManifestJob {
      region_name: "us".to_string(),
      realm_slug: "earthen-ring".to_string(),
      target_timestamp: OLD_DAY,
    };
    assert_eq!(cleanup.cleanup_manifest(&job).await.unwrap().total_deleted, 0);
  }

  #[tokio::test]
  async fn test_rerun_after_partial_cleanup() {
    let (cleanup, raw, manifests, _) = setup().await;
    raw.put("us", "earthen-ring", OLD_DAY + 60, br#"{"auctions":[]}"#).await.unwrap();
    manifests.append("us", "earthen-ring", OLD_DAY + 60).await.unwrap();
    manifests.append("us", "earthen-ring", OLD_DAY + 120).await.unwrap();

    let job = &cleanup.expired_manifest_jobs(NOW).await.jobs[0];
    let response = cleanup.cleanup_manifest(job).await.unwrap();
    assert_eq!(response.total_deleted, 1);
    assert_eq!(response.snapshots_deleted, 1);
  }

  #[tokio::test]
  async fn test_expired_history_shards() {
    let (cleanup, _, _, histories) = setup().await;
    let prices: PriceList = [(25, PricePoint::default())].into_iter().collect();
    histories.merge("us", "earthen-ring", OLD_DAY + 10, &prices).await.unwrap();
    histories.merge("us", "earthen-ring", NOW - 10, &prices).await.unwrap();

    let payload = CleanupPricelistPayload {
      region_name: "us".to_string(),
      realm_slug: "earthen-ring".to_string(),
    };
    let response = cleanup.cleanup_histories(&payload, NOW).await.unwrap();
    assert_eq!(response.total_deleted, 1);
    assert_eq!(histories.days("us", "earthen-ring").await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_listing_failure_skips_only_that_realm() {
    let mut store = MockStore::new();
    store.expect_list().returning(|_, prefix| {
      if prefix.contains("stormrage") {
        return Err(PipelineError::StorageIo("list failed".to_string()));
      }
      Ok(vec![ObjectMeta {
        key: format!("{prefix}{OLD_DAY}.json"),
        ..ObjectMeta::default()
      }])
    });
    let store: Arc<dyn ObjectStore> = Arc::new(store);
    let state = Arc::new(state_with(&[("us", "earthen-ring"), ("us", "stormrage")], vec![]).await);
    let cleanup = Cleanup::new(
      RawAuctionStore::new(Arc::clone(&store)),
      ManifestStore::new(Arc::clone(&store)),
      PriceHistoryStore::new(store, "retail"),
      state,
      DEFAULT_RETENTION_DAYS,
    );

    let expired = cleanup.expired_manifest_jobs(NOW).await;
    assert_eq!(expired.failed_realms, 1);
    assert_eq!(expired.jobs.len(), 1);
    assert_eq!(expired.jobs[0].realm_slug, "earthen-ring");
    assert_eq!(expired.jobs[0].target_timestamp, OLD_DAY);
  }
}
