//! Job payloads exchanged between services.

use serde::{Deserialize, Serialize};

use super::auction::ItemId;
use super::item::{Item, ItemClass};
use super::region::{RealmSlug, Region, RegionName, RegionStatus};
use super::timestamp::UnixTimestamp;

/// Ask a collector to acquire the newest snapshot of one realm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectAuctionsJob {
    pub region_name: RegionName,
    pub realm_slug: RealmSlug,
}

/// Outcome of a successful collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRealmTimestampTuple {
    pub region_name: RegionName,
    pub realm_slug: RealmSlug,
    pub target_timestamp: UnixTimestamp,
    pub normalized_target_timestamp: UnixTimestamp,
    pub item_ids: Vec<ItemId>,
}

/// Parameterizes one downstream compute stage for one realm snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRegionRealmTimestampsInJob {
    pub region_name: RegionName,
    pub realm_slug: RealmSlug,
    pub target_timestamp: UnixTimestamp,
}

impl From<&RegionRealmTimestampTuple> for LoadRegionRealmTimestampsInJob {
    fn from(t: &RegionRealmTimestampTuple) -> Self {
        Self {
            region_name: t.region_name.clone(),
            realm_slug: t.realm_slug.clone(),
            target_timestamp: t.target_timestamp,
        }
    }
}

/// Summary of a compute stage run for one realm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeJobResponse {
    pub region_name: RegionName,
    pub realm_slug: RealmSlug,
    pub target_timestamp: UnixTimestamp,
    pub item_count: usize,
}

/// Bulk compute outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeAllResponse {
    pub included_realms: usize,
    pub failed_realms: usize,
}

/// Remove one expired manifest and every raw snapshot it lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupAuctionManifestJob {
    pub region_name: RegionName,
    pub realm_slug: RealmSlug,
    pub target_timestamp: UnixTimestamp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupAuctionManifestJobResponse {
    /// Manifest objects removed.
    pub total_deleted: usize,
    /// Raw snapshot objects removed.
    pub snapshots_deleted: usize,
}

/// Remove every expired history shard of one realm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupPricelistPayload {
    pub region_name: RegionName,
    pub realm_slug: RealmSlug,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupPricelistPayloadResponse {
    pub total_deleted: usize,
}

/// Totals of a cleanup sweep across all realms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSweepResponse {
    pub jobs: usize,
    pub total_deleted: usize,
    pub failed_jobs: usize,
}

/// Realms whose `last_modified` moved forward, grouped by region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmTimestampUpdates {
    pub updates: Vec<RegionRealmTimestampTuple>,
}

/// Intake notification listing realms with freshly computed data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeRequest {
    pub tuples: Vec<RegionRealmTimestampTuple>,
}

/// Item ids to sync from the upstream API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItemsRequest {
    pub region_name: RegionName,
    pub item_ids: Vec<ItemId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItemsResponse {
    pub synced: Vec<ItemId>,
    pub failed: Vec<ItemId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItemIconsRequest {
    pub icon_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItemIconsResponse {
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Items freshly written to the catalog bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveSyncedItemsRequest {
    pub items: Vec<Item>,
}

/// Static boot data handed to front-ends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootResponse {
    pub regions: Vec<Region>,
    pub item_classes: Vec<ItemClass>,
    pub expansions: Vec<Expansion>,
    pub professions: Vec<Profession>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expansion {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profession {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRequest {
    pub region_name: RegionName,
}

pub type StatusResponse = RegionStatus;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeInfo {
    pub version: String,
    pub game_version: String,
    pub subjects: Vec<String>,
}
