//! Service State - Regions, Realms and the Item Catalog
//!
//! Populated at boot. Region metadata, the whitelist and the blacklist
//! are immutable afterwards; realm `last_modified` values and the item
//! catalog sit behind `RwLock`s since the acquirer and item sync update
//! them while queries read.

use std::collections::{BTreeMap, HashMap, HashSet};

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::auction::ItemId;
use crate::domain::error::{PipelineError, Result};
use crate::domain::item::{Item, ItemClass};
use crate::domain::jobs::{BootResponse, Expansion, Profession};
use crate::domain::region::{Realm, RealmSlug, RealmWhitelist, Region, RegionName, RegionStatus};
use crate::domain::timestamp::UnixTimestamp;

/// Static boot data.
#[derive(Debug, Clone, Default)]
pub struct BootData {
  pub regions: Vec<Region>,
  pub whitelist: RealmWhitelist,
  pub item_classes: Vec<ItemClass>,
  pub expansions: Vec<Expansion>,
  pub professions: Vec<Profession>,
  pub item_blacklist: Vec<ItemId>,
}

pub struct ServiceState {
  regions: Vec<Region>,
  whitelist: RealmWhitelist,
  item_classes: Vec<ItemClass>,
  expansions: Vec<Expansion>,
  professions: Vec<Profession>,
  blacklist: HashSet<ItemId>,
  game_version: String,
  session_secret: String,
  realms: RwLock<HashMap<RegionName, BTreeMap<RealmSlug, Realm>>>,
  items: RwLock<HashMap<ItemId, Item>>,
}

impl ServiceState {
  pub fn new(boot: BootData, game_version: impl Into<String>) -> Self {
    Self {
      regions: boot.regions,
      whitelist: boot.whitelist,
      item_classes: boot.item_classes,
      expansions: boot.expansions,
      professions: boot.professions,
      blacklist: boot.item_blacklist.into_iter().collect(),
      game_version: game_version.into(),
      session_secret: Uuid::new_v4().to_string(),
      realms: RwLock::new(HashMap::new()),
      items: RwLock::new(HashMap::new()),
    }
  }

  pub fn regions(&self) -> &[Region] {
    &self.regions
  }

  pub fn game_version(&self) -> &str {
    &self.game_version
  }

  pub fn session_secret(&self) -> &str {
    &self.session_secret
  }

  pub fn item_classes(&self) -> &[ItemClass] {
    &self.item_classes
  }

  pub fn boot(&self) -> BootResponse {
    BootResponse {
      regions: self.regions.clone(),
      item_classes: self.item_classes.clone(),
      expansions: self.expansions.clone(),
      professions: self.professions.clone(),
    }
  }

  pub fn region(&self, name: &str) -> Result<&Region> {
    self
      .regions
      .iter()
      .find(|r| r.name == name)
      .ok_or_else(|| PipelineError::NotFound(format!("region {name} not found")))
  }

  pub fn is_blacklisted(&self, item_id: ItemId) -> bool {
    self.blacklist.contains(&item_id)
  }

  /// Install a region's realm list, keeping only whitelisted realms.
  ///
  /// Remembered `last_modified` values survive a reload.
  pub async fn set_realms(&self, region_name: &str, realms: Vec<Realm>) -> Result<usize> {
    self.region(region_name)?;
    let allowed = self.whitelist.filter(region_name, &realms);

    let mut guard = self.realms.write().await;
    let previous = guard.remove(region_name).unwrap_or_default();
    let next: BTreeMap<RealmSlug, Realm> = allowed
      .into_iter()
      .map(|mut realm| {
        if let Some(prior) = previous.get(realm.slug()) {
          realm.last_modified = realm.last_modified.max(prior.last_modified);
        }
        (realm.slug().to_string(), realm)
      })
      .collect();
    let count = next.len();
    guard.insert(region_name.to_string(), next);
    debug!(region = region_name, realms = count, "Realms installed");
    Ok(count)
  }

  pub async fn realm(&self, region_name: &str, slug: &str) -> Result<Realm> {
    self
      .realms
      .read()
      .await
      .get(region_name)
      .and_then(|realms| realms.get(slug))
      .cloned()
      .ok_or_else(|| PipelineError::NotFound(format!("realm {region_name}/{slug} not found")))
  }

  /// Every whitelisted realm with its region, ordered by region then slug.
  pub async fn whitelisted_realms(&self) -> Vec<(Region, Realm)> {
    let guard = self.realms.read().await;
    self
      .regions
      .iter()
      .flat_map(|region| {
        guard
          .get(&region.name)
          .into_iter()
          .flat_map(|realms| realms.values())
          .map(|realm| (region.clone(), realm.clone()))
          .collect::<Vec<_>>()
      })
      .collect()
  }

  /// Remember a realm's newest snapshot; older timestamps are ignored.
  pub async fn record_last_modified(&self, region_name: &str, slug: &str, ts: UnixTimestamp) -> bool {
    let mut guard = self.realms.write().await;
    match guard.get_mut(region_name).and_then(|realms| realms.get_mut(slug)) {
      Some(realm) if ts > realm.last_modified => {
        realm.last_modified = ts;
        true
      }
      _ => false,
    }
  }

  pub async fn status(&self, region_name: &str) -> Result<RegionStatus> {
    let region = self.region(region_name)?.clone();
    let realms = self
      .realms
      .read()
      .await
      .get(region_name)
      .map(|realms| realms.values().cloned().collect())
      .unwrap_or_default();
    Ok(RegionStatus {
      region: Some(region),
      realms,
    })
  }

  pub async fn merge_items(&self, items: Vec<Item>) -> usize {
    let mut guard = self.items.write().await;
    let count = items.len();
    for item in items {
      guard.insert(item.id, item);
    }
    count
  }

  pub async fn items_by_id(&self, ids: &[ItemId]) -> Vec<Item> {
    let guard = self.items.read().await;
    ids.iter().filter_map(|id| guard.get(id).cloned()).collect()
  }

  pub async fn has_item(&self, id: ItemId) -> bool {
    self.items.read().await.contains_key(&id)
  }

  /// Snapshot of the catalog without blacklisted items.
  pub async fn catalog(&self) -> Vec<Item> {
    self
      .items
      .read()
      .await
      .values()
      .filter(|item| !self.is_blacklisted(item.id))
      .cloned()
      .collect()
  }
}
