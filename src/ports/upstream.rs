//! Upstream API Port - Game Auction Data Source
//!
//! Boot needs the realm list of a region; the acquirer needs the snapshot
//! index of a realm and the snapshot body; item sync needs item records
//! and icons.

use async_trait::async_trait;

use crate::domain::auction::ItemId;
use crate::domain::error::Result;
use crate::domain::item::Item;
use crate::domain::region::{Realm, RealmRecord, Region};
use crate::domain::timestamp::UnixTimestamp;

/// Location and age of the newest snapshot of a realm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionInfo {
  /// Where to download the snapshot body.
  pub url: String,
  /// Snapshot timestamp in Unix seconds.
  pub last_modified: UnixTimestamp,
}

/// Read access to the upstream game API.
#[async_trait]
pub trait UpstreamApi: Send + Sync + 'static {
  /// List every realm of a region.
  async fn realms(&self, region: &Region) -> Result<Vec<RealmRecord>>;

  /// Fetch the snapshot index of a realm.
  ///
  /// # Errors
  /// `UpstreamRefused` on non-200, `UpstreamUnreachable` on transport
  /// failure, `UpstreamParse` on a malformed index.
  async fn auction_info(&self, region: &Region, realm: &Realm) -> Result<AuctionInfo>;

  /// Download a snapshot body verbatim.
  async fn download(&self, url: &str) -> Result<Vec<u8>>;

  /// Fetch one item record.
  async fn item(&self, region: &Region, item_id: ItemId) -> Result<Item>;

  /// Fetch an item icon image.
  async fn item_icon(&self, icon_name: &str) -> Result<Vec<u8>>;
}
