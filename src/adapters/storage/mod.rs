//! Object Storage Adapters
//!
//! `ObjectStore` implementations plus the typed stores that own the
//! bucket layout. The first path segment of every stored artifact is its
//! bucket:
//!
//! - `raw-auctions/{region}/{realm}/{ts}.json.gz`
//! - `auctions-manifest/{region}/{realm}/{day}.json`
//! - `live-auctions/{region}-{realm}.json.gz`
//! - `pricelist-histories/{game_version}/{region}/{realm}/{day}.txt.gz`
//! - `sotah-items/{id}.json.gz`, `item-icons/{name}.jpg`
//! - `boot/regions.json.gz`, `boot/blizzard-credentials.json`

pub mod boot;
pub mod cached;
pub mod codec;
pub mod items;
pub mod live_auctions;
pub mod local;
pub mod manifests;
pub mod memory;
pub mod pricelist_histories;
pub mod raw_auctions;

pub use boot::BootStore;
pub use cached::CachedObjectStore;
pub use items::ItemStore;
pub use live_auctions::LiveAuctionStore;
pub use local::LocalObjectStore;
pub use manifests::ManifestStore;
pub use memory::InMemoryObjectStore;
pub use pricelist_histories::PriceHistoryStore;
pub use raw_auctions::RawAuctionStore;

pub const RAW_AUCTIONS_BUCKET: &str = "raw-auctions";
pub const AUCTIONS_MANIFEST_BUCKET: &str = "auctions-manifest";
pub const LIVE_AUCTIONS_BUCKET: &str = "live-auctions";
pub const PRICELIST_HISTORIES_BUCKET: &str = "pricelist-histories";
pub const ITEMS_BUCKET: &str = "sotah-items";
pub const ITEM_ICONS_BUCKET: &str = "item-icons";
pub const BOOT_BUCKET: &str = "boot";

/// Every bucket the pipeline writes to.
pub const ALL_BUCKETS: [&str; 7] = [
    RAW_AUCTIONS_BUCKET,
    AUCTIONS_MANIFEST_BUCKET,
    LIVE_AUCTIONS_BUCKET,
    PRICELIST_HISTORIES_BUCKET,
    ITEMS_BUCKET,
    ITEM_ICONS_BUCKET,
    BOOT_BUCKET,
];
