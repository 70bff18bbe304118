//! Domain layer - Core types and pure algorithms.
//!
//! Snapshot deduplication, day normalization, manifests, price statistics,
//! query filtering/paging and the bus envelope. Nothing in here performs
//! I/O (hexagonal architecture inner ring).

pub mod auction;
pub mod error;
pub mod item;
pub mod jobs;
pub mod manifest;
pub mod message;
pub mod pricelist;
pub mod query;
pub mod region;
pub mod timestamp;

// Re-export core types for convenience
pub use auction::{dedupe, ItemId, MiniAuction, RawAuction, TimeLeft};
pub use error::{PipelineError, Result};
pub use item::Item;
pub use manifest::AuctionManifest;
pub use message::{Code, Message, Subject};
pub use pricelist::{ItemPriceHistories, PriceHistory, PriceList, PricePoint};
pub use region::{Realm, RealmRecord, RealmWhitelist, Region};
pub use timestamp::{normalize, UnixTimestamp};
