//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the use-case layer requires from
//! the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `ObjectStore`: bucket/object CRUD with content-encoding metadata
//! - `MessageBus`: fan-out publish and subscribe between services
//! - `UpstreamApi`: the game API serving auction snapshots and items

pub mod message_bus;
pub mod object_store;
pub mod upstream;

pub use message_bus::{BusMessage, MessageBus, Subscription};
pub use object_store::{ObjectMeta, ObjectStore, StoredObject};
pub use upstream::{AuctionInfo, UpstreamApi};
