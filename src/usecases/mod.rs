//! Use Cases Layer - Pipeline Workflows
//!
//! Orchestrates domain logic over the port interfaces. Each use case is
//! a self-contained operation that a bus subject or a timer drives.
//!
//! Use cases:
//! - `Acquirer`: snapshot acquisition per realm
//! - `Computer`: live auctions and price-history shards from a snapshot
//! - `Cleanup` / `CleanupSweeper`: retention of manifests, snapshots, shards
//! - `Collector`: the acquire, compute, announce cycle
//! - `QueryEngine`: auctions, owners, items and price queries
//! - `ItemSync`: item records and icons
//! - `PipelineService`: subject wiring and timers
//!
//! Runtime pieces: `Messenger` (request/reply over the bus), `worker_pool`
//! (fixed-width fan-out), `PeriodicTask` (stoppable ticker) and
//! `ServiceState` (regions, realms, item catalog).

pub mod acquirer;
pub mod cleanup;
pub mod collector;
pub mod compute;
pub mod item_sync;
pub mod messenger;
pub mod query;
pub mod scheduler;
pub mod service;
pub mod state;
pub mod worker_pool;
