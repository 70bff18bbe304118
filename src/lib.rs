//! Sotah Pipeline — Library Root
//!
//! Auction-house snapshot pipeline: acquisition, deduplication, live
//! auction state, daily price histories, retention and the bus query
//! surface. Re-exports all modules for integration tests and benchmarks.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;
