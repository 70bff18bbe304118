//! Message Bus Adapters
//!
//! `InMemoryBus` connects every service running inside one process.

pub mod memory;

pub use memory::InMemoryBus;
