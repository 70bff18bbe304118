//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP clients, filesystem, in-process bus).
//! Each sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `api`: upstream game API client, OAuth2 and URL builders
//! - `bus`: in-process publish/subscribe transport
//! - `metrics`: Prometheus metrics export and health checks
//! - `storage`: object stores and the typed bucket layouts

pub mod api;
pub mod bus;
pub mod metrics;
pub mod storage;
