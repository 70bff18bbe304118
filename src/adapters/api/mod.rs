//! Upstream Game API Adapter
//!
//! Implements `UpstreamApi` over the game's REST API: auction indexes,
//! snapshot downloads, item records and icons.
//!
//! Sub-modules:
//! - `auth`: OAuth2 client-credentials token provider
//! - `client`: HTTP client with rate limiting and retries
//! - `endpoints`: URL builders for every upstream service
//! - `types`: upstream response types
//! - `upstream`: the `UpstreamApi` implementation

pub mod auth;
pub mod client;
pub mod endpoints;
pub mod types;
pub mod upstream;

pub use auth::{ClientCredentials, ClientCredentialsAuth};
pub use client::{ApiClient, ApiClientConfig};
pub use endpoints::ExternalEndpoints;
pub use upstream::BlizzardUpstream;
