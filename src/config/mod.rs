//! Configuration Module - JSON Service Configuration
//!
//! Loads and validates the service configuration document. Environment
//! variables are read once at startup into `BootstrapEnv`; nothing else
//! consults the environment.

pub mod loader;

use std::time::Duration;

use serde::Deserialize;

use crate::adapters::api::endpoints::{DEFAULT_ICON_BASE, DEFAULT_OAUTH_URL};
use crate::adapters::api::{ApiClientConfig, ExternalEndpoints};
use crate::domain::auction::ItemId;
use crate::domain::item::ItemClass;
use crate::domain::jobs::{Expansion, Profession};
use crate::domain::region::{RealmWhitelist, Region};
use crate::usecases::state::BootData;

/// Top-level service configuration.
///
/// Loaded from a JSON file at startup. All fields are validated before
/// any listener is bound.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Legacy upstream API key; client credentials are preferred.
  #[serde(default)]
  pub api_key: Option<String>,
  /// Regions to collect.
  pub regions: Vec<Region>,
  /// Realm slugs to include per region (`null` = all, `[]` = none).
  #[serde(default)]
  pub whitelist: RealmWhitelist,
  /// Directory of the on-node read-through cache.
  #[serde(default = "default_cache_dir")]
  pub cache_dir: String,
  /// Serve object reads through the on-node cache.
  #[serde(default)]
  pub use_cache_dir: bool,
  /// Read boot data (regions, credentials) from the boot bucket.
  #[serde(default)]
  pub use_gcloud: bool,
  #[serde(default)]
  pub expansions: Vec<Expansion>,
  #[serde(default)]
  pub professions: Vec<Profession>,
  #[serde(default)]
  pub item_classes: Vec<ItemClass>,
  /// Items hidden from every query.
  #[serde(default)]
  pub item_blacklist: Vec<ItemId>,

  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Game version prefix of the history bucket.
  #[serde(default = "default_game_version")]
  pub game_version: String,
  /// Root of the canonical object store.
  #[serde(default = "default_storage_dir")]
  pub storage_dir: String,
  /// Seconds between collector cycles.
  #[serde(default = "default_collect_interval")]
  pub collect_interval_secs: u64,
  /// Seconds between retention sweeps.
  #[serde(default = "default_cleanup_interval")]
  pub cleanup_interval_secs: u64,
  /// Days of raw snapshots, manifests and history shards to keep.
  #[serde(default = "default_retention_days")]
  pub retention_days: i64,
  /// Upstream API client.
  #[serde(default)]
  pub api: ApiConfig,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Upstream API client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Request timeout in seconds.
  #[serde(default = "default_timeout")]
  pub timeout_secs: u64,
  /// Retries on 5xx/429 and transport errors.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  /// Upstream quota.
  #[serde(default = "default_requests_per_second")]
  pub requests_per_second: u32,
  /// In-flight request cap.
  #[serde(default = "default_max_concurrent")]
  pub max_concurrent: usize,
  /// OAuth2 token endpoint.
  #[serde(default = "default_oauth_url")]
  pub oauth_url: String,
  /// Icon CDN base.
  #[serde(default = "default_icon_base")]
  pub icon_base: String,
  /// Overrides `https://{region.hostname}` for every region.
  #[serde(default)]
  pub api_base: Option<String>,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_timeout(),
      max_retries: default_max_retries(),
      requests_per_second: default_requests_per_second(),
      max_concurrent: default_max_concurrent(),
      oauth_url: default_oauth_url(),
      icon_base: default_icon_base(),
      api_base: None,
    }
  }
}

impl ApiConfig {
  pub fn client_config(&self) -> ApiClientConfig {
    ApiClientConfig {
      timeout: Duration::from_secs(self.timeout_secs),
      max_concurrent: self.max_concurrent,
      max_retries: self.max_retries,
      requests_per_second: self.requests_per_second,
      ..ApiClientConfig::default()
    }
  }

  pub fn endpoints(&self) -> ExternalEndpoints {
    ExternalEndpoints {
      api_base: self.api_base.clone(),
      oauth_url: self.oauth_url.clone(),
      icon_base: self.icon_base.clone(),
    }
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

impl AppConfig {
  /// Static boot data, with `regions` taking the place of the configured
  /// list when given.
  pub fn boot_data(&self, regions: Option<Vec<Region>>) -> BootData {
    BootData {
      regions: regions.unwrap_or_else(|| self.regions.clone()),
      whitelist: self.whitelist.clone(),
      item_classes: self.item_classes.clone(),
      expansions: self.expansions.clone(),
      professions: self.professions.clone(),
      item_blacklist: self.item_blacklist.clone(),
    }
  }

  pub fn collect_interval(&self) -> Duration {
    Duration::from_secs(self.collect_interval_secs)
  }

  pub fn cleanup_interval(&self) -> Duration {
    Duration::from_secs(self.cleanup_interval_secs)
  }
}

/// Values read from the environment at startup.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BootstrapEnv {
  pub gcp_project: Option<String>,
  pub nats_host: Option<String>,
  pub nats_port: Option<u16>,
  pub client_id: Option<String>,
  pub client_secret: Option<String>,
}

impl std::fmt::Debug for BootstrapEnv {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BootstrapEnv")
      .field("gcp_project", &self.gcp_project)
      .field("nats_host", &self.nats_host)
      .field("nats_port", &self.nats_port)
      .field("client_id", &self.client_id)
      .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
      .finish()
  }
}

impl BootstrapEnv {
  pub fn from_env() -> Self {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Build from any key lookup; empty values count as unset.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
    Self {
      gcp_project: get("GCP_PROJECT"),
      nats_host: get("NATS_HOST"),
      nats_port: get("NATS_PORT").and_then(|p| p.parse().ok()),
      client_id: get("BLIZZARD_CLIENT_ID"),
      client_secret: get("BLIZZARD_CLIENT_SECRET"),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_cache_dir() -> String {
  "data/cache".to_string()
}

fn default_game_version() -> String {
  "retail".to_string()
}

fn default_storage_dir() -> String {
  "data/storage".to_string()
}

fn default_collect_interval() -> u64 {
  900
}

fn default_cleanup_interval() -> u64 {
  1_200
}

fn default_retention_days() -> i64 {
  14
}

fn default_timeout() -> u64 {
  30
}

fn default_max_retries() -> u32 {
  3
}

fn default_requests_per_second() -> u32 {
  100
}

fn default_max_concurrent() -> usize {
  16
}

fn default_oauth_url() -> String {
  DEFAULT_OAUTH_URL.to_string()
}

fn default_icon_base() -> String {
  DEFAULT_ICON_BASE.to_string()
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}
