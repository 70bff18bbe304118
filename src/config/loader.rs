//! Configuration Loader - File Loading and Validation
//!
//! Handles loading the JSON config document, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a JSON file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - JSON parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    regions = config.regions.len(),
    blacklist = config.item_blacklist.len(),
    game_version = %config.game_version,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate a config document.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = serde_json::from_str(content).context("Failed to parse config JSON")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - At least one region, each with a name and hostname
/// - Whitelist entries only for configured regions
/// - Positive intervals and retention
fn validate_config(config: &AppConfig) -> Result<()> {
  // Region validation
  anyhow::ensure!(
    !config.regions.is_empty() || config.use_gcloud,
    "At least one region must be configured"
  );

  for (i, region) in config.regions.iter().enumerate() {
    anyhow::ensure!(!region.name.is_empty(), "Region {} has an empty name", i);
    anyhow::ensure!(
      !region.hostname.is_empty(),
      "Region {} ({}) has an empty hostname",
      i,
      region.name
    );
  }

  for name in config.whitelist.0.keys() {
    anyhow::ensure!(
      config.use_gcloud || config.regions.iter().any(|r| &r.name == name),
      "Whitelist names unknown region {}",
      name
    );
  }

  // Timer validation
  anyhow::ensure!(
    config.collect_interval_secs > 0,
    "collect_interval_secs must be positive"
  );
  anyhow::ensure!(
    config.cleanup_interval_secs > 0,
    "cleanup_interval_secs must be positive"
  );
  anyhow::ensure!(
    config.retention_days > 0,
    "retention_days must be positive, got {}",
    config.retention_days
  );

  // Storage validation
  anyhow::ensure!(!config.storage_dir.is_empty(), "storage_dir must not be empty");
  anyhow::ensure!(
    !config.use_cache_dir || !config.cache_dir.is_empty(),
    "cache_dir must be set when use_cache_dir is enabled"
  );
  anyhow::ensure!(!config.game_version.is_empty(), "game_version must not be empty");

  // API validation
  anyhow::ensure!(
    config.api.requests_per_second > 0,
    "api.requests_per_second must be positive"
  );
  anyhow::ensure!(!config.api.oauth_url.is_empty(), "OAuth URL must not be empty");

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::BootstrapEnv;

  const MINIMAL: &str = r#"{
    "regions": [{"name": "us", "hostname": "us.api.blizzard.com", "primary": true}],
    "whitelist": {"us": ["earthen-ring"]}
  }"#;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.json");
    assert!(result.is_err());
  }

  #[test]
  fn test_defaults_applied() {
    let config = parse_config(MINIMAL).unwrap();
    assert_eq!(config.game_version, "retail");
    assert_eq!(config.collect_interval_secs, 900);
    assert_eq!(config.cleanup_interval_secs, 1_200);
    assert_eq!(config.retention_days, 14);
    assert_eq!(config.api.timeout_secs, 30);
    assert!(config.metrics.enabled);
    assert!(config.whitelist.allows("us", "earthen-ring"));
    assert!(!config.whitelist.allows("us", "stormrage"));
  }

  #[test]
  fn test_rejects_unknown_whitelist_region() {
    let doc = r#"{
      "regions": [{"name": "us", "hostname": "us.api.blizzard.com"}],
      "whitelist": {"eu": null}
    }"#;
    assert!(parse_config(doc).is_err());
  }

  #[test]
  fn test_rejects_zero_retention() {
    let doc = r#"{
      "regions": [{"name": "us", "hostname": "us.api.blizzard.com"}],
      "retention_days": 0
    }"#;
    assert!(parse_config(doc).is_err());
  }

  #[test]
  fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, MINIMAL).unwrap();
    let config = load_config(path.to_str().unwrap()).unwrap();
    assert_eq!(config.regions[0].name, "us");
  }

  #[test]
  fn test_bootstrap_env_lookup() {
    let env = BootstrapEnv::from_lookup(|key| match key {
      "NATS_PORT" => Some("4222".to_string()),
      "BLIZZARD_CLIENT_ID" => Some("id".to_string()),
      "BLIZZARD_CLIENT_SECRET" => Some(String::new()),
      _ => None,
    });
    assert_eq!(env.nats_port, Some(4222));
    assert_eq!(env.client_id.as_deref(), Some("id"));
    assert!(env.client_secret.is_none());
    assert!(!format!("{env:?}").contains("secret\": Some(\"\")"));
  }
}
