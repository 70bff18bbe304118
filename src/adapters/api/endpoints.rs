//! External Endpoints - Upstream URL Builders
//!
//! Every upstream URL is derived from this record, so tests point the
//! whole adapter at a local fake server by supplying another record.

use crate::domain::auction::ItemId;
use crate::domain::region::Region;

/// Default OAuth2 token endpoint.
pub const DEFAULT_OAUTH_URL: &str = "https://us.battle.net/oauth/token";

/// Default icon CDN.
pub const DEFAULT_ICON_BASE: &str = "https://render-us.worldofwarcraft.com/icons/56";

/// Base URLs of the upstream services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalEndpoints {
  /// Overrides `https://{region.hostname}` for every region when set.
  pub api_base: Option<String>,
  /// OAuth2 token endpoint.
  pub oauth_url: String,
  /// Icon CDN base.
  pub icon_base: String,
}

impl Default for ExternalEndpoints {
  fn default() -> Self {
    Self {
      api_base: None,
      oauth_url: DEFAULT_OAUTH_URL.to_string(),
      icon_base: DEFAULT_ICON_BASE.to_string(),
    }
  }
}

impl ExternalEndpoints {
  fn region_base(&self, region: &Region) -> String {
    match &self.api_base {
      Some(base) => base.trim_end_matches('/').to_string(),
      None => format!("https://{}", region.hostname),
    }
  }

  /// Realm list of a region.
  pub fn realm_status_url(&self, region: &Region) -> String {
    format!("{}/wow/realm/status", self.region_base(region))
  }

  /// Auction index of a realm.
  pub fn auction_info_url(&self, region: &Region, realm_slug: &str) -> String {
    format!("{}/wow/auction/data/{realm_slug}", self.region_base(region))
  }

  /// Item record.
  pub fn item_url(&self, region: &Region, item_id: ItemId) -> String {
    format!("{}/wow/item/{item_id}", self.region_base(region))
  }

  /// Item icon image.
  pub fn icon_url(&self, icon_name: &str) -> String {
    format!("{}/{icon_name}.jpg", self.icon_base.trim_end_matches('/'))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn us() -> Region {
    Region {
      name: "us".to_string(),
      hostname: "us.api.blizzard.com".to_string(),
      primary: true,
    }
  }

  #[test]
  fn test_default_urls() {
    let endpoints = ExternalEndpoints::default();
    assert_eq!(
      endpoints.auction_info_url(&us(), "earthen-ring"),
      "https://us.api.blizzard.com/wow/auction/data/earthen-ring"
    );
    assert_eq!(
      endpoints.realm_status_url(&us()),
      "https://us.api.blizzard.com/wow/realm/status"
    );
    assert_eq!(endpoints.item_url(&us(), 25), "https://us.api.blizzard.com/wow/item/25");
    assert_eq!(
      endpoints.icon_url("inv_sword_04"),
      "https://render-us.worldofwarcraft.com/icons/56/inv_sword_04.jpg"
    );
  }

  #[test]
  fn test_api_base_override() {
    let endpoints = ExternalEndpoints {
      api_base: Some("http://127.0.0.1:8080/".to_string()),
      ..ExternalEndpoints::default()
    };
    assert_eq!(
      endpoints.auction_info_url(&us(), "earthen-ring"),
      "http://127.0.0.1:8080/wow/auction/data/earthen-ring"
    );
  }
}
