//! Blizzard Upstream - `UpstreamApi` over HTTP
//!
//! Resolves URLs through `ExternalEndpoints`, appends an access token when
//! client credentials are configured (or the legacy `apikey` otherwise) and
//! converts the index's millisecond `lastModified` into Unix seconds.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::auth::ClientCredentialsAuth;
use super::client::ApiClient;
use super::endpoints::ExternalEndpoints;
use super::types::{AuctionIndex, RealmStatus};
use crate::domain::auction::ItemId;
use crate::domain::error::{PipelineError, Result};
use crate::domain::item::Item;
use crate::domain::region::{Realm, RealmRecord, Region};
use crate::ports::upstream::{AuctionInfo, UpstreamApi};

pub struct BlizzardUpstream {
  client: Arc<ApiClient>,
  auth: Option<Arc<ClientCredentialsAuth>>,
  api_key: Option<String>,
  endpoints: ExternalEndpoints,
}

impl BlizzardUpstream {
  pub fn new(client: Arc<ApiClient>, auth: Option<Arc<ClientCredentialsAuth>>, endpoints: ExternalEndpoints) -> Self {
    Self {
      client,
      auth,
      api_key: None,
      endpoints,
    }
  }

  /// Fall back to a legacy API key when no access token is available.
  #[must_use]
  pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
    self.api_key = api_key.filter(|k| !k.is_empty());
    self
  }

  async fn access_token(&self) -> Result<Option<String>> {
    match &self.auth {
      Some(auth) => Ok(Some(auth.token().await?)),
      None => Ok(None),
    }
  }

  async fn get_authed<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
    let token = self.access_token().await?;
    let query = auth_query(token.as_deref(), self.api_key.as_deref());

    match self.client.get_json(url, &query).await {
      Err(PipelineError::UpstreamRefused { status: 401, url }) => {
        // Token revoked early; drop it so the next batch negotiates a fresh one
        if let Some(auth) = &self.auth {
          auth.invalidate().await;
        }
        Err(PipelineError::UpstreamRefused { status: 401, url })
      }
      other => other,
    }
  }
}

/// Query parameters authenticating a request; a token wins over a key.
fn auth_query<'a>(token: Option<&'a str>, api_key: Option<&'a str>) -> Vec<(&'static str, &'a str)> {
  match (token, api_key) {
    (Some(token), _) => vec![("access_token", token)],
    (None, Some(key)) => vec![("apikey", key)],
    (None, None) => Vec::new(),
  }
}

/// Convert the index's millisecond timestamp into Unix seconds.
pub const fn millis_to_seconds(ms: i64) -> i64 {
  ms.div_euclid(1000)
}

#[async_trait]
impl UpstreamApi for BlizzardUpstream {
  #[instrument(skip(self, region), fields(region = %region.name))]
  async fn realms(&self, region: &Region) -> Result<Vec<RealmRecord>> {
    let url = self.endpoints.realm_status_url(region);
    let status: RealmStatus = self.get_authed(&url).await?;
    debug!(realms = status.realms.len(), "Fetched realm list");
    Ok(status.realms)
  }

  #[instrument(skip(self, region, realm), fields(region = %region.name, realm = %realm.slug()))]
  async fn auction_info(&self, region: &Region, realm: &Realm) -> Result<AuctionInfo> {
    let url = self.endpoints.auction_info_url(region, realm.slug());
    let index: AuctionIndex = self.get_authed(&url).await?;
    let newest = index
      .newest()
      .ok_or_else(|| PipelineError::UpstreamParse(format!("auction index without files: {url}")))?;

    let info = AuctionInfo {
      url: newest.url.clone(),
      last_modified: millis_to_seconds(newest.last_modified_ms),
    };
    debug!(last_modified = info.last_modified, "Fetched auction index");
    Ok(info)
  }

  async fn download(&self, url: &str) -> Result<Vec<u8>> {
    self.client.get_bytes(url, &[]).await
  }

  async fn item(&self, region: &Region, item_id: ItemId) -> Result<Item> {
    let url = self.endpoints.item_url(region, item_id);
    self.get_authed(&url).await
  }

  async fn item_icon(&self, icon_name: &str) -> Result<Vec<u8>> {
    let url = self.endpoints.icon_url(icon_name);
    self.client.get_bytes(&url, &[]).await
  }
}
