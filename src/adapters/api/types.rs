//! Upstream API Response Types
//!
//! Serialization types for the game API's realm list, auction index and
//! the OAuth2 token endpoint. Item records decode straight into `domain::Item`.

use serde::Deserialize;

use crate::domain::region::RealmRecord;

/// Realm list of one region.
#[derive(Debug, Clone, Deserialize)]
pub struct RealmStatus {
  #[serde(default)]
  pub realms: Vec<RealmRecord>,
}

/// Auction index for one realm.
#[derive(Debug, Clone, Deserialize)]
pub struct AuctionIndex {
  /// Snapshot files, newest last (there is normally exactly one).
  #[serde(default)]
  pub files: Vec<AuctionFile>,
}

/// One downloadable snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct AuctionFile {
  /// Download location of the snapshot body.
  pub url: String,
  /// Snapshot time in Unix milliseconds.
  #[serde(rename = "lastModified")]
  pub last_modified_ms: i64,
}

impl AuctionIndex {
  /// The newest file in the index.
  pub fn newest(&self) -> Option<&AuctionFile> {
    self.files.iter().max_by_key(|f| f.last_modified_ms)
  }
}

/// OAuth2 client-credentials token response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
  /// Bearer token.
  pub access_token: String,
  /// Token type (always "bearer").
  #[serde(default)]
  pub token_type: String,
  /// Lifetime in seconds.
  pub expires_in: u64,
}
