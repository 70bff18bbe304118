//! Object Store Port - Bucket/Object Storage Interface
//!
//! Every persisted artifact (raw snapshots, manifests, live auctions,
//! history shards, items, icons, boot data) lives in an object store.
//! The first path segment of the layout is the bucket; the rest is the key.

use std::collections::HashMap;
use std::fmt::Write as _;

use async_trait::async_trait;

use crate::domain::error::Result;

/// Content type for every JSON document we write.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Content type for line-oriented history shards.
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

/// Content type for item icons.
pub const CONTENT_TYPE_JPEG: &str = "image/jpeg";

/// Content encoding marker for gzip bodies.
pub const ENCODING_GZIP: &str = "gzip";

/// An object body together with its metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredObject {
  /// Body bytes as stored (still encoded when `content_encoding` is set).
  pub body: Vec<u8>,
  /// MIME type.
  pub content_type: String,
  /// Transfer encoding of `body`, e.g. `gzip`.
  pub content_encoding: Option<String>,
  /// Arbitrary user metadata (e.g. `version_id`).
  pub metadata: HashMap<String, String>,
  /// Whether the object is world-readable.
  pub public_read: bool,
}

impl StoredObject {
  /// A gzip-encoded JSON object.
  pub fn gzip_json(body: Vec<u8>) -> Self {
    Self {
      body,
      content_type: CONTENT_TYPE_JSON.to_string(),
      content_encoding: Some(ENCODING_GZIP.to_string()),
      ..Self::default()
    }
  }

  /// Attach one metadata entry.
  #[must_use]
  pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
    self.metadata.insert(key.to_string(), value.into());
    self
  }

  /// Whether the body is gzip-encoded.
  pub fn is_gzip(&self) -> bool {
    self.content_encoding.as_deref() == Some(ENCODING_GZIP)
  }

  /// Hex SHA-256 of the stored body.
  pub fn etag(&self) -> String {
    hmac_sha256::Hash::hash(&self.body)
      .iter()
      .fold(String::with_capacity(64), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
      })
  }

  /// Metadata only; the body is left behind.
  pub fn meta(&self, key: &str) -> ObjectMeta {
    ObjectMeta {
      key: key.to_string(),
      size: self.body.len() as u64,
      content_type: self.content_type.clone(),
      content_encoding: self.content_encoding.clone(),
      metadata: self.metadata.clone(),
      etag: Some(self.etag()),
    }
  }
}

/// Object metadata without the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMeta {
  /// Key within the bucket.
  pub key: String,
  /// Stored body size in bytes.
  pub size: u64,
  /// MIME type.
  pub content_type: String,
  /// Transfer encoding.
  pub content_encoding: Option<String>,
  /// User metadata.
  pub metadata: HashMap<String, String>,
  /// Content digest recorded at write time; `None` when the store has none.
  pub etag: Option<String>,
}

/// Bucket/object CRUD.
///
/// Implementations must be safe to share across workers. `put` publishes
/// the new object only once it has been written completely.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
  /// Create the bucket if it does not exist.
  async fn ensure_bucket(&self, bucket: &str) -> Result<()>;

  /// Write (or overwrite) an object.
  async fn put(&self, bucket: &str, key: &str, object: StoredObject) -> Result<()>;

  /// Read an object; `None` when absent.
  async fn get(&self, bucket: &str, key: &str) -> Result<Option<StoredObject>>;

  /// Read an object's metadata; `None` when absent.
  async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>>;

  /// Whether an object exists.
  async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
    Ok(self.head(bucket, key).await?.is_some())
  }

  /// Delete an object; returns false when there was nothing to delete.
  async fn delete(&self, bucket: &str, key: &str) -> Result<bool>;

  /// List the objects whose key starts with `prefix`, ordered by key.
  async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>>;
}
