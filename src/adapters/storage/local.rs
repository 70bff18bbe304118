//! Local Object Store - Filesystem-backed Buckets
//!
//! Each bucket is a directory under the store root and each key a file
//! path inside it. Object metadata (content type, encoding, user metadata,
//! ACL, body digest) lives in a JSON sidecar next to the body. Writes go to
//! a temporary file first and are renamed into place, so readers only ever
//! see a complete body. The body is replaced before the sidecar: a reader
//! racing a write may pair a new body with old metadata, never the reverse.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, instrument};

use crate::domain::error::{PipelineError, Result};
use crate::ports::object_store::{ObjectMeta, ObjectStore, StoredObject};

/// Suffix of metadata sidecar files.
const META_SUFFIX: &str = ".meta.sidecar";

/// Suffix of in-flight writes.
const TMP_SUFFIX: &str = ".tmp.sidecar";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    #[serde(default)]
    content_encoding: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    public_read: bool,
    #[serde(default)]
    etag: Option<String>,
}

/// Filesystem object store rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Open (and create) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        validate_segment(bucket)?;
        let relative = Path::new(key);
        let clean = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean || key.ends_with(META_SUFFIX) || key.ends_with(TMP_SUFFIX) {
            return Err(PipelineError::StorageIo(format!("invalid object key: {key}")));
        }
        Ok(self.root.join(bucket).join(relative))
    }

    async fn read_sidecar(path: &Path) -> Result<Sidecar> {
        match fs::read(sidecar_path(path)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| PipelineError::StorageIo(format!("corrupt sidecar: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Sidecar::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn meta_for(&self, path: &Path, key: &str) -> Result<Option<ObjectMeta>> {
        let stat = match fs::metadata(path).await {
            Ok(stat) => stat,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let sidecar = Self::read_sidecar(path).await?;
        Ok(Some(ObjectMeta {
            key: key.to_string(),
            size: stat.len(),
            content_type: sidecar.content_type,
            content_encoding: sidecar.content_encoding,
            metadata: sidecar.metadata,
            etag: sidecar.etag,
        }))
    }
}

fn validate_segment(bucket: &str) -> Result<()> {
    if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket.starts_with('.') {
        return Err(PipelineError::StorageIo(format!("invalid bucket name: {bucket}")));
    }
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn sidecar_path(path: &Path) -> PathBuf {
    with_suffix(path, META_SUFFIX)
}

/// Write `bytes` to a temporary file and rename it over `path`.
async fn replace(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = with_suffix(path, TMP_SUFFIX);
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        validate_segment(bucket)?;
        fs::create_dir_all(self.root.join(bucket)).await?;
        Ok(())
    }

    #[instrument(skip(self, object), fields(size = object.body.len()))]
    async fn put(&self, bucket: &str, key: &str, object: StoredObject) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let sidecar = Sidecar {
            etag: Some(object.etag()),
            content_type: object.content_type,
            content_encoding: object.content_encoding,
            metadata: object.metadata,
            public_read: object.public_read,
        };
        let sidecar_json = serde_json::to_vec(&sidecar)
            .map_err(|e| PipelineError::StorageIo(e.to_string()))?;

        replace(&path, &object.body).await?;
        replace(&sidecar_path(&path), &sidecar_json).await?;

        debug!(path = %path.display(), "Object written");
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<StoredObject>> {
        let path = self.object_path(bucket, key)?;
        let body = match fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let sidecar = Self::read_sidecar(&path).await?;
        Ok(Some(StoredObject {
            body,
            content_type: sidecar.content_type,
            content_encoding: sidecar.content_encoding,
            metadata: sidecar.metadata,
            public_read: sidecar.public_read,
        }))
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>> {
        let path = self.object_path(bucket, key)?;
        self.meta_for(&path, key).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool> {
        let path = self.object_path(bucket, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        match fs::remove_file(sidecar_path(&path)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>> {
        validate_segment(bucket)?;
        let bucket_root = self.root.join(bucket);
        let mut pending = vec![bucket_root.clone()];
        let mut found = Vec::new();

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&bucket_root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.ends_with(META_SUFFIX) || key.ends_with(TMP_SUFFIX) || !key.starts_with(prefix) {
                    continue;
                }
                if let Some(meta) = self.meta_for(&path, &key).await? {
                    found.push(meta);
                }
            }
        }

        found.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(found)
    }
}
