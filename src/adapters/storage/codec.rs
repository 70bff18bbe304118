//! Gzip and JSON helpers shared by every typed store.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::error::{PipelineError, Result};
use crate::ports::object_store::StoredObject;

/// Gzip-compress a byte slice.
pub fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 4), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

/// Decompress a gzip byte slice.
pub fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::with_capacity(bytes.len() * 4);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| PipelineError::StorageIo(format!("gzip decode failed: {e}")))?;
    Ok(out)
}

/// The plain body of a stored object, gunzipped when it is gzip-encoded.
pub fn body(object: &StoredObject) -> Result<Vec<u8>> {
    if object.is_gzip() {
        gunzip(&object.body)
    } else {
        Ok(object.body.clone())
    }
}

/// Serialize to JSON and gzip.
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(value)
        .map_err(|e| PipelineError::StorageIo(format!("json encode failed: {e}")))?;
    gzip(&json)
}

/// Decode a JSON object body, gunzipping as needed.
pub fn decode_json<T: DeserializeOwned>(object: &StoredObject) -> Result<T> {
    let plain = body(object)?;
    serde_json::from_slice(&plain)
        .map_err(|e| PipelineError::StorageIo(format!("json decode failed: {e}")))
}
