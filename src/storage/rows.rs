//! Row ↔ entity conversion helpers.
//!
//! Timestamps are stored as RFC 3339 strings in UTC with a fixed
//! precision, so lexicographic order matches chronological order.
//! Embeddings are stored as little-endian `f32` blobs.

use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Formats a timestamp for storage.
#[must_use]
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp.
///
/// # Errors
///
/// Returns `Error::Internal` on malformed rows.
pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::internal("parse_timestamp", format!("{raw:?}: {e}")))
}

/// Parses a stored UUID.
///
/// # Errors
///
/// Returns `Error::Internal` on malformed rows.
pub fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::internal("parse_uuid", format!("{raw:?}: {e}")))
}

/// Serializes an embedding to a little-endian `f32` blob.
#[must_use]
pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for v in embedding {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

/// Deserializes an embedding blob.
///
/// # Errors
///
/// Returns `Error::Internal` if the blob length is not a multiple of 4.
pub fn blob_to_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(Error::internal(
            "decode_embedding",
            format!("blob length {} is not a multiple of 4", blob.len()),
        ));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Parses a stored JSON object column.
///
/// # Errors
///
/// Returns `Error::Internal` on malformed rows.
pub fn parse_json_map(raw: &str) -> Result<Map<String, Value>> {
    serde_json::from_str(raw).map_err(|e| Error::internal("parse_json_map", e))
}

/// Parses a stored JSON value column into a typed value.
///
/// # Errors
///
/// Returns `Error::Internal` on malformed rows.
pub fn parse_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| Error::internal("parse_json", e))
}

/// Serializes a value for a JSON column.
///
/// # Errors
///
/// Returns `Error::Internal` when the value cannot be serialized.
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::internal("to_json", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_roundtrip() {
        let now = Utc::now();
        let parsed = parse_ts(&format_ts(now)).unwrap();
        assert!((now - parsed).num_microseconds().unwrap_or(0).abs() <= 1);
    }

    #[test]
    fn test_timestamp_order_is_lexicographic() {
        let early = Utc::now();
        let late = early + chrono::Duration::seconds(5);
        assert!(format_ts(early) < format_ts(late));
    }

    #[test]
    fn test_embedding_blob_roundtrip() {
        let v = vec![0.5f32, -1.25, 3.0, 0.0];
        let blob = embedding_to_blob(&v);
        assert_eq!(blob.len(), 16);
        assert_eq!(blob_to_embedding(&blob).unwrap(), v);
    }

    #[test]
    fn test_bad_blob_rejected() {
        assert!(blob_to_embedding(&[1, 2, 3]).is_err());
    }
}
