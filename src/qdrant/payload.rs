//! Helpers for constructing and reading Qdrant payloads, plus shared hashing and timestamps.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Payload key holding the search text.
pub(crate) const TEXT_KEY: &str = "text";
/// Payload key holding the record metadata object.
pub(crate) const METADATA_KEY: &str = "metadata";

/// Build the payload object stored alongside each point.
pub(crate) fn build_payload(text: &str, metadata: &Map<String, Value>) -> Value {
    let mut payload = Map::new();
    payload.insert(TEXT_KEY.into(), Value::String(text.to_string()));
    payload.insert(METADATA_KEY.into(), Value::Object(metadata.clone()));
    Value::Object(payload)
}

/// Split a stored payload back into search text and metadata.
pub(crate) fn split_payload(payload: Option<Map<String, Value>>) -> (String, Map<String, Value>) {
    let Some(mut map) = payload else {
        return (String::new(), Map::new());
    };
    let text = match map.remove(TEXT_KEY) {
        Some(Value::String(text)) => text,
        _ => String::new(),
    };
    let metadata = match map.remove(METADATA_KEY) {
        Some(Value::Object(metadata)) => metadata,
        _ => map,
    };
    (text, metadata)
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Construct an identifier accepted by every store backend.
pub(crate) fn generate_record_id() -> String {
    Uuid::new_v4().to_string()
}
