//! Storage encoding for the session record.
//!
//! The record is serialized to JSON and then base64-encoded (standard
//! alphabet, padded). This keeps the stored value ASCII-safe and compatible
//! with records written by browser clients using `btoa(JSON.stringify(..))`.
//! It is not encryption: anyone with access to the store can read the record.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::Value;

use crate::error::{KeepsakeError, Result};

/// Encode a record for storage.
pub fn encode(record: &Value) -> Result<String> {
    let json = serde_json::to_string(record)?;
    Ok(BASE64.encode(json))
}

/// Decode a stored record.
///
/// Fails with [`KeepsakeError::Decode`] when the value is not base64 or the
/// decoded bytes are not UTF-8, and with [`KeepsakeError::Serde`] when the
/// payload is not JSON.
pub fn decode(stored: &str) -> Result<Value> {
    let bytes = BASE64
        .decode(stored.trim())
        .map_err(|e| KeepsakeError::decode(format!("stored record is not base64: {}", e)))?;
    let json = String::from_utf8(bytes)
        .map_err(|e| KeepsakeError::decode(format!("stored record is not UTF-8: {}", e)))?;
    Ok(serde_json::from_str(&json)?)
}
