//! Hashing System - SHA-256 for Batch Manifests
//!
//! Identical records and templates must hash identically, so a reprint can be
//! proven byte-for-byte equal to the first run.

use serde::Serialize;
use serde_json::{to_string, Value};
use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(&v))
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sort_value(v)))
                    .collect(),
            )
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

pub fn compute_document_hash(document: &str) -> String {
    sha256_hex(document.as_bytes())
}

/// batch_hash = sha256(template_name + template_hash + canonical_payload + engine_version)
pub fn compute_batch_hash(
    template_name: &str,
    template_source: &str,
    payload: &impl Serialize,
    engine_version: &str,
) -> Result<String, serde_json::Error> {
    let canonical_payload = canonical_json(payload)?;
    let combined = format!(
        "{}:{}:{}:{}",
        template_name,
        sha256_hex(template_source.as_bytes()),
        canonical_payload,
        engine_version
    );
    Ok(sha256_hex(combined.as_bytes()))
}
