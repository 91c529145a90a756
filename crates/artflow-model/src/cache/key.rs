//! Cache keys.

use derive_more::{AsRef, Deref, Display};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::chat::ModelParams;

/// Hex-encoded SHA-256 digest identifying a cached request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(AsRef, Deref, Display)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Computes the key of a request.
    ///
    /// Null parameters are ignored and object keys are sorted, so the key
    /// does not depend on parameter order.
    pub fn new(model_id: &str, prompt: &str, params: &ModelParams) -> Self {
        let canonical = serde_json::json!({
            "model_id": model_id,
            "prompt": prompt,
            "params": canonicalize(&Value::Object(params.clone())),
        });

        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Sorts object keys recursively and drops null object members.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().filter(|(_, v)| !v.is_null()).collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let map: Map<String, Value> = entries
                .into_iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            Value::Object(map)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
