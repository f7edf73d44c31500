use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// The persisted, transmissible form of a blob handle.
///
/// ```json
/// {"kind": "blob-store-aws", "payload": {"bucket": "bkt", "region": "us-east-1", "object_key": "k1"}}
/// ```
///
/// `kind` selects the backend; `payload` holds exactly that backend's
/// identity fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerialisedBlobPath {
    pub kind: String,
    pub payload: serde_json::Value,
}

impl SerialisedBlobPath {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Encode as a JSON string.
    pub fn to_json(&self) -> StoreResult<String> {
        serde_json::to_string(self).map_err(|e| StoreError::Validation(e.to_string()))
    }

    /// Decode from a JSON string.
    ///
    /// Only the envelope is checked here; the payload is validated by the
    /// backend that owns `kind`.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| StoreError::Validation(format!("malformed serialised blob path: {e}")))
    }
}
