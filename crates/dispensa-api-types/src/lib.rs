//! Shared request and response types for the dispensa RPC surface.
//!
//! Byte-valued fields (`key`, `cas_id`, `data`, `value`) travel as
//! base64 strings inside JSON envelopes; the [`b64`] serde helpers keep
//! the encoding in one place for the server, the CLI, and tests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod b64;

/// gRPC-style numeric status codes carried in error envelopes.
pub mod code {
    pub const OK: u32 = 0;
    pub const UNKNOWN: u32 = 2;
    pub const NOT_FOUND: u32 = 5;
    pub const UNAVAILABLE: u32 = 14;
}

/// Symbolic error codes used alongside the numeric status.
pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const UNAVAILABLE: &str = "unavailable";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    pub const INTERNAL: &str = "internal";
}

/// Request body for `POST /rpc/v1/get-value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetValueRequest {
    /// Opaque client-derived cache key, compared byte-exact.
    #[serde(with = "b64")]
    pub key: Vec<u8>,
}

/// Response body for `POST /rpc/v1/get-value`.
///
/// `value` is present and complete iff `found` is true; a miss is a
/// normal response, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetValueResponse {
    pub found: bool,
    #[serde(default, with = "b64::option", skip_serializing_if = "Option::is_none")]
    pub value: Option<Vec<u8>>,
}

/// Request body for `POST /rpc/v1/save`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveRequest {
    /// Caller-declared digest. The server recomputes and treats its own
    /// value as authoritative; a mismatch is logged, never honored.
    #[serde(with = "b64")]
    pub cas_id: Vec<u8>,
    #[serde(with = "b64")]
    pub data: Vec<u8>,
    /// Artifact type tag (`"pcm"`, `"o"`, `"metadata"`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// Deployment-specific extension: the base protocol's Save carries
    /// no cache key, so this field is honored only when the server has
    /// inline association enabled.
    #[serde(default, with = "b64::option", skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<Vec<u8>>,
}

/// Response body for `POST /rpc/v1/save`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveResponse {
    /// Server-computed digest, authoritative over the request's claim.
    #[serde(with = "b64")]
    pub cas_id: Vec<u8>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Request body for `POST /rpc/v1/put-value` (compatibility stub).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutValueRequest {
    #[serde(with = "b64")]
    pub key: Vec<u8>,
    #[serde(with = "b64")]
    pub cas_id: Vec<u8>,
}

/// Response body for `POST /rpc/v1/put-value`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PutValueResponse {}

/// Request body for `POST /rpc/v1/load` (compatibility stub).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadRequest {
    #[serde(with = "b64")]
    pub cas_id: Vec<u8>,
}

/// Response body for `POST /rpc/v1/load`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadResponse {
    pub found: bool,
    #[serde(default, with = "b64::option", skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

/// Error envelope attached to non-2xx RPC responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorBody {
    pub error: RpcErrorMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorMessage {
    /// Symbolic code from [`codes`].
    pub code: String,
    /// Numeric status from [`code`].
    pub grpc_code: u32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Response body for `GET /admin/v1/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub artifact_count: u64,
    pub artifact_bytes: u64,
    pub index_entries: u64,
    pub lookup_hits: u64,
    pub lookup_misses: u64,
    pub dedup_hits: u64,
    pub evictions: u64,
}

/// Response body for `GET /admin/v1/artifacts/{cas_id}` (inspection;
/// payload bytes intentionally omitted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactInfo {
    /// Hex rendering of the artifact digest.
    pub cas_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_value_miss_omits_value() {
        let response = GetValueResponse {
            found: false,
            value: None,
        };
        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(json, serde_json::json!({ "found": false }));
    }

    #[test]
    fn save_request_round_trips_bytes() {
        let request = SaveRequest {
            cas_id: vec![0xAB; 32],
            data: b"object bytes".to_vec(),
            kind: "o".to_string(),
            metadata: BTreeMap::from([("target".to_string(), "arm64".to_string())]),
            cache_key: None,
        };
        let json = serde_json::to_string(&request).expect("serialize");
        assert!(json.contains("\"type\":\"o\""));
        let parsed: SaveRequest = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.data, request.data);
        assert_eq!(parsed.cas_id, request.cas_id);
        assert!(parsed.cache_key.is_none());
    }

    #[test]
    fn save_request_accepts_missing_metadata() {
        let parsed: SaveRequest = serde_json::from_str(
            r#"{"cas_id":"qg==","data":"aGVsbG8=","type":"pcm"}"#,
        )
        .expect("deserialize");
        assert!(parsed.metadata.is_empty());
        assert_eq!(parsed.data, b"hello");
    }

    #[test]
    fn error_envelope_shape() {
        let body = RpcErrorBody {
            error: RpcErrorMessage {
                code: codes::UNAVAILABLE.to_string(),
                grpc_code: code::UNAVAILABLE,
                message: "server busy".to_string(),
                hint: None,
            },
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["error"]["grpc_code"], 14);
    }
}
