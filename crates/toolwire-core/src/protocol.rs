//! Wire protocol: JSON-RPC 2.0 frames exchanged over a subordinate's stdio.
//!
//! One frame per line. `serde_json` escapes control characters inside
//! strings, so an encoded frame never contains a raw newline.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Protocol version announced during the `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC version tag carried by every frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method names used by the client and the tool backend.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const PING: &str = "ping";
}

/// Standard JSON-RPC error codes.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

// ─────────────────────────────────────────────
// Correlation ids
// ─────────────────────────────────────────────

/// Correlation id pairing a request with its response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for RequestId {
    fn from(n: u64) -> Self {
        RequestId::Number(n)
    }
}

// ─────────────────────────────────────────────
// Errors carried inside frames
// ─────────────────────────────────────────────

/// Error object of a failed JSON-RPC response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        RpcError {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

// ─────────────────────────────────────────────
// Frame
// ─────────────────────────────────────────────

/// The kind of a frame, derived from which fields are present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Request,
    Response,
    Notification,
}

/// Why an inbound line could not be turned into a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not a request, response or notification")]
    Shape,
}

/// One JSON-RPC 2.0 message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// `"result": null` is a valid success reply, so a present null stays `Some`.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Frame {
    fn empty() -> Self {
        Frame {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: None,
            params: None,
            result: None,
            error: None,
        }
    }

    /// A request expecting a response with the same id.
    pub fn request(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Frame {
            id: Some(id.into()),
            method: Some(method.into()),
            params,
            ..Self::empty()
        }
    }

    /// A fire-and-forget notification.
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Frame {
            method: Some(method.into()),
            params,
            ..Self::empty()
        }
    }

    /// A successful response.
    pub fn response(id: RequestId, result: Value) -> Self {
        Frame {
            id: Some(id),
            result: Some(result),
            ..Self::empty()
        }
    }

    /// A failed response. `id` is `None` only when the request id could not
    /// be read (parse errors).
    pub fn error_response(id: Option<RequestId>, error: RpcError) -> Self {
        Frame {
            id,
            error: Some(error),
            ..Self::empty()
        }
    }

    /// Classify the frame by shape. `None` means malformed.
    pub fn kind(&self) -> Option<FrameKind> {
        match (&self.id, &self.method) {
            (Some(_), Some(_)) => Some(FrameKind::Request),
            (None, Some(_)) => Some(FrameKind::Notification),
            (_, None) if self.result.is_some() || self.error.is_some() => {
                Some(FrameKind::Response)
            }
            _ => None,
        }
    }

    /// Serialize as a single line, without the trailing newline.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse one line into a well-formed frame.
    pub fn decode(line: &str) -> Result<Frame, FrameError> {
        let frame: Frame = serde_json::from_str(line.trim())?;
        if frame.kind().is_none() {
            return Err(FrameError::Shape);
        }
        Ok(frame)
    }
}
