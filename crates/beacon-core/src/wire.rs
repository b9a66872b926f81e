//! RPC envelopes shared by every transport.
//!
//! WebSocket: request frame `[rid, op, payload]`, reply frame `[rid, errorOrResult]`.
//! HTTP: `POST /{op}` with body `{rid, data}`, reply body `errorOrResult`.
//!
//! `errorOrResult` is either the error code string or the success payload,
//! never both.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RegistryError;

/// Outcome of one dispatched request.
pub type Reply = Result<Value, RegistryError>;

/// A request that has been decoded from a transport and awaits dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    /// Caller-chosen request id, echoed back untouched.
    pub rid: Value,
    /// Operation name as sent on the wire.
    pub op: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("frame must be [rid, op, payload]")]
    BadShape,
}

#[derive(Deserialize)]
struct HttpEnvelope {
    #[serde(default)]
    rid: Value,
    #[serde(default)]
    data: Value,
}

impl PendingRequest {
    /// Decode a WebSocket text frame. A missing payload decodes as `null`.
    pub fn from_ws_frame(text: &str) -> Result<Self, FrameError> {
        let frame: Value =
            serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
        let Value::Array(mut parts) = frame else {
            return Err(FrameError::BadShape);
        };
        if !(2..=3).contains(&parts.len()) {
            return Err(FrameError::BadShape);
        }
        let payload = if parts.len() == 3 {
            parts.pop().unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        let op = match parts.pop() {
            Some(Value::String(op)) => op,
            _ => return Err(FrameError::BadShape),
        };
        let rid = parts.pop().unwrap_or(Value::Null);
        Ok(Self { rid, op, payload })
    }

    /// Decode an HTTP request: operation from the URL path, envelope from the body.
    pub fn from_http(path: &str, body: &[u8]) -> Result<Self, FrameError> {
        let envelope: HttpEnvelope =
            serde_json::from_slice(body).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
        Ok(Self {
            rid: envelope.rid,
            op: path.trim_start_matches('/').to_string(),
            payload: envelope.data,
        })
    }
}

/// The `errorOrResult` value of a reply.
pub fn reply_body(reply: &Reply) -> Value {
    match reply {
        Ok(value) => value.clone(),
        Err(e) => Value::String(e.code().to_string()),
    }
}

/// Encode a WebSocket reply frame.
pub fn ws_reply_frame(rid: &Value, reply: &Reply) -> String {
    Value::Array(vec![rid.clone(), reply_body(reply)]).to_string()
}

/// Options accepted by `put`. Only immutable items are supported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutRequest {
    pub v: String,
}

/// An immutable item read back from the DHT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredValue {
    /// Hex item id.
    pub id: String,
    pub v: String,
}
