//! Routes decoded requests to discovery operations.
//!
//! Payloads are validated here; malformed requests never reach the DHT.

use std::sync::Arc;

use beacon_core::wire::{PendingRequest, PutRequest, Reply};
use beacon_core::RegistryError;
use serde_json::Value;

use crate::discovery::Discovery;

/// Operations callable over the transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Lookup,
    Announce,
    Put,
    Get,
}

impl Operation {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "lookup" => Some(Self::Lookup),
            "announce" => Some(Self::Announce),
            "put" => Some(Self::Put),
            "get" => Some(Self::Get),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lookup => "lookup",
            Self::Announce => "announce",
            Self::Put => "put",
            Self::Get => "get",
        }
    }
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn lookup_name(payload: &Value) -> Result<&str, RegistryError> {
    match payload.as_str() {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(RegistryError::Lookup),
    }
}

/// `[name, port?]`. Absent or null port means "announce on the DHT port".
fn announce_args(payload: &Value) -> Result<(&str, Option<u16>), RegistryError> {
    let args = payload.as_array().ok_or(RegistryError::Announce)?;
    let name = args
        .first()
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or(RegistryError::Announce)?;

    let port = match args.get(1) {
        None | Some(Value::Null) => None,
        Some(v) => {
            let port = v
                .as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .ok_or(RegistryError::ServicePort)?;
            // 0 asks for the DHT port, same as leaving it out.
            (port != 0).then_some(port)
        }
    };
    Ok((name, port))
}

fn put_request(payload: Value) -> Result<PutRequest, RegistryError> {
    // serde would also accept a struct as a positional array.
    if !payload.is_object() {
        return Err(RegistryError::Generic("put expects an object".to_string()));
    }
    serde_json::from_value(payload).map_err(|e| RegistryError::Generic(e.to_string()))
}

fn item_id(payload: &Value) -> Result<&str, RegistryError> {
    payload
        .as_str()
        .ok_or_else(|| RegistryError::HashFormat("item id must be a string".to_string()))
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

pub struct Dispatcher {
    engine: Arc<Discovery>,
}

impl Dispatcher {
    pub fn new(engine: Arc<Discovery>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<Discovery> {
        &self.engine
    }

    /// Run `op` with `payload`. The result is the reply's success value.
    pub async fn dispatch(&self, op: &str, payload: Value) -> Reply {
        let op = Operation::parse(op)
            .ok_or_else(|| RegistryError::OperationNotFound(op.to_string()))?;

        match op {
            Operation::Lookup => {
                let peers = self.engine.lookup(lookup_name(&payload)?).await?;
                Ok(Value::from(peers))
            }
            Operation::Announce => {
                let (name, port) = announce_args(&payload)?;
                self.engine.announce(name, port).await?;
                Ok(Value::Null)
            }
            Operation::Put => {
                let id = self.engine.put(put_request(payload)?).await?;
                Ok(Value::String(id))
            }
            Operation::Get => match self.engine.get(item_id(&payload)?).await? {
                Some(item) => {
                    serde_json::to_value(item).map_err(|e| RegistryError::Generic(e.to_string()))
                }
                None => Ok(Value::Null),
            },
        }
    }

    /// Dispatch a decoded transport request, logging failures.
    pub async fn handle(&self, req: PendingRequest) -> Reply {
        let reply = self.dispatch(&req.op, req.payload).await;
        if let Err(e) = &reply {
            tracing::debug!(op = %req.op, rid = %req.rid, code = e.code(), error = %e, "request failed");
        }
        reply
    }
}
