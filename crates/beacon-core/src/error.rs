//! Error kinds surfaced to RPC callers.
//!
//! Callers only ever see the string code of an error, never its message.
//! Messages exist for the node's own logs.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Unrecognized operation name.
    #[error("unknown operation '{0}'")]
    OperationNotFound(String),
    /// Lookup payload missing, empty, or not a string.
    #[error("lookup expects a service name")]
    Lookup,
    /// Announce payload missing or not `[name, port?]`.
    #[error("announce expects [name, port?]")]
    Announce,
    /// Announce port present but not a port number.
    #[error("service port must be an integer in 0..=65535")]
    ServicePort,
    /// Get payload is not a well-formed item id.
    #[error("malformed hash: {0}")]
    HashFormat(String),
    /// Any other failure resolving a get or put.
    #[error("{0}")]
    Generic(String),
    /// DHT participant failed to start.
    #[error("dht bootstrap failed: {0}")]
    Bootstrap(String),
    /// DHT operation failed.
    #[error("dht operation failed: {0}")]
    Dht(String),
}

impl RegistryError {
    /// Stable wire identifier for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::OperationNotFound(_) => "ERR_REQ_NOTFOUND",
            Self::Lookup => "ERR_LOOKUP",
            Self::Announce => "ERR_ANNOUNCE",
            Self::ServicePort => "ERR_SERVICE_PORT",
            Self::HashFormat(_) => "ERR_HASH_FORMAT",
            Self::Generic(_) => "ERR_GENERIC",
            Self::Bootstrap(_) => "ERR_BOOTSTRAP",
            Self::Dht(_) => "ERR_DHT",
        }
    }
}

impl Serialize for RegistryError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}
