//! DHT adapter — the capability the discovery engine is built on.
//!
//! A backend joins the overlay (`DhtBackend::listen`) and hands back an
//! adapter for announce/lookup/get/put. Peer addresses are never returned
//! by `lookup` itself: the adapter reports them as [`DhtEvent::Peer`]
//! events to the observer installed at listen time, possibly before,
//! during or after the lookup completes.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use beacon_core::keys::ITEM_ID_LEN;
use beacon_core::wire::StoredValue;

pub mod bittorrent;
pub mod local;

pub use self::bittorrent::MainlineBackend;
pub use self::local::LocalNetwork;

// ── Events ────────────────────────────────────────────────────────────────────

/// Something the DHT participant observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhtEvent {
    /// A peer was seen for `hashed_key`, optionally relayed by `via`.
    Peer {
        peer: SocketAddr,
        hashed_key: String,
        via: Option<SocketAddr>,
    },
    /// Another participant announced `peer` for `hashed_key` to this node.
    Announce { peer: SocketAddr, hashed_key: String },
    /// A participant was added to the routing table.
    Node { addr: SocketAddr },
    /// The socket is bound.
    Listening { addr: SocketAddr },
    /// Bootstrap finished.
    Ready,
    Warning { message: String },
}

/// Receives adapter events. Called on the adapter's event path, so
/// implementations must not block.
pub trait DhtObserver: Send + Sync {
    fn on_event(&self, event: DhtEvent);
}

// ── Adapter ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenOptions {
    /// UDP port to bind. 0 = any free port.
    pub port: u16,
    /// Bind address. None = all interfaces.
    pub bind: Option<IpAddr>,
    /// `host:port` of participants to join through.
    pub bootstrap: Vec<String>,
    /// Upper bound on announce tables stored for other peers.
    pub max_tables: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DhtError {
    #[error("bootstrap failed: {0}")]
    Bootstrap(String),
    #[error("invalid hash: {0}")]
    InvalidHash(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("dht has been destroyed")]
    Destroyed,
}

/// Starts DHT participants.
#[async_trait]
pub trait DhtBackend: Send + Sync {
    /// Bind and join the overlay. Fails fast when the port is taken.
    async fn listen(
        &self,
        opts: ListenOptions,
        observer: Arc<dyn DhtObserver>,
    ) -> Result<Arc<dyn DhtAdapter>, DhtError>;
}

/// A running DHT participant.
#[async_trait]
pub trait DhtAdapter: Send + Sync {
    /// Address the participant is bound to.
    fn local_addr(&self) -> SocketAddr;

    /// Announce that this host serves `hashed_key` on `port`.
    async fn announce(&self, hashed_key: &str, port: u16) -> Result<(), DhtError>;

    /// Traverse the overlay for `hashed_key`. Results arrive as events.
    async fn lookup(&self, hashed_key: &str) -> Result<(), DhtError>;

    /// Fetch an immutable item by hex id.
    async fn get(&self, item_id: &str) -> Result<Option<StoredValue>, DhtError>;

    /// Store an immutable item. Returns its hex id.
    async fn put(&self, value: &[u8]) -> Result<String, DhtError>;

    /// Leave the overlay and release the socket. Idempotent.
    async fn destroy(&self);
}

/// Fixed-width DHT target for a hashed service key.
pub fn target_id(hashed_key: &str) -> [u8; ITEM_ID_LEN] {
    let digest = blake3::hash(hashed_key.as_bytes());
    let mut id = [0u8; ITEM_ID_LEN];
    id.copy_from_slice(&digest.as_bytes()[..ITEM_ID_LEN]);
    id
}
