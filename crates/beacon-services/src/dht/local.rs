//! In-process DHT overlay.
//!
//! Every participant lives in one shared [`LocalNetwork`], addressed by the
//! `host:port` it was bound to. Bootstrap creates symmetric links; a
//! participant reaches every node connected to it through links. Announces
//! and items are stored on every reachable node, and a lookup reports each
//! stored peer as a discovery event relayed by the node that held it.
//!
//! Used by the test suites and for single-host experiments where spinning
//! up real UDP sockets is not wanted.

use std::collections::{HashSet, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use beacon_core::keys::{self, ITEM_ID_LEN};
use beacon_core::wire::StoredValue;

use super::{DhtAdapter, DhtBackend, DhtError, DhtEvent, DhtObserver, ListenOptions};

/// First port handed out when a participant asks for port 0.
const EPHEMERAL_PORT_START: u16 = 49152;

/// Shared overlay. Cloning yields another handle to the same network.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    inner: Arc<NetworkInner>,
}

#[derive(Default)]
struct NetworkInner {
    nodes: DashMap<SocketAddr, Arc<LocalNode>>,
    next_port: AtomicU16,
}

struct LocalNode {
    addr: SocketAddr,
    links: DashMap<SocketAddr, ()>,
    /// hashed key -> announced peers.
    tables: DashMap<String, PeerTable>,
    items: DashMap<[u8; ITEM_ID_LEN], Vec<u8>>,
    observer: Arc<dyn DhtObserver>,
    max_tables: usize,
}

struct PeerTable {
    updated: Instant,
    peers: HashSet<SocketAddr>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live participants.
    pub fn len(&self) -> usize {
        self.inner.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.nodes.is_empty()
    }

    fn allocate_port(&self, host: IpAddr) -> Result<u16, DhtError> {
        for _ in 0..=(u16::MAX - EPHEMERAL_PORT_START) {
            let offset = self.inner.next_port.fetch_add(1, Ordering::Relaxed)
                % (u16::MAX - EPHEMERAL_PORT_START);
            let port = EPHEMERAL_PORT_START + offset;
            if !self.inner.nodes.contains_key(&SocketAddr::new(host, port)) {
                return Ok(port);
            }
        }
        Err(DhtError::Bootstrap("no free port".to_string()))
    }
}

#[async_trait]
impl DhtBackend for LocalNetwork {
    async fn listen(
        &self,
        opts: ListenOptions,
        observer: Arc<dyn DhtObserver>,
    ) -> Result<Arc<dyn DhtAdapter>, DhtError> {
        let host = opts
            .bind
            .filter(|ip| !ip.is_unspecified())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let port = match opts.port {
            0 => self.allocate_port(host)?,
            p => p,
        };
        let addr = SocketAddr::new(host, port);

        let node = Arc::new(LocalNode {
            addr,
            links: DashMap::new(),
            tables: DashMap::new(),
            items: DashMap::new(),
            observer,
            max_tables: opts.max_tables.max(1),
        });

        match self.inner.nodes.entry(addr) {
            Entry::Occupied(_) => {
                return Err(DhtError::Bootstrap(format!("address {addr} already in use")));
            }
            Entry::Vacant(slot) => {
                slot.insert(node.clone());
            }
        }

        node.observer.on_event(DhtEvent::Listening { addr });

        for entry in &opts.bootstrap {
            let Ok(peer_addr) = entry.parse::<SocketAddr>() else {
                node.observer.on_event(DhtEvent::Warning {
                    message: format!("ignoring malformed bootstrap address '{entry}'"),
                });
                continue;
            };
            let peer = self.inner.nodes.get(&peer_addr).map(|p| p.value().clone());
            match peer {
                Some(peer) if peer.addr != addr => {
                    node.links.insert(peer.addr, ());
                    peer.links.insert(addr, ());
                    node.observer.on_event(DhtEvent::Node { addr: peer.addr });
                    peer.observer.on_event(DhtEvent::Node { addr });
                }
                Some(_) => {}
                None => node.observer.on_event(DhtEvent::Warning {
                    message: format!("bootstrap node {peer_addr} unreachable"),
                }),
            }
        }

        node.observer.on_event(DhtEvent::Ready);
        tracing::debug!(%addr, "local dht participant listening");

        Ok(Arc::new(LocalDht {
            network: self.inner.clone(),
            node,
            destroyed: AtomicBool::new(false),
        }))
    }
}

impl LocalNode {
    fn store_peer(&self, hashed_key: &str, peer: SocketAddr) {
        if !self.tables.contains_key(hashed_key) && self.tables.len() >= self.max_tables {
            let oldest = self
                .tables
                .iter()
                .min_by_key(|t| t.value().updated)
                .map(|t| t.key().clone());
            if let Some(oldest) = oldest {
                self.tables.remove(&oldest);
            }
        }

        let mut table = self
            .tables
            .entry(hashed_key.to_string())
            .or_insert_with(|| PeerTable {
                updated: Instant::now(),
                peers: HashSet::new(),
            });
        table.updated = Instant::now();
        table.peers.insert(peer);
    }

    fn peers_for(&self, hashed_key: &str) -> Vec<SocketAddr> {
        self.tables
            .get(hashed_key)
            .map(|t| t.peers.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// A participant of a [`LocalNetwork`].
pub struct LocalDht {
    network: Arc<NetworkInner>,
    node: Arc<LocalNode>,
    destroyed: AtomicBool,
}

impl LocalDht {
    fn ensure_live(&self) -> Result<(), DhtError> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(DhtError::Destroyed);
        }
        Ok(())
    }

    /// This node plus every node reachable from it through links.
    fn reachable(&self) -> Vec<Arc<LocalNode>> {
        let mut seen = HashSet::from([self.node.addr]);
        let mut queue = VecDeque::from([self.node.clone()]);
        let mut out = Vec::new();

        while let Some(node) = queue.pop_front() {
            let links: Vec<SocketAddr> = node.links.iter().map(|l| *l.key()).collect();
            for addr in links {
                if !seen.insert(addr) {
                    continue;
                }
                if let Some(peer) = self.network.nodes.get(&addr) {
                    queue.push_back(peer.value().clone());
                }
            }
            out.push(node);
        }
        out
    }

    fn leave(&self) {
        let addr = self.node.addr;
        self.network
            .nodes
            .remove_if(&addr, |_, n| Arc::ptr_eq(n, &self.node));

        let links: Vec<SocketAddr> = self.node.links.iter().map(|l| *l.key()).collect();
        for link in links {
            if let Some(peer) = self.network.nodes.get(&link) {
                peer.links.remove(&addr);
            }
        }
        self.node.links.clear();
    }
}

#[async_trait]
impl DhtAdapter for LocalDht {
    fn local_addr(&self) -> SocketAddr {
        self.node.addr
    }

    async fn announce(&self, hashed_key: &str, port: u16) -> Result<(), DhtError> {
        self.ensure_live()?;
        let peer = SocketAddr::new(self.node.addr.ip(), port);

        for node in self.reachable() {
            node.store_peer(hashed_key, peer);
            node.observer.on_event(DhtEvent::Announce {
                peer,
                hashed_key: hashed_key.to_string(),
            });
        }
        Ok(())
    }

    async fn lookup(&self, hashed_key: &str) -> Result<(), DhtError> {
        self.ensure_live()?;

        for node in self.reachable() {
            let via = (node.addr != self.node.addr).then_some(node.addr);
            for peer in node.peers_for(hashed_key) {
                self.node.observer.on_event(DhtEvent::Peer {
                    peer,
                    hashed_key: hashed_key.to_string(),
                    via,
                });
            }
        }
        Ok(())
    }

    async fn get(&self, item_id: &str) -> Result<Option<StoredValue>, DhtError> {
        self.ensure_live()?;
        let id = keys::parse_item_id(item_id).map_err(|e| DhtError::InvalidHash(e.to_string()))?;

        let value = self
            .reachable()
            .into_iter()
            .find_map(|node| node.items.get(&id).map(|v| v.value().clone()));

        Ok(value.map(|raw| StoredValue {
            id: hex::encode(id),
            v: keys::decode_value(&raw),
        }))
    }

    async fn put(&self, value: &[u8]) -> Result<String, DhtError> {
        self.ensure_live()?;
        let digest = blake3::hash(value);
        let mut id = [0u8; ITEM_ID_LEN];
        id.copy_from_slice(&digest.as_bytes()[..ITEM_ID_LEN]);

        for node in self.reachable() {
            node.items.insert(id, value.to_vec());
        }
        Ok(hex::encode(id))
    }

    async fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            self.leave();
            tracing::debug!(addr = %self.node.addr, "local dht participant destroyed");
        }
    }
}

impl Drop for LocalDht {
    fn drop(&mut self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            self.leave();
        }
    }
}
