//! Discovery engine — announce and lookup over time-bucketed DHT keys.
//!
//! Announces go to the current bucket's key. Lookups query the current and
//! previous bucket and answer from the peer cache once both traversals end,
//! so an announce stays visible for at least one full window.

use std::sync::Arc;

use beacon_core::keys;
use beacon_core::wire::{PutRequest, StoredValue};
use beacon_core::{RegistryError, Timeslot};
use tokio::sync::broadcast;

use crate::cache::PeerCache;
use crate::dht::{DhtAdapter, DhtError, DhtEvent, DhtObserver};

// ── Event routing ─────────────────────────────────────────────────────────────

/// Installed as the DHT observer. Feeds the cache and fans events out.
pub struct EventRouter {
    cache: PeerCache,
    events: broadcast::Sender<DhtEvent>,
}

impl EventRouter {
    pub fn new(cache: PeerCache, events: broadcast::Sender<DhtEvent>) -> Self {
        Self { cache, events }
    }
}

/// Service key for logs; raw hex when it is not valid UTF-8.
fn readable_key(hashed_key: &str) -> String {
    keys::decode_key(hashed_key).unwrap_or_else(|_| hashed_key.to_string())
}

impl DhtObserver for EventRouter {
    fn on_event(&self, event: DhtEvent) {
        match &event {
            DhtEvent::Peer {
                peer,
                hashed_key,
                via,
            } => {
                self.cache.record(hashed_key, peer.to_string());
                tracing::debug!(
                    %peer,
                    key = %readable_key(hashed_key),
                    via = ?via,
                    "peer found"
                );
            }
            DhtEvent::Announce { peer, hashed_key } => {
                tracing::debug!(%peer, key = %readable_key(hashed_key), "announce received");
            }
            DhtEvent::Node { addr } => tracing::debug!(%addr, "dht node added"),
            DhtEvent::Listening { addr } => tracing::info!(%addr, "dht listening"),
            DhtEvent::Ready => tracing::info!("dht ready"),
            DhtEvent::Warning { message } => tracing::warn!(%message, "dht warning"),
        }
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// The registry operations, independent of any transport.
pub struct Discovery {
    dht: Arc<dyn DhtAdapter>,
    cache: PeerCache,
    timeslot: Timeslot,
}

impl Discovery {
    pub fn new(dht: Arc<dyn DhtAdapter>, cache: PeerCache, timeslot: Timeslot) -> Self {
        Self {
            dht,
            cache,
            timeslot,
        }
    }

    pub fn cache(&self) -> &PeerCache {
        &self.cache
    }

    pub fn timeslot(&self) -> Timeslot {
        self.timeslot
    }

    /// Port announced when the caller gives none: the DHT's own port.
    pub fn self_port(&self) -> u16 {
        self.dht.local_addr().port()
    }

    /// Peers serving `name`, sorted and de-duplicated.
    pub async fn lookup(&self, name: &str) -> Result<Vec<String>, RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::Lookup);
        }

        let [current, previous] = self.timeslot.lookup_keys(name);
        let current = keys::encode_key(&current);
        let previous = keys::encode_key(&previous);

        tokio::try_join!(self.dht.lookup(&current), self.dht.lookup(&previous))
            .map_err(|e| RegistryError::Dht(e.to_string()))?;

        let mut peers = self.cache.read(&current);
        peers.extend(self.cache.read(&previous));
        Ok(peers.into_iter().collect())
    }

    /// Announce `name` in the current bucket on `port`, or on the DHT port.
    pub async fn announce(&self, name: &str, port: Option<u16>) -> Result<(), RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::Announce);
        }

        let port = port.unwrap_or_else(|| self.self_port());
        let key = keys::encode_key(&self.timeslot.announce_key(name));
        self.dht
            .announce(&key, port)
            .await
            .map_err(|e| RegistryError::Dht(e.to_string()))?;

        tracing::debug!(service = name, port, "announced");
        Ok(())
    }

    /// Announce on the DHT port without waiting for the result.
    pub fn spawn_announce(self: &Arc<Self>, name: impl Into<String>) {
        let engine = Arc::clone(self);
        let name = name.into();
        tokio::spawn(async move {
            if let Err(e) = engine.announce(&name, None).await {
                tracing::warn!(service = %name, error = %e, "self-announce failed");
            }
        });
    }

    /// Store an immutable value. Returns its hex item id.
    pub async fn put(&self, req: PutRequest) -> Result<String, RegistryError> {
        self.dht
            .put(req.v.as_bytes())
            .await
            .map_err(|e| RegistryError::Generic(e.to_string()))
    }

    /// Fetch an immutable value by hex item id.
    pub async fn get(&self, item_id: &str) -> Result<Option<StoredValue>, RegistryError> {
        self.dht.get(item_id).await.map_err(|e| match e {
            DhtError::InvalidHash(msg) => RegistryError::HashFormat(msg),
            other => RegistryError::Generic(other.to_string()),
        })
    }
}
