//! Mainline (BitTorrent) DHT backend.
//!
//! Service keys are mapped to 20-byte info hashes with [`super::target_id`].
//! The mainline client does not surface inbound announces or routing table
//! changes, so this backend only emits `Listening`, `Ready`/`Warning` and
//! `Peer` events.
//!
//! The client runs on its own thread and keeps its UDP socket until every
//! handle is dropped. `destroy` therefore cancels the readiness task and any
//! in-flight query before releasing the last handle.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use ::mainline::async_dht::AsyncDht;
use ::mainline::{Dht, Id};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use beacon_core::keys::{self, ITEM_ID_LEN};
use beacon_core::wire::StoredValue;

use super::{target_id, DhtAdapter, DhtBackend, DhtError, DhtEvent, DhtObserver, ListenOptions};

/// Upper bound on draining one `get_peers` traversal.
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Starts participants on the public mainline DHT, or on a private overlay
/// when bootstrap addresses are given.
#[derive(Debug, Clone)]
pub struct MainlineBackend {
    query_timeout: Duration,
}

impl Default for MainlineBackend {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

impl MainlineBackend {
    pub fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }
}

#[async_trait]
impl DhtBackend for MainlineBackend {
    async fn listen(
        &self,
        opts: ListenOptions,
        observer: Arc<dyn DhtObserver>,
    ) -> Result<Arc<dyn DhtAdapter>, DhtError> {
        let mut builder = Dht::builder();
        builder.server_mode();
        builder.port(opts.port);
        if !opts.bootstrap.is_empty() {
            builder.bootstrap(opts.bootstrap.as_slice());
        }
        match opts.bind {
            Some(IpAddr::V4(addr)) => {
                builder.bind_address(addr);
            }
            Some(IpAddr::V6(addr)) => {
                return Err(DhtError::Bootstrap(format!(
                    "mainline dht only binds IPv4, got {addr}"
                )));
            }
            None => {}
        }

        let dht = builder
            .build()
            .map_err(|e| DhtError::Bootstrap(e.to_string()))?
            .as_async();

        let local_addr = SocketAddr::from(dht.info().await.local_addr());
        observer.on_event(DhtEvent::Listening { addr: local_addr });

        tracing::info!(
            addr = %local_addr,
            bootstrap = opts.bootstrap.len(),
            "mainline dht listening"
        );

        let bootstrapping = dht.clone();
        let ready_observer = observer.clone();
        let ready = tokio::spawn(async move {
            if bootstrapping.bootstrapped().await {
                ready_observer.on_event(DhtEvent::Ready);
            } else {
                ready_observer.on_event(DhtEvent::Warning {
                    message: "bootstrap did not complete".to_string(),
                });
            }
        });

        let (closed, _) = watch::channel(false);
        Ok(Arc::new(MainlineDht {
            dht: RwLock::new(Some(dht)),
            ready: Mutex::new(Some(ready)),
            closed,
            local_addr,
            observer,
            query_timeout: self.query_timeout,
        }))
    }
}

/// A running mainline participant.
pub struct MainlineDht {
    dht: RwLock<Option<AsyncDht>>,
    ready: Mutex<Option<JoinHandle<()>>>,
    closed: watch::Sender<bool>,
    local_addr: SocketAddr,
    observer: Arc<dyn DhtObserver>,
    query_timeout: Duration,
}

impl MainlineDht {
    fn handle(&self) -> Result<AsyncDht, DhtError> {
        self.dht
            .read()
            .map_err(|_| DhtError::Destroyed)?
            .clone()
            .ok_or(DhtError::Destroyed)
    }

    /// Run `op` unless `destroy` is called first. `op` must own its handle
    /// so that cancelling it releases the handle too.
    async fn until_destroyed<T>(
        &self,
        op: impl Future<Output = Result<T, DhtError>>,
    ) -> Result<T, DhtError> {
        let mut closed = self.closed.subscribe();
        tokio::select! {
            res = op => res,
            _ = destroyed(&mut closed) => Err(DhtError::Destroyed),
        }
    }
}

async fn destroyed(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl DhtAdapter for MainlineDht {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn announce(&self, hashed_key: &str, port: u16) -> Result<(), DhtError> {
        let dht = self.handle()?;
        let target = Id::from(target_id(hashed_key));
        self.until_destroyed(async move {
            dht.announce_peer(target, Some(port))
                .await
                .map_err(|e| DhtError::Query(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn lookup(&self, hashed_key: &str) -> Result<(), DhtError> {
        let dht = self.handle()?;
        let observer = self.observer.clone();
        let query_timeout = self.query_timeout;

        self.until_destroyed(async move {
            let mut stream = dht.get_peers(Id::from(target_id(hashed_key)));
            let mut found = 0usize;

            let drain = tokio::time::timeout(query_timeout, async {
                while let Some(peers) = stream.next().await {
                    for peer in peers {
                        found += 1;
                        observer.on_event(DhtEvent::Peer {
                            peer: SocketAddr::V4(peer),
                            hashed_key: hashed_key.to_string(),
                            via: None,
                        });
                    }
                }
            });

            if drain.await.is_err() {
                tracing::debug!(hashed_key, found, "get_peers timed out");
            }
            Ok(())
        })
        .await
    }

    async fn get(&self, item_id: &str) -> Result<Option<StoredValue>, DhtError> {
        let id = keys::parse_item_id(item_id).map_err(|e| DhtError::InvalidHash(e.to_string()))?;
        let dht = self.handle()?;

        self.until_destroyed(async move {
            Ok(dht.get_immutable(Id::from(id)).await.map(|raw| StoredValue {
                id: hex::encode(id),
                v: keys::decode_value(&raw),
            }))
        })
        .await
    }

    async fn put(&self, value: &[u8]) -> Result<String, DhtError> {
        let dht = self.handle()?;
        self.until_destroyed(async move {
            let id = dht
                .put_immutable(value)
                .await
                .map_err(|e| DhtError::Query(e.to_string()))?;
            let bytes: &[u8; ITEM_ID_LEN] = id.as_bytes();
            Ok(hex::encode(bytes))
        })
        .await
    }

    async fn destroy(&self) {
        self.closed.send_replace(true);

        let ready = self.ready.lock().ok().and_then(|mut guard| guard.take());
        if let Some(task) = ready {
            task.abort();
            // Cancelled or finished; either way its handle is gone.
            let _ = task.await;
        }

        let taken = match self.dht.write() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if taken.is_some() {
            tracing::debug!(addr = %self.local_addr, "mainline dht shut down");
        }
    }
}
