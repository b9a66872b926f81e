//! Node lifecycle.
//!
//! `Stopped → Starting → Active → Stopping → Stopped`. Start brings up the
//! DHT first, then the WebSocket transport, then HTTP. Stop closes both
//! transports before the DHT is destroyed.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex};

use beacon_api::{TransportError, TransportHandle};
use beacon_core::{BeaconConfig, Timeslot};
use beacon_services::{
    DhtAdapter, DhtBackend, DhtError, DhtEvent, Discovery, Dispatcher, EventRouter,
    ListenOptions, PeerCache,
};

/// Buffered DHT events per subscriber before the slowest one lags.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Stopped,
    Starting,
    Active,
    Stopping,
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("dht failed to start: {0}")]
    Bootstrap(#[from] DhtError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Everything that exists only while the node is active.
struct Running {
    dht: Arc<dyn DhtAdapter>,
    engine: Arc<Discovery>,
    ws: TransportHandle,
    http: Option<TransportHandle>,
}

pub struct Node {
    config: BeaconConfig,
    backend: Arc<dyn DhtBackend>,
    events: broadcast::Sender<DhtEvent>,
    state: watch::Sender<NodeState>,
    running: Mutex<Option<Running>>,
}

impl Node {
    pub fn new(config: BeaconConfig, backend: Arc<dyn DhtBackend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(NodeState::Stopped);
        Self {
            config,
            backend,
            events,
            state,
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BeaconConfig {
        &self.config
    }

    pub fn state(&self) -> NodeState {
        *self.state.borrow()
    }

    /// Follow state transitions.
    pub fn watch_state(&self) -> watch::Receiver<NodeState> {
        self.state.subscribe()
    }

    /// DHT events. The stream outlives restarts.
    pub fn subscribe(&self) -> broadcast::Receiver<DhtEvent> {
        self.events.subscribe()
    }

    pub async fn discovery(&self) -> Option<Arc<Discovery>> {
        self.running.lock().await.as_ref().map(|r| r.engine.clone())
    }

    pub async fn dht_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.dht.local_addr())
    }

    pub async fn ws_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.ws.local_addr())
    }

    pub async fn http_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .await
            .as_ref()
            .and_then(|r| r.http.as_ref().map(TransportHandle::local_addr))
    }

    fn bind_ip(&self) -> IpAddr {
        self.config.host.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    /// Bring the node up. A no-op when already active.
    pub async fn start(&self) -> Result<(), NodeError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        self.state.send_replace(NodeState::Starting);
        match self.open().await {
            Ok(parts) => {
                tracing::info!(
                    dht = %parts.dht.local_addr(),
                    ws = %parts.ws.local_addr(),
                    http = ?parts.http.as_ref().map(TransportHandle::local_addr),
                    "node active"
                );
                *running = Some(parts);
                self.state.send_replace(NodeState::Active);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "node failed to start");
                self.state.send_replace(NodeState::Stopped);
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<Running, NodeError> {
        let cache = PeerCache::new();
        let router = Arc::new(EventRouter::new(cache.clone(), self.events.clone()));
        let opts = ListenOptions {
            port: self.config.dht_port,
            bind: self.config.host,
            bootstrap: self.config.dht_bootstrap.clone(),
            max_tables: self.config.dht_max_tables,
        };
        let dht = self.backend.listen(opts, router).await?;

        let engine = Arc::new(Discovery::new(
            dht.clone(),
            cache,
            Timeslot::new(self.config.timeslot),
        ));
        let dispatcher = Arc::new(Dispatcher::new(engine.clone()));

        let ws_addr = SocketAddr::new(self.bind_ip(), self.config.api_port);
        let ws = match beacon_api::bind_ws(ws_addr, dispatcher.clone()).await {
            Ok(ws) => ws,
            Err(e) => {
                dht.destroy().await;
                return Err(e.into());
            }
        };

        let http = match self.config.api_port_http {
            None => None,
            Some(port) => {
                let addr = SocketAddr::new(self.bind_ip(), port);
                match beacon_api::bind_http(addr, dispatcher).await {
                    Ok(http) => Some(http),
                    Err(e) => {
                        if let Err(close) = ws.close().await {
                            tracing::warn!(error = %close, "failed to close ws transport");
                        }
                        dht.destroy().await;
                        return Err(e.into());
                    }
                }
            }
        };

        Ok(Running {
            dht,
            engine,
            ws,
            http,
        })
    }

    /// Tear the node down. Every step runs; the first failure is returned.
    pub async fn stop(&self) -> Result<(), NodeError> {
        let mut running = self.running.lock().await;
        let Some(parts) = running.take() else {
            self.state.send_replace(NodeState::Stopped);
            return Ok(());
        };

        self.state.send_replace(NodeState::Stopping);
        let mut first: Option<NodeError> = None;

        if let Err(e) = parts.ws.close().await {
            tracing::warn!(error = %e, "failed to close ws transport");
            first.get_or_insert(e.into());
        }
        if let Some(http) = parts.http {
            if let Err(e) = http.close().await {
                tracing::warn!(error = %e, "failed to close http transport");
                first.get_or_insert(e.into());
            }
        }
        parts.dht.destroy().await;

        self.state.send_replace(NodeState::Stopped);
        tracing::info!("node stopped");
        first.map_or(Ok(()), Err)
    }
}
