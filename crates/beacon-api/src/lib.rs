//! beacon-api — the client-facing RPC transports.
//!
//! Both transports decode requests into [`PendingRequest`]s, hand them to
//! the shared [`Dispatcher`] and encode the reply. The WebSocket transport
//! is always on; the HTTP one only when a port is configured.
//!
//! [`PendingRequest`]: beacon_core::wire::PendingRequest

pub mod http;
pub mod ws;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use beacon_services::Dispatcher;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{transport} failed to bind {addr}: {source}")]
    Bind {
        transport: &'static str,
        addr: SocketAddr,
        source: io::Error,
    },
    #[error("{transport} server failed: {source}")]
    Serve {
        transport: &'static str,
        source: io::Error,
    },
    #[error("{0} server task panicked")]
    Panicked(&'static str),
}

/// Handed to connections that outlive their HTTP request (upgraded
/// WebSockets). Holding one keeps [`TransportHandle::close`] waiting.
#[derive(Clone)]
pub struct ConnectionGuard {
    closing: watch::Receiver<bool>,
    _alive: mpsc::Sender<()>,
}

impl ConnectionGuard {
    /// Resolves once the transport starts closing.
    pub async fn closing(&mut self) {
        until_closing(&mut self.closing).await
    }
}

/// Returns once the flag is set or its sender is gone.
async fn until_closing(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// A bound, serving transport.
pub struct TransportHandle {
    name: &'static str,
    local_addr: SocketAddr,
    closing: watch::Sender<bool>,
    drained: mpsc::Receiver<()>,
    task: JoinHandle<io::Result<()>>,
}

impl TransportHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Address actually bound. Differs from the configured one for port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, close live connections, wait for all of them.
    pub async fn close(mut self) -> Result<(), TransportError> {
        self.closing.send_replace(true);
        let result = match (&mut self.task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(TransportError::Serve {
                transport: self.name,
                source,
            }),
            Err(_) => Err(TransportError::Panicked(self.name)),
        };
        // The router's guard is gone with the server task; what remains
        // belongs to open connections.
        let _ = self.drained.recv().await;
        tracing::info!(transport = self.name, addr = %self.local_addr, "transport closed");
        result
    }
}

/// Bind `addr` now, serve the router built by `app` on a background task.
async fn serve(
    name: &'static str,
    addr: SocketAddr,
    app: impl FnOnce(ConnectionGuard) -> Router,
) -> Result<TransportHandle, TransportError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| TransportError::Bind {
            transport: name,
            addr,
            source,
        })?;
    let local_addr = listener.local_addr().map_err(|source| TransportError::Bind {
        transport: name,
        addr,
        source,
    })?;

    let (closing, closing_rx) = watch::channel(false);
    let (alive, drained) = mpsc::channel::<()>(1);
    let app = app(ConnectionGuard {
        closing: closing_rx.clone(),
        _alive: alive,
    });

    let mut shutdown = closing_rx;
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                until_closing(&mut shutdown).await;
            })
            .await
    });

    tracing::info!(transport = name, addr = %local_addr, "transport listening");
    Ok(TransportHandle {
        name,
        local_addr,
        closing,
        drained,
        task,
    })
}

/// Start the WebSocket transport on `addr`.
pub async fn bind_ws(
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
) -> Result<TransportHandle, TransportError> {
    serve("ws", addr, |guard| ws::router(dispatcher, guard)).await
}

/// Start the HTTP transport on `addr`.
pub async fn bind_http(
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
) -> Result<TransportHandle, TransportError> {
    serve("http", addr, |_| http::router(dispatcher)).await
}
