//! Beacon integration test harness.
//!
//! Nodes run in-process over a shared `LocalNetwork` overlay and expose real
//! WebSocket and HTTP listeners on OS-assigned loopback ports. Each test
//! builds its own overlay, so DHT ports never collide between tests.
//!
//!   cargo test --test integration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use beacon_core::BeaconConfig;
use beacon_services::dht::LocalNetwork;
use beacond::Node;

mod announce_lookup;
mod lifecycle;
mod transports;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Window long enough that no test straddles more than one rotation.
pub const LONG_WINDOW_MS: u64 = 60_000;

/// How long a client waits for one reply.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn node_config(dht_port: u16, bootstrap: &[u16], timeslot: u64) -> BeaconConfig {
    BeaconConfig {
        host: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        dht_port,
        dht_bootstrap: bootstrap.iter().map(|p| format!("127.0.0.1:{p}")).collect(),
        api_port: 0,
        api_port_http: Some(0),
        timeslot,
        ..BeaconConfig::default()
    }
}

/// Start a node on `net` with the given DHT port, joined through `bootstrap`.
pub async fn spawn_node(
    net: &LocalNetwork,
    dht_port: u16,
    bootstrap: &[u16],
    timeslot: u64,
) -> Result<Node> {
    let node = Node::new(
        node_config(dht_port, bootstrap, timeslot),
        Arc::new(net.clone()),
    );
    node.start().await.context("node failed to start")?;
    Ok(node)
}

pub async fn ws_addr(node: &Node) -> Result<SocketAddr> {
    node.ws_addr().await.context("node has no ws transport")
}

pub async fn http_addr(node: &Node) -> Result<SocketAddr> {
    node.http_addr().await.context("node has no http transport")
}

/// Minimal RPC client for the WebSocket transport.
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_rid: u64,
}

impl WsClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let (stream, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
            .await
            .with_context(|| format!("failed to connect to ws://{addr}/"))?;
        Ok(Self {
            stream,
            next_rid: 1,
        })
    }

    /// Send a raw text frame.
    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Next reply frame as `(rid, errorOrResult)`.
    pub async fn next_reply(&mut self) -> Result<(Value, Value)> {
        tokio::time::timeout(REPLY_TIMEOUT, self.read_frame())
            .await
            .context("timed out waiting for reply")?
    }

    /// Wait for the reply frame carrying `rid`, discarding others.
    pub async fn reply_for(&mut self, rid: &Value) -> Result<Value> {
        loop {
            let (got, body) = self.next_reply().await?;
            if &got == rid {
                return Ok(body);
            }
        }
    }

    async fn read_frame(&mut self) -> Result<(Value, Value)> {
        while let Some(msg) = self.stream.next().await {
            let Message::Text(text) = msg? else {
                continue;
            };
            let frame: Value = serde_json::from_str(text.as_str())?;
            match frame.as_array().map(Vec::as_slice) {
                Some([rid, body]) => return Ok((rid.clone(), body.clone())),
                _ => bail!("unexpected reply frame: {frame}"),
            }
        }
        bail!("connection closed before reply")
    }

    /// Send `[rid, op, payload]` and wait for its reply.
    pub async fn request(&mut self, op: &str, payload: Value) -> Result<Value> {
        let rid = json!(format!("r{}", self.next_rid));
        self.next_rid += 1;
        self.send_raw(&json!([rid, op, payload]).to_string()).await?;
        self.reply_for(&rid).await
    }
}

/// `POST /{op}` with `{rid, data}`. Returns the decoded body.
pub async fn http_request(addr: SocketAddr, op: &str, payload: Value) -> Result<Value> {
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/{op}"))
        .json(&json!({ "rid": "h1", "data": payload }))
        .send()
        .await?;
    if !resp.status().is_success() {
        bail!("http {op} returned {}", resp.status());
    }
    Ok(resp.json().await?)
}
