//! WebSocket transport. Frames in: `[rid, op, payload]`. Frames out: `[rid, errorOrResult]`.
//!
//! Requests on one connection are dispatched concurrently, so replies may
//! arrive out of order; callers correlate by `rid`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use beacon_core::wire::{self, PendingRequest};
use beacon_services::Dispatcher;

use crate::ConnectionGuard;

/// Outbound frames buffered per connection.
const OUTBOUND_QUEUE: usize = 256;

#[derive(Clone)]
struct WsState {
    dispatcher: Arc<Dispatcher>,
    guard: ConnectionGuard,
}

pub fn router(dispatcher: Arc<Dispatcher>, guard: ConnectionGuard) -> Router {
    Router::new()
        .route("/", get(handle_upgrade))
        .with_state(WsState { dispatcher, guard })
}

async fn handle_upgrade(ws: WebSocketUpgrade, State(state): State<WsState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.dispatcher, state.guard))
}

async fn handle_socket(socket: WebSocket, dispatcher: Arc<Dispatcher>, mut guard: ConnectionGuard) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    loop {
        let msg = tokio::select! {
            msg = stream.next() => msg,
            _ = guard.closing() => {
                tracing::debug!("closing websocket connection");
                let _ = tx.send(Message::Close(None)).await;
                break;
            }
        };

        let text = match msg {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!(error = %e, "websocket receive failed");
                break;
            }
        };

        let req = match PendingRequest::from_ws_frame(text.as_str()) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed frame");
                continue;
            }
        };

        let dispatcher = dispatcher.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let rid = req.rid.clone();
            let reply = dispatcher.handle(req).await;
            // Receiver gone means the connection closed; the reply has nowhere to go.
            let _ = tx.send(Message::Text(wire::ws_reply_frame(&rid, &reply).into())).await;
        });
    }

    drop(tx);
    let _ = writer.await;
}
