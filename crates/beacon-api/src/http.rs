//! HTTP transport: `POST /{op}` with body `{rid, data}`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{StatusCode, Uri};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};

use beacon_core::wire::{self, PendingRequest};
use beacon_core::RegistryError;
use beacon_services::Dispatcher;

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/{op}", post(handle_request))
        .fallback(not_found)
        .with_state(dispatcher)
        .layer(cors)
}

async fn handle_request(
    State(dispatcher): State<Arc<Dispatcher>>,
    Path(op): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, String)> {
    let req = PendingRequest::from_http(&op, &body).map_err(|e| {
        tracing::debug!(op = %op, error = %e, "rejecting http request");
        (StatusCode::BAD_REQUEST, e.to_string())
    })?;

    let reply = dispatcher.handle(req).await;
    Ok(Json(wire::reply_body(&reply)))
}

/// Paths that don't name a single operation.
async fn not_found(uri: Uri) -> Json<Value> {
    let err = RegistryError::OperationNotFound(uri.path().to_string());
    tracing::debug!(path = %uri.path(), "no operation at path");
    Json(Value::String(err.code().to_string()))
}
