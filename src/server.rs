// Axum application: the `/ws` upgrade and the health endpoints consumed by
// orchestration/monitoring.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::connection_manager::ConnectionManager;

#[derive(Clone)]
struct AppState {
    connections: Arc<ConnectionManager>,
}

pub fn build_router(connections: Arc<ConnectionManager>) -> Router {
    let state = AppState { connections };
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/v1/health", get(health))
        .route("/api/v1/health/db", get(health_db))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        state.connections.run_connection(socket).await;
    })
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "application": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": crate::protocol::now_timestamp(),
        "message": "gateway is accepting connections",
    }))
}

/// Database health is out of this gateway's core scope; the endpoint exists
/// for parity with the external contract and always reports healthy since
/// this gateway has no database of its own.
async fn health_db() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": crate::protocol::now_timestamp(),
    }))
}
