//! HTTP/WebSocket API for the game server.
//!
//! - `GET /ws?token=&userId=` — the bidirectional session
//! - `GET /tables` — lobby listing
//! - `POST /tables/{table_id}/validate-state` — reconciliation verdict
//! - `GET /healthz` — health check

pub mod rate_limiter;
pub mod tables;
pub mod websocket;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use reem::{
    auth::AuthVerifier,
    ledger::UserId,
    matchmaker::MatchTrigger,
    queue::QueueManager,
    table::TableManager,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

/// A live connection for one user; newer connections for the same user
/// force-disconnect the older one.
pub struct SessionEntry {
    pub connection_id: Uuid,
    pub shutdown: mpsc::Sender<()>,
}

/// Application state shared across handlers and WebSocket connections.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthVerifier,
    pub tables: Arc<TableManager>,
    pub queues: Arc<QueueManager>,
    pub match_tx: mpsc::Sender<MatchTrigger>,
    pub sessions: Arc<RwLock<HashMap<UserId, SessionEntry>>>,
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
}

pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/tables", get(tables::list_tables))
        .route(
            "/tables/{table_id}/validate-state",
            post(tables::validate_state),
        )
        // The WebSocket route does its own auth via query parameters.
        .route("/ws", get(websocket::websocket_handler))
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health_check() -> &'static str {
    "OK"
}
