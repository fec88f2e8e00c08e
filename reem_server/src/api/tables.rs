//! Table discovery and state-validation endpoints.

use super::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use reem::table::{StateVerdict, TableMessage};
use serde::Deserialize;
use tokio::sync::oneshot;

/// `GET /tables` — lobby listing of every live table.
pub async fn list_tables(State(state): State<AppState>) -> Response {
    let tables = state.tables.summaries().await;
    Json(tables).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ValidateStateRequest {
    pub state_hash: String,
}

/// `POST /tables/{table_id}/validate-state` — compare a client hash with
/// the authoritative one and return the reconciliation verdict.
pub async fn validate_state(
    Path(table_id): Path<i64>,
    State(state): State<AppState>,
    Json(request): Json<ValidateStateRequest>,
) -> Response {
    let Some(handle) = state.tables.get(table_id).await else {
        return (StatusCode::NOT_FOUND, "table not found").into_response();
    };

    let (tx, rx) = oneshot::channel();
    if handle
        .send(TableMessage::VerifyState {
            client_hash: request.state_hash,
            reply: tx,
        })
        .await
        .is_err()
    {
        return (StatusCode::SERVICE_UNAVAILABLE, "table closed").into_response();
    }

    match rx.await {
        Ok(verdict) => Json::<StateVerdict>(verdict).into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "table closed").into_response(),
    }
}
