//! WebSocket handler: one bidirectional session per authenticated client.
//!
//! # Connection flow
//!
//! 1. Client connects via `GET /ws?token=<jwt>&userId=<id>`.
//! 2. The token signature is verified and its subject must equal the
//!    claimed user id; otherwise the connection is closed.
//! 3. A newer connection for the same user force-disconnects the older one.
//! 4. Frames are JSON `{event, payload}` objects; every message addresses
//!    a table (or a stake queue), and the session routes it to the right
//!    actor.
//!
//! Outbound traffic merges three streams: per-table events the session is
//! subscribed to, lobby-wide `tables_update` broadcasts, and the ping
//! heartbeat.

use super::{rate_limiter::RateLimiter, AppState, SessionEntry};
use crate::metrics;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use reem::{
    auth::AccessClaims,
    ledger::UserId,
    matchmaker::{MatchTrigger, SeatOutcome},
    net::{self, ClientEvent, ServerEvent},
    table::{TableMessage, TableResponse},
};
use serde::Deserialize;
use std::collections::HashSet;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, Instant, MissedTickBehavior};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: String,
    #[serde(rename = "userId")]
    user_id: UserId,
}

/// Upgrade to a WebSocket session after verifying the handshake token.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    // Authentication failures close the connection without detail.
    let claims = match state.auth.verify(&query.token, query.user_id) {
        Ok(claims) => claims,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, claims, state))
}

async fn handle_socket(socket: WebSocket, claims: AccessClaims, state: AppState) {
    let connection_id = Uuid::new_v4();
    let user_id = claims.sub;
    let username = claims.username.clone();

    // Duplicate concurrent connections: the newest wins.
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    {
        let mut sessions = state.sessions.write().await;
        if let Some(old) = sessions.insert(
            user_id,
            SessionEntry {
                connection_id,
                shutdown: shutdown_tx,
            },
        ) {
            tracing::info!(
                user_id,
                "newer connection {connection_id} replaces {}",
                old.connection_id
            );
            let _ = old.shutdown.try_send(());
        }
    }
    metrics::websocket_connections_total();
    tracing::info!(user_id, %connection_id, "websocket connected as {username}");

    let (mut sink, mut stream) = socket.split();
    let (events_tx, mut events_rx) = mpsc::channel::<ServerEvent>(64);
    let mut lobby_rx = state.tables.lobby_subscribe();

    let mut burst = RateLimiter::burst();
    let mut sustained = RateLimiter::sustained();
    let mut joined_tables: HashSet<i64> = HashSet::new();

    let mut ping = interval(state.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_pong = Instant::now();
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = Instant::now();
                        metrics::websocket_messages_received();

                        if !burst.check() || !sustained.check() {
                            tracing::warn!(user_id, "rate limit exceeded");
                            let event = ServerEvent::Error {
                                message: "rate limit exceeded; slow down".to_string(),
                            };
                            if send_json(&mut sink, &event).await.is_err() {
                                break;
                            }
                            continue;
                        }

                        match net::parse_client_frame(&text) {
                            Ok(ClientEvent::Pong) => {
                                last_pong = Instant::now();
                            }
                            Ok(event) => {
                                let reply = handle_client_event(
                                    event,
                                    &state,
                                    user_id,
                                    &username,
                                    connection_id,
                                    &events_tx,
                                    &mut joined_tables,
                                )
                                .await;
                                if let Some(reply) = reply {
                                    if send_json(&mut sink, &reply).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                let event = ServerEvent::Error {
                                    message: format!("invalid frame: {e}"),
                                };
                                if send_json(&mut sink, &event).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(user_id, "websocket error: {e}");
                        break;
                    }
                }
            }

            Some(event) = events_rx.recv() => {
                if send_json(&mut sink, &event).await.is_err() {
                    break;
                }
            }

            lobby = lobby_rx.recv() => {
                match lobby {
                    Ok(event) => {
                        if send_json(&mut sink, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(user_id, "lobby stream lagged by {skipped}");
                    }
                    Err(broadcast::error::RecvError::Closed) => {}
                }
            }

            _ = ping.tick() => {
                if last_pong.elapsed() > state.ping_interval * 2 {
                    tracing::info!(user_id, "missed pongs; closing connection");
                    break;
                }
                if last_activity.elapsed() > state.idle_timeout {
                    tracing::info!(user_id, "idle timeout; closing connection");
                    break;
                }
                if send_json(&mut sink, &ServerEvent::Ping).await.is_err() {
                    break;
                }
            }

            _ = shutdown_rx.recv() => {
                tracing::info!(user_id, "force-disconnected by a newer connection");
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    // Route the drop through each table's disconnect path, which owns the
    // grace periods and seat cleanup.
    for table_id in &joined_tables {
        if let Some(handle) = state.tables.get(*table_id).await {
            let _ = handle
                .send(TableMessage::Unsubscribe { connection_id })
                .await;
            let _ = handle
                .send(TableMessage::ConnectionClosed { connection_id })
                .await;
        }
    }
    for stake in state.queues.stakes() {
        if state.queues.remove(stake, &username).await.is_ok() {
            let _ = state.match_tx.try_send(MatchTrigger::QueueChanged(stake));
        }
    }
    {
        let mut sessions = state.sessions.write().await;
        if sessions.get(&user_id).map(|e| e.connection_id) == Some(connection_id) {
            sessions.remove(&user_id);
        }
    }
    tracing::info!(user_id, %connection_id, "websocket disconnected");
}

async fn send_json(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!("event serialise failed: {e}");
            return Ok(());
        }
    };
    metrics::websocket_messages_sent();
    sink.send(Message::Text(json.into())).await
}

/// Route one client event. Returns an event to send straight back to the
/// sender, if the routing produced one; game traffic flows back through
/// the table subscription instead.
async fn handle_client_event(
    event: ClientEvent,
    state: &AppState,
    user_id: UserId,
    username: &str,
    connection_id: Uuid,
    events_tx: &mpsc::Sender<ServerEvent>,
    joined_tables: &mut HashSet<i64>,
) -> Option<ServerEvent> {
    match event {
        ClientEvent::JoinQueue { stake, priority } => {
            let priority = priority.unwrap_or_default();
            match state
                .queues
                .enqueue(stake, user_id, username, connection_id, priority)
                .await
            {
                Ok(position) => {
                    metrics::queue_joins_total(stake);
                    let eta = state
                        .queues
                        .estimated_wait(stake, position)
                        .await
                        .map(|d| d.as_secs())
                        .unwrap_or_default();
                    let _ = state.match_tx.try_send(MatchTrigger::QueueChanged(stake));
                    Some(ServerEvent::QueueStatus {
                        stake,
                        position,
                        estimated_wait_secs: eta,
                    })
                }
                Err(e) => Some(ServerEvent::Error {
                    message: e.to_string(),
                }),
            }
        }

        ClientEvent::LeaveQueue { stake } => match state.queues.remove(stake, username).await {
            Ok(_) => {
                let _ = state.match_tx.try_send(MatchTrigger::QueueChanged(stake));
                Some(ServerEvent::QueueStatus {
                    stake,
                    position: 0,
                    estimated_wait_secs: 0,
                })
            }
            Err(e) => Some(ServerEvent::Error {
                message: e.to_string(),
            }),
        },

        ClientEvent::JoinTable { table_id } => {
            let Some(handle) = state.tables.get(table_id).await else {
                return Some(unknown_table(table_id));
            };
            let _ = handle
                .send(TableMessage::Subscribe {
                    connection_id,
                    sender: events_tx.clone(),
                })
                .await;

            let (tx, rx) = oneshot::channel();
            let send = handle
                .send(TableMessage::Join {
                    user_id,
                    username: username.to_string(),
                    connection_id,
                    reply: tx,
                })
                .await;
            if send.is_err() {
                return Some(unknown_table(table_id));
            }

            match rx.await {
                Ok(Ok(SeatOutcome::Seated)) => {
                    joined_tables.insert(table_id);
                    let _ = handle
                        .send(TableMessage::RequestStateSync { connection_id })
                        .await;
                    None
                }
                Ok(Ok(SeatOutcome::TransitionInitiated { .. }))
                | Ok(Ok(SeatOutcome::WillJoinNextHand)) => {
                    joined_tables.insert(table_id);
                    None
                }
                Ok(Ok(SeatOutcome::TableFull)) => {
                    let _ = handle
                        .send(TableMessage::Unsubscribe { connection_id })
                        .await;
                    Some(ServerEvent::Error {
                        message: "table is full".to_string(),
                    })
                }
                Ok(Err(message)) => Some(ServerEvent::Error { message }),
                Err(_) => Some(unknown_table(table_id)),
            }
        }

        ClientEvent::JoinSpectator { table_id } => {
            let Some(handle) = state.tables.get(table_id).await else {
                return Some(unknown_table(table_id));
            };
            let _ = handle
                .send(TableMessage::Subscribe {
                    connection_id,
                    sender: events_tx.clone(),
                })
                .await;

            let (tx, rx) = oneshot::channel();
            let _ = handle
                .send(TableMessage::JoinSpectator {
                    user_id,
                    username: username.to_string(),
                    connection_id,
                    reply: tx,
                })
                .await;
            match rx.await {
                Ok(TableResponse::Success) => {
                    joined_tables.insert(table_id);
                    None
                }
                Ok(other) => {
                    let _ = handle
                        .send(TableMessage::Unsubscribe { connection_id })
                        .await;
                    other.error_message().map(|message| ServerEvent::Error { message })
                }
                Err(_) => Some(unknown_table(table_id)),
            }
        }

        ClientEvent::PlayerReady { table_id } => {
            let Some(handle) = state.tables.get(table_id).await else {
                return Some(unknown_table(table_id));
            };
            let (tx, rx) = oneshot::channel();
            let _ = handle
                .send(TableMessage::Ready {
                    username: username.to_string(),
                    reply: tx,
                })
                .await;
            match rx.await {
                Ok(TableResponse::Success) => None,
                Ok(other) => other.error_message().map(|message| ServerEvent::Error { message }),
                Err(_) => Some(unknown_table(table_id)),
            }
        }

        ClientEvent::GameAction {
            table_id,
            action,
            state_hash,
        } => {
            let Some(handle) = state.tables.get(table_id).await else {
                return Some(unknown_table(table_id));
            };
            let _ = handle
                .send(TableMessage::GameAction {
                    connection_id,
                    username: username.to_string(),
                    action,
                    client_hash: state_hash,
                })
                .await;
            None
        }

        ClientEvent::LeaveTable { table_id } => {
            let Some(handle) = state.tables.get(table_id).await else {
                return Some(unknown_table(table_id));
            };
            let (tx, rx) = oneshot::channel();
            let _ = handle
                .send(TableMessage::Leave {
                    username: username.to_string(),
                    reply: tx,
                })
                .await;
            let _ = handle
                .send(TableMessage::Unsubscribe { connection_id })
                .await;
            joined_tables.remove(&table_id);
            match rx.await {
                Ok(TableResponse::Success) | Err(_) => None,
                Ok(other) => other.error_message().map(|message| ServerEvent::Error { message }),
            }
        }

        ClientEvent::RequestStateSync { table_id } => {
            let Some(handle) = state.tables.get(table_id).await else {
                return Some(unknown_table(table_id));
            };
            let _ = handle
                .send(TableMessage::RequestStateSync { connection_id })
                .await;
            None
        }

        ClientEvent::VerifyState {
            table_id,
            state_hash,
        } => {
            let Some(handle) = state.tables.get(table_id).await else {
                return Some(unknown_table(table_id));
            };
            let (tx, rx) = oneshot::channel();
            let _ = handle
                .send(TableMessage::VerifyState {
                    client_hash: state_hash,
                    reply: tx,
                })
                .await;
            if let Ok(verdict) = rx.await {
                if !verdict.synced {
                    // The client is behind; push the authoritative state.
                    let _ = handle
                        .send(TableMessage::RequestStateSync { connection_id })
                        .await;
                }
            }
            None
        }

        ClientEvent::ReconnectPlayer { table_id } => {
            let Some(handle) = state.tables.get(table_id).await else {
                return Some(unknown_table(table_id));
            };
            let _ = handle
                .send(TableMessage::Subscribe {
                    connection_id,
                    sender: events_tx.clone(),
                })
                .await;
            let (tx, rx) = oneshot::channel();
            let _ = handle
                .send(TableMessage::Reconnect {
                    username: username.to_string(),
                    connection_id,
                    reply: tx,
                })
                .await;
            match rx.await {
                Ok(TableResponse::Success) => {
                    joined_tables.insert(table_id);
                    metrics::reconnects_total();
                    None
                }
                Ok(other) => other.error_message().map(|message| ServerEvent::Error { message }),
                Err(_) => Some(unknown_table(table_id)),
            }
        }

        // Handled inline in the socket loop.
        ClientEvent::Pong => None,
    }
}

fn unknown_table(table_id: i64) -> ServerEvent {
    ServerEvent::Error {
        message: format!("unknown table {table_id}"),
    }
}
