//! Wire protocol: JSON frames of the form `{"event": ..., "payload": ...}`.

use serde::{Deserialize, Serialize};

use crate::game::{Action, HandOutcome, HandStateView};
use crate::ledger::TableId;
use crate::queue::Priority;

/// A message from a client session.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinQueue {
        stake: i64,
        #[serde(default)]
        priority: Option<Priority>,
    },
    LeaveQueue {
        stake: i64,
    },
    JoinTable {
        table_id: TableId,
    },
    JoinSpectator {
        table_id: TableId,
    },
    PlayerReady {
        table_id: TableId,
    },
    GameAction {
        table_id: TableId,
        action: Action,
        /// The client's latest state hash, for desync detection.
        #[serde(default)]
        state_hash: Option<String>,
    },
    LeaveTable {
        table_id: TableId,
    },
    RequestStateSync {
        table_id: TableId,
    },
    VerifyState {
        table_id: TableId,
        state_hash: String,
    },
    ReconnectPlayer {
        table_id: TableId,
    },
    Pong,
}

/// A message to a client session. Broadcasts to a table reach every socket
/// in that table's room, spectators included.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    TablesUpdate {
        tables: Vec<TableSummary>,
    },
    QueueStatus {
        stake: i64,
        position: usize,
        estimated_wait_secs: u64,
    },
    StateSync {
        table_id: TableId,
        phase: String,
        view: Option<HandStateView>,
    },
    GameUpdate {
        table_id: TableId,
        view: HandStateView,
    },
    GameOver {
        table_id: TableId,
        outcome: HandOutcome,
        view: HandStateView,
    },
    TurnStart {
        table_id: TableId,
        seat: usize,
        username: String,
    },
    PlayerJoined {
        table_id: TableId,
        username: String,
    },
    PlayerLeft {
        table_id: TableId,
        username: String,
    },
    PlayerReconnected {
        table_id: TableId,
        username: String,
    },
    SpectatorModeActive {
        table_id: TableId,
        view: Option<HandStateView>,
    },
    TransitionInitiated {
        table_id: TableId,
        transition_id: uuid::Uuid,
    },
    TransitionCompleted {
        table_id: TableId,
        transition_id: uuid::Uuid,
        username: String,
        seat: usize,
    },
    StateReconciled {
        table_id: TableId,
        view: HandStateView,
    },
    Error {
        message: String,
    },
    TurnValidationError {
        message: String,
    },
    Ping,
}

/// A table as listed to lobby clients.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TableSummary {
    pub table_id: TableId,
    pub stake: i64,
    pub seats: Vec<String>,
    pub spectator_count: usize,
    pub phase: String,
    pub dynamic: bool,
}
