//! Table actor message types and session-level records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::game::Action;
use crate::ledger::{TableId, UserId};
use crate::matchmaker::{SeatOutcome, TableRoster};
use crate::net::{ServerEvent, TableSummary};
use crate::queue::QueuedPlayer;

/// The per-table state machine.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TablePhase {
    Empty,
    Waiting,
    Countdown,
    InHand,
    Settling,
}

impl fmt::Display for TablePhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Empty => "empty",
            Self::Waiting => "waiting",
            Self::Countdown => "countdown",
            Self::InHand => "in_hand",
            Self::Settling => "settling",
        };
        write!(f, "{repr}")
    }
}

/// A watcher of the table, possibly promised a seat.
#[derive(Clone, Debug)]
pub struct Spectator {
    pub user_id: UserId,
    pub username: String,
    pub connection_id: Uuid,
    pub joined_at: DateTime<Utc>,
    /// Set when this spectator replaces a bot at hand end.
    pub transition_id: Option<Uuid>,
    /// Set when this spectator takes any free seat at the next hand.
    pub will_join_next_hand: bool,
}

/// A queued human replacing a bot at the next hand boundary.
#[derive(Clone, Debug)]
pub struct Transition {
    pub transition_id: Uuid,
    pub table_id: TableId,
    /// Seat index held by the earmarked bot when the transition began.
    pub pending_seat: usize,
    /// The earmarked bot, looked up by name at resolution since the roster
    /// can shift while the hand runs.
    pub bot_username: String,
    pub username: String,
    pub started_at: DateTime<Utc>,
}

/// Messages handled by a [`super::TableActor`].
#[derive(Debug)]
pub enum TableMessage {
    /// A client joins the table directly (`join_table`).
    Join {
        user_id: UserId,
        username: String,
        connection_id: Uuid,
        reply: oneshot::Sender<Result<SeatOutcome, String>>,
    },

    /// A client joins as a spectator only (`join_spectator`).
    JoinSpectator {
        user_id: UserId,
        username: String,
        connection_id: Uuid,
        reply: oneshot::Sender<TableResponse>,
    },

    /// A seated player signals readiness for the next hand.
    Ready {
        username: String,
        reply: oneshot::Sender<TableResponse>,
    },

    /// A game action from a client. Errors are pushed to the sender's
    /// subscription rather than returned.
    GameAction {
        connection_id: Uuid,
        username: String,
        action: Action,
        client_hash: Option<String>,
    },

    /// Voluntary leave.
    Leave {
        username: String,
        reply: oneshot::Sender<TableResponse>,
    },

    /// A client reconnecting within the grace window.
    Reconnect {
        username: String,
        connection_id: Uuid,
        reply: oneshot::Sender<TableResponse>,
    },

    /// The transport saw this connection drop.
    ConnectionClosed { connection_id: Uuid },

    /// Client asks for a full authoritative sync (throttled).
    RequestStateSync { connection_id: Uuid },

    /// Client submits its hash for a reconciliation verdict.
    VerifyState {
        client_hash: String,
        reply: oneshot::Sender<StateVerdict>,
    },

    /// Register an event sink for this connection (room membership).
    Subscribe {
        connection_id: Uuid,
        sender: mpsc::Sender<ServerEvent>,
    },

    Unsubscribe { connection_id: Uuid },

    // Matchmaker surface.
    GetRoster {
        reply: oneshot::Sender<TableRoster>,
    },
    SeatFromQueue {
        player: QueuedPlayer,
        reply: oneshot::Sender<Result<SeatOutcome, String>>,
    },
    AddBotAndStart {
        reply: oneshot::Sender<TableResponse>,
    },
    EvictBots {
        reply: oneshot::Sender<usize>,
    },
    ResolveTransitions {
        reply: oneshot::Sender<TableResponse>,
    },

    /// Lobby summary for `tables_update` and the HTTP listing.
    GetSummary {
        reply: oneshot::Sender<TableSummary>,
    },

    /// Internal timer pulse.
    Tick,
}

/// Response from table operations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TableResponse {
    Success,
    Error(String),
    NotAtTable,
    TableFull,
}

impl TableResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, TableResponse::Success)
    }

    pub fn error_message(&self) -> Option<String> {
        match self {
            TableResponse::Error(msg) => Some(msg.clone()),
            TableResponse::NotAtTable => Some("not at this table".to_string()),
            TableResponse::TableFull => Some("table is full".to_string()),
            TableResponse::Success => None,
        }
    }
}

/// Verdict for `verify_state` / `POST /tables/:id/validate-state`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StateVerdict {
    pub synced: bool,
    pub server_hash: Option<String>,
    pub hand_in_progress: bool,
}
