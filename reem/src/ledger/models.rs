//! Ledger data types.

use crate::game::WinType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Table ID type.
pub type TableId = i64;

/// User ID type. Bots settle against the house account.
pub type UserId = i64;

/// Counterparty for stake collection, payout funding, and bot seats.
pub const HOUSE_USER_ID: UserId = 0;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Stake,
    Payout,
    Penalty,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Stake => "stake",
            Self::Payout => "payout",
            Self::Penalty => "penalty",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    RolledBack,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        };
        write!(f, "{repr}")
    }
}

/// A transaction to be applied. The `id` is the idempotency key: it is
/// derived from the game and the parties, so a retried settlement produces
/// byte-identical drafts and lands as a no-op.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TransactionDraft {
    pub id: String,
    pub user_id: UserId,
    pub table_id: TableId,
    pub game_id: Uuid,
    pub kind: TransactionKind,
    /// Signed amount: negative debits the account.
    pub amount: i64,
    pub win_type: Option<WinType>,
}

/// A transaction as recorded in the log.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LedgerTransaction {
    pub id: String,
    pub user_id: UserId,
    pub table_id: TableId,
    pub game_id: Uuid,
    pub kind: TransactionKind,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub win_type: Option<WinType>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// Result of applying a draft batch: the rows written, and the draft ids
/// that had already been applied and were skipped.
#[derive(Clone, Debug, Default)]
pub struct BatchOutcome {
    pub applied: Vec<LedgerTransaction>,
    pub duplicates: Vec<String>,
}

impl BatchOutcome {
    /// True when every draft had been applied before.
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty() && !self.duplicates.is_empty()
    }
}

/// Account identity of a seat, as the ledger sees it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SeatAccount {
    pub user_id: UserId,
    pub username: String,
}

impl SeatAccount {
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }

    /// A bot seat: settles against the house.
    pub fn house(username: impl Into<String>) -> Self {
        Self {
            user_id: HOUSE_USER_ID,
            username: username.into(),
        }
    }
}
