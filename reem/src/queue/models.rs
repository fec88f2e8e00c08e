//! Matchmaking queue data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::ledger::UserId;

/// Queue priority. Higher priorities insert ahead of lower ones but behind
/// earlier entries of the same or higher priority (stable).
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Vip,
    High,
    #[default]
    Normal,
}

impl Priority {
    pub fn rank(self) -> u8 {
        match self {
            Self::Vip => 2,
            Self::High => 1,
            Self::Normal => 0,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Vip => "vip",
            Self::High => "high",
            Self::Normal => "normal",
        };
        write!(f, "{repr}")
    }
}

/// A player waiting for a seat at some stake.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct QueuedPlayer {
    pub user_id: UserId,
    pub username: String,
    pub connection_id: Uuid,
    pub priority: Priority,
    pub enqueued_at: DateTime<Utc>,
}

/// Point-in-time queue statistics for one stake.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct QueueStats {
    pub stake: i64,
    pub depth: usize,
    pub avg_wait_secs: u64,
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum QueueError {
    #[error("{0} is already queued at this stake")]
    AlreadyQueued(String),

    #[error("no queue for stake {0}")]
    UnknownStake(i64),

    #[error("not queued")]
    NotQueued,
}

pub type QueueResult<T> = Result<T, QueueError>;
