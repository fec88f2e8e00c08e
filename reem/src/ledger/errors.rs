//! Ledger error types.

use super::models::UserId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("user {user_id} has {available} chips but needs {required}")]
    InsufficientBalance {
        user_id: UserId,
        available: i64,
        required: i64,
    },

    #[error("account {0} not found")]
    AccountNotFound(UserId),

    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
