//! The wagering ledger: atomic, idempotent stake, payout, and penalty
//! transactions against user chip balances.

pub mod errors;
pub mod manager;
pub mod models;
pub mod payouts;
pub mod store;

pub use errors::{LedgerError, LedgerResult};
pub use manager::{LedgerManager, PgLedgerStore};
pub use models::{
    BatchOutcome, LedgerTransaction, SeatAccount, TableId, TransactionDraft, TransactionKind,
    TransactionStatus, UserId, HOUSE_USER_ID,
};
pub use store::{LedgerStore, MemoryLedgerStore};
