//! Storage trait for the ledger, with an in-memory implementation.
//!
//! The Postgres implementation lives in `manager`; the in-memory store backs
//! the session-layer tests and keeps the same atomicity and idempotency
//! semantics.

use super::{
    errors::{LedgerError, LedgerResult},
    models::{
        BatchOutcome, LedgerTransaction, TransactionDraft, TransactionStatus, UserId,
        HOUSE_USER_ID,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Atomic, idempotent application of transaction batches.
///
/// A batch either applies in full or not at all. Drafts whose id has already
/// completed are skipped and reported as duplicates. The house account is
/// the only account allowed to go negative.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn balance(&self, user_id: UserId) -> LedgerResult<i64>;

    async fn apply_batch(&self, drafts: &[TransactionDraft]) -> LedgerResult<BatchOutcome>;
}

/// In-memory ledger store. Used by tests and local tooling; production runs
/// on the Postgres store.
#[derive(Default)]
pub struct MemoryLedgerStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    balances: HashMap<UserId, i64>,
    transactions: HashMap<String, LedgerTransaction>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account balance.
    pub async fn credit(&self, user_id: UserId, amount: i64) {
        let mut inner = self.inner.lock().await;
        *inner.balances.entry(user_id).or_insert(0) += amount;
    }

    /// All recorded transactions, in no particular order.
    pub async fn transactions(&self) -> Vec<LedgerTransaction> {
        let inner = self.inner.lock().await;
        inner.transactions.values().cloned().collect()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn balance(&self, user_id: UserId) -> LedgerResult<i64> {
        let inner = self.inner.lock().await;
        inner
            .balances
            .get(&user_id)
            .copied()
            .ok_or(LedgerError::AccountNotFound(user_id))
    }

    async fn apply_batch(&self, drafts: &[TransactionDraft]) -> LedgerResult<BatchOutcome> {
        let mut inner = self.inner.lock().await;

        let mut fresh = Vec::with_capacity(drafts.len());
        let mut duplicates = Vec::new();
        for draft in drafts {
            match inner.transactions.get(&draft.id) {
                Some(row) if row.status == TransactionStatus::Completed => {
                    duplicates.push(draft.id.clone());
                }
                _ => fresh.push(draft),
            }
        }

        // Dry-run the balance changes so a failure leaves nothing applied.
        let mut scratch = inner.balances.clone();
        for draft in &fresh {
            let balance = scratch.entry(draft.user_id).or_insert(0);
            let after = *balance + draft.amount;
            if after < 0 && draft.user_id != HOUSE_USER_ID {
                let available = inner.balances.get(&draft.user_id).copied().unwrap_or(0);
                // Record the failed attempt for operator reconciliation; a
                // later retry with the same ids overwrites these rows.
                let now = Utc::now();
                for failed in &fresh {
                    inner.transactions.insert(
                        failed.id.clone(),
                        draft_to_row(failed, 0, 0, TransactionStatus::Failed, now),
                    );
                }
                return Err(LedgerError::InsufficientBalance {
                    user_id: draft.user_id,
                    available,
                    required: -draft.amount,
                });
            }
            *balance = after;
        }

        let now = Utc::now();
        let mut applied = Vec::with_capacity(fresh.len());
        for draft in &fresh {
            let before = inner.balances.get(&draft.user_id).copied().unwrap_or(0);
            let after = before + draft.amount;
            inner.balances.insert(draft.user_id, after);
            let row = draft_to_row(draft, before, after, TransactionStatus::Completed, now);
            inner.transactions.insert(draft.id.clone(), row.clone());
            applied.push(row);
        }

        Ok(BatchOutcome {
            applied,
            duplicates,
        })
    }
}

fn draft_to_row(
    draft: &TransactionDraft,
    balance_before: i64,
    balance_after: i64,
    status: TransactionStatus,
    created_at: chrono::DateTime<Utc>,
) -> LedgerTransaction {
    LedgerTransaction {
        id: draft.id.clone(),
        user_id: draft.user_id,
        table_id: draft.table_id,
        game_id: draft.game_id,
        kind: draft.kind,
        amount: draft.amount,
        balance_before,
        balance_after,
        win_type: draft.win_type,
        status,
        created_at,
    }
}
