//! Ledger manager and the Postgres-backed store.

use super::{
    errors::{LedgerError, LedgerResult},
    models::{
        BatchOutcome, LedgerTransaction, SeatAccount, TableId, TransactionDraft,
        TransactionStatus, UserId, HOUSE_USER_ID,
    },
    payouts,
    store::LedgerStore,
};
use crate::game::{SeatStatus, WinType};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use uuid::Uuid;

/// The wagering ledger: three operations, each atomic across all balance
/// updates and transaction-log rows, idempotent by transaction id.
#[derive(Clone)]
pub struct LedgerManager {
    store: Arc<dyn LedgerStore>,
}

impl LedgerManager {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn LedgerStore> {
        self.store.clone()
    }

    pub async fn balance(&self, user_id: UserId) -> LedgerResult<i64> {
        self.store.balance(user_id).await
    }

    /// Deduct the stake from every seat at hand start. Insufficient balance
    /// on any seat fails the whole hand start.
    pub async fn deduct_stakes(
        &self,
        seats: &[SeatAccount],
        stake: i64,
        table_id: TableId,
        game_id: Uuid,
    ) -> LedgerResult<BatchOutcome> {
        if stake <= 0 {
            return Err(LedgerError::InvalidAmount(stake));
        }
        let drafts = payouts::stake_entries(seats, stake, table_id, game_id);
        self.store.apply_batch(&drafts).await
    }

    /// Pay the winners at hand end. Losers already forfeited their stake at
    /// hand start, so only winner credits (and the balancing house debit)
    /// are written here.
    pub async fn distribute_winnings(
        &self,
        seats: &[SeatAccount],
        winners: &[usize],
        win_type: WinType,
        stake: i64,
        table_id: TableId,
        game_id: Uuid,
    ) -> LedgerResult<BatchOutcome> {
        let drafts = payouts::payout_entries(seats, winners, win_type, stake, table_id, game_id);
        self.store.apply_batch(&drafts).await
    }

    /// Charge a caught dropper one stake per seat that beat them and is
    /// still in the hand.
    pub async fn apply_drop_penalty(
        &self,
        seats: &[SeatAccount],
        dropper_idx: usize,
        round_scores: &[u32],
        statuses: &[SeatStatus],
        stake: i64,
        table_id: TableId,
        game_id: Uuid,
    ) -> LedgerResult<BatchOutcome> {
        let drafts = payouts::drop_penalty_entries(
            seats,
            dropper_idx,
            round_scores,
            statuses,
            stake,
            table_id,
            game_id,
        );
        if drafts.is_empty() {
            return Ok(BatchOutcome::default());
        }
        self.store.apply_batch(&drafts).await
    }

    /// Return stakes for a hand abandoned before settlement.
    pub async fn refund_stakes(
        &self,
        seats: &[SeatAccount],
        stake: i64,
        table_id: TableId,
        game_id: Uuid,
    ) -> LedgerResult<BatchOutcome> {
        let drafts = payouts::refund_entries(seats, stake, table_id, game_id);
        self.store.apply_batch(&drafts).await
    }
}

/// Postgres-backed ledger store. Balances live on `users.chips`;
/// the log is the append-only `transactions` table keyed by
/// `transaction_id`.
pub struct PgLedgerStore {
    pool: Arc<PgPool>,
}

impl PgLedgerStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn record_failed_rows(&self, drafts: &[&TransactionDraft]) {
        // Best effort, outside the rolled-back transaction. A later retry
        // with the same ids overwrites these rows.
        for draft in drafts {
            let result = sqlx::query(
                r#"
                INSERT INTO transactions
                    (transaction_id, user_id, table_id, game_id, kind, amount,
                     balance_before, balance_after, win_type, status, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, 0, 0, $7, $8, NOW())
                ON CONFLICT (transaction_id) DO UPDATE SET status = EXCLUDED.status
                "#,
            )
            .bind(&draft.id)
            .bind(draft.user_id)
            .bind(draft.table_id)
            .bind(draft.game_id)
            .bind(draft.kind.to_string())
            .bind(draft.amount)
            .bind(draft.win_type.map(|w| w.to_string()))
            .bind(TransactionStatus::Failed.to_string())
            .execute(self.pool.as_ref())
            .await;

            if let Err(e) = result {
                log::error!(
                    "failed to record failed ledger row {}: {}",
                    draft.id,
                    e
                );
            }
        }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn balance(&self, user_id: UserId) -> LedgerResult<i64> {
        let row = sqlx::query("SELECT chips FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or(LedgerError::AccountNotFound(user_id))?;
        Ok(row.get("chips"))
    }

    async fn apply_batch(&self, drafts: &[TransactionDraft]) -> LedgerResult<BatchOutcome> {
        let mut tx = self.pool.begin().await?;

        let mut fresh: Vec<&TransactionDraft> = Vec::with_capacity(drafts.len());
        let mut duplicates = Vec::new();
        for draft in drafts {
            let existing =
                sqlx::query("SELECT status FROM transactions WHERE transaction_id = $1")
                    .bind(&draft.id)
                    .fetch_optional(&mut *tx)
                    .await?;
            match existing {
                Some(row) if row.get::<String, _>("status") == "completed" => {
                    duplicates.push(draft.id.clone());
                }
                _ => fresh.push(draft),
            }
        }

        let mut applied = Vec::with_capacity(fresh.len());
        for draft in &fresh {
            // Debits against player accounts are guarded in the update
            // itself; the house account is the designated sink and may go
            // negative.
            let updated = if draft.amount < 0 && draft.user_id != HOUSE_USER_ID {
                sqlx::query(
                    "UPDATE users
                     SET chips = chips + $1, updated_at = NOW()
                     WHERE id = $2 AND chips + $1 >= 0
                     RETURNING chips",
                )
                .bind(draft.amount)
                .bind(draft.user_id)
                .fetch_optional(&mut *tx)
                .await?
            } else {
                sqlx::query(
                    "UPDATE users
                     SET chips = chips + $1, updated_at = NOW()
                     WHERE id = $2
                     RETURNING chips",
                )
                .bind(draft.amount)
                .bind(draft.user_id)
                .fetch_optional(&mut *tx)
                .await?
            };

            let balance_after: i64 = match updated {
                Some(row) => row.get("chips"),
                None => {
                    let check = sqlx::query("SELECT chips FROM users WHERE id = $1")
                        .bind(draft.user_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                    tx.rollback().await?;
                    self.record_failed_rows(&fresh).await;
                    return match check {
                        Some(row) => Err(LedgerError::InsufficientBalance {
                            user_id: draft.user_id,
                            available: row.get("chips"),
                            required: -draft.amount,
                        }),
                        None => Err(LedgerError::AccountNotFound(draft.user_id)),
                    };
                }
            };
            let balance_before = balance_after - draft.amount;

            sqlx::query(
                r#"
                INSERT INTO transactions
                    (transaction_id, user_id, table_id, game_id, kind, amount,
                     balance_before, balance_after, win_type, status, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
                ON CONFLICT (transaction_id) DO UPDATE SET
                    amount = EXCLUDED.amount,
                    balance_before = EXCLUDED.balance_before,
                    balance_after = EXCLUDED.balance_after,
                    status = EXCLUDED.status,
                    created_at = EXCLUDED.created_at
                "#,
            )
            .bind(&draft.id)
            .bind(draft.user_id)
            .bind(draft.table_id)
            .bind(draft.game_id)
            .bind(draft.kind.to_string())
            .bind(draft.amount)
            .bind(balance_before)
            .bind(balance_after)
            .bind(draft.win_type.map(|w| w.to_string()))
            .bind(TransactionStatus::Completed.to_string())
            .execute(&mut *tx)
            .await?;

            applied.push(LedgerTransaction {
                id: draft.id.clone(),
                user_id: draft.user_id,
                table_id: draft.table_id,
                game_id: draft.game_id,
                kind: draft.kind,
                amount: draft.amount,
                balance_before,
                balance_after,
                win_type: draft.win_type,
                status: TransactionStatus::Completed,
                created_at: Utc::now(),
            });
        }

        tx.commit().await?;

        Ok(BatchOutcome {
            applied,
            duplicates,
        })
    }
}
