//! Matchmaking passes over the table pools.

use crate::queue::{QueueManager, QueuedPlayer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use uuid::Uuid;

use crate::game::MAX_SEATS;
use crate::ledger::TableId;

/// Events that trigger an immediate matchmaking pass for one stake, on top
/// of the periodic sweep.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatchTrigger {
    Periodic,
    QueueChanged(i64),
    Disconnect(i64),
}

/// Snapshot of a table as the matchmaker sees it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TableRoster {
    pub table_id: TableId,
    pub stake: i64,
    pub seat_count: usize,
    pub human_seats: usize,
    pub bot_seats: usize,
    pub hand_in_progress: bool,
    pub pending_transitions: usize,
    pub dynamic: bool,
}

impl TableRoster {
    /// Seats a new player could still claim, counting promised transitions
    /// as taken.
    pub fn open_seats(&self) -> usize {
        MAX_SEATS.saturating_sub(self.seat_count + self.pending_transitions)
    }
}

/// What happened to a player handed to a table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SeatOutcome {
    /// Seated directly into the roster.
    Seated,
    /// Hand in progress with a bot: the player spectates until the hand
    /// ends, then replaces the earmarked bot.
    TransitionInitiated { transition_id: Uuid },
    /// Hand in progress without a bot: the player spectates and joins the
    /// next hand if a seat is free.
    WillJoinNextHand,
    TableFull,
}

/// The seat-mutation surface the matchmaker drives. Implemented by the
/// session layer over its table actors.
#[async_trait]
pub trait Seating: Send + Sync {
    /// Rosters of every table at a stake, preset tables first.
    async fn rosters(&self, stake: i64) -> Vec<TableRoster>;

    /// Hand a queued player to a table.
    async fn seat_player(
        &self,
        table_id: TableId,
        player: QueuedPlayer,
    ) -> Result<SeatOutcome, String>;

    /// Seat a bot opposite a lone human and begin the start countdown.
    async fn add_bot_and_start(&self, table_id: TableId) -> Result<(), String>;

    /// Remove bots not needed anymore; returns how many were evicted (or
    /// earmarked for eviction at hand end).
    async fn evict_bots(&self, table_id: TableId) -> Result<usize, String>;

    /// Attempt to resolve pending transitions (no-op while the hand runs).
    async fn resolve_transitions(&self, table_id: TableId) -> Result<(), String>;

    /// Create a dynamic overflow table at a stake; returns its id.
    async fn create_overflow_table(&self, stake: i64) -> Result<TableId, String>;
}

/// Periodic and triggered matchmaking over all stakes.
pub struct Matchmaker {
    queues: Arc<QueueManager>,
    seating: Arc<dyn Seating>,
    period: Duration,
}

impl Matchmaker {
    pub fn new(queues: Arc<QueueManager>, seating: Arc<dyn Seating>, period: Duration) -> Self {
        Self {
            queues,
            seating,
            period,
        }
    }

    /// Run until the trigger channel closes. Re-entrant passes for one
    /// stake serialise on the queue's advisory lock.
    pub async fn run(self, mut triggers: mpsc::Receiver<MatchTrigger>) {
        let mut tick = interval(self.period);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.pass_all().await;
                }
                trigger = triggers.recv() => {
                    match trigger {
                        Some(MatchTrigger::QueueChanged(stake))
                        | Some(MatchTrigger::Disconnect(stake)) => {
                            self.pass_stake(stake).await;
                        }
                        Some(MatchTrigger::Periodic) => {
                            self.pass_all().await;
                        }
                        None => break,
                    }
                }
            }
        }
        log::info!("matchmaker stopped");
    }

    pub async fn pass_all(&self) {
        for stake in self.queues.stakes() {
            self.pass_stake(stake).await;
        }
    }

    /// One pass over every table at a stake, under that stake's queue lock.
    pub async fn pass_stake(&self, stake: i64) {
        let _guard = match self.queues.lock(stake).await {
            Ok(guard) => guard,
            Err(e) => {
                log::warn!("matchmaker skipping stake {stake}: {e}");
                return;
            }
        };

        // Resolve transitions left over from finished hands first, so their
        // seats are accounted for before new assignments.
        for roster in self.seating.rosters(stake).await {
            if roster.pending_transitions > 0 {
                if let Err(e) = self.seating.resolve_transitions(roster.table_id).await {
                    log::warn!(
                        "transition resolution failed on table {}: {e}",
                        roster.table_id
                    );
                }
            }
        }

        self.fill_seats(stake).await;

        // Bot management after seating settles.
        for roster in self.seating.rosters(stake).await {
            if roster.human_seats == 1 && roster.bot_seats == 0 && !roster.hand_in_progress {
                if let Err(e) = self.seating.add_bot_and_start(roster.table_id).await {
                    log::warn!("bot insertion failed on table {}: {e}", roster.table_id);
                }
            } else if roster.human_seats >= 2 && roster.bot_seats > 1 {
                match self.seating.evict_bots(roster.table_id).await {
                    Ok(evicted) if evicted > 0 => {
                        log::info!("evicted {evicted} bot(s) from table {}", roster.table_id);
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("bot eviction failed on table {}: {e}", roster.table_id),
                }
            }
        }
    }

    async fn fill_seats(&self, stake: i64) {
        loop {
            if self.queues.is_empty(stake).await.unwrap_or(true) {
                return;
            }

            let rosters = self.seating.rosters(stake).await;
            let target = rosters.iter().find(|r| r.open_seats() > 0);
            let table_id = match target {
                Some(roster) => roster.table_id,
                None => {
                    // Every table is full: overflow with a dynamic table.
                    match self.seating.create_overflow_table(stake).await {
                        Ok(id) => id,
                        Err(e) => {
                            log::error!("overflow table creation failed at stake {stake}: {e}");
                            return;
                        }
                    }
                }
            };

            let player = match self.queues.dequeue(stake).await {
                Ok(Some(player)) => player,
                _ => return,
            };

            match self.seating.seat_player(table_id, player.clone()).await {
                Ok(SeatOutcome::Seated)
                | Ok(SeatOutcome::TransitionInitiated { .. })
                | Ok(SeatOutcome::WillJoinNextHand) => {}
                Ok(SeatOutcome::TableFull) => {
                    log::warn!(
                        "table {table_id} reported full after its roster said open; \
                         requeueing {}",
                        player.username
                    );
                    self.requeue(stake, player).await;
                    return;
                }
                Err(e) => {
                    log::error!(
                        "seating {} at table {table_id} failed: {e}",
                        player.username
                    );
                    self.requeue(stake, player).await;
                    return;
                }
            }
        }
    }

    async fn requeue(&self, stake: i64, player: QueuedPlayer) {
        if let Err(e) = self
            .queues
            .enqueue(
                stake,
                player.user_id,
                &player.username,
                player.connection_id,
                player.priority,
            )
            .await
        {
            log::error!("could not requeue {}: {e}", player.username);
        }
    }
}
