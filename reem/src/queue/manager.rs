//! Per-stake matchmaking queues.

use super::models::{Priority, QueueError, QueueResult, QueueStats, QueuedPlayer};
use crate::ledger::UserId;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Queue entries older than this are purged by the background sweep.
pub const QUEUE_ENTRY_TTL_SECS: i64 = 600;

/// Wait estimate before any history exists.
pub const DEFAULT_WAIT_ESTIMATE_SECS: u64 = 30;

/// Rolling window of actual wait samples per stake.
const WAIT_SAMPLE_WINDOW: usize = 50;

struct Lane {
    state: Mutex<LaneState>,
    /// Advisory lock held by the matchmaker for the duration of a per-stake
    /// pass, so triggered and periodic runs cannot race each other.
    advisory: Arc<Mutex<()>>,
}

#[derive(Default)]
struct LaneState {
    entries: VecDeque<QueuedPlayer>,
    wait_samples: VecDeque<u64>,
}

/// Stake-partitioned FIFO queues with priority insertion.
pub struct QueueManager {
    lanes: HashMap<i64, Lane>,
}

impl QueueManager {
    /// Build one lane per stake in the ladder.
    pub fn new(stakes: &[i64]) -> Self {
        let lanes = stakes
            .iter()
            .map(|&stake| {
                (
                    stake,
                    Lane {
                        state: Mutex::new(LaneState::default()),
                        advisory: Arc::new(Mutex::new(())),
                    },
                )
            })
            .collect();
        Self { lanes }
    }

    fn lane(&self, stake: i64) -> QueueResult<&Lane> {
        self.lanes.get(&stake).ok_or(QueueError::UnknownStake(stake))
    }

    pub fn stakes(&self) -> Vec<i64> {
        let mut stakes: Vec<i64> = self.lanes.keys().copied().collect();
        stakes.sort_unstable();
        stakes
    }

    /// Take the per-stake advisory lock for a matchmaker critical section.
    pub async fn lock(&self, stake: i64) -> QueueResult<OwnedMutexGuard<()>> {
        let lane = self.lane(stake)?;
        Ok(lane.advisory.clone().lock_owned().await)
    }

    /// Add a player; returns their 1-based position. Duplicate usernames
    /// are rejected.
    pub async fn enqueue(
        &self,
        stake: i64,
        user_id: UserId,
        username: &str,
        connection_id: Uuid,
        priority: Priority,
    ) -> QueueResult<usize> {
        let lane = self.lane(stake)?;
        let mut state = lane.state.lock().await;

        if state.entries.iter().any(|e| e.username == username) {
            return Err(QueueError::AlreadyQueued(username.to_string()));
        }

        let entry = QueuedPlayer {
            user_id,
            username: username.to_string(),
            connection_id,
            priority,
            enqueued_at: Utc::now(),
        };

        // Stable priority insertion: ahead of strictly lower priorities,
        // behind everything equal or higher.
        let insert_at = state
            .entries
            .iter()
            .position(|e| e.priority.rank() < priority.rank())
            .unwrap_or(state.entries.len());
        state.entries.insert(insert_at, entry);

        Ok(insert_at + 1)
    }

    /// Pop the head of the queue, recording its realised wait time.
    pub async fn dequeue(&self, stake: i64) -> QueueResult<Option<QueuedPlayer>> {
        let lane = self.lane(stake)?;
        let mut state = lane.state.lock().await;

        let entry = match state.entries.pop_front() {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let waited = (Utc::now() - entry.enqueued_at).num_seconds().max(0) as u64;
        state.wait_samples.push_back(waited);
        while state.wait_samples.len() > WAIT_SAMPLE_WINDOW {
            state.wait_samples.pop_front();
        }

        Ok(Some(entry))
    }

    pub async fn remove(&self, stake: i64, username: &str) -> QueueResult<QueuedPlayer> {
        let lane = self.lane(stake)?;
        let mut state = lane.state.lock().await;
        let idx = state
            .entries
            .iter()
            .position(|e| e.username == username)
            .ok_or(QueueError::NotQueued)?;
        state.entries.remove(idx).ok_or(QueueError::NotQueued)
    }

    /// 1-based position of a player in the queue.
    pub async fn position(&self, stake: i64, username: &str) -> QueueResult<Option<usize>> {
        let lane = self.lane(stake)?;
        let state = lane.state.lock().await;
        Ok(state
            .entries
            .iter()
            .position(|e| e.username == username)
            .map(|p| p + 1))
    }

    pub async fn stats(&self, stake: i64) -> QueueResult<QueueStats> {
        let lane = self.lane(stake)?;
        let state = lane.state.lock().await;
        Ok(QueueStats {
            stake,
            depth: state.entries.len(),
            avg_wait_secs: average(&state.wait_samples),
        })
    }

    pub async fn len(&self, stake: i64) -> QueueResult<usize> {
        let lane = self.lane(stake)?;
        Ok(lane.state.lock().await.entries.len())
    }

    pub async fn is_empty(&self, stake: i64) -> QueueResult<bool> {
        Ok(self.len(stake).await? == 0)
    }

    /// Estimated wait for a queue position: the rolling average scaled by
    /// how deep the player sits.
    pub async fn estimated_wait(&self, stake: i64, position: usize) -> QueueResult<Duration> {
        let lane = self.lane(stake)?;
        let state = lane.state.lock().await;
        let base = if state.wait_samples.is_empty() {
            DEFAULT_WAIT_ESTIMATE_SECS
        } else {
            average(&state.wait_samples)
        };
        let factor = (position / 2).max(1) as u64;
        Ok(Duration::from_secs(base * factor))
    }

    /// Drop entries that have waited past the TTL. Returns the purged
    /// players so callers can notify them.
    pub async fn purge_expired(&self) -> Vec<(i64, QueuedPlayer)> {
        let cutoff = Utc::now() - ChronoDuration::seconds(QUEUE_ENTRY_TTL_SECS);
        let mut purged = Vec::new();
        for (&stake, lane) in &self.lanes {
            let mut state = lane.state.lock().await;
            let mut kept = VecDeque::with_capacity(state.entries.len());
            for entry in state.entries.drain(..) {
                if entry.enqueued_at < cutoff {
                    purged.push((stake, entry));
                } else {
                    kept.push_back(entry);
                }
            }
            state.entries = kept;
        }
        purged
    }
}

fn average(samples: &VecDeque<u64>) -> u64 {
    if samples.is_empty() {
        return DEFAULT_WAIT_ESTIMATE_SECS;
    }
    samples.iter().sum::<u64>() / samples.len() as u64
}
