//! Table configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::game::MAX_SEATS;

/// Fixed stake ladder; two preset tables exist per rung.
pub const STAKE_LADDER: [i64; 6] = [1, 5, 10, 20, 50, 100];

/// Preset tables per stake level.
pub const TABLES_PER_STAKE: usize = 2;

/// Per-table configuration. Timings default to production values; tests
/// shrink them.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TableConfig {
    pub stake: i64,
    pub max_seats: usize,
    /// Dynamic overflow tables are deleted once empty; preset tables live
    /// for the server's lifetime.
    pub dynamic: bool,
    /// Countdown before dealing once every human is ready.
    pub ready_countdown: Duration,
    /// Countdown when the matchmaker starts a lone-human-plus-bot hand.
    pub match_countdown: Duration,
    /// Delay before each bot action so bot play is observable.
    pub bot_turn_delay: Duration,
    /// Grace period for a disconnected seat during a hand.
    pub grace_in_hand: Duration,
    /// Grace period for a disconnected seat between hands.
    pub grace_idle: Duration,
    /// A transition that never resolves is cleaned up after this long.
    pub transition_ttl: Duration,
    /// Actor timer resolution.
    pub tick_interval: Duration,
    /// Fixed deal seed; None draws a fresh seed per hand. Tests pin this
    /// for reproducible deals.
    pub deal_seed: Option<u64>,
}

impl TableConfig {
    pub fn for_stake(stake: i64) -> Self {
        Self {
            stake,
            max_seats: MAX_SEATS,
            dynamic: false,
            ready_countdown: Duration::from_secs(3),
            match_countdown: Duration::from_secs(2),
            bot_turn_delay: Duration::from_millis(800),
            grace_in_hand: Duration::from_secs(20),
            grace_idle: Duration::from_secs(300),
            transition_ttl: Duration::from_secs(1800),
            tick_interval: Duration::from_millis(100),
            deal_seed: None,
        }
    }

    pub fn overflow(stake: i64) -> Self {
        Self {
            dynamic: true,
            ..Self::for_stake(stake)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.stake <= 0 {
            return Err(format!("stake must be positive, got {}", self.stake));
        }
        if self.max_seats < 2 || self.max_seats > MAX_SEATS {
            return Err(format!(
                "max_seats must be between 2 and {MAX_SEATS}, got {}",
                self.max_seats
            ));
        }
        Ok(())
    }
}
