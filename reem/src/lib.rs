//! # Reem
//!
//! Authoritative server core for a real-time, stake-based, multi-table
//! card game (Tonk/Reem). The crate is organised around one actor per
//! table owning its authoritative state, with a pure rules engine at the
//! bottom.
//!
//! ## Core Modules
//!
//! - [`game`]: entities and the pure rules engine (`apply`, `deal`)
//! - [`bot`]: deterministic action policy for non-human seats
//! - [`ledger`]: atomic, idempotent stake/payout/penalty transactions
//! - [`queue`]: stake-partitioned matchmaking queues
//! - [`matchmaker`]: seat assignment, bot insertion/eviction, transitions
//! - [`table`]: the session layer — table actors and their manager
//! - [`net`]: wire protocol frames
//! - [`auth`]: access-token verification
//! - [`db`]: connection pooling and repositories
//!
//! ## Example
//!
//! ```
//! use reem::game::{self, Seat};
//! use uuid::Uuid;
//!
//! // Deal a deterministic two-bot hand.
//! let seats = vec![Seat::bot("bot_1", 1_000), Seat::bot("bot_2", 1_000)];
//! let hand = game::deal(Uuid::nil(), seats, 10, 42);
//! assert_eq!(hand.card_count(), game::DECK_SIZE);
//! ```

pub mod auth;
pub mod bot;
pub mod db;
pub mod game;
pub mod ledger;
pub mod matchmaker;
pub mod net;
pub mod queue;
pub mod table;

pub use game::{Action, HandPhase, HandState, RulesError, WinType};
pub use ledger::{LedgerManager, LedgerStore, MemoryLedgerStore, PgLedgerStore};
pub use matchmaker::{MatchTrigger, Matchmaker};
pub use net::{ClientEvent, ServerEvent};
pub use queue::QueueManager;
pub use table::{TableConfig, TableHandle, TableManager, STAKE_LADDER};
