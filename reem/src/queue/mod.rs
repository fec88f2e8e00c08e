//! Stake-partitioned matchmaking queues.

pub mod manager;
pub mod models;

pub use manager::{QueueManager, DEFAULT_WAIT_ESTIMATE_SECS, QUEUE_ENTRY_TTL_SECS};
pub use models::{Priority, QueueError, QueueResult, QueueStats, QueuedPlayer};
