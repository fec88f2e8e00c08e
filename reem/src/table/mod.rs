//! The session layer: per-table actors owning the authoritative state.
//!
//! Each table runs in its own task with an mpsc inbox; all writes to the
//! table and its hand state are serialised through that actor. The manager
//! spawns actors, routes messages by table id, and implements the seating
//! surface the matchmaker drives.

pub mod actor;
pub mod config;
pub mod manager;
pub mod messages;

pub use actor::{TableActor, TableHandle};
pub use config::{TableConfig, STAKE_LADDER, TABLES_PER_STAKE};
pub use manager::TableManager;
pub use messages::{
    Spectator, StateVerdict, TableMessage, TablePhase, TableResponse, Transition,
};
