//! The matchmaker: assigns queued players to seats, inserts and evicts
//! bots, and initiates mid-hand transitions.
//!
//! The matchmaker only talks to tables through the [`Seating`] trait, which
//! the session layer implements over its actor handles.

pub mod engine;

pub use engine::{MatchTrigger, Matchmaker, SeatOutcome, Seating, TableRoster};
