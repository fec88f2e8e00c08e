//! Core game logic: entities and the pure rules engine.

pub mod engine;
pub mod entities;

pub use engine::{apply, concede_seat, deal, declare_forfeit, Action, RulesError};
pub use entities::{
    base_deck, hand_score, Card, CardView, HandOutcome, HandPhase, HandState, HandStateView, Rank,
    Seat, SeatIndex, SeatStatus, SeatView, Spread, Suit, WinType, DECK_SIZE, HAND_SIZE, MAX_SEATS,
};
