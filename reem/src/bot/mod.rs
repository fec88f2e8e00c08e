//! Driver for non-human seats.

pub mod decision;

pub use decision::decide;
