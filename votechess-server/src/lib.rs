//! Crowd move resolution engine
//!
//! Maintains an authoritative view of a live upstream chess game from its
//! event streams, runs timed voting rounds where connected observers pick
//! the next move, and submits exactly one winning move per turn.

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod game;
pub mod lichess;
pub mod rules;
pub mod voting;

pub use error::{Error, Result};
