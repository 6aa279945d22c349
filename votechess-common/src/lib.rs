//! # Votechess Common Library
//!
//! Shared code for the votechess service:
//! - Client-facing event types (ServerEvent enum)
//! - SSE broadcast fan-out
//! - Vote identity resolution
//! - Configuration loading
//! - Error types

pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod sse;

pub use error::{Error, Result};
pub use identity::VoterId;
