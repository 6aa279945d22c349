//! Upstream game-service integration
//!
//! Everything that talks to the external service lives here: the outbound
//! API client, the inbound message types, and the stream resilience layer.

pub mod client;
pub mod messages;
pub mod stream;

pub use client::{ChallengeCreated, LichessClient};

use async_trait::async_trait;

use crate::error::Result;

/// Outbound calls the coordinator issues while resolving rounds and
/// handling challenges. A trait seam so tests can substitute a mock
/// backend for the real client.
#[async_trait]
pub trait GameBackend: Send + Sync {
    async fn submit_move(&self, game_id: &str, uci: &str) -> Result<()>;

    async fn accept_challenge(&self, challenge_id: &str) -> Result<()>;
}
