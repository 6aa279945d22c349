//! Upstream game-service client
//!
//! Outbound API calls: the two long-lived inbound streams, move submission,
//! and the challenge workflow. All calls are fire-and-confirm; retrying and
//! re-voting policy live with the callers.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{Error, Result};
use super::GameBackend;

/// Timeout for fire-and-confirm calls. Never applied at the client level:
/// a client-wide timeout would also cut the long-lived streams.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum gap between challenge creations
const CHALLENGE_CREATION_INTERVAL: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("votechess/", env!("CARGO_PKG_VERSION"));

/// Result of creating a challenge upstream
#[derive(Debug, Clone)]
pub struct ChallengeCreated {
    pub challenge_id: Option<String>,
    pub game_id: Option<String>,
    pub url: Option<String>,
}

/// Client for the upstream board API
pub struct LichessClient {
    http: Client,
    base_url: String,
    token: String,
    /// Last challenge-creation time, for the rate-limit guard
    challenge_guard: Mutex<Option<Instant>>,
}

impl LichessClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(Error::Upstream)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            challenge_guard: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Open the account-wide event stream
    pub async fn open_event_stream(&self) -> Result<reqwest::Response> {
        let response = self
            .http
            .get(self.url("/stream/event"))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;
        Ok(response)
    }

    /// Open the per-game stream
    pub async fn open_game_stream(&self, game_id: &str) -> Result<reqwest::Response> {
        let response = self
            .http
            .get(self.url(&format!("/board/game/stream/{}", game_id)))
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;
        Ok(response)
    }

    /// Submit the resolved move for the current turn
    pub async fn submit_move(&self, game_id: &str, uci: &str) -> Result<()> {
        info!("Submitting move {} for game {}", uci, game_id);
        self.http
            .post(self.url(&format!("/board/game/{}/move/{}", game_id, uci)))
            .bearer_auth(&self.token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Create a challenge against the service AI at the given level
    pub async fn challenge_ai(&self, level: u8) -> Result<ChallengeCreated> {
        self.guard_challenge_creation().await?;
        info!("Creating AI challenge at level {}", level);

        let body: serde_json::Value = self
            .http
            .post(self.url("/challenge/ai"))
            .bearer_auth(&self.token)
            .timeout(REQUEST_TIMEOUT)
            .form(&[
                ("level", level.to_string()),
                ("clock.limit", "900".to_string()),
                ("clock.increment", "10".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // The created-game id has moved between `game.id` and `id` across
        // API versions
        let game_id = body
            .pointer("/game/id")
            .or_else(|| body.pointer("/id"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        if game_id.is_none() {
            return Err(Error::Payload("AI challenge response without game id".into()));
        }
        Ok(ChallengeCreated {
            challenge_id: None,
            game_id,
            url: None,
        })
    }

    /// Create an open challenge anyone can accept
    pub async fn challenge_open(&self) -> Result<ChallengeCreated> {
        self.guard_challenge_creation().await?;
        info!("Creating open challenge");

        let body: serde_json::Value = self
            .http
            .post(self.url("/challenge/open"))
            .bearer_auth(&self.token)
            .timeout(REQUEST_TIMEOUT)
            .form(&[
                ("clock.limit", "900".to_string()),
                ("clock.increment", "10".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let challenge_id = body
            .pointer("/challenge/id")
            .or_else(|| body.pointer("/id"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let url = body
            .pointer("/challenge/url")
            .or_else(|| body.pointer("/url"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        if challenge_id.is_none() {
            return Err(Error::Payload(
                "open challenge response without challenge id".into(),
            ));
        }
        Ok(ChallengeCreated {
            challenge_id,
            game_id: None,
            url,
        })
    }

    /// Accept an incoming challenge by id
    pub async fn accept_challenge(&self, challenge_id: &str) -> Result<()> {
        info!("Accepting challenge {}", challenge_id);
        self.http
            .post(self.url(&format!("/challenge/{}/accept", challenge_id)))
            .bearer_auth(&self.token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Refuse back-to-back challenge creations
    async fn guard_challenge_creation(&self) -> Result<()> {
        let mut last = self.challenge_guard.lock().await;
        if let Some(at) = *last {
            if at.elapsed() < CHALLENGE_CREATION_INTERVAL {
                debug!("Challenge creation rate limited");
                return Err(Error::ChallengeRateLimited);
            }
        }
        *last = Some(Instant::now());
        Ok(())
    }
}

#[async_trait]
impl GameBackend for LichessClient {
    async fn submit_move(&self, game_id: &str, uci: &str) -> Result<()> {
        LichessClient::submit_move(self, game_id, uci).await
    }

    async fn accept_challenge(&self, challenge_id: &str) -> Result<()> {
        LichessClient::accept_challenge(self, challenge_id).await
    }
}
