//! HTTP request handlers
//!
//! Vote and mode submissions resolve the caller's identity from its network
//! origin and forward to the coordinator; challenge endpoints call the
//! upstream client directly since they touch no coordinator-owned state.

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::info;

use votechess_common::events::{GameView, ObserverMode, RoundView, VoteReply};
use votechess_common::VoterId;

use crate::api::AppState;
use crate::error::Error;
use crate::lichess::ChallengeCreated;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    #[serde(rename = "move")]
    mv: String,
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    mode: ObserverMode,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

impl StatusResponse {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatusResponse {
    in_progress: bool,
    game: Option<GameView>,
    round: Option<RoundView>,
}

#[derive(Debug, Deserialize)]
pub struct AiChallengeRequest {
    #[serde(default = "default_ai_level")]
    level: u8,
}

fn default_ai_level() -> u8 {
    1
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    challenge_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    game_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

impl From<ChallengeCreated> for ChallengeResponse {
    fn from(created: ChallengeCreated) -> Self {
        Self {
            status: "ok".to_string(),
            challenge_id: created.challenge_id,
            game_id: created.game_id,
            url: created.url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
}

type UpstreamReply<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

fn upstream_error(e: Error) -> (StatusCode, Json<ErrorResponse>) {
    let code = match &e {
        Error::ChallengeRateLimited => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::BAD_GATEWAY,
    };
    (
        code,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

fn resolve_voter(state: &AppState, headers: &HeaderMap, peer: SocketAddr) -> VoterId {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok());
    state.resolver.resolve(forwarded, peer)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/events - SSE observer feed
///
/// A joining observer receives exactly one snapshot and, mid-round, exactly
/// one round-start carrying the true remaining deadline, before any live
/// event.
pub async fn events(State(state): State<AppState>) -> impl IntoResponse {
    let bundle = state.coordinator.join_bundle().await;
    state.broadcaster.handle_connection(bundle.into_backlog())
}

/// POST /api/vote - cast or change this identity's ballot
pub async fn vote(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<VoteRequest>,
) -> Json<VoteReply> {
    let voter = resolve_voter(&state, &headers, peer);
    Json(state.coordinator.submit_vote(voter, request.mv).await)
}

/// POST /api/mode - toggle Voter/Spectator for this identity
pub async fn set_mode(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<ModeRequest>,
) -> Json<StatusResponse> {
    let voter = resolve_voter(&state, &headers, peer);
    state.coordinator.set_mode(voter, request.mode).await;
    Json(StatusResponse::ok())
}

/// GET /api/status - current game/round state for non-SSE clients
pub async fn status(State(state): State<AppState>) -> Json<GameStatusResponse> {
    let bundle = state.coordinator.join_bundle().await;
    Json(GameStatusResponse {
        in_progress: bundle.game.as_ref().is_some_and(|game| !game.is_over),
        game: bundle.game,
        round: bundle.round,
    })
}

/// POST /api/game/:game_id/watch - manually attach to a game
pub async fn watch_game(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Json<StatusResponse> {
    info!("Manual watch requested for game {}", game_id);
    state.coordinator.watch_game(game_id).await;
    Json(StatusResponse::ok())
}

/// POST /api/challenge/ai - challenge the service AI
pub async fn challenge_ai(
    State(state): State<AppState>,
    Json(request): Json<AiChallengeRequest>,
) -> UpstreamReply<ChallengeResponse> {
    let created = state
        .client
        .challenge_ai(request.level)
        .await
        .map_err(upstream_error)?;

    // The event feed will also announce the game; watching directly avoids
    // waiting on it
    if let Some(game_id) = &created.game_id {
        state.coordinator.watch_game(game_id.clone()).await;
    }
    Ok(Json(created.into()))
}

/// POST /api/challenge/open - create an open challenge anyone can accept
pub async fn challenge_open(State(state): State<AppState>) -> UpstreamReply<ChallengeResponse> {
    let created = state.client.challenge_open().await.map_err(upstream_error)?;
    Ok(Json(created.into()))
}

/// POST /api/challenge/:challenge_id/accept
pub async fn accept_challenge(
    State(state): State<AppState>,
    Path(challenge_id): Path<String>,
) -> UpstreamReply<StatusResponse> {
    state
        .client
        .accept_challenge(&challenge_id)
        .await
        .map_err(upstream_error)?;
    Ok(Json(StatusResponse::ok()))
}
