//! REST + SSE API for observers
//!
//! Server -> observer traffic flows over the SSE endpoint; observer ->
//! server operations are plain REST POSTs on the same router.

pub mod handlers;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use votechess_common::identity::IdentityResolver;
use votechess_common::sse::SseBroadcaster;

use crate::coordinator::CoordinatorHandle;
use crate::lichess::LichessClient;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: CoordinatorHandle,
    pub broadcaster: SseBroadcaster,
    pub client: Arc<LichessClient>,
    pub resolver: Arc<dyn IdentityResolver>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (no prefix for health endpoint)
        .route("/health", get(health_check))

        // API routes
        .nest("/api", Router::new()
            // Real-time observer feed
            .route("/events", get(handlers::events))

            // Voting
            .route("/vote", post(handlers::vote))
            .route("/mode", post(handlers::set_mode))

            // Game state
            .route("/status", get(handlers::status))
            .route("/game/:game_id/watch", post(handlers::watch_game))

            // Challenge workflow
            .route("/challenge/ai", post(handlers::challenge_ai))
            .route("/challenge/open", post(handlers::challenge_open))
            .route("/challenge/:challenge_id/accept", post(handlers::accept_challenge))
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "votechess-server",
        "version": env!("CARGO_PKG_VERSION"),
        "observers": state.broadcaster.client_count()
    }))
}
