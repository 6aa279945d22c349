//! Integration tests for the observer API endpoints
//!
//! Exercises routing and handler logic against a live coordinator task.
//! Connection info is injected as a request extension, standing in for the
//! connect-info middleware the real server installs.

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt; // for `oneshot` method

use votechess_common::identity::ForwardedIpResolver;
use votechess_common::sse::SseBroadcaster;
use votechess_server::api::{create_router, AppState};
use votechess_server::coordinator::{Coordinator, CoordinatorConfig, EngineEvent};
use votechess_server::lichess::messages::{GameMessage, GameStateBody, UserRef};
use votechess_server::lichess::{GameBackend, LichessClient};

/// Test helper: app state backed by a live coordinator and an upstream
/// client pointing nowhere (no test below reaches the network)
fn setup_app() -> (axum::Router, AppState, CancellationToken) {
    let broadcaster = SseBroadcaster::new(16);
    let client = Arc::new(LichessClient::new("http://127.0.0.1:1/api", "test-token").unwrap());
    let (coordinator, handle) = Coordinator::new(
        broadcaster.clone(),
        client.clone() as Arc<dyn GameBackend>,
        CoordinatorConfig {
            account: Some("crowd".into()),
            ..CoordinatorConfig::default()
        },
    );
    let shutdown = CancellationToken::new();
    tokio::spawn(coordinator.run(shutdown.clone()));

    let state = AppState {
        coordinator: handle,
        broadcaster,
        client,
        resolver: Arc::new(ForwardedIpResolver),
    };
    (create_router(state.clone()), state, shutdown)
}

/// Test helper: request carrying peer connection info
fn test_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let mut request = match body {
        Some(json) => builder.body(Body::from(json.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let peer: SocketAddr = "198.51.100.7:40000".parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(peer));
    request
}

/// Test helper: extract JSON body from a response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

/// Test helper: put the coordinator into an active game on white's turn
async fn start_game(state: &AppState) {
    let message = GameMessage::GameFull {
        id: "game1".into(),
        initial_fen: Some("startpos".into()),
        white: UserRef {
            id: Some("crowd".into()),
            name: None,
            ai_level: None,
        },
        black: UserRef {
            id: Some("opp".into()),
            name: None,
            ai_level: None,
        },
        state: GameStateBody {
            moves: String::new(),
            status: "started".into(),
            winner: None,
        },
    };
    state
        .coordinator
        .sender()
        .send(EngineEvent::Game {
            game_id: "game1".into(),
            message,
        })
        .await
        .unwrap();
    // Round-trip through the coordinator so the game is applied before the
    // request under test arrives
    let _ = state.coordinator.join_bundle().await;
}

#[tokio::test]
async fn health_reports_module_info() {
    let (app, _state, _shutdown) = setup_app();

    let response = app
        .oneshot(test_request("GET", "/health", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = extract_json(response.into_body()).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "votechess-server");
}

#[tokio::test]
async fn vote_without_a_round_is_rejected_with_reason() {
    let (app, _state, _shutdown) = setup_app();

    let response = app
        .oneshot(test_request(
            "POST",
            "/api/vote",
            Some(serde_json::json!({ "move": "e2e4" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = extract_json(response.into_body()).await;
    assert_eq!(json["type"], "voteRejected");
    assert_eq!(json["reason"], "no voting round in progress");
}

#[tokio::test]
async fn vote_during_a_round_is_accepted() {
    let (app, state, _shutdown) = setup_app();
    start_game(&state).await;

    let response = app
        .oneshot(test_request(
            "POST",
            "/api/vote",
            Some(serde_json::json!({ "move": "e2e4" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = extract_json(response.into_body()).await;
    assert_eq!(json["type"], "voteAccepted");
    assert_eq!(json["move"], "e2e4");
}

#[tokio::test]
async fn spectator_mode_set_over_the_api_blocks_votes() {
    let (app, state, _shutdown) = setup_app();
    start_game(&state).await;

    let response = app
        .clone()
        .oneshot(test_request(
            "POST",
            "/api/mode",
            Some(serde_json::json!({ "mode": "spectator" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(test_request(
            "POST",
            "/api/vote",
            Some(serde_json::json!({ "move": "e2e4" })),
        ))
        .await
        .unwrap();
    let json = extract_json(response.into_body()).await;
    assert_eq!(json["type"], "voteRejected");
    assert_eq!(json["reason"], "spectator mode");
}

#[tokio::test]
async fn status_reports_the_active_game_and_round() {
    let (app, state, _shutdown) = setup_app();
    start_game(&state).await;

    let response = app
        .oneshot(test_request("GET", "/api/status", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = extract_json(response.into_body()).await;
    assert_eq!(json["inProgress"], true);
    assert_eq!(json["game"]["gameId"], "game1");
    assert_eq!(json["game"]["controlledSide"], "white");
    assert_eq!(json["round"]["roundId"], 1);
    assert_eq!(json["round"]["eligibleMoves"].as_array().unwrap().len(), 20);
}

#[tokio::test]
async fn status_with_no_game_is_idle() {
    let (app, _state, _shutdown) = setup_app();

    let response = app
        .oneshot(test_request("GET", "/api/status", None))
        .await
        .unwrap();
    let json = extract_json(response.into_body()).await;
    assert_eq!(json["inProgress"], false);
    assert!(json["game"].is_null());
    assert!(json["round"].is_null());
}
