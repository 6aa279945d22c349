//! Votechess server - main entry point
//!
//! Wires the upstream client, stream layer, coordinator task, and HTTP API
//! together and runs until SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use votechess_common::config::TomlConfig;
use votechess_common::identity::ForwardedIpResolver;
use votechess_common::sse::SseBroadcaster;
use votechess_server::api::{self, AppState};
use votechess_server::config::Settings;
use votechess_server::coordinator::Coordinator;
use votechess_server::lichess::stream::StreamManager;
use votechess_server::lichess::{GameBackend, LichessClient};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "votechess-server")]
#[command(about = "Crowd-voted chess against a live upstream opponent")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "VOTECHESS_PORT")]
    port: Option<u16>,

    /// Path to the TOML config file
    #[arg(short, long, env = "VOTECHESS_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "votechess_server=debug,votechess_common=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config_path = votechess_common::config::resolve_config_path(args.config.as_deref());
    let config =
        TomlConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    let settings = Settings::from_config(&config, args.port).context("Invalid configuration")?;

    let token = settings.token.clone().context(
        "Upstream API token not configured (set upstream.token or LICHESS_API_TOKEN)",
    )?;
    let client = Arc::new(
        LichessClient::new(settings.base_url.clone(), token)
            .context("Failed to create upstream client")?,
    );

    info!("Starting votechess server");
    if let Some(account) = &settings.account {
        info!("Controlled account: {}", account);
    }

    let shutdown = CancellationToken::new();
    let broadcaster = SseBroadcaster::new(256);

    let (mut coordinator, handle) = Coordinator::new(
        broadcaster.clone(),
        client.clone() as Arc<dyn GameBackend>,
        settings.coordinator_config(),
    );
    let streams = StreamManager::new(
        client.clone(),
        handle.sender(),
        settings.event_feed_settings(),
        settings.game_feed_settings(),
        shutdown.clone(),
    );
    streams.spawn_event_feed();
    coordinator.set_stream_manager(streams);
    tokio::spawn(coordinator.run(shutdown.clone()));

    let state = AppState {
        coordinator: handle,
        broadcaster,
        client,
        resolver: Arc::new(ForwardedIpResolver),
    };
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(settings.bind)
        .await
        .context("Failed to bind to address")?;
    info!("HTTP server listening on {}", settings.bind);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await
    .context("Server error")?;

    shutdown.cancel();
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }

    shutdown.cancel();
}
