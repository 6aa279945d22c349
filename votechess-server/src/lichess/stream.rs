//! Stream resilience layer
//!
//! Keeps the two inbound NDJSON feeds alive and feeds well-formed messages
//! to the coordinator, isolating it from transport failures. Each feed runs
//! as its own task: a failure on one never tears down the other. Reconnect
//! is infinite-retry with capped exponential backoff, and a liveness
//! watchdog forces a reconnect when the upstream goes silent without
//! closing the connection.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coordinator::EngineEvent;
use crate::lichess::messages::{FeedEvent, GameMessage};
use crate::lichess::LichessClient;

/// Which inbound stream a status change refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    EventFeed,
    GameFeed,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::EventFeed => "eventFeed",
            StreamKind::GameFeed => "gameFeed",
        }
    }
}

/// Connection state, surfaced to observers as a best-effort indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Disconnected,
    Connecting,
    Connected,
    Degraded,
}

impl StreamStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamStatus::Disconnected => "disconnected",
            StreamStatus::Connecting => "connecting",
            StreamStatus::Connected => "connected",
            StreamStatus::Degraded => "degraded",
        }
    }
}

/// Per-feed reconnect and staleness parameters
#[derive(Debug, Clone, Copy)]
pub struct FeedSettings {
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub stale_after: Duration,
    pub watchdog_period: Duration,
}

/// Exponential backoff, capped: `min(max, base * 2^attempt)`
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(max)
}

/// Splits an arbitrary chunk sequence into complete newline-delimited lines
///
/// A line may arrive split across chunks; incomplete tails are buffered
/// until the closing newline shows up.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buf: Vec<u8>,
}

impl LineAssembler {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&raw[..raw.len() - 1]).into_owned());
        }
        lines
    }
}

#[derive(Debug, Clone)]
enum FeedTarget {
    Events,
    Game(String),
}

impl FeedTarget {
    fn kind(&self) -> StreamKind {
        match self {
            FeedTarget::Events => StreamKind::EventFeed,
            FeedTarget::Game(_) => StreamKind::GameFeed,
        }
    }

    fn connected_event(&self) -> EngineEvent {
        match self {
            FeedTarget::Events => EngineEvent::EventFeedConnected,
            FeedTarget::Game(game_id) => EngineEvent::GameFeedConnected {
                game_id: game_id.clone(),
            },
        }
    }
}

/// Spawns and parameterizes the feed tasks
pub struct StreamManager {
    client: Arc<LichessClient>,
    tx: mpsc::Sender<EngineEvent>,
    event_settings: FeedSettings,
    game_settings: FeedSettings,
    shutdown: CancellationToken,
}

impl StreamManager {
    pub fn new(
        client: Arc<LichessClient>,
        tx: mpsc::Sender<EngineEvent>,
        event_settings: FeedSettings,
        game_settings: FeedSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            tx,
            event_settings,
            game_settings,
            shutdown,
        }
    }

    /// Start the account-wide event feed; runs until process shutdown
    pub fn spawn_event_feed(&self) {
        tokio::spawn(run_feed(
            self.client.clone(),
            FeedTarget::Events,
            self.event_settings,
            self.tx.clone(),
            self.shutdown.child_token(),
        ));
    }

    /// Start a per-game feed; the returned token cancels it when the game
    /// ends or is replaced
    pub fn spawn_game_feed(&self, game_id: &str) -> CancellationToken {
        let token = self.shutdown.child_token();
        tokio::spawn(run_feed(
            self.client.clone(),
            FeedTarget::Game(game_id.to_string()),
            self.game_settings,
            self.tx.clone(),
            token.clone(),
        ));
        token
    }
}

enum ReadEnd {
    /// Upstream closed the stream or the transport errored
    Closed,
    /// Watchdog found the stream silent past its staleness threshold
    Stale,
    /// Cancellation requested or the coordinator is gone
    Shutdown,
}

async fn run_feed(
    client: Arc<LichessClient>,
    target: FeedTarget,
    settings: FeedSettings,
    tx: mpsc::Sender<EngineEvent>,
    shutdown: CancellationToken,
) {
    let kind = target.kind();
    let mut attempt: u32 = 0;

    loop {
        if shutdown.is_cancelled() {
            break;
        }
        if !send_status(&tx, kind, StreamStatus::Connecting).await {
            break;
        }

        let opened = tokio::select! {
            _ = shutdown.cancelled() => break,
            opened = open_target(&client, &target) => opened,
        };

        match opened {
            Ok(response) => {
                // Fresh connection: the attempt counter starts over
                attempt = 0;
                info!("{} connected", kind.as_str());
                if !send_status(&tx, kind, StreamStatus::Connected).await {
                    break;
                }
                if tx.send(target.connected_event()).await.is_err() {
                    break;
                }

                match read_stream(response.bytes_stream(), &target, settings, &tx, &shutdown).await
                {
                    ReadEnd::Shutdown => break,
                    ReadEnd::Stale => {
                        if !send_status(&tx, kind, StreamStatus::Degraded).await {
                            break;
                        }
                    }
                    ReadEnd::Closed => {}
                }
            }
            Err(e) => warn!("{} connect failed: {}", kind.as_str(), e),
        }

        if !send_status(&tx, kind, StreamStatus::Disconnected).await {
            break;
        }

        let delay = backoff_delay(attempt, settings.backoff_base, settings.backoff_max);
        attempt = attempt.saturating_add(1);
        warn!(
            "{} reconnecting in {:?} (attempt {})",
            kind.as_str(),
            delay,
            attempt
        );
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(delay) => {}
        }
    }

    debug!("{} task stopped", kind.as_str());
}

async fn open_target(
    client: &LichessClient,
    target: &FeedTarget,
) -> crate::error::Result<reqwest::Response> {
    match target {
        FeedTarget::Events => client.open_event_stream().await,
        FeedTarget::Game(game_id) => client.open_game_stream(game_id).await,
    }
}

async fn read_stream<S, B, E>(
    chunks: S,
    target: &FeedTarget,
    settings: FeedSettings,
    tx: &mpsc::Sender<EngineEvent>,
    shutdown: &CancellationToken,
) -> ReadEnd
where
    S: futures::Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let kind = target.kind();
    futures::pin_mut!(chunks);
    let mut assembler = LineAssembler::default();
    let mut last_message = Instant::now();

    let mut watchdog = interval(settings.watchdog_period);
    watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Interval fires immediately; consume the zero-delay tick
    watchdog.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return ReadEnd::Shutdown,

            _ = watchdog.tick() => {
                // Streaming APIs can stop sending without closing the
                // connection; treat prolonged silence as a dead transport
                if last_message.elapsed() >= settings.stale_after {
                    warn!(
                        "{} silent for at least {:?}, forcing reconnect",
                        kind.as_str(),
                        settings.stale_after
                    );
                    return ReadEnd::Stale;
                }
            }

            chunk = chunks.next() => match chunk {
                Some(Ok(bytes)) => {
                    last_message = Instant::now();
                    for line in assembler.push(bytes.as_ref()) {
                        // Blank lines are upstream keep-alives
                        if line.trim().is_empty() {
                            continue;
                        }
                        if !dispatch_line(target, &line, tx).await {
                            return ReadEnd::Shutdown;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!("{} transport error: {}", kind.as_str(), e);
                    return ReadEnd::Closed;
                }
                None => {
                    info!("{} closed by upstream", kind.as_str());
                    return ReadEnd::Closed;
                }
            }
        }
    }
}

/// Parse one line and hand it to the coordinator
///
/// A malformed line is logged and dropped, never fatal to the stream.
/// Returns false only when the coordinator is gone.
async fn dispatch_line(target: &FeedTarget, line: &str, tx: &mpsc::Sender<EngineEvent>) -> bool {
    let event = match target {
        FeedTarget::Events => match serde_json::from_str::<FeedEvent>(line) {
            Ok(FeedEvent::Unknown) => {
                debug!("Ignoring unrecognized event feed message");
                return true;
            }
            Ok(event) => EngineEvent::Feed(event),
            Err(e) => {
                warn!("Dropping malformed event feed line: {}", e);
                return true;
            }
        },
        FeedTarget::Game(game_id) => match serde_json::from_str::<GameMessage>(line) {
            Ok(GameMessage::Unknown) => {
                debug!("Ignoring unrecognized game feed message");
                return true;
            }
            Ok(message) => EngineEvent::Game {
                game_id: game_id.clone(),
                message,
            },
            Err(e) => {
                warn!("Dropping malformed game feed line: {}", e);
                return true;
            }
        },
    };

    tx.send(event).await.is_ok()
}

async fn send_status(
    tx: &mpsc::Sender<EngineEvent>,
    kind: StreamKind,
    status: StreamStatus,
) -> bool {
    tx.send(EngineEvent::StreamStatusChanged { kind, status })
        .await
        .is_ok()
}
