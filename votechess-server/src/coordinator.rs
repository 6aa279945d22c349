//! Crowd move coordination
//!
//! Single serialization point for all game and voting state. Stream
//! messages, vote submissions, deadline timers, and submission results all
//! arrive here as discrete events on one channel and are handled one at a
//! time, so no two mutations ever race. Network I/O runs in spawned tasks
//! that talk back exclusively by sending events or awaiting oneshot
//! replies. Event volume (chess moves, votes at human speed) sits far below
//! what one serialized handler can process.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use votechess_common::events::{GameView, ObserverMode, RoundView, ServerEvent, VoteReply};
use votechess_common::sse::SseBroadcaster;
use votechess_common::VoterId;

use crate::game::{GameSession, SyncState};
use crate::lichess::messages::{FeedEvent, GameMessage};
use crate::lichess::stream::{StreamKind, StreamManager, StreamStatus};
use crate::lichess::GameBackend;
use crate::voting::{tally, Resolution, RoundStatus, VoteRejection, VotingRound};

/// Everything that can mutate coordinator-owned state
#[derive(Debug)]
pub enum EngineEvent {
    /// Parsed message from the account-wide event feed
    Feed(FeedEvent),
    EventFeedConnected,
    GameFeedConnected {
        game_id: String,
    },
    /// Parsed message from the per-game feed
    Game {
        game_id: String,
        message: GameMessage,
    },
    StreamStatusChanged {
        kind: StreamKind,
        status: StreamStatus,
    },
    /// The armed round timer fired
    RoundDeadline {
        round_id: u64,
    },
    /// Outcome of an outbound move submission
    MoveSubmitted {
        round_id: u64,
        ok: bool,
    },
    SubmitVote {
        voter: VoterId,
        mv: String,
        reply: oneshot::Sender<VoteReply>,
    },
    SetMode {
        voter: VoterId,
        mode: ObserverMode,
    },
    /// Consistent read for a joining observer
    JoinBundle {
        reply: oneshot::Sender<JoinBundle>,
    },
    /// Manual request to watch a specific game
    WatchGame {
        game_id: String,
    },
}

/// One consistent read of game + round state for a joining observer
#[derive(Debug, Clone, Default)]
pub struct JoinBundle {
    pub game: Option<GameView>,
    pub round: Option<RoundView>,
}

impl JoinBundle {
    /// The exact backlog a joining observer receives: one snapshot, then
    /// one round-start if a round is in progress
    pub fn into_backlog(self) -> Vec<ServerEvent> {
        let round_started = self.round.as_ref().map(|round| ServerEvent::RoundStarted {
            round_id: round.round_id,
            deadline_ms: round.deadline_ms,
            eligible_moves: round.eligible_moves.clone(),
        });
        let mut backlog = vec![ServerEvent::StateSnapshot {
            game: self.game,
            round: self.round,
        }];
        backlog.extend(round_started);
        backlog
    }
}

/// Coordinator parameters from the configuration surface
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Account id whose side the crowd controls
    pub account: Option<String>,
    /// Challenges from this account are auto-accepted
    pub allowed_challenger: Option<String>,
    pub voting_duration: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            account: None,
            allowed_challenger: None,
            voting_duration: Duration::from_secs(90),
        }
    }
}

/// Cheap cloneable handle for talking to the coordinator task
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<EngineEvent>,
}

const UNAVAILABLE: &str = "service unavailable";

impl CoordinatorHandle {
    /// Raw sender for the stream layer
    pub fn sender(&self) -> mpsc::Sender<EngineEvent> {
        self.tx.clone()
    }

    pub async fn submit_vote(&self, voter: VoterId, mv: String) -> VoteReply {
        let (reply_tx, reply_rx) = oneshot::channel();
        let event = EngineEvent::SubmitVote {
            voter,
            mv,
            reply: reply_tx,
        };
        if self.tx.send(event).await.is_err() {
            return VoteReply::VoteRejected {
                reason: UNAVAILABLE.into(),
            };
        }
        reply_rx.await.unwrap_or(VoteReply::VoteRejected {
            reason: UNAVAILABLE.into(),
        })
    }

    pub async fn set_mode(&self, voter: VoterId, mode: ObserverMode) {
        let _ = self.tx.send(EngineEvent::SetMode { voter, mode }).await;
    }

    pub async fn join_bundle(&self) -> JoinBundle {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(EngineEvent::JoinBundle { reply: reply_tx })
            .await
            .is_err()
        {
            return JoinBundle::default();
        }
        reply_rx.await.unwrap_or_default()
    }

    pub async fn watch_game(&self, game_id: String) {
        let _ = self.tx.send(EngineEvent::WatchGame { game_id }).await;
    }
}

/// Owner of `GameSession` and `VotingRound`
pub struct Coordinator {
    rx: mpsc::Receiver<EngineEvent>,
    /// Cloned into timer and submission tasks so their results come back
    /// through the same serialized queue
    tx: mpsc::Sender<EngineEvent>,
    broadcaster: SseBroadcaster,
    backend: Arc<dyn GameBackend>,
    config: CoordinatorConfig,
    streams: Option<StreamManager>,
    session: Option<GameSession>,
    round: Option<VotingRound>,
    pending_resolution: Option<Resolution>,
    next_round_id: u64,
    modes: HashMap<VoterId, ObserverMode>,
    rng: StdRng,
    deadline_timer: Option<JoinHandle<()>>,
    game_feed_cancel: Option<CancellationToken>,
}

impl Coordinator {
    pub fn new(
        broadcaster: SseBroadcaster,
        backend: Arc<dyn GameBackend>,
        config: CoordinatorConfig,
    ) -> (Self, CoordinatorHandle) {
        Self::with_rng(broadcaster, backend, config, StdRng::from_entropy())
    }

    /// Seeded variant for reproducible resolution in tests
    pub fn with_rng(
        broadcaster: SseBroadcaster,
        backend: Arc<dyn GameBackend>,
        config: CoordinatorConfig,
        rng: StdRng,
    ) -> (Self, CoordinatorHandle) {
        let (tx, rx) = mpsc::channel(256);
        let handle = CoordinatorHandle { tx: tx.clone() };
        let coordinator = Self {
            rx,
            tx,
            broadcaster,
            backend,
            config,
            streams: None,
            session: None,
            round: None,
            pending_resolution: None,
            next_round_id: 0,
            modes: HashMap::new(),
            rng,
            deadline_timer: None,
            game_feed_cancel: None,
        };
        (coordinator, handle)
    }

    /// Attach the stream layer used to spawn per-game feeds. Tests drive
    /// game messages directly and skip this.
    pub fn set_stream_manager(&mut self, streams: StreamManager) {
        self.streams = Some(streams);
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Coordinator started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.rx.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                }
            }
        }
        self.clear_deadline_timer();
        info!("Coordinator stopped");
    }

    fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Feed(event) => self.handle_feed(event),
            EngineEvent::EventFeedConnected => debug!("Event feed ready"),
            EngineEvent::GameFeedConnected { game_id } => {
                // Upstream replays a full snapshot after every (re)connect,
                // which re-derives everything downstream
                info!("Game feed ready for {}", game_id);
            }
            EngineEvent::Game { game_id, message } => self.handle_game(&game_id, message),
            EngineEvent::StreamStatusChanged { kind, status } => {
                self.broadcaster.broadcast_lossy(ServerEvent::StreamStatus {
                    kind: kind.as_str().into(),
                    status: status.as_str().into(),
                });
            }
            EngineEvent::RoundDeadline { round_id } => self.handle_deadline(round_id),
            EngineEvent::MoveSubmitted { round_id, ok } => self.handle_submitted(round_id, ok),
            EngineEvent::SubmitVote { voter, mv, reply } => {
                let outcome = self.handle_vote(voter, mv);
                let _ = reply.send(outcome);
            }
            EngineEvent::SetMode { voter, mode } => {
                self.modes.insert(voter, mode);
            }
            EngineEvent::JoinBundle { reply } => {
                let _ = reply.send(self.join_bundle());
            }
            EngineEvent::WatchGame { game_id } => self.watch_game(game_id),
        }
    }

    fn handle_feed(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::GameStart { game } => match game.id() {
                Some(id) => self.watch_game(id.to_string()),
                None => warn!("gameStart without a game id"),
            },
            FeedEvent::GameFinish { game } => {
                let Some(id) = game.id() else { return };
                if self.session.as_ref().is_some_and(|s| s.game_id() == id) {
                    self.finish_game();
                } else {
                    debug!("gameFinish for unwatched game {}", id);
                }
            }
            FeedEvent::Challenge { challenge } => {
                let challenger_id = challenge
                    .challenger
                    .as_ref()
                    .and_then(|user| user.id.as_deref());
                let auto_accepted = match (&self.config.allowed_challenger, challenger_id) {
                    (Some(allowed), Some(challenger)) => allowed.eq_ignore_ascii_case(challenger),
                    _ => false,
                };
                if auto_accepted {
                    info!(
                        "Auto-accepting challenge {} from allowed challenger",
                        challenge.id
                    );
                    let backend = self.backend.clone();
                    let challenge_id = challenge.id.clone();
                    tokio::spawn(async move {
                        if let Err(e) = backend.accept_challenge(&challenge_id).await {
                            warn!("Failed to accept challenge {}: {}", challenge_id, e);
                        }
                    });
                }
                self.broadcaster
                    .broadcast_lossy(ServerEvent::ChallengeReceived {
                        challenge_id: challenge.id,
                        challenger: challenge.challenger.and_then(|user| user.name.or(user.id)),
                        auto_accepted,
                    });
            }
            FeedEvent::ChallengeCanceled { challenge } => {
                self.broadcaster
                    .broadcast_lossy(ServerEvent::ChallengeCanceled {
                        challenge_id: challenge.id,
                    });
            }
            FeedEvent::ChallengeDeclined { challenge } => {
                self.broadcaster
                    .broadcast_lossy(ServerEvent::ChallengeDeclined {
                        challenge_id: challenge.id,
                    });
            }
            FeedEvent::Unknown => {}
        }
    }

    fn handle_game(&mut self, game_id: &str, message: GameMessage) {
        let account = self.config.account.as_deref();
        let Some(session) = self.session.as_mut() else {
            debug!("Game message for {} with no session", game_id);
            return;
        };
        if session.game_id() != game_id {
            debug!("Game message for unwatched game {}", game_id);
            return;
        }

        let sync = match message {
            GameMessage::GameFull {
                initial_fen,
                white,
                black,
                state,
                ..
            } => {
                let mut sync = session.apply_full(
                    initial_fen.as_deref(),
                    &state.moves,
                    white.id.as_deref(),
                    black.id.as_deref(),
                    account,
                );
                if state.is_terminal() {
                    session.mark_over();
                    sync = SyncState {
                        our_turn: false,
                        game_over: true,
                    };
                }
                sync
            }
            GameMessage::GameState { state } => {
                session.apply_moves(&state.moves, state.is_terminal())
            }
            GameMessage::ChatLine {
                username,
                text,
                room,
            } => {
                self.broadcaster
                    .broadcast_lossy(ServerEvent::ChatLine { username, text, room });
                return;
            }
            GameMessage::Unknown => return,
        };

        self.after_sync(sync);
    }

    fn after_sync(&mut self, sync: SyncState) {
        self.broadcast_snapshot();

        if sync.game_over {
            self.finish_game();
        } else if sync.our_turn {
            if self.round.is_none() {
                self.start_round();
            }
        } else if self.round.is_some() {
            // Race with a just-submitted move: the turn moved on under an
            // active round; abandon it without resolving
            info!("Turn changed under an active round, cancelling it");
            self.cancel_round();
        }
    }

    fn broadcast_snapshot(&self) {
        self.broadcaster
            .broadcast_lossy(ServerEvent::StateSnapshot {
                game: self.session.as_ref().map(GameSession::to_view),
                round: self.voting_round_view(),
            });
    }

    fn voting_round_view(&self) -> Option<RoundView> {
        self.round
            .as_ref()
            .filter(|round| round.status() == RoundStatus::Voting)
            .map(VotingRound::to_view)
    }

    fn watch_game(&mut self, game_id: String) {
        if let Some(session) = &self.session {
            if session.game_id() == game_id && !session.is_over() {
                debug!("Already watching game {}", game_id);
                return;
            }
            if !session.is_over() {
                warn!(
                    "Ignoring game {} while {} is in progress",
                    game_id,
                    session.game_id()
                );
                return;
            }
        }

        self.teardown_game_feed();
        self.cancel_round();
        info!("Watching game {}", game_id);
        self.session = Some(GameSession::new(game_id.clone()));
        if let Some(streams) = &self.streams {
            self.game_feed_cancel = Some(streams.spawn_game_feed(&game_id));
        }
    }

    fn finish_game(&mut self) {
        self.cancel_round();
        if let Some(session) = self.session.as_mut() {
            session.mark_over();
            let game_id = session.game_id().to_string();
            info!("Game {} finished", game_id);
            self.broadcaster
                .broadcast_lossy(ServerEvent::GameEnded { game_id });
        }
        self.teardown_game_feed();
    }

    fn start_round(&mut self) {
        let eligible = match &self.session {
            Some(session) => session.legal_moves().to_vec(),
            None => return,
        };
        if eligible.is_empty() {
            // Defensive dead path: the synchronizer suppresses round start
            // on a finished game, so this implies game over
            warn!("Round requested with no eligible moves, treating as game over");
            self.finish_game();
            return;
        }
        self.start_round_with(eligible);
    }

    fn start_round_with(&mut self, eligible: Vec<String>) {
        self.next_round_id += 1;
        let round_id = self.next_round_id;
        let voting_duration = chrono::Duration::from_std(self.config.voting_duration)
            .unwrap_or_else(|_| chrono::Duration::seconds(90));
        let deadline = Utc::now() + voting_duration;
        let round = VotingRound::open(round_id, eligible, deadline);

        self.arm_deadline_timer(round_id, self.config.voting_duration);
        info!(
            "Voting round {} open until {} with {} eligible moves",
            round_id,
            deadline,
            round.eligible_moves().len()
        );
        self.broadcaster.broadcast_lossy(ServerEvent::RoundStarted {
            round_id,
            deadline_ms: deadline.timestamp_millis(),
            eligible_moves: round.eligible_moves().to_vec(),
        });
        self.round = Some(round);
        self.pending_resolution = None;
    }

    fn arm_deadline_timer(&mut self, round_id: u64, duration: Duration) {
        self.clear_deadline_timer();
        let tx = self.tx.clone();
        self.deadline_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(EngineEvent::RoundDeadline { round_id }).await;
        }));
    }

    fn clear_deadline_timer(&mut self) {
        if let Some(timer) = self.deadline_timer.take() {
            timer.abort();
        }
    }

    fn cancel_round(&mut self) {
        self.clear_deadline_timer();
        self.round = None;
        self.pending_resolution = None;
    }

    fn handle_deadline(&mut self, round_id: u64) {
        let Some(round) = self.round.as_mut() else {
            debug!("Deadline for already-cancelled round {}", round_id);
            return;
        };
        if round.round_id() != round_id || round.status() != RoundStatus::Voting {
            debug!("Stale deadline timer for round {}", round_id);
            return;
        }

        round.begin_resolving();
        let Some(resolution) = tally::resolve(round.ballots(), round.eligible_moves(), &mut self.rng)
        else {
            // Unreachable while rounds never open with an empty move set
            warn!("Round {} had no eligible moves at resolution", round_id);
            self.finish_game();
            return;
        };
        let Some(game_id) = self.session.as_ref().map(|s| s.game_id().to_string()) else {
            self.cancel_round();
            return;
        };

        info!(
            "Round {} resolved to {} ({} votes, fallback={}, tiebreak={})",
            round_id,
            resolution.mv,
            resolution.vote_count,
            resolution.was_random_fallback,
            resolution.was_tie_break
        );
        self.pending_resolution = Some(resolution.clone());

        let backend = self.backend.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let ok = match backend.submit_move(&game_id, &resolution.mv).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Move submission failed: {}", e);
                    false
                }
            };
            let _ = tx.send(EngineEvent::MoveSubmitted { round_id, ok }).await;
        });
    }

    fn handle_submitted(&mut self, round_id: u64, ok: bool) {
        match self.round.take() {
            Some(round)
                if round.round_id() == round_id && round.status() == RoundStatus::Resolving =>
            {
                if ok {
                    if let Some(res) = self.pending_resolution.take() {
                        self.broadcaster.broadcast_lossy(ServerEvent::RoundResolved {
                            mv: res.mv,
                            vote_count: res.vote_count,
                            was_random_fallback: res.was_random_fallback,
                            was_tie_break: res.was_tie_break,
                        });
                    }
                    // Round discarded; the next stream update opens the next
                    // round through the synchronizer
                } else {
                    // Transient upstream failure: fresh round over the same
                    // frozen move set, letting the crowd re-decide rather
                    // than retrying the resolved move
                    let mv = self
                        .pending_resolution
                        .take()
                        .map(|res| res.mv)
                        .unwrap_or_default();
                    self.broadcaster
                        .broadcast_lossy(ServerEvent::SubmissionFailed { mv });
                    self.start_round_with(round.into_eligible_moves());
                }
            }
            other => {
                self.round = other;
                debug!("Submission result for stale round {}", round_id);
            }
        }
    }

    fn handle_vote(&mut self, voter: VoterId, mv: String) -> VoteReply {
        let spectator =
            self.modes.get(&voter).copied().unwrap_or_default() == ObserverMode::Spectator;
        let result = if spectator {
            Err(VoteRejection::Spectator)
        } else {
            match self.round.as_mut() {
                None => Err(VoteRejection::NoRound),
                Some(round) => round.submit(voter, &mv, Utc::now()),
            }
        };

        match result {
            Ok(()) => {
                if let Some(round) = &self.round {
                    self.broadcaster.broadcast_lossy(ServerEvent::VoteTally {
                        counts: round.counts(),
                        total_votes: round.total_votes(),
                    });
                }
                VoteReply::VoteAccepted { mv }
            }
            Err(rejection) => VoteReply::VoteRejected {
                reason: rejection.to_string(),
            },
        }
    }

    fn join_bundle(&self) -> JoinBundle {
        JoinBundle {
            game: self.session.as_ref().map(GameSession::to_view),
            round: self.voting_round_view(),
        }
    }

    fn teardown_game_feed(&mut self) {
        if let Some(token) = self.game_feed_cancel.take() {
            token.cancel();
        }
    }
}
