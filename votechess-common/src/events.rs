//! Event types for the observer protocol
//!
//! Every message the server pushes to connected observers is a variant of
//! [`ServerEvent`]. Events are broadcast through the SSE fan-out and can be
//! serialized directly for transmission; the serde tag doubles as the SSE
//! event name so browser clients can `addEventListener` per variant.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A chess color, as reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::White => "white",
            Side::Black => "black",
        }
    }
}

/// Per-observer participation mode
///
/// Spectators receive every broadcast but have their votes rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObserverMode {
    #[default]
    Voter,
    Spectator,
}

/// Consistent view of the current game, assembled in a single read
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    pub game_id: String,
    pub fen: String,
    pub side_to_move: Side,
    pub controlled_side: Option<Side>,
    pub legal_moves: Vec<String>,
    pub is_over: bool,
    pub is_check: bool,
    pub is_checkmate: bool,
}

/// View of an in-progress voting round
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundView {
    pub round_id: u64,
    /// Absolute deadline, milliseconds since the UNIX epoch
    pub deadline_ms: i64,
    pub eligible_moves: Vec<String>,
    /// Aggregated per-move counts; never per-identity data
    pub counts: BTreeMap<String, u32>,
}

/// Server -> observer events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Full restatement of game/round state for a (re)joining observer
    StateSnapshot {
        game: Option<GameView>,
        round: Option<RoundView>,
    },

    /// A voting round opened
    RoundStarted {
        round_id: u64,
        deadline_ms: i64,
        eligible_moves: Vec<String>,
    },

    /// Aggregate vote counts changed
    VoteTally {
        counts: BTreeMap<String, u32>,
        total_votes: u32,
    },

    /// A round resolved and its move was submitted upstream
    RoundResolved {
        #[serde(rename = "move")]
        mv: String,
        vote_count: u32,
        was_random_fallback: bool,
        was_tie_break: bool,
    },

    /// The upstream service refused the resolved move; a fresh round follows
    SubmissionFailed {
        #[serde(rename = "move")]
        mv: String,
    },

    /// The game finished (mate, resignation, abort, ...)
    GameEnded { game_id: String },

    /// Chat relayed from the upstream game
    ChatLine {
        username: String,
        text: String,
        room: String,
    },

    /// Best-effort upstream stream health indicator
    StreamStatus { kind: String, status: String },

    /// An incoming challenge was observed on the event feed
    ChallengeReceived {
        challenge_id: String,
        challenger: Option<String>,
        auto_accepted: bool,
    },

    /// A previously observed challenge went away
    ChallengeCanceled { challenge_id: String },

    /// A challenge we issued was declined
    ChallengeDeclined { challenge_id: String },
}

impl ServerEvent {
    /// SSE event name; matches the serde tag
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::StateSnapshot { .. } => "stateSnapshot",
            ServerEvent::RoundStarted { .. } => "roundStarted",
            ServerEvent::VoteTally { .. } => "voteTally",
            ServerEvent::RoundResolved { .. } => "roundResolved",
            ServerEvent::SubmissionFailed { .. } => "submissionFailed",
            ServerEvent::GameEnded { .. } => "gameEnded",
            ServerEvent::ChatLine { .. } => "chatLine",
            ServerEvent::StreamStatus { .. } => "streamStatus",
            ServerEvent::ChallengeReceived { .. } => "challengeReceived",
            ServerEvent::ChallengeCanceled { .. } => "challengeCanceled",
            ServerEvent::ChallengeDeclined { .. } => "challengeDeclined",
        }
    }
}

/// Reply to a vote submission, surfaced to the submitting observer only
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum VoteReply {
    VoteAccepted {
        #[serde(rename = "move")]
        mv: String,
    },
    VoteRejected { reason: String },
}
