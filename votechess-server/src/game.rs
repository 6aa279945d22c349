//! Game state synchronizer
//!
//! Owns the authoritative [`GameSession`] derived from the upstream feed.
//! Every update rebuilds the position by replaying the full move list from
//! the initial position; the feed may resend overlapping or reordered move
//! lists and full replay sidesteps that entire class of bug. Recomputation
//! is cheap relative to stream latency.

use tracing::{info, warn};
use votechess_common::events::{GameView, Side};

use crate::rules::Board;

/// Authoritative view of the external game
///
/// Mutated only on receipt of a stream message; read by every other
/// component through the coordinator.
#[derive(Debug)]
pub struct GameSession {
    game_id: String,
    initial_fen: Option<String>,
    board: Board,
    controlled_side: Option<Side>,
    /// Controlled-side moves for the current position, recomputed fully on
    /// every update, never patched incrementally. Empty off-turn.
    legal_moves: Vec<String>,
    is_over: bool,
}

/// What the latest update means for round control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncState {
    pub our_turn: bool,
    pub game_over: bool,
}

impl GameSession {
    pub fn new(game_id: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            initial_fen: None,
            board: Board::startpos(),
            controlled_side: None,
            legal_moves: Vec::new(),
            is_over: false,
        }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn controlled_side(&self) -> Option<Side> {
        self.controlled_side
    }

    pub fn legal_moves(&self) -> &[String] {
        &self.legal_moves
    }

    pub fn is_over(&self) -> bool {
        self.is_over
    }

    /// Apply a full snapshot: initial position, move list, player identities
    ///
    /// Replays `moves` from the initial position. A move the rules adapter
    /// rejects is logged and skipped; the resulting position may be
    /// inconsistent until the next snapshot, which is an accepted degraded
    /// state.
    pub fn apply_full(
        &mut self,
        initial_fen: Option<&str>,
        moves: &str,
        white_id: Option<&str>,
        black_id: Option<&str>,
        account: Option<&str>,
    ) -> SyncState {
        self.initial_fen = initial_fen
            .filter(|fen| *fen != "startpos")
            .map(str::to_string);
        self.replay(moves);
        self.determine_controlled_side(white_id, black_id, account);
        self.refresh_derived()
    }

    /// Apply an incremental update carrying the move list so far
    ///
    /// Same replay-from-start strategy as a full snapshot. `upstream_over`
    /// marks updates whose status field reports a terminal game (resign,
    /// abort, timeout) that the board alone cannot see.
    pub fn apply_moves(&mut self, moves: &str, upstream_over: bool) -> SyncState {
        self.replay(moves);
        if upstream_over {
            self.is_over = true;
        }
        self.refresh_derived()
    }

    /// Mark the game finished from an out-of-band signal (event feed)
    pub fn mark_over(&mut self) {
        self.is_over = true;
        self.legal_moves.clear();
    }

    fn replay(&mut self, moves: &str) {
        self.board = match self.initial_fen.as_deref() {
            Some(fen) => Board::from_initial_fen(fen).unwrap_or_else(|e| {
                warn!("Invalid initial position ({}), replaying from startpos", e);
                Board::startpos()
            }),
            None => Board::startpos(),
        };

        for uci in moves.split_whitespace() {
            if let Err(e) = self.board.apply_uci(uci) {
                warn!("Skipping move rejected during replay: {}", e);
            }
        }
    }

    fn determine_controlled_side(
        &mut self,
        white_id: Option<&str>,
        black_id: Option<&str>,
        account: Option<&str>,
    ) {
        // Once determined, never reassigned within the session's lifetime
        if self.controlled_side.is_some() {
            return;
        }

        if let Some(account) = account {
            let matches = |id: Option<&str>| id.is_some_and(|id| id.eq_ignore_ascii_case(account));
            if matches(white_id) {
                self.controlled_side = Some(Side::White);
                info!("Controlling white as {}", account);
                return;
            }
            if matches(black_id) {
                self.controlled_side = Some(Side::Black);
                info!("Controlling black as {}", account);
                return;
            }
        }

        // Best-effort fallback: assume the side to move at first contact.
        // Known limitation: this can guess wrong for one round when the
        // snapshot arrives on the opponent's turn.
        let guessed = self.board.turn();
        warn!(
            "No player identity matched configured account, assuming controlled side {}",
            guessed.as_str()
        );
        self.controlled_side = Some(guessed);
    }

    fn refresh_derived(&mut self) -> SyncState {
        if self.board.is_game_over() {
            self.is_over = true;
        }

        let our_turn =
            !self.is_over && self.controlled_side == Some(self.board.turn());

        self.legal_moves = if our_turn {
            self.board.legal_moves_uci()
        } else {
            Vec::new()
        };

        SyncState {
            our_turn,
            game_over: self.is_over,
        }
    }

    /// Assemble the observer-facing view in a single consistent read
    pub fn to_view(&self) -> GameView {
        GameView {
            game_id: self.game_id.clone(),
            fen: self.board.fen(),
            side_to_move: self.board.turn(),
            controlled_side: self.controlled_side,
            legal_moves: self.legal_moves.clone(),
            is_over: self.is_over,
            is_check: self.board.is_check(),
            is_checkmate: self.board.is_checkmate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_session(moves: &str) -> (GameSession, SyncState) {
        let mut session = GameSession::new("game1");
        let state = session.apply_full(
            Some("startpos"),
            moves,
            Some("CrowdAccount"),
            Some("opponent"),
            Some("crowdaccount"),
        );
        (session, state)
    }

    #[test]
    fn full_snapshot_matches_account_case_insensitively() {
        let (session, state) = full_session("");
        assert_eq!(session.controlled_side(), Some(Side::White));
        assert!(state.our_turn);
        assert!(!state.game_over);
        assert_eq!(session.legal_moves().len(), 20);
    }

    #[test]
    fn off_turn_has_no_eligible_moves() {
        let (mut session, _) = full_session("");
        let state = session.apply_moves("e2e4", false);
        assert!(!state.our_turn);
        assert!(session.legal_moves().is_empty());
    }

    #[test]
    fn replay_is_idempotent() {
        let (mut session, _) = full_session("");
        session.apply_moves("e2e4 e7e5 g1f3", false);
        let first = (session.to_view().fen, session.legal_moves().to_vec());
        session.apply_moves("e2e4 e7e5 g1f3", false);
        let second = (session.to_view().fen, session.legal_moves().to_vec());
        assert_eq!(first, second);
    }

    #[test]
    fn rejected_replay_move_is_skipped() {
        let (mut session, _) = full_session("");
        // Second "move" is illegal and must not abort the replay
        let state = session.apply_moves("e2e4 e2e4 e7e5", false);
        assert!(state.our_turn);
        assert_eq!(session.to_view().side_to_move, Side::White);
    }

    #[test]
    fn controlled_side_is_never_reassigned() {
        let (mut session, _) = full_session("");
        session.apply_full(
            Some("startpos"),
            "",
            Some("someoneelse"),
            Some("crowdaccount"),
            Some("crowdaccount"),
        );
        assert_eq!(session.controlled_side(), Some(Side::White));
    }

    #[test]
    fn heuristic_fallback_assumes_side_to_move() {
        let mut session = GameSession::new("game2");
        let state = session.apply_full(Some("startpos"), "e2e4", None, None, None);
        assert_eq!(session.controlled_side(), Some(Side::Black));
        assert!(state.our_turn);
    }

    #[test]
    fn checkmate_marks_game_over_and_clears_moves() {
        let mut session = GameSession::new("game3");
        let state = session.apply_full(
            Some("startpos"),
            "f2f3 e7e5 g2g4 d8h4",
            Some("crowdaccount"),
            Some("opponent"),
            Some("crowdaccount"),
        );
        assert!(state.game_over);
        assert!(!state.our_turn);
        assert!(session.legal_moves().is_empty());
        assert!(session.to_view().is_checkmate);
    }

    #[test]
    fn upstream_terminal_status_overrides_live_board() {
        let (mut session, _) = full_session("");
        let state = session.apply_moves("e2e4 e7e5", true);
        assert!(state.game_over);
        assert!(!state.our_turn);
    }
}
