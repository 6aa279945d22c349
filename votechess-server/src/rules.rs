//! Rules adapter
//!
//! Thin wrapper around `shakmaty` exposing exactly what the synchronizer and
//! voting machinery need: position replay from a move list, UCI legal-move
//! enumeration, and turn/check/mate/game-over queries. Chess rules are
//! consumed here, never implemented.

use shakmaty::{
    fen::Fen, uci::UciMove, CastlingMode, Chess, Color, EnPassantMode, Position,
};
use thiserror::Error;
use votechess_common::events::Side;

#[derive(Error, Debug)]
pub enum RulesError {
    #[error("invalid FEN: {0}")]
    InvalidFen(String),

    #[error("move {0} is not legal in the current position")]
    IllegalMove(String),
}

pub(crate) fn to_side(color: Color) -> Side {
    match color {
        Color::White => Side::White,
        Color::Black => Side::Black,
    }
}

/// Authoritative board position
#[derive(Debug, Clone)]
pub struct Board {
    pos: Chess,
}

impl Board {
    /// Standard starting position
    pub fn startpos() -> Self {
        Self {
            pos: Chess::default(),
        }
    }

    /// Position from an initial FEN; `"startpos"` is accepted as an alias
    pub fn from_initial_fen(fen: &str) -> Result<Self, RulesError> {
        if fen == "startpos" {
            return Ok(Self::startpos());
        }
        let parsed: Fen = fen
            .parse()
            .map_err(|_| RulesError::InvalidFen(fen.to_string()))?;
        let pos = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|_| RulesError::InvalidFen(fen.to_string()))?;
        Ok(Self { pos })
    }

    /// Apply one move in UCI coordinate notation (`e2e4`, `e7e8q`)
    pub fn apply_uci(&mut self, uci: &str) -> Result<(), RulesError> {
        let parsed: UciMove = uci
            .parse()
            .map_err(|_| RulesError::IllegalMove(uci.to_string()))?;
        let mv = parsed
            .to_move(&self.pos)
            .map_err(|_| RulesError::IllegalMove(uci.to_string()))?;
        self.pos.play_unchecked(&mv);
        Ok(())
    }

    /// All legal moves for the side to move, as UCI strings
    pub fn legal_moves_uci(&self) -> Vec<String> {
        self.pos
            .legal_moves()
            .into_iter()
            .map(|mv| UciMove::from_move(&mv, CastlingMode::Standard).to_string())
            .collect()
    }

    pub fn turn(&self) -> Side {
        to_side(self.pos.turn())
    }

    pub fn fen(&self) -> String {
        Fen::from_position(self.pos.clone(), EnPassantMode::Legal).to_string()
    }

    pub fn is_game_over(&self) -> bool {
        self.pos.is_game_over()
    }

    pub fn is_check(&self) -> bool {
        self.pos.is_check()
    }

    pub fn is_checkmate(&self) -> bool {
        self.pos.is_checkmate()
    }
}
