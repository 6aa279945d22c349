//! Inbound stream message types
//!
//! Wire shapes for the two upstream NDJSON feeds: the account-wide event
//! feed and the per-game feed. Unknown message types deserialize to
//! `Unknown` so new upstream event kinds never break the stream.

use serde::Deserialize;

/// A player slot in a full game snapshot or challenge
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Set instead of `id` for AI opponents
    pub ai_level: Option<u8>,
}

/// Game reference carried by event-feed messages
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRef {
    pub id: Option<String>,
    pub game_id: Option<String>,
}

impl GameRef {
    /// The feed has carried the id under both keys across API versions
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref().or(self.game_id.as_deref())
    }
}

/// Challenge reference carried by event-feed messages
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRef {
    pub id: String,
    pub url: Option<String>,
    pub challenger: Option<UserRef>,
    pub dest_user: Option<UserRef>,
}

/// Account-wide event feed messages
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FeedEvent {
    GameStart { game: GameRef },
    GameFinish { game: GameRef },
    Challenge { challenge: ChallengeRef },
    ChallengeCanceled { challenge: ChallengeRef },
    ChallengeDeclined { challenge: ChallengeRef },
    #[serde(other)]
    Unknown,
}

/// Moves-so-far plus upstream game status
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateBody {
    #[serde(default)]
    pub moves: String,
    #[serde(default = "default_status")]
    pub status: String,
    pub winner: Option<String>,
}

fn default_status() -> String {
    "started".to_string()
}

impl GameStateBody {
    /// Terminal statuses the board alone cannot detect (resign, timeout,
    /// abort, ...)
    pub fn is_terminal(&self) -> bool {
        !matches!(self.status.as_str(), "created" | "started")
    }
}

/// Per-game feed messages
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GameMessage {
    GameFull {
        #[serde(default)]
        id: String,
        initial_fen: Option<String>,
        #[serde(default)]
        white: UserRef,
        #[serde(default)]
        black: UserRef,
        state: GameStateBody,
    },
    GameState {
        #[serde(flatten)]
        state: GameStateBody,
    },
    ChatLine {
        username: String,
        text: String,
        room: String,
    },
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_game_start_event() {
        let line = r#"{"type":"gameStart","game":{"gameId":"abc123","color":"white"}}"#;
        match serde_json::from_str::<FeedEvent>(line).unwrap() {
            FeedEvent::GameStart { game } => assert_eq!(game.id(), Some("abc123")),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn parses_challenge_event() {
        let line = r#"{"type":"challenge","challenge":{"id":"ch1","url":"https://example/ch1","challenger":{"id":"friend","name":"Friend"}}}"#;
        match serde_json::from_str::<FeedEvent>(line).unwrap() {
            FeedEvent::Challenge { challenge } => {
                assert_eq!(challenge.id, "ch1");
                assert_eq!(challenge.challenger.unwrap().id.as_deref(), Some("friend"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn unknown_event_type_does_not_fail() {
        let line = r#"{"type":"somethingNew","payload":{"x":1}}"#;
        assert!(matches!(
            serde_json::from_str::<FeedEvent>(line).unwrap(),
            FeedEvent::Unknown
        ));
    }

    #[test]
    fn parses_game_full() {
        let line = r#"{"type":"gameFull","id":"abc123","initialFen":"startpos",
            "white":{"id":"crowd","name":"Crowd"},"black":{"aiLevel":3},
            "state":{"type":"gameState","moves":"e2e4 e7e5","status":"started"}}"#;
        match serde_json::from_str::<GameMessage>(line).unwrap() {
            GameMessage::GameFull {
                id,
                initial_fen,
                white,
                black,
                state,
            } => {
                assert_eq!(id, "abc123");
                assert_eq!(initial_fen.as_deref(), Some("startpos"));
                assert_eq!(white.id.as_deref(), Some("crowd"));
                assert_eq!(black.ai_level, Some(3));
                assert_eq!(state.moves, "e2e4 e7e5");
                assert!(!state.is_terminal());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn parses_game_state_with_terminal_status() {
        let line = r#"{"type":"gameState","moves":"e2e4 e7e5 d1h5","status":"resign","winner":"white"}"#;
        match serde_json::from_str::<GameMessage>(line).unwrap() {
            GameMessage::GameState { state } => {
                assert!(state.is_terminal());
                assert_eq!(state.winner.as_deref(), Some("white"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn parses_chat_line() {
        let line = r#"{"type":"chatLine","username":"spectator1","text":"gg","room":"spectator"}"#;
        match serde_json::from_str::<GameMessage>(line).unwrap() {
            GameMessage::ChatLine { username, text, room } => {
                assert_eq!(username, "spectator1");
                assert_eq!(text, "gg");
                assert_eq!(room, "spectator");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
