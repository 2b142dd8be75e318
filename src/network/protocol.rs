//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are serialized as JSON tagged enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::event::EventRecord;

/// Session identifier on the wire.
pub type SessionId = Uuid;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind a display name to this connection.
    Login {
        /// Chosen display name.
        player_name: String,
    },

    /// Enter the duel lobby and receive waiting sessions.
    EnterLobby,

    /// Leave the duel lobby.
    LeaveLobby,

    /// Create a waiting duel session.
    CreateGame {
        /// Host display name.
        host_name: String,
        /// Number of cards to deal.
        rounds: u8,
    },

    /// Attempt to join a waiting session.
    JoinGame {
        /// Target session.
        session_id: SessionId,
        /// Joiner display name.
        joiner_name: String,
    },

    /// Claim that this player finished ordering their cards.
    DuelWin {
        /// Session the claim is for.
        session_id: SessionId,
        /// Claimant display name.
        claimant_name: String,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp echoed back in the pong.
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Current waiting sessions, sent to lobby subscribers.
    LobbyUpdate {
        /// Sessions still waiting for an opponent.
        sessions: Vec<WaitingSessionInfo>,
    },

    /// Reply to the creator of a new session.
    GameCreated {
        /// Identifier of the created session.
        session_id: SessionId,
    },

    /// The duel begins; both players receive the identical hand.
    GameStart {
        /// Session the duel runs under.
        session_id: SessionId,
        /// Dealt cards, identical for both players.
        events: Vec<EventRecord>,
        /// The other player's display name.
        opponent_name: String,
    },

    /// The duel is over.
    DuelResult {
        /// Session the result is for.
        session_id: SessionId,
        /// Display name of the winner.
        winner_name: String,
    },

    /// The game could not start; the session is gone. Non-retryable.
    GameAborted {
        /// Session that was destroyed.
        session_id: SessionId,
        /// Why the game could not start.
        code: ErrorCode,
        /// Human-readable reason.
        reason: String,
    },

    /// Error message.
    Error(ServerError),

    /// Pong response.
    Pong {
        /// Echo of the client timestamp.
        timestamp: u64,
        /// Server wall-clock millis.
        server_time: u64,
    },

    /// Server is shutting down.
    Shutdown {
        /// Human-readable reason.
        reason: String,
    },
}

/// A waiting session as shown in the lobby.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitingSessionInfo {
    /// Session identifier, used to join.
    pub session_id: SessionId,
    /// Host display name.
    pub host_name: String,
    /// Number of cards the duel will deal.
    pub rounds: u8,
    /// When the host opened the session.
    pub created_at: DateTime<Utc>,
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Not enough events in the catalog to deal a hand.
    InsufficientCatalog,
    /// Join target is gone, full, or was won by a racing joiner.
    SessionUnavailable,
    /// Malformed rounds or name.
    InvalidRequest,
    /// Connection has not sent a login yet.
    NotLoggedIn,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::event::Difficulty;

    #[test]
    fn client_message_json_roundtrip() {
        let msg = ClientMessage::CreateGame {
            host_name: "Elena".to_string(),
            rounds: 3,
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains("create_game"));

        let parsed = ClientMessage::from_json(&json).unwrap();
        if let ClientMessage::CreateGame { host_name, rounds } = parsed {
            assert_eq!(host_name, "Elena");
            assert_eq!(rounds, 3);
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn join_game_parses_session_id() {
        let id = Uuid::new_v4();
        let json = format!(
            r#"{{"type":"join_game","session_id":"{id}","joiner_name":"Pablo"}}"#
        );
        let parsed = ClientMessage::from_json(&json).unwrap();
        assert!(matches!(
            parsed,
            ClientMessage::JoinGame { session_id, .. } if session_id == id
        ));
    }

    #[test]
    fn game_start_carries_events() {
        let msg = ServerMessage::GameStart {
            session_id: Uuid::new_v4(),
            events: vec![EventRecord {
                id: Uuid::new_v4(),
                title: "Moon landing".to_string(),
                year: 1969,
                exact_date: Some("1969-07-20".parse().unwrap()),
                image_url: None,
                difficulty: Difficulty::Normal,
            }],
            opponent_name: "Alfonso".to_string(),
        };

        let json = msg.to_json().unwrap();
        let parsed = ServerMessage::from_json(&json).unwrap();
        if let ServerMessage::GameStart { events, opponent_name, .. } = parsed {
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].year, 1969);
            assert_eq!(opponent_name, "Alfonso");
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn error_codes_snake_case() {
        let msg = ServerMessage::Error(ServerError {
            code: ErrorCode::SessionUnavailable,
            message: "session is gone".to_string(),
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains("session_unavailable"));
    }

    #[test]
    fn invalid_message_rejected() {
        assert!(ClientMessage::from_json("{\"type\":\"warp_drive\"}").is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }
}
