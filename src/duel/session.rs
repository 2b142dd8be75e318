//! Duel Sessions
//!
//! One duel's shared lifecycle record: lobby entry, paired game, result.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::catalog::event::EventRecord;
use crate::network::protocol::{ServerMessage, WaitingSessionInfo};

/// Unique session identifier.
pub type SessionId = Uuid;

/// Unique connection identifier, assigned per WebSocket connection.
pub type ConnectionId = Uuid;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Host is waiting for an opponent; listed in the lobby.
    Waiting,
    /// Paired and dealt; the race is on.
    Playing,
    /// Winner declared. Terminal.
    Finished,
}

/// A player attached to a session.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Connection the player is reachable on.
    pub connection: ConnectionId,
    /// Display name.
    pub name: String,
    /// Message channel to this player.
    pub sender: mpsc::Sender<ServerMessage>,
}

/// A duel session.
///
/// Invariants upheld by the matchmaker and referee:
/// - `participants.len()` is 1 or 2, never 0 while the session exists
/// - at rest, `Waiting` holds exactly one participant
/// - `Playing` implies `dealt_events` is populated and immutable
#[derive(Debug, Clone)]
pub struct DuelSession {
    /// Unique identifier.
    pub id: SessionId,
    /// Display name of the host.
    pub host_name: String,
    /// Number of cards the duel deals.
    pub requested_rounds: u8,
    /// The host, then the joiner.
    pub participants: Vec<Participant>,
    /// Lifecycle state.
    pub state: SessionState,
    /// The fixed hand, set when play begins.
    pub dealt_events: Vec<EventRecord>,
    /// When the host opened the session.
    pub created_at: DateTime<Utc>,
}

impl DuelSession {
    /// Create a waiting session with the host as its sole participant.
    pub fn new(host: Participant, rounds: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            host_name: host.name.clone(),
            requested_rounds: rounds,
            participants: vec![host],
            state: SessionState::Waiting,
            dealt_events: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Lobby listing entry for this session.
    pub fn waiting_info(&self) -> WaitingSessionInfo {
        WaitingSessionInfo {
            session_id: self.id,
            host_name: self.host_name.clone(),
            rounds: self.requested_rounds,
            created_at: self.created_at,
        }
    }

    /// Whether `name` belongs to one of the participants.
    pub fn has_participant(&self, name: &str) -> bool {
        self.participants.iter().any(|p| p.name == name)
    }

    /// The participant that is not `name`, if both seats are filled.
    pub fn opponent_of(&self, name: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.name != name)
    }

    /// Send a message to every participant.
    pub async fn broadcast(&self, message: ServerMessage) {
        for participant in &self.participants {
            let _ = participant.sender.send(message.clone()).await;
        }
    }
}
