//! Matchmaker
//!
//! State machine governing duel sessions: creation, joining, transition to
//! active play, and termination. Lobby changes go out through the
//! subscription-scoped [`LobbyChannel`].
//!
//! Session states: `Waiting -> Playing -> Finished`, with removal from
//! `Waiting` on host cancellation or disconnect.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::catalog::selector::{CardSelector, SelectError};
use crate::catalog::store::CatalogService;
use crate::duel::session::{ConnectionId, DuelSession, Participant, SessionId, SessionState};
use crate::duel::store::SessionStore;
use crate::network::lobby::LobbyChannel;
use crate::network::protocol::{ErrorCode, ServerMessage, WaitingSessionInfo};

/// Maximum accepted display-name length.
const MAX_NAME_LEN: usize = 32;

/// Bounds on duel hand sizes.
#[derive(Debug, Clone, Copy)]
pub struct MatchRules {
    /// Smallest allowed hand.
    pub min_rounds: u8,
    /// Largest allowed hand.
    pub max_rounds: u8,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            min_rounds: 2,
            max_rounds: 10,
        }
    }
}

/// Matchmaking errors, surfaced to the requesting client only.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MatchmakingError {
    /// Malformed rounds or name, rejected at the boundary.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Join target is gone, full, owned by the joiner, or was won by a
    /// racing joiner.
    #[error("session is unavailable")]
    SessionUnavailable,
}

/// How a successful `join_game` call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Cards dealt, both players received `game_start`.
    Started,
    /// Card selection failed; both players received `game_aborted` and the
    /// session is gone. Non-retryable.
    Aborted,
}

/// Pairs hosts and joiners into duels.
pub struct Matchmaker<S, C> {
    store: Arc<S>,
    selector: CardSelector<C>,
    lobby: Arc<LobbyChannel>,
    rules: MatchRules,
}

impl<S: SessionStore, C: CatalogService> Matchmaker<S, C> {
    /// Create a matchmaker over the given store, catalog and lobby.
    pub fn new(store: Arc<S>, catalog: Arc<C>, lobby: Arc<LobbyChannel>, rules: MatchRules) -> Self {
        Self {
            store,
            selector: CardSelector::new(catalog),
            lobby,
            rules,
        }
    }

    /// Subscribe a connection to lobby updates and return the current
    /// waiting list to that caller only.
    pub async fn enter_lobby(
        &self,
        connection: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Vec<WaitingSessionInfo> {
        self.lobby.subscribe(connection, sender).await;
        self.waiting_sessions().await
    }

    /// Unsubscribe a connection from lobby updates.
    pub async fn leave_lobby(&self, connection: &ConnectionId) {
        self.lobby.unsubscribe(connection).await;
    }

    /// Create a waiting session hosted by `host_name` and publish the
    /// updated waiting list to lobby subscribers.
    pub async fn create_game(
        &self,
        connection: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
        host_name: &str,
        rounds: u8,
    ) -> Result<SessionId, MatchmakingError> {
        let host_name = validate_name(host_name)?;
        if rounds < self.rules.min_rounds || rounds > self.rules.max_rounds {
            return Err(MatchmakingError::InvalidRequest(format!(
                "rounds must be between {} and {}",
                self.rules.min_rounds, self.rules.max_rounds
            )));
        }

        let host = Participant {
            connection,
            name: host_name.to_string(),
            sender,
        };
        let session = DuelSession::new(host, rounds);
        let id = self.store.create(session).await;

        info!(session = %id, host = host_name, rounds, "duel session created");
        self.publish_lobby().await;

        Ok(id)
    }

    /// Attempt to pair `joiner_name` into a waiting session.
    ///
    /// The `Waiting -> Playing` CAS decides races: of two concurrent joins
    /// on the same session exactly one proceeds, the other observes
    /// `SessionUnavailable`.
    pub async fn join_game(
        &self,
        connection: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
        session_id: SessionId,
        joiner_name: &str,
    ) -> Result<JoinOutcome, MatchmakingError> {
        let joiner_name = validate_name(joiner_name)?;

        let snapshot = self
            .store
            .get(&session_id)
            .await
            .ok_or(MatchmakingError::SessionUnavailable)?;

        if snapshot.state != SessionState::Waiting
            || snapshot.participants.len() >= 2
            || snapshot.host_name == joiner_name
        {
            return Err(MatchmakingError::SessionUnavailable);
        }

        // The race-safety point. A second joiner that squeezed past the
        // checks above loses here.
        if !self
            .store
            .try_transition(&session_id, SessionState::Waiting, SessionState::Playing)
            .await
        {
            debug!(session = %session_id, joiner = joiner_name, "lost join race");
            return Err(MatchmakingError::SessionUnavailable);
        }

        self.store
            .add_participant(
                &session_id,
                Participant {
                    connection,
                    name: joiner_name.to_string(),
                    sender,
                },
            )
            .await;

        // The session left Waiting; drop it from the public lobby at once.
        self.publish_lobby().await;

        let rounds = snapshot.requested_rounds as usize;
        match self.selector.select_cards(rounds, None).await {
            Ok(events) => {
                self.store.set_dealt_events(&session_id, events.clone()).await;

                let session = match self.store.get(&session_id).await {
                    Some(s) => s,
                    None => return Err(MatchmakingError::SessionUnavailable),
                };

                for participant in &session.participants {
                    let opponent = session
                        .opponent_of(&participant.name)
                        .map(|p| p.name.clone())
                        .unwrap_or_default();
                    let _ = participant
                        .sender
                        .send(ServerMessage::GameStart {
                            session_id,
                            events: events.clone(),
                            opponent_name: opponent,
                        })
                        .await;
                }

                info!(
                    session = %session_id,
                    host = %session.host_name,
                    joiner = joiner_name,
                    cards = events.len(),
                    "duel started"
                );
                Ok(JoinOutcome::Started)
            }
            Err(e) => {
                warn!(session = %session_id, error = %e, "card selection failed, aborting duel");

                let (code, reason) = match e {
                    SelectError::InsufficientCatalog { .. } => (
                        ErrorCode::InsufficientCatalog,
                        "not enough events to deal a hand".to_string(),
                    ),
                    SelectError::Catalog(e) => (ErrorCode::InternalError, e.to_string()),
                };

                if let Some(session) = self.store.get(&session_id).await {
                    session
                        .broadcast(ServerMessage::GameAborted {
                            session_id,
                            code,
                            reason,
                        })
                        .await;
                }
                self.store.remove(&session_id).await;
                Ok(JoinOutcome::Aborted)
            }
        }
    }

    /// Clean up after a connection goes away: drop its lobby subscription
    /// and remove any waiting session it hosts.
    pub async fn cancel_for_connection(&self, connection: &ConnectionId) {
        self.lobby.unsubscribe(connection).await;

        let abandoned: Vec<SessionId> = self
            .store
            .list_waiting()
            .await
            .into_iter()
            .filter(|s| s.participants.iter().any(|p| &p.connection == connection))
            .map(|s| s.id)
            .collect();

        if abandoned.is_empty() {
            return;
        }

        for id in &abandoned {
            info!(session = %id, "removing waiting session, host disconnected");
            self.store.remove(id).await;
        }
        self.publish_lobby().await;
    }

    /// Current waiting list, as shown in the lobby.
    pub async fn waiting_sessions(&self) -> Vec<WaitingSessionInfo> {
        self.store
            .list_waiting()
            .await
            .iter()
            .map(DuelSession::waiting_info)
            .collect()
    }

    async fn publish_lobby(&self) {
        let sessions = self.waiting_sessions().await;
        self.lobby
            .publish(ServerMessage::LobbyUpdate { sessions })
            .await;
    }
}

fn validate_name(name: &str) -> Result<&str, MatchmakingError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(MatchmakingError::InvalidRequest(
            "name must not be empty".to_string(),
        ));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(MatchmakingError::InvalidRequest(format!(
            "name longer than {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::event::{Difficulty, EventRecord};
    use crate::catalog::store::MemoryCatalog;
    use crate::duel::store::MemorySessionStore;
    use uuid::Uuid;

    fn event(year: i32) -> EventRecord {
        EventRecord {
            id: Uuid::new_v4(),
            title: format!("event {year}"),
            year,
            exact_date: None,
            image_url: None,
            difficulty: Difficulty::Normal,
        }
    }

    fn matchmaker_with_catalog(
        events: Vec<EventRecord>,
    ) -> (
        Arc<MemorySessionStore>,
        Matchmaker<MemorySessionStore, MemoryCatalog>,
    ) {
        let store = Arc::new(MemorySessionStore::new());
        let catalog = Arc::new(MemoryCatalog::with_events(events));
        let lobby = Arc::new(LobbyChannel::new());
        let mm = Matchmaker::new(store.clone(), catalog, lobby, MatchRules::default());
        (store, mm)
    }

    fn big_catalog() -> Vec<EventRecord> {
        (0..40).map(|y| event(1900 + y)).collect()
    }

    fn channel() -> (
        mpsc::Sender<ServerMessage>,
        mpsc::Receiver<ServerMessage>,
    ) {
        mpsc::channel(16)
    }

    #[tokio::test]
    async fn create_game_rejects_out_of_bounds_rounds() {
        let (_store, mm) = matchmaker_with_catalog(big_catalog());
        let (tx, _rx) = channel();

        for rounds in [0, 1, 11, 255] {
            let result = mm
                .create_game(Uuid::new_v4(), tx.clone(), "Elena", rounds)
                .await;
            assert!(matches!(result, Err(MatchmakingError::InvalidRequest(_))));
        }
    }

    #[tokio::test]
    async fn create_game_rejects_blank_name() {
        let (_store, mm) = matchmaker_with_catalog(big_catalog());
        let (tx, _rx) = channel();

        let result = mm.create_game(Uuid::new_v4(), tx, "   ", 3).await;
        assert!(matches!(result, Err(MatchmakingError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn created_session_is_waiting_with_one_participant() {
        let (store, mm) = matchmaker_with_catalog(big_catalog());
        let (tx, _rx) = channel();

        let id = mm.create_game(Uuid::new_v4(), tx, "Elena", 3).await.unwrap();

        let session = store.get(&id).await.unwrap();
        assert_eq!(session.state, SessionState::Waiting);
        assert_eq!(session.participants.len(), 1);
        assert!(session.dealt_events.is_empty());

        let waiting = mm.waiting_sessions().await;
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].session_id, id);
    }

    #[tokio::test]
    async fn lobby_subscribers_see_new_sessions() {
        let (_store, mm) = matchmaker_with_catalog(big_catalog());
        let (lobby_tx, mut lobby_rx) = channel();
        let (host_tx, _host_rx) = channel();

        let snapshot = mm.enter_lobby(Uuid::new_v4(), lobby_tx).await;
        assert!(snapshot.is_empty());

        mm.create_game(Uuid::new_v4(), host_tx, "Elena", 3)
            .await
            .unwrap();

        match lobby_rx.recv().await {
            Some(ServerMessage::LobbyUpdate { sessions }) => {
                assert_eq!(sessions.len(), 1);
                assert_eq!(sessions[0].host_name, "Elena");
            }
            other => panic!("expected lobby update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn join_delivers_identical_hands_to_both() {
        let (store, mm) = matchmaker_with_catalog(big_catalog());
        let (host_tx, mut host_rx) = channel();
        let (joiner_tx, mut joiner_rx) = channel();

        let id = mm
            .create_game(Uuid::new_v4(), host_tx, "Elena", 3)
            .await
            .unwrap();

        let outcome = mm
            .join_game(Uuid::new_v4(), joiner_tx, id, "Pablo")
            .await
            .unwrap();
        assert_eq!(outcome, JoinOutcome::Started);

        let host_msg = host_rx.recv().await.unwrap();
        let joiner_msg = joiner_rx.recv().await.unwrap();

        let (host_events, host_opponent) = match host_msg {
            ServerMessage::GameStart { events, opponent_name, .. } => (events, opponent_name),
            other => panic!("expected game start, got {other:?}"),
        };
        let (joiner_events, joiner_opponent) = match joiner_msg {
            ServerMessage::GameStart { events, opponent_name, .. } => (events, opponent_name),
            other => panic!("expected game start, got {other:?}"),
        };

        assert_eq!(host_events, joiner_events);
        assert_eq!(host_events.len(), 3);
        assert_eq!(host_opponent, "Pablo");
        assert_eq!(joiner_opponent, "Elena");
        for (i, a) in host_events.iter().enumerate() {
            for b in &host_events[i + 1..] {
                assert!(!a.conflicts_with(b));
            }
        }

        let session = store.get(&id).await.unwrap();
        assert_eq!(session.state, SessionState::Playing);
        assert_eq!(session.participants.len(), 2);
        assert_eq!(session.dealt_events.len(), 3);
        assert!(mm.waiting_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn join_missing_session_is_unavailable() {
        let (_store, mm) = matchmaker_with_catalog(big_catalog());
        let (tx, _rx) = channel();

        let result = mm
            .join_game(Uuid::new_v4(), tx, Uuid::new_v4(), "Pablo")
            .await;
        assert!(matches!(result, Err(MatchmakingError::SessionUnavailable)));
    }

    #[tokio::test]
    async fn host_cannot_join_own_game() {
        let (_store, mm) = matchmaker_with_catalog(big_catalog());
        let (host_tx, _host_rx) = channel();
        let (tx, _rx) = channel();

        let id = mm
            .create_game(Uuid::new_v4(), host_tx, "Elena", 3)
            .await
            .unwrap();

        let result = mm.join_game(Uuid::new_v4(), tx, id, "Elena").await;
        assert!(matches!(result, Err(MatchmakingError::SessionUnavailable)));
    }

    #[tokio::test]
    async fn concurrent_joins_exactly_one_succeeds() {
        let (store, mm) = matchmaker_with_catalog(big_catalog());
        let mm = Arc::new(mm);
        let (host_tx, _host_rx) = channel();

        let id = mm
            .create_game(Uuid::new_v4(), host_tx, "Elena", 3)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for name in ["Pablo", "Alfonso"] {
            let mm = mm.clone();
            let (tx, _rx) = channel();
            handles.push(tokio::spawn(async move {
                mm.join_game(Uuid::new_v4(), tx, id, name).await
            }));
        }

        let mut started = 0;
        let mut unavailable = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(JoinOutcome::Started) => started += 1,
                Err(MatchmakingError::SessionUnavailable) => unavailable += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(started, 1);
        assert_eq!(unavailable, 1);

        let session = store.get(&id).await.unwrap();
        assert_eq!(session.participants.len(), 2);
    }

    #[tokio::test]
    async fn insufficient_catalog_aborts_for_both() {
        // Two events cannot fill a three-card hand.
        let (store, mm) = matchmaker_with_catalog(vec![event(1990), event(1991)]);
        let (host_tx, mut host_rx) = channel();
        let (joiner_tx, mut joiner_rx) = channel();

        let id = mm
            .create_game(Uuid::new_v4(), host_tx, "Elena", 3)
            .await
            .unwrap();

        let outcome = mm
            .join_game(Uuid::new_v4(), joiner_tx, id, "Pablo")
            .await
            .unwrap();
        assert_eq!(outcome, JoinOutcome::Aborted);

        assert!(matches!(
            host_rx.recv().await,
            Some(ServerMessage::GameAborted { .. })
        ));
        assert!(matches!(
            joiner_rx.recv().await,
            Some(ServerMessage::GameAborted { .. })
        ));
        assert!(store.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn host_disconnect_removes_waiting_session() {
        let (store, mm) = matchmaker_with_catalog(big_catalog());
        let (host_tx, _host_rx) = channel();
        let host_conn = Uuid::new_v4();

        let id = mm.create_game(host_conn, host_tx, "Elena", 3).await.unwrap();
        assert_eq!(store.session_count().await, 1);

        mm.cancel_for_connection(&host_conn).await;
        assert!(store.get(&id).await.is_none());
        assert!(mm.waiting_sessions().await.is_empty());
    }
}
