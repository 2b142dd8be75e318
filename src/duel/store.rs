//! Session Store
//!
//! Registry of active duel sessions with compare-and-swap state
//! transitions. The CAS is the linchpin of join-race safety: handlers
//! suspend at I/O boundaries between observing `Waiting` and writing
//! `Playing`, and `try_transition` guarantees at most one of two racing
//! joins wins that gap.

use std::collections::BTreeMap;
use std::future::Future;

use tokio::sync::RwLock;

use crate::catalog::event::EventRecord;
use crate::duel::session::{DuelSession, Participant, SessionId, SessionState};

/// Registry over [`DuelSession`].
///
/// Injectable so the in-memory map can be swapped for an external store;
/// all operations act on snapshots, never on live references.
pub trait SessionStore: Send + Sync {
    /// Insert a session, returning its id.
    fn create(&self, session: DuelSession) -> impl Future<Output = SessionId> + Send;

    /// Snapshot a session.
    fn get(&self, id: &SessionId) -> impl Future<Output = Option<DuelSession>> + Send;

    /// Snapshot every session still in `Waiting`.
    fn list_waiting(&self) -> impl Future<Output = Vec<DuelSession>> + Send;

    /// Remove a session.
    fn remove(&self, id: &SessionId) -> impl Future<Output = ()> + Send;

    /// Atomically transition `from -> to`. Returns false if the session is
    /// absent or was not observed in `from`; in that case nothing changes.
    fn try_transition(
        &self,
        id: &SessionId,
        from: SessionState,
        to: SessionState,
    ) -> impl Future<Output = bool> + Send;

    /// Append a participant. Returns false if the session is absent or
    /// already has two participants.
    fn add_participant(
        &self,
        id: &SessionId,
        participant: Participant,
    ) -> impl Future<Output = bool> + Send;

    /// Set the dealt hand. Returns false if the session is absent.
    fn set_dealt_events(
        &self,
        id: &SessionId,
        events: Vec<EventRecord>,
    ) -> impl Future<Output = bool> + Send;
}

/// In-memory session store. Sessions live directly in the map so every
/// check-and-set happens under a single write lock.
pub struct MemorySessionStore {
    sessions: RwLock<BTreeMap<SessionId, DuelSession>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of sessions held, any state.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemorySessionStore {
    async fn create(&self, session: DuelSession) -> SessionId {
        let id = session.id;
        self.sessions.write().await.insert(id, session);
        id
    }

    async fn get(&self, id: &SessionId) -> Option<DuelSession> {
        self.sessions.read().await.get(id).cloned()
    }

    async fn list_waiting(&self) -> Vec<DuelSession> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.state == SessionState::Waiting)
            .cloned()
            .collect()
    }

    async fn remove(&self, id: &SessionId) {
        self.sessions.write().await.remove(id);
    }

    async fn try_transition(
        &self,
        id: &SessionId,
        from: SessionState,
        to: SessionState,
    ) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(session) if session.state == from => {
                session.state = to;
                true
            }
            _ => false,
        }
    }

    async fn add_participant(&self, id: &SessionId, participant: Participant) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(session) if session.participants.len() < 2 => {
                session.participants.push(participant);
                true
            }
            _ => false,
        }
    }

    async fn set_dealt_events(&self, id: &SessionId, events: Vec<EventRecord>) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(session) => {
                session.dealt_events = events;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn participant(name: &str) -> Participant {
        let (tx, _rx) = mpsc::channel(8);
        Participant {
            connection: Uuid::new_v4(),
            name: name.to_string(),
            sender: tx,
        }
    }

    #[tokio::test]
    async fn create_get_remove() {
        let store = MemorySessionStore::new();
        let id = store.create(DuelSession::new(participant("Elena"), 3)).await;

        let snapshot = store.get(&id).await.unwrap();
        assert_eq!(snapshot.host_name, "Elena");

        store.remove(&id).await;
        assert!(store.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn list_waiting_excludes_playing() {
        let store = MemorySessionStore::new();
        let a = store.create(DuelSession::new(participant("Elena"), 3)).await;
        let b = store.create(DuelSession::new(participant("Pablo"), 4)).await;

        assert!(
            store
                .try_transition(&a, SessionState::Waiting, SessionState::Playing)
                .await
        );

        let waiting = store.list_waiting().await;
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].id, b);
    }

    #[tokio::test]
    async fn transition_requires_expected_state() {
        let store = MemorySessionStore::new();
        let id = store.create(DuelSession::new(participant("Elena"), 3)).await;

        assert!(
            !store
                .try_transition(&id, SessionState::Playing, SessionState::Finished)
                .await
        );
        assert_eq!(store.get(&id).await.unwrap().state, SessionState::Waiting);

        assert!(
            store
                .try_transition(&id, SessionState::Waiting, SessionState::Playing)
                .await
        );
        assert_eq!(store.get(&id).await.unwrap().state, SessionState::Playing);
    }

    #[tokio::test]
    async fn transition_on_missing_session_fails() {
        let store = MemorySessionStore::new();
        assert!(
            !store
                .try_transition(&Uuid::new_v4(), SessionState::Waiting, SessionState::Playing)
                .await
        );
    }

    #[tokio::test]
    async fn concurrent_transitions_only_one_wins() {
        let store = Arc::new(MemorySessionStore::new());
        let id = store.create(DuelSession::new(participant("Elena"), 3)).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .try_transition(&id, SessionState::Waiting, SessionState::Playing)
                    .await
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn participant_cap_is_two() {
        let store = MemorySessionStore::new();
        let id = store.create(DuelSession::new(participant("Elena"), 3)).await;

        assert!(store.add_participant(&id, participant("Pablo")).await);
        assert!(!store.add_participant(&id, participant("Alfonso")).await);
        assert_eq!(store.get(&id).await.unwrap().participants.len(), 2);
    }
}
