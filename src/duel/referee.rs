//! Duel Referee
//!
//! Accepts the first valid finish claim per duel, declares the winner, and
//! credits the score ledger exactly once. Later claims for the same duel
//! are idempotent no-ops.
//!
//! The claim is client-trusted: the server does not re-validate the
//! submitted card ordering before declaring a winner.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::duel::session::{SessionId, SessionState};
use crate::duel::store::SessionStore;
use crate::ledger::{ScoreCategory, ScoreLedger};
use crate::network::protocol::ServerMessage;

/// How a finish claim resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishOutcome {
    /// First claim for the duel: the claimant is the winner.
    Accepted {
        /// Display name of the declared winner.
        winner_name: String,
    },
    /// The duel is already decided, the session is gone, or the claimant
    /// is not a participant.
    Ignored,
}

/// Declares duel winners.
pub struct DuelReferee<S, L> {
    store: Arc<S>,
    ledger: Arc<L>,
}

impl<S: SessionStore, L: ScoreLedger> DuelReferee<S, L> {
    /// Create a referee over the given store and ledger.
    pub fn new(store: Arc<S>, ledger: Arc<L>) -> Self {
        Self { store, ledger }
    }

    /// Handle a finish claim.
    ///
    /// The `Playing -> Finished` CAS makes acceptance one-shot: of any
    /// number of claims on the same duel, exactly one is declared winner.
    pub async fn report_finish(&self, session_id: SessionId, claimant_name: &str) -> FinishOutcome {
        let snapshot = match self.store.get(&session_id).await {
            Some(s) => s,
            None => {
                debug!(session = %session_id, "finish claim for unknown session ignored");
                return FinishOutcome::Ignored;
            }
        };

        if snapshot.state != SessionState::Playing || !snapshot.has_participant(claimant_name) {
            debug!(
                session = %session_id,
                claimant = claimant_name,
                "finish claim out of turn ignored"
            );
            return FinishOutcome::Ignored;
        }

        if !self
            .store
            .try_transition(&session_id, SessionState::Playing, SessionState::Finished)
            .await
        {
            return FinishOutcome::Ignored;
        }

        // Sole owner of the resolution from here on.
        let session = match self.store.get(&session_id).await {
            Some(s) => s,
            None => return FinishOutcome::Ignored,
        };

        session
            .broadcast(ServerMessage::DuelResult {
                session_id,
                winner_name: claimant_name.to_string(),
            })
            .await;

        let points = session.dealt_events.len() as i64;
        if let Err(e) = self
            .ledger
            .credit(claimant_name, points, ScoreCategory::DuelWin)
            .await
        {
            warn!(session = %session_id, winner = claimant_name, error = %e, "ledger credit failed");
        }

        self.store.remove(&session_id).await;
        info!(session = %session_id, winner = claimant_name, points, "duel resolved");

        FinishOutcome::Accepted {
            winner_name: claimant_name.to_string(),
        }
    }
}
