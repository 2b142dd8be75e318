//! Score Ledger
//!
//! Collaborator that accumulates per-player point totals. The core's only
//! contract with it: on duel resolution the winner is credited exactly once.

use std::collections::BTreeMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// What a credit is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreCategory {
    /// Won a head-to-head duel.
    DuelWin,
}

/// Ledger access errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    /// Backing store could not be reached.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Accumulated score for one player.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerScore {
    /// All-time points.
    pub total_points: i64,
    /// Points this week.
    pub weekly_points: i64,
    /// Duels won.
    pub duel_wins: u32,
}

/// Per-player point accumulation.
pub trait ScoreLedger: Send + Sync {
    /// Credit `delta` points to `player_name` under `category`.
    fn credit(
        &self,
        player_name: &str,
        delta: i64,
        category: ScoreCategory,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;
}

/// In-memory ledger.
pub struct MemoryLedger {
    scores: RwLock<BTreeMap<String, PlayerScore>>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            scores: RwLock::new(BTreeMap::new()),
        }
    }

    /// Snapshot a player's score.
    pub async fn score_of(&self, player_name: &str) -> PlayerScore {
        self.scores
            .read()
            .await
            .get(player_name)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreLedger for MemoryLedger {
    async fn credit(
        &self,
        player_name: &str,
        delta: i64,
        category: ScoreCategory,
    ) -> Result<(), LedgerError> {
        let mut scores = self.scores.write().await;
        let entry = scores.entry(player_name.to_string()).or_default();
        entry.total_points += delta;
        entry.weekly_points += delta;
        match category {
            ScoreCategory::DuelWin => entry.duel_wins += 1,
        }
        Ok(())
    }
}
