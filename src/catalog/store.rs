//! Catalog Service
//!
//! Collaborator that stores event records and hands out uniform random
//! samples. The in-memory implementation backs the server binary and tests;
//! a database-backed implementation can be swapped in behind the trait.

use std::future::Future;
use std::path::Path;

use rand::seq::SliceRandom;
use tokio::sync::RwLock;

use crate::catalog::event::{Difficulty, EventRecord};

/// Catalog access errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    /// Backing store could not be reached.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Source of event records for dealing hands.
///
/// `sample` returns up to `count` distinct records chosen uniformly at
/// random, fewer when the catalog does not hold enough qualifying records.
/// Sufficiency is the caller's concern (see [`CardSelector`]).
///
/// [`CardSelector`]: crate::catalog::selector::CardSelector
pub trait CatalogService: Send + Sync {
    /// Draw up to `count` distinct random records, optionally restricted
    /// to one difficulty tier.
    fn sample(
        &self,
        count: usize,
        filter: Option<Difficulty>,
    ) -> impl Future<Output = Result<Vec<EventRecord>, CatalogError>> + Send;
}

/// In-memory catalog.
pub struct MemoryCatalog {
    events: RwLock<Vec<EventRecord>>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }

    /// Create a catalog seeded with the given records.
    pub fn with_events(events: Vec<EventRecord>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    /// Load a catalog from a JSON file holding an array of event records.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let events: Vec<EventRecord> = serde_json::from_str(&data)?;
        Ok(Self::with_events(events))
    }

    /// Add a record to the catalog.
    pub async fn add(&self, event: EventRecord) {
        self.events.write().await.push(event);
    }

    /// Number of records held.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// Whether the catalog holds no records.
    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogService for MemoryCatalog {
    async fn sample(
        &self,
        count: usize,
        filter: Option<Difficulty>,
    ) -> Result<Vec<EventRecord>, CatalogError> {
        let events = self.events.read().await;

        let mut qualifying: Vec<EventRecord> = events
            .iter()
            .filter(|e| filter.map_or(true, |d| e.difficulty == d))
            .cloned()
            .collect();
        drop(events);

        // Shuffle-and-truncate gives a uniform sample in random scan order.
        qualifying.shuffle(&mut rand::thread_rng());
        qualifying.truncate(count);

        Ok(qualifying)
    }
}
