//! Card Selector
//!
//! Turns raw catalog samples into a playable hand. Duel hands carry no
//! difficulty filter but must be free of chronological ambiguity: no two
//! cards may share a year unless both carry an exact date.

use std::sync::Arc;

use crate::catalog::event::{Difficulty, EventRecord};
use crate::catalog::store::{CatalogError, CatalogService};

/// Oversample factor for the unfiltered duel path. The candidate pool is
/// this many times larger than the requested hand so the ambiguity filter
/// has room to skip conflicting cards.
pub const CANDIDATE_POOL_FACTOR: usize = 8;

/// Card selection errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SelectError {
    /// Not enough qualifying events to deal the requested hand.
    #[error("not enough events in the catalog to deal {requested} cards")]
    InsufficientCatalog {
        /// Hand size that was requested.
        requested: usize,
    },

    /// Catalog could not be reached.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Deals hands from a catalog.
pub struct CardSelector<C> {
    catalog: Arc<C>,
}

impl<C: CatalogService> CardSelector<C> {
    /// Create a selector over the given catalog.
    pub fn new(catalog: Arc<C>) -> Self {
        Self { catalog }
    }

    /// Select `count` events for a hand.
    ///
    /// With a difficulty filter the catalog's filtered sample is used
    /// directly. Without one (the duel path) an oversized pool is drawn and
    /// greedily reduced to an unambiguous set.
    pub async fn select_cards(
        &self,
        count: usize,
        filter: Option<Difficulty>,
    ) -> Result<Vec<EventRecord>, SelectError> {
        if let Some(difficulty) = filter {
            let sample = self.catalog.sample(count, Some(difficulty)).await?;
            if sample.len() < count {
                return Err(SelectError::InsufficientCatalog { requested: count });
            }
            return Ok(sample);
        }

        let pool = self
            .catalog
            .sample(count * CANDIDATE_POOL_FACTOR, None)
            .await?;
        filter_unambiguous(pool, count)
    }
}

/// Greedy first-fit scan: accept each candidate in pool order unless it
/// conflicts with an already-accepted card. Deterministic for a fixed pool
/// and scan order; no backtracking.
pub fn filter_unambiguous(
    pool: Vec<EventRecord>,
    count: usize,
) -> Result<Vec<EventRecord>, SelectError> {
    let mut accepted: Vec<EventRecord> = Vec::with_capacity(count);

    for candidate in pool {
        if accepted.len() == count {
            break;
        }
        if accepted.iter().any(|a| a.conflicts_with(&candidate)) {
            continue;
        }
        accepted.push(candidate);
    }

    if accepted.len() < count {
        return Err(SelectError::InsufficientCatalog { requested: count });
    }
    Ok(accepted)
}
