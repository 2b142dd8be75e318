//! Event Catalog
//!
//! Event card records, the catalog collaborator that samples them, and the
//! selector that deals unambiguous hands.
//!
//! ## Module Structure
//!
//! - `event`: event records and the chronological conflict rule
//! - `store`: catalog service trait and in-memory implementation
//! - `selector`: hand dealing with the ambiguity filter

pub mod event;
pub mod selector;
pub mod store;

pub use event::{Difficulty, EventId, EventRecord};
pub use selector::{CardSelector, SelectError, CANDIDATE_POOL_FACTOR};
pub use store::{CatalogError, CatalogService, MemoryCatalog};
