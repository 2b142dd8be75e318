//! # Timeline Duel Server
//!
//! Realtime server for a card-ordering party game: two players race to
//! arrange the same hand of historical events into chronological order.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TIMELINE DUEL SERVER                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  catalog/          - Event cards and hand dealing            │
//! │  ├── event.rs      - Event records, conflict rule            │
//! │  ├── store.rs      - Catalog service (random sampling)       │
//! │  └── selector.rs   - Ambiguity-free hand selection           │
//! │                                                              │
//! │  duel/             - Session lifecycle                       │
//! │  ├── session.rs    - Duel session record                     │
//! │  ├── store.rs      - Session registry with CAS transitions   │
//! │  ├── matchmaker.rs - Create / join / cancel state machine    │
//! │  └── referee.rs    - First-claim-wins resolution             │
//! │                                                              │
//! │  ledger.rs         - Per-player score accumulation           │
//! │                                                              │
//! │  network/          - Transport                               │
//! │  ├── protocol.rs   - JSON message types                      │
//! │  ├── lobby.rs      - Subscription-scoped lobby updates       │
//! │  └── server.rs     - WebSocket server                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency Guarantees
//!
//! Session state is mutated only through the store's compare-and-swap
//! `try_transition`:
//! - at most one `Waiting -> Playing` transition per session, so two
//!   concurrent joins never both succeed
//! - at most one `Playing -> Finished` transition per session, so the
//!   ledger is credited exactly once per duel
//!
//! Sessions are ephemeral, in-memory only; a restart loses in-flight
//! lobbies by design.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod catalog;
pub mod duel;
pub mod ledger;
pub mod network;

// Re-export commonly used types
pub use catalog::{CardSelector, CatalogService, Difficulty, EventRecord, MemoryCatalog};
pub use duel::{
    DuelReferee, DuelSession, Matchmaker, MatchRules, MemorySessionStore, SessionState,
    SessionStore,
};
pub use ledger::{MemoryLedger, ScoreLedger};
pub use network::{DuelServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
