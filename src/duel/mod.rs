//! Duel Lifecycle
//!
//! Session records, the session store, and the two actors that mutate it.
//!
//! ## Module Structure
//!
//! - `session`: duel session record and participants
//! - `store`: session registry with CAS transitions
//! - `matchmaker`: create/join/cancel state machine
//! - `referee`: first-claim-wins resolution

pub mod matchmaker;
pub mod referee;
pub mod session;
pub mod store;

pub use matchmaker::{JoinOutcome, MatchRules, Matchmaker, MatchmakingError};
pub use referee::{DuelReferee, FinishOutcome};
pub use session::{ConnectionId, DuelSession, Participant, SessionId, SessionState};
pub use store::{MemorySessionStore, SessionStore};
