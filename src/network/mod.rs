//! Networking
//!
//! WebSocket transport, wire protocol, and lobby fan-out.
//!
//! ## Module Structure
//!
//! - `protocol`: JSON message types
//! - `lobby`: subscription-scoped lobby updates
//! - `server`: WebSocket server and connection handling

pub mod lobby;
pub mod protocol;
pub mod server;

pub use lobby::LobbyChannel;
pub use protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage, WaitingSessionInfo};
pub use server::{DuelServer, DuelServerError, ServerConfig};
