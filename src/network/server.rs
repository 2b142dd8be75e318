//! WebSocket Duel Server
//!
//! Async WebSocket server for duel connections. Handles login, lobby
//! traffic, and routing of matchmaking and finish-claim messages.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::catalog::store::CatalogService;
use crate::duel::matchmaker::{Matchmaker, MatchmakingError};
use crate::duel::referee::{DuelReferee, FinishOutcome};
use crate::duel::session::ConnectionId;
use crate::duel::store::SessionStore;
use crate::ledger::ScoreLedger;
use crate::network::protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Connections idle longer than this are dropped.
    pub idle_timeout: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".parse().unwrap(),
            max_connections: 256,
            idle_timeout: Duration::from_secs(300),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Duel server errors.
#[derive(Debug, thiserror::Error)]
pub enum DuelServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Connected client state.
struct ConnectedClient {
    /// Remote address, for logs.
    addr: SocketAddr,
    /// Display name (after login).
    player_name: Option<String>,
    /// Connection time.
    #[allow(dead_code)]
    connected_at: Instant,
    /// Last activity.
    last_activity: Instant,
    /// Message sender (for direct messaging to client).
    #[allow(dead_code)]
    sender: mpsc::Sender<ServerMessage>,
}

type ClientMap = Arc<RwLock<BTreeMap<ConnectionId, ConnectedClient>>>;

/// The duel server.
pub struct DuelServer<S, C, L> {
    /// Server configuration.
    config: ServerConfig,
    /// Matchmaker shared across connections.
    matchmaker: Arc<Matchmaker<S, C>>,
    /// Referee shared across connections.
    referee: Arc<DuelReferee<S, L>>,
    /// Connected clients.
    clients: ClientMap,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl<S, C, L> DuelServer<S, C, L>
where
    S: SessionStore + 'static,
    C: CatalogService + 'static,
    L: ScoreLedger + 'static,
{
    /// Create a new duel server.
    pub fn new(
        config: ServerConfig,
        matchmaker: Arc<Matchmaker<S, C>>,
        referee: Arc<DuelReferee<S, L>>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            matchmaker,
            referee,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), DuelServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Duel server listening on {}", self.config.bind_addr);

        // Spawn cleanup task
        let cleanup_clients = self.clients.clone();
        let cleanup_matchmaker = self.matchmaker.clone();
        let idle_timeout = self.config.idle_timeout;
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_clients, cleanup_matchmaker, idle_timeout).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let matchmaker = self.matchmaker.clone();
        let referee = self.referee.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let connection: ConnectionId = Uuid::new_v4();
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            // Register client
            {
                let mut clients = clients.write().await;
                clients.insert(connection, ConnectedClient {
                    addr,
                    player_name: None,
                    connected_at: Instant::now(),
                    last_activity: Instant::now(),
                    sender: msg_tx.clone(),
                });
            }

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(error_message(
                                            ErrorCode::InvalidRequest,
                                            "Invalid message format",
                                        )).await;
                                        continue;
                                    }
                                };

                                // Update activity
                                {
                                    let mut clients = clients.write().await;
                                    if let Some(client) = clients.get_mut(&connection) {
                                        client.last_activity = Instant::now();
                                    }
                                }

                                Self::handle_client_message(
                                    connection,
                                    client_msg,
                                    &clients,
                                    &matchmaker,
                                    &referee,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Ping(_))) => {
                                // tungstenite answers pings at the protocol level
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            sender_task.abort();
            clients.write().await.remove(&connection);
            matchmaker.cancel_for_connection(&connection).await;

            info!("Client {} cleaned up", addr);
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        connection: ConnectionId,
        msg: ClientMessage,
        clients: &ClientMap,
        matchmaker: &Arc<Matchmaker<S, C>>,
        referee: &Arc<DuelReferee<S, L>>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::Login { player_name } => {
                let name = player_name.trim();
                if name.is_empty() {
                    let _ = sender
                        .send(error_message(ErrorCode::InvalidRequest, "Name must not be empty"))
                        .await;
                    return;
                }

                let mut clients = clients.write().await;
                if let Some(client) = clients.get_mut(&connection) {
                    client.player_name = Some(name.to_string());
                    debug!("Client {} logged in as {}", client.addr, name);
                }
            }
            ClientMessage::EnterLobby => {
                if !Self::is_logged_in(clients, &connection).await {
                    let _ = sender
                        .send(error_message(ErrorCode::NotLoggedIn, "Login first"))
                        .await;
                    return;
                }

                let sessions = matchmaker.enter_lobby(connection, sender.clone()).await;
                let _ = sender.send(ServerMessage::LobbyUpdate { sessions }).await;
            }
            ClientMessage::LeaveLobby => {
                matchmaker.leave_lobby(&connection).await;
            }
            ClientMessage::CreateGame { host_name, rounds } => {
                if !Self::is_logged_in(clients, &connection).await {
                    let _ = sender
                        .send(error_message(ErrorCode::NotLoggedIn, "Login first"))
                        .await;
                    return;
                }

                match matchmaker
                    .create_game(connection, sender.clone(), &host_name, rounds)
                    .await
                {
                    Ok(session_id) => {
                        let _ = sender.send(ServerMessage::GameCreated { session_id }).await;
                    }
                    Err(e) => {
                        let _ = sender.send(matchmaking_error_message(e)).await;
                    }
                }
            }
            ClientMessage::JoinGame { session_id, joiner_name } => {
                if !Self::is_logged_in(clients, &connection).await {
                    let _ = sender
                        .send(error_message(ErrorCode::NotLoggedIn, "Login first"))
                        .await;
                    return;
                }

                // On success the matchmaker delivers game_start (or the
                // abort notice) to both participants itself.
                if let Err(e) = matchmaker
                    .join_game(connection, sender.clone(), session_id, &joiner_name)
                    .await
                {
                    let _ = sender.send(matchmaking_error_message(e)).await;
                }
            }
            ClientMessage::DuelWin { session_id, claimant_name } => {
                // Late or bogus claims are idempotent no-ops.
                if let FinishOutcome::Ignored =
                    referee.report_finish(session_id, &claimant_name).await
                {
                    debug!(session = %session_id, claimant = %claimant_name, "finish claim ignored");
                }
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender
                    .send(ServerMessage::Pong {
                        timestamp,
                        server_time: std::time::SystemTime::now()
                            .duration_since(std::time::UNIX_EPOCH)
                            .unwrap_or_default()
                            .as_millis() as u64,
                    })
                    .await;
            }
        }
    }

    async fn is_logged_in(clients: &ClientMap, connection: &ConnectionId) -> bool {
        clients
            .read()
            .await
            .get(connection)
            .map_or(false, |c| c.player_name.is_some())
    }

    /// Run cleanup loop: drop idle connections and garbage-collect the
    /// waiting sessions they host.
    async fn run_cleanup_loop(
        clients: ClientMap,
        matchmaker: Arc<Matchmaker<S, C>>,
        idle_timeout: Duration,
    ) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            let now = Instant::now();
            let to_remove: Vec<ConnectionId> = {
                let clients = clients.read().await;
                clients
                    .iter()
                    .filter(|(_, c)| now.duration_since(c.last_activity) > idle_timeout)
                    .map(|(id, _)| *id)
                    .collect()
            };

            for connection in to_remove {
                let removed = clients.write().await.remove(&connection);
                if let Some(client) = removed {
                    info!("Removed idle client {}", client.addr);
                    matchmaker.cancel_for_connection(&connection).await;
                }
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

fn error_message(code: ErrorCode, message: &str) -> ServerMessage {
    ServerMessage::Error(ServerError {
        code,
        message: message.to_string(),
    })
}

fn matchmaking_error_message(e: MatchmakingError) -> ServerMessage {
    let code = match e {
        MatchmakingError::InvalidRequest(_) => ErrorCode::InvalidRequest,
        MatchmakingError::SessionUnavailable => ErrorCode::SessionUnavailable,
    };
    ServerMessage::Error(ServerError {
        code,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::store::MemoryCatalog;
    use crate::duel::matchmaker::MatchRules;
    use crate::duel::store::MemorySessionStore;
    use crate::ledger::MemoryLedger;
    use crate::network::lobby::LobbyChannel;

    fn test_server() -> DuelServer<MemorySessionStore, MemoryCatalog, MemoryLedger> {
        let store = Arc::new(MemorySessionStore::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let ledger = Arc::new(MemoryLedger::new());
        let lobby = Arc::new(LobbyChannel::new());

        let matchmaker = Arc::new(Matchmaker::new(
            store.clone(),
            catalog,
            lobby,
            MatchRules::default(),
        ));
        let referee = Arc::new(DuelReferee::new(store, ledger));

        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        DuelServer::new(config, matchmaker, referee)
    }

    #[test]
    fn server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 256);
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn server_creation() {
        let server = test_server();
        assert_eq!(server.connection_count().await, 0);
    }

    #[tokio::test]
    async fn server_shutdown() {
        let server = test_server();
        server.shutdown();
        // Should not panic
    }

    #[test]
    fn matchmaking_errors_map_to_codes() {
        let msg = matchmaking_error_message(MatchmakingError::SessionUnavailable);
        match msg {
            ServerMessage::Error(e) => assert_eq!(e.code, ErrorCode::SessionUnavailable),
            other => panic!("expected error, got {other:?}"),
        }

        let msg = matchmaking_error_message(MatchmakingError::InvalidRequest("bad".into()));
        match msg {
            ServerMessage::Error(e) => assert_eq!(e.code, ErrorCode::InvalidRequest),
            other => panic!("expected error, got {other:?}"),
        }
    }
}
