//! Timeline Duel Server
//!
//! Binary entry point: wires the in-memory catalog, session store and
//! ledger into the WebSocket server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use timeline_duel::duel::{DuelReferee, Matchmaker, MatchRules, MemorySessionStore};
use timeline_duel::ledger::MemoryLedger;
use timeline_duel::network::{DuelServer, LobbyChannel, ServerConfig};
use timeline_duel::{MemoryCatalog, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Timeline Duel Server v{}", VERSION);

    let mut config = ServerConfig::default();
    if let Ok(addr) = std::env::var("BIND_ADDR") {
        config.bind_addr = addr.parse().context("invalid BIND_ADDR")?;
    }

    let catalog = match std::env::var("CATALOG_PATH") {
        Ok(path) => {
            let path = PathBuf::from(path);
            let catalog = MemoryCatalog::from_json_file(&path)
                .with_context(|| format!("failed to load catalog from {}", path.display()))?;
            info!("Loaded {} events from {}", catalog.len().await, path.display());
            catalog
        }
        Err(_) => {
            warn!("CATALOG_PATH not set, starting with an empty catalog");
            MemoryCatalog::new()
        }
    };

    let store = Arc::new(MemorySessionStore::new());
    let catalog = Arc::new(catalog);
    let ledger = Arc::new(MemoryLedger::new());
    let lobby = Arc::new(LobbyChannel::new());

    let matchmaker = Arc::new(Matchmaker::new(
        store.clone(),
        catalog,
        lobby,
        MatchRules::default(),
    ));
    let referee = Arc::new(DuelReferee::new(store, ledger));

    let server = DuelServer::new(config, matchmaker, referee);
    server.run().await?;

    Ok(())
}
