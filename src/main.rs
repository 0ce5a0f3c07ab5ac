//! GumboBall Server
//!
//! Authoritative game-state server for a GumboBall table.
//! Controllers submit dice over WebSocket; every viewer receives each new state.

use std::sync::Arc;
use anyhow::Context;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use gumboball::{
    VERSION,
    game::engine::GameEngine,
    network::{BroadcastCoordinator, GameServer, ServerConfig},
};

#[cfg(feature = "debug-tracing")]
const DEFAULT_FILTER: &str = "gumboball=debug,info";
#[cfg(not(feature = "debug-tracing"))]
const DEFAULT_FILTER: &str = "info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = ServerConfig::from_env();
    info!("GumboBall Server v{}", VERSION);
    info!("Bind: {}, max connections: {}, handshake timeout: {:?}",
        config.bind_addr, config.max_connections, config.connection_timeout);

    // One engine for the whole process, owned by the coordinator task.
    let coordinator = BroadcastCoordinator::new(GameEngine::new());
    let (handle, coordinator_task) = coordinator.spawn(config.command_buffer);

    let server = Arc::new(GameServer::new(config, handle));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            signal_server.shutdown();
        }
    });

    server.run().await
        .with_context(|| format!("Server on {} failed", server.config().bind_addr))?;

    // Dropping the last handle lets the coordinator drain and stop.
    drop(server);
    let coordinator = coordinator_task.await.context("Coordinator task panicked")?;
    info!("Final state: {} throws, best Gumbo run {}",
        coordinator.engine().get_state().throw_count,
        coordinator.engine().get_state().max_gumbo_slams);

    Ok(())
}
