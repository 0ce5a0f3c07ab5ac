//! WebSocket Game Server
//!
//! Async WebSocket transport in front of the coordinator.
//! Decodes client frames into requests and forwards outgoing messages.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock, broadcast};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::network::coordinator::{CoordinatorError, CoordinatorHandle};
use crate::network::protocol::{ClientMessage, ServerMessage, ServerError};
use crate::network::session::{OutgoingMessage, SessionId, DEFAULT_SESSION_BUFFER};

/// Port used when neither `PORT` nor `GUMBOBALL_BIND` is set.
pub const DEFAULT_PORT: u16 = 3000;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections, including ones still handshaking.
    pub max_connections: usize,
    /// Time allowed for the WebSocket handshake.
    pub connection_timeout: Duration,
    /// Capacity of the coordinator command channel.
    pub command_buffer: usize,
    /// Capacity of each session's outgoing queue.
    pub session_buffer: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 1000,
            connection_timeout: Duration::from_secs(30),
            command_buffer: 256,
            session_buffer: DEFAULT_SESSION_BUFFER,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    ///
    /// `GUMBOBALL_BIND` takes a full socket address and wins over `PORT`.
    /// Unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_addr = var("GUMBOBALL_BIND")
            .and_then(|s| s.parse::<SocketAddr>().ok())
            .or_else(|| {
                var("PORT")
                    .and_then(|p| p.parse::<u16>().ok())
                    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
            })
            .unwrap_or(defaults.bind_addr);

        Self {
            bind_addr,
            max_connections: var("GUMBOBALL_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            connection_timeout: var("GUMBOBALL_CONNECTION_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|&secs: &u64| secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.connection_timeout),
            command_buffer: var("GUMBOBALL_COMMAND_BUFFER")
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.command_buffer),
            session_buffer: var("GUMBOBALL_SESSION_BUFFER")
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.session_buffer),
            ..defaults
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Coordinator is gone.
    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),
}

/// Connected client state.
struct ConnectedClient {
    /// Session assigned by the coordinator, `None` while handshaking.
    session_id: Option<SessionId>,
    /// Connection time.
    connected_at: Instant,
}

type ClientMap = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Handle to the coordinator task.
    coordinator: CoordinatorHandle,
    /// Connected clients.
    clients: ClientMap,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig, coordinator: CoordinatorHandle) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            coordinator,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address and run the server.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run the accept loop on an already bound listener.
    #[instrument(skip_all)]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("GumboBall server v{} listening on {}", self.config.version, listener.local_addr()?);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            {
                                let mut clients = self.clients.write().await;
                                if clients.len() >= self.config.max_connections {
                                    warn!("Connection limit reached, rejecting {}", addr);
                                    continue;
                                }
                                clients.insert(addr, ConnectedClient {
                                    session_id: None,
                                    connected_at: Instant::now(),
                                });
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

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let coordinator = self.coordinator.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        let config = self.config.clone();

        tokio::spawn(async move {
            if let Err(e) = Self::serve_connection(stream, addr, &config, &clients, &coordinator, shutdown_rx).await {
                error!("Connection {} failed: {}", addr, e);
            }

            let removed = clients.write().await.remove(&addr);
            if let Some(client) = removed {
                if let Some(session_id) = client.session_id {
                    let _ = coordinator.disconnect(session_id).await;
                }
                info!("Client {} cleaned up after {:?}", addr, client.connected_at.elapsed());
            }
        });
    }

    /// Pump one connection until it closes.
    async fn serve_connection(
        stream: TcpStream,
        addr: SocketAddr,
        config: &ServerConfig,
        clients: &ClientMap,
        coordinator: &CoordinatorHandle,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), GameServerError> {
        let ws_stream = tokio::select! {
            result = tokio::time::timeout(config.connection_timeout, accept_async(stream)) => {
                match result {
                    Ok(ws_stream) => ws_stream?,
                    Err(_) => {
                        warn!("Handshake from {} timed out", addr);
                        return Ok(());
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                debug!("Dropping {} mid-handshake for shutdown", addr);
                return Ok(());
            }
        };
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (msg_tx, mut msg_rx) = mpsc::channel::<OutgoingMessage>(config.session_buffer);

        // Spawn message sender task; it ends once the coordinator drops the session.
        let mut sender_task = tokio::spawn(async move {
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
            let _ = ws_sender.close().await;
        });

        // Register with the coordinator; the current state is queued first.
        let session_id = coordinator.connect(msg_tx).await?;
        if let Some(client) = clients.write().await.get_mut(&addr) {
            client.session_id = Some(session_id);
        }
        debug!("Client {} is session {}", addr, session_id);

        let mut writer_done = false;
        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match ClientMessage::from_json(&text) {
                                Ok(client_msg) => {
                                    coordinator.submit(session_id, client_msg).await?;
                                }
                                Err(e) => {
                                    debug!("Invalid message from {}: {}", addr, e);
                                    coordinator.notify(session_id, ServerMessage::Error(ServerError::invalid_message())).await?;
                                }
                            }
                        }
                        Some(Ok(Message::Binary(_))) => {
                            debug!("Binary frame from {} ignored", addr);
                            coordinator.notify(session_id, ServerMessage::Error(ServerError::invalid_message())).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Client {} disconnected", addr);
                            break;
                        }
                        Some(Err(e)) => {
                            sender_task.abort();
                            return Err(e.into());
                        }
                        _ => {}
                    }
                }
                _ = &mut sender_task => {
                    debug!("Outgoing stream to {} closed", addr);
                    writer_done = true;
                    break;
                }
                _ = shutdown_rx.recv() => {
                    coordinator.notify(session_id, ServerMessage::Shutdown {
                        reason: "Server shutting down".to_string(),
                    }).await?;
                    break;
                }
            }
        }

        coordinator.disconnect(session_id).await?;
        if !writer_done {
            let _ = sender_task.await;
        }
        Ok(())
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
