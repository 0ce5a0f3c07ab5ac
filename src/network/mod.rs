//! Network Layer
//!
//! WebSocket transport, session registry and the broadcast coordinator that
//! serializes every request against the single game engine.

pub mod protocol;
pub mod session;
pub mod coordinator;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, DiceAccepted, ServerError, ErrorCode};
pub use session::{SessionId, SessionRegistry, SessionSender, OutgoingMessage, DEFAULT_SESSION_BUFFER};
pub use coordinator::{BroadcastCoordinator, CoordinatorHandle, CoordinatorCommand, CoordinatorError};
pub use server::{GameServer, ServerConfig, GameServerError, DEFAULT_PORT};
