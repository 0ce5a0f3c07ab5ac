//! # GumboBall Server
//!
//! Authoritative game state for GumboBall tables, broadcast live to every
//! connected controller and viewer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    GUMBOBALL SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Primitives                               │
//! │  ├── dice.rs      - Validated dice and wire submissions      │
//! │  └── hash.rs      - Snapshot digests                         │
//! │                                                              │
//! │  game/            - Game logic (synchronous, no I/O)         │
//! │  ├── state.rs     - Table state and derived analytics        │
//! │  ├── engine.rs    - Reset / end / roll state machine         │
//! │  └── events.rs    - What each operation changed              │
//! │                                                              │
//! │  network/         - Networking                               │
//! │  ├── protocol.rs  - Message types                            │
//! │  ├── session.rs   - Session registry                         │
//! │  ├── coordinator.rs - Single-writer dispatch and fan-out     │
//! │  └── server.rs    - WebSocket server                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! One `GameEngine` exists per process. It is moved into the coordinator task,
//! which applies requests one at a time and broadcasts after each mutation.
//! Every session therefore observes the same sequence of snapshots.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::dice::{DiceRoll, DiceSubmission, DiceError};
pub use game::engine::{GameEngine, GameError, RollResult};
pub use game::state::GameState;
pub use network::{BroadcastCoordinator, GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
