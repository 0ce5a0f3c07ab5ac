//! Game Logic Module
//!
//! The GumboBall rules. Synchronous and free of I/O.
//!
//! ## Module Structure
//!
//! - `state`: Table state, snapshot shape and derived analytics
//! - `engine`: Authoritative state machine (reset, end, roll)
//! - `events`: What each operation changed

pub mod state;
pub mod engine;
pub mod events;

// Re-export key types
pub use state::{GameState, GUMBO_STEPS};
pub use engine::{GameEngine, GameError, RollResult};
pub use events::GameEvent;
