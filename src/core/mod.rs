//! Core primitives.
//!
//! Validated dice values and deterministic snapshot hashing.

pub mod dice;
pub mod hash;

// Re-export core types
pub use dice::{DiceRoll, DiceSubmission, DiceError, DIE_MIN, DIE_MAX, SEVEN};
pub use hash::{StateHash, StateHasher};
