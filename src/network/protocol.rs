//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is a JSON text message tagged by `"type"`.

use serde::{Serialize, Deserialize};

use crate::core::dice::{DiceRoll, DiceSubmission};
use crate::game::engine::GameError;
use crate::game::state::GameState;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Reset the table and open submissions.
    StartGame,

    /// Close submissions and freeze the table.
    EndGame,

    /// Submit a roll.
    SubmitDice(DiceSubmission),

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        #[serde(default)]
        timestamp: u64,
    },
}

impl ClientMessage {
    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::StartGame => "start_game",
            ClientMessage::EndGame => "end_game",
            ClientMessage::SubmitDice(_) => "submit_dice",
            ClientMessage::Ping { .. } => "ping",
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Full state snapshot, sent on connect and after every mutation.
    StateUpdate(GameState),

    /// Roll acknowledgment, sent to the submitter only.
    DiceAccepted(DiceAccepted),

    /// Request failed, sent to the requester only.
    Error(ServerError),

    /// Pong response.
    Pong {
        /// Client timestamp from the ping.
        timestamp: u64,
        /// Server wall clock (Unix millis).
        #[serde(rename = "serverTime")]
        server_time: u64,
    },

    /// Server is shutting down.
    Shutdown {
        /// Human-readable reason.
        reason: String,
    },
}

impl ServerMessage {
    /// Pong for a ping, stamped with the current server time.
    pub fn pong(timestamp: u64) -> Self {
        ServerMessage::Pong {
            timestamp,
            server_time: chrono::Utc::now().timestamp_millis().max(0) as u64,
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Acknowledgment of an accepted roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceAccepted {
    /// First die.
    pub die1: u8,
    /// Second die.
    pub die2: u8,
    /// Sum of both dice.
    pub sum: u8,
    /// The roll was a seven.
    pub rolled_seven: bool,
}

impl DiceAccepted {
    /// Build from an accepted roll.
    pub fn new(roll: DiceRoll, rolled_seven: bool) -> Self {
        Self {
            die1: roll.die1,
            die2: roll.die2,
            sum: roll.sum(),
            rolled_seven,
        }
    }
}

/// Server error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error kind.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Dice submitted while the game is not active.
    InactiveGame,
    /// A die value outside 1..=6 or not an integer.
    InvalidDice,
    /// Frame could not be decoded.
    InvalidMessage,
}

impl ServerError {
    /// Error for an undecodable frame.
    pub fn invalid_message() -> Self {
        Self {
            code: ErrorCode::InvalidMessage,
            message: "Invalid message format".to_string(),
        }
    }
}

impl From<&GameError> for ServerError {
    fn from(err: &GameError) -> Self {
        let code = match err {
            GameError::InactiveGame => ErrorCode::InactiveGame,
            GameError::InvalidDice(_) => ErrorCode::InvalidDice,
        };
        Self { code, message: err.to_string() }
    }
}
