//! Session Registry
//!
//! Tracks every connected session and its outgoing message channel.
//! Owned by the coordinator; registration never touches game state.

use std::collections::BTreeMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::network::protocol::ServerMessage;

/// Unique session identifier.
pub type SessionId = uuid::Uuid;

/// Default capacity of a session's outgoing queue.
pub const DEFAULT_SESSION_BUFFER: usize = 64;

/// Message queued for a session. Broadcasts share one allocation.
pub type OutgoingMessage = Arc<ServerMessage>;

/// Outgoing channel to one session.
///
/// Bounded; a session whose queue is full is dropped rather than awaited.
pub type SessionSender = mpsc::Sender<OutgoingMessage>;

/// A connected session.
#[derive(Debug)]
pub struct SessionHandle {
    /// Session identifier.
    pub id: SessionId,
    /// When the session registered.
    pub connected_at: DateTime<Utc>,
    /// Message channel to this session.
    sender: SessionSender,
}

impl SessionHandle {
    /// Check if the receiving side is still alive.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Queue a message without waiting. Returns false if the session is
    /// gone or has stopped reading.
    fn send(&self, message: OutgoingMessage) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Session {} is not keeping up, dropping it", self.id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Registry of active sessions, iterated in a stable order for fan-out.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<SessionId, SessionHandle>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: BTreeMap::new(),
        }
    }

    /// Register a session and return its new identifier.
    pub fn register(&mut self, sender: SessionSender) -> SessionId {
        let id = uuid::Uuid::new_v4();
        self.sessions.insert(id, SessionHandle {
            id,
            connected_at: Utc::now(),
            sender,
        });
        id
    }

    /// Remove a session. Returns false if it was not registered.
    pub fn unregister(&mut self, id: &SessionId) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Send to one session, pruning it if its channel is closed or full.
    pub fn send_to(&mut self, id: &SessionId, message: ServerMessage) -> bool {
        let delivered = match self.sessions.get(id) {
            Some(session) => session.send(Arc::new(message)),
            None => return false,
        };

        if !delivered {
            debug!("Session {} is gone, pruning", id);
            self.sessions.remove(id);
        }
        delivered
    }

    /// Send to every session. Returns the number of sessions reached.
    ///
    /// Sessions whose channel is closed or full are pruned; the rest still
    /// receive the message.
    pub fn broadcast(&mut self, message: ServerMessage) -> usize {
        let message = Arc::new(message);
        let mut stale = Vec::new();

        for (id, session) in &self.sessions {
            if !session.send(Arc::clone(&message)) {
                stale.push(*id);
            }
        }

        for id in &stale {
            debug!("Session {} is gone, pruning", id);
            self.sessions.remove(id);
        }

        self.sessions.len()
    }

    /// Get a session by ID.
    pub fn get(&self, id: &SessionId) -> Option<&SessionHandle> {
        self.sessions.get(id)
    }

    /// Check whether a session is registered.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Get active session count.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// No sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
