//! Broadcast Coordinator
//!
//! Bridges session requests to the single `GameEngine` and fans the resulting
//! state out to every connected session.
//!
//! The coordinator runs as one task that owns the engine by value and drains a
//! command channel. Each command is handled to completion without awaiting,
//! so no two actions interleave and every session sees the same sequence of
//! snapshots.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn, debug, instrument};

use crate::core::hash::short_hex;
use crate::game::engine::GameEngine;
use crate::game::events::GameEvent;
use crate::network::protocol::{ClientMessage, ServerMessage, DiceAccepted, ServerError};
use crate::network::session::{SessionId, SessionRegistry, SessionSender};
use crate::core::dice::DiceSubmission;

/// Commands accepted by the coordinator task.
#[derive(Debug)]
pub enum CoordinatorCommand {
    /// Register a session; replies with its identifier.
    Connect {
        /// Outgoing channel for the new session.
        sender: SessionSender,
        /// Receives the assigned identifier.
        reply: oneshot::Sender<SessionId>,
    },

    /// Forget a session.
    Disconnect {
        /// Session that went away.
        session_id: SessionId,
    },

    /// Apply a request from a session.
    Action {
        /// Requesting session.
        session_id: SessionId,
        /// Decoded request.
        message: ClientMessage,
    },

    /// Queue a message for one session, in order with its other traffic.
    Notify {
        /// Target session.
        session_id: SessionId,
        /// Message to deliver.
        message: ServerMessage,
    },
}

/// Coordinator errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    /// The coordinator task has stopped.
    #[error("Coordinator has shut down")]
    Closed,
}

/// Owner of the engine and the session registry.
#[derive(Debug)]
pub struct BroadcastCoordinator {
    engine: GameEngine,
    sessions: SessionRegistry,
}

impl BroadcastCoordinator {
    /// Create a coordinator around the process-wide engine.
    pub fn new(engine: GameEngine) -> Self {
        Self {
            engine,
            sessions: SessionRegistry::new(),
        }
    }

    /// Read access to the engine.
    pub fn engine(&self) -> &GameEngine {
        &self.engine
    }

    /// Get active session count.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Register a session and send it the current snapshot.
    pub fn connect(&mut self, sender: SessionSender) -> SessionId {
        let session_id = self.sessions.register(sender);
        info!("Session {} connected ({} total)", session_id, self.sessions.len());

        self.sessions.send_to(&session_id, ServerMessage::StateUpdate(self.engine.get_state()));
        session_id
    }

    /// Unregister a session.
    pub fn disconnect(&mut self, session_id: &SessionId) -> bool {
        let connected_for = self.sessions.get(session_id)
            .map(|s| chrono::Utc::now().signed_duration_since(s.connected_at).num_seconds());

        let removed = self.sessions.unregister(session_id);
        if let Some(secs) = connected_for {
            info!("Session {} disconnected after {}s ({} remaining)", session_id, secs, self.sessions.len());
        }
        removed
    }

    /// Apply one request from a session.
    #[instrument(skip(self, message), fields(action = message.kind()))]
    pub fn handle(&mut self, session_id: SessionId, message: ClientMessage) {
        if !self.sessions.contains(&session_id) {
            warn!("Dropping {} from unknown session {}", message.kind(), session_id);
            return;
        }

        match message {
            ClientMessage::StartGame => self.start_game(),
            ClientMessage::EndGame => self.end_game(),
            ClientMessage::SubmitDice(submission) => self.submit_dice(session_id, &submission),
            ClientMessage::Ping { timestamp } => {
                self.sessions.send_to(&session_id, ServerMessage::pong(timestamp));
            }
        }
    }

    /// Reply to one session with an error, without touching state.
    pub fn reject(&mut self, session_id: &SessionId, error: ServerError) {
        debug!("Rejecting request from {}: {}", session_id, error.message);
        self.sessions.send_to(session_id, ServerMessage::Error(error));
    }

    fn start_game(&mut self) {
        let event = self.engine.reset();
        info!("Starting new game");
        self.log_event(&event);
        self.broadcast_state();
    }

    fn end_game(&mut self) {
        let event = self.engine.end_game();
        info!("Ending game after {} throws", self.engine.get_state().throw_count);
        self.log_event(&event);
        self.broadcast_state();
    }

    fn submit_dice(&mut self, session_id: SessionId, submission: &DiceSubmission) {
        let result = match self.engine.process_submission(submission) {
            Ok(result) => result,
            Err(e) => {
                warn!("Rejected dice {} / {} from {}: {}", submission.die1, submission.die2, session_id, e);
                self.reject(&session_id, ServerError::from(&e));
                return;
            }
        };

        info!("Dice submitted: {}, {} (sum {}, streak {})",
            result.roll.die1, result.roll.die2, result.sum, result.state.streak);
        for event in &result.events {
            self.log_event(event);
        }

        self.sessions.send_to(&session_id, ServerMessage::DiceAccepted(
            DiceAccepted::new(result.roll, result.rolled_seven)
        ));

        let reached = self.sessions.broadcast(ServerMessage::StateUpdate(result.state));
        debug!("State {} sent to {} sessions", short_hex(&self.engine.digest()), reached);
    }

    /// Push the current snapshot to every session.
    pub fn broadcast_state(&mut self) -> usize {
        let reached = self.sessions.broadcast(ServerMessage::StateUpdate(self.engine.get_state()));
        debug!("State {} sent to {} sessions", short_hex(&self.engine.digest()), reached);
        reached
    }

    fn log_event(&self, event: &GameEvent) {
        match event {
            GameEvent::GumboTime { gumbo_times, new_record } => {
                info!("Gumbo Time #{} this round{}", gumbo_times, if *new_record { " (new record)" } else { "" });
            }
            GameEvent::SevenOut { ended_streak: Some(streak) } => {
                info!("Seven out, streak of {} recorded", streak);
            }
            _ => debug!("Event {}", event.name()),
        }
    }

    /// Apply one command.
    pub fn dispatch(&mut self, command: CoordinatorCommand) {
        match command {
            CoordinatorCommand::Connect { sender, reply } => {
                let session_id = self.connect(sender);
                if reply.send(session_id).is_err() {
                    // Connection task gave up before we answered.
                    self.sessions.unregister(&session_id);
                }
            }
            CoordinatorCommand::Disconnect { session_id } => {
                self.disconnect(&session_id);
            }
            CoordinatorCommand::Action { session_id, message } => {
                self.handle(session_id, message);
            }
            CoordinatorCommand::Notify { session_id, message } => {
                self.sessions.send_to(&session_id, message);
            }
        }
    }

    /// Drain commands until every handle is dropped.
    #[instrument(skip_all)]
    pub async fn run(mut self, mut commands: mpsc::Receiver<CoordinatorCommand>) -> Self {
        info!("Coordinator running");
        while let Some(command) = commands.recv().await {
            self.dispatch(command);
        }
        info!("Coordinator stopped with {} sessions registered", self.sessions.len());
        self
    }

    /// Spawn the coordinator task and return a handle to it.
    pub fn spawn(self, buffer: usize) -> (CoordinatorHandle, JoinHandle<Self>) {
        let (tx, rx) = mpsc::channel(buffer);
        let task = tokio::spawn(self.run(rx));
        (CoordinatorHandle { tx }, task)
    }
}

/// Cloneable handle used by connection tasks.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorCommand>,
}

impl CoordinatorHandle {
    /// Register a session; the current snapshot is queued on `sender` first.
    pub async fn connect(&self, sender: SessionSender) -> Result<SessionId, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(CoordinatorCommand::Connect { sender, reply }).await
            .map_err(|_| CoordinatorError::Closed)?;
        rx.await.map_err(|_| CoordinatorError::Closed)
    }

    /// Unregister a session.
    pub async fn disconnect(&self, session_id: SessionId) -> Result<(), CoordinatorError> {
        self.tx.send(CoordinatorCommand::Disconnect { session_id }).await
            .map_err(|_| CoordinatorError::Closed)
    }

    /// Queue a request from a session.
    pub async fn submit(&self, session_id: SessionId, message: ClientMessage) -> Result<(), CoordinatorError> {
        self.tx.send(CoordinatorCommand::Action { session_id, message }).await
            .map_err(|_| CoordinatorError::Closed)
    }

    /// Queue a message for one session without touching game state.
    pub async fn notify(&self, session_id: SessionId, message: ServerMessage) -> Result<(), CoordinatorError> {
        self.tx.send(CoordinatorCommand::Notify { session_id, message }).await
            .map_err(|_| CoordinatorError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash::StateHash;
    use crate::game::state::GameState;
    use crate::network::protocol::ErrorCode;
    use crate::network::session::OutgoingMessage;
    use tokio::sync::mpsc::Receiver;

    // Large enough that no test session overflows unless it is meant to.
    const TEST_BUFFER: usize = 1024;

    fn connect(coordinator: &mut BroadcastCoordinator) -> (SessionId, Receiver<OutgoingMessage>) {
        let (tx, rx) = mpsc::channel(TEST_BUFFER);
        (coordinator.connect(tx), rx)
    }

    fn drain(rx: &mut Receiver<OutgoingMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(ServerMessage::clone(&msg));
        }
        out
    }

    fn states(messages: &[ServerMessage]) -> Vec<GameState> {
        messages.iter()
            .filter_map(|m| match m {
                ServerMessage::StateUpdate(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    fn digests(messages: &[ServerMessage]) -> Vec<StateHash> {
        states(messages).iter().map(GameState::compute_hash).collect()
    }

    fn dice(die1: i64, die2: i64) -> ClientMessage {
        ClientMessage::SubmitDice(DiceSubmission::new(die1, die2))
    }

    #[test]
    fn test_connect_sends_current_state() {
        let mut engine = GameEngine::new();
        engine.process_dice_roll(2, 3).unwrap();
        let mut coordinator = BroadcastCoordinator::new(engine);

        let (_, mut rx) = connect(&mut coordinator);
        let messages = drain(&mut rx);

        assert_eq!(messages.len(), 1);
        assert_eq!(states(&messages)[0].streak, 1);
        assert_eq!(coordinator.session_count(), 1);
    }

    #[test]
    fn test_start_game_broadcasts_to_everyone() {
        let mut coordinator = BroadcastCoordinator::new(GameEngine::new());
        let (requester, mut rx1) = connect(&mut coordinator);
        let (_, mut rx2) = connect(&mut coordinator);

        coordinator.handle(requester, dice(1, 1));
        drain(&mut rx1);
        drain(&mut rx2);

        coordinator.handle(requester, ClientMessage::StartGame);
        let m1 = drain(&mut rx1);
        let m2 = drain(&mut rx2);

        assert_eq!(states(&m1), vec![GameState::new()]);
        assert_eq!(states(&m2), vec![GameState::new()]);
    }

    #[test]
    fn test_end_game_freezes_and_broadcasts() {
        let mut coordinator = BroadcastCoordinator::new(GameEngine::new());
        let (requester, mut rx1) = connect(&mut coordinator);
        let (_, mut rx2) = connect(&mut coordinator);

        coordinator.handle(requester, dice(2, 2));
        coordinator.handle(requester, ClientMessage::EndGame);

        let last = states(&drain(&mut rx2)).pop().unwrap();
        assert!(!last.game_active);
        assert_eq!(last.throw_count, 1);
        assert_eq!(states(&drain(&mut rx1)).pop().unwrap(), last);
    }

    #[test]
    fn test_accepted_roll_acks_requester_only() {
        let mut coordinator = BroadcastCoordinator::new(GameEngine::new());
        let (requester, mut rx1) = connect(&mut coordinator);
        let (_, mut rx2) = connect(&mut coordinator);
        drain(&mut rx1);
        drain(&mut rx2);

        coordinator.handle(requester, dice(3, 4));

        let m1 = drain(&mut rx1);
        let m2 = drain(&mut rx2);

        assert_eq!(m1[0], ServerMessage::DiceAccepted(DiceAccepted {
            die1: 3, die2: 4, sum: 7, rolled_seven: true,
        }));
        assert!(matches!(m1[1], ServerMessage::StateUpdate(_)));
        assert_eq!(m1.len(), 2);

        assert_eq!(m2.len(), 1);
        assert_eq!(states(&m2)[0].throw_count, 1);
    }

    #[test]
    fn test_rejected_roll_errors_requester_only() {
        let mut coordinator = BroadcastCoordinator::new(GameEngine::new());
        let (requester, mut rx1) = connect(&mut coordinator);
        let (_, mut rx2) = connect(&mut coordinator);
        drain(&mut rx1);
        drain(&mut rx2);
        let before = coordinator.engine().get_state();

        coordinator.handle(requester, dice(0, 7));
        let m1 = drain(&mut rx1);
        assert_eq!(m1.len(), 1);
        match &m1[0] {
            ServerMessage::Error(e) => {
                assert_eq!(e.code, ErrorCode::InvalidDice);
                assert_eq!(e.message, "Invalid dice values");
            }
            other => panic!("expected error, got {:?}", other),
        }
        assert!(drain(&mut rx2).is_empty());

        coordinator.handle(requester, ClientMessage::EndGame);
        drain(&mut rx1);
        drain(&mut rx2);

        coordinator.handle(requester, dice(2, 3));
        let m1 = drain(&mut rx1);
        assert!(matches!(&m1[..], [ServerMessage::Error(ServerError { code: ErrorCode::InactiveGame, .. })]));
        assert!(drain(&mut rx2).is_empty());

        let after = coordinator.engine().get_state();
        assert_eq!(after.throw_count, before.throw_count);
        assert_eq!(after.dice_rolls, before.dice_rolls);
    }

    #[test]
    fn test_all_sessions_converge() {
        let mut coordinator = BroadcastCoordinator::new(GameEngine::new());
        let (a, mut rx_a) = connect(&mut coordinator);
        let (b, mut rx_b) = connect(&mut coordinator);
        let (_, mut rx_c) = connect(&mut coordinator);

        let script = [
            (a, dice(3, 4)),
            (b, dice(2, 3)),
            (a, dice(9, 1)),
            (b, dice(1, 1)),
            (a, ClientMessage::EndGame),
            (b, dice(2, 2)),
            (b, ClientMessage::StartGame),
            (a, dice(6, 6)),
        ];
        for (session, message) in script {
            coordinator.handle(session, message);
        }

        let da = digests(&drain(&mut rx_a));
        let db = digests(&drain(&mut rx_b));
        let dc = digests(&drain(&mut rx_c));

        // initial + 3 accepted rolls + end + start + 1 roll
        assert_eq!(da.len(), 7);
        assert_eq!(da, db);
        assert_eq!(db, dc);
        assert_eq!(*dc.last().unwrap(), coordinator.engine().digest());
    }

    #[test]
    fn test_random_traffic_converges() {
        use rand::{Rng, SeedableRng};
        use rand::rngs::StdRng;

        let mut rng = StdRng::seed_from_u64(0x6b0b);
        let mut coordinator = BroadcastCoordinator::new(GameEngine::new());
        let mut sessions: Vec<_> = (0..4).map(|_| connect(&mut coordinator)).collect();

        for _ in 0..500 {
            let requester = sessions[rng.gen_range(0..sessions.len())].0;
            let message = match rng.gen_range(0..100) {
                0 => ClientMessage::StartGame,
                1 => ClientMessage::EndGame,
                2..=4 => dice(rng.gen_range(-1..9), rng.gen_range(-1..9)),
                _ => dice(rng.gen_range(1..=6), rng.gen_range(1..=6)),
            };
            coordinator.handle(requester, message);
        }

        let expected = coordinator.engine().digest();
        let all: Vec<Vec<StateHash>> = sessions.iter_mut().map(|(_, rx)| digests(&drain(rx))).collect();
        for seen in &all {
            assert_eq!(seen, &all[0]);
            assert_eq!(*seen.last().unwrap(), expected);
        }
    }

    #[test]
    fn test_dead_session_does_not_affect_others() {
        let mut coordinator = BroadcastCoordinator::new(GameEngine::new());
        let (requester, mut rx1) = connect(&mut coordinator);
        let (_, rx2) = connect(&mut coordinator);
        drop(rx2);
        drain(&mut rx1);

        coordinator.handle(requester, dice(5, 5));

        assert_eq!(coordinator.session_count(), 1);
        assert_eq!(states(&drain(&mut rx1))[0].throw_count, 1);
    }

    #[test]
    fn test_stalled_session_is_dropped() {
        let mut coordinator = BroadcastCoordinator::new(GameEngine::new());
        let (requester, mut rx1) = connect(&mut coordinator);
        let (_, mut rx2) = connect(&mut coordinator);
        let (tx, _stalled_rx) = mpsc::channel(8);
        let stalled = coordinator.connect(tx);

        for i in 0..200 {
            let die = i % 3 + 1;
            coordinator.handle(requester, dice(die, die));
        }

        assert_eq!(coordinator.session_count(), 2);
        coordinator.handle(stalled, ClientMessage::StartGame);
        assert_eq!(coordinator.engine().get_state().throw_count, 200);

        let d1 = digests(&drain(&mut rx1));
        let d2 = digests(&drain(&mut rx2));
        // initial + one per roll
        assert_eq!(d1.len(), 201);
        assert_eq!(d1, d2);
        assert_eq!(*d1.last().unwrap(), coordinator.engine().digest());
    }

    #[test]
    fn test_late_joiner_sees_live_state() {
        let mut coordinator = BroadcastCoordinator::new(GameEngine::new());
        let (early, _rx) = connect(&mut coordinator);
        for (a, b) in [(1, 2), (2, 2), (4, 5)] {
            coordinator.handle(early, dice(a, b));
        }

        let (_, mut late) = connect(&mut coordinator);
        let snapshot = states(&drain(&mut late)).remove(0);
        assert_eq!(snapshot.streak, 3);
        assert_eq!(snapshot.throw_count, 3);
    }

    #[test]
    fn test_unknown_session_is_ignored() {
        let mut coordinator = BroadcastCoordinator::new(GameEngine::new());
        let (_, mut rx) = connect(&mut coordinator);
        drain(&mut rx);

        coordinator.handle(uuid::Uuid::nil(), ClientMessage::StartGame);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_ping_answered_privately() {
        let mut coordinator = BroadcastCoordinator::new(GameEngine::new());
        let (a, mut rx1) = connect(&mut coordinator);
        let (_, mut rx2) = connect(&mut coordinator);
        drain(&mut rx1);
        drain(&mut rx2);

        coordinator.handle(a, ClientMessage::Ping { timestamp: 99 });
        assert!(matches!(&drain(&mut rx1)[..], [ServerMessage::Pong { timestamp: 99, .. }]));
        assert!(drain(&mut rx2).is_empty());
    }

    #[tokio::test]
    async fn test_spawned_coordinator_serializes_commands() {
        let (handle, task) = BroadcastCoordinator::new(GameEngine::new()).spawn(16);

        let (tx1, mut rx1) = mpsc::channel(TEST_BUFFER);
        let (tx2, mut rx2) = mpsc::channel(TEST_BUFFER);
        let s1 = handle.connect(tx1).await.unwrap();
        let s2 = handle.connect(tx2).await.unwrap();
        assert_ne!(s1, s2);

        let mut writers = Vec::new();
        for (session, die) in [(s1, 1), (s2, 2), (s1, 3), (s2, 4)] {
            let handle = handle.clone();
            writers.push(tokio::spawn(async move {
                handle.submit(session, dice(die, die)).await.unwrap();
            }));
        }
        for writer in writers {
            writer.await.unwrap();
        }

        handle.disconnect(s2).await.unwrap();
        handle.notify(s1, ServerMessage::Shutdown { reason: "bye".to_string() }).await.unwrap();
        handle.notify(s2, ServerMessage::Shutdown { reason: "bye".to_string() }).await.unwrap();
        drop(handle);
        let coordinator = task.await.unwrap();

        assert_eq!(coordinator.engine().get_state().throw_count, 4);
        assert_eq!(coordinator.session_count(), 1);

        let m1 = drain(&mut rx1);
        let m2 = drain(&mut rx2);
        // initial snapshot + 4 rolls, identical for both sessions
        assert_eq!(digests(&m1).len(), 5);
        assert_eq!(digests(&m1), digests(&m2));
        assert!(matches!(m1.last(), Some(ServerMessage::Shutdown { .. })));
        assert!(matches!(m2.last(), Some(ServerMessage::StateUpdate(_))));
    }
}
