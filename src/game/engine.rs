//! Authoritative Game Engine
//!
//! The state machine that turns dice into streak, step and Gumbo Time
//! bookkeeping. Pure and synchronous: every operation either applies in full
//! or returns an error without touching the state.

use thiserror::Error;

use crate::core::dice::{DiceError, DiceRoll, DiceSubmission};
use crate::core::hash::StateHash;
use crate::game::events::GameEvent;
use crate::game::state::{GameState, GUMBO_STEPS};

/// Reasons a roll is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// Dice were submitted after the game ended.
    #[error("Game is not active")]
    InactiveGame,

    /// A die was not an integer in 1..=6.
    #[error("Invalid dice values")]
    InvalidDice(#[from] DiceError),
}

/// Result of an accepted roll.
#[derive(Debug, Clone)]
pub struct RollResult {
    /// The recorded roll.
    pub roll: DiceRoll,
    /// Sum of both dice.
    pub sum: u8,
    /// The roll ended the round.
    pub rolled_seven: bool,
    /// Snapshot after the roll.
    pub state: GameState,
    /// Events the roll produced, in order.
    pub events: Vec<GameEvent>,
}

/// Owner of the single authoritative `GameState`.
#[derive(Debug, Clone, Default)]
pub struct GameEngine {
    state: GameState,
}

impl GameEngine {
    /// Create an engine with an active, empty game.
    pub fn new() -> Self {
        Self { state: GameState::new() }
    }

    /// Clear all counters and history and reopen submissions.
    pub fn reset(&mut self) -> GameEvent {
        self.state = GameState::new();
        GameEvent::GameStarted
    }

    /// Close submissions, leaving every other field as it is.
    pub fn end_game(&mut self) -> GameEvent {
        self.state.game_active = false;
        GameEvent::GameEnded
    }

    /// Owned snapshot of the current state.
    pub fn get_state(&self) -> GameState {
        self.state.clone()
    }

    /// Digest of the current state.
    pub fn digest(&self) -> StateHash {
        self.state.compute_hash()
    }

    /// Whether submissions are accepted.
    pub fn is_active(&self) -> bool {
        self.state.game_active
    }

    /// Advance the game by one roll of typed dice.
    pub fn process_dice_roll(&mut self, die1: i64, die2: i64) -> Result<RollResult, GameError> {
        self.ensure_active()?;
        let roll = DiceRoll::new(die1, die2)?;
        Ok(self.apply_roll(roll))
    }

    /// Advance the game by one roll as submitted over the wire.
    ///
    /// Activity is checked before the dice are looked at, so an ended game
    /// reports `InactiveGame` even for garbage dice.
    pub fn process_submission(&mut self, submission: &DiceSubmission) -> Result<RollResult, GameError> {
        self.ensure_active()?;
        let roll = submission.parse()?;
        Ok(self.apply_roll(roll))
    }

    fn ensure_active(&self) -> Result<(), GameError> {
        if self.state.game_active {
            Ok(())
        } else {
            Err(GameError::InactiveGame)
        }
    }

    /// Apply a validated roll. Infallible: all checks happen before this.
    fn apply_roll(&mut self, roll: DiceRoll) -> RollResult {
        let state = &mut self.state;
        let mut events = Vec::with_capacity(2);

        state.throw_count += 1;
        state.dice_rolls.push(roll);

        if roll.is_seven() {
            let ended_streak = (state.streak > 0).then_some(state.streak);
            if let Some(streak) = ended_streak {
                state.streak_history.push(streak);
            }

            state.streak = 0;
            state.gumbo_step = 0;
            state.gumbo_times = 0;

            events.push(GameEvent::SevenOut { ended_streak });
        } else {
            state.streak += 1;
            state.gumbo_step += 1;
            events.push(GameEvent::PointMade { sum: roll.sum(), streak: state.streak });

            if state.gumbo_step == GUMBO_STEPS {
                state.gumbo_times += 1;
                state.gumbo_step = 0;

                let new_record = state.gumbo_times > state.max_gumbo_slams;
                if new_record {
                    state.max_gumbo_slams = state.gumbo_times;
                }

                events.push(GameEvent::GumboTime { gumbo_times: state.gumbo_times, new_record });
            }
        }

        state.recompute_analytics();

        RollResult {
            roll,
            sum: roll.sum(),
            rolled_seven: roll.is_seven(),
            state: state.clone(),
            events,
        }
    }
}
