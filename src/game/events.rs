//! Game Events
//!
//! What a single engine operation changed, for logging and for callers that
//! want more than the resulting snapshot.

/// Game event data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameEvent {
    /// State was reset for a new game.
    GameStarted,

    /// Submissions are closed; the state is frozen.
    GameEnded,

    /// A non-seven roll extended the streak.
    PointMade {
        /// Sum of the roll.
        sum: u8,
        /// Streak after the roll.
        streak: u32,
    },

    /// The step counter wrapped and a Gumbo Time was earned.
    GumboTime {
        /// Gumbo Times in this round, including this one.
        gumbo_times: u32,
        /// Raised `max_gumbo_slams`.
        new_record: bool,
    },

    /// A seven ended the round.
    SevenOut {
        /// Streak that was recorded, `None` when the round had no points.
        ended_streak: Option<u32>,
    },
}

impl GameEvent {
    /// Short name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::GameStarted => "game_started",
            GameEvent::GameEnded => "game_ended",
            GameEvent::PointMade { .. } => "point_made",
            GameEvent::GumboTime { .. } => "gumbo_time",
            GameEvent::SevenOut { .. } => "seven_out",
        }
    }
}
