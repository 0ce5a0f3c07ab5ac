//! Game State Definitions
//!
//! The single authoritative table state and its derived analytics.
//! Serialized camelCase, this is exactly the snapshot pushed to sessions.

use serde::{Serialize, Deserialize};

use crate::core::dice::DiceRoll;
use crate::core::hash::{StateHash, StateHasher};

/// Non-seven rolls needed for one Gumbo Time.
pub const GUMBO_STEPS: u8 = 4;

// =============================================================================
// GAME STATE
// =============================================================================

/// Full state of the table.
///
/// Round-scoped fields (`streak`, `gumbo_step`, `gumbo_times`) are cleared by a
/// seven. Session-scoped fields survive sevens and are cleared only by a reset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// Consecutive non-seven rolls in this round.
    pub streak: u32,

    /// Progress toward the next Gumbo Time (0..GUMBO_STEPS).
    pub gumbo_step: u8,

    /// Gumbo Times earned in this round.
    pub gumbo_times: u32,

    /// Rolls since the last reset.
    pub throw_count: u32,

    /// Every roll since the last reset, oldest first.
    pub dice_rolls: Vec<DiceRoll>,

    /// Best `gumbo_times` reached since the last reset.
    pub max_gumbo_slams: u32,

    /// Lengths of streaks that ended in a seven.
    pub streak_history: Vec<u32>,

    /// Percentage of hard rolls, derived.
    pub hard_percent: u8,

    /// Rounded mean of `streak_history`, derived.
    pub avg_streak: u32,

    /// Whether dice submissions are accepted.
    pub game_active: bool,
}

impl GameState {
    /// Fresh state for a new game.
    pub fn new() -> Self {
        Self {
            streak: 0,
            gumbo_step: 0,
            gumbo_times: 0,
            throw_count: 0,
            dice_rolls: Vec::new(),
            max_gumbo_slams: 0,
            streak_history: Vec::new(),
            hard_percent: 0,
            avg_streak: 0,
            game_active: true,
        }
    }

    /// Number of recorded hard rolls.
    pub fn hard_roll_count(&self) -> usize {
        self.dice_rolls.iter().filter(|r| r.is_hard()).count()
    }

    /// Recompute derived analytics from the full history.
    pub fn recompute_analytics(&mut self) {
        self.hard_percent = rounded_percent(self.hard_roll_count() as u64, self.throw_count as u64) as u8;

        let total: u64 = self.streak_history.iter().map(|&s| s as u64).sum();
        self.avg_streak = rounded_div(total, self.streak_history.len() as u64) as u32;
    }

    /// Compute deterministic digest of this snapshot.
    pub fn compute_hash(&self) -> StateHash {
        let mut hasher = StateHasher::for_game_state();

        hasher.update_u32(self.streak);
        hasher.update_u8(self.gumbo_step);
        hasher.update_u32(self.gumbo_times);
        hasher.update_u32(self.throw_count);

        hasher.update_len(self.dice_rolls.len());
        for roll in &self.dice_rolls {
            hasher.update_u8(roll.die1);
            hasher.update_u8(roll.die2);
        }

        hasher.update_u32(self.max_gumbo_slams);

        hasher.update_len(self.streak_history.len());
        for &streak in &self.streak_history {
            hasher.update_u32(streak);
        }

        hasher.update_u8(self.hard_percent);
        hasher.update_u32(self.avg_streak);
        hasher.update_bool(self.game_active);

        hasher.finalize()
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

/// `round(numerator / denominator)` with halves rounded up, 0 when empty.
fn rounded_div(numerator: u64, denominator: u64) -> u64 {
    if denominator == 0 {
        return 0;
    }
    (2 * numerator + denominator) / (2 * denominator)
}

/// `round(100 * part / whole)` with halves rounded up, 0 when empty.
fn rounded_percent(part: u64, whole: u64) -> u64 {
    rounded_div(100 * part, whole)
}
