//! Dice Primitives
//!
//! Validated dice values and the untyped wire submission they are parsed from.
//! A `DiceRoll` can only be constructed with both faces in `[DIE_MIN, DIE_MAX]`.

use serde::{Serialize, Deserialize};
use serde_json::Value;
use thiserror::Error;

/// Lowest face of a die.
pub const DIE_MIN: u8 = 1;

/// Highest face of a die.
pub const DIE_MAX: u8 = 6;

/// The sum that ends a round.
pub const SEVEN: u8 = 7;

/// Dice validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    /// Value is an integer outside `[DIE_MIN, DIE_MAX]`.
    #[error("die value {0} is outside 1..=6")]
    OutOfRange(i64),

    /// Value is missing, fractional, or not a number.
    #[error("die value is not an integer")]
    NotAnInteger,
}

/// A recorded roll of two dice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "UncheckedRoll")]
pub struct DiceRoll {
    /// First die face.
    pub die1: u8,
    /// Second die face.
    pub die2: u8,
}

impl DiceRoll {
    /// Create a roll, validating both faces.
    pub fn new(die1: i64, die2: i64) -> Result<Self, DiceError> {
        Ok(Self {
            die1: check_face(die1)?,
            die2: check_face(die2)?,
        })
    }

    /// Sum of both faces (2..=12).
    #[inline]
    pub fn sum(self) -> u8 {
        self.die1 + self.die2
    }

    /// Both dice show the same face.
    #[inline]
    pub fn is_hard(self) -> bool {
        self.die1 == self.die2
    }

    /// The roll sums to seven.
    #[inline]
    pub fn is_seven(self) -> bool {
        self.sum() == SEVEN
    }
}

#[derive(Deserialize)]
struct UncheckedRoll {
    die1: i64,
    die2: i64,
}

impl TryFrom<UncheckedRoll> for DiceRoll {
    type Error = DiceError;

    fn try_from(raw: UncheckedRoll) -> Result<Self, Self::Error> {
        DiceRoll::new(raw.die1, raw.die2)
    }
}

fn check_face(value: i64) -> Result<u8, DiceError> {
    if (DIE_MIN as i64..=DIE_MAX as i64).contains(&value) {
        Ok(value as u8)
    } else {
        Err(DiceError::OutOfRange(value))
    }
}

/// Dice as submitted over the wire, before validation.
///
/// Values stay untyped so that a malformed die (`3.5`, `"4"`, missing)
/// is reported as an invalid roll rather than an undecodable message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiceSubmission {
    /// First die as sent.
    #[serde(default)]
    pub die1: Value,
    /// Second die as sent.
    #[serde(default)]
    pub die2: Value,
}

impl DiceSubmission {
    /// Build a submission from integer faces.
    pub fn new(die1: i64, die2: i64) -> Self {
        Self {
            die1: Value::from(die1),
            die2: Value::from(die2),
        }
    }

    /// Validate into a roll.
    pub fn parse(&self) -> Result<DiceRoll, DiceError> {
        DiceRoll::new(integer_value(&self.die1)?, integer_value(&self.die2)?)
    }
}

/// Integral JSON number, accepting whole floats such as `4.0`.
fn integer_value(value: &Value) -> Result<i64, DiceError> {
    if let Some(n) = value.as_i64() {
        return Ok(n);
    }
    match value.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
        _ => Err(DiceError::NotAnInteger),
    }
}
