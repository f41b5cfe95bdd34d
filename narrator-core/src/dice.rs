//! Dice rolling system.
//!
//! Supports the `[count]d<sides>[+/-modifier]` notation, the d20 ability
//! check with its fixed outcome table, and injectable dice sources so that
//! callers can replay or force exact rolls.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest number of dice accepted in one expression.
pub const MAX_DICE: u32 = 100;

/// Largest die accepted in one expression.
pub const MAX_SIDES: u32 = 1000;

/// Largest flat modifier, either sign, accepted in one expression.
pub const MAX_MODIFIER: u32 = 1000;

/// Error type for dice parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Dice out of range: {count}d{sides}")]
    OutOfRange { count: u32, sides: u32 },
    #[error("Modifier out of range: {0}")]
    ModifierOutOfRange(u32),
    #[error("No dice specified")]
    NoDice,
}

/// Anything that can produce die faces.
pub trait DiceSource {
    /// Roll one die, returning a value in `1..=sides`.
    fn roll_die(&mut self, sides: u32) -> u32;
}

/// Uniformly random dice backed by any `rand` generator.
#[derive(Debug, Clone)]
pub struct RandomDice<R = StdRng> {
    rng: R,
}

impl RandomDice<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Deterministic dice, for tests and replays.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> RandomDice<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> DiceSource for RandomDice<R> {
    fn roll_die(&mut self, sides: u32) -> u32 {
        self.rng.gen_range(1..=sides.max(1))
    }
}

/// Dice that return queued faces first, then fall back to seeded rolls.
///
/// Queued faces are clamped into the die's range.
#[derive(Debug, Clone)]
pub struct LoadedDice {
    queue: VecDeque<u32>,
    fallback: RandomDice<StdRng>,
}

impl LoadedDice {
    pub fn new(faces: impl IntoIterator<Item = u32>) -> Self {
        Self {
            queue: faces.into_iter().collect(),
            fallback: RandomDice::seeded(0),
        }
    }

    /// Faces not yet consumed.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl DiceSource for LoadedDice {
    fn roll_die(&mut self, sides: u32) -> u32 {
        match self.queue.pop_front() {
            Some(face) => face.clamp(1, sides.max(1)),
            None => self.fallback.roll_die(sides),
        }
    }
}

/// A parsed `[count]d<sides>[+/-modifier]` expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceExpression {
    pub count: u32,
    pub sides: u32,
    pub modifier: i32,
}

impl DiceExpression {
    pub const fn new(count: u32, sides: u32, modifier: i32) -> Self {
        Self {
            count,
            sides,
            modifier,
        }
    }

    /// Parse a dice notation string.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let notation: String = notation
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if notation.is_empty() {
            return Err(DiceError::NoDice);
        }

        let invalid = || DiceError::InvalidNotation(notation.clone());

        let d_pos = notation.find('d').ok_or_else(invalid)?;
        let count_str = &notation[..d_pos];
        let rest = &notation[d_pos + 1..];

        let count = if count_str.is_empty() {
            1
        } else {
            digits(count_str).ok_or_else(invalid)?
        };

        let (sides_str, modifier) = match rest.find(['+', '-']) {
            Some(sign_pos) => {
                let value = digits(&rest[sign_pos + 1..]).ok_or_else(invalid)?;
                if value > MAX_MODIFIER {
                    return Err(DiceError::ModifierOutOfRange(value));
                }
                let value = i32::try_from(value).map_err(|_| invalid())?;
                let signed = if rest[sign_pos..].starts_with('-') {
                    -value
                } else {
                    value
                };
                (&rest[..sign_pos], signed)
            }
            None => (rest, 0),
        };

        let sides = digits(sides_str).ok_or_else(invalid)?;

        if count == 0 || sides == 0 || count > MAX_DICE || sides > MAX_SIDES {
            return Err(DiceError::OutOfRange { count, sides });
        }

        Ok(Self::new(count, sides, modifier))
    }

    /// Roll using the given dice source.
    pub fn roll_with<D: DiceSource + ?Sized>(&self, dice: &mut D) -> RollResult {
        let rolls: Vec<u32> = (0..self.count).map(|_| dice.roll_die(self.sides)).collect();
        let total = add_modifier(&rolls, self.modifier);

        // Natural 20/1 only means something for a lone d20
        let single_d20 = self.is_single_d20();
        let natural = rolls.first().copied();

        RollResult {
            expression: self.to_string(),
            count: self.count,
            sides: self.sides,
            natural_20: single_d20 && natural == Some(20),
            natural_1: single_d20 && natural == Some(1),
            rolls,
            modifier: self.modifier,
            total,
        }
    }

    /// Roll with thread-local randomness.
    pub fn roll(&self) -> RollResult {
        self.roll_with(&mut RandomDice::new(rand::thread_rng()))
    }

    pub fn is_single_d20(&self) -> bool {
        self.count == 1 && self.sides == 20
    }
}

/// Sum of the faces plus `modifier`, saturating at the `i32` bounds.
fn add_modifier(rolls: &[u32], modifier: i32) -> i32 {
    let sum: i64 = rolls.iter().map(|&r| i64::from(r)).sum::<i64>() + i64::from(modifier);
    i32::try_from(sum).unwrap_or(if sum < 0 { i32::MIN } else { i32::MAX })
}

/// Non-empty run of ASCII digits. `str::parse` alone would accept a `+` prefix.
fn digits(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpression::parse(s)
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 => write!(f, "+{m}"),
            m => write!(f, "{m}"),
        }
    }
}

/// Complete result of a dice roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollResult {
    pub expression: String,
    pub count: u32,
    pub sides: u32,
    pub rolls: Vec<u32>,
    pub modifier: i32,
    pub total: i32,
    pub natural_20: bool,
    pub natural_1: bool,
}

impl RollResult {
    /// Format the individual dice results for display.
    pub fn dice_display(&self) -> String {
        let faces = format!(
            "[{}]",
            self.rolls
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        match self.modifier {
            0 => faces,
            m if m > 0 => format!("{faces} + {m}"),
            m => format!("{faces} - {}", m.abs()),
        }
    }

    /// Check if the roll meets or exceeds a DC.
    pub fn meets_dc(&self, dc: i32) -> bool {
        self.total >= dc
    }

    pub fn is_critical(&self) -> bool {
        self.natural_20
    }

    pub fn is_fumble(&self) -> bool {
        self.natural_1
    }

    /// The audit record for this roll.
    pub fn to_log_entry(&self) -> DiceLogEntry {
        DiceLogEntry {
            expression: self.expression.clone(),
            rolls: self.rolls.clone(),
            total: self.total,
        }
    }
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} = {}", self.expression, self.dice_display(), self.total)
    }
}

/// One replayable entry of a resolution's dice log.
///
/// The serialized layout `{expression, rolls, total}` is the audit format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceLogEntry {
    pub expression: String,
    pub rolls: Vec<u32>,
    pub total: i32,
}

impl DiceLogEntry {
    /// Re-add the faces and the expression's modifier.
    ///
    /// Returns `None` if the expression no longer parses or the faces do
    /// not fit it.
    pub fn recomputed_total(&self) -> Option<i32> {
        let expr = DiceExpression::parse(&self.expression).ok()?;
        if self.rolls.len() != expr.count as usize
            || self.rolls.iter().any(|&r| r == 0 || r > expr.sides)
        {
            return None;
        }
        Some(add_modifier(&self.rolls, expr.modifier))
    }
}

/// Outcome bins of an ability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    CriticalSuccess,
    CriticalFailure,
    Success,
    PartialSuccess,
    Failure,
}

impl CheckOutcome {
    /// Fixed table: natural 20 and natural 1 win outright, then the total
    /// is compared against 15 and 10.
    pub fn classify(natural: u32, total: i32) -> Self {
        match (natural, total) {
            (20, _) => CheckOutcome::CriticalSuccess,
            (1, _) => CheckOutcome::CriticalFailure,
            (_, t) if t >= 15 => CheckOutcome::Success,
            (_, t) if t >= 10 => CheckOutcome::PartialSuccess,
            _ => CheckOutcome::Failure,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CheckOutcome::CriticalSuccess => "critical_success",
            CheckOutcome::CriticalFailure => "critical_failure",
            CheckOutcome::Success => "success",
            CheckOutcome::PartialSuccess => "partial_success",
            CheckOutcome::Failure => "failure",
        }
    }
}

/// Result of an ability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub label: String,
    pub roll: RollResult,
    pub outcome: CheckOutcome,
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.label, self.outcome.name(), self.roll)
    }
}

/// Convenience function to roll dice from a notation string.
pub fn roll_notation(notation: &str) -> Option<RollResult> {
    DiceExpression::parse(notation).ok().map(|e| e.roll())
}

/// Roll a notation string with an explicit dice source.
pub fn roll_notation_with<D: DiceSource + ?Sized>(notation: &str, dice: &mut D) -> Option<RollResult> {
    DiceExpression::parse(notation)
        .ok()
        .map(|e| e.roll_with(dice))
}

/// Roll one d20 plus `modifier` and classify it.
pub fn ability_check(label: &str, modifier: i32) -> CheckResult {
    ability_check_with(label, modifier, &mut RandomDice::new(rand::thread_rng()))
}

pub fn ability_check_with<D: DiceSource + ?Sized>(
    label: &str,
    modifier: i32,
    dice: &mut D,
) -> CheckResult {
    let roll = DiceExpression::new(1, 20, modifier).roll_with(dice);
    let natural = roll.rolls.first().copied().unwrap_or(1);
    CheckResult {
        label: label.to_string(),
        outcome: CheckOutcome::classify(natural, roll.total),
        roll,
    }
}
