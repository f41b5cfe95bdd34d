//! Five-stage dramatic curve.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Significant events needed to move from one stage to the next.
pub const EVENTS_PER_STAGE: u32 = 3;

/// Stages of the dramatic arc, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Inicio,
    Ascenso,
    Climax,
    Caida,
    Epilogo,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Inicio,
        Stage::Ascenso,
        Stage::Climax,
        Stage::Caida,
        Stage::Epilogo,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Inicio => "inicio",
            Stage::Ascenso => "ascenso",
            Stage::Climax => "climax",
            Stage::Caida => "caida",
            Stage::Epilogo => "epilogo",
        }
    }

    /// Stage reached after `counter` significant events.
    pub fn for_counter(counter: u32) -> Self {
        let index = (counter / EVENTS_PER_STAGE).min(Stage::ALL.len() as u32 - 1);
        Stage::ALL[index as usize]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Counts significant events and maps them onto a [`Stage`].
///
/// The stage never moves backwards except through [`DramaticCurve::reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DramaticCurve {
    counter: u32,
}

impl DramaticCurve {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn stage(&self) -> Stage {
        Stage::for_counter(self.counter)
    }

    /// Record one significant event and return the resulting stage.
    pub fn advance(&mut self) -> Stage {
        self.counter = self.counter.saturating_add(1);
        self.stage()
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_k_times() {
        for k in 0..30u32 {
            let mut curve = DramaticCurve::new();
            for _ in 0..k {
                curve.advance();
            }
            let expected = Stage::ALL[(k / 3).min(4) as usize];
            assert_eq!(curve.stage(), expected, "after {k} events");
            assert_eq!(curve.counter(), k);
        }
    }

    #[test]
    fn test_stage_never_moves_backwards() {
        let mut curve = DramaticCurve::new();
        let mut previous = curve.stage();
        for _ in 0..20 {
            let stage = curve.advance();
            assert!(stage >= previous);
            previous = stage;
        }
        assert_eq!(previous, Stage::Epilogo);
    }

    #[test]
    fn test_reset_returns_to_inicio() {
        let mut curve = DramaticCurve::new();
        for _ in 0..7 {
            curve.advance();
        }
        assert_eq!(curve.stage(), Stage::Climax);
        curve.reset();
        assert_eq!(curve, DramaticCurve::new());
        assert_eq!(curve.stage(), Stage::Inicio);
    }

    #[test]
    fn test_stage_wire_names() {
        assert_eq!(serde_json::to_string(&Stage::Caida).unwrap(), "\"caida\"");
        assert_eq!(
            serde_json::from_str::<Stage>("\"epilogo\"").unwrap(),
            Stage::Epilogo
        );
    }
}
