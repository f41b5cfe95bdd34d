//! Story director: picks a narrative beat that fits the moment.

use super::curve::Stage;
use crate::action::Language;
use rand::seq::SliceRandom;
use rand::Rng;
use std::ops::RangeInclusive;

/// Line used when no node fits.
pub const NEUTRAL_BEAT: (&str, &str) = (
    "La historia sigue su curso.",
    "The story moves on.",
);

/// A candidate narrative beat.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeNode {
    pub stages: Vec<Stage>,
    pub emotion: RangeInclusive<u8>,
    pub es: String,
    pub en: String,
}

impl NarrativeNode {
    pub fn new(
        stages: &[Stage],
        emotion: RangeInclusive<u8>,
        es: impl Into<String>,
        en: impl Into<String>,
    ) -> Self {
        Self {
            stages: stages.to_vec(),
            emotion,
            es: es.into(),
            en: en.into(),
        }
    }

    pub fn fits(&self, stage: Stage, emotion: u8) -> bool {
        self.stages.contains(&stage) && self.emotion.contains(&emotion)
    }

    pub fn line(&self, language: Language) -> &str {
        language.pick(&self.es, &self.en)
    }
}

type NodeRow = (&'static [Stage], u8, u8, &'static str, &'static str);

const BUILTIN_NODES: &[NodeRow] = &[
    (
        &[Stage::Inicio],
        1,
        2,
        "El mundo aún parece tranquilo, pero algo se agita en las sombras.",
        "The world still seems calm, but something stirs in the shadows.",
    ),
    (
        &[Stage::Inicio, Stage::Ascenso],
        3,
        5,
        "Los primeros ecos del peligro resuenan a lo lejos.",
        "The first echoes of danger ring out in the distance.",
    ),
    (
        &[Stage::Ascenso],
        1,
        3,
        "Cada paso os acerca a algo que nadie quiere nombrar.",
        "Every step brings you closer to something no one wants to name.",
    ),
    (
        &[Stage::Ascenso, Stage::Climax],
        4,
        5,
        "La tensión se vuelve insoportable.",
        "The tension becomes unbearable.",
    ),
    (
        &[Stage::Climax],
        1,
        5,
        "Todo se decide ahora.",
        "Everything is decided now.",
    ),
    (
        &[Stage::Caida],
        1,
        3,
        "El polvo empieza a asentarse.",
        "The dust begins to settle.",
    ),
    (
        &[Stage::Caida],
        4,
        5,
        "Aún quedan brasas de la batalla.",
        "Embers of the battle still glow.",
    ),
    (
        &[Stage::Epilogo],
        1,
        5,
        "Las canciones de esta historia ya se están escribiendo.",
        "The songs of this tale are already being written.",
    ),
];

/// Chooses a beat from nodes matching the current stage and emotion.
#[derive(Debug, Clone)]
pub struct StoryDirector {
    nodes: Vec<NarrativeNode>,
}

impl Default for StoryDirector {
    fn default() -> Self {
        Self::with_nodes(
            BUILTIN_NODES
                .iter()
                .map(|&(stages, lo, hi, es, en)| NarrativeNode::new(stages, lo..=hi, es, en))
                .collect(),
        )
    }
}

impl StoryDirector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(nodes: Vec<NarrativeNode>) -> Self {
        Self { nodes }
    }

    /// Nodes eligible for this stage and emotion level.
    pub fn candidates(&self, stage: Stage, emotion: u8) -> Vec<&NarrativeNode> {
        self.nodes.iter().filter(|n| n.fits(stage, emotion)).collect()
    }

    /// Uniformly pick an eligible beat, or the neutral line if none fits.
    pub fn next_beat<R: Rng + ?Sized>(
        &self,
        stage: Stage,
        emotion: u8,
        language: Language,
        rng: &mut R,
    ) -> &str {
        let candidates = self.candidates(stage, emotion);
        match candidates.choose(rng).copied() {
            Some(node) => node.line(language),
            None => language.pick(NEUTRAL_BEAT.0, NEUTRAL_BEAT.1),
        }
    }
}
