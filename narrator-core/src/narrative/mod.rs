//! Narrative state tracking.
//!
//! Each session owns one [`NarrativeState`], which aggregates:
//! - the dramatic curve (`curve`)
//! - theme frequencies (`theme`)
//! - the event timeline and emotion history (`memory`)
//! - the genre/mood profile (`mood`)
//!
//! The [`StoryDirector`](director::StoryDirector) reads a snapshot of this
//! state to pick a narrative beat for the renderer.

pub mod curve;
pub mod director;
pub mod memory;
pub mod mood;
pub mod theme;

pub use curve::{DramaticCurve, Stage};
pub use director::{NarrativeNode, StoryDirector};
pub use memory::{MemoryManager, MemoryRecord, EMOTION_HISTORY_CAP};
pub use mood::{Genre, Mood, MoodProfile};
pub use theme::{Theme, ThemeTracker};

use crate::action::Action;
use crate::intent::IntentCategory;
use crate::rules::{Outcome, Resolution};
use serde::{Deserialize, Serialize};

/// Emotion level at or above which an action moves the dramatic curve.
pub const SIGNIFICANT_EMOTION: u8 = 3;

/// Emotional intensity of a resolved action, 1 to 5.
pub fn emotion_level(resolution: &Resolution) -> u8 {
    let category = resolution.intent.category;
    let base: i8 = match category {
        IntentCategory::Attack | IntentCategory::CastSpell => 4,
        IntentCategory::SkillCheck => 3,
        IntentCategory::Investigate | IntentCategory::Talk => 2,
        IntentCategory::Move | IntentCategory::Interact => 1,
    };
    let adjust = match (category, resolution.outcome) {
        (IntentCategory::Attack, Outcome::Success | Outcome::CriticalSuccess) => 1,
        (
            IntentCategory::SkillCheck | IntentCategory::Investigate,
            Outcome::Failure | Outcome::CriticalFailure,
        ) => -1,
        _ => 0,
    };
    (base + adjust).clamp(1, 5) as u8
}

/// A movement of the dramatic curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageChange {
    pub from: Stage,
    pub to: Stage,
}

/// What recording one resolution did to the state.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub emotion: u8,
    pub theme: Theme,
    pub stage_change: Option<StageChange>,
}

/// Per-session narrative state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativeState {
    pub curve: DramaticCurve,
    pub themes: ThemeTracker,
    pub memory: MemoryManager,
    pub mood: MoodProfile,
}

impl NarrativeState {
    pub fn new(genre: Genre) -> Self {
        Self {
            mood: MoodProfile::new(genre),
            ..Self::default()
        }
    }

    /// Fold one resolved action into the state.
    pub fn record(&mut self, resolution: &Resolution, action: &Action) -> Recorded {
        let emotion = emotion_level(resolution);
        let theme = self.themes.observe(&action.text);

        let before = self.curve.stage();
        if emotion >= SIGNIFICANT_EMOTION {
            self.curve.advance();
        }
        let after = self.curve.stage();

        let description = resolution
            .steps
            .first()
            .map(|s| s.description.clone())
            .unwrap_or_else(|| action.text.clone());

        self.memory.remember(MemoryRecord {
            timestamp: action.timestamp,
            description,
            theme,
            emotion,
            stage: after,
        });
        self.mood.update(self.memory.average_emotion());

        Recorded {
            emotion,
            theme,
            stage_change: (before != after).then_some(StageChange {
                from: before,
                to: after,
            }),
        }
    }

    pub fn stage(&self) -> Stage {
        self.curve.stage()
    }

    /// Explicit reset of the dramatic curve. Themes and memory are kept.
    pub fn reset_curve(&mut self) {
        self.curve.reset();
    }

    pub fn set_genre(&mut self, genre: Genre) {
        self.mood.genre = genre;
    }

    pub fn snapshot(&self) -> NarrativeSnapshot {
        NarrativeSnapshot {
            stage: self.curve.stage(),
            counter: self.curve.counter(),
            average_emotion: self.memory.average_emotion(),
            recurrent_theme: self.themes.recurrent_theme(),
            mood: self.mood,
            last_event: self.memory.last_event().cloned(),
            events: self.memory.timeline().len(),
        }
    }
}

/// Cheap read-only view of a [`NarrativeState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeSnapshot {
    pub stage: Stage,
    pub counter: u32,
    pub average_emotion: f32,
    pub recurrent_theme: Theme,
    pub mood: MoodProfile,
    pub last_event: Option<MemoryRecord>,
    pub events: usize,
}

impl NarrativeSnapshot {
    /// Emotion level used to pick narrative beats.
    pub fn emotion(&self) -> u8 {
        (self.average_emotion.round() as u8).clamp(memory::MIN_EMOTION, memory::MAX_EMOTION)
    }
}

impl Default for NarrativeSnapshot {
    fn default() -> Self {
        NarrativeState::default().snapshot()
    }
}
