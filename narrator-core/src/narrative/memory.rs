//! Narrative memory.
//!
//! Keeps the full timeline of resolved events plus a short emotion history
//! used for the rolling average.

use super::curve::Stage;
use super::theme::Theme;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum number of emotion levels kept for the rolling average.
pub const EMOTION_HISTORY_CAP: usize = 100;

/// Emotional intensity bounds.
pub const MIN_EMOTION: u8 = 1;
pub const MAX_EMOTION: u8 = 5;

/// One remembered event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub theme: Theme,
    pub emotion: u8,
    pub stage: Stage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryManager {
    timeline: Vec<MemoryRecord>,
    emotions: VecDeque<u8>,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. The emotion level is clamped into range.
    pub fn remember(&mut self, mut record: MemoryRecord) {
        record.emotion = record.emotion.clamp(MIN_EMOTION, MAX_EMOTION);
        self.emotions.push_back(record.emotion);
        while self.emotions.len() > EMOTION_HISTORY_CAP {
            self.emotions.pop_front();
        }
        self.timeline.push(record);
    }

    /// Mean of the emotion history, `0.0` when nothing happened yet.
    pub fn average_emotion(&self) -> f32 {
        if self.emotions.is_empty() {
            return 0.0;
        }
        let sum: u32 = self.emotions.iter().map(|&e| u32::from(e)).sum();
        sum as f32 / self.emotions.len() as f32
    }

    pub fn last_event(&self) -> Option<&MemoryRecord> {
        self.timeline.last()
    }

    pub fn timeline(&self) -> &[MemoryRecord] {
        &self.timeline
    }

    pub fn emotions(&self) -> impl Iterator<Item = u8> + '_ {
        self.emotions.iter().copied()
    }

    pub fn emotion_count(&self) -> usize {
        self.emotions.len()
    }
}
