//! Theme detection and frequency tracking.

use crate::intent::{matches_keyword, normalize};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Betrayal,
    Hope,
    Vengeance,
    Mystery,
}

/// Detection order. Mystery has no keywords; it is what is left.
const THEME_KEYWORDS: &[(Theme, &[&str])] = &[
    (
        Theme::Betrayal,
        &[
            "traici*", "traidor*", "traiciono", "engan*", "mentir*", "miente", "betray*",
            "traitor*", "deceiv*", "deceit*", "lie", "lies",
        ],
    ),
    (
        Theme::Hope,
        &[
            "esperanz*", "salvar", "salvo", "rescat*", "curo", "curar", "sanar", "ayud*", "proteg*",
            "hope*", "rescue*", "save", "heal*", "help*", "protect*", "cure",
        ],
    ),
    (
        Theme::Vengeance,
        &[
            "vengan*", "vengar*", "represal*", "castig*", "revenge*", "aveng*", "venge*",
            "retaliat*", "punish*",
        ],
    ),
];

impl Theme {
    pub fn name(&self) -> &'static str {
        match self {
            Theme::Betrayal => "betrayal",
            Theme::Hope => "hope",
            Theme::Vengeance => "vengeance",
            Theme::Mystery => "mystery",
        }
    }

    /// Detect the theme of a piece of text.
    pub fn detect(text: &str) -> Self {
        let normalized = normalize(text);
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        THEME_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| matches_keyword(&tokens, k)))
            .map(|(theme, _)| *theme)
            .unwrap_or(Theme::Mystery)
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Frequency table of themes, in the order they were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeTracker {
    counts: Vec<(Theme, u32)>,
}

impl ThemeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, theme: Theme) {
        match self.counts.iter_mut().find(|(t, _)| *t == theme) {
            Some((_, count)) => *count = count.saturating_add(1),
            None => self.counts.push((theme, 1)),
        }
    }

    /// Detect the theme of `text`, record it and return it.
    pub fn observe(&mut self, text: &str) -> Theme {
        let theme = Theme::detect(text);
        self.record(theme);
        theme
    }

    pub fn count(&self, theme: Theme) -> u32 {
        self.counts
            .iter()
            .find(|(t, _)| *t == theme)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }

    /// Most frequent theme; ties go to whichever was seen first.
    pub fn recurrent_theme(&self) -> Theme {
        let mut best: Option<(Theme, u32)> = None;
        for &(theme, count) in &self.counts {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((theme, count));
            }
        }
        best.map(|(theme, _)| theme).unwrap_or(Theme::Mystery)
    }

    pub fn counts(&self) -> &[(Theme, u32)] {
        &self.counts
    }
}
