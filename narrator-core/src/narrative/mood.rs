//! Genre and mood profile used to color rendered text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    #[default]
    Fantasy,
    Horror,
    Intrigue,
}

impl Genre {
    pub const ALL: [Genre; 3] = [Genre::Fantasy, Genre::Horror, Genre::Intrigue];

    pub fn name(&self) -> &'static str {
        match self {
            Genre::Fantasy => "fantasy",
            Genre::Horror => "horror",
            Genre::Intrigue => "intrigue",
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Genre {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Genre::ALL
            .into_iter()
            .find(|g| g.name() == s)
            .ok_or_else(|| format!("unknown genre: {s}"))
    }
}

/// Overall mood, derived from the rolling average emotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    #[default]
    Calm,
    Tense,
    Frantic,
}

impl Mood {
    /// Below 2.5 is calm, below 3.5 is tense, anything above is frantic.
    pub fn from_average(average: f32) -> Self {
        if average < 2.5 {
            Mood::Calm
        } else if average < 3.5 {
            Mood::Tense
        } else {
            Mood::Frantic
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mood::Calm => "calm",
            Mood::Tense => "tense",
            Mood::Frantic => "frantic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MoodProfile {
    pub genre: Genre,
    pub mood: Mood,
}

impl MoodProfile {
    pub fn new(genre: Genre) -> Self {
        Self {
            genre,
            mood: Mood::default(),
        }
    }

    pub fn update(&mut self, average_emotion: f32) {
        self.mood = Mood::from_average(average_emotion);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mood_bands() {
        assert_eq!(Mood::from_average(0.0), Mood::Calm);
        assert_eq!(Mood::from_average(2.49), Mood::Calm);
        assert_eq!(Mood::from_average(2.5), Mood::Tense);
        assert_eq!(Mood::from_average(3.5), Mood::Frantic);
        assert_eq!(Mood::from_average(5.0), Mood::Frantic);
    }

    #[test]
    fn test_genre_parse() {
        assert_eq!(" Horror ".parse::<Genre>(), Ok(Genre::Horror));
        assert!("western".parse::<Genre>().is_err());
    }
}
