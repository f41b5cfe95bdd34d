//! Player actions and the scene snapshot they carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Define a newtype ID wrapper around a v4 UUID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

/// Define a newtype wrapper around an identifier handed to us by the transport.
macro_rules! define_external_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Blank ids cannot be attributed to anyone.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }
    };
}

define_id!(
    /// Unique identifier for one player utterance.
    ActionId
);
define_id!(
    /// Unique identifier for a resolution.
    ResolutionId
);
define_external_id!(
    /// Chat or campaign session identifier.
    SessionId
);
define_external_id!(
    /// Player identifier within the transport.
    PlayerId
);

/// Supported input languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Es,
    En,
}

impl Language {
    /// Parse a language tag such as `es`, `en-GB` or `EN`. Anything that is
    /// not English is treated as Spanish.
    pub fn from_tag(tag: &str) -> Self {
        if tag.trim().to_lowercase().starts_with("en") {
            Language::En
        } else {
            Language::Es
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Language::Es => "es",
            Language::En => "en",
        }
    }

    /// Choose between a Spanish and an English variant.
    pub fn pick<'a>(&self, es: &'a str, en: &'a str) -> &'a str {
        match self {
            Language::Es => es,
            Language::En => en,
        }
    }
}

/// Hit point state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitPoints {
    pub current: i32,
    pub maximum: i32,
}

impl HitPoints {
    pub fn new(maximum: i32) -> Self {
        Self {
            current: maximum,
            maximum,
        }
    }
}

/// A party member's sheet, as seen at the moment of the action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterState {
    pub player_id: PlayerId,
    pub name: String,
    #[serde(default)]
    pub abilities: BTreeMap<String, i32>,
    #[serde(default)]
    pub skills: BTreeMap<String, i32>,
    pub hit_points: HitPoints,
}

impl CharacterState {
    pub fn new(player_id: impl Into<PlayerId>, name: impl Into<String>, max_hp: i32) -> Self {
        Self {
            player_id: player_id.into(),
            name: name.into(),
            abilities: BTreeMap::new(),
            skills: BTreeMap::new(),
            hit_points: HitPoints::new(max_hp),
        }
    }

    pub fn with_ability(mut self, ability: impl Into<String>, modifier: i32) -> Self {
        self.abilities.insert(ability.into(), modifier);
        self
    }

    pub fn with_skill(mut self, skill: impl Into<String>, modifier: i32) -> Self {
        self.skills.insert(skill.into(), modifier);
        self
    }

    pub fn is_down(&self) -> bool {
        self.hit_points.current <= 0
    }
}

/// Snapshot of the scene an action happens in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneContext {
    pub location: String,
    #[serde(default)]
    pub party: Vec<CharacterState>,
    pub ruleset: String,
}

impl Default for SceneContext {
    fn default() -> Self {
        Self {
            location: String::new(),
            party: Vec::new(),
            ruleset: "srd-5.1".to_string(),
        }
    }
}

impl SceneContext {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    pub fn with_member(mut self, member: CharacterState) -> Self {
        self.party.push(member);
        self
    }

    pub fn member(&self, player_id: &PlayerId) -> Option<&CharacterState> {
        self.party.iter().find(|c| &c.player_id == player_id)
    }
}

/// One player utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub session_id: SessionId,
    pub player_id: PlayerId,
    pub text: String,
    pub language: Language,
    pub timestamp: DateTime<Utc>,
    pub scene: SceneContext,
}

impl Action {
    pub fn new(
        session_id: impl Into<SessionId>,
        player_id: impl Into<PlayerId>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: ActionId::new(),
            session_id: session_id.into(),
            player_id: player_id.into(),
            text: text.into(),
            language: Language::default(),
            timestamp: Utc::now(),
            scene: SceneContext::default(),
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_scene(mut self, scene: SceneContext) -> Self {
        self.scene = scene;
        self
    }

    /// The acting player's character, if the scene lists one.
    pub fn actor(&self) -> Option<&CharacterState> {
        self.scene.member(&self.player_id)
    }

    /// Display name for the acting player.
    pub fn actor_name(&self) -> &str {
        self.actor()
            .map(|c| c.name.as_str())
            .unwrap_or_else(|| self.player_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_tags() {
        assert_eq!(Language::from_tag("en"), Language::En);
        assert_eq!(Language::from_tag("EN-gb"), Language::En);
        assert_eq!(Language::from_tag("es-AR"), Language::Es);
        assert_eq!(Language::from_tag(""), Language::Es);
    }

    #[test]
    fn test_actor_lookup() {
        let scene = SceneContext::new("Cripta")
            .with_member(CharacterState::new("p1", "Aria", 12).with_skill("athletics", 3))
            .with_member(CharacterState::new("p2", "Bram", 9));
        let action = Action::new("s1", "p2", "miro alrededor").with_scene(scene);
        assert_eq!(action.actor_name(), "Bram");

        let stranger = Action::new("s1", "p9", "hola");
        assert!(stranger.actor().is_none());
        assert_eq!(stranger.actor_name(), "p9");
    }

    #[test]
    fn test_blank_ids() {
        assert!(SessionId::new("  ").is_blank());
        assert!(!PlayerId::new("42").is_blank());
    }
}
