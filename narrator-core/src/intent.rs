//! Intent classification.
//!
//! Maps a free-text utterance (Spanish or English) to one of a closed set of
//! intent categories plus a handful of extracted entities. Classification is
//! keyword based: the text is normalized, then checked against one keyword
//! group per category in a fixed priority order. Spellcasting is checked
//! first because its vocabulary is the most specific.
//!
//! Classification never fails. Inputs that cannot be classified produce a
//! generic, low-confidence intent carrying a structured error instead.

use crate::action::ActionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Confidence assigned to every keyword-based classification.
pub const MATCH_CONFIDENCE: f32 = 0.9;

/// Confidence assigned when classification degrades.
pub const FAULT_CONFIDENCE: f32 = 0.1;

/// Longest utterance the classifier will look at, in characters.
pub const MAX_INPUT_CHARS: usize = 2_000;

/// Closed set of things a player can try to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    CastSpell,
    SkillCheck,
    Attack,
    Interact,
    Investigate,
    Move,
    Talk,
}

impl IntentCategory {
    pub const ALL: [IntentCategory; 7] = [
        IntentCategory::CastSpell,
        IntentCategory::SkillCheck,
        IntentCategory::Attack,
        IntentCategory::Interact,
        IntentCategory::Investigate,
        IntentCategory::Move,
        IntentCategory::Talk,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            IntentCategory::CastSpell => "cast_spell",
            IntentCategory::SkillCheck => "skill_check",
            IntentCategory::Attack => "attack",
            IntentCategory::Interact => "interact",
            IntentCategory::Investigate => "investigate",
            IntentCategory::Move => "move",
            IntentCategory::Talk => "talk",
        }
    }

    /// Whether resolving this category benefits from a rules lookup.
    pub fn requires_srd(&self) -> bool {
        matches!(
            self,
            IntentCategory::CastSpell | IntentCategory::Attack | IntentCategory::SkillCheck
        )
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IntentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IntentCategory::ALL
            .into_iter()
            .find(|c| c.name() == s.trim())
            .ok_or_else(|| format!("unknown intent category: {s}"))
    }
}

/// A structured classification fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentError {
    pub code: String,
    pub message: String,
}

impl IntentError {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// The classified meaning of one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub action_id: ActionId,
    pub category: IntentCategory,
    pub confidence: f32,
    pub requires_srd: bool,
    #[serde(default)]
    pub entities: BTreeMap<String, String>,
    #[serde(default)]
    pub errors: Vec<IntentError>,
}

impl Intent {
    pub fn new(action_id: ActionId, category: IntentCategory) -> Self {
        Self {
            action_id,
            category,
            confidence: MATCH_CONFIDENCE,
            requires_srd: category.requires_srd(),
            entities: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn with_entity(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entities.insert(key.into(), value.into());
        self
    }

    /// Generic low-confidence intent used when classification faults.
    fn degraded(action_id: ActionId, error: IntentError) -> Self {
        Self {
            action_id,
            category: IntentCategory::Interact,
            confidence: FAULT_CONFIDENCE,
            requires_srd: false,
            entities: BTreeMap::new(),
            errors: vec![error],
        }
    }

    pub fn entity(&self, key: &str) -> Option<&str> {
        self.entities.get(key).map(String::as_str)
    }

    pub fn is_degraded(&self) -> bool {
        !self.errors.is_empty()
    }
}

// ============================================================================
// Keyword tables
// ============================================================================

/// Keyword groups in priority order. A trailing `*` marks a stem that
/// matches any token starting with it; entries with spaces match a run of
/// whole tokens.
const KEYWORD_GROUPS: &[(IntentCategory, &[&str])] = &[
    (
        IntentCategory::CastSpell,
        &[
            "lanzo", "lanzar", "conjur*", "hechiz*", "invoco", "invocar", "magia", "encantamiento",
            "cast", "casts", "casting", "spell*", "conjure*", "invoke*",
        ],
    ),
    (
        IntentCategory::Investigate,
        &[
            "investig*", "examin*", "inspeccion*", "registr*", "busco", "buscar", "observo",
            "miro", "reviso", "inspect*", "search*", "look", "study",
        ],
    ),
    (
        IntentCategory::Talk,
        &[
            "hablo", "hablar", "digo", "decir", "pregunt*", "convenc*", "persuad*", "negoci*",
            "saludo", "charlo", "talk*", "speak*", "say", "ask*", "tell", "greet*", "convince*",
        ],
    ),
    (
        IntentCategory::Attack,
        &[
            "atac*", "ataque", "golpe*", "dispar*", "apunal*", "embisto", "attack*", "hit",
            "strike*", "stab*", "shoot*", "slash*", "punch*",
        ],
    ),
    (
        IntentCategory::SkillCheck,
        &[
            "trepo", "trepar", "escalo", "escalar", "salto", "saltar", "nado", "nadar", "sigil*",
            "escond*", "forcejeo", "climb*", "jump*", "swim*", "sneak*", "hide",
        ],
    ),
    (
        IntentCategory::Move,
        &[
            "voy", "ir", "camino", "caminar", "corro", "correr", "avanz*", "entro", "entrar",
            "salgo", "salir", "muevo", "viajo", "go", "walk*", "run", "move*", "enter*",
            "travel*", "head",
        ],
    ),
    (
        IntentCategory::Interact,
        &[
            "abro", "abrir", "cojo", "tomo", "agarro", "uso", "usar", "empujo", "toco", "tiro",
            "open*", "take", "grab*", "use", "push*", "pull*", "touch*",
        ],
    ),
];

/// Spell names in either language, mapped to their canonical SRD name.
const SPELL_NAMES: &[(&str, &str)] = &[
    ("bola de fuego", "fireball"),
    ("fireball", "fireball"),
    ("proyectil magico", "magic missile"),
    ("misil magico", "magic missile"),
    ("magic missile", "magic missile"),
    ("curar heridas", "cure wounds"),
    ("cure wounds", "cure wounds"),
    ("sueno", "sleep"),
    ("dormir", "sleep"),
    ("sleep", "sleep"),
    ("escudo", "shield"),
    ("shield", "shield"),
    ("onda atronadora", "thunderwave"),
    ("thunderwave", "thunderwave"),
    ("luz", "light"),
    ("light", "light"),
];

/// Skill keywords mapped to the SRD skill they exercise.
const SKILL_NAMES: &[(&str, &str)] = &[
    ("trep*", "athletics"),
    ("escal*", "athletics"),
    ("salt*", "athletics"),
    ("nad*", "athletics"),
    ("forcejeo", "athletics"),
    ("climb*", "athletics"),
    ("jump*", "athletics"),
    ("swim*", "athletics"),
    ("sigil*", "stealth"),
    ("escond*", "stealth"),
    ("sneak*", "stealth"),
    ("hide", "stealth"),
];

/// Words that introduce the object of an action.
const ARTICLES: &[&str] = &[
    "el", "la", "los", "las", "al", "del", "un", "una", "unos", "unas", "a", "hacia", "sobre",
    "contra", "the", "an", "at", "to", "on", "toward", "towards",
];

const POSSESSIVES: &[&str] = &["mi", "mis", "su", "sus", "el", "la", "my", "his", "her", "the"];

// ============================================================================
// Classification
// ============================================================================

/// Classify a free-text utterance.
pub fn classify(text: &str, action_id: ActionId) -> Intent {
    if text.chars().count() > MAX_INPUT_CHARS {
        warn!(%action_id, "utterance too long to classify");
        return Intent::degraded(
            action_id,
            IntentError::new(
                "input_too_long",
                format!("utterance exceeds {MAX_INPUT_CHARS} characters"),
            ),
        );
    }

    let normalized = normalize(text);
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    if tokens.is_empty() {
        warn!(%action_id, "empty utterance");
        return Intent::degraded(
            action_id,
            IntentError::new("empty_input", "utterance has no words"),
        );
    }

    let category = KEYWORD_GROUPS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| matches_keyword(&tokens, k)))
        .map(|(category, _)| *category)
        .unwrap_or(IntentCategory::Interact);

    let mut intent = Intent::new(action_id, category);
    extract_entities(&mut intent, &tokens);

    debug!(
        %action_id,
        category = category.name(),
        entities = ?intent.entities,
        "classified utterance"
    );
    intent
}

fn extract_entities(intent: &mut Intent, tokens: &[&str]) {
    match intent.category {
        IntentCategory::CastSpell => {
            if let Some((_, spell)) = SPELL_NAMES.iter().find(|(k, _)| matches_keyword(tokens, k)) {
                intent.entities.insert("spell".to_string(), spell.to_string());
            }
        }
        IntentCategory::SkillCheck => {
            if let Some((_, skill)) = SKILL_NAMES.iter().find(|(k, _)| matches_keyword(tokens, k)) {
                intent.entities.insert("skill".to_string(), skill.to_string());
            }
        }
        _ => {}
    }

    if intent.category != IntentCategory::CastSpell {
        if let Some(target) = find_target(tokens) {
            intent.entities.insert("target".to_string(), target.to_string());
        }
    }

    if let Some(weapon) = find_weapon(tokens) {
        intent.entities.insert("weapon".to_string(), weapon.to_string());
    }
}

/// First word after an article or preposition.
fn find_target<'a>(tokens: &[&'a str]) -> Option<&'a str> {
    let start = tokens.iter().position(|t| ARTICLES.contains(t))?;
    tokens[start..]
        .iter()
        .copied()
        .find(|t| !ARTICLES.contains(t) && !POSSESSIVES.contains(t))
        .filter(|t| !matches!(*t, "con" | "with"))
}

/// Word after "con mi" / "with my" and friends.
fn find_weapon<'a>(tokens: &[&'a str]) -> Option<&'a str> {
    tokens.windows(3).find_map(|w| {
        (matches!(w[0], "con" | "with") && POSSESSIVES.contains(&w[1])).then_some(w[2])
    })
}

pub(crate) fn matches_keyword(tokens: &[&str], keyword: &str) -> bool {
    if keyword.contains(' ') {
        let phrase: Vec<&str> = keyword.split(' ').collect();
        return tokens.windows(phrase.len()).any(|w| w == phrase.as_slice());
    }
    match keyword.strip_suffix('*') {
        Some(stem) => tokens.iter().any(|t| t.starts_with(stem)),
        None => tokens.contains(&keyword),
    }
}

/// Lowercase, strip diacritics, turn punctuation into spaces and collapse
/// whitespace.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ä' | 'ã' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            c if c.is_alphanumeric() => c,
            _ => ' ',
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}
