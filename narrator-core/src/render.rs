//! Response rendering.
//!
//! Turns a [`Resolution`] plus a [`NarrativeSnapshot`] into the final text
//! block sent to players. The output is escaped for Telegram-style
//! MarkdownV2 and bounded in length. Rendering never fails: every table
//! lookup has a neutral fallback.

use crate::action::{Action, Language};
use crate::dice::DiceLogEntry;
use crate::intent::{Intent, IntentCategory};
use crate::narrative::{Genre, Mood, NarrativeSnapshot, StoryDirector};
use crate::rules::{Outcome, Resolution};
use rand::seq::SliceRandom;
use rand::Rng;

/// Default bound on rendered message length, in characters.
pub const DEFAULT_MAX_LEN: usize = 4000;

/// Characters escaped with a backslash.
pub const ESCAPED_CHARS: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.',
    '!',
];

const ELLIPSIS: char = '…';

const NEUTRAL_LINE: (&str, &str) = ("{actor} actúa.", "{actor} acts.");

/// Rendering options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    pub max_len: usize,
    pub show_dice: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_LEN,
            show_dice: true,
        }
    }
}

impl RenderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn with_show_dice(mut self, show_dice: bool) -> Self {
        self.show_dice = show_dice;
        self
    }
}

/// A rendered, transport-safe message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub truncated: bool,
}

type Template = (&'static str, &'static str);

fn category_templates(category: IntentCategory) -> &'static [Template] {
    match category {
        IntentCategory::CastSpell => &[
            ("{actor} entrelaza las palabras de {spell}.", "{actor} weaves the words of {spell}."),
            ("La magia de {spell} brota de las manos de {actor}.", "The magic of {spell} flows from {actor}'s hands."),
        ],
        IntentCategory::SkillCheck => &[
            ("{actor} pone a prueba su destreza con {target}.", "{actor} tests their skill against {target}."),
            ("{actor} se esfuerza al límite.", "{actor} pushes to the limit."),
        ],
        IntentCategory::Attack => &[
            ("{actor} se lanza contra {target}.", "{actor} lunges at {target}."),
            ("{actor} ataca a {target} sin vacilar.", "{actor} strikes at {target} without hesitation."),
        ],
        IntentCategory::Investigate => &[
            ("{actor} examina {target} con atención.", "{actor} studies {target} closely."),
            ("{actor} busca pistas en {target}.", "{actor} searches {target} for clues."),
        ],
        IntentCategory::Talk => &[
            ("{actor} se dirige a {target}.", "{actor} addresses {target}."),
            ("{actor} habla con calma.", "{actor} speaks calmly."),
        ],
        IntentCategory::Move => &[
            ("{actor} avanza hacia {target}.", "{actor} heads toward {target}."),
            ("{actor} se pone en marcha.", "{actor} sets off."),
        ],
        IntentCategory::Interact => &[
            ("{actor} interactúa con {target}.", "{actor} handles {target}."),
            ("{actor} actúa con decisión.", "{actor} acts decisively."),
        ],
    }
}

fn outcome_phrases(outcome: Outcome) -> &'static [Template] {
    match outcome {
        Outcome::CriticalSuccess => &[
            ("¡Un éxito espectacular!", "A spectacular success!"),
            ("¡Nadie olvidará esto!", "No one will forget this!"),
        ],
        Outcome::Success => &[
            ("Lo consigue.", "It works."),
            ("El esfuerzo da sus frutos.", "The effort pays off."),
        ],
        Outcome::Mixed => &[
            ("El resultado queda en el aire.", "The outcome hangs in the balance."),
            ("Algo cambia, aunque no del todo.", "Something shifts, if only a little."),
        ],
        Outcome::Failure => &[
            ("No sale como esperaba.", "It does not go as planned."),
            ("El intento se queda corto.", "The attempt falls short."),
        ],
        Outcome::CriticalFailure => &[
            ("¡Un desastre absoluto!", "An utter disaster!"),
            ("Todo sale terriblemente mal.", "Everything goes terribly wrong."),
        ],
    }
}

fn atmosphere(genre: Genre, mood: Mood) -> Template {
    match (genre, mood) {
        (Genre::Fantasy, Mood::Calm) => ("Una brisa suave recorre el lugar.", "A gentle breeze passes through."),
        (Genre::Fantasy, Mood::Tense) => ("El acero brilla a la luz de las antorchas.", "Steel glints in the torchlight."),
        (Genre::Fantasy, Mood::Frantic) => ("El fragor de la batalla lo llena todo.", "The din of battle fills everything."),
        (Genre::Horror, Mood::Calm) => ("El silencio pesa demasiado.", "The silence weighs too much."),
        (Genre::Horror, Mood::Tense) => ("Algo respira en la oscuridad.", "Something breathes in the dark."),
        (Genre::Horror, Mood::Frantic) => ("Los gritos resuenan por todas partes.", "Screams echo everywhere."),
        (Genre::Intrigue, Mood::Calm) => ("Las sonrisas esconden secretos.", "Smiles hide secrets."),
        (Genre::Intrigue, Mood::Tense) => ("Las miradas se cruzan con recelo.", "Wary glances are exchanged."),
        (Genre::Intrigue, Mood::Frantic) => ("Las máscaras empiezan a caer.", "The masks begin to fall."),
    }
}

/// Renders resolutions into messages.
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    config: RenderConfig,
    director: StoryDirector,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            director: StoryDirector::default(),
        }
    }

    pub fn with_director(mut self, director: StoryDirector) -> Self {
        self.director = director;
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render one turn. `narration` is woven in when an external engine
    /// supplied one.
    pub fn render<R: Rng + ?Sized>(
        &self,
        resolution: &Resolution,
        intent: &Intent,
        action: &Action,
        narrative: &NarrativeSnapshot,
        narration: Option<&str>,
        rng: &mut R,
    ) -> Message {
        let lang = action.language;
        let mut lines = Vec::new();

        let opening = pick(category_templates(intent.category), lang, NEUTRAL_LINE, rng);
        lines.push(fill(opening, intent, action));
        lines.push(pick(outcome_phrases(resolution.outcome), lang, ("", ""), rng).to_string());

        if let Some(text) = narration.filter(|n| !n.trim().is_empty()) {
            lines.push(text.trim().to_string());
        }

        let beat = self
            .director
            .next_beat(narrative.stage, narrative.emotion(), lang, rng);
        let (es, en) = atmosphere(narrative.mood.genre, narrative.mood.mood);
        lines.push(format!("{beat} {}", lang.pick(es, en)));

        if self.config.show_dice && !resolution.dice_log.is_empty() {
            lines.push(dice_summary(&resolution.dice_log, lang));
        }

        let plain: Vec<String> = lines.into_iter().filter(|l| !l.is_empty()).collect();
        let (text, truncated) = bound(&escape_markdown(&plain.join("\n")), self.config.max_len);
        Message { text, truncated }
    }
}

fn pick<'a, R: Rng + ?Sized>(
    templates: &'a [Template],
    lang: Language,
    fallback: Template,
    rng: &mut R,
) -> &'a str {
    let (es, en) = templates.choose(rng).copied().unwrap_or(fallback);
    lang.pick(es, en)
}

fn fill(template: &str, intent: &Intent, action: &Action) -> String {
    let lang = action.language;
    let target = intent
        .entity("target")
        .unwrap_or_else(|| lang.pick("su objetivo", "their target"));
    let spell = intent
        .entity("spell")
        .unwrap_or_else(|| lang.pick("un conjuro", "a spell"));
    template
        .replace("{actor}", action.actor_name())
        .replace("{target}", target)
        .replace("{spell}", spell)
}

/// One-line summary of a dice log, e.g. `Dice: 1d20 [15] = 15, 1d8 [6] = 6`.
pub fn dice_summary(log: &[DiceLogEntry], lang: Language) -> String {
    let rolls: Vec<String> = log
        .iter()
        .map(|entry| {
            let faces: Vec<String> = entry.rolls.iter().map(u32::to_string).collect();
            format!("{} [{}] = {}", entry.expression, faces.join(", "), entry.total)
        })
        .collect();
    format!("{}: {}", lang.pick("Dados", "Dice"), rolls.join(", "))
}

/// Backslash-escape every character in [`ESCAPED_CHARS`].
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        if ESCAPED_CHARS.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Cut already-escaped text to at most `max_len` characters, never
/// separating a backslash from the character it escapes. Returns the text
/// and whether it was cut.
pub fn bound(escaped: &str, max_len: usize) -> (String, bool) {
    if escaped.chars().count() <= max_len {
        return (escaped.to_string(), false);
    }
    if max_len == 0 {
        return (String::new(), true);
    }

    let budget = max_len - 1;
    let mut out = String::new();
    let mut used = 0;
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        let unit: String = if c == '\\' {
            chars.next().map(|next| format!("\\{next}")).unwrap_or_default()
        } else {
            c.to_string()
        };
        let width = unit.chars().count();
        if width == 0 || used + width > budget {
            break;
        }
        out.push_str(&unit);
        used += width;
    }
    out.push(ELLIPSIS);
    (out, true)
}
