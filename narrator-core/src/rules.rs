//! Rules resolution.
//!
//! This module turns a classified [`Intent`] into a [`Resolution`]:
//! 1. The intent's category selects a dice protocol
//! 2. Every roll is written to the resolution's dice log, in roll order
//! 3. Steps describe what was rolled and what it meant
//! 4. The overall outcome follows from the documented thresholds below
//!
//! The thresholds are deliberately simple (one DC per category, a flat 5d8
//! pool for every spell) and are kept as named constants so that
//! [`replay_outcome`] can re-derive any outcome from its dice log.

use crate::action::{Action, Language, ResolutionId};
use crate::dice::{DiceExpression, DiceLogEntry, DiceSource, RollResult};
use crate::intent::{Intent, IntentCategory};
use crate::knowledge::{KnowledgeHit, KnowledgeResponse};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, error};

/// Every spell rolls the same pool, whatever the spell.
pub const SPELL_POOL: DiceExpression = DiceExpression::new(5, 8, 0);

/// The die behind checks and attack rolls.
pub const CHECK_DIE: DiceExpression = DiceExpression::new(1, 20, 0);

/// Damage dealt by a successful attack.
pub const DAMAGE_DIE: DiceExpression = DiceExpression::new(1, 8, 0);

/// Minimum total for a skill check to succeed.
pub const SKILL_CHECK_DC: i32 = 10;

/// Minimum total for an investigation to succeed.
pub const INVESTIGATE_DC: i32 = 12;

/// Minimum total for an attack to hit.
pub const ATTACK_DC: i32 = 12;

/// Errors from resolution. These only arise from defects in the resolver
/// itself and are fatal for the turn.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("internal resolver error: {0}")]
    Internal(String),
}

/// What kind of rule application a step records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Check,
    Attack,
    Damage,
    Save,
    Roleplay,
    Action,
}

/// Overall result of a resolution or a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    CriticalSuccess,
    CriticalFailure,
    Mixed,
}

impl Outcome {
    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::CriticalSuccess => "critical_success",
            Outcome::CriticalFailure => "critical_failure",
            Outcome::Mixed => "mixed",
        }
    }

    fn from_hit(hit: bool) -> Self {
        if hit {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One atomic unit of rule application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub kind: StepKind,
    pub description: String,
    pub total: Option<i32>,
    pub outcome: Option<Outcome>,
    pub notes: Option<String>,
}

impl Step {
    fn new(kind: StepKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            total: None,
            outcome: None,
            notes: None,
        }
    }

    fn with_total(mut self, total: i32) -> Self {
        self.total = Some(total);
        self
    }

    fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes.filter(|n| !n.is_empty());
        self
    }
}

/// The structured outcome of applying the rules to one intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub id: ResolutionId,
    pub action_id: crate::action::ActionId,
    pub intent: Intent,
    pub steps: Vec<Step>,
    pub outcome: Outcome,
    pub dice_log: Vec<DiceLogEntry>,
}

impl Resolution {
    /// Whether the dice log re-derives the stated outcome.
    pub fn verify(&self) -> bool {
        replay_outcome(self.intent.category, &self.dice_log) == Some(self.outcome)
    }

    /// Damage dealt, if an attack landed.
    pub fn damage(&self) -> Option<i32> {
        self.steps
            .iter()
            .find(|s| s.kind == StepKind::Damage)
            .and_then(|s| s.total)
    }
}

/// Steps and rolls accumulated while a resolution is being built.
struct Ledger {
    steps: Vec<Step>,
    dice_log: Vec<DiceLogEntry>,
}

impl Ledger {
    fn new() -> Self {
        Self {
            steps: Vec::new(),
            dice_log: Vec::new(),
        }
    }

    fn roll<D: DiceSource + ?Sized>(&mut self, expr: DiceExpression, dice: &mut D) -> RollResult {
        let roll = expr.roll_with(dice);
        self.dice_log.push(roll.to_log_entry());
        roll
    }

    fn push(&mut self, step: Step) {
        self.steps.push(step);
    }
}

/// The rules engine resolves intents into resolutions.
#[derive(Debug, Default, Clone, Copy)]
pub struct RulesEngine;

impl RulesEngine {
    pub fn new() -> Self {
        Self
    }

    /// Resolve an intent against the action it was classified from.
    ///
    /// `knowledge` enriches descriptions only; it never changes a number.
    pub fn resolve<D: DiceSource + ?Sized>(
        &self,
        intent: &Intent,
        knowledge: Option<&KnowledgeResponse>,
        action: &Action,
        dice: &mut D,
    ) -> Result<Resolution, ResolveError> {
        if intent.action_id != action.id {
            error!(intent_action = %intent.action_id, action = %action.id, "intent/action mismatch");
            return Err(ResolveError::Internal(format!(
                "intent for action {} resolved against action {}",
                intent.action_id, action.id
            )));
        }

        let lang = action.language;
        let actor = action.actor_name();
        let hit = knowledge.and_then(KnowledgeResponse::first);
        let mut ledger = Ledger::new();

        let outcome = match intent.category {
            IntentCategory::CastSpell => self.resolve_cast_spell(intent, hit, lang, &mut ledger, dice),
            IntentCategory::SkillCheck => {
                self.resolve_check(intent, hit, lang, SKILL_CHECK_DC, &mut ledger, dice)
            }
            IntentCategory::Investigate => {
                self.resolve_check(intent, hit, lang, INVESTIGATE_DC, &mut ledger, dice)
            }
            IntentCategory::Attack => self.resolve_attack(intent, hit, lang, &mut ledger, dice),
            IntentCategory::Talk => self.resolve_talk(intent, actor, lang, &mut ledger),
            IntentCategory::Move | IntentCategory::Interact => {
                self.resolve_generic(intent, actor, lang, &mut ledger)
            }
        };

        let resolution = Resolution {
            id: ResolutionId::new(),
            action_id: action.id,
            intent: intent.clone(),
            steps: ledger.steps,
            outcome,
            dice_log: ledger.dice_log,
        };

        if !resolution.verify() {
            error!(resolution = ?resolution, "dice log does not reproduce outcome");
            return Err(ResolveError::Internal(format!(
                "dice log for {} does not reproduce outcome {}",
                intent.category, outcome
            )));
        }

        debug!(
            action_id = %action.id,
            category = intent.category.name(),
            outcome = outcome.name(),
            rolls = resolution.dice_log.len(),
            "resolved intent"
        );
        Ok(resolution)
    }

    fn resolve_cast_spell<D: DiceSource + ?Sized>(
        &self,
        intent: &Intent,
        hit: Option<&KnowledgeHit>,
        lang: Language,
        ledger: &mut Ledger,
        dice: &mut D,
    ) -> Outcome {
        let spell = hit
            .map(|h| h.name.clone())
            .or_else(|| intent.entity("spell").map(str::to_string))
            .unwrap_or_else(|| lang.pick("un conjuro", "a spell").to_string());

        let roll = ledger.roll(SPELL_POOL, dice);
        ledger.push(
            Step::new(
                StepKind::Action,
                match lang {
                    Language::Es => format!("Lanzas {spell} ({SPELL_POOL}: {})", roll.total),
                    Language::En => format!("You cast {spell} ({SPELL_POOL}: {})", roll.total),
                },
            )
            .with_total(roll.total)
            .with_outcome(Outcome::Mixed)
            .with_notes(hit.map(|h| h.summary.clone())),
        );
        Outcome::Mixed
    }

    fn resolve_check<D: DiceSource + ?Sized>(
        &self,
        intent: &Intent,
        hit: Option<&KnowledgeHit>,
        lang: Language,
        dc: i32,
        ledger: &mut Ledger,
        dice: &mut D,
    ) -> Outcome {
        let subject = hit
            .map(|h| h.name.clone())
            .or_else(|| intent.entity("skill").map(str::to_string))
            .or_else(|| intent.entity("target").map(str::to_string));

        let roll = ledger.roll(CHECK_DIE, dice);
        let outcome = Outcome::from_hit(roll.meets_dc(dc));
        let description = match (lang, subject) {
            (Language::Es, Some(s)) => format!("Prueba de {s}: {} contra CD {dc}", roll.total),
            (Language::Es, None) => format!("Prueba: {} contra CD {dc}", roll.total),
            (Language::En, Some(s)) => format!("{s} check: {} vs DC {dc}", roll.total),
            (Language::En, None) => format!("Check: {} vs DC {dc}", roll.total),
        };
        ledger.push(
            Step::new(StepKind::Check, description)
                .with_total(roll.total)
                .with_outcome(outcome)
                .with_notes(hit.map(|h| h.summary.clone())),
        );
        outcome
    }

    fn resolve_attack<D: DiceSource + ?Sized>(
        &self,
        intent: &Intent,
        hit: Option<&KnowledgeHit>,
        lang: Language,
        ledger: &mut Ledger,
        dice: &mut D,
    ) -> Outcome {
        let target = hit
            .map(|h| h.name.clone())
            .or_else(|| intent.entity("target").map(str::to_string))
            .unwrap_or_else(|| lang.pick("el enemigo", "the enemy").to_string());

        let attack = ledger.roll(CHECK_DIE, dice);
        let landed = attack.meets_dc(ATTACK_DC);
        let outcome = Outcome::from_hit(landed);
        ledger.push(
            Step::new(
                StepKind::Attack,
                match lang {
                    Language::Es => {
                        format!("Ataque contra {target}: {} contra {ATTACK_DC}", attack.total)
                    }
                    Language::En => format!("Attack on {target}: {} vs {ATTACK_DC}", attack.total),
                },
            )
            .with_total(attack.total)
            .with_outcome(outcome)
            .with_notes(hit.map(monster_notes)),
        );

        if landed {
            let damage = ledger.roll(DAMAGE_DIE, dice);
            let weapon = intent.entity("weapon");
            let description = match (lang, weapon) {
                (Language::Es, Some(w)) => format!("Daño con {w}: {}", damage.total),
                (Language::Es, None) => format!("Daño: {}", damage.total),
                (Language::En, Some(w)) => format!("{w} damage: {}", damage.total),
                (Language::En, None) => format!("Damage: {}", damage.total),
            };
            ledger.push(
                Step::new(StepKind::Damage, description)
                    .with_total(damage.total)
                    .with_outcome(Outcome::Success),
            );
        }

        outcome
    }

    fn resolve_talk(&self, intent: &Intent, actor: &str, lang: Language, ledger: &mut Ledger) -> Outcome {
        let description = match (lang, intent.entity("target")) {
            (Language::Es, Some(t)) => format!("{actor} conversa con {t}"),
            (Language::Es, None) => format!("{actor} toma la palabra"),
            (Language::En, Some(t)) => format!("{actor} talks with {t}"),
            (Language::En, None) => format!("{actor} speaks up"),
        };
        ledger.push(Step::new(StepKind::Roleplay, description).with_outcome(Outcome::Mixed));
        Outcome::Mixed
    }

    fn resolve_generic(
        &self,
        intent: &Intent,
        actor: &str,
        lang: Language,
        ledger: &mut Ledger,
    ) -> Outcome {
        let verb = match (lang, intent.category) {
            (Language::Es, IntentCategory::Move) => "se mueve",
            (Language::En, IntentCategory::Move) => "moves",
            (Language::Es, _) => "actúa",
            (Language::En, _) => "acts",
        };
        let description = match intent.entity("target") {
            Some(t) => format!("{actor} {verb}: {t}"),
            None => format!("{actor} {verb}"),
        };
        ledger.push(Step::new(StepKind::Action, description).with_outcome(Outcome::Mixed));
        Outcome::Mixed
    }
}

fn monster_notes(hit: &KnowledgeHit) -> String {
    match hit.detail.get("armor_class") {
        Some(ac) if !hit.summary.is_empty() => format!("{} (AC {ac})", hit.summary),
        Some(ac) => format!("AC {ac}"),
        None => hit.summary.clone(),
    }
}

/// Re-derive the overall outcome of a resolution from its dice log alone.
///
/// Returns `None` when the log does not match the protocol of `category`
/// or an entry's total does not add up.
pub fn replay_outcome(category: IntentCategory, dice_log: &[DiceLogEntry]) -> Option<Outcome> {
    if dice_log
        .iter()
        .any(|entry| entry.recomputed_total() != Some(entry.total))
    {
        return None;
    }

    let logged = |i: usize, expr: DiceExpression| {
        dice_log
            .get(i)
            .is_some_and(|entry| entry.expression == expr.to_string())
    };

    match category {
        IntentCategory::CastSpell => {
            (dice_log.len() == 1 && logged(0, SPELL_POOL)).then_some(Outcome::Mixed)
        }
        IntentCategory::SkillCheck | IntentCategory::Investigate => {
            let dc = if category == IntentCategory::SkillCheck {
                SKILL_CHECK_DC
            } else {
                INVESTIGATE_DC
            };
            (dice_log.len() == 1 && logged(0, CHECK_DIE))
                .then(|| Outcome::from_hit(dice_log[0].total >= dc))
        }
        IntentCategory::Attack => {
            if !logged(0, CHECK_DIE) {
                return None;
            }
            let landed = dice_log[0].total >= ATTACK_DC;
            let expected_len = if landed { 2 } else { 1 };
            if dice_log.len() != expected_len || (landed && !logged(1, DAMAGE_DIE)) {
                return None;
            }
            Some(Outcome::from_hit(landed))
        }
        IntentCategory::Talk | IntentCategory::Move | IntentCategory::Interact => {
            dice_log.is_empty().then_some(Outcome::Mixed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::LoadedDice;
    use crate::intent::classify;
    use crate::knowledge::KnowledgeCategory;
    use serde_json::json;

    fn resolve_text(text: &str, faces: &[u32]) -> Resolution {
        let action = Action::new("s1", "p1", text);
        let intent = classify(&action.text, action.id);
        RulesEngine::new()
            .resolve(&intent, None, &action, &mut LoadedDice::new(faces.to_vec()))
            .unwrap()
    }

    #[test]
    fn test_attack_hit_rolls_damage() {
        let resolution = resolve_text("ataco al goblin con mi hacha", &[15, 6]);
        assert_eq!(resolution.outcome, Outcome::Success);
        assert_eq!(resolution.steps.len(), 2);
        assert_eq!(resolution.steps[0].kind, StepKind::Attack);
        assert_eq!(resolution.steps[1].kind, StepKind::Damage);
        assert_eq!(resolution.damage(), Some(6));
        assert_eq!(
            resolution.dice_log,
            vec![
                DiceLogEntry {
                    expression: "1d20".to_string(),
                    rolls: vec![15],
                    total: 15
                },
                DiceLogEntry {
                    expression: "1d8".to_string(),
                    rolls: vec![6],
                    total: 6
                },
            ]
        );
        assert!(resolution.steps[1].description.contains("hacha"));
    }

    #[test]
    fn test_attack_threshold_boundary() {
        assert_eq!(resolve_text("ataco al orco", &[12, 1]).outcome, Outcome::Success);

        let miss = resolve_text("ataco al orco", &[11]);
        assert_eq!(miss.outcome, Outcome::Failure);
        assert_eq!(miss.steps.len(), 1);
        assert_eq!(miss.dice_log.len(), 1);
        assert_eq!(miss.damage(), None);
    }

    #[test]
    fn test_investigate_thresholds() {
        let failed = resolve_text("investigo la puerta", &[8]);
        assert_eq!(failed.outcome, Outcome::Failure);
        assert_eq!(failed.steps[0].outcome, Some(Outcome::Failure));
        assert_eq!(failed.dice_log[0].total, 8);

        assert_eq!(resolve_text("investigo la puerta", &[11]).outcome, Outcome::Failure);
        assert_eq!(resolve_text("investigo la puerta", &[12]).outcome, Outcome::Success);
    }

    #[test]
    fn test_skill_check_threshold() {
        assert_eq!(resolve_text("trepo el muro", &[9]).outcome, Outcome::Failure);
        assert_eq!(resolve_text("trepo el muro", &[10]).outcome, Outcome::Success);
    }

    #[test]
    fn test_spell_pool_is_fixed() {
        let resolution = resolve_text("lanzo bola de fuego", &[1, 2, 3, 4, 5]);
        assert_eq!(resolution.outcome, Outcome::Mixed);
        assert_eq!(resolution.steps.len(), 1);
        assert_eq!(resolution.steps[0].total, Some(15));
        assert_eq!(resolution.dice_log[0].expression, "5d8");
        assert_eq!(resolution.dice_log[0].rolls, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_talk_and_generic_have_no_dice() {
        let talk = resolve_text("hablo con el tabernero", &[]);
        assert_eq!(talk.outcome, Outcome::Mixed);
        assert_eq!(talk.steps[0].kind, StepKind::Roleplay);
        assert_eq!(talk.steps[0].total, None);
        assert!(talk.dice_log.is_empty());

        for text in ["camino hacia el norte", "abro el cofre", "me quedo quieto"] {
            let resolution = resolve_text(text, &[]);
            assert_eq!(resolution.outcome, Outcome::Mixed);
            assert_eq!(resolution.steps[0].kind, StepKind::Action);
            assert!(resolution.dice_log.is_empty());
        }
    }

    #[test]
    fn test_degraded_intent_resolves_generically() {
        let resolution = resolve_text("   ", &[]);
        assert_eq!(resolution.intent.category, IntentCategory::Interact);
        assert_eq!(resolution.outcome, Outcome::Mixed);
    }

    #[test]
    fn test_knowledge_enriches_without_changing_numbers() {
        let action = Action::new("s1", "p1", "ataco al goblin").with_language(Language::En);
        let intent = classify(&action.text, action.id);
        let knowledge = KnowledgeResponse {
            hits: vec![KnowledgeHit {
                category: KnowledgeCategory::Monster,
                name: "Goblin".to_string(),
                slug: "goblin".to_string(),
                summary: "Small, black-hearted humanoid.".to_string(),
                detail: json!({"armor_class": 15}).as_object().cloned().unwrap_or_default(),
            }],
            from_cache: false,
            source: "test".to_string(),
        };

        let resolution = RulesEngine::new()
            .resolve(&intent, Some(&knowledge), &action, &mut LoadedDice::new([13, 4]))
            .unwrap();
        assert_eq!(resolution.outcome, Outcome::Success);
        assert!(resolution.steps[0].description.starts_with("Attack on Goblin"));
        assert_eq!(
            resolution.steps[0].notes.as_deref(),
            Some("Small, black-hearted humanoid. (AC 15)")
        );
    }

    #[test]
    fn test_mismatched_action_is_internal_error() {
        let action = Action::new("s1", "p1", "ataco al goblin");
        let other = Action::new("s1", "p1", "ataco al goblin");
        let intent = classify(&other.text, other.id);
        let err = RulesEngine::new()
            .resolve(&intent, None, &action, &mut LoadedDice::new([10]))
            .unwrap_err();
        assert!(matches!(err, ResolveError::Internal(_)));
    }

    #[test]
    fn test_every_resolution_replays() {
        let texts = [
            "lanzo sueño",
            "trepo el muro",
            "investigo el altar",
            "ataco al goblin",
            "hablo con la guardia",
            "camino al puente",
            "abro la puerta",
        ];
        let mut dice = crate::dice::RandomDice::seeded(3);
        for text in texts {
            for _ in 0..50 {
                let action = Action::new("s1", "p1", text);
                let intent = classify(&action.text, action.id);
                let resolution = RulesEngine::new()
                    .resolve(&intent, None, &action, &mut dice)
                    .unwrap();
                assert!(resolution.verify(), "{text}: {resolution:?}");
            }
        }
    }

    #[test]
    fn test_replay_rejects_tampered_logs() {
        let resolution = resolve_text("ataco al goblin", &[15, 6]);

        let mut forged = resolution.dice_log.clone();
        forged[0].total = 9;
        assert_eq!(replay_outcome(IntentCategory::Attack, &forged), None);

        let mut missing_damage = resolution.dice_log.clone();
        missing_damage.pop();
        assert_eq!(replay_outcome(IntentCategory::Attack, &missing_damage), None);

        assert_eq!(replay_outcome(IntentCategory::Talk, &resolution.dice_log), None);
    }
}
