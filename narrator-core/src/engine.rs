//! Delegated game engine seam.
//!
//! Attack intents may be handed to an external game/combat engine. The
//! engine is optional and untrusted: every call is bounded by a timeout and
//! any failure degrades to a locally synthesized narration.

use crate::action::{Language, PlayerId};
use crate::narrative::StageChange;
use crate::rules::{Outcome, Resolution};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from the delegated engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    #[error("engine rejected the action: {0}")]
    Rejected(String),

    #[error("engine timed out after {0:?}")]
    Timeout(Duration),
}

/// A side-channel event to deliver alongside the rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideEvent {
    pub event_type: String,
    pub event_title: String,
    pub event_narration: String,
}

impl SideEvent {
    pub fn new(
        event_type: impl Into<String>,
        event_title: impl Into<String>,
        event_narration: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            event_title: event_title.into(),
            event_narration: event_narration.into(),
        }
    }

    /// Event announcing a move along the dramatic curve.
    pub fn stage_change(change: StageChange, language: Language) -> Self {
        let narration = match language {
            Language::Es => format!("La historia pasa de {} a {}.", change.from, change.to),
            Language::En => format!("The story moves from {} to {}.", change.from, change.to),
        };
        Self::new(
            "stage_change",
            language.pick("Cambio de acto", "Act change"),
            narration,
        )
    }
}

/// What the engine answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineReply {
    pub narrative: String,
    #[serde(default)]
    pub event: Option<SideEvent>,
}

impl EngineReply {
    pub fn narrative(text: impl Into<String>) -> Self {
        Self {
            narrative: text.into(),
            event: None,
        }
    }

    pub fn with_event(mut self, event: SideEvent) -> Self {
        self.event = Some(event);
        self
    }
}

#[async_trait]
pub trait GameEngine: Send + Sync {
    async fn act(&self, player_id: &PlayerId, text: &str) -> Result<EngineReply, EngineError>;
}

/// Call the engine, bounded by `timeout`.
pub async fn act_with_timeout(
    engine: &dyn GameEngine,
    player_id: &PlayerId,
    text: &str,
    timeout: Duration,
) -> Result<EngineReply, EngineError> {
    match tokio::time::timeout(timeout, engine.act(player_id, text)).await {
        Ok(Ok(reply)) => {
            debug!(%player_id, has_event = reply.event.is_some(), "engine replied");
            Ok(reply)
        }
        Ok(Err(e)) => {
            warn!(%player_id, error = %e, "engine call failed");
            Err(e)
        }
        Err(_) => {
            warn!(%player_id, ?timeout, "engine call timed out");
            Err(EngineError::Timeout(timeout))
        }
    }
}

/// Narration synthesized when the engine cannot be used.
pub fn local_narration(resolution: &Resolution, language: Language) -> String {
    let target = resolution.intent.entity("target");
    match (language, resolution.outcome, resolution.damage()) {
        (Language::Es, Outcome::Success | Outcome::CriticalSuccess, Some(damage)) => match target {
            Some(t) => format!("Tu golpe alcanza a {t} y le causa {damage} de daño."),
            None => format!("Tu golpe da en el blanco y causa {damage} de daño."),
        },
        (Language::En, Outcome::Success | Outcome::CriticalSuccess, Some(damage)) => match target {
            Some(t) => format!("Your blow lands on {t} for {damage} damage."),
            None => format!("Your blow lands for {damage} damage."),
        },
        (Language::Es, Outcome::Failure | Outcome::CriticalFailure, _) => match target {
            Some(t) => format!("{t} esquiva tu ataque."),
            None => "Tu ataque no encuentra su objetivo.".to_string(),
        },
        (Language::En, Outcome::Failure | Outcome::CriticalFailure, _) => match target {
            Some(t) => format!("The {t} evades your attack."),
            None => "Your attack finds nothing but air.".to_string(),
        },
        (lang, _, _) => lang
            .pick("La escena se tensa a tu alrededor.", "The scene tightens around you.")
            .to_string(),
    }
}
