//! Action resolution pipeline for a turn-based narrative game assistant.
//!
//! This crate provides:
//! - Bilingual (Spanish/English) intent classification of free-text actions
//! - Dice mechanics with a replayable roll log
//! - Rules resolution enriched by a cached SRD lookup
//! - Per-session narrative tracking (dramatic curve, themes, mood)
//! - Rendering into bounded, MarkdownV2-safe text
//!
//! # Quick Start
//!
//! ```ignore
//! use narrator_core::{Action, Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::from_config(PipelineConfig::from_env())?;
//!
//!     let turn = pipeline
//!         .handle(Action::new("chat-1", "player-7", "ataco al goblin con mi hacha"))
//!         .await?;
//!     println!("{}", turn.message.text);
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod cache;
pub mod config;
pub mod dice;
pub mod engine;
pub mod intent;
pub mod knowledge;
pub mod narrative;
pub mod persist;
pub mod pipeline;
pub mod render;
pub mod rules;
pub mod testing;

// Primary public API
pub use action::{Action, ActionId, CharacterState, Language, PlayerId, SceneContext, SessionId};
pub use config::PipelineConfig;
pub use dice::{CheckOutcome, DiceSource, LoadedDice, RandomDice, RollResult};
pub use engine::{EngineError, EngineReply, GameEngine, SideEvent};
pub use intent::{classify, Intent, IntentCategory};
pub use knowledge::{KnowledgeCache, KnowledgeConfig, KnowledgeQuery, KnowledgeResponse};
pub use narrative::{Genre, NarrativeSnapshot, NarrativeState, Stage, Theme};
pub use persist::{JsonFileStore, MemoryStore, NarrativeStore, PersistError};
pub use pipeline::{Pipeline, PipelineError, Turn};
pub use render::{Message, RenderConfig, Renderer};
pub use rules::{Outcome, Resolution, RulesEngine, Step, StepKind};
