//! Action orchestration - the primary public API.
//!
//! A [`Pipeline`] takes one player [`Action`] at a time and runs it through
//! classification, knowledge lookup, rules resolution, narrative tracking
//! and rendering. Sessions are independent: each owns its narrative state
//! behind its own lock, and that lock is only taken to fold a resolution
//! into the state. Lookups, engine calls and saves happen outside it.
//!
//! Saves of one session are serialized by a second lock and stamped with a
//! revision taken under the state lock, so an older state never overwrites a
//! newer one in the store.

use crate::action::{Action, SessionId};
use crate::config::PipelineConfig;
use crate::dice::{self, CheckResult, DiceSource, RandomDice, RollResult};
use crate::engine::{act_with_timeout, local_narration, GameEngine, SideEvent};
use crate::intent::{classify, Intent, IntentCategory};
use crate::knowledge::{KnowledgeCache, KnowledgeQuery, KnowledgeResponse};
use crate::narrative::{Genre, NarrativeSnapshot, NarrativeState};
use crate::persist::{JsonFileStore, MemoryStore, NarrativeStore};
use crate::render::{Message, Renderer};
use crate::rules::{ResolveError, Resolution, RulesEngine};
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// Errors surfaced to the caller. Everything else degrades.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot identify the {0} of this action")]
    UnidentifiedActor(&'static str),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<ResolveError> for PipelineError {
    fn from(e: ResolveError) -> Self {
        PipelineError::Internal(e.to_string())
    }
}

/// Everything produced by one handled action.
#[derive(Debug, Clone)]
pub struct Turn {
    pub message: Message,
    pub intent: Intent,
    pub resolution: Resolution,
    /// Side-channel event to deliver alongside the message.
    pub event: Option<SideEvent>,
    /// Whether the updated narrative state reached the store.
    pub persisted: bool,
}

/// One session's live state and the bookkeeping for saving it.
struct Session {
    state: Mutex<NarrativeState>,
    // Bumped under the `state` lock on every change.
    revision: AtomicU64,
    // Revision last written to the store.
    saved: Mutex<u64>,
}

impl Session {
    fn new(state: NarrativeState) -> Self {
        Self {
            state: Mutex::new(state),
            revision: AtomicU64::new(0),
            saved: Mutex::new(0),
        }
    }

    /// Stamp a change made while holding the state lock.
    fn bump(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }
}

type SessionSlot = Arc<Session>;

/// The action resolution pipeline.
pub struct Pipeline {
    knowledge: Arc<KnowledgeCache>,
    rules: RulesEngine,
    renderer: Renderer,
    store: Arc<dyn NarrativeStore>,
    engine: Option<Arc<dyn GameEngine>>,
    sessions: DashMap<SessionId, SessionSlot>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Assemble a pipeline from explicit collaborators.
    pub fn new(
        knowledge: Arc<KnowledgeCache>,
        store: Arc<dyn NarrativeStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            knowledge,
            rules: RulesEngine::new(),
            renderer: Renderer::new(config.render.clone()),
            store,
            engine: None,
            sessions: DashMap::new(),
            config,
        }
    }

    /// Build the SRD client, cache and store described by `config`.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        let srd = srd::Srd::new(config.srd.clone())
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        let knowledge = Arc::new(KnowledgeCache::new(Arc::new(srd), config.knowledge.clone()));
        let store: Arc<dyn NarrativeStore> = match &config.state_dir {
            Some(dir) => Arc::new(JsonFileStore::new(dir)),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self::new(knowledge, store, config))
    }

    /// Delegate attack intents to an external engine.
    pub fn with_engine(mut self, engine: Arc<dyn GameEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn knowledge(&self) -> &KnowledgeCache {
        &self.knowledge
    }

    /// Sessions currently held in memory.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Handle one action with fresh randomness.
    pub async fn handle(&self, action: Action) -> Result<Turn, PipelineError> {
        let mut dice = RandomDice::from_entropy();
        let mut rng = StdRng::from_entropy();
        self.handle_with(action, &mut dice, &mut rng).await
    }

    /// Handle one action with injected dice and template randomness.
    #[instrument(
        skip_all,
        fields(session_id = %action.session_id, action_id = %action.id)
    )]
    pub async fn handle_with<D, R>(
        &self,
        action: Action,
        dice: &mut D,
        rng: &mut R,
    ) -> Result<Turn, PipelineError>
    where
        D: DiceSource + Send + ?Sized,
        R: Rng + Send + ?Sized,
    {
        if action.session_id.is_blank() {
            return Err(PipelineError::UnidentifiedActor("session"));
        }
        if action.player_id.is_blank() {
            return Err(PipelineError::UnidentifiedActor("player"));
        }

        let intent = classify(&action.text, action.id);
        let knowledge = self.lookup(&intent, &action).await;
        let resolution = self.rules.resolve(&intent, knowledge.as_ref(), &action, dice)?;

        let (narration, engine_event) = self.delegate(&resolution, &action).await;

        let slot = self.session_slot(&action.session_id).await;
        let (recorded, snapshot, saved, revision) = {
            let mut state = slot.state.lock().await;
            let recorded = state.record(&resolution, &action);
            (recorded, state.snapshot(), state.clone(), slot.bump())
        };
        let persisted = self
            .persist(&action.session_id, &slot, &saved, revision)
            .await;

        let event = engine_event.or_else(|| {
            recorded
                .stage_change
                .map(|change| SideEvent::stage_change(change, action.language))
        });

        let message = self.renderer.render(
            &resolution,
            &intent,
            &action,
            &snapshot,
            narration.as_deref(),
            rng,
        );

        info!(
            category = intent.category.name(),
            outcome = resolution.outcome.name(),
            stage = snapshot.stage.name(),
            emotion = recorded.emotion,
            persisted,
            truncated = message.truncated,
            "handled action"
        );

        Ok(Turn {
            message,
            intent,
            resolution,
            event,
            persisted,
        })
    }

    /// Knowledge lookup for intents that benefit from one. Never fails.
    async fn lookup(&self, intent: &Intent, action: &Action) -> Option<KnowledgeResponse> {
        if !intent.requires_srd {
            return None;
        }
        let query = KnowledgeQuery::for_intent(intent)?
            .with_limit(self.knowledge.config().limit)
            .with_ttl(self.knowledge.config().ttl)
            .with_language(action.language);
        Some(self.knowledge.lookup_query(&query, action.id).await)
    }

    /// Engine narration and event for attacks, when an engine is attached.
    async fn delegate(
        &self,
        resolution: &Resolution,
        action: &Action,
    ) -> (Option<String>, Option<SideEvent>) {
        let Some(engine) = &self.engine else {
            return (None, None);
        };
        if resolution.intent.category != IntentCategory::Attack {
            return (None, None);
        }
        match act_with_timeout(
            engine.as_ref(),
            &action.player_id,
            &action.text,
            self.config.engine_timeout,
        )
        .await
        {
            Ok(reply) => (Some(reply.narrative), reply.event),
            Err(_) => (Some(local_narration(resolution, action.language)), None),
        }
    }

    async fn session_slot(&self, session: &SessionId) -> SessionSlot {
        if let Some(slot) = self.sessions.get(session) {
            return Arc::clone(slot.value());
        }
        let state = self.load_state(session).await;
        Arc::clone(
            self.sessions
                .entry(session.clone())
                .or_insert_with(|| Arc::new(Session::new(state)))
                .value(),
        )
    }

    /// Saved state, or a fresh one if there is none or it cannot be read.
    async fn load_state(&self, session: &SessionId) -> NarrativeState {
        match self.store.load(session).await {
            Ok(Some(state)) => state,
            Ok(None) => NarrativeState::new(self.config.genre),
            Err(e) => {
                warn!(session_id = %session, error = %e, "could not load narrative state, starting fresh");
                NarrativeState::new(self.config.genre)
            }
        }
    }

    /// Save `state`, taken at `revision`. A newer revision that already
    /// reached the store covers this one.
    async fn persist(
        &self,
        session: &SessionId,
        slot: &Session,
        state: &NarrativeState,
        revision: u64,
    ) -> bool {
        let mut saved = slot.saved.lock().await;
        if *saved >= revision {
            return true;
        }
        let timeout = self.config.save_timeout;
        match tokio::time::timeout(timeout, self.store.save(session, state)).await {
            Ok(Ok(())) => {
                *saved = revision;
                true
            }
            Ok(Err(e)) => {
                warn!(session_id = %session, error = %e, "could not save narrative state");
                false
            }
            Err(_) => {
                warn!(
                    session_id = %session,
                    timeout_ms = timeout.as_millis() as u64,
                    "saving narrative state timed out"
                );
                false
            }
        }
    }

    fn check_session(session: &SessionId) -> Result<(), PipelineError> {
        if session.is_blank() {
            Err(PipelineError::UnidentifiedActor("session"))
        } else {
            Ok(())
        }
    }

    /// Current narrative state of a session.
    pub async fn narrative_snapshot(
        &self,
        session: &SessionId,
    ) -> Result<NarrativeSnapshot, PipelineError> {
        Self::check_session(session)?;
        let slot = self.session_slot(session).await;
        let state = slot.state.lock().await;
        Ok(state.snapshot())
    }

    /// Reset a session's dramatic curve. Returns whether the change was saved.
    pub async fn reset_session(&self, session: &SessionId) -> Result<bool, PipelineError> {
        Self::check_session(session)?;
        let slot = self.session_slot(session).await;
        let (saved, revision) = {
            let mut state = slot.state.lock().await;
            state.reset_curve();
            (state.clone(), slot.bump())
        };
        info!(session_id = %session, "dramatic curve reset");
        Ok(self.persist(session, &slot, &saved, revision).await)
    }

    /// Change a session's genre. Returns whether the change was saved.
    pub async fn set_genre(&self, session: &SessionId, genre: Genre) -> Result<bool, PipelineError> {
        Self::check_session(session)?;
        let slot = self.session_slot(session).await;
        let (saved, revision) = {
            let mut state = slot.state.lock().await;
            state.set_genre(genre);
            (state.clone(), slot.bump())
        };
        Ok(self.persist(session, &slot, &saved, revision).await)
    }

    /// Roll free-form dice notation.
    pub fn roll(&self, notation: &str) -> Option<RollResult> {
        dice::roll_notation(notation)
    }

    /// Standalone ability check.
    pub fn ability_check(&self, label: &str, modifier: i32) -> CheckResult {
        dice::ability_check(label, modifier)
    }
}
