//! Testing utilities for the narrator pipeline.
//!
//! Hand-written doubles for the pipeline's external seams:
//! - `ScriptedKnowledge` stands in for the rules-reference service
//! - `ScriptedEngine` stands in for the delegated game engine
//! - `BrokenStore` is a narrative store whose every call fails
//! - `StalledStore` is a narrative store whose saves hang
//!
//! `MemoryStore` and `LoadedDice` are re-exported for convenience.

use crate::action::{PlayerId, SessionId};
use crate::engine::{EngineError, EngineReply, GameEngine};
use crate::knowledge::{KnowledgeCategory, KnowledgeHit, KnowledgeSource};
use crate::narrative::NarrativeState;
use crate::persist::{NarrativeStore, PersistError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub use crate::dice::LoadedDice;
pub use crate::persist::MemoryStore;

/// A knowledge source that returns the same scripted hits for every query,
/// or fails every query.
pub struct ScriptedKnowledge {
    hits: Option<Vec<KnowledgeHit>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    queries: Mutex<Vec<(KnowledgeCategory, String)>>,
}

impl ScriptedKnowledge {
    pub fn with_hits(hits: Vec<KnowledgeHit>) -> Self {
        Self {
            hits: Some(hits),
            delay: None,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Every fetch fails with a network error.
    pub fn failing() -> Self {
        Self {
            hits: None,
            ..Self::with_hits(Vec::new())
        }
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of fetches made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every `(category, term)` fetched, in order.
    pub fn queries(&self) -> Vec<(KnowledgeCategory, String)> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl KnowledgeSource for ScriptedKnowledge {
    async fn fetch(
        &self,
        category: KnowledgeCategory,
        term: &str,
        limit: usize,
    ) -> Result<Vec<KnowledgeHit>, srd::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queries) = self.queries.lock() {
            queries.push((category, term.to_string()));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.hits {
            Some(hits) => Ok(hits.iter().take(limit).cloned().collect()),
            None => Err(srd::Error::Network("connection refused".to_string())),
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// A game engine that replies with a fixed answer, or always fails.
pub struct ScriptedEngine {
    reply: Option<EngineReply>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedEngine {
    pub fn replying(reply: EngineReply) -> Self {
        Self {
            reply: Some(reply),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GameEngine for ScriptedEngine {
    async fn act(&self, _player_id: &PlayerId, _text: &str) -> Result<EngineReply, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply
            .clone()
            .ok_or_else(|| EngineError::Unavailable("scripted failure".to_string()))
    }
}

/// A store whose disk is always on fire.
#[derive(Debug, Default)]
pub struct BrokenStore;

impl BrokenStore {
    fn error() -> PersistError {
        PersistError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only state directory",
        ))
    }
}

#[async_trait]
impl NarrativeStore for BrokenStore {
    async fn load(&self, _session: &SessionId) -> Result<Option<NarrativeState>, PersistError> {
        Err(Self::error())
    }

    async fn save(&self, _session: &SessionId, _state: &NarrativeState) -> Result<(), PersistError> {
        Err(Self::error())
    }
}

/// A store with nothing saved whose saves take `delay` before succeeding.
#[derive(Debug)]
pub struct StalledStore {
    delay: Duration,
    saves_started: AtomicUsize,
}

impl StalledStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            saves_started: AtomicUsize::new(0),
        }
    }

    /// Saves that have begun, finished or not.
    pub fn saves_started(&self) -> usize {
        self.saves_started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NarrativeStore for StalledStore {
    async fn load(&self, _session: &SessionId) -> Result<Option<NarrativeState>, PersistError> {
        Ok(None)
    }

    async fn save(&self, _session: &SessionId, _state: &NarrativeState) -> Result<(), PersistError> {
        self.saves_started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}
