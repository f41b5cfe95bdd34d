//! Narrative state persistence.
//!
//! State is stored per session behind the [`NarrativeStore`] trait. The
//! file-backed store writes one versioned JSON document per session, so the
//! files stay human-readable and can be inspected or edited by hand.

use crate::action::SessionId;
use crate::narrative::NarrativeState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current state file version.
const STATE_VERSION: u32 = 1;

/// The on-disk document for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedNarrative {
    /// Format version for compatibility checking.
    pub version: u32,
    pub session_id: SessionId,
    pub saved_at: DateTime<Utc>,
    pub state: NarrativeState,
}

impl SavedNarrative {
    pub fn new(session_id: SessionId, state: NarrativeState) -> Self {
        Self {
            version: STATE_VERSION,
            session_id,
            saved_at: Utc::now(),
            state,
        }
    }

    /// Save to a JSON file, replacing it atomically.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let saved: Self = serde_json::from_str(&content)?;

        if saved.version != STATE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: STATE_VERSION,
                found: saved.version,
            });
        }

        Ok(saved)
    }
}

/// Load/save of per-session narrative state.
///
/// `load` returns `Ok(None)` for a session that was never saved.
#[async_trait]
pub trait NarrativeStore: Send + Sync {
    async fn load(&self, session: &SessionId) -> Result<Option<NarrativeState>, PersistError>;

    async fn save(&self, session: &SessionId, state: &NarrativeState) -> Result<(), PersistError>;
}

/// One JSON file per session under a state directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding a session's state.
    pub fn path_for(&self, session: &SessionId) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(session.as_str())))
    }
}

#[async_trait]
impl NarrativeStore for JsonFileStore {
    async fn load(&self, session: &SessionId) -> Result<Option<NarrativeState>, PersistError> {
        let path = self.path_for(session);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        let saved = SavedNarrative::load_json(&path).await?;
        debug!(session_id = %session, path = %path.display(), "loaded narrative state");
        Ok(Some(saved.state))
    }

    async fn save(&self, session: &SessionId, state: &NarrativeState) -> Result<(), PersistError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(session);
        SavedNarrative::new(session.clone(), state.clone())
            .save_json(&path)
            .await?;
        debug!(session_id = %session, path = %path.display(), "saved narrative state");
        Ok(())
    }
}

/// Escape a session id into a file name. Distinct ids map to distinct names.
fn file_stem(id: &str) -> String {
    let mut stem = String::with_capacity(id.len());
    for c in id.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            stem.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                stem.push_str(&format!("%{byte:02x}"));
            }
        }
    }
    stem
}

/// In-memory store, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    states: DashMap<SessionId, NarrativeState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Stored state for a session, bypassing the async trait.
    pub fn get(&self, session: &SessionId) -> Option<NarrativeState> {
        self.states.get(session).map(|s| s.value().clone())
    }
}

#[async_trait]
impl NarrativeStore for MemoryStore {
    async fn load(&self, session: &SessionId) -> Result<Option<NarrativeState>, PersistError> {
        Ok(self.get(session))
    }

    async fn save(&self, session: &SessionId, state: &NarrativeState) -> Result<(), PersistError> {
        self.states.insert(session.clone(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::{Genre, Theme};

    fn sample_state() -> NarrativeState {
        let mut state = NarrativeState::new(Genre::Horror);
        state.themes.record(Theme::Vengeance);
        state.curve.advance();
        state
    }

    #[tokio::test]
    async fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state"));
        let session = SessionId::new("chat-42");

        assert_eq!(store.load(&session).await.unwrap(), None);

        let state = sample_state();
        store.save(&session, &state).await.unwrap();
        assert!(store.path_for(&session).exists());
        assert_eq!(store.load(&session).await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let session = SessionId::new("s");

        store.save(&session, &NarrativeState::default()).await.unwrap();
        let state = sample_state();
        store.save(&session, &state).await.unwrap();
        assert_eq!(store.load(&session).await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_version_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let session = SessionId::new("old");

        let mut saved = SavedNarrative::new(session.clone(), NarrativeState::default());
        saved.version = 99;
        let json = serde_json::to_string(&saved).unwrap();
        std::fs::write(store.path_for(&session), json).unwrap();

        let err = store.load(&session).await.unwrap_err();
        assert!(matches!(
            err,
            PersistError::VersionMismatch {
                expected: 1,
                found: 99
            }
        ));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let session = SessionId::new("broken");
        std::fs::write(store.path_for(&session), "{not json").unwrap();
        assert!(matches!(
            store.load(&session).await.unwrap_err(),
            PersistError::Json(_)
        ));
    }

    #[test]
    fn test_file_stem_escapes() {
        assert_eq!(file_stem("chat-42_a"), "chat-42_a");
        assert_eq!(file_stem("../etc"), "%2e%2e%2fetc");
        assert_ne!(file_stem("a:b"), file_stem("a_b"));
        assert_eq!(file_stem("ñ"), "%c3%b1");
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        let session = SessionId::new("s1");
        assert!(store.is_empty());
        assert_eq!(store.load(&session).await.unwrap(), None);
        store.save(&session, &sample_state()).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&session), Some(sample_state()));
    }
}
