//! Pipeline configuration.
//!
//! Every setting has a default. [`PipelineConfig::from_env`] overrides them
//! from `NARRATOR_*` environment variables; values that fail to parse are
//! ignored with a warning.

use crate::knowledge::KnowledgeConfig;
use crate::narrative::Genre;
use crate::render::RenderConfig;
use srd::SrdConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Default bound on a delegated engine call.
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on saving one session's state.
pub const DEFAULT_SAVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a [`Pipeline`](crate::pipeline::Pipeline).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub srd: SrdConfig,
    pub knowledge: KnowledgeConfig,
    pub render: RenderConfig,
    /// Where session state files live. `None` keeps state in memory.
    pub state_dir: Option<PathBuf>,
    pub engine_timeout: Duration,
    pub save_timeout: Duration,
    /// Genre given to sessions that have no saved state yet.
    pub genre: Genre,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            srd: SrdConfig::default(),
            knowledge: KnowledgeConfig::default(),
            render: RenderConfig::default(),
            state_dir: None,
            engine_timeout: DEFAULT_ENGINE_TIMEOUT,
            save_timeout: DEFAULT_SAVE_TIMEOUT,
            genre: Genre::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_knowledge(mut self, knowledge: KnowledgeConfig) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn with_render(mut self, render: RenderConfig) -> Self {
        self.render = render;
        self
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    pub fn with_engine_timeout(mut self, timeout: Duration) -> Self {
        self.engine_timeout = timeout;
        self
    }

    pub fn with_save_timeout(mut self, timeout: Duration) -> Self {
        self.save_timeout = timeout;
        self
    }

    pub fn with_genre(mut self, genre: Genre) -> Self {
        self.genre = genre;
        self
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let env = Env { lookup: &lookup };

        if let Some(url) = env.string("NARRATOR_SRD_URL") {
            config.srd.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = env.parse::<u64>("NARRATOR_SRD_TIMEOUT_SECS") {
            config.srd.timeout = Duration::from_secs(secs);
            config.knowledge.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env.parse::<u64>("NARRATOR_CACHE_TTL_SECS") {
            config.knowledge.ttl = Duration::from_secs(secs);
        }
        if let Some(limit) = env.parse::<usize>("NARRATOR_RESULT_LIMIT") {
            config.knowledge.limit = limit;
        }
        if let Some(dir) = env.string("NARRATOR_STATE_DIR") {
            config.state_dir = Some(PathBuf::from(dir));
        }
        if let Some(max_len) = env.parse::<usize>("NARRATOR_MAX_MESSAGE_LEN") {
            config.render.max_len = max_len;
        }
        if let Some(show) = env.flag("NARRATOR_SHOW_DICE") {
            config.render.show_dice = show;
        }
        if let Some(secs) = env.parse::<u64>("NARRATOR_ENGINE_TIMEOUT_SECS") {
            config.engine_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env.parse::<u64>("NARRATOR_SAVE_TIMEOUT_SECS") {
            config.save_timeout = Duration::from_secs(secs);
        }
        if let Some(genre) = env.parse::<Genre>("NARRATOR_GENRE") {
            config.genre = genre;
        }

        config
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.string(key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key, value = %raw, "ignoring invalid configuration value");
                None
            }
        }
    }

    fn flag(&self, key: &str) -> Option<bool> {
        let raw = self.string(key)?;
        match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => {
                warn!(key, value = %raw, "ignoring invalid flag");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> PipelineConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.knowledge.limit, 3);
        assert_eq!(config.render.max_len, 4000);
        assert!(config.render.show_dice);
        assert!(config.state_dir.is_none());
        assert_eq!(config.genre, Genre::Fantasy);
        assert_eq!(config.save_timeout, DEFAULT_SAVE_TIMEOUT);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("NARRATOR_SRD_URL", "http://localhost:9000/api/"),
            ("NARRATOR_SRD_TIMEOUT_SECS", "2"),
            ("NARRATOR_CACHE_TTL_SECS", "60"),
            ("NARRATOR_RESULT_LIMIT", "5"),
            ("NARRATOR_STATE_DIR", "/tmp/narrator"),
            ("NARRATOR_MAX_MESSAGE_LEN", "280"),
            ("NARRATOR_SHOW_DICE", "off"),
            ("NARRATOR_ENGINE_TIMEOUT_SECS", "4"),
            ("NARRATOR_SAVE_TIMEOUT_SECS", "1"),
            ("NARRATOR_GENRE", "horror"),
        ]);
        assert_eq!(config.srd.base_url, "http://localhost:9000/api");
        assert_eq!(config.srd.timeout, Duration::from_secs(2));
        assert_eq!(config.knowledge.timeout, Duration::from_secs(2));
        assert_eq!(config.knowledge.ttl, Duration::from_secs(60));
        assert_eq!(config.knowledge.limit, 5);
        assert_eq!(config.state_dir, Some(PathBuf::from("/tmp/narrator")));
        assert_eq!(config.render.max_len, 280);
        assert!(!config.render.show_dice);
        assert_eq!(config.engine_timeout, Duration::from_secs(4));
        assert_eq!(config.save_timeout, Duration::from_secs(1));
        assert_eq!(config.genre, Genre::Horror);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = config_from(&[
            ("NARRATOR_RESULT_LIMIT", "many"),
            ("NARRATOR_SHOW_DICE", "perhaps"),
            ("NARRATOR_GENRE", "western"),
            ("NARRATOR_SRD_URL", "   "),
        ]);
        assert_eq!(config.knowledge.limit, 3);
        assert!(config.render.show_dice);
        assert_eq!(config.genre, Genre::Fantasy);
        assert_eq!(config.srd.base_url, SrdConfig::default().base_url);
    }
}
