//! Cached rules-knowledge lookups.
//!
//! The cache is an explicitly constructed object shared by every session of
//! a process. Lookups are keyed by `(category, term)`; concurrent misses for
//! the same key may both reach the remote service, and the last writer wins.
//! Lookup failures never surface to callers: they produce an empty response,
//! which means "no enrichment available".

use crate::action::{ActionId, Language};
use crate::cache::TtlCache;
use crate::intent::{Intent, IntentCategory};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use srd::{Category as KnowledgeCategory, Hit as KnowledgeHit};

/// Default number of hits returned per lookup.
pub const DEFAULT_LIMIT: usize = 3;

/// Default lifetime of a cached response.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

/// Default bound on one remote lookup.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// One knowledge request.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeQuery {
    pub category: KnowledgeCategory,
    pub term: String,
    pub limit: usize,
    pub language: Language,
    pub ttl: Duration,
}

impl KnowledgeQuery {
    pub fn new(category: KnowledgeCategory, term: impl Into<String>) -> Self {
        Self {
            category,
            term: term.into(),
            limit: DEFAULT_LIMIT,
            language: Language::default(),
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The lookup an intent calls for, if it calls for one and names
    /// something to look up.
    pub fn for_intent(intent: &Intent) -> Option<Self> {
        if !intent.requires_srd {
            return None;
        }
        let (category, entity) = match intent.category {
            IntentCategory::CastSpell => (KnowledgeCategory::Spell, "spell"),
            IntentCategory::Attack => (KnowledgeCategory::Monster, "target"),
            IntentCategory::SkillCheck => (KnowledgeCategory::Skill, "skill"),
            _ => return None,
        };
        intent
            .entity(entity)
            .filter(|term| !term.trim().is_empty())
            .map(|term| Self::new(category, term))
    }

    fn cache_key(&self) -> (KnowledgeCategory, String) {
        (self.category, self.term.trim().to_lowercase())
    }
}

/// Hits for a query, plus where they came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeResponse {
    pub hits: Vec<KnowledgeHit>,
    pub from_cache: bool,
    pub source: String,
}

impl KnowledgeResponse {
    pub fn empty(source: impl Into<String>) -> Self {
        Self {
            hits: Vec::new(),
            from_cache: false,
            source: source.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// The best hit, if any.
    pub fn first(&self) -> Option<&KnowledgeHit> {
        self.hits.first()
    }
}

/// Where knowledge comes from.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    async fn fetch(
        &self,
        category: KnowledgeCategory,
        term: &str,
        limit: usize,
    ) -> Result<Vec<KnowledgeHit>, srd::Error>;

    /// Short description used as the response's source descriptor.
    fn describe(&self) -> String;
}

#[async_trait]
impl KnowledgeSource for srd::Srd {
    async fn fetch(
        &self,
        category: KnowledgeCategory,
        term: &str,
        limit: usize,
    ) -> Result<Vec<KnowledgeHit>, srd::Error> {
        self.lookup(category, term, limit).await
    }

    fn describe(&self) -> String {
        format!("srd:{}", self.base_url())
    }
}

/// Settings for the knowledge cache.
#[derive(Debug, Clone)]
pub struct KnowledgeConfig {
    pub ttl: Duration,
    pub timeout: Duration,
    pub limit: usize,
}

impl KnowledgeConfig {
    pub fn new() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            timeout: DEFAULT_TIMEOUT,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Hits as fetched, and the limit they were fetched with.
#[derive(Debug, Clone)]
struct CachedHits {
    hits: Vec<KnowledgeHit>,
    fetched_limit: usize,
}

impl CachedHits {
    /// Whether these hits answer a query for `limit` hits. A full page
    /// fetched with a smaller limit may have left hits behind.
    fn covers(&self, limit: usize) -> bool {
        limit <= self.fetched_limit || self.hits.len() < self.fetched_limit
    }
}

/// Knowledge lookups with a shared `(category, term)` cache.
pub struct KnowledgeCache {
    source: Arc<dyn KnowledgeSource>,
    entries: TtlCache<(KnowledgeCategory, String), CachedHits>,
    config: KnowledgeConfig,
}

impl KnowledgeCache {
    pub fn new(source: Arc<dyn KnowledgeSource>, config: KnowledgeConfig) -> Self {
        Self {
            source,
            entries: TtlCache::new(),
            config,
        }
    }

    pub fn config(&self) -> &KnowledgeConfig {
        &self.config
    }

    /// A query for `category`/`term` carrying the configured limit and TTL.
    pub fn query(&self, category: KnowledgeCategory, term: &str) -> KnowledgeQuery {
        KnowledgeQuery::new(category, term)
            .with_limit(self.config.limit)
            .with_ttl(self.config.ttl)
    }

    /// Look up `term` in `category` with the configured defaults.
    pub async fn lookup(
        &self,
        category: KnowledgeCategory,
        term: &str,
        action_id: ActionId,
    ) -> KnowledgeResponse {
        let query = self.query(category, term);
        self.lookup_query(&query, action_id).await
    }

    /// Run a fully specified query.
    pub async fn lookup_query(&self, query: &KnowledgeQuery, action_id: ActionId) -> KnowledgeResponse {
        let key = query.cache_key();
        let category = query.category;

        if let Some(cached) = self.entries.get(&key).await {
            if cached.covers(query.limit) {
                debug!(%action_id, %category, term = %key.1, "knowledge cache hit");
                let mut hits = cached.hits;
                hits.truncate(query.limit);
                return KnowledgeResponse {
                    hits,
                    from_cache: true,
                    source: format!("cache:{}", self.source.describe()),
                };
            }
        }

        let fetched =
            tokio::time::timeout(self.config.timeout, self.source.fetch(category, &key.1, query.limit))
                .await;
        match fetched {
            Ok(Ok(fetched)) => {
                debug!(%action_id, %category, term = %key.1, hits = fetched.len(), "knowledge fetched");
                let mut hits = fetched.clone();
                hits.truncate(query.limit);
                let cached = CachedHits {
                    hits: fetched,
                    fetched_limit: query.limit,
                };
                self.entries.insert(key, cached, query.ttl).await;
                KnowledgeResponse {
                    hits,
                    from_cache: false,
                    source: self.source.describe(),
                }
            }
            Ok(Err(e)) => {
                warn!(%action_id, %category, term = %key.1, error = %e, "knowledge lookup failed");
                KnowledgeResponse::empty(self.source.describe())
            }
            Err(_) => {
                warn!(
                    %action_id,
                    %category,
                    term = %key.1,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "knowledge lookup timed out"
                );
                KnowledgeResponse::empty(self.source.describe())
            }
        }
    }

    /// Drop expired entries.
    pub async fn purge_expired(&self) -> usize {
        self.entries.purge_expired().await
    }

    pub async fn cached_entries(&self) -> usize {
        self.entries.len().await
    }
}
