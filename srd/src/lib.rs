//! Minimal client for an SRD rules-reference HTTP service.
//!
//! This crate provides a focused client for the `GET /{resource}?q=<term>`
//! search surface exposed by SRD mirrors, with:
//! - A fixed category → resource naming table
//! - Bounded request and connect timeouts
//! - Normalization of the three body shapes the service is known to return
//!   (results list, name-keyed dictionary, bare record) into [`Hit`]s

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://www.dnd5eapi.co/api";
const DEFAULT_TIMEOUT_SECS: u64 = 8;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 3;

/// Maximum length of a hit summary, in characters.
const MAX_SUMMARY_CHARS: usize = 280;

/// Record keys that are lifted into dedicated [`Hit`] fields.
const LIFTED_KEYS: &[&str] = &["name", "slug", "index", "desc", "description", "summary"];

/// Errors that can occur when talking to the SRD service.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("SRD error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Knowledge categories understood by the rules service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Spell,
    Monster,
    Race,
    Class,
    Feature,
    Condition,
    Skill,
}

impl Category {
    /// Every category, in table order.
    pub const ALL: [Category; 7] = [
        Category::Spell,
        Category::Monster,
        Category::Race,
        Category::Class,
        Category::Feature,
        Category::Condition,
        Category::Skill,
    ];

    /// The service endpoint that answers queries for this category.
    ///
    /// Features are served from the class listing.
    pub fn resource(&self) -> &'static str {
        match self {
            Category::Spell => "spells",
            Category::Monster => "monsters",
            Category::Race => "races",
            Category::Class | Category::Feature => "classes",
            Category::Condition => "conditions",
            Category::Skill => "skills",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Spell => "spell",
            Category::Monster => "monster",
            Category::Race => "race",
            Category::Class => "class",
            Category::Feature => "feature",
            Category::Condition => "condition",
            Category::Skill => "skill",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| Error::Config(format!("unknown category: {s}")))
    }
}

/// A normalized rules-reference record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub category: Category,
    pub name: String,
    pub slug: String,
    pub summary: String,
    #[serde(default)]
    pub detail: Map<String, Value>,
}

/// Connection settings for the SRD service.
#[derive(Debug, Clone)]
pub struct SrdConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl SrdConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for SrdConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// SRD service client.
#[derive(Clone)]
pub struct Srd {
    client: reqwest::Client,
    base_url: String,
}

impl Srd {
    /// Create a client for the given configuration.
    pub fn new(config: SrdConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        if config.base_url.is_empty() {
            return Err(Error::Config("empty base URL".to_string()));
        }

        Ok(Self {
            client,
            base_url: config.base_url,
        })
    }

    /// The base URL requests are issued against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue one search request and return the raw JSON body.
    pub async fn search(&self, category: Category, term: &str) -> Result<Value, Error> {
        let url = format!("{}/{}", self.base_url, category.resource());
        debug!(%category, term, %url, "querying SRD service");

        let response = self
            .client
            .get(&url)
            .query(&[("q", term)])
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))
    }

    /// Search and normalize, keeping at most `limit` hits.
    pub async fn lookup(
        &self,
        category: Category,
        term: &str,
        limit: usize,
    ) -> Result<Vec<Hit>, Error> {
        let body = self.search(category, term).await?;
        Ok(normalize(category, term, &body, limit))
    }
}

// ============================================================================
// Body normalization
// ============================================================================

/// Normalize any of the known response shapes into at most `limit` hits.
///
/// Records that cannot be read are skipped.
pub fn normalize(category: Category, term: &str, body: &Value, limit: usize) -> Vec<Hit> {
    let records: Vec<(Option<&str>, &Value)> = match body {
        Value::Array(items) => items.iter().map(|v| (None, v)).collect(),
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("results") {
                items.iter().map(|v| (None, v)).collect()
            } else if is_bare_record(map) {
                vec![(None, body)]
            } else {
                let wanted = fold(term);
                map.iter()
                    .filter(|(key, value)| {
                        wanted.is_empty()
                            || fold(key).contains(&wanted)
                            || value
                                .get("name")
                                .and_then(Value::as_str)
                                .is_some_and(|n| fold(n).contains(&wanted))
                    })
                    .map(|(key, value)| (Some(key.as_str()), value))
                    .collect()
            }
        }
        other => {
            warn!(%category, term, kind = value_kind(other), "unexpected SRD body");
            Vec::new()
        }
    };

    records
        .into_iter()
        .filter_map(|(key, record)| match to_hit(category, key, record) {
            Some(hit) => Some(hit),
            None => {
                warn!(%category, term, ?key, "skipping unreadable SRD record");
                None
            }
        })
        .take(limit)
        .collect()
}

fn is_bare_record(map: &Map<String, Value>) -> bool {
    ["name", "index", "slug"]
        .iter()
        .any(|k| map.get(*k).is_some_and(Value::is_string))
}

fn to_hit(category: Category, key: Option<&str>, record: &Value) -> Option<Hit> {
    let map = record.as_object()?;

    let name = map
        .get("name")
        .and_then(Value::as_str)
        .or(key)
        .map(str::trim)
        .filter(|n| !n.is_empty())?
        .to_string();

    let slug = map
        .get("slug")
        .or_else(|| map.get("index"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| slugify(&name));

    let summary = ["desc", "description", "summary"]
        .iter()
        .find_map(|k| map.get(*k).and_then(text_of))
        .map(|s| clip(&s, MAX_SUMMARY_CHARS))
        .unwrap_or_default();

    let detail = map
        .iter()
        .filter(|(k, _)| !LIFTED_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Some(Hit {
        category,
        name,
        slug,
        summary,
        detail,
    })
}

/// Descriptions come either as a string or as a list of paragraphs.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Array(parts) => {
            let joined = parts
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .collect::<Vec<_>>()
                .join(" ");
            Some(joined)
        }
        _ => None,
    }
    .filter(|s| !s.is_empty())
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max_chars - 1).collect();
    clipped.push('…');
    clipped
}

fn fold(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Lowercase, alphanumerics kept, every other run collapsed to one dash.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().to_lowercase().chars() {
        if ch.is_alphanumeric() {
            slug.push(ch);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
