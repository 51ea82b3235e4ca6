//! Aggregator configuration with sensible defaults.
//!
//! [`AggregatorConfig`] controls limits, per-source timeouts and rate limits,
//! caching, the intent classifier, ranking weights and request behaviour.
//! Every section uses `#[serde(default)]`, so a TOML file only needs the
//! keys it overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::types::SourceId;

/// Top-level configuration for the research aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Result limit used when a request does not specify one.
    pub default_limit: usize,
    /// Upper bound on any requested limit.
    pub max_limit: usize,
    /// Cross-reference and enrich duplicates (slower) instead of basic dedup.
    pub enable_cross_reference: bool,
    /// Include code-linked indexes in source selection.
    pub include_code_sources: bool,
    /// Response cache settings.
    pub cache: CacheConfig,
    /// Per-source timeouts.
    pub timeouts: SourceTimeouts,
    /// Per-source outbound request budgets.
    pub rate_limits: SourceRateLimits,
    /// Intent classifier settings.
    pub classifier: ClassifierConfig,
    /// Ranking weights.
    pub ranking: RankingConfig,
    /// Adaptive source selection.
    pub circuit_breaker: CircuitBreakerSettings,
    /// Outbound HTTP behaviour.
    pub http: HttpConfig,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            enable_cross_reference: true,
            include_code_sources: true,
            cache: CacheConfig::default(),
            timeouts: SourceTimeouts::default(),
            rate_limits: SourceRateLimits::default(),
            classifier: ClassifierConfig::default(),
            ranking: RankingConfig::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            http: HttpConfig::default(),
        }
    }
}

/// Which store backs the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Mutex-guarded in-process map with oldest-first eviction.
    #[default]
    Memory,
    /// `moka` concurrent cache.
    Moka,
}

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime in seconds. Set to 0 to disable caching.
    pub ttl_seconds: u64,
    /// Maximum number of cached responses.
    pub max_entries: usize,
    /// Backing store.
    pub backend: CacheBackend,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            max_entries: 100,
            backend: CacheBackend::Memory,
        }
    }
}

/// Per-source timeout budgets in seconds.
///
/// Slower sources get a longer budget so that a single global timeout
/// neither starves fast sources nor waits on slow tails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceTimeouts {
    /// arXiv export API.
    pub arxiv: u64,
    /// OpenAlex.
    pub openalex: u64,
    /// Semantic Scholar.
    pub semantic_scholar: u64,
    /// Papers with Code.
    pub papers_with_code: u64,
}

impl Default for SourceTimeouts {
    fn default() -> Self {
        Self {
            arxiv: 15,
            openalex: 10,
            semantic_scholar: 12,
            papers_with_code: 20,
        }
    }
}

impl SourceTimeouts {
    /// Timeout in seconds for `source`.
    pub fn seconds(&self, source: SourceId) -> u64 {
        match source {
            SourceId::Arxiv => self.arxiv,
            SourceId::OpenAlex => self.openalex,
            SourceId::SemanticScholar => self.semantic_scholar,
            SourceId::PapersWithCode => self.papers_with_code,
        }
    }

    /// Timeout for `source`.
    pub fn for_source(&self, source: SourceId) -> Duration {
        Duration::from_secs(self.seconds(source))
    }

    /// Largest configured timeout.
    pub fn max(&self) -> Duration {
        SourceId::all()
            .iter()
            .map(|s| self.for_source(*s))
            .max()
            .unwrap_or_default()
    }
}

/// Requests per minute each source may receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceRateLimits {
    /// arXiv asks for no more than one request every three seconds.
    pub arxiv: u32,
    /// OpenAlex polite pool.
    pub openalex: u32,
    /// Semantic Scholar unauthenticated pool.
    pub semantic_scholar: u32,
    /// Papers with Code.
    pub papers_with_code: u32,
}

impl Default for SourceRateLimits {
    fn default() -> Self {
        Self {
            arxiv: 20,
            openalex: 600,
            semantic_scholar: 100,
            papers_with_code: 60,
        }
    }
}

impl SourceRateLimits {
    /// Requests per minute for `source`.
    pub fn per_minute(&self, source: SourceId) -> u32 {
        match source {
            SourceId::Arxiv => self.arxiv,
            SourceId::OpenAlex => self.openalex,
            SourceId::SemanticScholar => self.semantic_scholar,
            SourceId::PapersWithCode => self.papers_with_code,
        }
    }
}

/// Language-model intent classifier settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Use the language model. When false only the heuristic runs.
    pub enabled: bool,
    /// OpenAI-compatible base URL (without `/v1`).
    pub api_url: String,
    /// Model identifier.
    pub api_model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Budget for the model call in seconds.
    pub timeout_seconds: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://api.openai.com".into(),
            api_model: "gpt-4o-mini".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_seconds: 8,
        }
    }
}

impl ClassifierConfig {
    /// Resolve the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
    }
}

/// Ranking weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Maximum citation contribution.
    pub citation_cap: f64,
    /// Maximum citation contribution under the `cited` strategy.
    pub cited_citation_cap: f64,
    /// Maximum recency contribution.
    pub recency_max: f64,
    /// Maximum recency contribution under the `latest` strategy.
    pub latest_recency_max: f64,
    /// Age in years at which the recency contribution reaches zero.
    pub recency_cutoff_years: f64,
    /// Bonus for a non-trivial abstract.
    pub abstract_bonus: f64,
    /// Minimum abstract length (characters) for the bonus.
    pub abstract_min_chars: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            citation_cap: 25.0,
            cited_citation_cap: 50.0,
            recency_max: 15.0,
            latest_recency_max: 35.0,
            recency_cutoff_years: 10.0,
            abstract_bonus: 5.0,
            abstract_min_chars: 100,
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures before a source is skipped.
    pub failure_threshold: u32,
    /// Seconds before a skipped source is tried again.
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

/// Outbound HTTP behaviour shared by all adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// User-Agent header.
    pub user_agent: String,
    /// Contact address sent to APIs that offer a polite pool.
    pub mailto: Option<String>,
    /// Random delay range in milliseconds `(min, max)` before each request.
    pub request_delay_ms: (u64, u64),
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("scholar-search/", env!("CARGO_PKG_VERSION")).into(),
            mailto: None,
            request_delay_ms: (0, 100),
        }
    }
}

impl AggregatorConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `default_limit` and `max_limit` must be greater than 0
    /// - `default_limit` must be <= `max_limit`
    /// - `cache.max_entries` must be greater than 0
    /// - every source timeout and rate limit must be greater than 0
    /// - `http.request_delay_ms.0` must be <= `http.request_delay_ms.1`
    /// - `ranking.recency_cutoff_years` must be positive
    pub fn validate(&self) -> Result<()> {
        if self.default_limit == 0 || self.max_limit == 0 {
            return Err(SearchError::Config("limits must be greater than 0".into()));
        }
        if self.default_limit > self.max_limit {
            return Err(SearchError::Config(
                "default_limit must be <= max_limit".into(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(SearchError::Config(
                "cache.max_entries must be greater than 0".into(),
            ));
        }
        for source in SourceId::all() {
            if self.timeouts.seconds(*source) == 0 {
                return Err(SearchError::Config(format!(
                    "timeout for {source} must be greater than 0"
                )));
            }
            if self.rate_limits.per_minute(*source) == 0 {
                return Err(SearchError::Config(format!(
                    "rate limit for {source} must be greater than 0"
                )));
            }
        }
        if self.classifier.enabled && self.classifier.timeout_seconds == 0 {
            return Err(SearchError::Config(
                "classifier.timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.http.request_delay_ms.0 > self.http.request_delay_ms.1 {
            return Err(SearchError::Config(
                "request_delay_ms min must be <= max".into(),
            ));
        }
        if self.ranking.recency_cutoff_years <= 0.0 {
            return Err(SearchError::Config(
                "ranking.recency_cutoff_years must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| SearchError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SearchError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
