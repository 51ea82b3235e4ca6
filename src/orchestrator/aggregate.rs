//! End-to-end research aggregation pipeline.
//!
//! ```text
//! request ─► cache? ─► classify ─► select ─► circuit filter ─► fan-out
//!        ─► fuse ─► rank ─► paginate ─► response (cached on success)
//! ```

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::cache::{CacheKey, ResponseCache};
use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::config::AggregatorConfig;
use crate::error::{Result, SearchError};
use crate::http::build_client;
use crate::intent::IntentClassifier;
use crate::registry::SourceRegistry;
use crate::selector::{select, SelectionOptions};
use crate::source::elapsed_millis;
use crate::types::{
    AggregateResponse, FilterOperator, Paper, QueryIntent, SearchFilter, SearchQuery, SourceId,
    SourceStatistics, AUTHOR_FILTER, VENUE_FILTER,
};

use super::fanout::FanOutExecutor;
use super::fusion::fuse;
use super::ranking::Ranker;

/// Deepest page, in multiples of `max_limit`, a request may reach.
const MAX_PAGE_DEPTH: usize = 10;

/// One caller request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query.
    pub query: String,
    /// Maximum results; the configured default when `None`.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Ranked results to skip.
    #[serde(default)]
    pub offset: usize,
    /// Override for `include_code_sources`.
    #[serde(default)]
    pub include_code_sources: Option<bool>,
    /// Override for `enable_cross_reference`.
    #[serde(default)]
    pub enable_cross_reference: Option<bool>,
}

impl SearchRequest {
    /// A request with every option left at its configured default.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: None,
            offset: 0,
            include_code_sources: None,
            enable_cross_reference: None,
        }
    }

    /// Builder: set the limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Builder: set the offset.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Builder: toggle code-linked sources.
    pub fn with_code_sources(mut self, include: bool) -> Self {
        self.include_code_sources = Some(include);
        self
    }

    /// Builder: toggle cross-referencing.
    pub fn with_cross_reference(mut self, enable: bool) -> Self {
        self.enable_cross_reference = Some(enable);
        self
    }
}

/// Request parameters after defaults and validation.
#[derive(Debug, Clone, Copy)]
struct Resolved {
    limit: usize,
    offset: usize,
    include_code_sources: bool,
    enable_cross_reference: bool,
}

/// The research aggregation engine.
pub struct ResearchAggregator {
    config: AggregatorConfig,
    classifier: IntentClassifier,
    executor: FanOutExecutor,
    ranker: Ranker,
    cache: ResponseCache,
    breaker: Mutex<CircuitBreaker>,
}

impl std::fmt::Debug for ResearchAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchAggregator")
            .field("classifier", &self.classifier)
            .field("sources", &self.executor.registry().sources())
            .field("cache", &self.cache)
            .finish()
    }
}

impl ResearchAggregator {
    /// An aggregator over the built-in HTTP adapters.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if `config` is invalid, or
    /// [`SearchError::Http`] if the HTTP client cannot be built.
    pub fn new(config: AggregatorConfig) -> Result<Self> {
        config.validate()?;
        let registry = SourceRegistry::with_default_adapters(&config)?;
        let classifier =
            IntentClassifier::from_config(&config.classifier, build_client(&config.http)?);
        Self::with_registry(config, registry).map(|agg| agg.with_classifier(classifier))
    }

    /// An aggregator over caller-supplied adapters, using the heuristic
    /// classifier and the configured cache.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if `config` is invalid.
    pub fn with_registry(config: AggregatorConfig, registry: SourceRegistry) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            classifier: IntentClassifier::heuristic(),
            executor: FanOutExecutor::new(registry, config.timeouts.clone()),
            ranker: Ranker::new(config.ranking.clone()),
            cache: ResponseCache::from_config(&config.cache),
            breaker: Mutex::new(
                CircuitBreaker::new(&config.circuit_breaker)
                    .with_trial_lease(config.timeouts.max() * 2),
            ),
            config,
        })
    }

    /// Builder: replace the intent classifier.
    pub fn with_classifier(mut self, classifier: IntentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Builder: replace the response cache.
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = cache;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// The response cache.
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// `(source, state, consecutive_failures)` for every source seen so far.
    pub fn source_health(&self) -> Vec<(SourceId, CircuitState, u32)> {
        self.breaker().health_report()
    }

    fn breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.breaker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, request: &SearchRequest) -> Result<Resolved> {
        if request.query.trim().is_empty() {
            return Err(SearchError::Config("query must not be empty".into()));
        }
        let limit = request.limit.unwrap_or(self.config.default_limit);
        if limit == 0 {
            return Err(SearchError::Config("limit must be greater than 0".into()));
        }
        let limit = limit.min(self.config.max_limit);
        let depth = self.config.max_limit.saturating_mul(MAX_PAGE_DEPTH);
        if request.offset.checked_add(limit).is_none_or(|end| end > depth) {
            return Err(SearchError::Config(format!("offset + limit must not exceed {depth}")));
        }
        Ok(Resolved {
            limit,
            offset: request.offset,
            include_code_sources: request
                .include_code_sources
                .unwrap_or(self.config.include_code_sources),
            enable_cross_reference: request
                .enable_cross_reference
                .unwrap_or(self.config.enable_cross_reference),
        })
    }

    /// Run one search.
    ///
    /// Source failures, timeouts and classifier failures never surface as
    /// `Err`; they are reported inside the response. When every attempted
    /// source fails the response has `success == false` and an `error`
    /// reason.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] for an empty query, a zero limit or
    /// an offset past the deepest servable page.
    pub async fn search(&self, request: SearchRequest) -> Result<AggregateResponse> {
        let resolved = self.resolve(&request)?;
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("aggregate", %request_id);
        Ok(self.run(request, resolved).instrument(span).await)
    }

    async fn run(&self, request: SearchRequest, resolved: Resolved) -> AggregateResponse {
        let started = Instant::now();
        tracing::trace!(query = %request.query, "search requested");

        let key = CacheKey::new(
            &request.query,
            resolved.limit,
            resolved.offset,
            resolved.include_code_sources,
            resolved.enable_cross_reference,
        );
        if let Some(cached) = self.cache.get(&key).await {
            return cached;
        }

        let intent = self.classifier.classify(&request.query).await;

        let mut selection = select(
            &intent,
            SelectionOptions {
                limit: resolved.limit + resolved.offset,
                include_code_sources: resolved.include_code_sources,
            },
        );
        let skipped_sources = self.breaker().filter_selection(&mut selection);
        if !skipped_sources.is_empty() {
            tracing::info!(skipped = ?skipped_sources, "skipping sources with open circuits");
        }

        let query = self.source_query(&request.query, &intent, resolved.limit);
        let mut responses = self.executor.execute(&selection, &query).await;

        {
            let mut breaker = self.breaker();
            for response in responses.values() {
                if response.success {
                    breaker.record_success(response.source);
                } else {
                    breaker.record_failure(response.source);
                }
            }
        }

        let source_statistics: BTreeMap<SourceId, SourceStatistics> = responses
            .iter()
            .map(|(source, response)| (*source, SourceStatistics::from(response)))
            .collect();
        let any_success = responses.values().any(|r| r.success);

        // Selection order, not completion order.
        let papers: Vec<Paper> = selection
            .sources()
            .filter_map(|source| responses.remove(&source))
            .flat_map(|response| response.results)
            .collect();

        let (fused, fusion_stats) = fuse(papers, resolved.enable_cross_reference);
        let ranked = self.ranker.rank(fused, &intent);
        let total_found = ranked.len();
        let results: Vec<Paper> = ranked
            .into_iter()
            .skip(resolved.offset)
            .take(resolved.limit)
            .collect();

        let success = any_success || total_found > 0;
        let error = (!success).then(|| all_failed_reason(&source_statistics).to_string());

        let response = AggregateResponse {
            success,
            query: request.query,
            intent,
            results,
            total_found,
            source_statistics,
            skipped_sources,
            fusion_stats,
            execution_ms: elapsed_millis(started),
            error,
        };

        if response.success {
            tracing::info!(
                sources = response.source_statistics.len(),
                fused = fusion_stats.output,
                total_found,
                returned = response.results.len(),
                execution_ms = response.execution_ms,
                "search complete"
            );
            self.cache.put(key, response.clone()).await;
        } else {
            tracing::warn!(
                sources = response.source_statistics.len(),
                execution_ms = response.execution_ms,
                "all search sources failed"
            );
        }
        response
    }

    /// The query sent to every adapter before per-source shaping.
    fn source_query(&self, raw: &str, intent: &QueryIntent, limit: usize) -> SearchQuery {
        let mut query = SearchQuery::new(intent.search_text(raw), limit);
        if let Some(focus) = intent.temporal_focus {
            query = query.with_date_range(focus.date_range(chrono::Utc::now().date_naive()));
        }
        if let Some(ref author) = intent.author_hint {
            query = query.with_filter(SearchFilter::new(
                AUTHOR_FILTER,
                FilterOperator::Contains,
                author,
            ));
        }
        if let Some(ref venue) = intent.venue_hint {
            query = query.with_filter(SearchFilter::new(
                VENUE_FILTER,
                FilterOperator::Contains,
                venue,
            ));
        }
        query
    }
}

fn all_failed_reason(statistics: &BTreeMap<SourceId, SourceStatistics>) -> SearchError {
    let detail = if statistics.is_empty() {
        "no sources available".to_owned()
    } else {
        statistics
            .iter()
            .map(|(source, stats)| {
                format!("{source}: {}", stats.error.as_deref().unwrap_or("no response"))
            })
            .collect::<Vec<_>>()
            .join("; ")
    };
    SearchError::AllSourcesFailed(detail)
}
