//! # scholar-search
//!
//! Research aggregation engine for academic literature.
//!
//! One free-text query fans out to several scholarly sources (arXiv,
//! OpenAlex, Semantic Scholar, Papers with Code); their records are merged
//! into one deduplicated, enriched and ranked result list.
//!
//! ## Design
//!
//! - Classifies the query's intent with an optional LLM, falling back to a
//!   keyword heuristic on any failure or timeout
//! - Picks primary and secondary sources per intent, with per-source limits,
//!   sort hints and subject filters
//! - Queries the selected sources concurrently, each under its own timeout
//! - Fuses records for the same work across sources by DOI, arXiv id and
//!   title, filling missing fields from the other copies
//! - Ranks by term overlap, citations, recency and source preference, and
//!   drops results that share no term with the query
//! - Caches successful responses in memory with a configurable TTL
//! - Degrades gracefully: a failing source never fails the request
//!
//! ## Privacy
//!
//! - Query text is logged only at trace level
//! - API keys are read from the environment, never from config files

pub mod adapters;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod http;
pub mod intent;
pub mod orchestrator;
pub mod rate_limit;
pub mod registry;
pub mod selector;
pub mod source;
pub mod types;

pub use config::AggregatorConfig;
pub use error::{Result, SearchError};
pub use intent::IntentClassifier;
pub use orchestrator::{ResearchAggregator, SearchRequest};
pub use registry::SourceRegistry;
pub use source::SourceAdapter;
pub use types::{AggregateResponse, Paper, QueryIntent, SourceId};

/// Search every suitable source for `query` and return fused, ranked papers.
///
/// Builds a one-shot [`ResearchAggregator`] over the built-in adapters.
/// Hold on to an aggregator instead when issuing several searches, so the
/// cache and circuit breaker carry over between them.
///
/// # Errors
///
/// Returns [`SearchError::Config`] if `config` is invalid or `query` is
/// blank. Source failures are reported inside the response, not as errors.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> scholar_search::Result<()> {
/// let config = scholar_search::AggregatorConfig::default();
/// let response = scholar_search::search("crowd counting", &config).await?;
/// for paper in &response.results {
///     println!("{}: {}", paper.title, paper.url);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn search(query: &str, config: &AggregatorConfig) -> Result<AggregateResponse> {
    let aggregator = ResearchAggregator::new(config.clone())?;
    aggregator.search(SearchRequest::new(query)).await
}

/// Search with the default configuration.
///
/// # Errors
///
/// Same as [`search`].
pub async fn search_default(query: &str) -> Result<AggregateResponse> {
    search(query, &AggregatorConfig::default()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_validates_config() {
        let config = AggregatorConfig {
            default_limit: 0,
            ..Default::default()
        };
        let err = search("graphs", &config).await.unwrap_err();
        assert!(matches!(err, SearchError::Config(_)));
    }

    #[tokio::test]
    async fn search_rejects_blank_query() {
        let err = search_default("  ").await.unwrap_err();
        assert!(err.to_string().contains("query"));
    }
}
