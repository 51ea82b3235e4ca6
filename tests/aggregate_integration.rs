//! End-to-end aggregation tests with in-process mock sources.
//!
//! Each test wires scripted adapters into a [`ResearchAggregator`] and checks
//! the full pipeline: classification, selection, fan-out, fusion, ranking,
//! caching and circuit breaking.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scholar_search::cache::{MemoryCacheStore, ResponseCache};
use scholar_search::circuit_breaker::CircuitState;
use scholar_search::config::{CircuitBreakerSettings, SourceTimeouts};
use scholar_search::source::FetchedPage;
use scholar_search::types::{FusionMode, FusionStats, SearchQuery};
use scholar_search::{
    AggregatorConfig, Paper, ResearchAggregator, Result, SearchError, SearchRequest,
    SourceAdapter, SourceId, SourceRegistry,
};

enum Script {
    Papers(Vec<Paper>),
    Fail,
    FailAfter(Duration),
    Stall,
}

struct MockSource {
    source: SourceId,
    script: Script,
    calls: AtomicUsize,
}

impl MockSource {
    fn new(source: SourceId, script: Script) -> Arc<Self> {
        Arc::new(Self {
            source,
            script,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    fn source_id(&self) -> SourceId {
        self.source
    }

    async fn fetch(&self, _query: &SearchQuery) -> Result<FetchedPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Papers(papers) => Ok(FetchedPage::from_papers(papers.clone())),
            Script::Fail => Err(SearchError::Http("upstream returned HTTP 500".into())),
            Script::FailAfter(delay) => {
                tokio::time::sleep(*delay).await;
                Err(SearchError::Http("upstream returned HTTP 503".into()))
            }
            Script::Stall => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(FetchedPage::default())
            }
        }
    }
}

fn paper(source: SourceId, id: &str, title: &str) -> Paper {
    Paper::new(id, title, source, format!("https://example.org/{id}"))
}

fn config() -> AggregatorConfig {
    AggregatorConfig {
        include_code_sources: false,
        ..Default::default()
    }
}

fn aggregator(config: AggregatorConfig, sources: &[Arc<MockSource>]) -> ResearchAggregator {
    let registry = sources.iter().fold(SourceRegistry::new(), |registry, source| {
        registry.with(Arc::clone(source) as Arc<dyn SourceAdapter>)
    });
    ResearchAggregator::with_registry(config, registry).expect("aggregator")
}

/// Two sources return the same work under different ids; fusion merges them.
fn duplicate_pair() -> (Arc<MockSource>, Arc<MockSource>) {
    let mut a = paper(SourceId::SemanticScholar, "s2-1", "Crowd Counting via Density Maps");
    a.doi = Some("10.1/abc".into());
    let mut b = paper(SourceId::OpenAlex, "W1", "Crowd Counting via Density Maps");
    b.doi = Some("10.1/ABC".into());
    b.citation_count = Some(42);
    (
        MockSource::new(SourceId::SemanticScholar, Script::Papers(vec![a])),
        MockSource::new(SourceId::OpenAlex, Script::Papers(vec![b])),
    )
}

#[tokio::test]
async fn duplicate_work_is_fused_across_sources() {
    let (s2, openalex) = duplicate_pair();
    let agg = aggregator(config(), &[s2, openalex]);

    let response = agg
        .search(SearchRequest::new("crowd counting papers recent"))
        .await
        .expect("search");

    assert!(response.success);
    assert!(!response.intent.core_terms.iter().any(|t| t == "papers" || t == "recent"));
    assert!(response.intent.core_terms.join(" ").contains("crowd counting"));
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.total_found, 1);
    assert_eq!(
        response.fusion_stats,
        FusionStats {
            input: 2,
            output: 1,
            mode: FusionMode::CrossReference,
        }
    );

    let fused = &response.results[0];
    assert_eq!(fused.citation_count, Some(42));
    assert!(fused.found_in.contains(&SourceId::SemanticScholar));
    assert!(fused.found_in.contains(&SourceId::OpenAlex));
    assert!(fused.score > 0.0);
}

#[tokio::test]
async fn basic_fusion_dedups_without_enrichment() {
    let (s2, openalex) = duplicate_pair();
    let agg = aggregator(config(), &[s2, openalex]);

    let response = agg
        .search(SearchRequest::new("crowd counting").with_cross_reference(false))
        .await
        .expect("search");

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.fusion_stats.mode, FusionMode::Basic);
    // Semantic Scholar is selected first, so its copy wins unenriched.
    assert_eq!(response.results[0].source, SourceId::SemanticScholar);
    assert_eq!(response.results[0].citation_count, None);
}

#[tokio::test]
async fn every_source_failing_is_reported_not_raised() {
    let s2 = MockSource::new(SourceId::SemanticScholar, Script::Fail);
    let openalex = MockSource::new(SourceId::OpenAlex, Script::Fail);
    let arxiv = MockSource::new(SourceId::Arxiv, Script::Fail);
    let agg = aggregator(config(), &[s2.clone(), openalex, arxiv]);

    let response = agg
        .search(SearchRequest::new("crowd counting"))
        .await
        .expect("failures are data");

    assert!(!response.success);
    assert!(response.results.is_empty());
    assert_eq!(response.source_statistics.len(), 3);
    assert!(response.source_statistics.values().all(|s| !s.success));
    let error = response.error.as_deref().unwrap_or_default();
    assert!(error.starts_with("all search sources failed"), "{error}");
    assert!(error.contains("semantic_scholar"), "{error}");

    // Failed responses are not cached.
    agg.search(SearchRequest::new("crowd counting"))
        .await
        .expect("search");
    assert_eq!(s2.calls(), 2);
}

#[tokio::test]
async fn one_failing_source_does_not_fail_the_request() {
    let s2 = MockSource::new(SourceId::SemanticScholar, Script::Fail);
    let openalex = MockSource::new(
        SourceId::OpenAlex,
        Script::Papers(vec![paper(SourceId::OpenAlex, "W1", "Crowd Counting at Scale")]),
    );
    let agg = aggregator(config(), &[s2, openalex]);

    let response = agg
        .search(SearchRequest::new("crowd counting"))
        .await
        .expect("search");

    assert!(response.success);
    assert!(response.error.is_none());
    assert_eq!(response.results.len(), 1);
    let failed = &response.source_statistics[&SourceId::SemanticScholar];
    assert!(!failed.success);
    assert!(failed.error.as_deref().is_some_and(|e| e.contains("500")));
}

#[tokio::test(start_paused = true)]
async fn slow_sources_are_bounded_by_the_largest_timeout() {
    let s2 = MockSource::new(SourceId::SemanticScholar, Script::Stall);
    let arxiv = MockSource::new(SourceId::Arxiv, Script::Stall);
    let openalex = MockSource::new(
        SourceId::OpenAlex,
        Script::Papers(vec![paper(SourceId::OpenAlex, "W1", "Crowd Counting at Scale")]),
    );
    let config = AggregatorConfig {
        timeouts: SourceTimeouts {
            arxiv: 4,
            openalex: 4,
            semantic_scholar: 3,
            papers_with_code: 4,
        },
        ..config()
    };
    let agg = aggregator(config, &[s2, arxiv, openalex]);

    let started = tokio::time::Instant::now();
    let response = agg
        .search(SearchRequest::new("crowd counting"))
        .await
        .expect("search");
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(4));
    assert!(elapsed < Duration::from_secs(7), "took {elapsed:?}");
    assert!(response.success);
    assert_eq!(response.results.len(), 1);
    let timed_out = &response.source_statistics[&SourceId::SemanticScholar];
    assert_eq!(timed_out.error.as_deref(), Some("timeout"));
}

#[tokio::test]
async fn repeated_query_is_served_from_cache() {
    let (s2, openalex) = duplicate_pair();
    let agg = aggregator(config(), &[s2.clone(), openalex.clone()]);

    let first = agg
        .search(SearchRequest::new("Crowd Counting"))
        .await
        .expect("search");
    // Case and whitespace differences share a cache entry.
    let second = agg
        .search(SearchRequest::new("  crowd   counting "))
        .await
        .expect("search");

    assert_eq!(s2.calls(), 1);
    assert_eq!(openalex.calls(), 1);
    assert_eq!(
        serde_json::to_string(&first).expect("json"),
        serde_json::to_string(&second).expect("json")
    );

    // Different options are a different request.
    agg.search(SearchRequest::new("crowd counting").with_limit(5))
        .await
        .expect("search");
    assert_eq!(s2.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn expired_cache_entries_are_refetched() {
    let (s2, openalex) = duplicate_pair();
    let cache = ResponseCache::new(Arc::new(MemoryCacheStore::new(16)), Duration::from_secs(60));
    let agg = aggregator(config(), &[s2.clone(), openalex]).with_cache(cache);

    agg.search(SearchRequest::new("crowd counting"))
        .await
        .expect("search");
    tokio::time::advance(Duration::from_secs(30)).await;
    agg.search(SearchRequest::new("crowd counting"))
        .await
        .expect("search");
    assert_eq!(s2.calls(), 1, "still fresh");

    tokio::time::advance(Duration::from_secs(31)).await;
    agg.search(SearchRequest::new("crowd counting"))
        .await
        .expect("search");
    assert_eq!(s2.calls(), 2, "expired");
}

#[tokio::test]
async fn zero_ttl_disables_the_cache() {
    let (s2, openalex) = duplicate_pair();
    let mut config = config();
    config.cache.ttl_seconds = 0;
    let agg = aggregator(config, &[s2.clone(), openalex]);

    for _ in 0..2 {
        agg.search(SearchRequest::new("crowd counting"))
            .await
            .expect("search");
    }
    assert_eq!(s2.calls(), 2);
}

#[tokio::test]
async fn results_without_query_terms_are_dropped() {
    let s2 = MockSource::new(
        SourceId::SemanticScholar,
        Script::Papers(vec![
            paper(SourceId::SemanticScholar, "s2-1", "Quantum Chromodynamics on the Lattice"),
            paper(SourceId::SemanticScholar, "s2-2", "Crowd Counting with Transformers"),
            paper(SourceId::SemanticScholar, "s2-3", "Crowdsourcing Labels"),
        ]),
    );
    let agg = aggregator(config(), &[s2]);

    let response = agg
        .search(SearchRequest::new("crowd counting"))
        .await
        .expect("search");

    let titles: Vec<_> = response.results.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, ["Crowd Counting with Transformers"]);
    assert_eq!(response.fusion_stats.output, 3);
    assert_eq!(response.total_found, 1);
}

#[tokio::test]
async fn failing_source_is_skipped_once_its_circuit_opens() {
    let s2 = MockSource::new(SourceId::SemanticScholar, Script::Fail);
    let openalex = MockSource::new(
        SourceId::OpenAlex,
        Script::Papers(vec![paper(SourceId::OpenAlex, "W1", "Graph Neural Networks")]),
    );
    let config = AggregatorConfig {
        circuit_breaker: CircuitBreakerSettings {
            failure_threshold: 2,
            cooldown_secs: 300,
        },
        ..config()
    };
    let agg = aggregator(config, &[s2.clone(), openalex]);

    for query in ["graph neural networks", "graph networks", "neural graph"] {
        agg.search(SearchRequest::new(query)).await.expect("search");
    }

    assert_eq!(s2.calls(), 2);
    let last = agg
        .search(SearchRequest::new("graph neural"))
        .await
        .expect("search");
    assert!(last.skipped_sources.contains(&SourceId::SemanticScholar));
    assert!(!last.source_statistics.contains_key(&SourceId::SemanticScholar));
    assert!(last.success);

    let health = agg.source_health();
    assert!(health.iter().any(|(source, state, _)| {
        *source == SourceId::SemanticScholar && *state == CircuitState::Open
    }));
}

#[tokio::test]
async fn recovering_source_gets_one_trial_request_under_concurrent_load() {
    let s2 = MockSource::new(
        SourceId::SemanticScholar,
        Script::FailAfter(Duration::from_millis(20)),
    );
    let openalex = MockSource::new(
        SourceId::OpenAlex,
        Script::Papers(vec![paper(SourceId::OpenAlex, "W1", "Graph Neural Networks")]),
    );
    let config = AggregatorConfig {
        circuit_breaker: CircuitBreakerSettings {
            failure_threshold: 1,
            cooldown_secs: 0,
        },
        ..config()
    };
    let agg = aggregator(config, &[s2.clone(), openalex]);

    agg.search(SearchRequest::new("graph neural networks"))
        .await
        .expect("search");
    assert_eq!(s2.calls(), 1);

    let (a, b, c) = tokio::join!(
        agg.search(SearchRequest::new("graph networks")),
        agg.search(SearchRequest::new("neural graph")),
        agg.search(SearchRequest::new("graph neural")),
    );
    let responses = [a.expect("search"), b.expect("search"), c.expect("search")];

    assert_eq!(s2.calls(), 2);
    let skipped = responses
        .iter()
        .filter(|r| r.skipped_sources.contains(&SourceId::SemanticScholar))
        .count();
    assert_eq!(skipped, 2);
    assert!(responses.iter().all(|r| r.success));
}

#[tokio::test]
async fn pagination_slices_the_ranked_list() {
    let papers: Vec<Paper> = (0..6)
        .map(|i| {
            let mut p = paper(
                SourceId::SemanticScholar,
                &format!("s2-{i}"),
                &format!("Graph Coloring Part {i}"),
            );
            p.citation_count = Some(1000 - i * 100);
            p
        })
        .collect();
    let s2 = MockSource::new(SourceId::SemanticScholar, Script::Papers(papers));
    let agg = aggregator(config(), &[s2]);

    let page = agg
        .search(SearchRequest::new("graph coloring").with_limit(2).with_offset(2))
        .await
        .expect("search");

    assert_eq!(page.total_found, 6);
    let ids: Vec<_> = page.results.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["s2-2", "s2-3"]);
}
