//! Fan-Out Executor: query every selected source concurrently.
//!
//! Each source runs as its own future under its own timeout. A source that
//! times out, errors, panics or has no registered adapter yields a
//! synthesized failed [`SourceResponse`]; siblings are never cancelled and
//! nothing propagates out of [`FanOutExecutor::execute`]. Wall-clock time
//! is bounded by the largest per-source budget, not their sum.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt;

use crate::config::SourceTimeouts;
use crate::error::SearchError;
use crate::registry::SourceRegistry;
use crate::source::elapsed_millis;
use crate::types::{
    FilterOperator, SearchFilter, SearchQuery, SourceConfig, SourceId, SourceResponse,
    SourceSelection, SUBJECT_FILTER,
};

/// Runs a [`SourceSelection`] against the registered adapters.
#[derive(Debug, Clone)]
pub struct FanOutExecutor {
    registry: SourceRegistry,
    timeouts: SourceTimeouts,
}

impl FanOutExecutor {
    /// Create an executor over `registry` with per-source `timeouts`.
    pub fn new(registry: SourceRegistry, timeouts: SourceTimeouts) -> Self {
        Self { registry, timeouts }
    }

    /// The adapters this executor dispatches to.
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Query every source in `selection` concurrently.
    ///
    /// Returns exactly one response per selected source.
    pub async fn execute(
        &self,
        selection: &SourceSelection,
        query: &SearchQuery,
    ) -> BTreeMap<SourceId, SourceResponse> {
        let tasks: Vec<_> = selection
            .sources()
            .map(|source| {
                let source_query = shape_query(query, selection.config_for(source));
                self.run_one(source, source_query)
            })
            .collect();

        let started = Instant::now();
        let responses = futures::future::join_all(tasks).await;

        let succeeded = responses.iter().filter(|r| r.success).count();
        tracing::debug!(
            sources = responses.len(),
            succeeded,
            elapsed_ms = elapsed_millis(started),
            "fan-out complete"
        );

        responses.into_iter().map(|r| (r.source, r)).collect()
    }

    async fn run_one(&self, source: SourceId, query: SearchQuery) -> SourceResponse {
        let started = Instant::now();
        let Some(adapter) = self.registry.get(source) else {
            let err = SearchError::SourceAdapter {
                source_id: source,
                message: "no adapter registered".into(),
            };
            tracing::warn!(%source, error = %err, "source unavailable");
            return SourceResponse::failure(source, err.to_string(), 0);
        };

        let budget_secs = self.timeouts.seconds(source);
        let guarded = AssertUnwindSafe(adapter.search(&query)).catch_unwind();

        match tokio::time::timeout(self.timeouts.for_source(source), guarded).await {
            Ok(Ok(response)) => response,
            Ok(Err(panic)) => {
                let err = SearchError::SourceAdapter {
                    source_id: source,
                    message: format!("adapter panicked: {}", panic_message(panic.as_ref())),
                };
                tracing::warn!(%source, error = %err, "source adapter panicked");
                SourceResponse::failure(source, err.to_string(), elapsed_millis(started))
            }
            Err(_) => {
                let err = SearchError::SourceTimeout {
                    source_id: source,
                    timeout_secs: budget_secs,
                };
                tracing::warn!(%source, error = %err, "source timed out");
                SourceResponse::timeout(source, budget_secs, elapsed_millis(started))
            }
        }
    }
}

/// Apply a source's selection config (limit, sort, subjects) to the base query.
fn shape_query(base: &SearchQuery, config: Option<&SourceConfig>) -> SearchQuery {
    let mut query = base.clone();
    // Pagination happens after ranking, never upstream.
    query.offset = 0;
    if let Some(config) = config {
        query.limit = config.limit;
        query.sort_by = config.sort;
        if !config.subjects.is_empty() {
            query.filters.push(SearchFilter::new(
                SUBJECT_FILTER,
                FilterOperator::In,
                config.subjects.join(","),
            ));
        }
    }
    query
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
