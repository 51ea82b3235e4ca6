//! Trait definition for pluggable research source adapters.
//!
//! Each external data source (arXiv, OpenAlex, Semantic Scholar, Papers with
//! Code) implements [`SourceAdapter`] to provide a uniform search contract.

use std::time::Instant;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Paper, SearchQuery, SourceId, SourceResponse};

/// Raw papers plus the upstream hit count, as returned by [`SourceAdapter::fetch`].
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    /// Normalised papers.
    pub papers: Vec<Paper>,
    /// Total hits reported upstream, when known.
    pub total: Option<usize>,
}

impl FetchedPage {
    /// A page whose total equals its length.
    pub fn from_papers(papers: Vec<Paper>) -> Self {
        Self { papers, total: None }
    }
}

/// A pluggable research source.
///
/// Implementors provide [`fetch`](Self::fetch), which may fail freely with
/// `?`. Callers use [`search`](Self::search), which never fails: it times
/// the call and converts any error into a failed [`SourceResponse`] with
/// `metadata.error` populated.
///
/// Implementations are responsible for:
///
/// - honouring their own rate limiter before any network call
/// - translating the [`SearchQuery`] (sort, subjects, date range) into the
///   upstream API's parameters
/// - normalising every result into the shared [`Paper`] shape
///
/// All implementations must be `Send + Sync` for concurrent fan-out.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Which source this adapter serves.
    fn source_id(&self) -> SourceId;

    /// Query the upstream API.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, is refused, or the response
    /// cannot be parsed.
    async fn fetch(&self, query: &SearchQuery) -> Result<FetchedPage>;

    /// Query the upstream API, converting failures into data.
    async fn search(&self, query: &SearchQuery) -> SourceResponse {
        let source = self.source_id();
        let started = Instant::now();
        let outcome = self.fetch(query).await;
        let elapsed_ms = elapsed_millis(started);

        match outcome {
            Ok(page) => {
                let total = page.total.unwrap_or(page.papers.len());
                tracing::debug!(
                    %source,
                    count = page.papers.len(),
                    total,
                    "source returned results"
                );
                SourceResponse::ok(source, page.papers, total, elapsed_ms)
            }
            Err(err) => {
                tracing::warn!(%source, error = %err, "source query failed");
                SourceResponse::failure(source, err.to_string(), elapsed_ms)
            }
        }
    }
}

/// Milliseconds elapsed since `started`, saturating.
pub(crate) fn elapsed_millis(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
