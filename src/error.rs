//! Error types for the scholar-search crate.
//!
//! All errors use stable string messages suitable for display to users
//! and programmatic handling. No API keys or sensitive data appear in
//! error messages.
//!
//! Per-source and classification failures are normally converted into
//! structured metadata where they occur (see
//! [`SourceResponse`](crate::types::SourceResponse)); only caller mistakes
//! surface as `Err` from the public API.

use crate::types::SourceId;

/// Errors that can occur while aggregating research results.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// A source adapter exceeded its allotted time.
    #[error("source {source_id} timed out after {timeout_secs}s")]
    SourceTimeout {
        /// The source that timed out.
        source_id: SourceId,
        /// The budget it was given.
        timeout_secs: u64,
    },

    /// A source adapter failed or returned malformed data.
    #[error("source {source_id} failed: {message}")]
    SourceAdapter {
        /// The failing source.
        source_id: SourceId,
        /// Underlying error message.
        message: String,
    },

    /// The language-understanding call failed or returned unparsable output.
    #[error("intent classification failed: {0}")]
    IntentClassification(String),

    /// Every attempted source failed.
    #[error("all search sources failed: {0}")]
    AllSourcesFailed(String),

    /// An outbound request was refused by the local rate limiter.
    #[error("rate limit exceeded; retry after {retry_after_ms}ms")]
    RateLimited {
        /// Milliseconds until a slot frees up.
        retry_after_ms: u64,
    },

    /// An HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Failed to parse an upstream response.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid configuration or request.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

/// Convenience type alias for scholar-search results.
pub type Result<T> = std::result::Result<T, SearchError>;
