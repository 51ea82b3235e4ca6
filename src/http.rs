//! Shared HTTP client and request pacing for source adapters.

use std::time::Duration;

use rand::Rng;

use crate::config::HttpConfig;
use crate::error::SearchError;

/// Build the [`reqwest::Client`] shared by all adapters.
///
/// The client has:
/// - the configured User-Agent (with a `mailto:` suffix when set, which
///   OpenAlex and Crossref-style APIs use to route to their polite pool)
/// - gzip decompression
/// - a connect timeout; overall request budgets are enforced per source by
///   the fan-out executor
///
/// # Errors
///
/// Returns [`SearchError::Http`] if the client cannot be constructed.
pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client, SearchError> {
    let ua = match config.mailto {
        Some(ref mailto) => format!("{} (mailto:{mailto})", config.user_agent),
        None => config.user_agent.clone(),
    };

    reqwest::Client::builder()
        .user_agent(ua)
        .connect_timeout(Duration::from_secs(5))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| SearchError::Http(format!("failed to build HTTP client: {e}")))
}

/// Pick a random delay within `range` (milliseconds, inclusive).
pub fn jitter(range: (u64, u64)) -> Duration {
    let (min, max) = range;
    if max <= min {
        return Duration::from_millis(min);
    }
    Duration::from_millis(rand::thread_rng().gen_range(min..=max))
}

/// Sleep for a random delay within `range` before issuing a request.
pub async fn pace(range: (u64, u64)) {
    let delay = jitter(range);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Turn a non-success HTTP status into a [`SearchError::Http`].
pub(crate) fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SearchError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SearchError::Http(format!("upstream returned HTTP {status}")))
    }
}
