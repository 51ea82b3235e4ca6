//! Papers with Code adapter (`/papers/` search).
//!
//! The API offers neither sorting nor date filtering, so results come back
//! in its own relevance order and the date window is applied locally.

use async_trait::async_trait;
use serde::Deserialize;

use super::{non_blank, parse_date, retain_in_window};
use crate::config::AggregatorConfig;
use crate::error::{Result, SearchError};
use crate::http;
use crate::orchestrator::normalize::normalize_arxiv_id;
use crate::rate_limit::RateLimiter;
use crate::source::{FetchedPage, SourceAdapter};
use crate::types::{Author, Paper, SearchQuery, SourceId};

/// Public API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://paperswithcode.com/api/v1";

const MAX_PAGE_SIZE: usize = 50;

/// Papers with Code API client.
#[derive(Debug)]
pub struct PapersWithCodeAdapter {
    client: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
    delay_ms: (u64, u64),
}

impl PapersWithCodeAdapter {
    /// Create an adapter sharing `client`, rate limited per `config`.
    pub fn new(client: reqwest::Client, config: &AggregatorConfig) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_owned(),
            limiter: RateLimiter::per_minute(
                config.rate_limits.per_minute(SourceId::PapersWithCode),
            ),
            delay_ms: config.http.request_delay_ms,
        }
    }

    /// Point the adapter at another endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }
}

#[async_trait]
impl SourceAdapter for PapersWithCodeAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::PapersWithCode
    }

    async fn fetch(&self, query: &SearchQuery) -> Result<FetchedPage> {
        tracing::trace!(query = %query.query, "Papers with Code search");

        self.limiter.acquire().await?;
        http::pace(self.delay_ms).await;

        let page_size = query.limit.clamp(1, MAX_PAGE_SIZE).to_string();
        let response = self
            .client
            .get(format!("{}/papers/", self.base_url))
            .query(&[
                ("q", query.query.trim()),
                ("items_per_page", page_size.as_str()),
                ("page", "1"),
            ])
            .send()
            .await
            .map_err(|e| SearchError::Http(format!("Papers with Code request failed: {e}")))?;
        let body: PapersResponse = http::check_status(response)?
            .json()
            .await
            .map_err(|e| SearchError::Parse(format!("Papers with Code response: {e}")))?;

        let mut papers: Vec<Paper> =
            body.results.into_iter().filter_map(Record::into_paper).collect();
        retain_in_window(&mut papers, query);
        papers.truncate(query.limit);
        Ok(FetchedPage {
            papers,
            total: body.count,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PapersResponse {
    count: Option<usize>,
    #[serde(default)]
    results: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct Record {
    id: String,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    arxiv_id: Option<String>,
    url_abs: Option<String>,
    url_pdf: Option<String>,
    published: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    conference: Option<String>,
    proceeding: Option<String>,
}

impl Record {
    fn into_paper(self) -> Option<Paper> {
        let title = non_blank(self.title.as_deref())?;
        let url = format!("https://paperswithcode.com/paper/{}", self.id);

        let mut paper = Paper::new(self.id, title, SourceId::PapersWithCode, url);
        paper.arxiv_id = self
            .arxiv_id
            .as_deref()
            .and_then(normalize_arxiv_id)
            .or_else(|| self.url_abs.as_deref().and_then(normalize_arxiv_id));
        paper.abstract_text = non_blank(self.abstract_text.as_deref());
        paper.pdf_url = self.url_pdf.filter(|u| !u.is_empty());
        paper.publication_date = self.published.as_deref().and_then(parse_date);
        paper.venue =
            non_blank(self.proceeding.as_deref()).or_else(|| non_blank(self.conference.as_deref()));
        paper.authors = self
            .authors
            .iter()
            .filter_map(|name| non_blank(Some(name.as_str())).map(Author::named))
            .collect();
        Some(paper)
    }
}
