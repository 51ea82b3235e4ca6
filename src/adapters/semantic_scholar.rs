//! Semantic Scholar adapter (Graph API relevance search).
//!
//! The relevance endpoint has no sort parameter, so sort hints are ignored
//! here and left to the ranker. Subjects map to `fieldsOfStudy`, the date
//! window to `year`, and the venue hint to `venue`.

use async_trait::async_trait;
use chrono::Datelike;
use serde::Deserialize;

use super::{filter_value, non_blank, parse_date, retain_in_window};
use crate::config::AggregatorConfig;
use crate::error::{Result, SearchError};
use crate::http;
use crate::orchestrator::normalize::{normalize_arxiv_id, normalize_doi};
use crate::rate_limit::RateLimiter;
use crate::source::{FetchedPage, SourceAdapter};
use crate::types::{Author, Paper, SearchQuery, SourceId, VENUE_FILTER};

/// Public Graph API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";

/// The search endpoint caps `limit` at 100.
const MAX_LIMIT: usize = 100;

const FIELDS: &str = "paperId,externalIds,url,title,abstract,venue,year,publicationDate,\
                      citationCount,referenceCount,authors,openAccessPdf,fieldsOfStudy";

/// Semantic Scholar Graph API client.
#[derive(Debug)]
pub struct SemanticScholarAdapter {
    client: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
    delay_ms: (u64, u64),
}

impl SemanticScholarAdapter {
    /// Create an adapter sharing `client`, rate limited per `config`.
    pub fn new(client: reqwest::Client, config: &AggregatorConfig) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_owned(),
            limiter: RateLimiter::per_minute(
                config.rate_limits.per_minute(SourceId::SemanticScholar),
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
impl SourceAdapter for SemanticScholarAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::SemanticScholar
    }

    async fn fetch(&self, query: &SearchQuery) -> Result<FetchedPage> {
        let params = build_params(query);
        tracing::trace!(query = %query.query, "Semantic Scholar search");

        self.limiter.acquire().await?;
        http::pace(self.delay_ms).await;

        let response = self
            .client
            .get(format!("{}/paper/search", self.base_url))
            .query(&params)
            .send()
            .await
            .map_err(|e| SearchError::Http(format!("Semantic Scholar request failed: {e}")))?;
        let body: SearchResponse = http::check_status(response)?
            .json()
            .await
            .map_err(|e| SearchError::Parse(format!("Semantic Scholar response: {e}")))?;

        let mut papers: Vec<Paper> = body.data.into_iter().filter_map(Record::into_paper).collect();
        retain_in_window(&mut papers, query);
        papers.truncate(query.limit);
        Ok(FetchedPage {
            papers,
            total: body.total,
        })
    }
}

/// Query-string parameters for `/paper/search`.
pub(crate) fn build_params(query: &SearchQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("query", query.query.trim().to_owned()),
        ("limit", query.limit.clamp(1, MAX_LIMIT).to_string()),
        ("offset", query.offset.to_string()),
        ("fields", FIELDS.to_owned()),
    ];

    let subjects = query.subjects();
    if !subjects.is_empty() {
        params.push(("fieldsOfStudy", subjects.join(",")));
    }

    if let Some(range) = query.date_range {
        let start = range.start.map(|d| d.year().to_string()).unwrap_or_default();
        let end = range.end.map(|d| d.year().to_string()).unwrap_or_default();
        if !(start.is_empty() && end.is_empty()) {
            params.push(("year", format!("{start}-{end}")));
        }
    }

    if let Some(venue) = filter_value(query, VENUE_FILTER) {
        params.push(("venue", venue.to_owned()));
    }
    params
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    total: Option<usize>,
    #[serde(default)]
    data: Vec<Record>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    paper_id: String,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    url: Option<String>,
    venue: Option<String>,
    year: Option<i32>,
    publication_date: Option<String>,
    citation_count: Option<u64>,
    reference_count: Option<u64>,
    #[serde(default)]
    authors: Vec<AuthorRecord>,
    external_ids: Option<ExternalIds>,
    open_access_pdf: Option<OpenAccessPdf>,
    #[serde(default)]
    fields_of_study: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct AuthorRecord {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "ArXiv")]
    arxiv: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAccessPdf {
    url: Option<String>,
}

impl Record {
    fn into_paper(self) -> Option<Paper> {
        let title = non_blank(self.title.as_deref())?;
        let url = self
            .url
            .unwrap_or_else(|| format!("https://www.semanticscholar.org/paper/{}", self.paper_id));

        let mut paper = Paper::new(self.paper_id, title, SourceId::SemanticScholar, url);
        if let Some(ids) = self.external_ids {
            paper.doi = ids.doi.as_deref().and_then(normalize_doi);
            paper.arxiv_id = ids.arxiv.as_deref().and_then(normalize_arxiv_id);
        }
        paper.abstract_text = non_blank(self.abstract_text.as_deref());
        paper.venue = non_blank(self.venue.as_deref());
        paper.publication_date = self
            .publication_date
            .as_deref()
            .and_then(parse_date)
            .or_else(|| self.year.and_then(|y| parse_date(&y.to_string())));
        paper.citation_count = self.citation_count;
        paper.reference_count = self.reference_count;
        paper.pdf_url = self.open_access_pdf.and_then(|p| p.url).filter(|u| !u.is_empty());
        paper.authors = self
            .authors
            .into_iter()
            .filter_map(|a| non_blank(a.name.as_deref()).map(Author::named))
            .collect();
        paper.topics = self.fields_of_study.unwrap_or_default();
        Some(paper)
    }
}
