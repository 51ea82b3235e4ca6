//! OpenAlex adapter (`/works` search endpoint).
//!
//! Sort hints map onto `cited_by_count` / `publication_date`; the date
//! window becomes a `from_publication_date`/`to_publication_date` filter.
//! Abstracts arrive as an inverted index and are rebuilt word by word.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use super::{filter_value, non_blank, parse_date, retain_in_window};
use crate::config::AggregatorConfig;
use crate::error::{Result, SearchError};
use crate::http;
use crate::orchestrator::normalize::{normalize_arxiv_id, normalize_doi};
use crate::rate_limit::RateLimiter;
use crate::source::{FetchedPage, SourceAdapter};
use crate::types::{Author, Paper, SearchQuery, SortKey, SortOrder, SourceId, VENUE_FILTER};

/// Public API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openalex.org";

/// OpenAlex caps `per-page` at 200.
const MAX_PER_PAGE: usize = 200;

/// OpenAlex works API client.
#[derive(Debug)]
pub struct OpenAlexAdapter {
    client: reqwest::Client,
    base_url: String,
    mailto: Option<String>,
    limiter: RateLimiter,
    delay_ms: (u64, u64),
}

impl OpenAlexAdapter {
    /// Create an adapter sharing `client`, rate limited per `config`.
    ///
    /// A configured `http.mailto` is sent as the `mailto` parameter to use
    /// OpenAlex's polite pool.
    pub fn new(client: reqwest::Client, config: &AggregatorConfig) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_owned(),
            mailto: config.http.mailto.clone(),
            limiter: RateLimiter::per_minute(config.rate_limits.per_minute(SourceId::OpenAlex)),
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
impl SourceAdapter for OpenAlexAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::OpenAlex
    }

    async fn fetch(&self, query: &SearchQuery) -> Result<FetchedPage> {
        let params = build_params(query, self.mailto.as_deref());
        tracing::trace!(query = %query.query, "OpenAlex search");

        self.limiter.acquire().await?;
        http::pace(self.delay_ms).await;

        let response = self
            .client
            .get(format!("{}/works", self.base_url))
            .query(&params)
            .send()
            .await
            .map_err(|e| SearchError::Http(format!("OpenAlex request failed: {e}")))?;
        let body: WorksResponse = http::check_status(response)?
            .json()
            .await
            .map_err(|e| SearchError::Parse(format!("OpenAlex response: {e}")))?;

        let mut papers: Vec<Paper> =
            body.results.into_iter().filter_map(Work::into_paper).collect();
        retain_in_window(&mut papers, query);
        papers.truncate(query.limit);
        Ok(FetchedPage {
            papers,
            total: body.meta.and_then(|m| m.count),
        })
    }
}

/// Query-string parameters for `/works`.
pub(crate) fn build_params(
    query: &SearchQuery,
    mailto: Option<&str>,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("search", query.query.trim().to_owned()),
        ("per-page", query.limit.clamp(1, MAX_PER_PAGE).to_string()),
    ];

    let direction = match query.sort_order {
        SortOrder::Asc => "asc",
        SortOrder::Desc => "desc",
    };
    match query.sort_by {
        SortKey::Citations => params.push(("sort", format!("cited_by_count:{direction}"))),
        SortKey::Date => params.push(("sort", format!("publication_date:{direction}"))),
        SortKey::Relevance => {}
    }

    let mut filters = Vec::new();
    if let Some(range) = query.date_range {
        if let Some(start) = range.start {
            filters.push(format!("from_publication_date:{start}"));
        }
        if let Some(end) = range.end {
            filters.push(format!("to_publication_date:{end}"));
        }
    }
    if let Some(venue) = filter_value(query, VENUE_FILTER) {
        // Commas separate filters, so they cannot appear in the value.
        filters.push(format!(
            "primary_location.source.display_name.search:{}",
            venue.replace(',', " ")
        ));
    }
    if !filters.is_empty() {
        params.push(("filter", filters.join(",")));
    }

    if let Some(mailto) = mailto {
        params.push(("mailto", mailto.to_owned()));
    }
    params
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorksResponse {
    #[serde(default)]
    meta: Option<Meta>,
    #[serde(default)]
    results: Vec<Work>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct Work {
    id: String,
    title: Option<String>,
    display_name: Option<String>,
    doi: Option<String>,
    publication_date: Option<String>,
    publication_year: Option<i32>,
    cited_by_count: Option<u64>,
    referenced_works_count: Option<u64>,
    #[serde(default)]
    authorships: Vec<Authorship>,
    primary_location: Option<Location>,
    #[serde(default)]
    locations: Vec<Location>,
    abstract_inverted_index: Option<BTreeMap<String, Vec<usize>>>,
    #[serde(default)]
    topics: Vec<Named>,
    #[serde(default)]
    concepts: Vec<Named>,
}

#[derive(Debug, Deserialize)]
struct Authorship {
    author: Option<AuthorRef>,
    #[serde(default)]
    institutions: Vec<Named>,
}

#[derive(Debug, Deserialize)]
struct AuthorRef {
    display_name: Option<String>,
    orcid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    landing_page_url: Option<String>,
    pdf_url: Option<String>,
    source: Option<Named>,
}

#[derive(Debug, Deserialize)]
struct Named {
    display_name: Option<String>,
}

impl Work {
    fn into_paper(self) -> Option<Paper> {
        let title = non_blank(self.title.as_deref().or(self.display_name.as_deref()))?;
        let key = self.id.rsplit('/').next().unwrap_or(&self.id).to_owned();

        let doi = self.doi.as_deref().and_then(normalize_doi);
        let landing = self
            .primary_location
            .as_ref()
            .and_then(|l| l.landing_page_url.clone());
        let url = landing.unwrap_or_else(|| self.id.clone());

        let mut paper = Paper::new(key, title, SourceId::OpenAlex, url);
        paper.arxiv_id = self
            .locations
            .iter()
            .chain(self.primary_location.iter())
            .filter_map(|l| l.landing_page_url.as_deref())
            .find_map(normalize_arxiv_id);
        paper.doi = doi;
        paper.pdf_url = self
            .primary_location
            .as_ref()
            .and_then(|l| l.pdf_url.clone())
            .or_else(|| self.locations.iter().find_map(|l| l.pdf_url.clone()));
        paper.publication_date = self
            .publication_date
            .as_deref()
            .and_then(parse_date)
            .or_else(|| self.publication_year.and_then(|y| parse_date(&y.to_string())));
        paper.venue = self
            .primary_location
            .as_ref()
            .and_then(|l| l.source.as_ref())
            .and_then(|s| non_blank(s.display_name.as_deref()));
        paper.citation_count = self.cited_by_count;
        paper.reference_count = self.referenced_works_count;
        paper.abstract_text = self
            .abstract_inverted_index
            .as_ref()
            .and_then(rebuild_abstract);
        paper.authors = self
            .authorships
            .into_iter()
            .filter_map(|a| {
                let author = a.author?;
                let name = non_blank(author.display_name.as_deref())?;
                Some(Author {
                    name,
                    affiliation: a
                        .institutions
                        .iter()
                        .find_map(|i| non_blank(i.display_name.as_deref())),
                    orcid: author
                        .orcid
                        .map(|o| o.trim_start_matches("https://orcid.org/").to_owned()),
                })
            })
            .collect();
        let labels = if self.topics.is_empty() { self.concepts } else { self.topics };
        paper.topics = labels
            .into_iter()
            .filter_map(|t| non_blank(t.display_name.as_deref()))
            .collect();
        Some(paper)
    }
}

/// Reassemble an abstract from OpenAlex's `{word: [positions]}` form.
pub(crate) fn rebuild_abstract(index: &BTreeMap<String, Vec<usize>>) -> Option<String> {
    let mut positioned: Vec<(usize, &str)> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |&p| (p, word.as_str())))
        .collect();
    if positioned.is_empty() {
        return None;
    }
    positioned.sort_unstable_by_key(|&(p, _)| p);
    let text = positioned.into_iter().map(|(_, w)| w).collect::<Vec<_>>().join(" ");
    non_blank(Some(&text))
}
