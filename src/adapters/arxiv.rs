//! arXiv adapter, backed by the export API's Atom feed.
//!
//! Free text becomes an `all:` conjunction; subject filters map to `cat:`
//! clauses, the author hint to an `au:` clause and the date window to a
//! `submittedDate` range. arXiv has no citation data, so a citation sort
//! falls back to relevance.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{clean_text, filter_value, non_blank, parse_date, retain_in_window};
use crate::config::AggregatorConfig;
use crate::error::{Result, SearchError};
use crate::http;
use crate::orchestrator::normalize::{normalize_arxiv_id, normalize_doi};
use crate::rate_limit::RateLimiter;
use crate::source::{FetchedPage, SourceAdapter};
use crate::types::{Author, Paper, SearchQuery, SortKey, SortOrder, SourceId, AUTHOR_FILTER};

/// Public export API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://export.arxiv.org/api/query";

/// First day arXiv accepted submissions; lower bound of open date windows.
const ARXIV_EPOCH: (i32, u32, u32) = (1991, 8, 1);

/// Largest page the export API serves in one response.
const MAX_RESULTS: usize = 2000;

/// arXiv export API client.
#[derive(Debug)]
pub struct ArxivAdapter {
    client: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
    delay_ms: (u64, u64),
}

impl ArxivAdapter {
    /// Create an adapter sharing `client`, rate limited per `config`.
    pub fn new(client: reqwest::Client, config: &AggregatorConfig) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_owned(),
            limiter: RateLimiter::per_minute(config.rate_limits.per_minute(SourceId::Arxiv)),
            delay_ms: config.http.request_delay_ms,
        }
    }

    /// Point the adapter at another endpoint (mirrors, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SourceAdapter for ArxivAdapter {
    fn source_id(&self) -> SourceId {
        SourceId::Arxiv
    }

    async fn fetch(&self, query: &SearchQuery) -> Result<FetchedPage> {
        let search_query = build_search_query(query, Utc::now().date_naive())?;
        tracing::trace!(search_query = %search_query, "arXiv search");

        self.limiter.acquire().await?;
        http::pace(self.delay_ms).await;

        let response = self
            .client
            .get(&self.base_url)
            .query(&request_params(query, search_query))
            .send()
            .await
            .map_err(|e| SearchError::Http(format!("arXiv request failed: {e}")))?;
        let body = http::check_status(response)?
            .text()
            .await
            .map_err(|e| SearchError::Http(format!("arXiv response read failed: {e}")))?;

        tracing::trace!(bytes = body.len(), "arXiv response received");

        let mut page = parse_feed(&body)?;
        retain_in_window(&mut page.papers, query);
        page.papers.truncate(query.limit);
        Ok(page)
    }
}

/// Query-string parameters for one export API call.
pub(crate) fn request_params(
    query: &SearchQuery,
    search_query: String,
) -> Vec<(&'static str, String)> {
    let (sort_by, sort_order) = sort_params(query);
    vec![
        ("search_query", search_query),
        ("start", query.offset.to_string()),
        ("max_results", query.limit.clamp(1, MAX_RESULTS).to_string()),
        ("sortBy", sort_by.to_owned()),
        ("sortOrder", sort_order.to_owned()),
    ]
}

/// Build the `search_query` expression for `query`.
///
/// `today` closes open-ended date windows.
pub(crate) fn build_search_query(query: &SearchQuery, today: NaiveDate) -> Result<String> {
    let words: Vec<String> = query
        .query
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '.'))
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return Err(SearchError::Config("arXiv query has no searchable terms".into()));
    }

    let mut clauses: Vec<String> = words.iter().map(|w| format!("all:{w}")).collect();

    let categories = query.subjects();
    if !categories.is_empty() {
        let any: Vec<String> = categories.iter().map(|c| format!("cat:{c}")).collect();
        clauses.push(format!("({})", any.join(" OR ")));
    }

    // arXiv indexes authors by surname.
    if let Some(surname) =
        filter_value(query, AUTHOR_FILTER).and_then(|a| a.split_whitespace().last())
    {
        clauses.push(format!("au:{surname}"));
    }

    if let Some(range) = query.date_range {
        let (y, m, d) = ARXIV_EPOCH;
        let start = range
            .start
            .or_else(|| NaiveDate::from_ymd_opt(y, m, d))
            .unwrap_or(today);
        let end = range.end.unwrap_or(today);
        clauses.push(format!(
            "submittedDate:[{}0000 TO {}2359]",
            start.format("%Y%m%d"),
            end.format("%Y%m%d")
        ));
    }

    Ok(clauses.join(" AND "))
}

fn sort_params(query: &SearchQuery) -> (&'static str, &'static str) {
    let sort_by = match query.sort_by {
        SortKey::Date => "submittedDate",
        SortKey::Relevance | SortKey::Citations => "relevance",
    };
    let order = match query.sort_order {
        SortOrder::Asc => "ascending",
        SortOrder::Desc => "descending",
    };
    (sort_by, order)
}

/// Leaf elements whose text we collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
    Affiliation,
    Doi,
    JournalRef,
    TotalResults,
}

#[derive(Debug, Default)]
struct Entry {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<Author>,
    doi: Option<String>,
    journal_ref: Option<String>,
    url: Option<String>,
    pdf_url: Option<String>,
    categories: Vec<String>,
}

impl Entry {
    fn into_paper(self) -> Option<Paper> {
        let arxiv_id = normalize_arxiv_id(&self.id)?;
        let title = clean_text(&self.title);
        if title.is_empty() {
            return None;
        }
        let url = self
            .url
            .unwrap_or_else(|| format!("https://arxiv.org/abs/{arxiv_id}"));

        let mut paper = Paper::new(arxiv_id.clone(), title, SourceId::Arxiv, url);
        paper.arxiv_id = Some(arxiv_id);
        paper.authors = self.authors;
        paper.abstract_text = non_blank(Some(&self.summary));
        paper.doi = self.doi.as_deref().and_then(normalize_doi);
        paper.pdf_url = self.pdf_url;
        paper.publication_date = parse_date(&self.published);
        paper.venue = non_blank(self.journal_ref.as_deref());
        paper.topics = self.categories;
        Some(paper)
    }
}

/// Parse an arXiv Atom feed into papers plus `opensearch:totalResults`.
///
/// # Errors
///
/// Returns [`SearchError::Parse`] for malformed XML or when the feed carries
/// an arXiv API error entry.
pub(crate) fn parse_feed(xml: &str) -> Result<FetchedPage> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut papers = Vec::new();
    let mut total = None;
    let mut entry: Option<Entry> = None;
    let mut author: Option<Author> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| SearchError::Parse(format!("arXiv feed: {e}")))?;
        match event {
            Event::Start(e) => {
                let name = e.local_name();
                let name = name.as_ref();
                if name == b"entry" {
                    entry = Some(Entry::default());
                } else if let Some(current) = entry.as_mut() {
                    if name == b"author" {
                        author = Some(Author::named(""));
                    } else if matches!(name, b"link" | b"category" | b"primary_category") {
                        apply_attributes(current, &e)?;
                    } else {
                        field = entry_field(name, author.is_some());
                    }
                } else if name == b"totalResults" {
                    field = Some(Field::TotalResults);
                }
                text.clear();
            }
            Event::Empty(e) => {
                if let Some(current) = entry.as_mut() {
                    apply_attributes(current, &e)?;
                }
            }
            Event::Text(t) if field.is_some() => {
                let unescaped = t
                    .unescape()
                    .map_err(|e| SearchError::Parse(format!("arXiv feed: {e}")))?;
                text.push_str(&unescaped);
            }
            Event::End(e) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"author" => {
                        if let (Some(current), Some(done)) = (entry.as_mut(), author.take()) {
                            if !done.name.is_empty() {
                                current.authors.push(done);
                            }
                        }
                    }
                    b"entry" => {
                        if let Some(done) = entry.take() {
                            if done.id.contains("/api/errors") {
                                return Err(SearchError::Parse(format!(
                                    "arXiv API error: {}",
                                    clean_text(&done.summary)
                                )));
                            }
                            match done.into_paper() {
                                Some(paper) => papers.push(paper),
                                None => tracing::debug!("skipping arXiv entry without id or title"),
                            }
                        }
                    }
                    _ => {
                        if let Some(f) = field.take() {
                            store(f, &text, entry.as_mut(), author.as_mut(), &mut total);
                        }
                    }
                }
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(FetchedPage { papers, total })
}

fn entry_field(name: &[u8], in_author: bool) -> Option<Field> {
    match (name, in_author) {
        (b"name", true) => Some(Field::AuthorName),
        (b"affiliation", true) => Some(Field::Affiliation),
        (_, true) => None,
        (b"id", false) => Some(Field::Id),
        (b"title", false) => Some(Field::Title),
        (b"summary", false) => Some(Field::Summary),
        (b"published", false) => Some(Field::Published),
        (b"doi", false) => Some(Field::Doi),
        (b"journal_ref", false) => Some(Field::JournalRef),
        _ => None,
    }
}

fn store(
    field: Field,
    text: &str,
    entry: Option<&mut Entry>,
    author: Option<&mut Author>,
    total: &mut Option<usize>,
) {
    let value = clean_text(text);
    match (field, entry, author) {
        (Field::TotalResults, _, _) => *total = value.parse().ok(),
        (Field::AuthorName, _, Some(a)) => a.name = value,
        (Field::Affiliation, _, Some(a)) => a.affiliation = Some(value).filter(|v| !v.is_empty()),
        (Field::Id, Some(e), _) => e.id = value,
        (Field::Title, Some(e), _) => e.title = value,
        (Field::Summary, Some(e), _) => e.summary = value,
        (Field::Published, Some(e), _) => e.published = value,
        (Field::Doi, Some(e), _) => e.doi = Some(value),
        (Field::JournalRef, Some(e), _) => e.journal_ref = Some(value),
        _ => {}
    }
}

/// Handle the attribute-only elements: `link`, `category`, `primary_category`.
fn apply_attributes(entry: &mut Entry, element: &BytesStart<'_>) -> Result<()> {
    let name = element.local_name();
    let name = name.as_ref();
    if !matches!(name, b"link" | b"category" | b"primary_category") {
        return Ok(());
    }

    let mut href = None;
    let mut rel = None;
    let mut title = None;
    let mut mime = None;
    let mut term = None;
    for attr in element.attributes().flatten() {
        let value = attr
            .unescape_value()
            .map_err(|e| SearchError::Parse(format!("arXiv feed attribute: {e}")))?
            .into_owned();
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(value),
            b"rel" => rel = Some(value),
            b"title" => title = Some(value),
            b"type" => mime = Some(value),
            b"term" => term = Some(value),
            _ => {}
        }
    }

    if name == b"link" {
        let Some(href) = href else {
            return Ok(());
        };
        if title.as_deref() == Some("pdf") || mime.as_deref() == Some("application/pdf") {
            entry.pdf_url = Some(href);
        } else if rel.as_deref().is_none_or(|r| r == "alternate") && entry.url.is_none() {
            entry.url = Some(href);
        }
    } else if let Some(term) = term.filter(|t| !t.is_empty()) {
        if !entry.categories.contains(&term) {
            if name == b"primary_category" {
                entry.categories.insert(0, term);
            } else {
                entry.categories.push(term);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DateRange, FilterOperator, SearchFilter, SUBJECT_FILTER};

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query: search_query=all:crowd AND all:counting</title>
  <id>http://arxiv.org/api/cHxbiOdZaP56ODnBPIenZhzg5f8</id>
  <opensearch:totalResults>1342</opensearch:totalResults>
  <opensearch:startIndex>0</opensearch:startIndex>
  <entry>
    <id>http://arxiv.org/abs/2101.00001v2</id>
    <updated>2021-02-01T10:00:00Z</updated>
    <published>2021-01-01T18:59:59Z</published>
    <title>Dense Crowd
      Counting &amp; Localization</title>
    <summary>  We count people
      in dense crowds.
    </summary>
    <author>
      <name>Ada Lovelace</name>
      <arxiv:affiliation>Analytical Engine Lab</arxiv:affiliation>
    </author>
    <author>
      <name>Alan Turing</name>
    </author>
    <arxiv:doi>10.1234/crowd.2021</arxiv:doi>
    <arxiv:journal_ref>CVPR 2021</arxiv:journal_ref>
    <link href="http://arxiv.org/abs/2101.00001v2" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2101.00001v2" rel="related" type="application/pdf"/>
    <arxiv:primary_category term="cs.CV" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.CV" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/hep-th/9901001v1</id>
    <published>1999-01-04T00:00:00Z</published>
    <title>Strings</title>
    <summary></summary>
  </entry>
</feed>"#;

    #[test]
    fn parses_entries_and_total() {
        let page = parse_feed(FEED).unwrap();
        assert_eq!(page.total, Some(1342));
        assert_eq!(page.papers.len(), 2);

        let p = &page.papers[0];
        assert_eq!(p.id, "2101.00001");
        assert_eq!(p.arxiv_id.as_deref(), Some("2101.00001"));
        assert_eq!(p.title, "Dense Crowd Counting & Localization");
        assert_eq!(p.abstract_text.as_deref(), Some("We count people in dense crowds."));
        assert_eq!(p.authors.len(), 2);
        assert_eq!(p.authors[0].name, "Ada Lovelace");
        assert_eq!(p.authors[0].affiliation.as_deref(), Some("Analytical Engine Lab"));
        assert_eq!(p.authors[1].affiliation, None);
        assert_eq!(p.doi.as_deref(), Some("10.1234/crowd.2021"));
        assert_eq!(p.venue.as_deref(), Some("CVPR 2021"));
        assert_eq!(p.url, "http://arxiv.org/abs/2101.00001v2");
        assert_eq!(p.pdf_url.as_deref(), Some("http://arxiv.org/pdf/2101.00001v2"));
        assert_eq!(p.publication_date, NaiveDate::from_ymd_opt(2021, 1, 1));
        assert_eq!(p.topics, ["cs.CV", "cs.LG"]);
        assert_eq!(p.found_in, [SourceId::Arxiv]);
    }

    #[test]
    fn old_style_ids_and_missing_fields() {
        let page = parse_feed(FEED).unwrap();
        let p = &page.papers[1];
        assert_eq!(p.id, "hep-th/9901001");
        assert_eq!(p.abstract_text, None);
        assert_eq!(p.url, "https://arxiv.org/abs/hep-th/9901001");
        assert!(p.authors.is_empty());
    }

    #[test]
    fn api_error_entry_is_an_error() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
          <entry>
            <id>http://arxiv.org/api/errors#incorrect_id_format_for_1234</id>
            <title>Error</title>
            <summary>incorrect id format for 1234</summary>
          </entry>
        </feed>"#;
        let err = parse_feed(xml).unwrap_err();
        assert!(err.to_string().contains("incorrect id format"));
    }

    #[test]
    fn empty_feed_has_no_papers() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom" xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">
          <opensearch:totalResults>0</opensearch:totalResults>
        </feed>"#;
        let page = parse_feed(xml).unwrap();
        assert!(page.papers.is_empty());
        assert_eq!(page.total, Some(0));
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let err = parse_feed("<feed><entry><id>x</entry></feed>").unwrap_err();
        assert!(matches!(err, SearchError::Parse(_)));
    }

    #[test]
    fn search_query_combines_clauses() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let query = SearchQuery::new("crowd counting!", 10)
            .with_filter(SearchFilter::new(SUBJECT_FILTER, FilterOperator::In, "cs.CV,cs.LG"))
            .with_filter(SearchFilter::new(AUTHOR_FILTER, FilterOperator::Contains, "Ada Lovelace"))
            .with_date_range(DateRange {
                start: NaiveDate::from_ymd_opt(2022, 1, 1),
                end: None,
            });
        assert_eq!(
            build_search_query(&query, today).unwrap(),
            "all:crowd AND all:counting AND (cat:cs.CV OR cat:cs.LG) AND au:Lovelace \
             AND submittedDate:[202201010000 TO 202405012359]"
        );
    }

    #[test]
    fn search_query_requires_terms() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert!(build_search_query(&SearchQuery::new("?? !!", 10), today).is_err());
    }

    #[test]
    fn citation_sort_falls_back_to_relevance() {
        let query = SearchQuery::new("q", 5).with_sort(SortKey::Citations);
        assert_eq!(sort_params(&query), ("relevance", "descending"));
        let query = SearchQuery::new("q", 5).with_sort(SortKey::Date);
        assert_eq!(sort_params(&query).0, "submittedDate");
    }

    #[test]
    fn max_results_is_clamped() {
        let query = SearchQuery::new("q", 1_000_020);
        let params = request_params(&query, "all:q".into());
        assert!(params.contains(&("max_results", "2000".to_owned())));
        assert!(params.contains(&("start", "0".to_owned())));

        let params = request_params(&SearchQuery::new("q", 7), "all:q".into());
        assert!(params.contains(&("max_results", "7".to_owned())));
    }
}
