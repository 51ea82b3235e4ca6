//! Core types: queries, intents, source selections, papers and responses.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// External data sources the aggregator knows how to query.
///
/// Variants are declared in lexicographic order of [`SourceId::id`], so the
/// derived `Ord` matches the lexicographic source-id order used for
/// deterministic tie-breaks during fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceId {
    /// arXiv preprint archive.
    #[serde(rename = "arxiv")]
    Arxiv,
    /// OpenAlex general bibliographic index.
    #[serde(rename = "openalex")]
    OpenAlex,
    /// Papers with Code, a code-linked paper index.
    #[serde(rename = "papers_with_code")]
    PapersWithCode,
    /// Semantic Scholar citation index.
    #[serde(rename = "semantic_scholar")]
    SemanticScholar,
}

impl SourceId {
    /// Stable machine identifier, used in logs, cache keys and config.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Arxiv => "arxiv",
            Self::OpenAlex => "openalex",
            Self::PapersWithCode => "papers_with_code",
            Self::SemanticScholar => "semantic_scholar",
        }
    }

    /// Human-readable name of this source.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Arxiv => "arXiv",
            Self::OpenAlex => "OpenAlex",
            Self::PapersWithCode => "Papers with Code",
            Self::SemanticScholar => "Semantic Scholar",
        }
    }

    /// Fixed ranking bonus for results originating from this source.
    ///
    /// Curated citation data scores slightly higher than raw preprint
    /// listings.
    pub fn preference_bonus(&self) -> f64 {
        match self {
            Self::SemanticScholar => 3.0,
            Self::OpenAlex => 2.0,
            Self::Arxiv => 2.0,
            Self::PapersWithCode => 1.0,
        }
    }

    /// Whether this source is a code-linked index.
    pub fn is_code_source(&self) -> bool {
        matches!(self, Self::PapersWithCode)
    }

    /// Returns all available sources.
    pub fn all() -> &'static [SourceId] {
        &[
            Self::Arxiv,
            Self::OpenAlex,
            Self::PapersWithCode,
            Self::SemanticScholar,
        ]
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|source| source.id() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown source: {s}"))
    }
}

// ── Query ─────────────────────────────────────────────────────

/// Sort key requested by the caller or hinted to a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Source-native relevance.
    #[default]
    Relevance,
    /// Publication date.
    Date,
    /// Citation count.
    Citations,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    #[default]
    Desc,
}

/// Comparison operator of a structured filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Exact match.
    Eq,
    /// Substring match.
    Contains,
    /// Greater than or equal.
    Gte,
    /// Less than or equal.
    Lte,
    /// Membership in a comma-separated list.
    In,
}

/// A structured `field operator value` filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Field name, e.g. `subject` or `venue`.
    pub field: String,
    /// Comparison operator.
    pub operator: FilterOperator,
    /// Comparison value.
    pub value: String,
}

impl SearchFilter {
    /// Build a filter.
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Inclusive publication date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DateRange {
    /// Earliest publication date.
    pub start: Option<NaiveDate>,
    /// Latest publication date.
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Whether `date` falls within the window. Open ends always match.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }
}

/// A search request as seen by source adapters. Immutable per request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text query.
    pub query: String,
    /// Optional structured filters.
    #[serde(default)]
    pub filters: Vec<SearchFilter>,
    /// Sort key.
    #[serde(default)]
    pub sort_by: SortKey,
    /// Sort direction.
    #[serde(default)]
    pub sort_order: SortOrder,
    /// Maximum number of results.
    pub limit: usize,
    /// Number of results to skip.
    #[serde(default)]
    pub offset: usize,
    /// Optional publication date window.
    #[serde(default)]
    pub date_range: Option<DateRange>,
}

/// Field name used for subject/category filters.
pub const SUBJECT_FILTER: &str = "subject";
/// Filter field carrying the author hint to adapters that support it.
pub const AUTHOR_FILTER: &str = "author";
/// Filter field carrying the venue hint to adapters that support it.
pub const VENUE_FILTER: &str = "venue";

impl SearchQuery {
    /// Create a query with default sort and the given limit.
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            filters: Vec::new(),
            sort_by: SortKey::default(),
            sort_order: SortOrder::default(),
            limit,
            offset: 0,
            date_range: None,
        }
    }

    /// Builder: set the sort key.
    pub fn with_sort(mut self, sort_by: SortKey) -> Self {
        self.sort_by = sort_by;
        self
    }

    /// Builder: add a filter.
    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Builder: set the date window.
    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    /// Subject/category values carried in `subject` filters.
    pub fn subjects(&self) -> Vec<&str> {
        self.filters
            .iter()
            .filter(|f| f.field == SUBJECT_FILTER)
            .flat_map(|f| f.value.split(','))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

// ── Intent ────────────────────────────────────────────────────

/// Classification of what the user is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    /// General topical paper search.
    #[default]
    PaperSearch,
    /// Work by or about a particular author.
    AuthorAnalysis,
    /// How a topic evolved over time.
    TrendAnalysis,
    /// Newest work on a topic.
    RecentWork,
    /// Most influential work on a topic.
    HighlyCited,
    /// Datasets, benchmarks and code.
    DatasetFocused,
}

impl IntentType {
    /// Returns all intent variants.
    pub fn all() -> &'static [IntentType] {
        &[
            Self::PaperSearch,
            Self::AuthorAnalysis,
            Self::TrendAnalysis,
            Self::RecentWork,
            Self::HighlyCited,
            Self::DatasetFocused,
        ]
    }
}

impl FromStr for IntentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "paper_search" | "search" => Ok(Self::PaperSearch),
            "author_analysis" | "author" => Ok(Self::AuthorAnalysis),
            "trend_analysis" | "trend" | "trends" => Ok(Self::TrendAnalysis),
            "recent_work" | "recent" | "latest" => Ok(Self::RecentWork),
            "highly_cited" | "cited" | "influential" => Ok(Self::HighlyCited),
            "dataset_focused" | "dataset" | "datasets" | "code" => Ok(Self::DatasetFocused),
            other => Err(format!("unknown intent type: {other}")),
        }
    }
}

/// Search strategy derived from intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Favour recency.
    Latest,
    /// Favour citation impact.
    Cited,
    /// Balanced.
    #[default]
    Comprehensive,
}

impl FromStr for SearchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "latest" | "recent" => Ok(Self::Latest),
            "cited" | "citations" | "highly_cited" => Ok(Self::Cited),
            "comprehensive" | "balanced" => Ok(Self::Comprehensive),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// Temporal focus of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalFocus {
    /// The last couple of years.
    Recent,
    /// A single publication year.
    Year(i32),
    /// An inclusive year range.
    Between(i32, i32),
}

impl TemporalFocus {
    /// Parse free-form descriptions such as `"recent"`, `"2021"` or `"2019-2023"`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_lowercase();
        if raw.is_empty() || raw == "none" || raw == "null" {
            return None;
        }
        if matches!(raw.as_str(), "recent" | "latest" | "new" | "current") {
            return Some(Self::Recent);
        }
        if let Ok(year) = raw.parse::<i32>() {
            return Some(Self::Year(year));
        }
        let (from, to) = raw.split_once(['-', '–'])?;
        let from = from.trim().parse::<i32>().ok()?;
        let to = to.trim().parse::<i32>().ok()?;
        Some(Self::Between(from.min(to), from.max(to)))
    }

    /// Translate the focus into a publication-date window relative to `today`.
    pub fn date_range(&self, today: NaiveDate) -> DateRange {
        let year_start = |y: i32| NaiveDate::from_ymd_opt(y, 1, 1);
        let year_end = |y: i32| NaiveDate::from_ymd_opt(y, 12, 31);
        match *self {
            Self::Recent => DateRange {
                start: year_start(today.year() - 2),
                end: None,
            },
            Self::Year(y) => DateRange {
                start: year_start(y),
                end: year_end(y),
            },
            Self::Between(from, to) => DateRange {
                start: year_start(from),
                end: year_end(to),
            },
        }
    }
}

/// Structured interpretation of a free-text query. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryIntent {
    /// Classification.
    pub intent_type: IntentType,
    /// Core search terms with stop-words removed. Multi-word phrases allowed.
    pub core_terms: Vec<String>,
    /// Field-of-study label (`"general"` when unknown).
    pub field_of_study: String,
    /// Optional temporal focus.
    pub temporal_focus: Option<TemporalFocus>,
    /// Optional author hint.
    pub author_hint: Option<String>,
    /// Optional venue hint.
    pub venue_hint: Option<String>,
    /// Search strategy.
    pub strategy: SearchStrategy,
}

impl QueryIntent {
    /// The text sent to source adapters: core terms joined by spaces, or
    /// the raw query when no core terms survived stop-word removal.
    pub fn search_text(&self, raw_query: &str) -> String {
        if self.core_terms.is_empty() {
            raw_query.trim().to_string()
        } else {
            self.core_terms.join(" ")
        }
    }
}

// ── Source selection ──────────────────────────────────────────

/// Per-source request shaping chosen by the selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Result limit for this source.
    pub limit: usize,
    /// Sort hint.
    pub sort: SortKey,
    /// Subject/category filters understood by the source.
    pub subjects: Vec<String>,
}

/// Ordered primary and secondary sources plus per-source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSelection {
    /// Primary sources, most preferred first.
    pub primary: Vec<SourceId>,
    /// Secondary sources.
    pub secondary: Vec<SourceId>,
    /// Configuration for every selected source.
    pub configs: BTreeMap<SourceId, SourceConfig>,
}

impl SourceSelection {
    /// All selected sources, primary first.
    pub fn sources(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.primary.iter().chain(self.secondary.iter()).copied()
    }

    /// Configuration for `source`, if selected.
    pub fn config_for(&self, source: SourceId) -> Option<&SourceConfig> {
        self.configs.get(&source)
    }

    /// Whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.secondary.is_empty()
    }

    /// Whether `source` is selected.
    pub fn contains(&self, source: SourceId) -> bool {
        self.primary.contains(&source) || self.secondary.contains(&source)
    }

    /// Keep only the sources for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(SourceId) -> bool) {
        self.primary.retain(|s| keep(*s));
        self.secondary.retain(|s| keep(*s));
        let selected: Vec<SourceId> = self.sources().collect();
        self.configs.retain(|s, _| selected.contains(s));
    }
}

// ── Results ───────────────────────────────────────────────────

/// A paper author.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Author {
    /// Display name.
    pub name: String,
    /// Institutional affiliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
    /// ORCID identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orcid: Option<String>,
}

impl Author {
    /// An author known only by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            affiliation: None,
            orcid: None,
        }
    }
}

/// A research paper normalised from any source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    /// Source-specific identifier.
    pub id: String,
    /// Title.
    pub title: String,
    /// Originating source.
    pub source: SourceId,
    /// Landing page URL.
    pub url: String,
    /// Ordered author list.
    #[serde(default)]
    pub authors: Vec<Author>,
    /// Abstract text.
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    /// DOI, as reported by the source.
    #[serde(default)]
    pub doi: Option<String>,
    /// arXiv identifier, as reported by the source.
    #[serde(default)]
    pub arxiv_id: Option<String>,
    /// Direct PDF link.
    #[serde(default)]
    pub pdf_url: Option<String>,
    /// Publication date.
    #[serde(default)]
    pub publication_date: Option<NaiveDate>,
    /// Journal or conference.
    #[serde(default)]
    pub venue: Option<String>,
    /// Citation count.
    #[serde(default)]
    pub citation_count: Option<u64>,
    /// Reference count.
    #[serde(default)]
    pub reference_count: Option<u64>,
    /// Topics, concepts or categories.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Every source that returned this work (filled by fusion).
    #[serde(default)]
    pub found_in: Vec<SourceId>,
    /// Ranking score (higher is better; set by the ranker).
    #[serde(default)]
    pub score: f64,
}

impl Paper {
    /// A paper with only identity fields set.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        source: SourceId,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            source,
            url: url.into(),
            authors: Vec::new(),
            abstract_text: None,
            doi: None,
            arxiv_id: None,
            pdf_url: None,
            publication_date: None,
            venue: None,
            citation_count: None,
            reference_count: None,
            topics: Vec::new(),
            found_in: vec![source],
            score: 0.0,
        }
    }

    /// Abstract length in characters, zero when missing.
    pub fn abstract_len(&self) -> usize {
        self.abstract_text.as_deref().map_or(0, |a| a.trim().chars().count())
    }

    /// Number of populated optional fields.
    pub fn populated_fields(&self) -> usize {
        let present = |o: bool| usize::from(o);
        present(!self.authors.is_empty())
            + present(self.abstract_len() > 0)
            + present(self.doi.is_some())
            + present(self.arxiv_id.is_some())
            + present(self.pdf_url.is_some())
            + present(self.publication_date.is_some())
            + present(self.venue.is_some())
            + present(self.citation_count.is_some())
            + present(self.reference_count.is_some())
            + present(!self.topics.is_empty())
    }
}

/// Metadata key holding a per-source error message.
pub const META_ERROR: &str = "error";
/// Metadata key holding the timeout budget in seconds.
pub const META_TIMEOUT_SECONDS: &str = "timeout_seconds";

/// The outcome of querying a single source. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResponse {
    /// Whether the source answered.
    pub success: bool,
    /// Originating source.
    pub source: SourceId,
    /// Total hits reported upstream (may exceed `returned`).
    pub total: usize,
    /// Number of papers in `results`.
    pub returned: usize,
    /// Normalised papers.
    pub results: Vec<Paper>,
    /// Wall-clock time spent, in milliseconds.
    pub execution_ms: u64,
    /// Free-form metadata; failures record `error` here.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl SourceResponse {
    /// A successful response.
    pub fn ok(source: SourceId, results: Vec<Paper>, total: usize, execution_ms: u64) -> Self {
        Self {
            success: true,
            source,
            total: total.max(results.len()),
            returned: results.len(),
            results,
            execution_ms,
            metadata: serde_json::Map::new(),
        }
    }

    /// A synthesized failure carrying `error` in metadata.
    pub fn failure(source: SourceId, error: impl Into<String>, execution_ms: u64) -> Self {
        let mut metadata = serde_json::Map::new();
        metadata.insert(META_ERROR.into(), serde_json::Value::String(error.into()));
        Self {
            success: false,
            source,
            total: 0,
            returned: 0,
            results: Vec::new(),
            execution_ms,
            metadata,
        }
    }

    /// A synthesized timeout: `{error: "timeout", timeout_seconds: N}`.
    pub fn timeout(source: SourceId, timeout_secs: u64, execution_ms: u64) -> Self {
        let mut response = Self::failure(source, "timeout", execution_ms);
        response
            .metadata
            .insert(META_TIMEOUT_SECONDS.into(), serde_json::Value::from(timeout_secs));
        response
    }

    /// The recorded error message, if any.
    pub fn error(&self) -> Option<&str> {
        self.metadata.get(META_ERROR).and_then(|v| v.as_str())
    }
}

/// Per-source diagnostics attached to every aggregate response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStatistics {
    /// Whether the source answered.
    pub success: bool,
    /// Papers returned.
    pub returned: usize,
    /// Total hits reported upstream.
    pub total: usize,
    /// Time spent, in milliseconds.
    pub execution_ms: u64,
    /// Error message for failed sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&SourceResponse> for SourceStatistics {
    fn from(response: &SourceResponse) -> Self {
        Self {
            success: response.success,
            returned: response.returned,
            total: response.total,
            execution_ms: response.execution_ms,
            error: response.error().map(str::to_owned),
        }
    }
}

/// Which fusion path produced the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    /// Full cross-referencing with field enrichment.
    CrossReference,
    /// Exact DOI / title dedup without enrichment.
    Basic,
}

/// Fusion input/output counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionStats {
    /// Papers entering fusion.
    pub input: usize,
    /// Papers leaving fusion.
    pub output: usize,
    /// Path taken.
    pub mode: FusionMode,
}

/// The final, ranked answer to one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResponse {
    /// False only when no source succeeded and nothing was found.
    pub success: bool,
    /// The original query text.
    pub query: String,
    /// How the query was interpreted.
    pub intent: QueryIntent,
    /// Ranked papers (after offset/limit).
    pub results: Vec<Paper>,
    /// Ranked papers before pagination.
    pub total_found: usize,
    /// One entry per attempted source.
    pub source_statistics: BTreeMap<SourceId, SourceStatistics>,
    /// Sources skipped because their circuit was open.
    #[serde(default)]
    pub skipped_sources: Vec<SourceId>,
    /// Fusion counts.
    pub fusion_stats: FusionStats,
    /// End-to-end time, in milliseconds.
    pub execution_ms: u64,
    /// Diagnostic reason on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
