//! Source adapter implementations.
//!
//! Each module provides a struct implementing [`crate::source::SourceAdapter`]
//! that queries one scholarly API and normalises its records into
//! [`crate::types::Paper`].

pub mod arxiv;
pub mod openalex;
pub mod papers_with_code;
pub mod semantic_scholar;

pub use arxiv::ArxivAdapter;
pub use openalex::OpenAlexAdapter;
pub use papers_with_code::PapersWithCodeAdapter;
pub use semantic_scholar::SemanticScholarAdapter;

use chrono::NaiveDate;

use crate::types::{Paper, SearchQuery};

/// Parse the date formats upstream APIs emit: `YYYY-MM-DD`, RFC 3339
/// timestamps (date part only) and bare years.
pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Some(day) = raw.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(day, "%Y-%m-%d") {
            return Some(date);
        }
    }
    let year = raw.parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, 1, 1)
}

/// Collapse runs of whitespace (arXiv wraps titles and abstracts).
pub(crate) fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `Some(cleaned)` unless the text is blank.
pub(crate) fn non_blank(raw: Option<&str>) -> Option<String> {
    raw.map(clean_text).filter(|s| !s.is_empty())
}

/// First value of the filter on `field`, if any.
pub(crate) fn filter_value<'q>(query: &'q SearchQuery, field: &str) -> Option<&'q str> {
    query
        .filters
        .iter()
        .find(|f| f.field == field)
        .map(|f| f.value.trim())
        .filter(|v| !v.is_empty())
}

/// Drop papers dated outside the query's window. Undated papers are kept.
pub(crate) fn retain_in_window(papers: &mut Vec<Paper>, query: &SearchQuery) {
    let Some(range) = query.date_range else {
        return;
    };
    papers.retain(|p| p.publication_date.is_none_or(|d| range.contains(d)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DateRange, SourceId};

    #[test]
    fn dates_in_upstream_formats() {
        let expected = NaiveDate::from_ymd_opt(2021, 3, 4);
        assert_eq!(parse_date("2021-03-04"), expected);
        assert_eq!(parse_date("2021-03-04T17:59:59Z"), expected);
        assert_eq!(parse_date("2021"), NaiveDate::from_ymd_opt(2021, 1, 1));
        assert_eq!(parse_date("March 2021"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn whitespace_is_collapsed() {
        assert_eq!(clean_text("  Deep\n   Crowd\tCounting "), "Deep Crowd Counting");
        assert_eq!(non_blank(Some(" \n ")), None);
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn window_keeps_undated_papers() {
        let dated = |id: &str, y: i32| {
            let mut p = Paper::new(id, id, SourceId::Arxiv, "u");
            p.publication_date = NaiveDate::from_ymd_opt(y, 6, 1);
            p
        };
        let mut papers = vec![
            dated("old", 2015),
            dated("new", 2023),
            Paper::new("undated", "undated", SourceId::Arxiv, "u"),
        ];
        let query = SearchQuery::new("q", 10).with_date_range(DateRange {
            start: NaiveDate::from_ymd_opt(2020, 1, 1),
            end: None,
        });
        retain_in_window(&mut papers, &query);
        let ids: Vec<_> = papers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["new", "undated"]);
    }
}
