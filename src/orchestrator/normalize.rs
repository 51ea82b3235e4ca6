//! Identifier and title normalisation for cross-source matching.
//!
//! Sources report the same work with differently formatted identifiers
//! (`https://doi.org/10.1/ABC`, `doi:10.1/abc`, `arXiv:2101.00001v2`,
//! `https://arxiv.org/abs/2101.00001`). These helpers canonicalise them so
//! that equivalent records compare equal.

use url::Url;

use crate::types::Paper;

/// Number of leading title tokens that form a title match key.
pub const TITLE_KEY_TOKENS: usize = 8;

/// Titles with fewer tokens than this produce no title key.
pub const TITLE_KEY_MIN_TOKENS: usize = 2;

/// DOI prefix arXiv registers its own DOIs under.
const ARXIV_DOI_PREFIX: &str = "10.48550/arxiv.";

/// Normalise a DOI.
///
/// 1. Trim and lowercase.
/// 2. Strip `doi:` prefixes and `doi.org` / `dx.doi.org` resolver URLs.
/// 3. Strip trailing punctuation.
///
/// Returns `None` unless the result looks like `10.<registrant>/<suffix>`.
///
/// # Examples
///
/// ```
/// use scholar_search::orchestrator::normalize::normalize_doi;
///
/// assert_eq!(
///     normalize_doi("https://doi.org/10.1000/ABC.123").as_deref(),
///     Some("10.1000/abc.123")
/// );
/// assert_eq!(normalize_doi("doi:10.1000/abc.123").as_deref(), Some("10.1000/abc.123"));
/// assert_eq!(normalize_doi("not a doi"), None);
/// ```
pub fn normalize_doi(raw: &str) -> Option<String> {
    let lower = raw.trim().to_lowercase();
    let mut doi = lower.as_str();

    if let Ok(parsed) = Url::parse(doi) {
        if parsed.host_str().is_some_and(|h| h.ends_with("doi.org")) {
            let path = parsed.path().trim_start_matches('/').to_owned();
            return finish_doi(&percent_decode(&path));
        }
    }

    if let Some(rest) = doi.strip_prefix("doi:") {
        doi = rest.trim();
    }
    finish_doi(doi)
}

fn finish_doi(doi: &str) -> Option<String> {
    let doi = doi.trim().trim_end_matches(['.', ',', ';']);
    let (registrant, suffix) = doi.split_once('/')?;
    if !registrant.starts_with("10.") || registrant.len() < 4 || suffix.is_empty() {
        return None;
    }
    Some(doi.to_owned())
}

fn percent_decode(input: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(input.as_bytes())).into_owned()
}

/// Normalise an arXiv identifier.
///
/// Accepts bare ids (`2101.00001`, `hep-th/9901001`), `arXiv:` prefixes,
/// `arxiv.org/abs|pdf` URLs and arXiv DOIs. The version suffix is dropped
/// so that `2101.00001v1` and `2101.00001v3` match.
///
/// # Examples
///
/// ```
/// use scholar_search::orchestrator::normalize::normalize_arxiv_id;
///
/// assert_eq!(normalize_arxiv_id("arXiv:2101.00001v2").as_deref(), Some("2101.00001"));
/// assert_eq!(
///     normalize_arxiv_id("https://arxiv.org/pdf/2101.00001v1.pdf").as_deref(),
///     Some("2101.00001")
/// );
/// ```
pub fn normalize_arxiv_id(raw: &str) -> Option<String> {
    let lower = raw.trim().to_lowercase();
    let mut id = lower.as_str();

    let from_url;
    if let Ok(parsed) = Url::parse(id) {
        if parsed.host_str().is_some_and(|h| h.ends_with("arxiv.org")) {
            let path = parsed.path();
            let rest = path
                .strip_prefix("/abs/")
                .or_else(|| path.strip_prefix("/pdf/"))?;
            from_url = rest.trim_end_matches(".pdf").to_owned();
            id = from_url.as_str();
        } else if parsed.host_str().is_some_and(|h| h.ends_with("doi.org")) {
            let doi = normalize_doi(id)?;
            return arxiv_id_from_doi(&doi);
        }
    }

    if let Some(rest) = id.strip_prefix("arxiv:") {
        id = rest.trim();
    }
    if let Some(rest) = id.strip_prefix(ARXIV_DOI_PREFIX) {
        id = rest;
    }

    let id = strip_version(id);
    is_arxiv_id(id).then(|| id.to_owned())
}

/// The arXiv id embedded in an arXiv-issued DOI, if any.
pub fn arxiv_id_from_doi(doi: &str) -> Option<String> {
    normalize_doi(doi)?
        .strip_prefix(ARXIV_DOI_PREFIX)
        .and_then(normalize_arxiv_id)
}

fn strip_version(id: &str) -> &str {
    if let Some(pos) = id.rfind('v') {
        let (base, version) = id.split_at(pos);
        let numbered = version.len() > 1 && version[1..].bytes().all(|b| b.is_ascii_digit());
        if numbered && !base.is_empty() {
            return base;
        }
    }
    id
}

/// `YYMM.NNNN(N)` or `archive(.subject)/YYMMNNN`.
fn is_arxiv_id(id: &str) -> bool {
    if let Some((yymm, number)) = id.split_once('.') {
        if yymm.len() == 4
            && yymm.bytes().all(|b| b.is_ascii_digit())
            && (4..=5).contains(&number.len())
            && number.bytes().all(|b| b.is_ascii_digit())
        {
            return true;
        }
    }
    match id.split_once('/') {
        Some((archive, number)) => {
            !archive.is_empty()
                && archive
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b == b'-' || b == b'.')
                && number.len() == 7
                && number.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Leading-token key for a title.
///
/// Lowercases, splits on anything that is not a letter or digit, and joins
/// the first [`TITLE_KEY_TOKENS`] tokens with single spaces. Returns `None`
/// for titles shorter than [`TITLE_KEY_MIN_TOKENS`] tokens, which are too
/// generic to identify a work.
pub fn title_key(title: &str) -> Option<String> {
    let lower = title.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .take(TITLE_KEY_TOKENS)
        .collect();
    (tokens.len() >= TITLE_KEY_MIN_TOKENS).then(|| tokens.join(" "))
}

/// A key under which two records are considered the same work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatchKey {
    /// Normalised DOI.
    Doi(String),
    /// Normalised arXiv id.
    Arxiv(String),
    /// Leading title tokens.
    Title(String),
}

/// Every match key `paper` can be found under.
pub fn match_keys(paper: &Paper) -> Vec<MatchKey> {
    let mut keys = Vec::with_capacity(3);
    let doi = paper.doi.as_deref().and_then(normalize_doi);

    if let Some(ref doi) = doi {
        keys.push(MatchKey::Doi(doi.clone()));
    }
    let arxiv = paper
        .arxiv_id
        .as_deref()
        .and_then(normalize_arxiv_id)
        .or_else(|| doi.as_deref().and_then(arxiv_id_from_doi));
    if let Some(arxiv) = arxiv {
        keys.push(MatchKey::Arxiv(arxiv));
    }
    if let Some(title) = title_key(&paper.title) {
        keys.push(MatchKey::Title(title));
    }
    keys
}
