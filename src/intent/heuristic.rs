//! Deterministic fallback classifier and the shared stop-word list.

use crate::types::{IntentType, QueryIntent, SearchStrategy};

/// Maximum number of core terms the heuristic keeps.
pub const MAX_HEURISTIC_TERMS: usize = 3;

/// Field-of-study label used when nothing more specific is known.
pub const GENERAL_FIELD: &str = "general";

/// Words that carry no topical signal for upstream search endpoints.
///
/// Temporal ("latest", "recent"), structural ("papers", "survey of") and
/// common English words. Sorted so lookups can binary-search.
pub const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "an", "and", "any", "are", "article", "articles", "as", "at",
    "be", "before", "best", "between", "by", "can", "cited", "current", "did", "do", "does",
    "during", "each", "find", "for", "from", "get", "give", "has", "have", "how", "i", "in",
    "influential", "into", "is", "it", "its", "last", "latest", "list", "me", "most", "my",
    "new", "newest", "of", "on", "or", "over", "paper", "papers", "past", "popular",
    "publication", "publications", "recent", "recently", "regarding", "related", "research",
    "search", "show", "some", "studies", "study", "than", "that", "the", "their", "these",
    "this", "those", "to", "top", "using", "was", "were", "what", "when", "where", "which",
    "who", "why", "with", "work", "works", "year", "years",
];

/// Whether `word` (already lower-cased) is a stop word.
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.binary_search(&word).is_ok()
}

/// Lower-case `text` and split it into word tokens.
///
/// Hyphens inside a word are kept (`"self-supervised"`); every other
/// non-alphanumeric character separates tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .map(|t| t.trim_matches('-'))
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Classify `query` without any external service.
///
/// Keeps up to [`MAX_HEURISTIC_TERMS`] non-stop-word tokens longer than two
/// characters. Everything else takes its default: paper search, general
/// field, comprehensive strategy. Never fails.
pub fn classify(query: &str) -> QueryIntent {
    let mut core_terms: Vec<String> = Vec::with_capacity(MAX_HEURISTIC_TERMS);
    for token in tokenize(query) {
        if core_terms.len() == MAX_HEURISTIC_TERMS {
            break;
        }
        if token.chars().count() > 2 && !is_stop_word(&token) && !core_terms.contains(&token) {
            core_terms.push(token);
        }
    }

    QueryIntent {
        intent_type: IntentType::PaperSearch,
        core_terms,
        field_of_study: GENERAL_FIELD.to_owned(),
        temporal_focus: None,
        author_hint: None,
        venue_hint: None,
        strategy: SearchStrategy::Comprehensive,
    }
}

/// Remove stop words from a (possibly multi-word) term.
///
/// Returns `None` when nothing topical remains.
pub fn clean_term(term: &str) -> Option<String> {
    let words: Vec<String> = tokenize(term)
        .into_iter()
        .filter(|w| !is_stop_word(w))
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}
