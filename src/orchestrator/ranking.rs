//! Relevance gate and scoring for fused results.
//!
//! # Scoring Formula
//!
//! ```text
//! score = overlap * 100
//!       + citation_cap * min(1, ln(1 + citations) / ln(1 + CITATION_SATURATION))
//!       + recency_max * max(0, 1 - age_years / recency_cutoff_years)
//!       + source preference bonus
//!       + abstract bonus (abstract >= abstract_min_chars)
//! ```
//!
//! `overlap` is the fraction of core terms found as whole words (or whole
//! phrases) in title + abstract. Papers with zero overlap are dropped
//! before scoring. The `latest` strategy swaps in `latest_recency_max`,
//! the `cited` strategy swaps in `cited_citation_cap`.

use chrono::NaiveDate;

use crate::config::RankingConfig;
use crate::types::{Paper, QueryIntent, SearchStrategy};

/// Citation count at which the citation contribution reaches its cap.
pub const CITATION_SATURATION: f64 = 10_000.0;

/// Weight of the term-overlap ratio.
const OVERLAP_WEIGHT: f64 = 100.0;

/// Lower-case alphanumeric word split shared by terms and text.
fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Whether `phrase` occurs as a contiguous run of whole words in `text`.
fn contains_phrase(text: &[String], phrase: &[String]) -> bool {
    !phrase.is_empty() && text.windows(phrase.len()).any(|window| window == phrase)
}

/// Scores and orders fused papers for one intent.
#[derive(Debug, Clone, Default)]
pub struct Ranker {
    config: RankingConfig,
}

impl Ranker {
    /// Create a ranker with the given weights.
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    /// Gate, score and sort `papers` against today's date.
    pub fn rank(&self, papers: Vec<Paper>, intent: &QueryIntent) -> Vec<Paper> {
        self.rank_at(papers, intent, chrono::Utc::now().date_naive())
    }

    /// Gate, score and sort `papers`, measuring recency from `today`.
    ///
    /// Sorting is stable, so equal scores keep their fusion order.
    pub fn rank_at(
        &self,
        papers: Vec<Paper>,
        intent: &QueryIntent,
        today: NaiveDate,
    ) -> Vec<Paper> {
        let terms: Vec<Vec<String>> = intent
            .core_terms
            .iter()
            .map(|t| words(t))
            .filter(|t| !t.is_empty())
            .collect();

        let before = papers.len();
        let mut ranked: Vec<Paper> = papers
            .into_iter()
            .filter_map(|mut paper| {
                let overlap = term_overlap(&paper, &terms);
                if !terms.is_empty() && overlap == 0.0 {
                    return None;
                }
                paper.score = self.score(&paper, overlap, intent.strategy, today);
                Some(paper)
            })
            .collect();

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        tracing::debug!(
            input = before,
            kept = ranked.len(),
            gated = before - ranked.len(),
            "ranking complete"
        );
        ranked
    }

    fn score(
        &self,
        paper: &Paper,
        overlap: f64,
        strategy: SearchStrategy,
        today: NaiveDate,
    ) -> f64 {
        let citation_cap = match strategy {
            SearchStrategy::Cited => self.config.cited_citation_cap,
            _ => self.config.citation_cap,
        };
        let recency_max = match strategy {
            SearchStrategy::Latest => self.config.latest_recency_max,
            _ => self.config.recency_max,
        };

        let citations = citation_score(paper.citation_count, citation_cap);
        let recency = recency_score(
            paper.publication_date,
            today,
            recency_max,
            self.config.recency_cutoff_years,
        );
        let abstract_bonus = if paper.abstract_len() >= self.config.abstract_min_chars {
            self.config.abstract_bonus
        } else {
            0.0
        };

        overlap * OVERLAP_WEIGHT
            + citations
            + recency
            + paper.source.preference_bonus()
            + abstract_bonus
    }
}

/// Fraction of `terms` present in the paper's title and abstract.
fn term_overlap(paper: &Paper, terms: &[Vec<String>]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let mut text = words(&paper.title);
    if let Some(ref abstract_text) = paper.abstract_text {
        // Sentinel keeps phrases from spanning the title/abstract boundary.
        text.push(String::new());
        text.extend(words(abstract_text));
    }
    let matched = terms.iter().filter(|t| contains_phrase(&text, t)).count();
    matched as f64 / terms.len() as f64
}

/// Log-damped citation contribution, capped at `cap`.
pub fn citation_score(citations: Option<u64>, cap: f64) -> f64 {
    let Some(count) = citations else {
        return 0.0;
    };
    let damped = (count as f64).ln_1p() / CITATION_SATURATION.ln_1p();
    cap * damped.min(1.0)
}

/// Linear recency decay reaching zero at `cutoff_years`.
pub fn recency_score(
    published: Option<NaiveDate>,
    today: NaiveDate,
    max: f64,
    cutoff_years: f64,
) -> f64 {
    let Some(published) = published else {
        return 0.0;
    };
    let age_years = ((today - published).num_days().max(0) as f64) / 365.25;
    if age_years >= cutoff_years {
        return 0.0;
    }
    max * (1.0 - age_years / cutoff_years)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IntentType, SourceId};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn today() -> NaiveDate {
        date(2026, 1, 1)
    }

    fn intent(terms: &[&str], strategy: SearchStrategy) -> QueryIntent {
        QueryIntent {
            intent_type: IntentType::PaperSearch,
            core_terms: terms.iter().map(|t| (*t).to_owned()).collect(),
            field_of_study: "general".into(),
            temporal_focus: None,
            author_hint: None,
            venue_hint: None,
            strategy,
        }
    }

    fn paper(id: &str, title: &str) -> Paper {
        Paper::new(id, title, SourceId::OpenAlex, format!("https://openalex.org/{id}"))
    }

    #[test]
    fn gate_drops_papers_without_term_matches() {
        let ranker = Ranker::default();
        let papers = vec![
            paper("1", "Crowd Counting via Density Maps"),
            paper("2", "Protein Folding with Transformers"),
            paper("3", "Crowded Scenes Revisited"),
        ];
        let ranked = ranker.rank_at(
            papers,
            &intent(&["crowd counting"], SearchStrategy::Comprehensive),
            today(),
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "1");
    }

    #[test]
    fn gate_matches_whole_words_not_substrings() {
        let ranker = Ranker::default();
        let ranked = ranker.rank_at(
            vec![paper("1", "Transformation of Data"), paper("2", "A Transformer Model")],
            &intent(&["transformer"], SearchStrategy::Comprehensive),
            today(),
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "2");
    }

    #[test]
    fn gate_checks_abstract_too() {
        let ranker = Ranker::default();
        let mut p = paper("1", "A Short Title");
        p.abstract_text = Some("We study self-supervised learning at scale.".into());
        let ranked = ranker.rank_at(
            vec![p],
            &intent(&["self supervised"], SearchStrategy::Comprehensive),
            today(),
        );
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn phrases_do_not_span_title_and_abstract() {
        let ranker = Ranker::default();
        let mut p = paper("1", "Notes on Crowd");
        p.abstract_text = Some("Counting sheep.".into());
        let ranked = ranker.rank_at(
            vec![p],
            &intent(&["crowd counting"], SearchStrategy::Comprehensive),
            today(),
        );
        assert!(ranked.is_empty());
    }

    #[test]
    fn empty_terms_disable_gate() {
        let ranker = Ranker::default();
        let ranked = ranker.rank_at(
            vec![paper("1", "Anything"), paper("2", "Else")],
            &intent(&[], SearchStrategy::Comprehensive),
            today(),
        );
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn higher_overlap_ranks_first() {
        let ranker = Ranker::default();
        let ranked = ranker.rank_at(
            vec![
                paper("partial", "Graph Methods"),
                paper("full", "Graph Neural Networks for Molecules"),
            ],
            &intent(&["graph", "neural networks"], SearchStrategy::Comprehensive),
            today(),
        );
        assert_eq!(ranked[0].id, "full");
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn citation_score_is_damped_and_capped() {
        assert_eq!(citation_score(None, 25.0), 0.0);
        assert_eq!(citation_score(Some(0), 25.0), 0.0);
        let hundred = citation_score(Some(100), 25.0);
        let thousand = citation_score(Some(1_000), 25.0);
        assert!(hundred > 0.0 && thousand > hundred);
        assert!(thousand - hundred < hundred);
        assert!((citation_score(Some(10_000_000), 25.0) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn recency_score_decays_to_zero() {
        let fresh = recency_score(Some(today()), today(), 15.0, 10.0);
        let older = recency_score(Some(date(2021, 1, 1)), today(), 15.0, 10.0);
        let ancient = recency_score(Some(date(1990, 1, 1)), today(), 15.0, 10.0);
        assert!((fresh - 15.0).abs() < f64::EPSILON);
        assert!(older > 0.0 && older < fresh);
        assert_eq!(ancient, 0.0);
        assert_eq!(recency_score(None, today(), 15.0, 10.0), 0.0);
        // Future-dated records count as brand new, never above max.
        let future = recency_score(Some(date(2027, 1, 1)), today(), 15.0, 10.0);
        assert!((future - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn latest_strategy_favours_recent_work() {
        let ranker = Ranker::default();
        let mut old = paper("old", "Crowd Counting Survey");
        old.publication_date = Some(date(2019, 1, 1));
        old.citation_count = Some(2_000);
        let mut new = paper("new", "Crowd Counting Survey Two");
        new.publication_date = Some(date(2025, 10, 1));

        let terms = ["crowd counting"];
        let balanced = ranker.rank_at(
            vec![old.clone(), new.clone()],
            &intent(&terms, SearchStrategy::Comprehensive),
            today(),
        );
        let latest =
            ranker.rank_at(vec![old, new], &intent(&terms, SearchStrategy::Latest), today());
        assert_eq!(balanced[0].id, "old");
        assert_eq!(latest[0].id, "new");
    }

    #[test]
    fn cited_strategy_favours_citations() {
        let ranker = Ranker::default();
        let mut cited = paper("cited", "Crowd Counting Classic");
        cited.publication_date = Some(date(2017, 1, 1));
        cited.citation_count = Some(5_000);
        let mut recent = paper("recent", "Crowd Counting Fresh");
        recent.publication_date = Some(date(2025, 12, 1));

        let terms = ["crowd counting"];
        let ranked =
            ranker.rank_at(vec![recent, cited], &intent(&terms, SearchStrategy::Cited), today());
        assert_eq!(ranked[0].id, "cited");
    }

    #[test]
    fn abstract_bonus_applies_above_threshold() {
        let ranker = Ranker::default();
        let mut rich = paper("rich", "Crowd Counting");
        rich.abstract_text = Some("x ".repeat(80));
        let bare = paper("bare", "Crowd Counting");
        let ranked = ranker.rank_at(
            vec![bare, rich],
            &intent(&["crowd"], SearchStrategy::Comprehensive),
            today(),
        );
        assert_eq!(ranked[0].id, "rich");
        assert!((ranked[0].score - ranked[1].score - 5.0).abs() < 1e-9);
    }

    #[test]
    fn ties_keep_input_order() {
        let ranker = Ranker::default();
        let papers: Vec<Paper> = (0..5).map(|i| paper(&i.to_string(), "Crowd Counting")).collect();
        let ranked = ranker.rank_at(
            papers,
            &intent(&["crowd"], SearchStrategy::Comprehensive),
            today(),
        );
        let ids: Vec<&str> = ranked.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn ranking_is_deterministic() {
        let ranker = Ranker::default();
        let mut a = paper("a", "Crowd Counting A");
        a.citation_count = Some(10);
        let mut b = paper("b", "Crowd Counting B");
        b.publication_date = Some(date(2024, 5, 5));
        let c = paper("c", "Crowd Counting C");
        let input = vec![a, b, c];
        let i = intent(&["crowd counting"], SearchStrategy::Comprehensive);
        let first = ranker.rank_at(input.clone(), &i, today());
        let second = ranker.rank_at(input, &i, today());
        assert_eq!(first, second);
    }
}
