//! Source Selector: maps a [`QueryIntent`] to an ordered [`SourceSelection`].
//!
//! Pure and deterministic. The rule table covers every [`IntentType`];
//! field-of-study keywords then add subject filters in each source's own
//! vocabulary (arXiv categories and Semantic Scholar fields of study).

use std::collections::BTreeMap;

use crate::intent::tokenize;
use crate::types::{IntentType, QueryIntent, SortKey, SourceConfig, SourceId, SourceSelection};

/// Caller options that shape a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionOptions {
    /// Requested number of results.
    pub limit: usize,
    /// Whether code-linked indexes may be queried.
    pub include_code_sources: bool,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            limit: 20,
            include_code_sources: true,
        }
    }
}

struct Rule {
    primary: &'static [SourceId],
    secondary: &'static [SourceId],
    sort: SortKey,
}

/// Balanced two-source selection.
const DEFAULT_RULE: Rule = Rule {
    primary: &[SourceId::SemanticScholar, SourceId::OpenAlex],
    secondary: &[SourceId::Arxiv],
    sort: SortKey::Relevance,
};

fn rule_for(intent_type: IntentType) -> Rule {
    match intent_type {
        IntentType::PaperSearch => DEFAULT_RULE,
        IntentType::AuthorAnalysis => Rule {
            primary: &[SourceId::SemanticScholar, SourceId::OpenAlex],
            secondary: &[],
            sort: SortKey::Citations,
        },
        IntentType::TrendAnalysis => Rule {
            primary: &[SourceId::OpenAlex, SourceId::Arxiv],
            secondary: &[SourceId::SemanticScholar],
            sort: SortKey::Date,
        },
        IntentType::RecentWork => Rule {
            primary: &[SourceId::Arxiv, SourceId::OpenAlex],
            secondary: &[SourceId::SemanticScholar],
            sort: SortKey::Date,
        },
        IntentType::HighlyCited => Rule {
            primary: &[SourceId::SemanticScholar],
            secondary: &[SourceId::OpenAlex],
            sort: SortKey::Citations,
        },
        IntentType::DatasetFocused => Rule {
            primary: &[SourceId::PapersWithCode, SourceId::Arxiv],
            secondary: &[SourceId::SemanticScholar],
            sort: SortKey::Relevance,
        },
    }
}

/// Intents where code-linked results would only add noise.
fn code_source_unwanted(intent_type: IntentType) -> bool {
    matches!(intent_type, IntentType::HighlyCited | IntentType::AuthorAnalysis)
}

/// Field keywords and the subject filters they imply.
struct FieldRule {
    keywords: &'static [&'static str],
    arxiv: &'static [&'static str],
    /// Semantic Scholar `fieldsOfStudy` value.
    field: &'static str,
}

const FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        keywords: &["computer vision", "image", "vision", "object detection", "segmentation"],
        arxiv: &["cs.CV"],
        field: "Computer Science",
    },
    FieldRule {
        keywords: &[
            "natural language processing",
            "nlp",
            "language model",
            "language models",
            "computational linguistics",
        ],
        arxiv: &["cs.CL"],
        field: "Computer Science",
    },
    FieldRule {
        keywords: &[
            "machine learning",
            "deep learning",
            "reinforcement learning",
            "neural network",
            "neural networks",
        ],
        arxiv: &["cs.LG", "stat.ML"],
        field: "Computer Science",
    },
    FieldRule {
        keywords: &["artificial intelligence"],
        arxiv: &["cs.AI"],
        field: "Computer Science",
    },
    FieldRule {
        keywords: &["robotics", "robot", "robots"],
        arxiv: &["cs.RO"],
        field: "Computer Science",
    },
    FieldRule {
        keywords: &["information retrieval", "recommender", "recommendation"],
        arxiv: &["cs.IR"],
        field: "Computer Science",
    },
    FieldRule {
        keywords: &["cryptography", "security", "privacy"],
        arxiv: &["cs.CR"],
        field: "Computer Science",
    },
    FieldRule {
        keywords: &["quantum"],
        arxiv: &["quant-ph"],
        field: "Physics",
    },
    FieldRule {
        keywords: &["astrophysics", "cosmology"],
        arxiv: &["astro-ph"],
        field: "Physics",
    },
    FieldRule {
        keywords: &["bioinformatics", "genomics", "biology"],
        arxiv: &["q-bio"],
        field: "Biology",
    },
    FieldRule {
        keywords: &["neuroscience"],
        arxiv: &["q-bio.NC"],
        field: "Medicine",
    },
    FieldRule {
        keywords: &["economics", "econometrics"],
        arxiv: &["econ"],
        field: "Economics",
    },
    FieldRule {
        keywords: &["statistics"],
        arxiv: &["stat"],
        field: "Mathematics",
    },
    FieldRule {
        keywords: &["mathematics", "algebra", "topology"],
        arxiv: &["math"],
        field: "Mathematics",
    },
];

/// First field rule whose keyword appears as a whole phrase in the intent's
/// field label or core terms.
fn field_rule(intent: &QueryIntent) -> Option<&'static FieldRule> {
    let mut words = tokenize(&intent.field_of_study);
    for term in &intent.core_terms {
        words.extend(tokenize(term));
    }
    let haystack = format!(" {} ", words.join(" "));
    FIELD_RULES.iter().find(|rule| {
        rule.keywords
            .iter()
            .any(|kw| haystack.contains(&format!(" {kw} ")))
    })
}

fn subjects_for(source: SourceId, field: Option<&FieldRule>) -> Vec<String> {
    let Some(field) = field else {
        return Vec::new();
    };
    match source {
        SourceId::Arxiv => field.arxiv.iter().map(|s| (*s).to_owned()).collect(),
        SourceId::SemanticScholar => vec![field.field.to_owned()],
        SourceId::OpenAlex | SourceId::PapersWithCode => Vec::new(),
    }
}

/// Choose sources and per-source configuration for `intent`.
pub fn select(intent: &QueryIntent, options: SelectionOptions) -> SourceSelection {
    let rule = rule_for(intent.intent_type);
    let keep = |s: &SourceId| options.include_code_sources || !s.is_code_source();

    let primary: Vec<SourceId> = rule.primary.iter().copied().filter(keep).collect();
    let mut secondary: Vec<SourceId> = rule.secondary.iter().copied().filter(keep).collect();

    if options.include_code_sources
        && !code_source_unwanted(intent.intent_type)
        && !primary.contains(&SourceId::PapersWithCode)
        && !secondary.contains(&SourceId::PapersWithCode)
    {
        secondary.push(SourceId::PapersWithCode);
    }

    let limit = options.limit.max(1);
    let secondary_limit = (limit / 2).max(1);
    let field = field_rule(intent);

    let mut configs = BTreeMap::new();
    for (sources, per_source_limit) in [(&primary, limit), (&secondary, secondary_limit)] {
        for source in sources.iter() {
            configs.insert(
                *source,
                SourceConfig {
                    limit: per_source_limit,
                    sort: rule.sort,
                    subjects: subjects_for(*source, field),
                },
            );
        }
    }

    SourceSelection {
        primary,
        secondary,
        configs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SearchStrategy;

    fn intent(intent_type: IntentType, terms: &[&str], field: &str) -> QueryIntent {
        QueryIntent {
            intent_type,
            core_terms: terms.iter().map(|t| (*t).to_owned()).collect(),
            field_of_study: field.into(),
            temporal_focus: None,
            author_hint: None,
            venue_hint: None,
            strategy: SearchStrategy::Comprehensive,
        }
    }

    #[test]
    fn every_intent_selects_something() {
        for include_code_sources in [true, false] {
            for intent_type in IntentType::all() {
                let selection = select(
                    &intent(*intent_type, &["topic"], "general"),
                    SelectionOptions {
                        limit: 10,
                        include_code_sources,
                    },
                );
                assert!(!selection.primary.is_empty(), "{intent_type:?}");
                for source in selection.sources() {
                    assert!(selection.config_for(source).is_some());
                }
                assert_eq!(selection.configs.len(), selection.sources().count());
            }
        }
    }

    #[test]
    fn selection_is_deterministic() {
        let i = intent(IntentType::RecentWork, &["crowd counting"], "computer vision");
        let a = select(&i, SelectionOptions::default());
        let b = select(&i, SelectionOptions::default());
        assert_eq!(a, b);
    }

    #[test]
    fn recent_work_prefers_preprints_sorted_by_date() {
        let selection = select(
            &intent(IntentType::RecentWork, &["diffusion"], "general"),
            SelectionOptions::default(),
        );
        assert_eq!(selection.primary, vec![SourceId::Arxiv, SourceId::OpenAlex]);
        assert_eq!(selection.secondary[0], SourceId::SemanticScholar);
        assert_eq!(
            selection.config_for(SourceId::Arxiv).map(|c| c.sort),
            Some(SortKey::Date)
        );
    }

    #[test]
    fn highly_cited_uses_citation_index() {
        let selection = select(
            &intent(IntentType::HighlyCited, &["transformers"], "general"),
            SelectionOptions::default(),
        );
        assert_eq!(selection.primary, vec![SourceId::SemanticScholar]);
        assert!(!selection.contains(SourceId::PapersWithCode));
        assert_eq!(
            selection.config_for(SourceId::SemanticScholar).map(|c| c.sort),
            Some(SortKey::Citations)
        );
    }

    #[test]
    fn dataset_focused_leads_with_code_index() {
        let selection = select(
            &intent(IntentType::DatasetFocused, &["imagenet"], "general"),
            SelectionOptions::default(),
        );
        assert_eq!(
            selection.primary,
            vec![SourceId::PapersWithCode, SourceId::Arxiv]
        );
    }

    #[test]
    fn code_sources_can_be_excluded() {
        for intent_type in IntentType::all() {
            let selection = select(
                &intent(*intent_type, &["topic"], "general"),
                SelectionOptions {
                    limit: 10,
                    include_code_sources: false,
                },
            );
            assert!(!selection.contains(SourceId::PapersWithCode));
        }
    }

    #[test]
    fn code_source_appended_as_secondary() {
        let selection = select(
            &intent(IntentType::PaperSearch, &["topic"], "general"),
            SelectionOptions::default(),
        );
        assert_eq!(selection.primary, vec![SourceId::SemanticScholar, SourceId::OpenAlex]);
        assert_eq!(
            selection.secondary,
            vec![SourceId::Arxiv, SourceId::PapersWithCode]
        );
    }

    #[test]
    fn secondary_sources_get_smaller_limits() {
        let selection = select(
            &intent(IntentType::PaperSearch, &["topic"], "general"),
            SelectionOptions {
                limit: 20,
                include_code_sources: false,
            },
        );
        assert_eq!(selection.config_for(SourceId::OpenAlex).map(|c| c.limit), Some(20));
        assert_eq!(selection.config_for(SourceId::Arxiv).map(|c| c.limit), Some(10));
    }

    #[test]
    fn field_keywords_add_subject_filters() {
        let selection = select(
            &intent(IntentType::RecentWork, &["crowd counting"], "computer vision"),
            SelectionOptions::default(),
        );
        assert_eq!(
            selection.config_for(SourceId::Arxiv).map(|c| c.subjects.clone()),
            Some(vec!["cs.CV".to_owned()])
        );
        assert_eq!(
            selection
                .config_for(SourceId::SemanticScholar)
                .map(|c| c.subjects.clone()),
            Some(vec!["Computer Science".to_owned()])
        );
    }

    #[test]
    fn field_keywords_match_whole_words_only() {
        let selection = select(
            &intent(IntentType::PaperSearch, &["imagery"], "general"),
            SelectionOptions::default(),
        );
        assert!(selection
            .configs
            .values()
            .all(|c| c.subjects.is_empty()));
    }
}
