//! Query Intent Classifier.
//!
//! [`IntentClassifier::classify`] tries the configured [`IntentModel`] under
//! a timeout and falls back to the deterministic [`heuristic`] on any
//! failure. It never fails.

pub mod heuristic;
pub mod llm;

use std::sync::Arc;
use std::time::Duration;

pub use heuristic::{is_stop_word, tokenize, GENERAL_FIELD, STOP_WORDS};
pub use llm::{parse_intent_reply, IntentModel, OpenAiIntentModel};

use crate::config::ClassifierConfig;
use crate::types::QueryIntent;

/// Turns free text into a [`QueryIntent`].
#[derive(Clone)]
pub struct IntentClassifier {
    model: Option<Arc<dyn IntentModel>>,
    timeout: Duration,
}

impl IntentClassifier {
    /// A classifier that only uses the heuristic.
    pub fn heuristic() -> Self {
        Self {
            model: None,
            timeout: Duration::ZERO,
        }
    }

    /// A classifier that asks `model` first, bounded by `timeout`.
    pub fn with_model(model: Arc<dyn IntentModel>, timeout: Duration) -> Self {
        Self {
            model: Some(model),
            timeout,
        }
    }

    /// Build from configuration.
    ///
    /// Falls back to heuristic-only when the model is disabled or no API key
    /// is available.
    pub fn from_config(config: &ClassifierConfig, client: reqwest::Client) -> Self {
        if !config.enabled {
            return Self::heuristic();
        }
        let Some(api_key) = config.api_key() else {
            tracing::warn!(
                env = %config.api_key_env,
                "intent model enabled but no API key set, using heuristic classifier"
            );
            return Self::heuristic();
        };
        let model = OpenAiIntentModel::new(client, &config.api_url, &config.api_model, api_key);
        Self::with_model(
            Arc::new(model),
            Duration::from_secs(config.timeout_seconds),
        )
    }

    /// Whether a language model is configured.
    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Classify `query`.
    pub async fn classify(&self, query: &str) -> QueryIntent {
        let Some(model) = &self.model else {
            return heuristic::classify(query);
        };

        match tokio::time::timeout(self.timeout, model.classify(query)).await {
            Ok(Ok(intent)) => {
                tracing::debug!(
                    model = model.name(),
                    intent_type = ?intent.intent_type,
                    terms = intent.core_terms.len(),
                    "intent classified"
                );
                intent
            }
            Ok(Err(err)) => {
                tracing::warn!(
                    model = model.name(),
                    error = %err,
                    "intent model failed, using heuristic"
                );
                heuristic::classify(query)
            }
            Err(_) => {
                tracing::warn!(
                    model = model.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "intent model timed out, using heuristic"
                );
                heuristic::classify(query)
            }
        }
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::heuristic()
    }
}

impl std::fmt::Debug for IntentClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentClassifier")
            .field("model", &self.model.as_ref().map(|m| m.name().to_owned()))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SearchError};
    use crate::types::{IntentType, SearchStrategy};
    use async_trait::async_trait;

    struct Scripted(std::result::Result<&'static str, &'static str>);

    #[async_trait]
    impl IntentModel for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn classify(&self, _query: &str) -> Result<QueryIntent> {
            match self.0 {
                Ok(reply) => parse_intent_reply(reply),
                Err(msg) => Err(SearchError::IntentClassification(msg.into())),
            }
        }
    }

    struct Stalled;

    #[async_trait]
    impl IntentModel for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn classify(&self, _query: &str) -> Result<QueryIntent> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(SearchError::IntentClassification("unreachable".into()))
        }
    }

    #[tokio::test]
    async fn heuristic_only_by_default() {
        let classifier = IntentClassifier::default();
        assert!(!classifier.has_model());
        let intent = classifier.classify("crowd counting papers recent").await;
        assert_eq!(intent.core_terms, vec!["crowd", "counting"]);
    }

    #[tokio::test]
    async fn uses_model_reply() {
        let classifier = IntentClassifier::with_model(
            Arc::new(Scripted(Ok(
                r#"{"intent_type":"highly_cited","core_terms":["crowd counting"]}"#,
            ))),
            Duration::from_secs(1),
        );
        let intent = classifier.classify("most cited crowd counting papers").await;
        assert_eq!(intent.intent_type, IntentType::HighlyCited);
        assert_eq!(intent.core_terms, vec!["crowd counting"]);
        assert_eq!(intent.strategy, SearchStrategy::Cited);
    }

    #[tokio::test]
    async fn falls_back_on_model_error() {
        let classifier = IntentClassifier::with_model(
            Arc::new(Scripted(Err("service unavailable"))),
            Duration::from_secs(1),
        );
        let intent = classifier.classify("graph neural networks").await;
        assert_eq!(intent, heuristic::classify("graph neural networks"));
    }

    #[tokio::test]
    async fn falls_back_on_unparsable_reply() {
        let classifier = IntentClassifier::with_model(
            Arc::new(Scripted(Ok("sorry, no JSON today"))),
            Duration::from_secs(1),
        );
        let intent = classifier.classify("diffusion models").await;
        assert_eq!(intent.core_terms, vec!["diffusion", "models"]);
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_on_timeout() {
        let classifier =
            IntentClassifier::with_model(Arc::new(Stalled), Duration::from_millis(50));
        let intent = classifier.classify("protein folding").await;
        assert_eq!(intent.core_terms, vec!["protein", "folding"]);
    }

    #[test]
    fn disabled_config_is_heuristic() {
        let classifier =
            IntentClassifier::from_config(&ClassifierConfig::default(), reqwest::Client::new());
        assert!(!classifier.has_model());
    }

    #[test]
    fn enabled_without_key_is_heuristic() {
        let config = ClassifierConfig {
            enabled: true,
            api_key_env: "SCHOLAR_SEARCH_TEST_UNSET_KEY".into(),
            ..Default::default()
        };
        let classifier = IntentClassifier::from_config(&config, reqwest::Client::new());
        assert!(!classifier.has_model());
    }
}
