//! Language-model backed intent classification.
//!
//! [`IntentModel`] is the seam for any language-understanding service. The
//! shipped implementation, [`OpenAiIntentModel`], calls an OpenAI-compatible
//! Chat Completions endpoint with a fixed instruction schema and parses the
//! JSON object it returns.

use async_trait::async_trait;
use serde::Deserialize;

use super::heuristic::{clean_term, GENERAL_FIELD};
use crate::error::{Result, SearchError};
use crate::types::{IntentType, QueryIntent, SearchStrategy, TemporalFocus};

/// Instruction schema sent with every classification request.
pub const INSTRUCTIONS: &str = "You classify academic literature search queries. \
Reply with a single JSON object and nothing else, using these keys:\n\
\"intent_type\": one of paper_search, author_analysis, trend_analysis, recent_work, highly_cited, dataset_focused;\n\
\"core_terms\": array of topical search terms or phrases. Exclude temporal and structural words \
such as latest, recent, new, papers, research, survey of, and common words such as the;\n\
\"field_of_study\": short field label, or \"general\";\n\
\"temporal_focus\": \"recent\", a year such as 2021, a range such as \"2019-2023\", or null;\n\
\"author_hint\": author name or null;\n\
\"venue_hint\": journal or conference name or null;\n\
\"strategy\": one of latest, cited, comprehensive.";

/// A language-understanding service that turns a query into a [`QueryIntent`].
#[async_trait]
pub trait IntentModel: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Classify `query`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::IntentClassification`] if the service is
    /// unreachable or its output cannot be parsed.
    async fn classify(&self, query: &str) -> Result<QueryIntent>;
}

/// JSON shape the model is asked to produce. Every key is optional so that
/// partially filled answers still parse.
#[derive(Debug, Deserialize)]
struct RawIntent {
    #[serde(default)]
    intent_type: Option<String>,
    #[serde(default)]
    core_terms: Vec<String>,
    #[serde(default)]
    field_of_study: Option<String>,
    #[serde(default)]
    temporal_focus: Option<serde_json::Value>,
    #[serde(default, alias = "author")]
    author_hint: Option<String>,
    #[serde(default, alias = "venue")]
    venue_hint: Option<String>,
    #[serde(default)]
    strategy: Option<String>,
}

/// Strip Markdown code fences and surrounding prose, leaving the JSON object.
fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| {
            !v.is_empty() && !v.eq_ignore_ascii_case("null") && !v.eq_ignore_ascii_case("none")
        })
}

fn default_strategy(intent_type: IntentType) -> SearchStrategy {
    match intent_type {
        IntentType::RecentWork | IntentType::TrendAnalysis => SearchStrategy::Latest,
        IntentType::HighlyCited => SearchStrategy::Cited,
        _ => SearchStrategy::Comprehensive,
    }
}

/// Parse a model reply into a [`QueryIntent`].
///
/// Core terms are stop-word filtered again here: models do not reliably
/// follow the exclusion instruction, and adapters use the terms verbatim.
///
/// # Errors
///
/// Returns [`SearchError::IntentClassification`] if the reply holds no JSON
/// object, the object is malformed, or no topical term survives filtering.
pub fn parse_intent_reply(content: &str) -> Result<QueryIntent> {
    let json = extract_json_object(content)
        .ok_or_else(|| SearchError::IntentClassification("reply contains no JSON object".into()))?;
    let raw: RawIntent = serde_json::from_str(json)
        .map_err(|e| SearchError::IntentClassification(format!("malformed intent JSON: {e}")))?;

    let intent_type = match raw.intent_type.as_deref() {
        Some(value) => value.parse::<IntentType>().unwrap_or_else(|err| {
            tracing::debug!(%err, "unknown intent type from model, using paper_search");
            IntentType::PaperSearch
        }),
        None => IntentType::PaperSearch,
    };

    let mut core_terms: Vec<String> = Vec::with_capacity(raw.core_terms.len());
    for term in raw.core_terms.iter().filter_map(|t| clean_term(t)) {
        if !core_terms.contains(&term) {
            core_terms.push(term);
        }
    }
    if core_terms.is_empty() {
        return Err(SearchError::IntentClassification(
            "model returned no usable search terms".into(),
        ));
    }

    let temporal_focus = match raw.temporal_focus {
        Some(serde_json::Value::String(s)) => TemporalFocus::parse(&s),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .and_then(|y| i32::try_from(y).ok())
            .map(TemporalFocus::Year),
        _ => None,
    };

    let strategy = raw
        .strategy
        .as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| default_strategy(intent_type));

    Ok(QueryIntent {
        intent_type,
        core_terms,
        field_of_study: non_empty(raw.field_of_study)
            .map(|f| f.to_lowercase())
            .unwrap_or_else(|| GENERAL_FIELD.to_owned()),
        temporal_focus,
        author_hint: non_empty(raw.author_hint),
        venue_hint: non_empty(raw.venue_hint),
        strategy,
    })
}

/// OpenAI-compatible Chat Completions intent model.
pub struct OpenAiIntentModel {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for OpenAiIntentModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiIntentModel")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiIntentModel {
    /// Create a model client.
    ///
    /// `base_url` is the service root without `/v1`.
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    fn request_body(&self, query: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": INSTRUCTIONS },
                { "role": "user", "content": query },
            ],
        })
    }
}

/// Extract an error message from an OpenAI error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[async_trait]
impl IntentModel for OpenAiIntentModel {
    fn name(&self) -> &str {
        "openai"
    }

    async fn classify(&self, query: &str) -> Result<QueryIntent> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(query))
            .send()
            .await
            .map_err(|e| SearchError::IntentClassification(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::IntentClassification(format!(
                "HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body)
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SearchError::IntentClassification(format!("invalid response body: {e}")))?;
        let content = body
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                SearchError::IntentClassification("response has no message content".into())
            })?;

        parse_intent_reply(content)
    }
}
