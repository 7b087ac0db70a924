//! AI reasoning collector (§6, optional): accepts a structured prompt
//! describing the current training summary and returns a candidate
//! predicate in the structured predicate grammar. Absence of this
//! collaborator does not degrade correctness — the Discoverer falls back
//! to its template sweep.
//!
//! Grounded on `llm::anthropic::AnthropicEstimator` for the Messages-API
//! request/response shape.

use async_trait::async_trait;
use chrono::Duration;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Collector, CollectorRequest};
use crate::catalog::predicate::parse_proposed;
use crate::types::CoreError;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    system: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

const SYSTEM_PROMPT: &str = r#"You propose a single candidate predicate over NFL pregame features.
Respond with only a JSON object of the form {"comparisons":[{"field":"...","operator":"...","value":0.0}, ...]}.
No prose, no markdown fences."#;

pub struct AiReasoningCollector {
    client: Client,
    api_key: String,
}

impl AiReasoningCollector {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { client: Client::new(), api_key: api_key.into() }
    }
}

#[async_trait]
impl Collector for AiReasoningCollector {
    fn key(&self) -> &'static str {
        "ai_reasoning"
    }

    /// Fetch a candidate predicate. On malformed output this returns a
    /// "no proposal" value rather than an error — the caller (Discoverer)
    /// treats an absent proposal the same as a disabled collaborator.
    async fn fetch(&self, request: &CollectorRequest) -> Result<serde_json::Value, CoreError> {
        let summary = request.get("training_summary").ok_or_else(|| {
            CoreError::Config("ai_reasoning request missing training_summary".into())
        })?;

        let body = MessagesRequest {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 512,
            messages: vec![Message { role: "user".to_string(), content: summary.to_string() }],
            system: SYSTEM_PROMPT.to_string(),
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::TransientSource { source: "ai_reasoning".into(), message: e.to_string() })?;

        if !response.status().is_success() {
            return Err(CoreError::PermanentSource { source: "ai_reasoning".into(), message: response.status().to_string() });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| CoreError::PermanentSource { source: "ai_reasoning".into(), message: e.to_string() })?;

        let text = parsed.content.into_iter().find_map(|b| b.text).unwrap_or_default();
        let raw: serde_json::Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(_) => {
                warn!("ai_reasoning response was not valid JSON, treating as no proposal");
                return Ok(serde_json::json!({ "proposed": null }));
            }
        };

        match parse_proposed(&raw) {
            Some(predicate) => Ok(serde_json::json!({ "proposed": predicate.canonical_form() })),
            None => {
                warn!("ai_reasoning proposal failed predicate validation, discarding silently");
                Ok(serde_json::json!({ "proposed": null }))
            }
        }
    }

    fn ttl(&self, _request: &CollectorRequest) -> Duration {
        Duration::zero()
    }
}
