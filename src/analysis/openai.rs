//! OpenAI-compatible vision chat client for nutrition estimation.
//!
//! Sends one chat completion per media group: a system prompt fixing the
//! reply schema, the caption as user text, and one `image_url` part per
//! photo in arrival order. The reply is expected to be a single JSON
//! document matching [`NutritionReport`], optionally wrapped in Markdown
//! code fences by the model.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::types::NutritionReport;

use super::{AnalysisError, Analyzer};

/// System prompt constraining the model to schema-shaped JSON output.
const INSTRUCTIONS: &str = r#"You are a helpful assistant who can estimate calories and macronutrients in food based on description or photos.
Answer in JSON with a following JSON schema:
----
{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "type": "object",
  "properties": {
    "foods": {
      "type": "array",
      "items": {
        "type": "object",
        "properties": {
          "description": { "type": "string" },
          "portion": { "type": "string" },
          "calories": { "type": "number" },
          "protein": { "type": "number" },
          "fat": { "type": "number" },
          "carbs": { "type": "number" }
        },
        "required": ["description", "portion", "calories", "protein", "fat", "carbs"]
      }
    },
    "total": {
      "type": "object",
      "properties": {
        "description": { "type": "string" },
        "portion": { "type": "string" },
        "calories": { "type": "number" },
        "protein": { "type": "number" },
        "fat": { "type": "number" },
        "carbs": { "type": "number" }
      },
      "required": ["description", "portion", "calories", "protein", "fat", "carbs"]
    }
  },
  "required": ["foods", "total"]
}
----
Answer only with JSON. Do not include any other information in your response.
"#;

// ============================================================================
// Wire Types
// ============================================================================

/// Chat completion request body.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

/// Chat message content: plain text, or multi-part for image attachments.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

/// Chat completion response body.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// Analyzer
// ============================================================================

/// Analyzer backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiAnalyzer {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiAnalyzer {
    /// Build a client from config. The API key is read from the environment
    /// variable named by `cfg.api_key_env`.
    pub fn from_config(cfg: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let api_key = std::env::var(&cfg.api_key_env).map_err(|_| {
            AnalysisError::Http(format!(
                "API key environment variable {} is not set",
                cfg.api_key_env
            ))
        })?;

        let mut builder = reqwest::Client::builder();
        // Request timeout is the collaborator's own policy; 0 disables it
        // and restores the original stall-forever behavior.
        if cfg.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(cfg.request_timeout_secs));
        }
        let http_client = builder
            .build()
            .map_err(|e| AnalysisError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            api_key,
        })
    }

    fn build_request(&self, caption: &str, image_urls: &[String]) -> ChatRequest {
        let images = image_urls
            .iter()
            .map(|url| ContentPart::ImageUrl {
                image_url: ImageUrl { url: url.clone() },
            })
            .collect();

        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(INSTRUCTIONS.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Text(caption.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Parts(images),
                },
            ],
        }
    }
}

/// Strip Markdown code fences the model may wrap around its JSON reply.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Parse a model reply into a nutrition report.
fn parse_reply(content: &str) -> Result<NutritionReport, AnalysisError> {
    let body = strip_code_fences(content);
    if body.is_empty() {
        return Err(AnalysisError::EmptyResponse);
    }
    serde_json::from_str(body).map_err(|e| AnalysisError::MalformedResponse(e.to_string()))
}

#[async_trait]
impl Analyzer for OpenAiAnalyzer {
    async fn analyze(
        &self,
        caption: &str,
        image_urls: &[String],
    ) -> Result<NutritionReport, AnalysisError> {
        let request = self.build_request(caption, image_urls);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %self.model, images = image_urls.len(), "sending analysis request");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalysisError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "analysis endpoint returned error status");
            return Err(AnalysisError::Http(format!(
                "status {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Http(format!("failed to read response body: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(AnalysisError::EmptyResponse)?;

        parse_reply(&content)
    }

    fn analyzer_name(&self) -> &str {
        "openai"
    }
}
