use std::time::Duration;

use async_trait::async_trait;
use lexdesk_core::model::{DraftingModel, ModelError};
use lexdesk_core::types::{ChatRole, ChatTurn};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Long-form drafting client over the Anthropic Messages REST API. Used for
/// the final-document stages, where output is narrative prose and the
/// larger context/output budget matters.
pub struct ClaudeClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl ClaudeClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.anthropic.com".into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl DraftingModel for ClaudeClient {
    async fn draft(
        &self,
        system: &str,
        turns: &[ChatTurn],
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<String, ModelError> {
        let messages: Vec<WireMessage> = turns
            .iter()
            .map(|t| WireMessage {
                role: match t.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                },
                content: t.content.clone(),
            })
            .collect();

        let body = MessagesRequest {
            model: &self.model,
            max_tokens,
            system,
            messages,
        };

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));

        info!(model = %self.model, turns = turns.len(), max_tokens, "calling anthropic messages");

        let response = match self
            .client
            .post(&url)
            .timeout(timeout)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!(model = %self.model, "anthropic request timed out");
                return Err(ModelError::Timeout(timeout.as_secs()));
            }
            Err(e) => return Err(ModelError::Transport(e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(model = %self.model, status = %status, "anthropic returned non-200");
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Transport(format!("invalid anthropic response: {e}")))?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(ModelError::Empty);
        }
        Ok(text)
    }
}

// ── Wire types ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<WireMessage>,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}
