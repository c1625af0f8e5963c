use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use lexdesk_core::model::{AnalysisModel, ContentPart, ModelError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Multimodal analysis client over the Gemini `generateContent` REST API.
/// Handles the JSON-constrained structured stages and free-text calls
/// (transcription, document digestion). One instance lives for the whole
/// process and is injected wherever the capability is needed.
pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn generate(
        &self,
        parts: &[ContentPart],
        response_mime_type: Option<&str>,
        timeout: Duration,
    ) -> Result<String, ModelError> {
        let wire_parts: Vec<WirePart> = parts
            .iter()
            .map(|p| match p {
                ContentPart::Text(text) => WirePart {
                    text: Some(text.clone()),
                    inline_data: None,
                },
                ContentPart::Inline { media_type, data } => WirePart {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: media_type.clone(),
                        data: base64::engine::general_purpose::STANDARD.encode(data),
                    }),
                },
            })
            .collect();

        let body = GenerateRequest {
            contents: vec![Content { parts: wire_parts }],
            generation_config: response_mime_type.map(|mime| GenerationConfig {
                response_mime_type: mime.to_string(),
            }),
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key,
        );

        info!(model = %self.model, parts = parts.len(), "calling gemini generateContent");

        let response = match self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!(model = %self.model, "gemini request timed out");
                return Err(ModelError::Timeout(timeout.as_secs()));
            }
            Err(e) => return Err(ModelError::Transport(e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(model = %self.model, status = %status, "gemini returned non-200");
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Transport(format!("invalid gemini response: {e}")))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ModelError::Empty);
        }
        Ok(text)
    }
}

#[async_trait]
impl AnalysisModel for GeminiClient {
    async fn generate_json(
        &self,
        parts: &[ContentPart],
        timeout: Duration,
    ) -> Result<String, ModelError> {
        self.generate(parts, Some("application/json"), timeout).await
    }

    async fn generate_text(
        &self,
        parts: &[ContentPart],
        timeout: Duration,
    ) -> Result<String, ModelError> {
        self.generate(parts, None, timeout).await
    }
}

// ── Wire types ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<WirePart>,
}

#[derive(Serialize)]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}
