use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::ChatTurn;

/// One piece of a multimodal request, in request order.
#[derive(Debug, Clone)]
pub enum ContentPart {
    Text(String),
    /// Raw bytes with their IANA media type (PDF, image, audio).
    Inline { media_type: String, data: Vec<u8> },
}

impl ContentPart {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model call timed out after {0}s")]
    Timeout(u64),

    #[error("model returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model transport error: {0}")]
    Transport(String),

    #[error("model returned an empty response")]
    Empty,
}

/// Multimodal analysis capability: accepts interleaved text and binary parts
/// and answers either with JSON (structured stages) or free text
/// (transcription, document digestion). Constructed once at startup and
/// injected into stages; substitutable by a fake in tests.
#[async_trait]
pub trait AnalysisModel: Send + Sync {
    /// Single-shot call constrained to a JSON response body.
    async fn generate_json(
        &self,
        parts: &[ContentPart],
        timeout: Duration,
    ) -> Result<String, ModelError>;

    /// Single-shot free-text call over the same part kinds.
    async fn generate_text(
        &self,
        parts: &[ContentPart],
        timeout: Duration,
    ) -> Result<String, ModelError>;
}

/// Long-form text generation capability used for final-document stages,
/// where narrative coherence matters more than output-shape constraints.
#[async_trait]
pub trait DraftingModel: Send + Sync {
    async fn draft(
        &self,
        system: &str,
        turns: &[ChatTurn],
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<String, ModelError>;
}
