use std::time::Duration;

use crate::{
    error::ApiError,
    model::{AnalysisModel, ContentPart},
    types::{ChatReport, ChatRole, ChatTurn},
};

/// On-demand structured intake report over a full chat history.
pub async fn generate_chat_report(
    model: &dyn AnalysisModel,
    client_name: &str,
    area: &str,
    messages: &[ChatTurn],
    timeout: Duration,
) -> Result<ChatReport, ApiError> {
    let conversation = messages
        .iter()
        .map(|m| {
            let speaker = match m.role {
                ChatRole::User => "ADVOGADO",
                ChatRole::Assistant => "IA",
            };
            format!("{speaker}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let instructions = format!(
        "Gere um relatório estruturado de atendimento jurídico com base na conversa abaixo.\n\
Retorne APENAS um JSON válido: {{ \"client_name\": \"string\", \"area\": \"string\", \
\"case_summary\": \"string\", \"legal_assessment\": \"string\", \"theses\": [\"string\"], \
\"fee_proposal\": \"string ou null\", \"next_steps\": [\"string\"] }}\n\n\
CLIENTE: {client_name}\n\
ÁREA: {area}\n\
CONVERSA:\n{conversation}"
    );

    let raw = model
        .generate_json(&[ContentPart::text(instructions)], timeout)
        .await
        .map_err(|e| ApiError::GenerationFailed(e.to_string()))?;
    serde_json::from_str(&raw)
        .map_err(|e| ApiError::GenerationFailed(format!("malformed chat report JSON: {e}")))
}
