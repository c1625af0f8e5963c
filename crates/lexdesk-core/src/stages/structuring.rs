use std::time::Duration;

use crate::{
    error::ApiError,
    model::{AnalysisModel, ContentPart},
    prompt,
    types::{AnswerMap, PetitionStructure},
};

pub struct StructureInput<'a> {
    pub facts: &'a str,
    pub area: &'a str,
    pub doc_type: &'a str,
    pub summary: &'a str,
    pub theses: &'a [String],
    pub answers: &'a AnswerMap,
    /// Knowledge context here supplies formatting precedent (how the office
    /// writes addressing lines and party qualifications), not legal content.
    pub knowledge_parts: Vec<ContentPart>,
    pub custom_instructions: Option<&'a str>,
}

/// Structuring stage: merges facts, analysis and questionnaire answers into
/// a document outline. A syntactically valid response with no sections is
/// still a failure — downstream generation needs at least one outline unit.
pub async fn build_structure(
    model: &dyn AnalysisModel,
    input: StructureInput<'_>,
    timeout: Duration,
) -> Result<PetitionStructure, ApiError> {
    let base = format!(
        "Com base nos fatos, nos documentos analisados e nas respostas estratégicas abaixo, gere \
a estrutura completa da petição de {doc_type} na área de {area}.\n\
Inclua: endereçamento, qualificação das partes, todos os tópicos com subtópicos relevantes e \
um resumo do que cada tópico conterá, e os pedidos finais.\n\
Siga as normas processuais brasileiras.\n\
Retorne APENAS um JSON válido: {{ \"forum\": \"endereçamento\", \"parties\": {{\"autor\": \"...\", \"reu\": \"...\"}}, \
\"sections\": [{{\"id\": \"1\", \"title\": \"string\", \"summary\": \"string\", \"subpoints\": [\"...\"]}}], \
\"relief_requested\": [\"pedido\"] }}",
        doc_type = input.doc_type,
        area = input.area,
    );
    let instructions = prompt::with_office_instructions(&base, input.custom_instructions);

    let mut parts = input.knowledge_parts;
    parts.push(ContentPart::text(format!(
        "{instructions}\n\nRESUMO DO CASO: {}\nTESES IDENTIFICADAS: {}\nFATOS: {}\nRESPOSTAS ESTRATÉGICAS:\n{}",
        input.summary,
        input.theses.join("; "),
        input.facts,
        prompt::answers_text(input.answers),
    )));

    let raw = model
        .generate_json(&parts, timeout)
        .await
        .map_err(|e| ApiError::StructuringFailed(e.to_string()))?;
    let structure: PetitionStructure = serde_json::from_str(&raw)
        .map_err(|e| ApiError::StructuringFailed(format!("malformed structure JSON: {e}")))?;
    if structure.sections.is_empty() {
        return Err(ApiError::StructuringFailed(
            "structure has no sections".into(),
        ));
    }
    Ok(structure)
}
