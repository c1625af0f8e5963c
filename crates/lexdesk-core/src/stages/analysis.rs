use std::collections::HashSet;
use std::time::Duration;

use crate::{
    error::ApiError,
    model::{AnalysisModel, ContentPart},
    prompt,
    types::{AnswerKind, InitialAnalysis, ReviewAnalysis, StrategicQuestion},
};

/// Shared JSON shape hint for strategic questions.
const QUESTION_SHAPE: &str = r#"{"id": 1, "prompt_text": "string", "answer_kind": "free_text|single_choice|multi_choice", "options": []}"#;

fn validate_questions(questions: &[StrategicQuestion]) -> Result<(), String> {
    if questions.is_empty() {
        return Err("no strategic questions in analysis".into());
    }
    let mut seen = HashSet::new();
    for question in questions {
        if !seen.insert(question.id) {
            return Err(format!("duplicate question id {}", question.id));
        }
        if question.prompt_text.trim().is_empty() {
            return Err(format!("question {} has empty prompt text", question.id));
        }
        if matches!(
            question.answer_kind,
            AnswerKind::SingleChoice | AnswerKind::MultiChoice
        ) && question.options.is_empty()
        {
            return Err(format!("choice question {} has no options", question.id));
        }
    }
    Ok(())
}

pub struct CaseAnalysisInput<'a> {
    pub facts: &'a str,
    pub area: &'a str,
    pub doc_type: &'a str,
    /// Tenant knowledge documents, already preprocessed. Injected first so
    /// house style and precedent frame everything that follows.
    pub knowledge_parts: Vec<ContentPart>,
    /// Case attachments, audio already transcribed.
    pub case_parts: Vec<ContentPart>,
    pub custom_instructions: Option<&'a str>,
}

/// Case-analysis stage: one multimodal JSON-constrained call producing a
/// summary, candidate theses and a 5–8 question strategic questionnaire.
/// Nothing partial ever leaves this function: any provider or shape failure
/// is an `AnalysisFailed`.
pub async fn analyze_case(
    model: &dyn AnalysisModel,
    input: CaseAnalysisInput<'_>,
    timeout: Duration,
) -> Result<InitialAnalysis, ApiError> {
    let base = format!(
        "Você é um especialista jurídico brasileiro. Analise os fatos e os documentos do caso \
de {area}, referente a {doc_type}.\n\
Extraia todas as informações relevantes, identifique as teses jurídicas aplicáveis e gere \
entre 5 e 8 perguntas estratégicas e objetivas que, quando respondidas pelo advogado, \
permitirão construir uma petição mais precisa, personalizada e com maior chance de êxito.\n\
As perguntas devem ser formuladas em linguagem simples, direta e jurídica quando necessário.\n\
Retorne APENAS um JSON válido com esta estrutura: \
{{ \"summary\": \"resumo do caso\", \"theses\": [\"tese\"], \"questions\": [{QUESTION_SHAPE}] }}",
        area = input.area,
        doc_type = input.doc_type,
    );
    let instructions = prompt::with_office_instructions(&base, input.custom_instructions);

    let mut parts = input.knowledge_parts;
    parts.extend(input.case_parts);
    parts.push(ContentPart::text(format!(
        "{instructions}\n\nFATOS DO CASO:\n{}",
        input.facts
    )));

    let raw = model
        .generate_json(&parts, timeout)
        .await
        .map_err(|e| ApiError::AnalysisFailed(e.to_string()))?;
    let analysis: InitialAnalysis = serde_json::from_str(&raw)
        .map_err(|e| ApiError::AnalysisFailed(format!("malformed analysis JSON: {e}")))?;
    validate_questions(&analysis.questions).map_err(ApiError::AnalysisFailed)?;
    Ok(analysis)
}

pub struct ReviewAnalysisInput<'a> {
    pub description: &'a str,
    pub petition_text: Option<&'a str>,
    /// The petition uploaded as a file, when no inline text was given.
    pub petition_parts: Vec<ContentPart>,
    pub case_parts: Vec<ContentPart>,
    pub knowledge_parts: Vec<ContentPart>,
    pub custom_instructions: Option<&'a str>,
}

/// Judge-review analysis stage: impartial read of a petition producing a
/// summary, first impression and a 4–6 question questionnaire.
pub async fn analyze_for_review(
    model: &dyn AnalysisModel,
    input: ReviewAnalysisInput<'_>,
    timeout: Duration,
) -> Result<ReviewAnalysis, ApiError> {
    let petition_section = match input.petition_text {
        Some(text) if !text.trim().is_empty() => format!("\nPETIÇÃO (texto):\n{text}"),
        _ if !input.petition_parts.is_empty() => {
            "\n[A petição foi enviada como arquivo acima]".to_string()
        }
        _ => String::new(),
    };

    let base = format!(
        "Você é um julgador experiente e imparcial do sistema jurídico brasileiro. Analise a \
petição apresentada e os documentos do caso.\n\
Avalie a coerência lógica, a fundamentação jurídica, a suficiência dos argumentos, as provas \
apresentadas e os pedidos formulados.\n\
Com base nesta análise, gere entre 4 e 6 perguntas estratégicas que, quando respondidas pelo \
advogado, permitirão um relatório de análise mais preciso e útil.\n\
Retorne APENAS um JSON válido: \
{{ \"summary\": \"resumo da petição\", \"impression\": \"impressão inicial\", \"questions\": [{QUESTION_SHAPE}] }}\n\n\
DESCRIÇÃO DO CASO: {description}{petition_section}",
        description = input.description,
    );
    let instructions = prompt::with_office_instructions(&base, input.custom_instructions);

    let mut parts = input.petition_parts;
    parts.extend(input.case_parts);
    parts.extend(input.knowledge_parts);
    parts.push(ContentPart::text(instructions));

    let raw = model
        .generate_json(&parts, timeout)
        .await
        .map_err(|e| ApiError::AnalysisFailed(e.to_string()))?;
    let analysis: ReviewAnalysis = serde_json::from_str(&raw)
        .map_err(|e| ApiError::AnalysisFailed(format!("malformed review analysis JSON: {e}")))?;
    validate_questions(&analysis.questions).map_err(ApiError::AnalysisFailed)?;
    Ok(analysis)
}
