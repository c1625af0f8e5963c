use std::time::Duration;

use crate::{
    error::ApiError,
    model::DraftingModel,
    prompt,
    stages::json::first_json_object,
    types::{AnswerMap, ChatRole, ChatTurn, JudgeReport, PetitionStructure},
};

const PETITION_MAX_TOKENS: u32 = 8192;
const REPORT_MAX_TOKENS: u32 = 6144;
const CHAT_MAX_TOKENS: u32 = 2048;

pub struct PetitionDraftInput<'a> {
    pub area: &'a str,
    pub doc_type: &'a str,
    pub facts: &'a str,
    pub summary: &'a str,
    pub theses: &'a [String],
    pub answers: &'a AnswerMap,
    pub structure: &'a PetitionStructure,
    pub custom_instructions: Option<&'a str>,
}

/// Final petition drafting. Long-form generation rather than the
/// JSON-constrained multimodal path: the output here is narrative prose,
/// and the `## ` marker convention is the contract the renderer consumes.
pub async fn generate_petition(
    drafter: &dyn DraftingModel,
    input: PetitionDraftInput<'_>,
    timeout: Duration,
) -> Result<String, ApiError> {
    let base = format!(
        "Você é um advogado brasileiro especialista em {area}, com 20 anos de experiência e \
excelência em redação de peças processuais.\n\
Redija a petição conforme a estrutura fornecida, usando linguagem jurídica formal, precisa e \
persuasiva.\n\
Fundamente cada argumento em doutrina e jurisprudência quando pertinente.\n\
A petição deve ser completa, coesa e pronta para protocolo.\n\
Área: {area}. Tipo: {doc_type}.\n\n\
Use a estrutura de seções com marcações claras como:\n\
## NOME DA SEÇÃO\n\
para cada seção principal da petição.",
        area = input.area,
        doc_type = input.doc_type,
    );
    let system = prompt::with_office_instructions(&base, input.custom_instructions);

    let structure_text = input
        .structure
        .sections
        .iter()
        .map(|s| {
            let subpoints = if s.subpoints.is_empty() {
                String::new()
            } else {
                format!("\n  - {}", s.subpoints.join("\n  - "))
            };
            format!("{}: {}{subpoints}", s.title, s.summary)
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    let parties_text = input
        .structure
        .parties
        .iter()
        .map(|(role, text)| format!("{role}: {text}"))
        .collect::<Vec<_>>()
        .join("\n");
    let relief_text = input
        .structure
        .relief_requested
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}. {p}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    let user = format!(
        "Redija a petição completa com base nas informações abaixo:\n\n\
ENDEREÇAMENTO: {forum}\n\
PARTES:\n{parties_text}\n\n\
FATOS DO CASO:\n{facts}\n\n\
RESUMO E TESES:\n{summary}\nTeses: {theses}\n\n\
INFORMAÇÕES COMPLEMENTARES:\n{answers}\n\n\
ESTRUTURA DA PETIÇÃO:\n{structure_text}\n\n\
PEDIDOS:\n{relief_text}\n\n\
Redija a petição completa, detalhada e pronta para protocolo.",
        forum = input.structure.forum,
        facts = input.facts,
        summary = input.summary,
        theses = input.theses.join("; "),
        answers = prompt::answers_text(input.answers),
    );

    let text = drafter
        .draft(
            &system,
            &[ChatTurn {
                role: ChatRole::User,
                content: user,
            }],
            PETITION_MAX_TOKENS,
            timeout,
        )
        .await
        .map_err(|e| ApiError::GenerationFailed(e.to_string()))?;
    if text.trim().is_empty() {
        return Err(ApiError::GenerationFailed("empty petition text".into()));
    }
    Ok(text)
}

pub struct JudgeReportInput<'a> {
    pub description: &'a str,
    pub petition_text: &'a str,
    pub summary: &'a str,
    pub impression: &'a str,
    pub answers: &'a AnswerMap,
    pub custom_instructions: Option<&'a str>,
}

/// Judge-report generation. The drafting model answers in prose-wrapped
/// JSON; the first balanced object is extracted and decoded, and anything
/// else is a `GenerationFailed`.
pub async fn generate_judge_report(
    drafter: &dyn DraftingModel,
    input: JudgeReportInput<'_>,
    timeout: Duration,
) -> Result<JudgeReport, ApiError> {
    let base = "Você é um juiz federal brasileiro com 25 anos de experiência. Analise a petição \
e os documentos apresentados com rigor técnico e imparcialidade total.\n\
Seu relatório deve identificar pontos fortes, pontos fracos e falhas argumentativas, lacunas \
probatórias, riscos de insucesso, e sugestões concretas de melhoria com trechos alternativos \
prontos para uso, além de uma avaliação geral de probabilidade de êxito com justificativa.\n\
Seja direto, técnico e construtivo. O advogado usará este relatório para melhorar sua peça.\n\
Retorne APENAS um JSON válido com esta estrutura:\n\
{\n\
  \"strengths\": [\"string\"],\n\
  \"weaknesses\": [\"string\"],\n\
  \"evidence_gaps\": [\"string\"],\n\
  \"risks\": [\"string\"],\n\
  \"success_outlook\": \"high|medium|low\",\n\
  \"outlook_rationale\": \"string\",\n\
  \"suggestions\": [{\"title\": \"string\", \"text\": \"string\"}]\n\
}";
    let system = prompt::with_office_instructions(base, input.custom_instructions);

    let user = format!(
        "DESCRIÇÃO DO CASO: {}\n\n\
RESUMO DA PETIÇÃO: {}\n\
IMPRESSÃO INICIAL: {}\n\n\
INFORMAÇÕES COMPLEMENTARES DO ADVOGADO:\n{}\n\n\
PETIÇÃO COMPLETA:\n{}",
        input.description,
        input.summary,
        input.impression,
        prompt::answers_text(input.answers),
        input.petition_text,
    );

    let text = drafter
        .draft(
            &system,
            &[ChatTurn {
                role: ChatRole::User,
                content: user,
            }],
            REPORT_MAX_TOKENS,
            timeout,
        )
        .await
        .map_err(|e| ApiError::GenerationFailed(e.to_string()))?;

    let block = first_json_object(&text)
        .ok_or_else(|| ApiError::GenerationFailed("no JSON object in report response".into()))?;
    serde_json::from_str(block)
        .map_err(|e| ApiError::GenerationFailed(format!("malformed report JSON: {e}")))
}

/// One intake-chat turn. `system_context` carries the session framing
/// (client, area, date, knowledge digest); `file_context` is the digested
/// or transcribed attachment for this turn, when present.
pub async fn chat_reply(
    drafter: &dyn DraftingModel,
    system_context: &str,
    history: &[ChatTurn],
    message: &str,
    file_context: Option<&str>,
    custom_instructions: Option<&str>,
    timeout: Duration,
) -> Result<String, ApiError> {
    let base = format!(
        "Você é um assistente jurídico especializado em escritórios de advocacia brasileiros. \
Você apoia o atendimento ao cliente e a equipe do escritório: análise jurídica preliminar do \
caso, orientação sobre direitos conforme a legislação brasileira, identificação de teses \
aplicáveis, propostas de honorários, quebra de objeções para fechamento de contratos, \
esclarecimento de dúvidas jurídicas e preparação de resumos de atendimento.\n\
Seja profissional, claro e empático. Lembre-se que o usuário está atendendo um cliente real.\n\n\
{system_context}"
    );
    let system = prompt::with_office_instructions(&base, custom_instructions);

    let mut turns: Vec<ChatTurn> = history.to_vec();
    let content = match file_context {
        Some(ctx) => format!("{message}\n\n[Documento anexado]:\n{ctx}"),
        None => message.to_string(),
    };
    turns.push(ChatTurn {
        role: ChatRole::User,
        content,
    });

    drafter
        .draft(&system, &turns, CHAT_MAX_TOKENS, timeout)
        .await
        .map_err(|e| ApiError::GenerationFailed(e.to_string()))
}
