use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Identity ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Lawyer,
    Assistant,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Lawyer => "lawyer",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "lawyer" => Some(Self::Lawyer),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub tenant_id: String,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// An authenticated caller already resolved to a tenant via the user index.
#[derive(Debug, Clone)]
pub struct Principal {
    pub uid: String,
    pub tenant_id: String,
    pub role: UserRole,
}

// ── Strategic questions & answers ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    FreeText,
    SingleChoice,
    MultiChoice,
}

impl Default for AnswerKind {
    fn default() -> Self {
        Self::FreeText
    }
}

/// A clarifying question generated by the analysis stage. Question ids are
/// small integers that stay stable for the lifetime of the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategicQuestion {
    pub id: u32,
    pub prompt_text: String,
    #[serde(default)]
    pub answer_kind: AnswerKind,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Text(String),
    Many(Vec<String>),
}

impl Answer {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Many(v) => v.is_empty() || v.iter().all(|s| s.trim().is_empty()),
        }
    }

    /// Flattened display form used when composing prompts.
    pub fn joined(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Many(v) => v.join(", "),
        }
    }
}

/// Question-id (as string) → answer. BTreeMap keeps prompt composition
/// deterministic.
pub type AnswerMap = BTreeMap<String, Answer>;

/// Checks that every question has a non-empty answer of the right shape and
/// that no answer references an unknown question id.
pub fn verify_answers(questions: &[StrategicQuestion], answers: &AnswerMap) -> Result<(), String> {
    for (key, answer) in answers {
        let Ok(id) = key.parse::<u32>() else {
            return Err(format!("answer key '{key}' is not a question id"));
        };
        let Some(question) = questions.iter().find(|q| q.id == id) else {
            return Err(format!("answer references unknown question {id}"));
        };
        match (question.answer_kind, answer) {
            (AnswerKind::MultiChoice, Answer::Text(_)) => {
                return Err(format!("question {id} expects a list of choices"));
            }
            (AnswerKind::FreeText | AnswerKind::SingleChoice, Answer::Many(_)) => {
                return Err(format!("question {id} expects a single value"));
            }
            _ => {}
        }
    }
    for question in questions {
        let answered = answers
            .get(&question.id.to_string())
            .map(|a| !a.is_empty())
            .unwrap_or(false);
        if !answered {
            return Err(format!("question {} is unanswered", question.id));
        }
    }
    Ok(())
}

// ── Petition pipeline ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PetitionStatus {
    Draft,
    Analyzing,
    Questions,
    Structuring,
    Generating,
    Completed,
    Error,
}

impl PetitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Analyzing => "analyzing",
            Self::Questions => "questions",
            Self::Structuring => "structuring",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "analyzing" => Some(Self::Analyzing),
            "questions" => Some(Self::Questions),
            "structuring" => Some(Self::Structuring),
            "generating" => Some(Self::Generating),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Result of the case-analysis stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialAnalysis {
    pub summary: String,
    pub theses: Vec<String>,
    pub questions: Vec<StrategicQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureSection {
    pub id: String,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub subpoints: Vec<String>,
}

/// Document outline produced by the structuring stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PetitionStructure {
    /// Court addressing line ("endereçamento").
    pub forum: String,
    /// Role ("autor", "reu", ...) → party qualification text.
    pub parties: BTreeMap<String, String>,
    pub sections: Vec<StructureSection>,
    pub relief_requested: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Petition {
    pub id: String,
    pub tenant_id: String,
    pub owner_id: String,
    pub title: String,
    pub area: String,
    pub doc_type: String,
    pub status: PetitionStatus,
    pub facts: String,
    pub attachment_refs: Vec<String>,
    pub analysis: Option<InitialAnalysis>,
    #[serde(default)]
    pub answers: AnswerMap,
    pub structure: Option<PetitionStructure>,
    pub content: Option<String>,
    pub docx_path: Option<String>,
    pub docx_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Judge review pipeline ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Analyzing,
    Questions,
    Generating,
    Completed,
    Error,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyzing => "analyzing",
            Self::Questions => "questions",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "analyzing" => Some(Self::Analyzing),
            "questions" => Some(Self::Questions),
            "generating" => Some(Self::Generating),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Result of the judge-review analysis stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewAnalysis {
    pub summary: String,
    pub impression: String,
    pub questions: Vec<StrategicQuestion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessOutlook {
    High,
    Medium,
    Low,
}

impl SuccessOutlook {
    /// Display label used in rendered reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::High => "Alta",
            Self::Medium => "Média",
            Self::Low => "Baixa",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeReport {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub evidence_gaps: Vec<String>,
    pub risks: Vec<String>,
    pub success_outlook: SuccessOutlook,
    pub outlook_rationale: String,
    pub suggestions: Vec<Suggestion>,
}

impl JudgeReport {
    /// Plain-text rendering with `## ` section markers, consumed by the
    /// document renderer.
    pub fn to_document_text(&self) -> String {
        fn bullets(items: &[String]) -> String {
            items
                .iter()
                .map(|i| format!("- {i}"))
                .collect::<Vec<_>>()
                .join("\n")
        }

        let mut s = String::new();
        s.push_str(&format!(
            "Probabilidade de êxito: {}\n{}\n\n",
            self.success_outlook.label(),
            self.outlook_rationale
        ));
        s.push_str(&format!("## PONTOS FORTES\n{}\n\n", bullets(&self.strengths)));
        s.push_str(&format!("## PONTOS FRACOS\n{}\n\n", bullets(&self.weaknesses)));
        s.push_str(&format!(
            "## LACUNAS PROBATÓRIAS\n{}\n\n",
            bullets(&self.evidence_gaps)
        ));
        s.push_str(&format!("## RISCOS DE INSUCESSO\n{}\n\n", bullets(&self.risks)));
        s.push_str("## SUGESTÕES DE MELHORIA\n");
        for suggestion in &self.suggestions {
            s.push_str(&format!("{}\n{}\n\n", suggestion.title, suggestion.text));
        }
        s.trim_end().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeReview {
    pub id: String,
    pub tenant_id: String,
    pub owner_id: String,
    pub description: String,
    pub petition_text: Option<String>,
    pub main_file_ref: Option<String>,
    pub attachment_refs: Vec<String>,
    pub status: ReviewStatus,
    pub analysis: Option<ReviewAnalysis>,
    #[serde(default)]
    pub answers: AnswerMap,
    pub report: Option<JudgeReport>,
    pub docx_path: Option<String>,
    pub docx_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Chat intake ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// One turn of a model conversation (also the wire shape for chat history).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub tenant_id: String,
    pub owner_id: String,
    pub client_name: String,
    pub area: String,
    pub status: String,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub report_path: Option<String>,
    pub report_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: String,
    pub role: ChatRole,
    pub content: String,
    pub file_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Structured intake report generated on demand from a chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReport {
    pub client_name: String,
    pub area: String,
    pub case_summary: String,
    pub legal_assessment: String,
    pub theses: Vec<String>,
    pub fee_proposal: Option<String>,
    pub next_steps: Vec<String>,
}

impl ChatReport {
    pub fn to_document_text(&self) -> String {
        fn numbered(items: &[String]) -> String {
            items
                .iter()
                .enumerate()
                .map(|(i, item)| format!("{}. {item}", i + 1))
                .collect::<Vec<_>>()
                .join("\n")
        }

        let mut s = format!(
            "Cliente: {}\nÁrea jurídica: {}\n\n## RESUMO DO CASO\n{}\n\n## ANÁLISE JURÍDICA PRELIMINAR\n{}\n\n## TESES IDENTIFICADAS\n{}\n\n",
            self.client_name,
            self.area,
            self.case_summary,
            self.legal_assessment,
            numbered(&self.theses),
        );
        if let Some(fee) = self.fee_proposal.as_deref().filter(|f| !f.trim().is_empty()) {
            s.push_str(&format!("## PROPOSTA DE HONORÁRIOS\n{fee}\n\n"));
        }
        s.push_str(&format!("## PRÓXIMOS PASSOS\n{}", numbered(&self.next_steps)));
        s
    }
}

// ── Knowledge base ───────────────────────────────────────────────────────

/// Area tag that applies to every legal area.
pub const GENERAL_AREA: &str = "geral";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub category: String,
    pub areas: Vec<String>,
    pub blob_ref: String,
    pub created_at: DateTime<Utc>,
}

// ── Tenant settings ──────────────────────────────────────────────────────

/// Per-tenant instruction overrides appended to the base stage prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiPrompts {
    pub petition_prompt: Option<String>,
    pub judge_prompt: Option<String>,
    pub chat_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfficeSettings {
    pub name: Option<String>,
    pub oab_number: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: u32, kind: AnswerKind) -> StrategicQuestion {
        StrategicQuestion {
            id,
            prompt_text: format!("pergunta {id}"),
            answer_kind: kind,
            options: match kind {
                AnswerKind::FreeText => Vec::new(),
                _ => vec!["a".into(), "b".into()],
            },
        }
    }

    #[test]
    fn verify_answers_accepts_full_coverage() {
        let questions = vec![
            question(1, AnswerKind::FreeText),
            question(2, AnswerKind::MultiChoice),
        ];
        let mut answers = AnswerMap::new();
        answers.insert("1".into(), Answer::Text("sim".into()));
        answers.insert("2".into(), Answer::Many(vec!["a".into()]));
        assert!(verify_answers(&questions, &answers).is_ok());
    }

    #[test]
    fn verify_answers_rejects_missing_question() {
        let questions = vec![question(1, AnswerKind::FreeText), question(2, AnswerKind::FreeText)];
        let mut answers = AnswerMap::new();
        answers.insert("1".into(), Answer::Text("sim".into()));
        let err = verify_answers(&questions, &answers).unwrap_err();
        assert!(err.contains("question 2"));
    }

    #[test]
    fn verify_answers_rejects_empty_answer() {
        let questions = vec![question(1, AnswerKind::FreeText)];
        let mut answers = AnswerMap::new();
        answers.insert("1".into(), Answer::Text("   ".into()));
        assert!(verify_answers(&questions, &answers).is_err());
    }

    #[test]
    fn verify_answers_rejects_unknown_key() {
        let questions = vec![question(1, AnswerKind::FreeText)];
        let mut answers = AnswerMap::new();
        answers.insert("1".into(), Answer::Text("sim".into()));
        answers.insert("9".into(), Answer::Text("extra".into()));
        assert!(verify_answers(&questions, &answers).is_err());
    }

    #[test]
    fn verify_answers_rejects_shape_mismatch() {
        let questions = vec![question(1, AnswerKind::MultiChoice)];
        let mut answers = AnswerMap::new();
        answers.insert("1".into(), Answer::Text("sim".into()));
        assert!(verify_answers(&questions, &answers).is_err());
    }

    #[test]
    fn answer_deserializes_untagged() {
        let single: Answer = serde_json::from_str("\"sim\"").unwrap();
        assert_eq!(single, Answer::Text("sim".into()));
        let many: Answer = serde_json::from_str("[\"a\",\"b\"]").unwrap();
        assert_eq!(many, Answer::Many(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn judge_report_text_has_all_sections() {
        let report = JudgeReport {
            strengths: vec!["clareza".into()],
            weaknesses: vec!["fundamentação".into()],
            evidence_gaps: vec!["perícia".into()],
            risks: vec!["prescrição".into()],
            success_outlook: SuccessOutlook::Medium,
            outlook_rationale: "provas incompletas".into(),
            suggestions: vec![Suggestion {
                title: "Reforçar pedido".into(),
                text: "Incluir jurisprudência do STJ.".into(),
            }],
        };
        let text = report.to_document_text();
        assert!(text.contains("## PONTOS FORTES"));
        assert!(text.contains("## SUGESTÕES DE MELHORIA"));
        assert!(text.contains("Média"));
    }
}
