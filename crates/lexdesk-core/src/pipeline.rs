use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    attachments,
    blob::BlobStore,
    config::Config,
    error::ApiError,
    knowledge,
    model::{AnalysisModel, ContentPart, DraftingModel},
    ratelimit::{self, actions},
    render::{DocumentRenderer, DocumentSpec, DOCX_CONTENT_TYPE},
    stages::{
        analysis::{self, CaseAnalysisInput, ReviewAnalysisInput},
        drafting::{self, JudgeReportInput, PetitionDraftInput},
        report, structuring,
    },
    store::{new_id, Store},
    types::{
        verify_answers, AnswerMap, ChatReport, ChatRole, ChatSession, ChatTurn, InitialAnalysis,
        JudgeReport, JudgeReview, OfficeSettings, Petition, PetitionStatus, PetitionStructure,
        Principal, ReviewAnalysis, ReviewStatus,
    },
};

// ── Request / response payloads ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreatePetitionRequest {
    pub title: String,
    pub area: String,
    pub doc_type: String,
    #[serde(default)]
    pub facts: String,
    #[serde(default)]
    pub attachment_refs: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeCaseRequest {
    pub facts: String,
    #[serde(default)]
    pub attachment_refs: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct BuildStructureRequest {
    pub answers: AnswerMap,
}

#[derive(Debug, Serialize)]
pub struct GeneratedDocument {
    pub text: String,
    pub document_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub description: String,
    #[serde(default)]
    pub petition_text: Option<String>,
    #[serde(default)]
    pub main_file_ref: Option<String>,
    #[serde(default)]
    pub attachment_refs: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeReviewRequest {
    pub description: String,
    #[serde(default)]
    pub petition_text: Option<String>,
    #[serde(default)]
    pub main_file_ref: Option<String>,
    #[serde(default)]
    pub attachment_refs: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateReviewRequest {
    pub answers: AnswerMap,
}

#[derive(Debug, Serialize)]
pub struct GeneratedReview {
    pub report: JudgeReport,
    pub document_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateChatSessionRequest {
    pub client_name: String,
    pub area: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatTurnRequest {
    pub message: String,
    #[serde(default)]
    pub attachment_ref: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub message_id: i64,
}

#[derive(Debug, Serialize)]
pub struct GeneratedChatReport {
    pub report: ChatReport,
    pub document_url: String,
}

// ── Orchestrator ──────────────────────────────────────────────────────────

/// The pipeline orchestrator: the only component that mutates persisted
/// pipeline status. Every stage call is a stateless request-response
/// invocation; status is written after the stage succeeds (or flipped to
/// `error` when it throws), so a reader never observes a status claiming
/// work that didn't finish. Concurrent advancement calls on the same record
/// are last-write-wins.
pub struct Pipeline {
    pub store: Arc<Store>,
    pub blobs: Arc<dyn BlobStore>,
    pub analyst: Arc<dyn AnalysisModel>,
    pub drafter: Arc<dyn DraftingModel>,
    /// Lighter drafting capability used for chat turns.
    pub chat_drafter: Arc<dyn DraftingModel>,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub config: Arc<Config>,
}

impl Pipeline {
    pub fn new(
        store: Arc<Store>,
        blobs: Arc<dyn BlobStore>,
        analyst: Arc<dyn AnalysisModel>,
        drafter: Arc<dyn DraftingModel>,
        chat_drafter: Arc<dyn DraftingModel>,
        renderer: Arc<dyn DocumentRenderer>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            blobs,
            analyst,
            drafter,
            chat_drafter,
            renderer,
            config,
        }
    }

    fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.config.analysis_timeout_s)
    }

    fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.config.generation_timeout_s)
    }

    fn office(&self, tenant_id: &str) -> Option<OfficeSettings> {
        self.store.get_office(tenant_id).ok().flatten()
    }

    /// Renders `body` and uploads the artifact, returning (path, signed URL).
    /// A render failure after successful text generation is a stage failure:
    /// there is no "completed without downloadable artifact" state.
    async fn render_and_upload(
        &self,
        tenant_id: &str,
        folder: &str,
        file_name: &str,
        spec: &DocumentSpec<'_>,
    ) -> Result<(String, String), ApiError> {
        let bytes = self
            .renderer
            .render(spec)
            .map_err(ApiError::RenderFailed)?;
        let path = format!("tenants/{tenant_id}/{folder}/{file_name}");
        self.blobs
            .store(&path, &bytes, DOCX_CONTENT_TYPE)
            .await
            .map_err(|e| ApiError::Internal(format!("artifact upload failed: {e}")))?;
        let url = self.blobs.signed_url(&path);
        Ok((path, url))
    }

    // ── Petition pipeline ─────────────────────────────────────────────────

    pub fn create_petition(
        &self,
        principal: &Principal,
        req: CreatePetitionRequest,
    ) -> Result<Petition, ApiError> {
        if req.title.trim().is_empty() || req.area.trim().is_empty() || req.doc_type.trim().is_empty()
        {
            return Err(ApiError::InvalidArgument(
                "Campos obrigatórios ausentes.".into(),
            ));
        }
        let now = Utc::now();
        let petition = Petition {
            id: new_id(),
            tenant_id: principal.tenant_id.clone(),
            owner_id: principal.uid.clone(),
            title: req.title,
            area: req.area,
            doc_type: req.doc_type,
            status: PetitionStatus::Draft,
            facts: req.facts,
            attachment_refs: req.attachment_refs,
            analysis: None,
            answers: AnswerMap::new(),
            structure: None,
            content: None,
            docx_path: None,
            docx_url: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_petition(&petition)?;
        Ok(petition)
    }

    pub fn get_petition(
        &self,
        principal: &Principal,
        id: &str,
    ) -> Result<Petition, ApiError> {
        self.store
            .get_petition(&principal.tenant_id, id)?
            .ok_or(ApiError::NotFound("Petição"))
    }

    /// Analysis stage entry point. Valid from `draft` (first run) and from
    /// `error` when no analysis was ever persisted; anything later would be
    /// a status regression.
    pub async fn analyze_case(
        &self,
        principal: &Principal,
        petition_id: &str,
        req: AnalyzeCaseRequest,
    ) -> Result<InitialAnalysis, ApiError> {
        ratelimit::check(
            &self.store,
            &principal.uid,
            actions::PETITION_ANALYSIS,
            self.config.petition_analysis_per_hour,
        )?;
        if req.facts.trim().is_empty() {
            return Err(ApiError::InvalidArgument(
                "Descreva os fatos do caso antes de analisar.".into(),
            ));
        }
        let petition = self.get_petition(principal, petition_id)?;
        let allowed = match petition.status {
            PetitionStatus::Draft | PetitionStatus::Analyzing => true,
            PetitionStatus::Error => petition.analysis.is_none(),
            _ => false,
        };
        if !allowed {
            return Err(ApiError::InvalidArgument(
                "Este registro já passou da etapa de análise.".into(),
            ));
        }

        info!(
            tenant = %principal.tenant_id,
            petition = %petition_id,
            "analyzing case"
        );

        let kb_refs =
            knowledge::resolve_context(&self.store, &principal.tenant_id, Some(&petition.area))?;
        let prompts = self.store.get_prompts(&principal.tenant_id)?;
        let timeout = self.analysis_timeout();

        let knowledge_parts = attachments::knowledge_parts(self.blobs.as_ref(), &kb_refs).await;
        let case_parts = attachments::case_parts(
            self.blobs.as_ref(),
            self.analyst.as_ref(),
            &req.attachment_refs,
            timeout,
        )
        .await;

        let result = analysis::analyze_case(
            self.analyst.as_ref(),
            CaseAnalysisInput {
                facts: &req.facts,
                area: &petition.area,
                doc_type: &petition.doc_type,
                knowledge_parts,
                case_parts,
                custom_instructions: prompts.petition_prompt.as_deref(),
            },
            timeout,
        )
        .await;

        match result {
            Ok(analysis) => {
                self.store.set_petition_analysis(
                    &principal.tenant_id,
                    petition_id,
                    &req.facts,
                    &req.attachment_refs,
                    &analysis,
                    PetitionStatus::Questions,
                )?;
                Ok(analysis)
            }
            Err(e) => {
                warn!(petition = %petition_id, "case analysis failed: {e}");
                if let Err(se) = self.store.set_petition_status(
                    &principal.tenant_id,
                    petition_id,
                    PetitionStatus::Error,
                ) {
                    warn!(petition = %petition_id, "failed to mark error status: {se}");
                }
                Err(e)
            }
        }
    }

    /// Structuring stage entry point. Requires a persisted analysis and full
    /// answer coverage — the client gates this too, but the orchestrator is
    /// the source of truth.
    pub async fn build_structure(
        &self,
        principal: &Principal,
        petition_id: &str,
        req: BuildStructureRequest,
    ) -> Result<PetitionStructure, ApiError> {
        let petition = self.get_petition(principal, petition_id)?;
        let Some(analysis) = petition.analysis.as_ref() else {
            return Err(ApiError::InvalidArgument(
                "Este registro ainda não possui análise.".into(),
            ));
        };
        let allowed = matches!(
            petition.status,
            PetitionStatus::Questions | PetitionStatus::Structuring
        ) || (petition.status == PetitionStatus::Error && petition.content.is_none());
        if !allowed {
            return Err(ApiError::InvalidArgument(
                "Este registro já passou da etapa de estruturação.".into(),
            ));
        }
        if let Err(detail) = verify_answers(&analysis.questions, &req.answers) {
            warn!(petition = %petition_id, "answer coverage rejected: {detail}");
            return Err(ApiError::InvalidArgument(
                "Responda todas as perguntas estratégicas antes de continuar.".into(),
            ));
        }

        info!(tenant = %principal.tenant_id, petition = %petition_id, "building structure");

        let kb_refs =
            knowledge::resolve_context(&self.store, &principal.tenant_id, Some(&petition.area))?;
        let prompts = self.store.get_prompts(&principal.tenant_id)?;
        let knowledge_parts = attachments::knowledge_parts(self.blobs.as_ref(), &kb_refs).await;

        let result = structuring::build_structure(
            self.analyst.as_ref(),
            structuring::StructureInput {
                facts: &petition.facts,
                area: &petition.area,
                doc_type: &petition.doc_type,
                summary: &analysis.summary,
                theses: &analysis.theses,
                answers: &req.answers,
                knowledge_parts,
                custom_instructions: prompts.petition_prompt.as_deref(),
            },
            self.analysis_timeout(),
        )
        .await;

        match result {
            Ok(structure) => {
                self.store.set_petition_structure(
                    &principal.tenant_id,
                    petition_id,
                    &structure,
                    &req.answers,
                    PetitionStatus::Structuring,
                )?;
                Ok(structure)
            }
            Err(e) => {
                warn!(petition = %petition_id, "structuring failed: {e}");
                if let Err(se) = self.store.set_petition_status(
                    &principal.tenant_id,
                    petition_id,
                    PetitionStatus::Error,
                ) {
                    warn!(petition = %petition_id, "failed to mark error status: {se}");
                }
                Err(e)
            }
        }
    }

    /// Generation stage entry point: drafts the full petition text, renders
    /// the DOCX and persists text, artifact reference and completed status
    /// in one write.
    pub async fn generate_document(
        &self,
        principal: &Principal,
        petition_id: &str,
    ) -> Result<GeneratedDocument, ApiError> {
        ratelimit::check(
            &self.store,
            &principal.uid,
            actions::PETITION_GENERATION,
            self.config.petition_generation_per_hour,
        )?;
        let petition = self.get_petition(principal, petition_id)?;
        let Some(analysis) = petition.analysis.as_ref() else {
            return Err(ApiError::InvalidArgument(
                "Este registro ainda não possui análise.".into(),
            ));
        };
        let Some(structure) = petition.structure.as_ref() else {
            return Err(ApiError::InvalidArgument(
                "Este registro ainda não possui estrutura.".into(),
            ));
        };
        let allowed = matches!(
            petition.status,
            PetitionStatus::Structuring | PetitionStatus::Generating
        ) || petition.status == PetitionStatus::Error;
        if !allowed {
            return Err(ApiError::InvalidArgument(
                "Este registro não está pronto para geração.".into(),
            ));
        }
        if let Err(detail) = verify_answers(&analysis.questions, &petition.answers) {
            warn!(petition = %petition_id, "answer coverage rejected: {detail}");
            return Err(ApiError::InvalidArgument(
                "Responda todas as perguntas estratégicas antes de continuar.".into(),
            ));
        }

        info!(tenant = %principal.tenant_id, petition = %petition_id, "generating petition");

        let prompts = self.store.get_prompts(&principal.tenant_id)?;
        let result = drafting::generate_petition(
            self.drafter.as_ref(),
            PetitionDraftInput {
                area: &petition.area,
                doc_type: &petition.doc_type,
                facts: &petition.facts,
                summary: &analysis.summary,
                theses: &analysis.theses,
                answers: &petition.answers,
                structure,
                custom_instructions: prompts.petition_prompt.as_deref(),
            },
            self.generation_timeout(),
        )
        .await;

        let text = match result {
            Ok(text) => text,
            Err(e) => {
                warn!(petition = %petition_id, "petition generation failed: {e}");
                if let Err(se) = self.store.set_petition_status(
                    &principal.tenant_id,
                    petition_id,
                    PetitionStatus::Error,
                ) {
                    warn!(petition = %petition_id, "failed to mark error status: {se}");
                }
                return Err(e);
            }
        };

        let office = self.office(&principal.tenant_id);
        let title = format!("{} — {}", petition.doc_type, petition.area);
        let spec = DocumentSpec {
            title: &title,
            subtitle: &petition.doc_type,
            body: &text,
            office: office.as_ref(),
        };
        let file_name = format!("peticao_{petition_id}_{}.docx", Utc::now().timestamp());
        let uploaded = self
            .render_and_upload(&principal.tenant_id, "petitions", &file_name, &spec)
            .await;
        let (docx_path, docx_url) = match uploaded {
            Ok(pair) => pair,
            Err(e) => {
                warn!(petition = %petition_id, "artifact rendering failed: {e}");
                if let Err(se) = self.store.set_petition_status(
                    &principal.tenant_id,
                    petition_id,
                    PetitionStatus::Error,
                ) {
                    warn!(petition = %petition_id, "failed to mark error status: {se}");
                }
                return Err(e);
            }
        };

        self.store.set_petition_content(
            &principal.tenant_id,
            petition_id,
            &text,
            &docx_path,
            &docx_url,
        )?;

        Ok(GeneratedDocument {
            text,
            document_url: docx_url,
        })
    }

    // ── Judge-review pipeline ─────────────────────────────────────────────

    pub fn create_review(
        &self,
        principal: &Principal,
        req: CreateReviewRequest,
    ) -> Result<JudgeReview, ApiError> {
        if req.description.trim().is_empty() {
            return Err(ApiError::InvalidArgument(
                "Descreva o caso antes de enviar para análise.".into(),
            ));
        }
        let now = Utc::now();
        let review = JudgeReview {
            id: new_id(),
            tenant_id: principal.tenant_id.clone(),
            owner_id: principal.uid.clone(),
            description: req.description,
            petition_text: req.petition_text,
            main_file_ref: req.main_file_ref,
            attachment_refs: req.attachment_refs,
            status: ReviewStatus::Analyzing,
            analysis: None,
            answers: AnswerMap::new(),
            report: None,
            docx_path: None,
            docx_url: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_review(&review)?;
        Ok(review)
    }

    pub fn get_review(&self, principal: &Principal, id: &str) -> Result<JudgeReview, ApiError> {
        self.store
            .get_review(&principal.tenant_id, id)?
            .ok_or(ApiError::NotFound("Análise"))
    }

    pub async fn analyze_for_review(
        &self,
        principal: &Principal,
        review_id: &str,
        req: AnalyzeReviewRequest,
    ) -> Result<ReviewAnalysis, ApiError> {
        ratelimit::check(
            &self.store,
            &principal.uid,
            actions::JUDGE_ANALYSIS,
            self.config.judge_analysis_per_hour,
        )?;
        if req.description.trim().is_empty() {
            return Err(ApiError::InvalidArgument(
                "Descreva o caso antes de enviar para análise.".into(),
            ));
        }
        let review = self.get_review(principal, review_id)?;
        let allowed = match review.status {
            ReviewStatus::Analyzing => true,
            ReviewStatus::Error => review.analysis.is_none(),
            _ => false,
        };
        if !allowed {
            return Err(ApiError::InvalidArgument(
                "Este registro já passou da etapa de análise.".into(),
            ));
        }

        info!(tenant = %principal.tenant_id, review = %review_id, "analyzing petition for review");

        // Review-stage knowledge context is not area-filtered.
        let kb_refs = knowledge::resolve_context(&self.store, &principal.tenant_id, None)?;
        let prompts = self.store.get_prompts(&principal.tenant_id)?;
        let timeout = self.analysis_timeout();

        let mut petition_parts: Vec<ContentPart> = Vec::new();
        if let Some(main_ref) = req.main_file_ref.as_deref() {
            match self.blobs.fetch(main_ref).await {
                Ok(data) => petition_parts.push(ContentPart::Inline {
                    media_type: attachments::media_type(main_ref).to_string(),
                    data,
                }),
                Err(e) => warn!("skipping petition file {main_ref}: {e}"),
            }
        }
        let case_parts = attachments::case_parts(
            self.blobs.as_ref(),
            self.analyst.as_ref(),
            &req.attachment_refs,
            timeout,
        )
        .await;
        let knowledge_parts = attachments::knowledge_parts(self.blobs.as_ref(), &kb_refs).await;

        let result = analysis::analyze_for_review(
            self.analyst.as_ref(),
            ReviewAnalysisInput {
                description: &req.description,
                petition_text: req.petition_text.as_deref(),
                petition_parts,
                case_parts,
                knowledge_parts,
                custom_instructions: prompts.judge_prompt.as_deref(),
            },
            timeout,
        )
        .await;

        match result {
            Ok(analysis) => {
                self.store.set_review_analysis(
                    &principal.tenant_id,
                    review_id,
                    &req.description,
                    req.petition_text.as_deref(),
                    req.main_file_ref.as_deref(),
                    &req.attachment_refs,
                    &analysis,
                    ReviewStatus::Questions,
                )?;
                Ok(analysis)
            }
            Err(e) => {
                warn!(review = %review_id, "review analysis failed: {e}");
                if let Err(se) = self.store.set_review_status(
                    &principal.tenant_id,
                    review_id,
                    ReviewStatus::Error,
                ) {
                    warn!(review = %review_id, "failed to mark error status: {se}");
                }
                Err(e)
            }
        }
    }

    pub async fn generate_review(
        &self,
        principal: &Principal,
        review_id: &str,
        req: GenerateReviewRequest,
    ) -> Result<GeneratedReview, ApiError> {
        let review = self.get_review(principal, review_id)?;
        let Some(analysis) = review.analysis.as_ref() else {
            return Err(ApiError::InvalidArgument(
                "Este registro ainda não possui análise.".into(),
            ));
        };
        let allowed = matches!(
            review.status,
            ReviewStatus::Questions | ReviewStatus::Generating | ReviewStatus::Error
        );
        if !allowed {
            return Err(ApiError::InvalidArgument(
                "Este registro não está pronto para geração do relatório.".into(),
            ));
        }
        if let Err(detail) = verify_answers(&analysis.questions, &req.answers) {
            warn!(review = %review_id, "answer coverage rejected: {detail}");
            return Err(ApiError::InvalidArgument(
                "Responda todas as perguntas estratégicas antes de continuar.".into(),
            ));
        }

        info!(tenant = %principal.tenant_id, review = %review_id, "generating judge report");

        let prompts = self.store.get_prompts(&principal.tenant_id)?;
        let result = drafting::generate_judge_report(
            self.drafter.as_ref(),
            JudgeReportInput {
                description: &review.description,
                petition_text: review.petition_text.as_deref().unwrap_or(""),
                summary: &analysis.summary,
                impression: &analysis.impression,
                answers: &req.answers,
                custom_instructions: prompts.judge_prompt.as_deref(),
            },
            self.generation_timeout(),
        )
        .await;

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                warn!(review = %review_id, "judge report generation failed: {e}");
                if let Err(se) = self.store.set_review_status(
                    &principal.tenant_id,
                    review_id,
                    ReviewStatus::Error,
                ) {
                    warn!(review = %review_id, "failed to mark error status: {se}");
                }
                return Err(e);
            }
        };

        let office = self.office(&principal.tenant_id);
        let office_name = office
            .as_ref()
            .and_then(|o| o.name.clone())
            .unwrap_or_else(|| self.config.office_name.clone());
        let subtitle = format!("Parecer do Agente Julgador — {office_name}");
        let body = report.to_document_text();
        let spec = DocumentSpec {
            title: "RELATÓRIO DE ANÁLISE CRÍTICA",
            subtitle: &subtitle,
            body: &body,
            office: office.as_ref(),
        };
        let file_name = format!("relatorio_{review_id}_{}.docx", Utc::now().timestamp());
        let uploaded = self
            .render_and_upload(&principal.tenant_id, "judge-reports", &file_name, &spec)
            .await;
        let (docx_path, docx_url) = match uploaded {
            Ok(pair) => pair,
            Err(e) => {
                warn!(review = %review_id, "artifact rendering failed: {e}");
                if let Err(se) = self.store.set_review_status(
                    &principal.tenant_id,
                    review_id,
                    ReviewStatus::Error,
                ) {
                    warn!(review = %review_id, "failed to mark error status: {se}");
                }
                return Err(e);
            }
        };

        self.store.set_review_report(
            &principal.tenant_id,
            review_id,
            &report,
            &req.answers,
            &docx_path,
            &docx_url,
        )?;

        Ok(GeneratedReview {
            report,
            document_url: docx_url,
        })
    }

    // ── Chat intake ───────────────────────────────────────────────────────

    pub fn create_chat_session(
        &self,
        principal: &Principal,
        req: CreateChatSessionRequest,
    ) -> Result<ChatSession, ApiError> {
        if req.client_name.trim().is_empty() || req.area.trim().is_empty() {
            return Err(ApiError::InvalidArgument(
                "Campos obrigatórios ausentes.".into(),
            ));
        }
        let now = Utc::now();
        let session = ChatSession {
            id: new_id(),
            tenant_id: principal.tenant_id.clone(),
            owner_id: principal.uid.clone(),
            client_name: req.client_name,
            area: req.area,
            status: "active".into(),
            last_message: None,
            last_message_at: None,
            report_path: None,
            report_url: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_chat_session(&session)?;
        Ok(session)
    }

    pub fn get_chat_session(
        &self,
        principal: &Principal,
        id: &str,
    ) -> Result<ChatSession, ApiError> {
        self.store
            .get_chat_session(&principal.tenant_id, id)?
            .ok_or(ApiError::NotFound("Atendimento"))
    }

    /// One intake-chat turn. Persistence order is part of the contract:
    /// user message, then assistant message, then session summary, so any
    /// downstream observer sees a consistent history.
    pub async fn send_chat_turn(
        &self,
        principal: &Principal,
        session_id: &str,
        req: ChatTurnRequest,
    ) -> Result<ChatReply, ApiError> {
        ratelimit::check(
            &self.store,
            &principal.uid,
            actions::CHAT_MESSAGE,
            self.config.chat_messages_per_hour,
        )?;
        if req.message.trim().is_empty() {
            return Err(ApiError::InvalidArgument("Mensagem vazia.".into()));
        }
        let session = self.get_chat_session(principal, session_id)?;
        if session.status != "active" {
            return Err(ApiError::InvalidArgument(
                "Este atendimento já foi encerrado.".into(),
            ));
        }

        let timeout = Duration::from_secs(self.config.chat_timeout_s);

        // Per-turn attachment: transcript for audio, digest for documents.
        // Absorbed on failure; the turn proceeds without the file context.
        let mut file_context: Option<String> = None;
        if let Some(file_ref) = req.attachment_ref.as_deref() {
            if attachments::media_kind(file_ref) == attachments::MediaKind::Audio {
                match attachments::transcribe_audio(
                    self.blobs.as_ref(),
                    self.analyst.as_ref(),
                    file_ref,
                    timeout,
                )
                .await
                {
                    Ok(transcript) => file_context = Some(transcript),
                    Err(e) => warn!("chat attachment transcription failed for {file_ref}: {e}"),
                }
            } else {
                match self.blobs.fetch(file_ref).await {
                    Ok(data) => {
                        let parts = [
                            ContentPart::text(
                                "Extraia e resuma o conteúdo deste documento em português:",
                            ),
                            ContentPart::Inline {
                                media_type: attachments::media_type(file_ref).to_string(),
                                data,
                            },
                        ];
                        match self.analyst.generate_text(&parts, timeout).await {
                            Ok(digest) => file_context = Some(digest),
                            Err(e) => warn!("chat attachment digest failed for {file_ref}: {e}"),
                        }
                    }
                    Err(e) => warn!("skipping chat attachment {file_ref}: {e}"),
                }
            }
        }

        // Knowledge digest for the session's area, best-effort.
        let mut kb_context: Option<String> = None;
        let kb_refs =
            knowledge::resolve_context(&self.store, &principal.tenant_id, Some(&session.area))?;
        if !kb_refs.is_empty() {
            let mut parts = vec![ContentPart::text(
                "Extraia o conteúdo relevante destes documentos da base de conhecimento do \
escritório, de forma resumida:",
            )];
            let limited: Vec<String> = kb_refs.into_iter().take(3).collect();
            parts.extend(attachments::knowledge_parts(self.blobs.as_ref(), &limited).await);
            if parts.len() > 1 {
                match self.analyst.generate_text(&parts, timeout).await {
                    Ok(digest) => kb_context = Some(digest),
                    Err(e) => warn!("knowledge digest failed for chat session {session_id}: {e}"),
                }
            }
        }

        let mut system_context = format!(
            "CONTEXTO DO ATENDIMENTO:\nCliente: {}\nÁrea jurídica: {}\nData: {}",
            session.client_name,
            session.area,
            Utc::now().format("%d/%m/%Y"),
        );
        if let Some(kb) = &kb_context {
            system_context.push_str("\n\nBASE DE CONHECIMENTO DO ESCRITÓRIO:\n");
            system_context.push_str(kb);
        }

        let history: Vec<ChatTurn> = {
            let messages = self
                .store
                .list_chat_messages(&principal.tenant_id, session_id)?;
            let skip = messages.len().saturating_sub(self.config.chat_history_window);
            messages
                .into_iter()
                .skip(skip)
                .map(|m| ChatTurn {
                    role: m.role,
                    content: m.content,
                })
                .collect()
        };

        let prompts = self.store.get_prompts(&principal.tenant_id)?;
        let response = drafting::chat_reply(
            self.chat_drafter.as_ref(),
            &system_context,
            &history,
            &req.message,
            file_context.as_deref(),
            prompts.chat_prompt.as_deref(),
            timeout,
        )
        .await?;

        self.store.append_chat_message(
            &principal.tenant_id,
            session_id,
            ChatRole::User,
            &req.message,
            req.attachment_ref.as_deref(),
        )?;
        let message_id = self.store.append_chat_message(
            &principal.tenant_id,
            session_id,
            ChatRole::Assistant,
            &response,
            None,
        )?;
        let preview: String = response.chars().take(100).collect();
        self.store
            .set_session_summary(&principal.tenant_id, session_id, &preview)?;

        Ok(ChatReply {
            response,
            message_id,
        })
    }

    /// On-demand terminal action over the session history: structured
    /// report, local plain-text rendering, DOCX artifact, reference on the
    /// session.
    pub async fn generate_chat_report(
        &self,
        principal: &Principal,
        session_id: &str,
    ) -> Result<GeneratedChatReport, ApiError> {
        let session = self.get_chat_session(principal, session_id)?;
        let messages = self
            .store
            .list_chat_messages(&principal.tenant_id, session_id)?;
        if messages.is_empty() {
            return Err(ApiError::InvalidArgument(
                "Este atendimento ainda não possui mensagens.".into(),
            ));
        }
        let turns: Vec<ChatTurn> = messages
            .into_iter()
            .map(|m| ChatTurn {
                role: m.role,
                content: m.content,
            })
            .collect();

        info!(tenant = %principal.tenant_id, session = %session_id, "generating chat report");

        let report = report::generate_chat_report(
            self.analyst.as_ref(),
            &session.client_name,
            &session.area,
            &turns,
            self.analysis_timeout(),
        )
        .await?;

        let office = self.office(&principal.tenant_id);
        let subtitle = format!("{} — {}", session.client_name, session.area);
        let body = report.to_document_text();
        let spec = DocumentSpec {
            title: "RELATÓRIO DE ATENDIMENTO",
            subtitle: &subtitle,
            body: &body,
            office: office.as_ref(),
        };
        let file_name = format!(
            "relatorio_atendimento_{session_id}_{}.docx",
            Utc::now().timestamp()
        );
        let (report_path, report_url) = self
            .render_and_upload(&principal.tenant_id, "chat-reports", &file_name, &spec)
            .await?;

        self.store
            .set_session_report(&principal.tenant_id, session_id, &report_path, &report_url)?;

        Ok(GeneratedChatReport {
            report,
            document_url: report_url,
        })
    }

    // ── Downloads ─────────────────────────────────────────────────────────

    /// Fresh signed URL for an artifact the caller's tenant owns. The path
    /// prefix check is the tenant-isolation boundary for downloads.
    pub async fn download_url(
        &self,
        principal: &Principal,
        path: &str,
    ) -> Result<String, ApiError> {
        if path.is_empty() {
            return Err(ApiError::InvalidArgument("Caminho obrigatório.".into()));
        }
        if !path.starts_with(&format!("tenants/{}/", principal.tenant_id)) {
            return Err(ApiError::PermissionDenied(
                "Acesso negado ao arquivo solicitado.".into(),
            ));
        }
        let exists = self
            .blobs
            .exists(path)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        if !exists {
            return Err(ApiError::NotFound("Arquivo"));
        }
        Ok(self.blobs.signed_url(path))
    }
}
