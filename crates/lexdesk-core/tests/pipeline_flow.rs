use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lexdesk_core::{
    blob::FsBlobStore,
    config::Config,
    model::{AnalysisModel, ContentPart, DraftingModel, ModelError},
    pipeline::{
        AnalyzeCaseRequest, AnalyzeReviewRequest, BuildStructureRequest, ChatTurnRequest,
        CreateChatSessionRequest, CreatePetitionRequest, CreateReviewRequest,
        GenerateReviewRequest, Pipeline,
    },
    render::{DocumentRenderer, DocumentSpec},
    store::Store,
    types::{
        Answer, AnswerMap, ChatRole, ChatTurn, PetitionStatus, Principal, ReviewStatus, UserRole,
    },
    ApiError,
};

// ── Fakes ────────────────────────────────────────────────────────────────

/// Multimodal fake: pops one scripted response per `generate_json` call.
/// `None` entries simulate a provider failure.
struct FakeAnalyst {
    json_responses: Mutex<VecDeque<Option<String>>>,
}

impl FakeAnalyst {
    fn scripted(responses: Vec<Option<&str>>) -> Arc<Self> {
        Arc::new(Self {
            json_responses: Mutex::new(
                responses.into_iter().map(|r| r.map(String::from)).collect(),
            ),
        })
    }
}

#[async_trait]
impl AnalysisModel for FakeAnalyst {
    async fn generate_json(
        &self,
        _parts: &[ContentPart],
        _timeout: Duration,
    ) -> Result<String, ModelError> {
        let next = self
            .json_responses
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or(None);
        match next {
            Some(json) => Ok(json),
            None => Err(ModelError::Status {
                status: 500,
                body: "scripted provider failure".into(),
            }),
        }
    }

    async fn generate_text(
        &self,
        _parts: &[ContentPart],
        _timeout: Duration,
    ) -> Result<String, ModelError> {
        Ok("transcrição de teste".into())
    }
}

/// Drafting fake: fails the first `fail_first` calls, then returns the
/// scripted text.
struct FakeDrafter {
    text: String,
    fail_first: usize,
    calls: AtomicUsize,
}

impl FakeDrafter {
    fn ok(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.into(),
            fail_first: 0,
            calls: AtomicUsize::new(0),
        })
    }

    fn fail_once(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.into(),
            fail_first: 1,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DraftingModel for FakeDrafter {
    async fn draft(
        &self,
        _system: &str,
        _turns: &[ChatTurn],
        _max_tokens: u32,
        _timeout: Duration,
    ) -> Result<String, ModelError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(ModelError::Timeout(1));
        }
        Ok(self.text.clone())
    }
}

/// Renderer fake: the "binary" artifact is just the body bytes.
struct TextRenderer;

impl DocumentRenderer for TextRenderer {
    fn render(&self, spec: &DocumentSpec<'_>) -> Result<Vec<u8>, String> {
        Ok(spec.body.as_bytes().to_vec())
    }
}

/// Renderer fake that always fails, for the no-artifact-no-completed rule.
struct BrokenRenderer;

impl DocumentRenderer for BrokenRenderer {
    fn render(&self, _spec: &DocumentSpec<'_>) -> Result<Vec<u8>, String> {
        Err("scripted render failure".into())
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

const ANALYSIS_JSON: &str = r#"{
    "summary": "Cobrança indevida em contrato bancário.",
    "theses": ["Repetição do indébito", "Dano moral"],
    "questions": [
        {"id": 1, "prompt_text": "Qual o valor cobrado?", "answer_kind": "free_text", "options": []},
        {"id": 2, "prompt_text": "Há contrato escrito?", "answer_kind": "single_choice", "options": ["sim", "não"]}
    ]
}"#;

const STRUCTURE_JSON: &str = r#"{
    "forum": "Excelentíssimo Senhor Doutor Juiz de Direito da Vara Cível",
    "parties": {"autor": "Fulano de Tal", "reu": "Banco X S.A."},
    "sections": [
        {"id": "1", "title": "DOS FATOS", "summary": "Narrativa da cobrança.", "subpoints": ["contrato", "extratos"]},
        {"id": "2", "title": "DO DIREITO", "summary": "Fundamentação no CDC.", "subpoints": []}
    ],
    "relief_requested": ["Repetição do indébito em dobro", "Danos morais"]
}"#;

const EMPTY_STRUCTURE_JSON: &str = r#"{
    "forum": "Juízo competente",
    "parties": {"autor": "Fulano"},
    "sections": [],
    "relief_requested": []
}"#;

const REVIEW_ANALYSIS_JSON: &str = r#"{
    "summary": "Petição inicial de cobrança.",
    "impression": "Bem estruturada, fundamentação mediana.",
    "questions": [
        {"id": 1, "prompt_text": "Há jurisprudência local favorável?", "answer_kind": "free_text", "options": []}
    ]
}"#;

const JUDGE_REPORT_TEXT: &str = "Segue o parecer solicitado:\n{\
\"strengths\": [\"Narrativa clara\"], \
\"weaknesses\": [\"Poucos precedentes\"], \
\"evidence_gaps\": [\"Falta extrato integral\"], \
\"risks\": [\"Improcedência parcial\"], \
\"success_outlook\": \"medium\", \
\"outlook_rationale\": \"Provas suficientes, teses medianas.\", \
\"suggestions\": [{\"title\": \"Reforçar o pedido\", \"text\": \"Citar o tema 929 do STJ.\"}]}\nEspero que ajude!";

const CHAT_REPORT_JSON: &str = r#"{
    "client_name": "Maria",
    "area": "consumidor",
    "case_summary": "Cobrança indevida em fatura.",
    "legal_assessment": "Aplicável o CDC, artigo 42.",
    "theses": ["Repetição em dobro"],
    "fee_proposal": "30% ao êxito",
    "next_steps": ["Coletar faturas", "Notificar o banco"]
}"#;

const PETITION_TEXT: &str = "## DOS FATOS\nO autor foi cobrado indevidamente.\n\n## DO DIREITO\nAplica-se o CDC.\n\n## DOS PEDIDOS\n1. Repetição do indébito.";

fn test_config() -> Config {
    Config {
        gemini_api_key: String::new(),
        anthropic_api_key: String::new(),
        analysis_model: "fake-analysis".into(),
        drafting_model: "fake-drafting".into(),
        chat_model: "fake-chat".into(),
        data_dir: "unused".into(),
        blob_dir: "unused".into(),
        web_bind: "127.0.0.1".into(),
        web_port: 0,
        public_base_url: "http://localhost:8080".into(),
        auth_secret: "secret".into(),
        url_signing_key: "signing-key".into(),
        download_url_ttl_s: 3600,
        office_name: "LEXDESK".into(),
        analysis_timeout_s: 5,
        generation_timeout_s: 5,
        chat_timeout_s: 5,
        petition_analysis_per_hour: 20,
        petition_generation_per_hour: 10,
        judge_analysis_per_hour: 10,
        chat_messages_per_hour: 100,
        chat_history_window: 20,
    }
}

struct Harness {
    pipeline: Pipeline,
    store: Arc<Store>,
    principal: Principal,
    _tmp: tempfile::TempDir,
}

fn harness(
    analyst: Arc<dyn AnalysisModel>,
    drafter: Arc<dyn DraftingModel>,
    renderer: Arc<dyn DocumentRenderer>,
) -> Harness {
    let store = Arc::new(Store::open(":memory:").expect("open store"));
    store.migrate().expect("migrate");
    let tmp = tempfile::tempdir().expect("tempdir");
    let blobs = Arc::new(FsBlobStore::new(
        tmp.path(),
        "http://localhost:8080",
        b"signing-key".to_vec(),
        3600,
    ));
    let pipeline = Pipeline::new(
        Arc::clone(&store),
        blobs,
        analyst,
        Arc::clone(&drafter),
        drafter,
        renderer,
        Arc::new(test_config()),
    );
    Harness {
        pipeline,
        store,
        principal: Principal {
            uid: "uid-1".into(),
            tenant_id: "t1".into(),
            role: UserRole::Lawyer,
        },
        _tmp: tmp,
    }
}

fn full_answers() -> AnswerMap {
    let mut answers = AnswerMap::new();
    answers.insert("1".into(), Answer::Text("R$ 4.300,00".into()));
    answers.insert("2".into(), Answer::Text("sim".into()));
    answers
}

fn new_petition(h: &Harness) -> String {
    h.pipeline
        .create_petition(
            &h.principal,
            CreatePetitionRequest {
                title: "Ação de repetição de indébito".into(),
                area: "civel".into(),
                doc_type: "Petição Inicial".into(),
                facts: String::new(),
                attachment_refs: Vec::new(),
            },
        )
        .expect("create petition")
        .id
}

fn analyze_request() -> AnalyzeCaseRequest {
    AnalyzeCaseRequest {
        facts: "Cliente cobrado indevidamente por tarifas bancárias.".into(),
        attachment_refs: Vec::new(),
    }
}

// ── Petition pipeline ─────────────────────────────────────────────────────

#[tokio::test]
async fn petition_pipeline_runs_to_completed() {
    let analyst = FakeAnalyst::scripted(vec![Some(ANALYSIS_JSON), Some(STRUCTURE_JSON)]);
    let h = harness(analyst, FakeDrafter::ok(PETITION_TEXT), Arc::new(TextRenderer));
    let id = new_petition(&h);

    let analysis = h
        .pipeline
        .analyze_case(&h.principal, &id, analyze_request())
        .await
        .expect("analyze");
    assert_eq!(analysis.questions.len(), 2);

    let record = h.store.get_petition("t1", &id).expect("get").expect("exists");
    assert_eq!(record.status, PetitionStatus::Questions);
    assert!(record.analysis.is_some());

    let structure = h
        .pipeline
        .build_structure(&h.principal, &id, BuildStructureRequest { answers: full_answers() })
        .await
        .expect("structure");
    assert_eq!(structure.sections.len(), 2);

    let record = h.store.get_petition("t1", &id).expect("get").expect("exists");
    assert_eq!(record.status, PetitionStatus::Structuring);
    assert_eq!(record.answers.len(), 2);

    let generated = h
        .pipeline
        .generate_document(&h.principal, &id)
        .await
        .expect("generate");
    assert!(generated.text.contains("## DOS FATOS"));
    assert!(generated.document_url.contains("sig="));

    let record = h.store.get_petition("t1", &id).expect("get").expect("exists");
    assert_eq!(record.status, PetitionStatus::Completed);
    assert_eq!(record.content.as_deref(), Some(PETITION_TEXT));
    assert!(record.docx_path.is_some());
    assert!(record.docx_url.is_some());
}

#[tokio::test]
async fn analysis_cannot_rerun_after_questions() {
    let analyst = FakeAnalyst::scripted(vec![Some(ANALYSIS_JSON), Some(ANALYSIS_JSON)]);
    let h = harness(analyst, FakeDrafter::ok(PETITION_TEXT), Arc::new(TextRenderer));
    let id = new_petition(&h);

    h.pipeline
        .analyze_case(&h.principal, &id, analyze_request())
        .await
        .expect("first analyze");

    let err = h
        .pipeline
        .analyze_case(&h.principal, &id, analyze_request())
        .await
        .expect_err("second analyze must be rejected");
    assert!(matches!(err, ApiError::InvalidArgument(_)));
}

#[tokio::test]
async fn structuring_requires_every_question_answered() {
    let analyst = FakeAnalyst::scripted(vec![Some(ANALYSIS_JSON), Some(STRUCTURE_JSON)]);
    let h = harness(analyst, FakeDrafter::ok(PETITION_TEXT), Arc::new(TextRenderer));
    let id = new_petition(&h);

    h.pipeline
        .analyze_case(&h.principal, &id, analyze_request())
        .await
        .expect("analyze");

    // 2 questions, 1 answered: rejected before any AI call.
    let mut partial = AnswerMap::new();
    partial.insert("1".into(), Answer::Text("R$ 4.300,00".into()));
    let err = h
        .pipeline
        .build_structure(&h.principal, &id, BuildStructureRequest { answers: partial })
        .await
        .expect_err("partial answers rejected");
    assert!(matches!(err, ApiError::InvalidArgument(_)));

    // Status untouched by the rejection.
    let record = h.store.get_petition("t1", &id).expect("get").expect("exists");
    assert_eq!(record.status, PetitionStatus::Questions);
}

#[tokio::test]
async fn analysis_failure_marks_error_and_is_retryable() {
    let analyst = FakeAnalyst::scripted(vec![None, Some(ANALYSIS_JSON)]);
    let h = harness(analyst, FakeDrafter::ok(PETITION_TEXT), Arc::new(TextRenderer));
    let id = new_petition(&h);

    let err = h
        .pipeline
        .analyze_case(&h.principal, &id, analyze_request())
        .await
        .expect_err("scripted failure");
    assert!(matches!(err, ApiError::AnalysisFailed(_)));

    let record = h.store.get_petition("t1", &id).expect("get").expect("exists");
    assert_eq!(record.status, PetitionStatus::Error);
    assert!(record.analysis.is_none(), "no partial analysis persisted");

    // Same transition retried succeeds.
    h.pipeline
        .analyze_case(&h.principal, &id, analyze_request())
        .await
        .expect("retry succeeds");
    let record = h.store.get_petition("t1", &id).expect("get").expect("exists");
    assert_eq!(record.status, PetitionStatus::Questions);
}

#[tokio::test]
async fn empty_sections_fail_the_structuring_stage() {
    let analyst = FakeAnalyst::scripted(vec![Some(ANALYSIS_JSON), Some(EMPTY_STRUCTURE_JSON)]);
    let h = harness(analyst, FakeDrafter::ok(PETITION_TEXT), Arc::new(TextRenderer));
    let id = new_petition(&h);

    h.pipeline
        .analyze_case(&h.principal, &id, analyze_request())
        .await
        .expect("analyze");
    let err = h
        .pipeline
        .build_structure(&h.principal, &id, BuildStructureRequest { answers: full_answers() })
        .await
        .expect_err("empty sections rejected");
    assert!(matches!(err, ApiError::StructuringFailed(_)));

    let record = h.store.get_petition("t1", &id).expect("get").expect("exists");
    assert_eq!(record.status, PetitionStatus::Error);
    assert!(record.structure.is_none());
    assert!(record.analysis.is_some(), "previous stage data preserved");
}

// Idempotent retry: a failed generation persists nothing but the error
// status; the retried call completes exactly once with one artifact.
#[tokio::test]
async fn failed_generation_retries_to_a_single_completion() {
    let analyst = FakeAnalyst::scripted(vec![Some(ANALYSIS_JSON), Some(STRUCTURE_JSON)]);
    let h = harness(
        analyst,
        FakeDrafter::fail_once(PETITION_TEXT),
        Arc::new(TextRenderer),
    );
    let id = new_petition(&h);

    h.pipeline
        .analyze_case(&h.principal, &id, analyze_request())
        .await
        .expect("analyze");
    h.pipeline
        .build_structure(&h.principal, &id, BuildStructureRequest { answers: full_answers() })
        .await
        .expect("structure");

    let err = h
        .pipeline
        .generate_document(&h.principal, &id)
        .await
        .expect_err("first generation fails");
    assert!(matches!(err, ApiError::GenerationFailed(_)));

    let record = h.store.get_petition("t1", &id).expect("get").expect("exists");
    assert_eq!(record.status, PetitionStatus::Error);
    assert!(record.content.is_none());
    assert!(record.docx_path.is_none());

    let generated = h
        .pipeline
        .generate_document(&h.principal, &id)
        .await
        .expect("retry succeeds");
    assert!(!generated.document_url.is_empty());

    let record = h.store.get_petition("t1", &id).expect("get").expect("exists");
    assert_eq!(record.status, PetitionStatus::Completed);

    // Exactly one artifact was written for this record.
    let dir = h._tmp.path().join("tenants/t1/petitions");
    let artifacts: Vec<_> = std::fs::read_dir(&dir)
        .expect("artifact dir")
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(artifacts.len(), 1);
}

// Terminal-state invariant: a render failure after successful text
// generation never yields a completed record without an artifact.
#[tokio::test]
async fn render_failure_never_yields_completed_without_artifact() {
    let analyst = FakeAnalyst::scripted(vec![Some(ANALYSIS_JSON), Some(STRUCTURE_JSON)]);
    let h = harness(
        analyst,
        FakeDrafter::ok(PETITION_TEXT),
        Arc::new(BrokenRenderer),
    );
    let id = new_petition(&h);

    h.pipeline
        .analyze_case(&h.principal, &id, analyze_request())
        .await
        .expect("analyze");
    h.pipeline
        .build_structure(&h.principal, &id, BuildStructureRequest { answers: full_answers() })
        .await
        .expect("structure");

    let err = h
        .pipeline
        .generate_document(&h.principal, &id)
        .await
        .expect_err("render failure fails the stage");
    assert!(matches!(err, ApiError::RenderFailed(_)));

    let record = h.store.get_petition("t1", &id).expect("get").expect("exists");
    assert_eq!(record.status, PetitionStatus::Error);
    assert!(
        record.content.is_none() && record.docx_path.is_none(),
        "no completed-without-artifact state"
    );
}

#[tokio::test]
async fn records_are_tenant_isolated() {
    let analyst = FakeAnalyst::scripted(vec![Some(ANALYSIS_JSON)]);
    let h = harness(analyst, FakeDrafter::ok(PETITION_TEXT), Arc::new(TextRenderer));
    let id = new_petition(&h);

    let intruder = Principal {
        uid: "uid-9".into(),
        tenant_id: "t2".into(),
        role: UserRole::Admin,
    };
    let err = h
        .pipeline
        .analyze_case(&intruder, &id, analyze_request())
        .await
        .expect_err("cross-tenant access");
    assert!(matches!(err, ApiError::NotFound(_)));
}

// ── Judge-review pipeline ─────────────────────────────────────────────────

#[tokio::test]
async fn judge_review_runs_to_completed() {
    let analyst = FakeAnalyst::scripted(vec![Some(REVIEW_ANALYSIS_JSON)]);
    let h = harness(
        analyst,
        FakeDrafter::ok(JUDGE_REPORT_TEXT),
        Arc::new(TextRenderer),
    );

    let review = h
        .pipeline
        .create_review(
            &h.principal,
            CreateReviewRequest {
                description: "Petição inicial de cobrança contra banco.".into(),
                petition_text: Some("Texto integral da petição.".into()),
                main_file_ref: None,
                attachment_refs: Vec::new(),
            },
        )
        .expect("create review");
    assert_eq!(review.status, ReviewStatus::Analyzing);

    let analysis = h
        .pipeline
        .analyze_for_review(
            &h.principal,
            &review.id,
            AnalyzeReviewRequest {
                description: "Petição inicial de cobrança contra banco.".into(),
                petition_text: Some("Texto integral da petição.".into()),
                main_file_ref: None,
                attachment_refs: Vec::new(),
            },
        )
        .await
        .expect("analyze");
    assert_eq!(analysis.questions.len(), 1);

    let record = h.store.get_review("t1", &review.id).expect("get").expect("exists");
    assert_eq!(record.status, ReviewStatus::Questions);

    let mut answers = AnswerMap::new();
    answers.insert("1".into(), Answer::Text("Sim, TJSP favorável.".into()));
    let generated = h
        .pipeline
        .generate_review(&h.principal, &review.id, GenerateReviewRequest { answers })
        .await
        .expect("generate review");

    // Prose-wrapped JSON was extracted and decoded.
    assert_eq!(generated.report.strengths, vec!["Narrativa clara"]);
    assert!(generated.document_url.contains("judge-reports"));

    let record = h.store.get_review("t1", &review.id).expect("get").expect("exists");
    assert_eq!(record.status, ReviewStatus::Completed);
    assert!(record.report.is_some());
    assert!(record.docx_path.is_some());
}

#[tokio::test]
async fn judge_report_without_json_fails_generation() {
    let analyst = FakeAnalyst::scripted(vec![Some(REVIEW_ANALYSIS_JSON)]);
    let h = harness(
        analyst,
        FakeDrafter::ok("Não consegui produzir o relatório."),
        Arc::new(TextRenderer),
    );

    let review = h
        .pipeline
        .create_review(
            &h.principal,
            CreateReviewRequest {
                description: "desc".into(),
                petition_text: Some("texto".into()),
                main_file_ref: None,
                attachment_refs: Vec::new(),
            },
        )
        .expect("create review");
    h.pipeline
        .analyze_for_review(
            &h.principal,
            &review.id,
            AnalyzeReviewRequest {
                description: "desc".into(),
                petition_text: Some("texto".into()),
                main_file_ref: None,
                attachment_refs: Vec::new(),
            },
        )
        .await
        .expect("analyze");

    let mut answers = AnswerMap::new();
    answers.insert("1".into(), Answer::Text("sim".into()));
    let err = h
        .pipeline
        .generate_review(&h.principal, &review.id, GenerateReviewRequest { answers })
        .await
        .expect_err("no JSON block");
    assert!(matches!(err, ApiError::GenerationFailed(_)));

    let record = h.store.get_review("t1", &review.id).expect("get").expect("exists");
    assert_eq!(record.status, ReviewStatus::Error);
}

// ── Chat intake ───────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_turn_persists_in_order_and_updates_summary() {
    let analyst = FakeAnalyst::scripted(vec![]);
    let h = harness(
        analyst,
        FakeDrafter::ok("Olá! Vamos analisar a situação da cliente."),
        Arc::new(TextRenderer),
    );

    let session = h
        .pipeline
        .create_chat_session(
            &h.principal,
            CreateChatSessionRequest {
                client_name: "Maria".into(),
                area: "consumidor".into(),
            },
        )
        .expect("create session");

    let reply = h
        .pipeline
        .send_chat_turn(
            &h.principal,
            &session.id,
            ChatTurnRequest {
                message: "Cliente relata cobrança indevida.".into(),
                attachment_ref: None,
            },
        )
        .await
        .expect("chat turn");

    let messages = h
        .store
        .list_chat_messages("t1", &session.id)
        .expect("messages");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, ChatRole::User);
    assert_eq!(messages[0].content, "Cliente relata cobrança indevida.");
    assert_eq!(messages[1].role, ChatRole::Assistant);
    assert_eq!(messages[1].id, reply.message_id);

    let session = h
        .store
        .get_chat_session("t1", &session.id)
        .expect("get")
        .expect("exists");
    assert_eq!(
        session.last_message.as_deref(),
        Some("Olá! Vamos analisar a situação da cliente.")
    );
    assert!(session.last_message_at.is_some());
}

#[tokio::test]
async fn chat_report_renders_and_lands_on_the_session() {
    let analyst = FakeAnalyst::scripted(vec![Some(CHAT_REPORT_JSON)]);
    let h = harness(
        analyst,
        FakeDrafter::ok("Entendido, seguimos."),
        Arc::new(TextRenderer),
    );

    let session = h
        .pipeline
        .create_chat_session(
            &h.principal,
            CreateChatSessionRequest {
                client_name: "Maria".into(),
                area: "consumidor".into(),
            },
        )
        .expect("create session");

    h.pipeline
        .send_chat_turn(
            &h.principal,
            &session.id,
            ChatTurnRequest {
                message: "Cliente relata cobrança indevida.".into(),
                attachment_ref: None,
            },
        )
        .await
        .expect("chat turn");

    let generated = h
        .pipeline
        .generate_chat_report(&h.principal, &session.id)
        .await
        .expect("report");
    assert_eq!(generated.report.client_name, "Maria");
    assert!(generated.document_url.contains("chat-reports"));

    let session = h
        .store
        .get_chat_session("t1", &session.id)
        .expect("get")
        .expect("exists");
    assert!(session.report_path.is_some());
    assert!(session.report_url.is_some());
}

#[tokio::test]
async fn chat_report_needs_messages() {
    let analyst = FakeAnalyst::scripted(vec![Some(CHAT_REPORT_JSON)]);
    let h = harness(analyst, FakeDrafter::ok("ok"), Arc::new(TextRenderer));

    let session = h
        .pipeline
        .create_chat_session(
            &h.principal,
            CreateChatSessionRequest {
                client_name: "Maria".into(),
                area: "consumidor".into(),
            },
        )
        .expect("create session");

    let err = h
        .pipeline
        .generate_chat_report(&h.principal, &session.id)
        .await
        .expect_err("empty session rejected");
    assert!(matches!(err, ApiError::InvalidArgument(_)));
}

// ── Downloads ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn download_urls_are_tenant_prefixed_and_signed() {
    let analyst = FakeAnalyst::scripted(vec![Some(ANALYSIS_JSON), Some(STRUCTURE_JSON)]);
    let h = harness(analyst, FakeDrafter::ok(PETITION_TEXT), Arc::new(TextRenderer));
    let id = new_petition(&h);

    h.pipeline
        .analyze_case(&h.principal, &id, analyze_request())
        .await
        .expect("analyze");
    h.pipeline
        .build_structure(&h.principal, &id, BuildStructureRequest { answers: full_answers() })
        .await
        .expect("structure");
    h.pipeline
        .generate_document(&h.principal, &id)
        .await
        .expect("generate");

    let record = h.store.get_petition("t1", &id).expect("get").expect("exists");
    let path = record.docx_path.expect("artifact path");

    let url = h
        .pipeline
        .download_url(&h.principal, &path)
        .await
        .expect("fresh url");
    assert!(url.contains("sig="));

    // Another tenant cannot mint a link for this artifact.
    let intruder = Principal {
        uid: "uid-9".into(),
        tenant_id: "t2".into(),
        role: UserRole::Admin,
    };
    let err = h
        .pipeline
        .download_url(&intruder, &path)
        .await
        .expect_err("cross-tenant download");
    assert!(matches!(err, ApiError::PermissionDenied(_)));

    // Missing artifacts are reported as such.
    let err = h
        .pipeline
        .download_url(&h.principal, "tenants/t1/petitions/nada.docx")
        .await
        .expect_err("missing artifact");
    assert!(matches!(err, ApiError::NotFound(_)));
}
