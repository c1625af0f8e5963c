use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use lexdesk_core::{
    attachments,
    blob::{BlobStore, FsBlobStore},
    config::Config,
    pipeline::{
        AnalyzeCaseRequest, AnalyzeReviewRequest, BuildStructureRequest, ChatTurnRequest,
        CreateChatSessionRequest, CreatePetitionRequest, CreateReviewRequest,
        GenerateReviewRequest, Pipeline,
    },
    render::DOCX_CONTENT_TYPE,
    store::{new_id, Store},
    types::{AiPrompts, KnowledgeDocument, OfficeSettings, Principal, UserProfile, UserRole},
    ApiError,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

// ── AppState ──────────────────────────────────────────────────────────────

pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<Store>,
    pub blobs: Arc<FsBlobStore>,
    pub config: Arc<Config>,
}

// ── Error mapping ─────────────────────────────────────────────────────────

type ApiResult<T> = Result<T, (StatusCode, Json<Value>)>;

fn fail(e: ApiError) -> (StatusCode, Json<Value>) {
    let status = match &e {
        ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
        ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        ApiError::ResourceExhausted { .. } => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("internal error: {e}");
    }
    let mut body = json!({ "error": e.user_message(), "retryable": e.retryable() });
    if let ApiError::ResourceExhausted { retry_after_s, .. } = &e {
        body["retry_after_s"] = json!(retry_after_s);
    }
    (status, Json(body))
}

fn auth(state: &AppState, headers: &HeaderMap) -> ApiResult<Principal> {
    crate::auth::authenticate(&state.store, &state.config.auth_secret, headers).map_err(fail)
}

// ── Router ────────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(health))
        // Petitions
        .route("/api/petitions", get(list_petitions).post(create_petition))
        .route("/api/petitions/:id", get(get_petition))
        .route("/api/petitions/:id/analyze", post(analyze_case))
        .route("/api/petitions/:id/structure", post(build_structure))
        .route("/api/petitions/:id/generate", post(generate_document))
        // Judge reviews
        .route("/api/reviews", get(list_reviews).post(create_review))
        .route("/api/reviews/:id", get(get_review))
        .route("/api/reviews/:id/analyze", post(analyze_for_review))
        .route("/api/reviews/:id/generate", post(generate_review))
        // Chat intake
        .route("/api/chat", get(list_chat_sessions).post(create_chat_session))
        .route("/api/chat/:id", get(get_chat_session))
        .route("/api/chat/:id/messages", post(send_chat_turn))
        .route("/api/chat/:id/report", post(generate_chat_report))
        // Knowledge base (admin)
        .route("/api/knowledge", get(list_knowledge).post(upload_knowledge))
        .route("/api/knowledge/:id", delete(delete_knowledge))
        // Users (admin)
        .route("/api/users/invite", post(invite_user))
        .route("/api/users/:uid/deactivate", post(deactivate_user))
        // Tenant settings
        .route("/api/settings/prompts", get(get_prompts).put(put_prompts))
        .route("/api/settings/office", get(get_office).put(put_office))
        // Downloads
        .route("/api/downloads", get(get_download_url))
        .route("/blobs/*path", get(serve_blob))
        .with_state(state)
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

// Petitions

async fn create_petition(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreatePetitionRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let principal = auth(&state, &headers)?;
    let petition = state
        .pipeline
        .create_petition(&principal, body)
        .map_err(fail)?;
    Ok((StatusCode::CREATED, Json(json!(petition))))
}

async fn list_petitions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let principal = auth(&state, &headers)?;
    let petitions = state
        .store
        .list_petitions(&principal.tenant_id)
        .map_err(|e| fail(e.into()))?;
    Ok(Json(json!(petitions)))
}

async fn get_petition(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let principal = auth(&state, &headers)?;
    let petition = state.pipeline.get_petition(&principal, &id).map_err(fail)?;
    Ok(Json(json!(petition)))
}

async fn analyze_case(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AnalyzeCaseRequest>,
) -> ApiResult<Json<Value>> {
    let principal = auth(&state, &headers)?;
    let analysis = state
        .pipeline
        .analyze_case(&principal, &id, body)
        .await
        .map_err(fail)?;
    Ok(Json(json!(analysis)))
}

async fn build_structure(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<BuildStructureRequest>,
) -> ApiResult<Json<Value>> {
    let principal = auth(&state, &headers)?;
    let structure = state
        .pipeline
        .build_structure(&principal, &id, body)
        .await
        .map_err(fail)?;
    Ok(Json(json!(structure)))
}

async fn generate_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let principal = auth(&state, &headers)?;
    let generated = state
        .pipeline
        .generate_document(&principal, &id)
        .await
        .map_err(fail)?;
    Ok(Json(json!(generated)))
}

// Judge reviews

async fn create_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateReviewRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let principal = auth(&state, &headers)?;
    let review = state
        .pipeline
        .create_review(&principal, body)
        .map_err(fail)?;
    Ok((StatusCode::CREATED, Json(json!(review))))
}

async fn list_reviews(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let principal = auth(&state, &headers)?;
    let reviews = state
        .store
        .list_reviews(&principal.tenant_id)
        .map_err(|e| fail(e.into()))?;
    Ok(Json(json!(reviews)))
}

async fn get_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let principal = auth(&state, &headers)?;
    let review = state.pipeline.get_review(&principal, &id).map_err(fail)?;
    Ok(Json(json!(review)))
}

async fn analyze_for_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AnalyzeReviewRequest>,
) -> ApiResult<Json<Value>> {
    let principal = auth(&state, &headers)?;
    let analysis = state
        .pipeline
        .analyze_for_review(&principal, &id, body)
        .await
        .map_err(fail)?;
    Ok(Json(json!(analysis)))
}

async fn generate_review(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<GenerateReviewRequest>,
) -> ApiResult<Json<Value>> {
    let principal = auth(&state, &headers)?;
    let generated = state
        .pipeline
        .generate_review(&principal, &id, body)
        .await
        .map_err(fail)?;
    Ok(Json(json!(generated)))
}

// Chat intake

async fn create_chat_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateChatSessionRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let principal = auth(&state, &headers)?;
    let session = state
        .pipeline
        .create_chat_session(&principal, body)
        .map_err(fail)?;
    Ok((StatusCode::CREATED, Json(json!(session))))
}

async fn list_chat_sessions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let principal = auth(&state, &headers)?;
    let sessions = state
        .store
        .list_chat_sessions(&principal.tenant_id)
        .map_err(|e| fail(e.into()))?;
    Ok(Json(json!(sessions)))
}

async fn get_chat_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let principal = auth(&state, &headers)?;
    let session = state
        .pipeline
        .get_chat_session(&principal, &id)
        .map_err(fail)?;
    let messages = state
        .store
        .list_chat_messages(&principal.tenant_id, &id)
        .map_err(|e| fail(e.into()))?;
    let mut value = json!(session);
    if let Some(obj) = value.as_object_mut() {
        obj.insert("messages".into(), json!(messages));
    }
    Ok(Json(value))
}

async fn send_chat_turn(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ChatTurnRequest>,
) -> ApiResult<Json<Value>> {
    let principal = auth(&state, &headers)?;
    let reply = state
        .pipeline
        .send_chat_turn(&principal, &id, body)
        .await
        .map_err(fail)?;
    Ok(Json(json!(reply)))
}

async fn generate_chat_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let principal = auth(&state, &headers)?;
    let generated = state
        .pipeline
        .generate_chat_report(&principal, &id)
        .await
        .map_err(fail)?;
    Ok(Json(json!(generated)))
}

// Knowledge base

#[derive(Deserialize)]
struct UploadKnowledgeBody {
    name: String,
    category: String,
    #[serde(default)]
    areas: Vec<String>,
    file_name: String,
    data_base64: String,
}

async fn list_knowledge(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let principal = auth(&state, &headers)?;
    let docs = state
        .store
        .list_knowledge(&principal.tenant_id)
        .map_err(|e| fail(e.into()))?;
    Ok(Json(json!(docs)))
}

async fn upload_knowledge(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<UploadKnowledgeBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let principal = auth(&state, &headers)?;
    crate::auth::require_admin(&principal).map_err(fail)?;
    if body.name.trim().is_empty() || body.file_name.trim().is_empty() {
        return Err(fail(ApiError::InvalidArgument(
            "Campos obrigatórios ausentes.".into(),
        )));
    }

    use base64::Engine;
    let data = base64::engine::general_purpose::STANDARD
        .decode(&body.data_base64)
        .map_err(|_| fail(ApiError::InvalidArgument("Arquivo inválido.".into())))?;

    let id = new_id();
    let blob_ref = format!(
        "tenants/{}/knowledge/{id}_{}",
        principal.tenant_id, body.file_name
    );
    state
        .blobs
        .store(&blob_ref, &data, attachments::media_type(&body.file_name))
        .await
        .map_err(|e| fail(ApiError::Internal(e.to_string())))?;

    let doc = KnowledgeDocument {
        id,
        tenant_id: principal.tenant_id.clone(),
        name: body.name,
        category: body.category,
        areas: body.areas,
        blob_ref,
        created_at: Utc::now(),
    };
    state
        .store
        .insert_knowledge(&doc)
        .map_err(|e| fail(e.into()))?;
    Ok((StatusCode::CREATED, Json(json!(doc))))
}

async fn delete_knowledge(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let principal = auth(&state, &headers)?;
    crate::auth::require_admin(&principal).map_err(fail)?;
    let deleted = state
        .store
        .delete_knowledge(&principal.tenant_id, &id)
        .map_err(|e| fail(e.into()))?;
    if !deleted {
        return Err(fail(ApiError::NotFound("Documento")));
    }
    Ok(StatusCode::NO_CONTENT)
}

// Users

#[derive(Deserialize)]
struct InviteUserBody {
    email: String,
    name: String,
    role: UserRole,
}

async fn invite_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<InviteUserBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let principal = auth(&state, &headers)?;
    crate::auth::require_admin(&principal).map_err(fail)?;
    if body.email.trim().is_empty() || body.name.trim().is_empty() {
        return Err(fail(ApiError::InvalidArgument(
            "email e name são obrigatórios.".into(),
        )));
    }

    let uid = new_id();
    let profile = UserProfile {
        uid: uid.clone(),
        tenant_id: principal.tenant_id.clone(),
        email: body.email,
        display_name: body.name,
        role: body.role,
        active: true,
        created_at: Utc::now(),
    };
    state
        .store
        .insert_user(&profile)
        .map_err(|e| fail(e.into()))?;
    state
        .store
        .set_user_index(&uid, &principal.tenant_id)
        .map_err(|e| fail(e.into()))?;

    // Credential issuance and invite delivery are external concerns; the
    // admin receives the uid to hand off to the identity provider.
    Ok((StatusCode::CREATED, Json(json!({ "uid": uid }))))
}

async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(uid): Path<String>,
) -> ApiResult<Json<Value>> {
    let principal = auth(&state, &headers)?;
    crate::auth::require_admin(&principal).map_err(fail)?;
    if uid == principal.uid {
        return Err(fail(ApiError::InvalidArgument(
            "Você não pode desativar sua própria conta.".into(),
        )));
    }
    let updated = state
        .store
        .set_user_active(&principal.tenant_id, &uid, false)
        .map_err(|e| fail(e.into()))?;
    if !updated {
        return Err(fail(ApiError::NotFound("Usuário")));
    }
    Ok(Json(json!({ "deactivated": uid })))
}

// Tenant settings

async fn get_prompts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let principal = auth(&state, &headers)?;
    let prompts = state
        .store
        .get_prompts(&principal.tenant_id)
        .map_err(|e| fail(e.into()))?;
    Ok(Json(json!(prompts)))
}

async fn put_prompts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<AiPrompts>,
) -> ApiResult<StatusCode> {
    let principal = auth(&state, &headers)?;
    crate::auth::require_admin(&principal).map_err(fail)?;
    state
        .store
        .set_prompts(&principal.tenant_id, &body)
        .map_err(|e| fail(e.into()))?;
    Ok(StatusCode::OK)
}

async fn get_office(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let principal = auth(&state, &headers)?;
    let office = state
        .store
        .get_office(&principal.tenant_id)
        .map_err(|e| fail(e.into()))?
        .unwrap_or_default();
    Ok(Json(json!(office)))
}

async fn put_office(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<OfficeSettings>,
) -> ApiResult<StatusCode> {
    let principal = auth(&state, &headers)?;
    crate::auth::require_admin(&principal).map_err(fail)?;
    state
        .store
        .set_office(&principal.tenant_id, &body)
        .map_err(|e| fail(e.into()))?;
    Ok(StatusCode::OK)
}

// Downloads

#[derive(Deserialize)]
struct DownloadQuery {
    path: String,
}

async fn get_download_url(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<DownloadQuery>,
) -> ApiResult<Json<Value>> {
    let principal = auth(&state, &headers)?;
    let url = state
        .pipeline
        .download_url(&principal, &q.path)
        .await
        .map_err(fail)?;
    Ok(Json(json!({ "url": url })))
}

#[derive(Deserialize)]
struct SignedQuery {
    expires: i64,
    sig: String,
}

/// Target of signed URLs. Authorization is the signature itself, so no
/// bearer token is required here.
async fn serve_blob(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(q): Query<SignedQuery>,
) -> Response {
    let now = Utc::now().timestamp();
    if !state.blobs.verify_signature(&path, q.expires, &q.sig, now) {
        return (StatusCode::FORBIDDEN, "link expirado ou inválido").into_response();
    }
    match state.blobs.fetch(&path).await {
        Ok(bytes) => {
            let content_type = if path.ends_with(".docx") {
                DOCX_CONTENT_TYPE
            } else {
                attachments::media_type(&path)
            };
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(_) => (StatusCode::NOT_FOUND, "arquivo não encontrado").into_response(),
    }
}
