mod auth;
mod routes;

use std::sync::Arc;

use anyhow::Context;
use lexdesk_core::{
    blob::FsBlobStore,
    config::Config,
    pipeline::Pipeline,
    store::Store,
    types::{UserProfile, UserRole},
};
use lexdesk_model::{ClaudeClient, GeminiClient};
use lexdesk_render::DocxRenderer;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lexdesk_server=info,lexdesk_core=info,tower_http=debug".into()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);
    if config.auth_secret.is_empty() {
        anyhow::bail!("AUTH_SECRET not configured");
    }
    if config.url_signing_key.is_empty() {
        anyhow::bail!("URL_SIGNING_KEY not configured");
    }

    std::fs::create_dir_all(&config.data_dir).context("create data dir")?;
    std::fs::create_dir_all(&config.blob_dir).context("create blob dir")?;

    let db_path = format!("{}/lexdesk.db", config.data_dir);
    let store = Arc::new(Store::open(&db_path).context("open store")?);
    store.migrate().context("migrate store")?;

    bootstrap_tenant(&store);

    let blobs = Arc::new(FsBlobStore::new(
        config.blob_dir.clone(),
        config.public_base_url.clone(),
        config.url_signing_key.clone().into_bytes(),
        config.download_url_ttl_s,
    ));

    if config.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY not configured; analysis stages will fail");
    }
    if config.anthropic_api_key.is_empty() {
        warn!("ANTHROPIC_API_KEY not configured; generation stages will fail");
    }

    let analyst = Arc::new(GeminiClient::new(
        config.gemini_api_key.clone(),
        config.analysis_model.clone(),
    ));
    let drafter = Arc::new(ClaudeClient::new(
        config.anthropic_api_key.clone(),
        config.drafting_model.clone(),
    ));
    let chat_drafter = Arc::new(ClaudeClient::new(
        config.anthropic_api_key.clone(),
        config.chat_model.clone(),
    ));

    let pipeline = Arc::new(Pipeline::new(
        Arc::clone(&store),
        blobs.clone(),
        analyst,
        drafter,
        chat_drafter,
        Arc::new(DocxRenderer),
        Arc::clone(&config),
    ));

    let state = Arc::new(AppState {
        pipeline,
        store,
        blobs,
        config: Arc::clone(&config),
    });

    let app = routes::router(state).layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.web_bind, config.web_port);
    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// First-run convenience: seeds a tenant and its admin from env so the API
/// is usable before any external identity provisioning exists.
fn bootstrap_tenant(store: &Store) {
    let Ok(tenant_id) = std::env::var("BOOTSTRAP_TENANT_ID") else {
        return;
    };
    let tenant_name =
        std::env::var("BOOTSTRAP_TENANT_NAME").unwrap_or_else(|_| tenant_id.clone());
    let Ok(admin_uid) = std::env::var("BOOTSTRAP_ADMIN_UID") else {
        return;
    };
    let admin_email =
        std::env::var("BOOTSTRAP_ADMIN_EMAIL").unwrap_or_else(|_| "admin@localhost".into());

    if let Err(e) = store.upsert_tenant(&tenant_id, &tenant_name) {
        warn!("bootstrap tenant: {e}");
        return;
    }
    let profile = UserProfile {
        uid: admin_uid.clone(),
        tenant_id: tenant_id.clone(),
        email: admin_email,
        display_name: "Administrador".into(),
        role: UserRole::Admin,
        active: true,
        created_at: chrono::Utc::now(),
    };
    if let Err(e) = store
        .insert_user(&profile)
        .and_then(|()| store.set_user_index(&admin_uid, &tenant_id))
    {
        warn!("bootstrap admin: {e}");
        return;
    }
    info!("bootstrapped tenant {tenant_id} with admin {admin_uid}");
}
