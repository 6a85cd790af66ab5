//! HTTP JSON API for the verification pipeline.
//!
//! Endpoints:
//! - POST /startKYB        - submit a business name, returns a job id
//! - GET  /jobStatus       - status + progress for one job
//! - GET  /jobLog          - full audit log (and result, when completed)
//! - POST /continueKYB     - resume an action_required job with new input
//! - GET  /searchCompany   - registry name-search pass-through
//! - GET  /companyProfile  - registry profile pass-through
//! - GET  /health          - server liveness
//!
//! Handlers are read-only: every mutation goes through the job queue and
//! is applied by the single pipeline worker. All responses are JSON;
//! error bodies carry an `error` message. CORS is permissive for local
//! use.

mod handlers;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use color_eyre::eyre::{Result, WrapErr};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use kybcheck_core::{JobQueue, Orchestrator};
use kybcheck_discovery::{DiscoveryOptions, DiscoveryService};
use kybcheck_registry::RegistryClient;
use kybcheck_resolver::{AiClient, CrnResolver};
use kybcheck_shared::AppConfig;
use kybcheck_storage::JobStore;
use kybcheck_webintel::Collector;

use self::handlers::{
    handle_company_profile, handle_continue, handle_health, handle_job_log, handle_job_status,
    handle_not_found, handle_search_company, handle_start,
};
use self::state::AppState;

/// Maximum request body size. Requests here are small JSON documents.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// A JSON response with an explicit status code.
type JsonResponse = (StatusCode, Json<serde_json::Value>);

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> JsonResponse {
    (status, Json(serde_json::json!({ "error": message })))
}

/// Build every pipeline component from config and serve until Ctrl+C.
pub async fn start_server(port: u16, config: AppConfig) -> Result<()> {
    let http_timeout = Duration::from_secs(config.pipeline.http_timeout_secs);
    let ai_timeout = Duration::from_secs(config.pipeline.ai_timeout_secs);

    let db_path = expand_home(&config.storage.db_path);
    let store = Arc::new(
        JobStore::open(&db_path)
            .await
            .wrap_err("failed to open job database")?,
    );

    // validate_api_keys has already confirmed the registry key exists.
    let registry_key = std::env::var(&config.registry.api_key_env).unwrap_or_default();
    let registry = RegistryClient::new(&config.registry.base_url, &registry_key, http_timeout)?;

    // AI and paid-search keys are optional: without them the resolver
    // falls through to registry search and discovery to SERP scraping.
    let ai_key = std::env::var(&config.ai.api_key_env).unwrap_or_default();
    let ai = AiClient::new(&config.ai.base_url, &ai_key, &config.ai.model, ai_timeout)?;
    let resolver = CrnResolver::standard(ai, registry.clone());

    let discovery = DiscoveryService::new(DiscoveryOptions {
        primary_base_url: config.search.primary_base_url.clone(),
        secondary_base_url: config.search.secondary_base_url.clone(),
        api_base_url: config.search.api_base_url.clone(),
        api_key: std::env::var(&config.search.api_key_env)
            .ok()
            .filter(|key| !key.is_empty()),
        timeout: http_timeout,
    })?;
    let collector = Collector::new(http_timeout)?;

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        resolver,
        registry.clone(),
        discovery,
        collector,
    ));
    let queue = JobQueue::start(orchestrator);

    let state = Arc::new(AppState {
        store,
        queue,
        registry,
    });

    // CORS: permissive for local use.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/startKYB", post(handle_start))
        .route("/jobStatus", get(handle_job_status))
        .route("/jobLog", get(handle_job_log))
        .route("/continueKYB", post(handle_continue))
        .route("/searchCompany", get(handle_search_company))
        .route("/companyProfile", get(handle_company_profile))
        .route("/health", get(handle_health))
        .fallback(handle_not_found)
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("failed to bind {addr}"))?;
    info!(%addr, "kybcheck server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("server error")?;

    info!("server shut down");
    Ok(())
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> std::path::PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    std::path::PathBuf::from(path)
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(%e, "failed to install Ctrl+C handler");
    }
    info!("received shutdown signal");
}
