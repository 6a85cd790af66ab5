//! HTTP route handlers for the verification API.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use tracing::error;

use kybcheck_core::{JobRequest, percent_complete};
use kybcheck_registry::validate_crn_format;
use kybcheck_shared::{ContinueInput, JobId, JobStatus, KybError, LogEvent, RequiredFields};
use kybcheck_storage::JobStore;

use super::state::AppState;
use super::{JsonResponse, json_error};

// ---------------------------------------------------------------------------
// Request / query shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct StartRequest {
    #[serde(default)]
    business_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobQuery {
    job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NameQuery {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CrnQuery {
    crn: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContinueRequest {
    job_id: String,
    #[serde(default)]
    crn: Option<String>,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    website: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> JsonResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> JsonResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// POST /startKYB
pub(crate) async fn handle_start(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> JsonResponse {
    let name = request.business_name.trim();
    if name.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "business_name is required");
    }

    let job_id = JobId::new();
    if let Err(e) = state.store.create_job(job_id, name).await {
        return internal_error(e);
    }
    if let Err(e) = state.queue.submit(JobRequest::Start { job_id }) {
        return internal_error(e);
    }

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "job_id": job_id.to_string() })),
    )
}

/// GET /jobStatus?job_id=
pub(crate) async fn handle_job_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobQuery>,
) -> JsonResponse {
    let job_id = match parse_job_id(query.job_id.as_deref()) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let job = match state.store.get_job(job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "no such job"),
        Err(e) => return internal_error(e),
    };

    let log_len = state.store.log_count(job_id).await.unwrap_or(0);
    let requires_action = job.status == JobStatus::ActionRequired;

    let mut body = serde_json::json!({
        "job_id": job_id.to_string(),
        "status": job.status.as_str(),
        "created_at": job.created_at.to_rfc3339(),
        "last_updated": job.updated_at.to_rfc3339(),
        "requires_action": requires_action,
        "percent_complete": percent_complete(job.status, log_len),
    });

    if requires_action {
        if let Some((message, fields)) = latest_action_required(&state.store, job_id).await {
            body["message"] = serde_json::Value::String(message);
            body["required_fields"] = serde_json::to_value(fields).unwrap_or_default();
        }
    }

    (StatusCode::OK, Json(body))
}

/// GET /jobLog?job_id=
pub(crate) async fn handle_job_log(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobQuery>,
) -> JsonResponse {
    let job_id = match parse_job_id(query.job_id.as_deref()) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let job = match state.store.get_job(job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "no such job"),
        Err(e) => return internal_error(e),
    };

    let entries = match state.store.log_entries(job_id).await {
        Ok(entries) => entries,
        Err(e) => return internal_error(e),
    };
    let log: Vec<serde_json::Value> = entries
        .iter()
        .map(|entry| render_log_entry(&entry.entry_json))
        .collect();

    let mut body = serde_json::json!({
        "job_id": job_id.to_string(),
        "business_name": job.business_name,
        "status": job.status.as_str(),
        "log": log,
    });

    if let Some(result) = &job.result {
        body["result"] = serde_json::to_value(result)
            .unwrap_or(serde_json::json!({ "serialization_error": true }));
    }
    if job.status == JobStatus::ActionRequired {
        if let Some((_, fields)) = latest_action_required(&state.store, job_id).await {
            body["required_fields"] = serde_json::to_value(fields).unwrap_or_default();
        }
    }

    (StatusCode::OK, Json(body))
}

/// POST /continueKYB
pub(crate) async fn handle_continue(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ContinueRequest>,
) -> JsonResponse {
    let job_id = match parse_job_id(Some(&request.job_id)) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let job = match state.store.get_job(job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "no such job"),
        Err(e) => return internal_error(e),
    };

    if job.status != JobStatus::ActionRequired {
        return json_error(
            StatusCode::BAD_REQUEST,
            &format!(
                "job is not awaiting input (status: {}); continuation applies only to \
                 action_required jobs",
                job.status
            ),
        );
    }

    let input = ContinueInput {
        crn: request.crn,
        company_name: request.company_name,
        website: request.website,
    };
    if let Err(e) = state.queue.submit(JobRequest::Continue { job_id, input }) {
        return internal_error(e);
    }

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "job_id": job_id.to_string() })),
    )
}

/// GET /searchCompany?name=
pub(crate) async fn handle_search_company(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NameQuery>,
) -> JsonResponse {
    let Some(name) = query.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
        return json_error(StatusCode::BAD_REQUEST, "name query parameter is required");
    };

    match state.registry.search_companies(name).await {
        Ok(items) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "items": serde_json::to_value(items).unwrap_or_default()
            })),
        ),
        Err(e) => registry_error(e),
    }
}

/// GET /companyProfile?crn=
pub(crate) async fn handle_company_profile(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CrnQuery>,
) -> JsonResponse {
    let Some(crn) = query.crn.as_deref().map(str::trim).filter(|c| !c.is_empty()) else {
        return json_error(StatusCode::BAD_REQUEST, "crn query parameter is required");
    };
    if !validate_crn_format(crn) {
        return json_error(
            StatusCode::BAD_REQUEST,
            "crn is not a valid company registration number",
        );
    }

    match state.registry.company_profile(crn).await {
        Ok(fetched) => (StatusCode::OK, Json(fetched.raw)),
        Err(e) => registry_error(e),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_job_id(raw: Option<&str>) -> Result<JobId, JsonResponse> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "job_id is required",
        ));
    };
    raw.parse::<JobId>()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "job_id is not a valid job id"))
}

/// Parse a stored log entry for output; malformed rows degrade to a
/// sentinel rather than failing the whole response.
fn render_log_entry(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or(serde_json::json!({ "serialization_error": true }))
}

/// The message and required fields of the most recent `action_required`
/// log entry.
async fn latest_action_required(
    store: &JobStore,
    job_id: JobId,
) -> Option<(String, RequiredFields)> {
    let entries = store.log_entries(job_id).await.ok()?;
    entries.iter().rev().find_map(|stored| {
        match stored.parse().ok()?.event {
            LogEvent::ActionRequired {
                message,
                required_fields,
            } => Some((message, required_fields)),
            _ => None,
        }
    })
}

fn internal_error(e: KybError) -> JsonResponse {
    error!(%e, "request failed");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

fn registry_error(e: KybError) -> JsonResponse {
    match e {
        KybError::RegistryNotFound(_) => json_error(StatusCode::NOT_FOUND, "no such company"),
        KybError::RegistryRateLimit(_) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "registry rate limit hit")
        }
        KybError::RegistryAuth(_) => {
            json_error(StatusCode::BAD_GATEWAY, "registry rejected credentials")
        }
        other => {
            error!(%other, "registry request failed");
            json_error(StatusCode::BAD_GATEWAY, "registry request failed")
        }
    }
}
