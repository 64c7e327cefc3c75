use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{StatusCode, Uri},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::*;
use crate::notifier::WebhookNotifier;
use crate::phone;
use crate::rate_limit::SubmissionLimiter;
use crate::storage::LeadStore;
use crate::submission::SubmissionService;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Lead persistence (Postgres or in-memory).
    pub store: Arc<dyn LeadStore>,
    /// Validates, stores and schedules webhook delivery for submissions.
    pub submissions: SubmissionService,
    /// Per-client quota on `POST /api/leads`.
    pub submission_limiter: SubmissionLimiter,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn LeadStore>, notifier: WebhookNotifier) -> Self {
        let submission_limiter = SubmissionLimiter::new(config.submission_rate_limit);
        Self {
            submissions: SubmissionService::new(Arc::clone(&store), notifier),
            submission_limiter,
            store,
            config,
        }
    }
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("Invalid id: {}", raw)))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// Health check endpoint.
///
/// Exempt from the general rate limiter so uptime probes never see 429.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "University Lead Generation API is running",
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "environment": state.config.environment,
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// GET /
pub async fn welcome() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Welcome to University Lead Generation API",
        "documentation": "/docs",
        "endpoints": {
            "leads": "/api/leads",
            "health": "/api/health",
            "openapi": "/api-docs/openapi.yml",
        }
    }))
}

/// Fallback for unmatched routes.
pub async fn route_not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("Route {} not found", uri))
}

/// POST /api/leads
///
/// Stores the lead and answers immediately; the webhook is delivered in the background.
pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LeadSubmission>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let submission = body(payload)?;
    let ack = state.submissions.submit(submission).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Thank you! We will call you shortly to discuss your admission.",
            "data": ack,
        })),
    ))
}

/// GET /api/leads
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeadListQuery>,
) -> Result<Json<Value>, AppError> {
    let page = PageRequest::from_query(params.page.as_deref(), params.limit.as_deref());
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

    let filter = LeadFilter {
        stream: non_empty(params.stream)
            .map(|s| s.parse::<Stream>())
            .transpose()
            .map_err(AppError::BadRequest)?,
        call_status: non_empty(params.call_status)
            .map(|s| s.parse::<CallStatus>())
            .transpose()
            .map_err(AppError::BadRequest)?,
        search: non_empty(params.search),
    };
    tracing::debug!("Listing leads: {:?} {:?}", filter, page);

    let result = state.store.list(&filter, page).await?;
    let leads: Vec<LeadView<'_>> = result.leads.iter().map(Lead::view).collect();

    Ok(Json(json!({
        "success": true,
        "data": {
            "leads": leads,
            "pagination": Pagination::new(page, result.total),
        }
    })))
}

/// GET /api/leads/stats
pub async fn lead_stats(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let stats = state.store.aggregate_stats().await?;
    Ok(Json(json!({ "success": true, "data": stats })))
}

/// POST /api/leads/check-phone
///
/// Advisory only: always 200, and any failure reads as "not registered".
pub async fn check_phone(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CheckPhoneRequest>, JsonRejection>,
) -> Json<Value> {
    // Same folding as submissions, so `+91`/`0` variants find the stored lead
    let lookup = body(payload)
        .ok()
        .and_then(|req| req.phone_number)
        .map(|raw| phone::standardize(&raw).unwrap_or_else(|| phone::clean(&raw)))
        .filter(|p| !p.is_empty());

    let exists = match lookup {
        Some(phone_number) => state
            .store
            .phone_exists(&phone_number)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Phone lookup failed, reporting as available: {}", e);
                false
            }),
        None => false,
    };

    Json(json!({
        "success": true,
        "data": {
            "exists": exists,
            "message": if exists {
                "This phone number is already registered"
            } else {
                "Phone number is available"
            },
        }
    }))
}

/// GET /api/leads/:id
pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let lead = state.store.find_by_id(parse_id(&id)?).await?;
    Ok(Json(json!({ "success": true, "data": lead.view() })))
}

/// PATCH /api/leads/:id/status
pub async fn update_lead_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id(&id)?;
    let request = body(payload)?;

    let call_status = request
        .call_status
        .as_deref()
        .ok_or_else(|| {
            AppError::Validation(vec![FieldError::new("callStatus", "Call status is required")])
        })?
        .parse::<CallStatus>()
        .map_err(|_| {
            AppError::Validation(vec![FieldError::new(
                "callStatus",
                format!(
                    "Call status must be one of: {}",
                    CallStatus::ALL.map(|s| s.as_str()).join(", ")
                ),
            )])
        })?;

    let lead = state
        .store
        .update_status(
            id,
            StatusUpdate {
                call_status,
                call_details: request.call_details,
            },
        )
        .await?;
    tracing::info!("Lead status updated: {} -> {}", lead.id, lead.call_status);

    Ok(Json(json!({
        "success": true,
        "message": "Lead status updated successfully",
        "data": lead.view(),
    })))
}

/// DELETE /api/leads/:id
pub async fn delete_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id(&id)?;
    state.store.delete(id).await?;
    tracing::info!("Lead deleted: {}", id);

    Ok(Json(json!({
        "success": true,
        "message": "Lead deleted successfully",
    })))
}
