//! Axum HTTP handlers for the Actum service.
//!
//! Every route lives under `/api/v1`. Errors are rendered as
//! `{"error": <message>, "kind": <category>}` with the status chosen by
//! [`RootError::status`].

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{
        multipart::MultipartError,
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use actum_audit::{OverrideRequest, QueryParams};
use actum_core::{Action, EventId, InputType, PolicyVersion, RiskTier};
use actum_policy::{EvaluationRequest, ValidationError};

use crate::error::{RootError, RootResult};
use crate::views::{EventSummary, OverrideView};
use crate::AppState;

/// Multipart framing and form fields on top of the image and text limits.
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the Axum router with all endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.policy.max_image_bytes
        + state.config.policy.max_input_bytes
        + BODY_OVERHEAD_BYTES;

    let api = Router::new()
        .route("/evaluate", post(handle_evaluate))
        .route("/evaluate-with-image", post(handle_evaluate_with_image))
        .route("/audit-events", get(handle_audit_events))
        .route("/audit-events/{event_id}", get(handle_audit_event))
        .route("/audit-events/{event_id}/override", post(handle_create_override))
        .route("/audit-events/{event_id}/overrides", get(handle_list_overrides))
        .route("/audit-export/{event_id}", get(handle_audit_export))
        .route("/audit-verify", get(handle_audit_verify))
        .route("/policy-tags", get(handle_policy_tags))
        .route("/policy-packs", get(handle_policy_packs))
        .route("/policy-packs/{version}/activate", post(handle_activate_pack))
        .route("/admin-stats", get(handle_admin_stats))
        .route("/health", get(handle_health));

    Router::new()
        .nest("/api/v1", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

impl IntoResponse for RootError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = %self.kind(), "request failed");
        } else if status == StatusCode::CONFLICT {
            tracing::warn!(error = %self, "tamper detected");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        (
            status,
            Json(serde_json::json!({
                "error": self.to_string(),
                "kind": self.kind(),
            })),
        )
            .into_response()
    }
}

/// Map an extractor rejection onto the error taxonomy.
fn rejected(status: StatusCode, message: String) -> RootError {
    match status {
        StatusCode::PAYLOAD_TOO_LARGE => RootError::PayloadTooLarge(message),
        StatusCode::UNSUPPORTED_MEDIA_TYPE => ValidationError::UnsupportedMediaType(message).into(),
        _ => RootError::BadRequest(message),
    }
}

fn multipart_error(e: MultipartError) -> RootError {
    rejected(e.status(), e.body_text())
}

/// An empty or absent `policy_version` means the active pack.
fn requested_pack(raw: Option<String>) -> Option<PolicyVersion> {
    raw.filter(|v| !v.is_empty()).map(PolicyVersion::new)
}

/// Run a chain replay off the async workers.
async fn blocking<T, F>(work: F) -> RootResult<T>
where
    F: FnOnce() -> RootResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RootError::Internal(format!("blocking task failed: {}", e)))?
}

fn parse_input_type(raw: &str) -> RootResult<InputType> {
    InputType::from_str(raw).map_err(|e| ValidationError::UnsupportedInputType(e).into())
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EvaluateBody {
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_user")]
    user: String,
    #[serde(default = "default_input_type")]
    input_type: String,
    input: String,
    /// Evaluate against this published pack instead of the active one.
    #[serde(default)]
    policy_version: Option<String>,
}

fn default_client_id() -> String {
    "default".to_string()
}

fn default_user() -> String {
    "anonymous".to_string()
}

fn default_input_type() -> String {
    InputType::Text.as_str().to_string()
}

/// POST /api/v1/evaluate -- text only
async fn handle_evaluate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<EvaluateBody>, JsonRejection>,
) -> RootResult<impl IntoResponse> {
    let Json(body) = body.map_err(|r| rejected(r.status(), r.body_text()))?;
    if parse_input_type(&body.input_type)? != InputType::Text {
        return Err(ValidationError::UnsupportedInputType(format!(
            "'{}' requires /evaluate-with-image",
            body.input_type
        ))
        .into());
    }

    let pack = requested_pack(body.policy_version);
    let request = EvaluationRequest::text(body.input, body.client_id, body.user);
    let response = state.evaluate_with_pack(request, pack.as_ref()).await?;
    Ok(Json(response))
}

/// POST /api/v1/evaluate-with-image -- multipart text plus optional image
async fn handle_evaluate_with_image(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, axum::extract::multipart::MultipartRejection>,
) -> RootResult<impl IntoResponse> {
    let mut multipart = multipart.map_err(|r| rejected(r.status(), r.body_text()))?;

    let mut text = None;
    let mut client_id = default_client_id();
    let mut user = default_user();
    let mut input_type = None;
    let mut policy_version = None;
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "text" => text = Some(field.text().await.map_err(multipart_error)?),
            "client_id" => client_id = field.text().await.map_err(multipart_error)?,
            "user" => user = field.text().await.map_err(multipart_error)?,
            "input_type" => {
                let raw = field.text().await.map_err(multipart_error)?;
                input_type = Some(parse_input_type(&raw)?);
            }
            "policy_version" => {
                policy_version = Some(field.text().await.map_err(multipart_error)?);
            }
            "image" => {
                let bytes = field.bytes().await.map_err(multipart_error)?;
                image = Some(bytes.to_vec());
            }
            other => tracing::debug!(field = other, "ignoring multipart field"),
        }
    }

    let text = text.ok_or_else(|| RootError::BadRequest("missing form field 'text'".into()))?;
    let mut request = EvaluationRequest::text(text, client_id, user);
    if let Some(image) = image {
        request = request.with_image(image);
    }
    // An explicit input_type is honored so the engine can reject
    // "text" with an image attached.
    if let Some(kind) = input_type {
        request.input_type = kind;
    }

    let pack = requested_pack(policy_version);
    let response = state.evaluate_with_pack(request, pack.as_ref()).await?;
    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// Audit trail
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct AuditEventsQuery {
    decision: Option<String>,
    risk_level: Option<String>,
    user: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl AuditEventsQuery {
    fn into_params(self) -> RootResult<QueryParams> {
        let decision = match self.decision.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(Action::from_str(raw).map_err(RootError::BadRequest)?),
        };
        let risk_level = match self.risk_level.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(RiskTier::from_str(raw).map_err(RootError::BadRequest)?),
        };
        Ok(QueryParams {
            decision,
            risk_level,
            user: self.user,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

/// GET /api/v1/audit-events -- most recent first
async fn handle_audit_events(
    State(state): State<Arc<AppState>>,
    query: Result<Query<AuditEventsQuery>, QueryRejection>,
) -> RootResult<impl IntoResponse> {
    let Query(query) = query.map_err(|r| RootError::BadRequest(r.body_text()))?;
    let events = state.trail.query_events(query.into_params()?)?;
    let summaries: Vec<EventSummary> = events.into_iter().map(EventSummary::from).collect();
    Ok(Json(summaries))
}

/// GET /api/v1/audit-events/{event_id}
async fn handle_audit_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> RootResult<impl IntoResponse> {
    let event = state.trail.get_event(&EventId::new(event_id))?;
    Ok(Json(EventSummary::from(event)))
}

/// POST /api/v1/audit-events/{event_id}/override
async fn handle_create_override(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    body: Result<Json<OverrideRequest>, JsonRejection>,
) -> RootResult<impl IntoResponse> {
    let Json(request) = body.map_err(|r| rejected(r.status(), r.body_text()))?;
    let record = state
        .trail
        .record_override(&EventId::new(event_id), request)?;
    Ok((StatusCode::CREATED, Json(OverrideView::from(record))))
}

/// GET /api/v1/audit-events/{event_id}/overrides
async fn handle_list_overrides(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> RootResult<impl IntoResponse> {
    let overrides = state.trail.overrides_for(&EventId::new(event_id))?;
    let views: Vec<OverrideView> = overrides.into_iter().map(OverrideView::from).collect();
    Ok(Json(views))
}

/// GET /api/v1/audit-export/{event_id} -- 409 if the chain is broken
async fn handle_audit_export(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> RootResult<impl IntoResponse> {
    let event_id = EventId::new(event_id);
    let bundle = blocking(move || Ok(state.trail.export_bundle(&event_id)?)).await?;
    Ok(Json(bundle))
}

/// GET /api/v1/audit-verify -- full replay from genesis
async fn handle_audit_verify(State(state): State<Arc<AppState>>) -> RootResult<Response> {
    let report = blocking(move || Ok(state.trail.verify_chain()?)).await?;
    if report.valid {
        return Ok(Json(report).into_response());
    }
    tracing::warn!(
        first_invalid = ?report.first_invalid,
        reason = ?report.reason,
        "audit chain verification failed"
    );
    Ok((
        StatusCode::CONFLICT,
        Json(serde_json::json!({
            "error": report.reason.clone().unwrap_or_default(),
            "kind": "TamperDetected",
            "report": report,
        })),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Policy catalog and admin
// ---------------------------------------------------------------------------

/// GET /api/v1/policy-tags -- tags of the active pack
async fn handle_policy_tags(State(state): State<Arc<AppState>>) -> RootResult<impl IntoResponse> {
    Ok(Json(state.policy_tags()?))
}

/// GET /api/v1/policy-packs
async fn handle_policy_packs(
    State(state): State<Arc<AppState>>,
) -> RootResult<impl IntoResponse> {
    Ok(Json(state.policy_packs()?))
}

/// POST /api/v1/policy-packs/{version}/activate
async fn handle_activate_pack(
    State(state): State<Arc<AppState>>,
    Path(version): Path<String>,
) -> RootResult<impl IntoResponse> {
    let view = state.activate_pack(&PolicyVersion::new(version))?;
    Ok(Json(view))
}

/// GET /api/v1/admin-stats
async fn handle_admin_stats(State(state): State<Arc<AppState>>) -> RootResult<impl IntoResponse> {
    Ok(Json(state.admin_stats()?))
}

/// GET /api/v1/health
async fn handle_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let active_pack = state
        .engine
        .registry()
        .get_active_pack()
        .ok()
        .map(|p| p.version.to_string());

    Json(serde_json::json!({
        "status": if active_pack.is_some() { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "active_policy_version": active_pack,
        "audit_store": state.config.audit.store,
    }))
}
