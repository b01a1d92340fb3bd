//! Approval application routes.
//!
//! - `POST /api/applications`                       submit an application
//! - `POST /api/applications/{id}/approve`          record one decision
//! - `POST /api/applications/bulk-approve`          record decisions all-or-nothing
//! - `GET  /api/applications/{id}`                  application with its steps
//! - `POST /api/applications/bulk-get`              several applications, request order
//! - `GET  /api/applications/origin/{table}/{key}`  latest application for a record

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use itgov_core::approvals::{ApprovalService, BulkDecisionSummary, Clock, DecisionRequest};
use itgov_core::domain::application::{
    ApplicationId, ApprovalChain, ApprovalStep, OriginRef, SubmitApplication,
};
use itgov_core::errors::{ApprovalError, InterfaceError};
use itgov_db::{OriginStatus, RepositoryError, SqlApplicationRepository, SqlApprovalStore};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApplicationsState {
    repository: Arc<SqlApplicationRepository>,
    approvals: Arc<ApprovalService<SqlApprovalStore>>,
    clock: Clock,
}

impl ApplicationsState {
    /// Submissions are dated by the same clock the service decides with.
    pub fn new(
        repository: SqlApplicationRepository,
        approvals: ApprovalService<SqlApprovalStore>,
    ) -> Self {
        let clock = approvals.clock();
        Self { repository: Arc::new(repository), approvals: Arc::new(approvals), clock }
    }
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginBody {
    pub table_code: String,
    pub key: Option<String>,
    pub sub_sequence: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
    pub title: Option<String>,
    pub detail_document: Option<String>,
    pub requester_id: String,
    pub requester_opinion: Option<String>,
    #[serde(default)]
    pub approver_ids: Vec<String>,
    pub origin: Option<OriginBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub application_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveBody {
    #[serde(default)]
    pub approver_id: String,
    pub opinion: Option<String>,
    pub outcome: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkApproveItem {
    #[serde(default)]
    pub application_id: String,
    #[serde(default)]
    pub approver_id: String,
    pub opinion: Option<String>,
    pub outcome: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkApproveBody {
    #[serde(default)]
    pub approvals: Vec<BulkApproveItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkGetBody {
    #[serde(default)]
    pub application_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OriginQuery {
    pub sub_sequence: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepView {
    pub sequence: u32,
    pub approver_id: String,
    pub decision_kind: &'static str,
    pub decision_date: Option<NaiveDate>,
    pub opinion: Option<String>,
    pub outcome: Option<&'static str>,
    pub is_final: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationView {
    pub application_id: String,
    pub title: Option<String>,
    pub detail_document: Option<String>,
    pub status: &'static str,
    pub requester_id: String,
    pub request_date: NaiveDate,
    pub requester_opinion: Option<String>,
    pub approvers: Vec<StepView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginStatusView {
    pub link_id: String,
    pub application_id: String,
    pub status: &'static str,
    pub title: Option<String>,
    pub request_date: NaiveDate,
    /// True while any application linked to the record is pending or approved.
    pub active: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub correlation_id: String,
}

/// Caller-facing failure rendered as `{error, message, correlationId}`.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Storage details stay in the logs.
        let message = match self.0 {
            InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. } => {
                self.0.user_message().to_string()
            }
            _ => self.0.message().to_string(),
        };

        let body = ErrorBody {
            error: self.0.class(),
            message,
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn approval_error(error: ApprovalError, correlation_id: &str) -> ApiError {
    warn!(
        event_name = "api.applications.failed",
        correlation_id,
        error_kind = error.kind(),
        error = %error,
        "application request failed"
    );
    ApiError(error.into_interface(correlation_id))
}

fn repository_error(error: RepositoryError, correlation_id: &str) -> ApiError {
    approval_error(error.into(), correlation_id)
}

fn not_found(id: &str, correlation_id: &str) -> ApiError {
    ApiError(ApprovalError::ApplicationNotFound(id.to_string()).into_interface(correlation_id))
}

fn step_view(step: &ApprovalStep) -> StepView {
    let decision = step.decision.as_ref();
    StepView {
        sequence: step.sequence,
        approver_id: step.approver_id.clone(),
        decision_kind: step.decision_kind().as_str(),
        decision_date: decision.map(|decision| decision.decided_on),
        opinion: decision.and_then(|decision| decision.opinion.clone()),
        outcome: decision.map(|decision| decision.outcome.as_str()),
        is_final: step.is_final,
    }
}

fn application_view(chain: ApprovalChain) -> ApplicationView {
    let approvers = chain.steps.iter().map(step_view).collect();
    let application = chain.application;
    ApplicationView {
        application_id: application.id.0,
        title: application.title,
        detail_document: application.detail_document,
        status: application.status.as_str(),
        requester_id: application.requester_id,
        request_date: application.request_date,
        requester_opinion: application.requester_opinion,
        approvers,
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: ApplicationsState) -> Router {
    Router::new()
        .route("/api/applications", post(submit_application))
        .route("/api/applications/bulk-approve", post(bulk_approve))
        .route("/api/applications/bulk-get", post(bulk_get))
        .route("/api/applications/origin/{table}/{key}", get(origin_status))
        .route("/api/applications/{id}", get(get_application))
        .route("/api/applications/{id}/approve", post(approve_application))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn submit_application(
    State(state): State<ApplicationsState>,
    headers: HeaderMap,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let correlation_id = correlation_id(&headers);
    let request = SubmitApplication {
        title: body.title,
        detail_document: body.detail_document,
        requester_id: body.requester_id,
        requester_opinion: body.requester_opinion,
        approver_ids: body.approver_ids,
        origin: body.origin.map(|origin| OriginRef {
            table_code: origin.table_code,
            key: origin.key,
            sub_sequence: origin.sub_sequence,
        }),
    };

    let id = state
        .repository
        .submit(&request, (state.clock)())
        .await
        .map_err(|error| approval_error(error, &correlation_id))?;

    Ok((StatusCode::CREATED, Json(SubmitResponse { application_id: id.0 })))
}

async fn approve_application(
    Path(id): Path<String>,
    State(state): State<ApplicationsState>,
    headers: HeaderMap,
    Json(body): Json<ApproveBody>,
) -> Result<StatusCode, ApiError> {
    let correlation_id = correlation_id(&headers);
    let request = DecisionRequest {
        application_id: id,
        approver_id: body.approver_id,
        opinion: body.opinion,
        outcome: body.outcome,
    };

    let record = state
        .approvals
        .decide(&request)
        .await
        .map_err(|error| approval_error(error, &correlation_id))?;

    info!(
        event_name = "api.applications.decided",
        correlation_id = %correlation_id,
        application_id = %record.chain.application.id,
        status = record.status().as_str(),
        "decision accepted"
    );

    Ok(StatusCode::OK)
}

async fn bulk_approve(
    State(state): State<ApplicationsState>,
    headers: HeaderMap,
    Json(body): Json<BulkApproveBody>,
) -> Result<Json<BulkDecisionSummary>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let items: Vec<DecisionRequest> = body
        .approvals
        .into_iter()
        .map(|item| DecisionRequest {
            application_id: item.application_id,
            approver_id: item.approver_id,
            opinion: item.opinion,
            outcome: item.outcome,
        })
        .collect();

    let summary = state
        .approvals
        .bulk_decide(&items)
        .await
        .map_err(|error| approval_error(error, &correlation_id))?;

    Ok(Json(summary))
}

async fn get_application(
    Path(id): Path<String>,
    State(state): State<ApplicationsState>,
    headers: HeaderMap,
) -> Result<Json<ApplicationView>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let chain = state
        .repository
        .find_view(&ApplicationId(id.clone()))
        .await
        .map_err(|error| repository_error(error, &correlation_id))?
        .ok_or_else(|| not_found(&id, &correlation_id))?;

    Ok(Json(application_view(chain)))
}

async fn bulk_get(
    State(state): State<ApplicationsState>,
    headers: HeaderMap,
    Json(body): Json<BulkGetBody>,
) -> Result<Json<Vec<ApplicationView>>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let ids: Vec<ApplicationId> = body.application_ids.into_iter().map(ApplicationId).collect();

    let chains = state
        .repository
        .find_views(&ids)
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;

    Ok(Json(chains.into_iter().map(application_view).collect()))
}

async fn origin_status(
    Path((table, key)): Path<(String, String)>,
    Query(query): Query<OriginQuery>,
    State(state): State<ApplicationsState>,
    headers: HeaderMap,
) -> Result<Json<OriginStatusView>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let found = state
        .repository
        .find_latest_for_origin(&table, Some(&key), query.sub_sequence)
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;

    let Some(OriginStatus { link, application }) = found else {
        return Err(not_found(&format!("{table}/{key}"), &correlation_id));
    };

    let active = state
        .repository
        .has_active_application(&table, Some(&key), query.sub_sequence)
        .await
        .map_err(|error| repository_error(error, &correlation_id))?;

    Ok(Json(OriginStatusView {
        link_id: link.id,
        application_id: application.id.0,
        status: application.status.as_str(),
        title: application.title,
        request_date: application.request_date,
        active,
    }))
}
