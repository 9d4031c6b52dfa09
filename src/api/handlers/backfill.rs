//! Backfill job handlers: create, list, get, delete, lifecycle, logs.

use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::auth::CallerIdentity;
use crate::api::dto::{
    CreateJobRequest, JobEnvelope, JobListParams, JobListResponse, LifecycleResponse,
    LogListParams, LogListResponse, MessageResponse, PageParams, ResumeRequest,
};
use crate::app_state::AppState;
use crate::domain::{JobId, JobStatus, LogLevel};
use crate::error::{ErrorResponse, ServiceError};
use crate::persistence::JobFilter;
use crate::service::BackfillExecutor;

/// `POST /backfill/jobs` — Create a backfill job.
///
/// # Errors
///
/// Returns [`ServiceError`] on invalid configuration or unknown source.
#[utoipa::path(
    post,
    path = "/api/v1/backfill/jobs",
    tag = "Backfill",
    summary = "Create a backfill job",
    description = "Creates a job in `pending` state. With `execute_immediately` an executor task is launched right away; its progress is observable through the job row and logs.",
    request_body = CreateJobRequest,
    responses(
        (status = 201, description = "Job created", body = JobEnvelope),
        (status = 400, description = "Invalid configuration", body = ErrorResponse),
        (status = 404, description = "Source not found", body = ErrorResponse),
    )
)]
pub async fn create_job(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(req): Json<CreateJobRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let job = state
        .job_service
        .create_job(req.source_id, req.kind, &caller.0)
        .await?;

    if req.execute_immediately {
        BackfillExecutor::spawn(Arc::clone(&state.executor), job.id);
    }

    Ok((StatusCode::CREATED, Json(JobEnvelope { job })))
}

/// `GET /backfill/jobs` — List jobs, newest first.
///
/// # Errors
///
/// Returns [`ServiceError`] on unparseable filters.
#[utoipa::path(
    get,
    path = "/api/v1/backfill/jobs",
    tag = "Backfill",
    summary = "List backfill jobs",
    params(JobListParams),
    responses(
        (status = 200, description = "Job list", body = JobListResponse),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
    )
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(ServiceError::Validation)?;
    if let Some(job_type) = params.job_type.as_deref()
        && !matches!(job_type, "full_historical" | "date_range")
    {
        return Err(ServiceError::Validation(format!(
            "unknown job type: {job_type}"
        )));
    }
    let page = PageParams::from_options(params.limit, params.offset);

    let jobs = state
        .job_service
        .list_jobs(&JobFilter {
            status,
            source_id: params.source_id,
            job_type: params.job_type,
            limit: Some(page.limit),
            offset: Some(page.offset),
        })
        .await?;

    Ok(Json(JobListResponse { jobs }))
}

/// `GET /backfill/jobs/{id}` — Get one job.
///
/// # Errors
///
/// Returns [`ServiceError::JobNotFound`] if the job does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/backfill/jobs/{id}",
    tag = "Backfill",
    summary = "Get a backfill job",
    params(("id" = uuid::Uuid, Path, description = "Job UUID")),
    responses(
        (status = 200, description = "Job details", body = JobEnvelope),
        (status = 404, description = "Job not found", body = ErrorResponse),
    )
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let job = state.job_service.get_job(JobId::from_uuid(id)).await?;
    Ok(Json(JobEnvelope { job }))
}

/// `DELETE /backfill/jobs/{id}` — Delete a terminal job and its logs.
///
/// # Errors
///
/// Returns [`ServiceError::Conflict`] while the job is still active.
#[utoipa::path(
    delete,
    path = "/api/v1/backfill/jobs/{id}",
    tag = "Backfill",
    summary = "Delete a backfill job",
    params(("id" = uuid::Uuid, Path, description = "Job UUID")),
    responses(
        (status = 200, description = "Job deleted", body = MessageResponse),
        (status = 404, description = "Job not found", body = ErrorResponse),
        (status = 409, description = "Job still active", body = ErrorResponse),
    )
)]
pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.job_service.delete_job(JobId::from_uuid(id)).await?;
    Ok(Json(MessageResponse {
        message: "job deleted".to_string(),
    }))
}

/// `POST /backfill/jobs/{id}/pause` — Pause a running job.
///
/// The in-flight executor finishes its current chunk, observes the new
/// status, and stops.
///
/// # Errors
///
/// Returns [`ServiceError::IllegalTransition`] unless the job is running.
#[utoipa::path(
    post,
    path = "/api/v1/backfill/jobs/{id}/pause",
    tag = "Backfill",
    summary = "Pause a running job",
    params(("id" = uuid::Uuid, Path, description = "Job UUID")),
    responses(
        (status = 200, description = "Job paused", body = LifecycleResponse),
        (status = 404, description = "Job not found", body = ErrorResponse),
        (status = 409, description = "Job not running", body = ErrorResponse),
    )
)]
pub async fn pause_job(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let job = state.job_service.pause_job(JobId::from_uuid(id)).await?;
    Ok(Json(LifecycleResponse {
        message: "job paused; the executor stops at the next chunk boundary".to_string(),
        job,
    }))
}

/// `POST /backfill/jobs/{id}/resume` — Resume a paused job.
///
/// Moves the job back to `pending` and, unless the body disables it,
/// relaunches an executor against it.
///
/// # Errors
///
/// Returns [`ServiceError::IllegalTransition`] unless the job is paused.
#[utoipa::path(
    post,
    path = "/api/v1/backfill/jobs/{id}/resume",
    tag = "Backfill",
    summary = "Resume a paused job",
    params(("id" = uuid::Uuid, Path, description = "Job UUID")),
    request_body = ResumeRequest,
    responses(
        (status = 200, description = "Job resumed", body = LifecycleResponse),
        (status = 404, description = "Job not found", body = ErrorResponse),
        (status = 409, description = "Job not paused", body = ErrorResponse),
    )
)]
pub async fn resume_job(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    body: Option<Json<ResumeRequest>>,
) -> Result<impl IntoResponse, ServiceError> {
    let req = body.map_or_else(ResumeRequest::default, |Json(req)| req);
    let job_id = JobId::from_uuid(id);
    let job = state.job_service.resume_job(job_id).await?;

    if req.execute_immediately {
        BackfillExecutor::spawn(Arc::clone(&state.executor), job_id);
    }

    Ok(Json(LifecycleResponse {
        message: "job resumed from its progress cursor".to_string(),
        job,
    }))
}

/// `POST /backfill/jobs/{id}/cancel` — Cancel a job. Irreversible.
///
/// # Errors
///
/// Returns [`ServiceError::IllegalTransition`] if the job is already
/// terminal.
#[utoipa::path(
    post,
    path = "/api/v1/backfill/jobs/{id}/cancel",
    tag = "Backfill",
    summary = "Cancel a job",
    params(("id" = uuid::Uuid, Path, description = "Job UUID")),
    responses(
        (status = 200, description = "Job cancelled", body = LifecycleResponse),
        (status = 404, description = "Job not found", body = ErrorResponse),
        (status = 409, description = "Job already terminal", body = ErrorResponse),
    )
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let job = state.job_service.cancel_job(JobId::from_uuid(id)).await?;
    Ok(Json(LifecycleResponse {
        message: "job cancelled".to_string(),
        job,
    }))
}

/// `GET /backfill/jobs/{id}/logs` — A job's logs, newest first.
///
/// # Errors
///
/// Returns [`ServiceError::JobNotFound`] if the job does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/backfill/jobs/{id}/logs",
    tag = "Backfill",
    summary = "List job logs",
    params(("id" = uuid::Uuid, Path, description = "Job UUID"), LogListParams),
    responses(
        (status = 200, description = "Log lines", body = LogListResponse),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
        (status = 404, description = "Job not found", body = ErrorResponse),
    )
)]
pub async fn job_logs(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Query(params): Query<LogListParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let level = params
        .level
        .as_deref()
        .map(str::parse::<LogLevel>)
        .transpose()
        .map_err(ServiceError::Validation)?;
    let page = PageParams::from_options(params.limit, params.offset);

    let logs = state
        .job_service
        .job_logs(JobId::from_uuid(id), level, page.limit, page.offset)
        .await?;

    Ok(Json(LogListResponse {
        logs: logs.into_iter().map(Into::into).collect(),
    }))
}

/// Backfill job routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/backfill/jobs", post(create_job).get(list_jobs))
        .route("/backfill/jobs/{id}", get(get_job).delete(delete_job))
        .route("/backfill/jobs/{id}/pause", post(pause_job))
        .route("/backfill/jobs/{id}/resume", post(resume_job))
        .route("/backfill/jobs/{id}/cancel", post(cancel_job))
        .route("/backfill/jobs/{id}/logs", get(job_logs))
}
