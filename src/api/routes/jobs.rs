//! Job status handler.

use super::{bad_id, parse_status_id};
use crate::api::AppState;
use crate::error::ApiError;
use crate::types::JobExecutionId;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// GET /grabbit/job/:id - Status of one job
#[utoipa::path(
    get,
    path = "/grabbit/job/{id}",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job execution ID, optionally suffixed with .json")
    ),
    responses(
        (status = 200, description = "Job status", body = crate::types::JobStatus),
        (status = 400, description = "Malformed job ID", body = crate::error::ApiError),
        (status = 404, description = "Job not found", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError)
    )
)]
pub async fn get_job_status(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let Some(id) = parse_status_id(&raw) else {
        return bad_id(&raw);
    };

    match state.client.db.get_job_status(JobExecutionId(id)).await {
        Ok(Some(status)) => (StatusCode::OK, Json(status)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiError::not_found(format!("job {}", id))),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(job_id = id, error = %e, "Failed to load job status");
            e.into_response()
        }
    }
}
