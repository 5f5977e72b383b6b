//! Transaction status and submission handlers.

use super::{TransactionAccepted, bad_id, parse_status_id};
use crate::api::AppState;
use crate::config::TransactionRequest;
use crate::error::ApiError;
use crate::types::TransactionId;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// GET /grabbit/transaction/:id - Status of every job in a transaction
#[utoipa::path(
    get,
    path = "/grabbit/transaction/{id}",
    tag = "transactions",
    params(
        ("id" = String, Path, description = "Transaction ID, optionally suffixed with .json")
    ),
    responses(
        (status = 200, description = "Job statuses in creation order", body = Vec<crate::types::JobStatus>),
        (status = 400, description = "Malformed transaction ID", body = crate::error::ApiError),
        (status = 404, description = "Transaction not found", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError)
    )
)]
pub async fn get_transaction_status(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Response {
    let Some(id) = parse_status_id(&raw) else {
        return bad_id(&raw);
    };

    match state.client.db.list_transaction_jobs(TransactionId(id)).await {
        // Every transaction has at least one job
        Ok(jobs) if jobs.is_empty() => (
            StatusCode::NOT_FOUND,
            Json(ApiError::not_found(format!("transaction {}", id))),
        )
            .into_response(),
        Ok(jobs) => (StatusCode::OK, Json(jobs)).into_response(),
        Err(e) => {
            tracing::error!(transaction_id = id, error = %e, "Failed to load transaction status");
            e.into_response()
        }
    }
}

/// POST /grabbit/transaction - Start a transaction
///
/// Jobs run in the background; poll their status with the returned ids.
#[utoipa::path(
    post,
    path = "/grabbit/transaction",
    tag = "transactions",
    request_body = crate::config::TransactionRequest,
    responses(
        (status = 201, description = "Transaction accepted", body = TransactionAccepted),
        (status = 400, description = "Invalid job configuration", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError)
    )
)]
pub async fn submit_transaction(
    State(state): State<AppState>,
    Json(request): Json<TransactionRequest>,
) -> Response {
    match state.client.start_transaction(request).await {
        Ok(handle) => {
            let accepted = TransactionAccepted {
                transaction_id: handle.transaction_id,
                job_execution_ids: handle.job_ids.clone(),
            };
            // Jobs keep running after the handle is dropped
            drop(handle);
            (StatusCode::CREATED, Json(accepted)).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Rejected transaction");
            e.into_response()
        }
    }
}
