//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`jobs`] - Single job status
//! - [`transactions`] - Transaction status and submission
//! - [`system`] - Health and OpenAPI

use crate::error::ApiError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

mod jobs;
mod system;
mod transactions;

// Re-export all handlers so `routes::function_name` continues to work
pub use jobs::*;
pub use system::*;
pub use transactions::*;

// ============================================================================
// Request/Response Types (shared across handlers)
// ============================================================================

/// Response body of an accepted transaction
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionAccepted {
    /// Correlation id of the new transaction
    pub transaction_id: crate::types::TransactionId,
    /// One id per submitted job, in submission order
    pub job_execution_ids: Vec<crate::types::JobExecutionId>,
}

/// Parse a status id path segment, accepting an optional `.json` suffix
pub(crate) fn parse_status_id(raw: &str) -> Option<i64> {
    raw.strip_suffix(".json").unwrap_or(raw).parse().ok()
}

pub(crate) fn bad_id(raw: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError::with_details(
            "validation_error",
            format!("invalid id '{}'", raw),
            serde_json::json!({ "id": raw }),
        )),
    )
        .into_response()
}
