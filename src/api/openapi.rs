//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the grabbit status API
//! using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the grabbit status API
///
/// The spec can be accessed via:
/// - `/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "grabbit status API",
        version = "0.1.0",
        description = "Status polling and submission of content grab transactions",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:9090", description = "Local development server")
    ),
    paths(
        // Status polling
        crate::api::routes::get_job_status,
        crate::api::routes::get_transaction_status,

        // Submission
        crate::api::routes::submit_transaction,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        // Status documents from types.rs
        crate::types::JobStatus,
        crate::types::ExitStatus,
        crate::types::ExitCode,
        crate::types::JobExecutionId,
        crate::types::TransactionId,

        // Request types from config.rs
        crate::config::TransactionRequest,
        crate::config::JobConfiguration,

        // Response types from routes
        crate::api::routes::TransactionAccepted,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "jobs", description = "Job status - Poll a single grab job"),
        (name = "transactions", description = "Transactions - Submit grab jobs and poll them as a group"),
        (name = "system", description = "System endpoints - Health checks and OpenAPI spec"),
    )
)]
pub struct ApiDoc;
