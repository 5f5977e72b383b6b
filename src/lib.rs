//! # grabbit
//!
//! Coordinates content grab jobs: each job copies one repository subtree
//! from a source server, streamed over authenticated HTTP, into a
//! destination repository, and publishes its status for external pollers.
//!
//! ## Job lifecycle
//!
//! - **Setup** - build the grab URL, open the content stream with
//!   preemptive Basic auth, then open a destination session
//! - **Processing** - a validation policy, then the processing steps, run
//!   against a per-job [`context::TransferResourceContext`]
//! - **Cleanup** - the stream is closed and the session logged out, best
//!   effort, and the terminal exit code and elapsed time are recorded once
//!
//! ## Quick Start
//!
//! ```no_run
//! use grabbit::{Config, GrabClient, JobConfiguration, TransactionRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = GrabClient::new(Config::default()).await?;
//!
//!     // Subscribe to events
//!     let mut events = client.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let job: JobConfiguration = serde_json::from_value(serde_json::json!({
//!         "path": "/content/site",
//!         "excludePaths": "/content/site/archive*/content/site/drafts",
//!         "host": "author.example.com",
//!         "port": 4502,
//!         "serverUsername": "admin",
//!         "serverPassword": "admin",
//!         "clientUsername": "admin"
//!     }))?;
//!
//!     let handle = client.start_transaction(TransactionRequest { jobs: vec![job] }).await?;
//!     for status in handle.join().await? {
//!         println!("{} finished: {}", status.path, status.exit_status.exit_code);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Per-job transfer resources
pub mod context;
/// Job coordination (decomposed into focused submodules)
pub mod coordinator;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Grab request construction
pub mod request;
/// Destination repository sessions
pub mod session;
/// Processing steps and validation policies
pub mod steps;
/// Authenticating HTTP transport
pub mod transport;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, JobConfiguration, TransactionRequest};
pub use context::{ReleaseOutcome, ReleaseReport, TransferResourceContext};
pub use coordinator::{Collaborators, GrabClient, TransactionHandle};
pub use db::Database;
pub use error::{
    ApiError, DatabaseError, Error, ErrorDetail, Result, SessionError, ToHttpStatus,
    TransportError,
};
pub use session::{FsRepository, NodeRecord, RepositorySession, RepositorySessionProvider};
pub use steps::{ProcessingStep, ValidationPolicy};
pub use types::{Event, ExitCode, ExitStatus, JobExecutionId, JobStatus, TransactionId};

/// Helper function to run the client with graceful signal handling.
///
/// Waits for a termination signal and then calls the client's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use grabbit::{Config, GrabClient, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Arc::new(GrabClient::new(Config::default()).await?);
///     let _api = client.spawn_api_server();
///
///     // Run with automatic signal handling
///     run_with_shutdown((*client).clone()).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(client: GrabClient) -> Result<()> {
    wait_for_signal().await;
    client.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
