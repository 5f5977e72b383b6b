//! Job coordination split into focused submodules.
//!
//! The `GrabClient` struct and its methods are organized by domain:
//! - [`job`] - Setup, processing and cleanup of a single job
//! - [`transaction`] - Transaction submission and concurrent job spawning
//! - [`lifecycle`] - Shutdown coordination

mod job;
mod lifecycle;
mod transaction;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use transaction::TransactionHandle;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::session::{FsRepository, RepositorySessionProvider};
use crate::steps::{DeleteBeforeWriteGuard, ProcessingStep, ValidationPolicy, default_steps};
use crate::transport::{ContentSource, HttpContentSource};
use crate::types::JobExecutionId;
use job::JobCoordinator;
use std::collections::HashSet;
use std::sync::Arc;

/// External collaborators a job runs against
///
/// [`GrabClient::new`] wires the production set from [`Config`]; embedders
/// and tests can supply their own through [`GrabClient::with_collaborators`].
#[derive(Clone)]
pub struct Collaborators {
    /// Opens the content stream for a job
    pub source: Arc<dyn ContentSource>,
    /// Opens destination sessions
    pub sessions: Arc<dyn RepositorySessionProvider>,
    /// Steps run in order while resources are bound
    pub steps: Vec<Arc<dyn ProcessingStep>>,
    /// Guard evaluated before the first step
    pub policy: Arc<dyn ValidationPolicy>,
}

impl Collaborators {
    /// HTTP source, filesystem destination, default steps and guard
    pub fn from_config(config: &Config) -> Self {
        Self {
            source: Arc::new(HttpContentSource::new(config.transport.clone())),
            sessions: Arc::new(FsRepository::new(
                config.jobs.destination_root.clone(),
                config.jobs.allowed_identities.clone(),
            )),
            steps: default_steps(),
            policy: Arc::new(DeleteBeforeWriteGuard),
        }
    }
}

/// Jobs currently spawned or running, plus the flag gating new work
#[derive(Clone)]
pub(crate) struct JobState {
    /// Semaphore bounding concurrently running jobs
    pub(crate) concurrent_limit: Arc<tokio::sync::Semaphore>,
    /// Jobs accepted and not yet finished
    pub(crate) active_jobs: Arc<std::sync::Mutex<HashSet<JobExecutionId>>>,
    /// Cleared during shutdown
    pub(crate) accepting_new: Arc<std::sync::atomic::AtomicBool>,
}

/// Main grab client (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct GrabClient {
    /// Job status store
    /// Public for integration tests to query job status
    pub db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<crate::types::Event>,
    /// Configuration
    pub(crate) config: Arc<Config>,
    /// Runs individual jobs
    pub(crate) coordinator: Arc<JobCoordinator>,
    /// Concurrency and shutdown state
    pub(crate) job_state: JobState,
}

impl GrabClient {
    /// Create a client with the production collaborators
    ///
    /// Opens (or creates) the SQLite database, runs migrations and fails any
    /// job a previous process left running.
    pub async fn new(config: Config) -> Result<Self> {
        let collaborators = Collaborators::from_config(&config);
        Self::with_collaborators(config, collaborators).await
    }

    /// Create a client with caller-supplied collaborators
    pub async fn with_collaborators(config: Config, collaborators: Collaborators) -> Result<Self> {
        let db = Database::new(&config.persistence.database_path).await?;

        let orphaned = db.fail_orphaned_jobs(job::now_ms()).await?;
        if orphaned > 0 {
            tracing::warn!(count = orphaned, "marked jobs interrupted by a previous run as failed");
        }

        // Buffer of 1000 events per subscriber
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let db = Arc::new(db);
        let coordinator = Arc::new(JobCoordinator::new(
            db.clone(),
            event_tx.clone(),
            collaborators,
            config.jobs.node_report_interval,
        ));

        let job_state = JobState {
            concurrent_limit: Arc::new(tokio::sync::Semaphore::new(
                config.jobs.max_concurrent_jobs.max(1),
            )),
            active_jobs: Arc::new(std::sync::Mutex::new(HashSet::new())),
            accepting_new: Arc::new(std::sync::atomic::AtomicBool::new(true)),
        };

        Ok(Self {
            db,
            event_tx,
            config: Arc::new(config),
            coordinator,
            job_state,
        })
    }

    /// Subscribe to coordinator events
    ///
    /// Each subscriber receives every event sent after it subscribed.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<crate::types::Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn get_config(&self) -> Arc<Config> {
        self.config.clone()
    }

    /// Number of transfer contexts currently bound to a job
    ///
    /// Zero whenever no job is between setup and cleanup.
    pub fn active_contexts(&self) -> usize {
        self.coordinator.gauge().live()
    }

    /// Number of jobs accepted and not yet finished
    pub fn active_jobs(&self) -> usize {
        self.job_state
            .active_jobs
            .lock()
            .map(|jobs| jobs.len())
            .unwrap_or(0)
    }

    /// Spawn the status API server in a background task
    pub fn spawn_api_server(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let client = self.clone();
        let config = self.get_config();

        tokio::spawn(async move { crate::api::start_api_server(client, config).await })
    }
}
