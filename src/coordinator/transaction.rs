//! Transaction submission and concurrent job spawning.

use super::{GrabClient, JobState};
use crate::config::{JobConfiguration, TransactionRequest};
use crate::error::{Error, Result};
use crate::request::build_grab_url;
use crate::types::{JobExecutionId, JobStatus, TransactionId};
use std::sync::atomic::Ordering;
use tokio::task::JoinHandle;

/// Handle to a submitted transaction
///
/// Dropping the handle does not stop the jobs; they keep running and their
/// status stays available through the database.
#[derive(Debug)]
pub struct TransactionHandle {
    /// Correlation id shared by every job of the transaction
    pub transaction_id: TransactionId,
    /// Job ids in submission order
    pub job_ids: Vec<JobExecutionId>,
    tasks: Vec<JoinHandle<Result<JobStatus>>>,
}

impl TransactionHandle {
    /// Wait for every job and return their final statuses in submission order
    pub async fn join(self) -> Result<Vec<JobStatus>> {
        let mut statuses = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            let status = task
                .await
                .map_err(|e| Error::Other(format!("job task failed: {}", e)))??;
            statuses.push(status);
        }
        Ok(statuses)
    }
}

// Removes the job from the active set when its task ends, even on panic.
struct ActiveJobGuard {
    id: JobExecutionId,
    job_state: JobState,
}

impl ActiveJobGuard {
    fn register(id: JobExecutionId, job_state: &JobState) -> Self {
        if let Ok(mut active) = job_state.active_jobs.lock() {
            active.insert(id);
        }
        Self {
            id,
            job_state: job_state.clone(),
        }
    }
}

impl Drop for ActiveJobGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.job_state.active_jobs.lock() {
            active.remove(&self.id);
        }
    }
}

impl GrabClient {
    /// Submit a transaction and start its jobs
    ///
    /// Every job is validated and its grab URL built before anything is
    /// persisted, so a configuration error leaves no trace. Jobs then run
    /// concurrently, at most `max_concurrent_jobs` at a time, with no
    /// ordering between them and no retries.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has begun
    /// - [`Error::Config`] if any job configuration is invalid
    pub async fn start_transaction(&self, request: TransactionRequest) -> Result<TransactionHandle> {
        self.ensure_accepting()?;
        request.validate()?;
        for job in &request.jobs {
            Self::check_job(job)?;
        }

        let paths: Vec<String> = request.jobs.iter().map(|job| job.path.clone()).collect();
        let (transaction_id, job_ids) = self
            .db
            .create_transaction_with_jobs(&paths, super::job::now_ms())
            .await?;

        tracing::info!(
            transaction_id = %transaction_id,
            jobs = job_ids.len(),
            "transaction accepted"
        );

        let tasks = job_ids
            .iter()
            .zip(request.jobs)
            .map(|(&id, job)| self.spawn_job(id, transaction_id, job))
            .collect();

        Ok(TransactionHandle {
            transaction_id,
            job_ids,
            tasks,
        })
    }

    /// Run a single job inline in its own transaction
    ///
    /// Waits for a concurrency slot like any spawned job, then runs setup,
    /// steps and cleanup on the calling task.
    pub async fn run_job(&self, job: JobConfiguration) -> Result<JobStatus> {
        self.ensure_accepting()?;
        Self::check_job(&job)?;

        let (transaction_id, job_ids) = self
            .db
            .create_transaction_with_jobs(std::slice::from_ref(&job.path), super::job::now_ms())
            .await?;
        let id = job_ids
            .first()
            .copied()
            .ok_or_else(|| Error::Other("job row was not created".to_string()))?;

        let _active = ActiveJobGuard::register(id, &self.job_state);
        let _permit = self
            .job_state
            .concurrent_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Other(format!("concurrency limit closed: {}", e)))?;

        self.coordinator.run(id, transaction_id, &job).await
    }

    fn spawn_job(
        &self,
        id: JobExecutionId,
        transaction_id: TransactionId,
        job: JobConfiguration,
    ) -> JoinHandle<Result<JobStatus>> {
        let active = ActiveJobGuard::register(id, &self.job_state);
        let limit = self.job_state.concurrent_limit.clone();
        let coordinator = self.coordinator.clone();

        tokio::spawn(async move {
            let _active = active;
            let _permit = limit
                .acquire_owned()
                .await
                .map_err(|e| Error::Other(format!("concurrency limit closed: {}", e)))?;
            coordinator.run(id, transaction_id, &job).await
        })
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.job_state.accepting_new.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }

    fn check_job(job: &JobConfiguration) -> Result<()> {
        job.validate()?;
        build_grab_url(job)?;
        Ok(())
    }
}
