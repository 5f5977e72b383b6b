//! Setup, processing and cleanup of a single job.

use super::Collaborators;
use crate::config::JobConfiguration;
use crate::context::{ContextGauge, ProgressSink, ReleaseReport, TransferResourceContext};
use crate::db::{Database, JobCompletion};
use crate::error::{Error, Result};
use crate::types::{Event, ExitCode, JobExecutionId, JobStatus, ResourceKind, TransactionId};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::broadcast;

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn panic_payload_to_string(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic payload".to_string()
}

/// Persists progress and broadcasts it as [`Event::NodesWritten`]
struct DbProgressSink {
    db: Arc<Database>,
    event_tx: broadcast::Sender<Event>,
}

#[async_trait]
impl ProgressSink for DbProgressSink {
    async fn nodes_written(&self, job: JobExecutionId, count: u64) {
        match self.db.update_nodes_written(job, count as i64).await {
            Ok(true) => {
                let _ = self.event_tx.send(Event::NodesWritten { id: job, count });
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(job_id = %job, count, error = %e, "failed to record node progress");
            }
        }
    }
}

/// Terminal exit code and description derived from a processing result
struct Outcome {
    exit_code: ExitCode,
    description: String,
}

impl Outcome {
    fn from_result(result: &Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                exit_code: ExitCode::Completed,
                description: String::new(),
            },
            Err(Error::ValidationAbort(reason)) => Self {
                exit_code: ExitCode::ValidationFailed,
                description: reason.clone(),
            },
            Err(e) => Self {
                exit_code: ExitCode::Failed,
                description: e.to_string(),
            },
        }
    }
}

/// Runs one job from setup through cleanup
pub(crate) struct JobCoordinator {
    db: Arc<Database>,
    event_tx: broadcast::Sender<Event>,
    collaborators: Collaborators,
    progress: Arc<dyn ProgressSink>,
    report_interval: u64,
    gauge: ContextGauge,
}

impl JobCoordinator {
    pub(crate) fn new(
        db: Arc<Database>,
        event_tx: broadcast::Sender<Event>,
        collaborators: Collaborators,
        report_interval: u64,
    ) -> Self {
        let progress = Arc::new(DbProgressSink {
            db: db.clone(),
            event_tx: event_tx.clone(),
        });
        Self {
            db,
            event_tx,
            collaborators,
            progress,
            report_interval,
            gauge: ContextGauge::default(),
        }
    }

    pub(crate) fn gauge(&self) -> &ContextGauge {
        &self.gauge
    }

    /// Run a job whose row already exists, returning its final status
    ///
    /// Setup and step failures become the job's exit code; only database
    /// errors while recording the outcome are returned as `Err`.
    pub(crate) async fn run(
        &self,
        id: JobExecutionId,
        transaction_id: TransactionId,
        job: &JobConfiguration,
    ) -> Result<JobStatus> {
        let (outcome, nodes_written) = match self.db.mark_job_started(id, now_ms()).await {
            Ok(()) => {
                tracing::info!(job_id = %id, transaction_id = %transaction_id, path = %job.path, "grab job started");
                let _ = self.event_tx.send(Event::JobStarted {
                    id,
                    transaction_id,
                    path: job.path.clone(),
                });
                self.execute(id, job).await
            }
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "failed to mark grab job started");
                (Outcome::from_result(&Err(e)), 0)
            }
        };

        let completion = JobCompletion {
            exit_code: outcome.exit_code,
            exit_description: outcome.description,
            nodes_written: nodes_written as i64,
            end_time_ms: now_ms(),
        };
        if !self.db.finish_job(id, &completion).await? {
            tracing::warn!(job_id = %id, "job was already terminal, outcome not recorded");
        }

        let status = self
            .db
            .get_job_status(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job {}", id)))?;

        tracing::info!(
            job_id = %id,
            exit_code = %status.exit_status.exit_code,
            nodes = status.jcr_nodes_written,
            time_taken_ms = status.time_taken,
            "grab job finished"
        );
        let _ = self.event_tx.send(Event::JobFinished {
            id,
            exit_code: status.exit_status.exit_code,
            time_taken_ms: status.time_taken,
        });

        Ok(status)
    }

    /// Setup, processing and release; every failure becomes the outcome
    async fn execute(&self, id: JobExecutionId, job: &JobConfiguration) -> (Outcome, u64) {
        let mut ctx = match self.setup(id, job).await {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "grab job setup failed");
                return (Outcome::from_result(&Err(e)), 0);
            }
        };

        // A panicking step must still release the context and end the job.
        let result = AssertUnwindSafe(self.process(job, &mut ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                let detail = panic_payload_to_string(payload);
                tracing::error!(job_id = %id, panic = %detail, "processing step panicked");
                Err(Error::Step {
                    step: "processing".to_string(),
                    message: format!("step panicked: {}", detail),
                })
            });

        let nodes_written = ctx.nodes_written();
        let report = ctx.release().await;
        self.report_release(id, &report);
        (Outcome::from_result(&result), nodes_written)
    }

    /// Open the stream, then the session, then bind both to a fresh context
    ///
    /// If the session cannot be obtained the already-open stream is closed
    /// before the error is returned. No context exists unless both succeed.
    async fn setup(
        &self,
        id: JobExecutionId,
        job: &JobConfiguration,
    ) -> Result<TransferResourceContext> {
        let input = self.collaborators.source.open(job).await?;

        let session = match self
            .collaborators
            .sessions
            .get_session(&job.client_username)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                if let Err(close_err) = input.close().await {
                    tracing::warn!(job_id = %id, error = %close_err, "failed to close grab stream");
                    let _ = self.event_tx.send(Event::ReleaseFailed {
                        id,
                        resource: ResourceKind::InputStream,
                        error: close_err.to_string(),
                    });
                }
                return Err(e.into());
            }
        };

        Ok(TransferResourceContext::new(
            id,
            input,
            session,
            self.report_interval,
            self.progress.clone(),
            &self.gauge,
        ))
    }

    async fn process(&self, job: &JobConfiguration, ctx: &mut TransferResourceContext) -> Result<()> {
        self.collaborators
            .policy
            .check(job)
            .map_err(Error::ValidationAbort)?;

        for step in &self.collaborators.steps {
            tracing::debug!(job_id = %ctx.job_id(), step = step.name(), "running step");
            step.execute(job, ctx).await?;
        }
        Ok(())
    }

    fn report_release(&self, id: JobExecutionId, report: &ReleaseReport) {
        for (resource, error) in report.failures() {
            let _ = self.event_tx.send(Event::ReleaseFailed {
                id,
                resource,
                error: error.to_string(),
            });
        }
    }
}
