//! Shutdown coordination.

use crate::error::Result;
use crate::types::Event;
use std::time::Duration;

use super::GrabClient;

/// How long shutdown waits for running jobs before giving up on them
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl GrabClient {
    /// Gracefully shut down the client
    ///
    /// 1. Stops accepting new transactions and jobs
    /// 2. Waits (up to 30 seconds) for accepted jobs to finish their cleanup
    /// 3. Emits [`Event::Shutdown`]
    ///
    /// Jobs are never cancelled: a job still running at the timeout keeps
    /// its task and finishes on its own. If the process exits first, the
    /// job is marked failed the next time the database is opened.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_with_timeout(SHUTDOWN_TIMEOUT).await
    }

    pub(crate) async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.job_state
            .accepting_new
            .store(false, std::sync::atomic::Ordering::SeqCst);
        tracing::info!("Stopped accepting new transactions");

        match tokio::time::timeout(timeout, self.wait_for_active_jobs()).await {
            Ok(()) => tracing::info!("All running jobs finished"),
            Err(_) => tracing::warn!(
                remaining = self.active_jobs(),
                "Timeout waiting for jobs to finish, proceeding with shutdown"
            ),
        }

        let _ = self.event_tx.send(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn wait_for_active_jobs(&self) {
        loop {
            let active_count = self.active_jobs();
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for running jobs to finish");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
