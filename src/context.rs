//! Per-job transfer resources.
//!
//! A [`TransferResourceContext`] binds the inbound content stream and the
//! destination session for one job. It is created by the coordinator at
//! setup, lent to each processing step as `&mut`, and consumed by
//! [`TransferResourceContext::release`] at cleanup. Ownership makes it
//! impossible for a later job on the same task to see a stale stream or
//! session.

use crate::session::RepositorySession;
use crate::transport::InputStream;
use crate::types::{JobExecutionId, ResourceKind};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Receives node-count progress for a job
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Called each time the reported count advances
    async fn nodes_written(&self, job: JobExecutionId, count: u64);
}

/// [`ProgressSink`] that discards progress
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn nodes_written(&self, _job: JobExecutionId, _count: u64) {}
}

/// Counts live contexts so callers can verify nothing was left bound
#[derive(Clone, Debug, Default)]
pub struct ContextGauge(Arc<AtomicUsize>);

impl ContextGauge {
    /// Number of contexts currently bound
    pub fn live(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> GaugeGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        GaugeGuard(self.0.clone())
    }
}

// Decrements on drop, so a context that unwinds still leaves the gauge clean.
struct GaugeGuard(Arc<AtomicUsize>);

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Content stream and destination session bound to one running job
pub struct TransferResourceContext {
    job_id: JobExecutionId,
    input: Box<dyn InputStream>,
    session: Box<dyn RepositorySession>,
    nodes_written: u64,
    report_interval: u64,
    progress: Arc<dyn ProgressSink>,
    _guard: GaugeGuard,
}

impl TransferResourceContext {
    /// Bind a stream and a session to a job
    pub fn new(
        job_id: JobExecutionId,
        input: Box<dyn InputStream>,
        session: Box<dyn RepositorySession>,
        report_interval: u64,
        progress: Arc<dyn ProgressSink>,
        gauge: &ContextGauge,
    ) -> Self {
        Self {
            job_id,
            input,
            session,
            nodes_written: 0,
            report_interval: report_interval.max(1),
            progress,
            _guard: gauge.acquire(),
        }
    }

    /// Job this context belongs to
    pub fn job_id(&self) -> JobExecutionId {
        self.job_id
    }

    /// The inbound content stream
    pub fn input(&mut self) -> &mut dyn InputStream {
        self.input.as_mut()
    }

    /// The destination write session
    pub fn session(&mut self) -> &mut dyn RepositorySession {
        self.session.as_mut()
    }

    /// Exact number of nodes written so far
    pub fn nodes_written(&self) -> u64 {
        self.nodes_written
    }

    /// Interval at which progress is reported
    pub fn report_interval(&self) -> u64 {
        self.report_interval
    }

    /// Count one written node, reporting each full interval
    pub async fn record_node_written(&mut self) {
        self.nodes_written += 1;
        if self.nodes_written % self.report_interval == 0 {
            self.progress
                .nodes_written(self.job_id, self.nodes_written)
                .await;
        }
    }

    /// Close the stream and log out the session, best effort
    ///
    /// Never fails: each release result is recorded in the returned report.
    /// The context is gone once this returns, whatever the outcome.
    pub async fn release(self) -> ReleaseReport {
        let Self {
            job_id,
            input,
            session,
            _guard,
            ..
        } = self;

        let stream = match input.close().await {
            Ok(()) => ReleaseOutcome::Released,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "failed to close grab stream");
                ReleaseOutcome::Failed(e.to_string())
            }
        };

        let session = match session.logout().await {
            Ok(()) => ReleaseOutcome::Released,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "failed to log out destination session");
                ReleaseOutcome::Failed(e.to_string())
            }
        };

        drop(_guard);
        ReleaseReport { stream, session }
    }
}

/// Result of releasing one resource
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Released cleanly
    Released,
    /// Release failed; the failure was logged and absorbed
    Failed(String),
}

/// Outcome of [`TransferResourceContext::release`]
///
/// Kept separate from the job's own result: a release failure never changes
/// a job's exit code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseReport {
    /// Input stream release
    pub stream: ReleaseOutcome,
    /// Session release
    pub session: ReleaseOutcome,
}

impl ReleaseReport {
    /// True when both resources were released cleanly
    pub fn is_clean(&self) -> bool {
        self.stream == ReleaseOutcome::Released && self.session == ReleaseOutcome::Released
    }

    /// Failed releases with their messages
    pub fn failures(&self) -> Vec<(ResourceKind, &str)> {
        let mut failures = Vec::new();
        if let ReleaseOutcome::Failed(msg) = &self.stream {
            failures.push((ResourceKind::InputStream, msg.as_str()));
        }
        if let ReleaseOutcome::Failed(msg) = &self.session {
            failures.push((ResourceKind::Session, msg.as_str()));
        }
        failures
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::session::NodeRecord;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;

    /// In-memory stream that records whether it was closed
    pub(crate) struct ScriptedStream {
        pub(crate) chunks: VecDeque<Bytes>,
        pub(crate) closed: Arc<AtomicBool>,
        pub(crate) fail_close: bool,
    }

    impl ScriptedStream {
        pub(crate) fn new(body: &str, closed: Arc<AtomicBool>) -> Self {
            Self {
                chunks: VecDeque::from(vec![Bytes::from(body.to_string())]),
                closed,
                fail_close: false,
            }
        }
    }

    #[async_trait]
    impl InputStream for ScriptedStream {
        async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
            Ok(self.chunks.pop_front())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            if self.fail_close {
                return Err(Error::Io(std::io::Error::other("socket already gone")));
            }
            Ok(())
        }
    }

    /// Session that records writes and logout
    pub(crate) struct RecordingSession {
        pub(crate) written: Arc<Mutex<Vec<NodeRecord>>>,
        pub(crate) logged_out: Arc<AtomicBool>,
        pub(crate) fail_logout: bool,
        pub(crate) pending: usize,
    }

    impl RecordingSession {
        pub(crate) fn new(logged_out: Arc<AtomicBool>) -> Self {
            Self {
                written: Arc::new(Mutex::new(Vec::new())),
                logged_out,
                fail_logout: false,
                pending: 0,
            }
        }
    }

    #[async_trait]
    impl RepositorySession for RecordingSession {
        fn user_id(&self) -> &str {
            "admin"
        }

        async fn write_node(&mut self, node: NodeRecord) -> Result<()> {
            self.written.lock().unwrap().push(node);
            self.pending += 1;
            Ok(())
        }

        async fn remove_subtree(&mut self, _path: &str) -> Result<()> {
            self.pending += 1;
            Ok(())
        }

        fn pending_changes(&self) -> usize {
            self.pending
        }

        async fn save(&mut self) -> Result<()> {
            self.pending = 0;
            Ok(())
        }

        async fn logout(self: Box<Self>) -> Result<()> {
            self.logged_out.store(true, Ordering::SeqCst);
            if self.fail_logout {
                return Err(Error::Io(std::io::Error::other("repository went away")));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    pub(crate) struct CollectingSink(pub(crate) Mutex<Vec<u64>>);

    #[async_trait]
    impl ProgressSink for CollectingSink {
        async fn nodes_written(&self, _job: JobExecutionId, count: u64) {
            self.0.lock().unwrap().push(count);
        }
    }

    #[tokio::test]
    async fn release_closes_both_and_clears_gauge() {
        let gauge = ContextGauge::default();
        let closed = Arc::new(AtomicBool::new(false));
        let logged_out = Arc::new(AtomicBool::new(false));
        let ctx = TransferResourceContext::new(
            JobExecutionId(1),
            Box::new(ScriptedStream::new("", closed.clone())),
            Box::new(RecordingSession::new(logged_out.clone())),
            1000,
            Arc::new(NoProgress),
            &gauge,
        );
        assert_eq!(gauge.live(), 1);

        let report = ctx.release().await;
        assert!(report.is_clean());
        assert!(closed.load(Ordering::SeqCst));
        assert!(logged_out.load(Ordering::SeqCst));
        assert_eq!(gauge.live(), 0);
    }

    #[tokio::test]
    async fn failing_releases_are_recorded_not_raised() {
        let gauge = ContextGauge::default();
        let closed = Arc::new(AtomicBool::new(false));
        let logged_out = Arc::new(AtomicBool::new(false));
        let mut stream = ScriptedStream::new("", closed.clone());
        stream.fail_close = true;
        let mut session = RecordingSession::new(logged_out.clone());
        session.fail_logout = true;

        let ctx = TransferResourceContext::new(
            JobExecutionId(2),
            Box::new(stream),
            Box::new(session),
            1000,
            Arc::new(NoProgress),
            &gauge,
        );
        let report = ctx.release().await;

        assert!(!report.is_clean());
        let failures = report.failures();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].0, ResourceKind::InputStream);
        assert_eq!(failures[1].0, ResourceKind::Session);
        // Session logout is still attempted after the stream failed to close.
        assert!(logged_out.load(Ordering::SeqCst));
        assert_eq!(gauge.live(), 0);
    }

    #[tokio::test]
    async fn progress_is_reported_per_interval() {
        let gauge = ContextGauge::default();
        let sink = Arc::new(CollectingSink::default());
        let mut ctx = TransferResourceContext::new(
            JobExecutionId(3),
            Box::new(ScriptedStream::new("", Arc::new(AtomicBool::new(false)))),
            Box::new(RecordingSession::new(Arc::new(AtomicBool::new(false)))),
            10,
            sink.clone(),
            &gauge,
        );
        for _ in 0..25 {
            ctx.record_node_written().await;
        }
        assert_eq!(ctx.nodes_written(), 25);
        assert_eq!(*sink.0.lock().unwrap(), vec![10, 20]);
        ctx.release().await;
    }

    #[test]
    fn dropped_context_still_clears_gauge() {
        let gauge = ContextGauge::default();
        let ctx = TransferResourceContext::new(
            JobExecutionId(4),
            Box::new(ScriptedStream::new("", Arc::new(AtomicBool::new(false)))),
            Box::new(RecordingSession::new(Arc::new(AtomicBool::new(false)))),
            1000,
            Arc::new(NoProgress),
            &gauge,
        );
        drop(ctx);
        assert_eq!(gauge.live(), 0);
    }
}
