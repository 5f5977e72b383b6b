//! Shared fakes and constructors for coordinator tests.

use crate::config::{Config, JobConfiguration};
use crate::context::TransferResourceContext;
use crate::context::tests::{RecordingSession, ScriptedStream};
use crate::coordinator::{Collaborators, GrabClient};
use crate::error::{Error, Result, SessionError, TransportError};
use crate::session::{NodeRecord, RepositorySession, RepositorySessionProvider};
use crate::steps::{AllowAll, ProcessingStep, default_steps};
use crate::transport::{ContentSource, InputStream};
use crate::types::JobExecutionId;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Content source serving `nodes` child nodes under each job's path
#[derive(Default)]
pub(crate) struct FakeSource {
    pub(crate) nodes: usize,
    pub(crate) fail_status: Option<u16>,
    pub(crate) fail_close: bool,
    pub(crate) opened: AtomicUsize,
    pub(crate) closed: Arc<AtomicBool>,
}

impl FakeSource {
    pub(crate) fn serving(nodes: usize) -> Self {
        Self {
            nodes,
            ..Default::default()
        }
    }

    pub(crate) fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn open(&self, job: &JobConfiguration) -> Result<Box<dyn InputStream>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.fail_status {
            return Err(Error::Transport(TransportError::Status {
                url: format!("http://{}:{}/grabbit/job", job.host, job.port),
                status,
            }));
        }

        let body: String = (0..self.nodes)
            .map(|i| format!("{{\"path\":\"{}/n{}\"}}\n", job.path, i))
            .collect();
        let mut stream = ScriptedStream::new(&body, self.closed.clone());
        stream.fail_close = self.fail_close;
        Ok(Box::new(stream))
    }
}

/// Session provider handing out [`RecordingSession`]s
///
/// The identity `nobody` is always rejected.
#[derive(Default)]
pub(crate) struct FakeSessions {
    pub(crate) reject: bool,
    pub(crate) fail_logout: bool,
    pub(crate) requested: AtomicUsize,
    pub(crate) logged_out: Arc<AtomicBool>,
    pub(crate) written: Arc<Mutex<Vec<NodeRecord>>>,
}

impl FakeSessions {
    pub(crate) fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl RepositorySessionProvider for FakeSessions {
    async fn get_session(
        &self,
        identity: &str,
    ) -> std::result::Result<Box<dyn RepositorySession>, SessionError> {
        self.requested.fetch_add(1, Ordering::SeqCst);
        if self.reject || identity == "nobody" {
            return Err(SessionError::InvalidIdentity(identity.to_string()));
        }
        let mut session = RecordingSession::new(self.logged_out.clone());
        session.written = self.written.clone();
        session.fail_logout = self.fail_logout;
        Ok(Box::new(session))
    }
}

/// What a [`ProbeStep`] saw when it ran
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Observation {
    pub(crate) job_id: JobExecutionId,
    pub(crate) nodes_at_entry: u64,
    pub(crate) first_chunk: Option<Bytes>,
}

/// Records the state of the context it is handed
#[derive(Default)]
pub(crate) struct ProbeStep {
    pub(crate) seen: Mutex<Vec<Observation>>,
}

#[async_trait]
impl ProcessingStep for ProbeStep {
    fn name(&self) -> &str {
        "probe"
    }

    async fn execute(
        &self,
        _job: &JobConfiguration,
        ctx: &mut TransferResourceContext,
    ) -> Result<()> {
        let nodes_at_entry = ctx.nodes_written();
        let first_chunk = ctx.input().next_chunk().await?;
        self.seen.lock().unwrap().push(Observation {
            job_id: ctx.job_id(),
            nodes_at_entry,
            first_chunk,
        });
        Ok(())
    }
}

/// Fails with the configured error
pub(crate) struct FailingStep {
    pub(crate) validation: bool,
}

#[async_trait]
impl ProcessingStep for FailingStep {
    fn name(&self) -> &str {
        "failing"
    }

    async fn execute(
        &self,
        _job: &JobConfiguration,
        _ctx: &mut TransferResourceContext,
    ) -> Result<()> {
        if self.validation {
            Err(Error::ValidationAbort("content would be overwritten".into()))
        } else {
            Err(Error::Step {
                step: "failing".into(),
                message: "boom".into(),
            })
        }
    }
}

/// Panics mid-processing
pub(crate) struct PanickingStep;

#[async_trait]
impl ProcessingStep for PanickingStep {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn execute(
        &self,
        _job: &JobConfiguration,
        _ctx: &mut TransferResourceContext,
    ) -> Result<()> {
        panic!("step bug")
    }
}

/// Sleeps while tracking how many instances run at once
#[derive(Default)]
pub(crate) struct SlowStep {
    pub(crate) delay: Duration,
    pub(crate) running: AtomicUsize,
    pub(crate) max_running: AtomicUsize,
}

#[async_trait]
impl ProcessingStep for SlowStep {
    fn name(&self) -> &str {
        "slow"
    }

    async fn execute(
        &self,
        _job: &JobConfiguration,
        _ctx: &mut TransferResourceContext,
    ) -> Result<()> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) fn sample_job(path: &str) -> JobConfiguration {
    JobConfiguration {
        path: path.to_string(),
        exclude_paths: vec![],
        host: "source.example".into(),
        port: 4502,
        server_username: "admin".into(),
        server_password: "admin".into(),
        client_username: "admin".into(),
        content_after_date: None,
        delete_before_write: false,
    }
}

pub(crate) fn collaborators(
    source: Arc<FakeSource>,
    sessions: Arc<FakeSessions>,
    steps: Vec<Arc<dyn ProcessingStep>>,
) -> Collaborators {
    Collaborators {
        source,
        sessions,
        steps,
        policy: Arc::new(AllowAll),
    }
}

pub(crate) fn default_collaborators(
    source: Arc<FakeSource>,
    sessions: Arc<FakeSessions>,
) -> Collaborators {
    collaborators(source, sessions, default_steps())
}

pub(crate) fn test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = temp_dir.path().join("grabbit.db");
    config.jobs.destination_root = temp_dir.path().join("repository");
    config.jobs.max_concurrent_jobs = 3;
    config
}

/// Build a client over a temporary database
/// Returns the client and the tempdir (which must be kept alive).
pub(crate) async fn create_test_client(collaborators: Collaborators) -> (GrabClient, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    let client = GrabClient::with_collaborators(config, collaborators)
        .await
        .unwrap();
    (client, temp_dir)
}

/// Same as [`create_test_client`] with a custom configuration tweak
pub(crate) async fn create_test_client_with(
    collaborators: Collaborators,
    tweak: impl FnOnce(&mut Config),
) -> (GrabClient, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir);
    tweak(&mut config);
    let client = GrabClient::with_collaborators(config, collaborators)
        .await
        .unwrap();
    (client, temp_dir)
}
