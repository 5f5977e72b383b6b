//! Configuration types for grabbit

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Delimiter used when exclusion paths arrive as a single string
pub const EXCLUDE_PATH_DELIMITER: char = '*';

/// Main configuration for [`GrabClient`](crate::GrabClient)
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Job status storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// HTTP transport settings used for every grab request
    #[serde(default)]
    pub transport: TransportConfig,

    /// Job execution settings
    #[serde(default)]
    pub jobs: JobsConfig,

    /// API and external server integration
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PersistenceConfig {
    /// Database path (default: "./grabbit.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// HTTP transport configuration
///
/// Each job builds its own client from this value, so no connection state or
/// credentials are shared between concurrently running jobs.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TransportConfig {
    /// TCP connect timeout in seconds (default: 30)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub connect_timeout: Duration,

    /// Whole-request timeout in seconds, including the streamed body (None = no timeout)
    ///
    /// A grab can stream for a long time, so this is unset by default.
    #[serde(default, with = "optional_duration_serde")]
    #[schema(value_type = Option<u64>)]
    pub request_timeout: Option<Duration>,

    /// User-Agent header sent to the source server
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            request_timeout: None,
            user_agent: default_user_agent(),
        }
    }
}

/// Job execution configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobsConfig {
    /// Maximum jobs running at the same time across all transactions (default: 4)
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Granularity of the `jcrNodesWritten` counter and of session saves (default: 1000)
    #[serde(default = "default_node_report_interval")]
    pub node_report_interval: u64,

    /// Root directory of the destination repository (default: "./repository")
    #[serde(default = "default_destination_root")]
    pub destination_root: PathBuf,

    /// Identities allowed to open destination sessions (None = any non-empty identity)
    #[serde(default)]
    pub allowed_identities: Option<Vec<String>>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            node_report_interval: default_node_report_interval(),
            destination_root: default_destination_root(),
            allowed_identities: None,
        }
    }
}

/// API and external server integration configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:9090)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Configuration of one grab job: which subtree to copy, from where, as whom
///
/// Immutable once the job is created.
#[derive(Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobConfiguration {
    /// Repository path to grab
    pub path: String,

    /// Subtree fragments omitted from the transfer
    ///
    /// Accepts either a JSON array or a single `*`-delimited string.
    #[serde(default, deserialize_with = "deserialize_exclude_paths")]
    pub exclude_paths: Vec<String>,

    /// Source server host
    pub host: String,

    /// Source server port
    pub port: u16,

    /// Username for the source server
    pub server_username: String,

    /// Password for the source server
    pub server_password: String,

    /// Identity used to open the destination session
    pub client_username: String,

    /// Only transfer content modified after this date (None or empty = no filter)
    #[serde(default)]
    pub content_after_date: Option<String>,

    /// Remove the destination subtree before writing
    #[serde(default)]
    pub delete_before_write: bool,
}

// Manual impl keeps the source password out of logs.
impl std::fmt::Debug for JobConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobConfiguration")
            .field("path", &self.path)
            .field("exclude_paths", &self.exclude_paths)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("server_username", &self.server_username)
            .field("server_password", &"<redacted>")
            .field("client_username", &self.client_username)
            .field("content_after_date", &self.content_after_date)
            .field("delete_before_write", &self.delete_before_write)
            .finish()
    }
}

impl JobConfiguration {
    /// Check the invariants every job configuration must satisfy
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(Error::config("path", "path must not be empty"));
        }
        if self.host.trim().is_empty() {
            return Err(Error::config("host", "host must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::config("port", "port must be a positive integer"));
        }
        if let Some(i) = self.exclude_paths.iter().position(|p| p.is_empty()) {
            return Err(Error::config(
                "excludePaths",
                format!("exclude path at index {} is empty", i),
            ));
        }
        Ok(())
    }

    /// The date filter, with an empty string treated as absent
    pub fn after_date(&self) -> Option<&str> {
        self.content_after_date
            .as_deref()
            .filter(|d| !d.trim().is_empty())
    }
}

/// Split a `*`-delimited exclusion string into its fragments
///
/// Empty input yields no fragments; empty fragments between adjacent
/// delimiters are dropped.
pub fn parse_exclude_paths(raw: &str) -> Vec<String> {
    raw.split(EXCLUDE_PATH_DELIMITER)
        .filter(|fragment| !fragment.is_empty())
        .map(String::from)
        .collect()
}

fn deserialize_exclude_paths<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawExcludes {
        Delimited(String),
        List(Vec<String>),
    }

    Ok(match Option::<RawExcludes>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(RawExcludes::Delimited(raw)) => parse_exclude_paths(&raw),
        Some(RawExcludes::List(list)) => list,
    })
}

/// A set of jobs submitted together under one transaction
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// Jobs to run, one per grabbed path
    pub jobs: Vec<JobConfiguration>,
}

impl TransactionRequest {
    /// Validate every job; a transaction with no jobs is rejected
    pub fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            return Err(Error::config("jobs", "transaction must contain at least one job"));
        }
        for job in &self.jobs {
            job.validate()?;
        }
        Ok(())
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./grabbit.db")
}

fn default_destination_root() -> PathBuf {
    PathBuf::from("./repository")
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("grabbit/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_node_report_interval() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
