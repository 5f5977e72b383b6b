//! Core types for grabbit: identifiers, exit codes, status documents and events

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

macro_rules! sqlite_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Get the inner i64 value
            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                Ok(Self(id))
            }
        }
    };
}

sqlite_id!(
    /// Unique identifier for one job execution
    JobExecutionId
);

sqlite_id!(
    /// Correlation key shared by all jobs of one grab request
    TransactionId
);

/// Exit code reported to status pollers
///
/// `Unknown` is what a running job reports. The other three are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitCode {
    /// Job is still running
    Unknown,
    /// All steps finished without error
    Completed,
    /// Request, session acquisition or a step failed
    Failed,
    /// A policy guard rejected the job
    ValidationFailed,
}

impl ExitCode {
    /// Convert integer code from the database to ExitCode
    pub fn from_i32(code: i32) -> Self {
        match code {
            0 => ExitCode::Unknown,
            1 => ExitCode::Completed,
            2 => ExitCode::Failed,
            3 => ExitCode::ValidationFailed,
            _ => ExitCode::Failed,
        }
    }

    /// Convert ExitCode to its database integer
    pub fn to_i32(&self) -> i32 {
        match self {
            ExitCode::Unknown => 0,
            ExitCode::Completed => 1,
            ExitCode::Failed => 2,
            ExitCode::ValidationFailed => 3,
        }
    }

    /// Whether this code ends the job
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExitCode::Unknown)
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitCode::Unknown => "UNKNOWN",
            ExitCode::Completed => "COMPLETED",
            ExitCode::Failed => "FAILED",
            ExitCode::ValidationFailed => "VALIDATION_FAILED",
        };
        f.write_str(s)
    }
}

/// Exit status block of a status document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExitStatus {
    /// Exit code
    pub exit_code: ExitCode,
    /// Failure or abort reason, empty when none
    pub exit_description: String,
    /// True exactly when `exit_code` is `UNKNOWN`
    pub running: bool,
}

impl ExitStatus {
    /// Build an exit status; `running` is derived from the code
    pub fn new(exit_code: ExitCode, exit_description: impl Into<String>) -> Self {
        Self {
            exit_code,
            exit_description: exit_description.into(),
            running: !exit_code.is_terminal(),
        }
    }
}

/// Status document served to pollers
///
/// Every field is always present. `endTime` is null while the job runs and
/// `timeTaken` is -1 until the job has ended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    /// When the job ended
    pub end_time: Option<DateTime<Utc>>,
    /// Exit status
    pub exit_status: ExitStatus,
    /// Nodes written to the destination so far
    pub jcr_nodes_written: i64,
    /// Job identifier
    pub job_execution_id: JobExecutionId,
    /// Grabbed path
    pub path: String,
    /// When the job started
    pub start_time: DateTime<Utc>,
    /// Elapsed milliseconds, `endTime - startTime`
    pub time_taken: i64,
    /// Transaction this job belongs to
    pub transaction_id: TransactionId,
}

/// Convert epoch milliseconds to a UTC timestamp
pub(crate) fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Release target named in [`Event::ReleaseFailed`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// The inbound content stream
    InputStream,
    /// The destination repository session
    Session,
}

/// Events emitted by the coordinator
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job began setup
    JobStarted {
        /// Job identifier
        id: JobExecutionId,
        /// Owning transaction
        transaction_id: TransactionId,
        /// Grabbed path
        path: String,
    },

    /// The reported node count advanced
    NodesWritten {
        /// Job identifier
        id: JobExecutionId,
        /// Reported count
        count: u64,
    },

    /// A job reached its terminal state
    JobFinished {
        /// Job identifier
        id: JobExecutionId,
        /// Terminal exit code
        exit_code: ExitCode,
        /// Elapsed milliseconds
        time_taken_ms: i64,
    },

    /// Releasing a resource failed during cleanup (job outcome unaffected)
    ReleaseFailed {
        /// Job identifier
        id: JobExecutionId,
        /// Which resource
        resource: ResourceKind,
        /// What went wrong
        error: String,
    },

    /// Client is shutting down
    Shutdown,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_value(ExitCode::ValidationFailed).unwrap(),
            "VALIDATION_FAILED"
        );
        assert_eq!(serde_json::to_value(ExitCode::Unknown).unwrap(), "UNKNOWN");
        assert_eq!(ExitCode::Completed.to_string(), "COMPLETED");
    }

    #[test]
    fn exit_code_survives_database_integer() {
        for code in [
            ExitCode::Unknown,
            ExitCode::Completed,
            ExitCode::Failed,
            ExitCode::ValidationFailed,
        ] {
            assert_eq!(ExitCode::from_i32(code.to_i32()), code);
        }
        assert_eq!(ExitCode::from_i32(42), ExitCode::Failed);
    }

    #[test]
    fn running_flag_follows_exit_code() {
        assert!(ExitStatus::new(ExitCode::Unknown, "").running);
        assert!(!ExitStatus::new(ExitCode::Completed, "").running);
        assert!(!ExitStatus::new(ExitCode::Failed, "boom").running);
        assert!(!ExitStatus::new(ExitCode::ValidationFailed, "guard").running);
    }

    #[test]
    fn status_document_has_every_field() {
        let status = JobStatus {
            end_time: None,
            exit_status: ExitStatus::new(ExitCode::Unknown, ""),
            jcr_nodes_written: 0,
            job_execution_id: JobExecutionId(7),
            path: "/content/site".into(),
            start_time: millis_to_datetime(1_700_000_000_000),
            time_taken: -1,
            transaction_id: TransactionId(3),
        };
        let json = serde_json::to_value(&status).unwrap();
        for field in [
            "endTime",
            "exitStatus",
            "jcrNodesWritten",
            "jobExecutionId",
            "path",
            "startTime",
            "timeTaken",
            "transactionId",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert!(json["endTime"].is_null());
        assert_eq!(json["exitStatus"]["running"], true);
        assert_eq!(json["exitStatus"]["exitDescription"], "");
        assert_eq!(json["jobExecutionId"], 7);
    }

    #[test]
    fn ids_parse_from_strings() {
        let id: JobExecutionId = "12".parse().unwrap();
        assert_eq!(id, JobExecutionId(12));
        assert!("x".parse::<TransactionId>().is_err());
    }
}
