//! Database layer for grabbit
//!
//! SQLite persistence for transactions and job status records.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`jobs`] - Job status records and transaction grouping

use crate::types::{
    ExitCode, ExitStatus, JobExecutionId, JobStatus, TransactionId, millis_to_datetime,
};
use sqlx::{FromRow, sqlite::SqlitePool};

mod jobs;
mod migrations;

/// New job row, created when a transaction is submitted
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Owning transaction
    pub transaction_id: TransactionId,
    /// Grabbed path
    pub path: String,
    /// Epoch milliseconds the job was accepted
    pub start_time_ms: i64,
}

/// Terminal state written once per job
#[derive(Debug, Clone)]
pub struct JobCompletion {
    /// Terminal exit code (never `Unknown`)
    pub exit_code: ExitCode,
    /// Failure or abort reason, empty when none
    pub exit_description: String,
    /// Final node count
    pub nodes_written: i64,
    /// Epoch milliseconds the job ended
    pub end_time_ms: i64,
}

/// Job record from database
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    /// Unique database ID
    pub id: JobExecutionId,
    /// Owning transaction
    pub transaction_id: TransactionId,
    /// Grabbed path
    pub path: String,
    /// Exit code (see [`ExitCode::to_i32`])
    pub exit_code: i32,
    /// Failure or abort reason
    pub exit_description: String,
    /// Reported node count
    pub nodes_written: i64,
    /// Epoch milliseconds the job started
    pub start_time: i64,
    /// Epoch milliseconds the job ended
    pub end_time: Option<i64>,
    /// Milliseconds between start and end
    pub time_taken: Option<i64>,
}

impl From<JobRow> for JobStatus {
    fn from(row: JobRow) -> Self {
        JobStatus {
            end_time: row.end_time.map(millis_to_datetime),
            exit_status: ExitStatus::new(ExitCode::from_i32(row.exit_code), row.exit_description),
            jcr_nodes_written: row.nodes_written,
            job_execution_id: row.id,
            path: row.path,
            start_time: millis_to_datetime(row.start_time),
            time_taken: row.time_taken.unwrap_or(-1),
            transaction_id: row.transaction_id,
        }
    }
}

/// Database handle for grabbit
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
