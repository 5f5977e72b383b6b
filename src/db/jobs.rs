//! Job status records and transaction grouping.

use crate::types::{ExitCode, JobExecutionId, JobStatus, TransactionId};
use crate::{Error, Result};

use super::{Database, JobCompletion, JobRow, NewJob};
use sqlx::SqliteConnection;

const JOB_COLUMNS: &str = "id, transaction_id, path, exit_code, exit_description, nodes_written, \
                           start_time, end_time, time_taken";

impl Database {
    /// Allocate a new transaction id
    pub async fn create_transaction(&self) -> Result<TransactionId> {
        let mut conn = self.pool.acquire().await.map_err(Error::Sqlx)?;
        insert_transaction(&mut conn, chrono::Utc::now().timestamp_millis()).await
    }

    /// Insert a job in the running (`UNKNOWN`) state
    pub async fn insert_job(&self, job: &NewJob) -> Result<JobExecutionId> {
        let mut conn = self.pool.acquire().await.map_err(Error::Sqlx)?;
        insert_job_row(&mut conn, job).await
    }

    /// Create a transaction and one running job per path, all or nothing
    ///
    /// If any insert fails nothing is kept, so no job row can be left
    /// running without a task to finish it.
    pub async fn create_transaction_with_jobs(
        &self,
        paths: &[String],
        accepted_at_ms: i64,
    ) -> Result<(TransactionId, Vec<JobExecutionId>)> {
        let mut tx = self.pool.begin().await.map_err(Error::Sqlx)?;

        let transaction_id = insert_transaction(&mut tx, accepted_at_ms).await?;
        let mut job_ids = Vec::with_capacity(paths.len());
        for path in paths {
            let id = insert_job_row(
                &mut tx,
                &NewJob {
                    transaction_id,
                    path: path.clone(),
                    start_time_ms: accepted_at_ms,
                },
            )
            .await?;
            job_ids.push(id);
        }

        // Dropping `tx` on an early return rolls everything back
        tx.commit().await.map_err(Error::Sqlx)?;
        Ok((transaction_id, job_ids))
    }

    /// Reset a job's start time when its setup actually begins
    pub async fn mark_job_started(&self, id: JobExecutionId, start_time_ms: i64) -> Result<()> {
        sqlx::query("UPDATE jobs SET start_time = ? WHERE id = ? AND exit_code = ?")
            .bind(start_time_ms)
            .bind(id)
            .bind(ExitCode::Unknown.to_i32())
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;
        Ok(())
    }

    /// Advance the reported node count of a running job
    ///
    /// The count only moves forward and is frozen once the job is terminal.
    pub async fn update_nodes_written(&self, id: JobExecutionId, count: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET nodes_written = ? WHERE id = ? AND exit_code = ? AND nodes_written < ?",
        )
        .bind(count)
        .bind(id)
        .bind(ExitCode::Unknown.to_i32())
        .bind(count)
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    /// Move a job to its terminal state
    ///
    /// Only the first call for a job takes effect; later calls return
    /// `Ok(false)` and leave the record untouched. `time_taken` is derived
    /// from the stored start time so it always equals `end - start`.
    pub async fn finish_job(&self, id: JobExecutionId, completion: &JobCompletion) -> Result<bool> {
        if !completion.exit_code.is_terminal() {
            return Err(Error::Other(format!(
                "job {} cannot finish with exit code {}",
                id, completion.exit_code
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET exit_code = ?,
                exit_description = ?,
                nodes_written = MAX(nodes_written, ?),
                end_time = MAX(start_time, ?),
                time_taken = MAX(start_time, ?) - start_time
            WHERE id = ? AND exit_code = ?
            "#,
        )
        .bind(completion.exit_code.to_i32())
        .bind(&completion.exit_description)
        .bind(completion.nodes_written)
        .bind(completion.end_time_ms)
        .bind(completion.end_time_ms)
        .bind(id)
        .bind(ExitCode::Unknown.to_i32())
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    /// Status document for one job
    pub async fn get_job_status(&self, id: JobExecutionId) -> Result<Option<JobStatus>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE id = ?",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(row.map(JobStatus::from))
    }

    /// Status documents for every job of a transaction, in creation order
    pub async fn list_transaction_jobs(&self, transaction: TransactionId) -> Result<Vec<JobStatus>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE transaction_id = ? ORDER BY id ASC",
            JOB_COLUMNS
        ))
        .bind(transaction)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(rows.into_iter().map(JobStatus::from).collect())
    }

    /// Mark jobs left running by a previous process as failed
    ///
    /// A job that was `UNKNOWN` when the process stopped can never finish.
    pub async fn fail_orphaned_jobs(&self, now_ms: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET exit_code = ?,
                exit_description = 'interrupted: process stopped while job was running',
                end_time = MAX(start_time, ?),
                time_taken = MAX(start_time, ?) - start_time
            WHERE exit_code = ?
            "#,
        )
        .bind(ExitCode::Failed.to_i32())
        .bind(now_ms)
        .bind(now_ms)
        .bind(ExitCode::Unknown.to_i32())
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(result.rows_affected())
    }
}

async fn insert_transaction(conn: &mut SqliteConnection, created_at_ms: i64) -> Result<TransactionId> {
    let result = sqlx::query("INSERT INTO transactions (created_at) VALUES (?)")
        .bind(created_at_ms)
        .execute(&mut *conn)
        .await
        .map_err(Error::Sqlx)?;

    Ok(TransactionId(result.last_insert_rowid()))
}

async fn insert_job_row(conn: &mut SqliteConnection, job: &NewJob) -> Result<JobExecutionId> {
    let result = sqlx::query(
        r#"
        INSERT INTO jobs (transaction_id, path, exit_code, start_time)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(job.transaction_id)
    .bind(&job.path)
    .bind(ExitCode::Unknown.to_i32())
    .bind(job.start_time_ms)
    .execute(&mut *conn)
    .await
    .map_err(Error::Sqlx)?;

    Ok(JobExecutionId(result.last_insert_rowid()))
}
