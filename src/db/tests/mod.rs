use super::*;
use tempfile::TempDir;


async fn open_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("grabbit.db"))
        .await
        .unwrap();
    (db, temp_dir)
}

async fn insert_running_job(db: &Database, path: &str, start_time_ms: i64) -> JobExecutionId {
    let transaction_id = db.create_transaction().await.unwrap();
    db.insert_job(&NewJob {
        transaction_id,
        path: path.to_string(),
        start_time_ms,
    })
    .await
    .unwrap()
}

fn completion(exit_code: ExitCode, nodes_written: i64, end_time_ms: i64) -> JobCompletion {
    JobCompletion {
        exit_code,
        exit_description: String::new(),
        nodes_written,
        end_time_ms,
    }
}
