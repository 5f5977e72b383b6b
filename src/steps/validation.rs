//! Validation policies.

use crate::config::JobConfiguration;

/// Decides whether a well-formed job may run
///
/// A rejection is a policy abort, not a fault: the job ends as
/// `VALIDATION_FAILED` with the returned reason as its description.
pub trait ValidationPolicy: Send + Sync {
    /// `Err(reason)` to reject the job
    fn check(&self, job: &JobConfiguration) -> Result<(), String>;
}

/// Accepts every job
pub struct AllowAll;

impl ValidationPolicy for AllowAll {
    fn check(&self, _job: &JobConfiguration) -> Result<(), String> {
        Ok(())
    }
}

/// Rejects delete-before-write combined with exclusions
///
/// Deleting the destination subtree first would also wipe the excluded
/// fragments, which the transfer would then never restore.
pub struct DeleteBeforeWriteGuard;

impl ValidationPolicy for DeleteBeforeWriteGuard {
    fn check(&self, job: &JobConfiguration) -> Result<(), String> {
        if job.delete_before_write && !job.exclude_paths.is_empty() {
            return Err(format!(
                "deleteBeforeWrite on {} would remove {} excluded path(s) from the destination",
                job.path,
                job.exclude_paths.len()
            ));
        }
        Ok(())
    }
}
