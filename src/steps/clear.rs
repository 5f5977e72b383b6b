//! Delete-before-write step.

use super::ProcessingStep;
use crate::config::JobConfiguration;
use crate::context::TransferResourceContext;
use crate::error::Result;
use async_trait::async_trait;

/// Removes the destination subtree when the job asks for `deleteBeforeWrite`
pub struct ClearDestinationStep;

#[async_trait]
impl ProcessingStep for ClearDestinationStep {
    fn name(&self) -> &str {
        "clear-destination"
    }

    async fn execute(
        &self,
        job: &JobConfiguration,
        ctx: &mut TransferResourceContext,
    ) -> Result<()> {
        if !job.delete_before_write {
            return Ok(());
        }

        tracing::info!(job_id = %ctx.job_id(), path = %job.path, "removing destination subtree before write");
        let session = ctx.session();
        session.remove_subtree(&job.path).await?;
        session.save().await
    }
}
