//! Processing steps run against a bound [`TransferResourceContext`].
//!
//! - [`validation`] - Policy hooks deciding whether a job may run at all
//! - [`clear`] - Delete-before-write of the destination subtree
//! - [`import`] - Streamed node import into the destination session

use crate::config::JobConfiguration;
use crate::context::TransferResourceContext;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

mod clear;
mod import;
mod validation;

pub use clear::ClearDestinationStep;
pub use import::NodeImportStep;
pub use validation::{AllowAll, DeleteBeforeWriteGuard, ValidationPolicy};

/// One unit of work executed while a job's resources are bound
///
/// Returning [`Error::ValidationAbort`](crate::Error::ValidationAbort) ends
/// the job as `VALIDATION_FAILED`; any other error ends it as `FAILED`.
#[async_trait]
pub trait ProcessingStep: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Run the step
    async fn execute(&self, job: &JobConfiguration, ctx: &mut TransferResourceContext)
    -> Result<()>;
}

/// The steps every grab runs, in order
pub fn default_steps() -> Vec<Arc<dyn ProcessingStep>> {
    vec![Arc::new(ClearDestinationStep), Arc::new(NodeImportStep)]
}
