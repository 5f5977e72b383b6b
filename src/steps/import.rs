//! Streamed node import.
//!
//! The grab stream is read as newline-delimited JSON, one [`NodeRecord`]
//! per line. Nodes are staged in the destination session and saved every
//! report interval, plus once at the end of the stream.

use super::ProcessingStep;
use crate::config::JobConfiguration;
use crate::context::TransferResourceContext;
use crate::error::{Error, Result};
use crate::session::NodeRecord;
use async_trait::async_trait;

/// Writes every node from the bound stream into the bound session
pub struct NodeImportStep;

impl NodeImportStep {
    const NAME: &'static str = "node-import";

    fn step_error(message: impl Into<String>) -> Error {
        Error::Step {
            step: Self::NAME.to_string(),
            message: message.into(),
        }
    }

    async fn import_line(
        job: &JobConfiguration,
        ctx: &mut TransferResourceContext,
        line: &[u8],
        line_no: usize,
    ) -> Result<()> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return Ok(());
        }

        let node: NodeRecord = serde_json::from_slice(line)
            .map_err(|e| Self::step_error(format!("line {}: malformed node record: {}", line_no, e)))?;

        if !is_within(&job.path, &node.path) {
            return Err(Self::step_error(format!(
                "line {}: node {} is outside grabbed path {}",
                line_no, node.path, job.path
            )));
        }
        if let Some(excluded) = job.exclude_paths.iter().find(|ex| is_within(ex, &node.path)) {
            tracing::debug!(node = %node.path, excluded = %excluded, "skipping excluded node");
            return Ok(());
        }

        ctx.session().write_node(node).await?;
        ctx.record_node_written().await;

        if ctx.session().pending_changes() as u64 >= ctx.report_interval() {
            ctx.session().save().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessingStep for NodeImportStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(
        &self,
        job: &JobConfiguration,
        ctx: &mut TransferResourceContext,
    ) -> Result<()> {
        let mut buffer: Vec<u8> = Vec::new();
        let mut line_no = 0usize;

        while let Some(chunk) = ctx.input().next_chunk().await? {
            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                line_no += 1;
                Self::import_line(job, ctx, &line, line_no).await?;
            }
        }
        if !buffer.is_empty() {
            line_no += 1;
            Self::import_line(job, ctx, &buffer, line_no).await?;
        }

        ctx.session().save().await?;
        tracing::info!(
            job_id = %ctx.job_id(),
            nodes = ctx.nodes_written(),
            "node import finished"
        );
        Ok(())
    }
}

/// Whether `path` is `root` or a descendant of it
fn is_within(root: &str, path: &str) -> bool {
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        return path.starts_with('/');
    }
    path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}
