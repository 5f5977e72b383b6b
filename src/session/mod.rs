//! Destination repository sessions.
//!
//! The coordinator only needs "a write session for an identity". The
//! [`RepositorySessionProvider`] trait is that seam; [`FsRepository`] is the
//! bundled provider that stores nodes under a directory tree.

use crate::error::{Result, SessionError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod fs;

pub use fs::FsRepository;

/// One content node as carried by the grab stream
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    /// Absolute repository path of the node
    pub path: String,
    /// Node type name
    #[serde(default = "default_primary_type")]
    pub primary_type: String,
    /// Node properties
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

fn default_primary_type() -> String {
    "nt:unstructured".to_string()
}

/// A write session against the destination repository
///
/// Changes become durable only on [`save`](RepositorySession::save).
#[async_trait]
pub trait RepositorySession: Send {
    /// Identity the session was opened for
    fn user_id(&self) -> &str;

    /// Stage a node write
    async fn write_node(&mut self, node: NodeRecord) -> Result<()>;

    /// Stage removal of a subtree
    async fn remove_subtree(&mut self, path: &str) -> Result<()>;

    /// Number of staged, unsaved changes
    fn pending_changes(&self) -> usize;

    /// Persist staged changes
    async fn save(&mut self) -> Result<()>;

    /// End the session, discarding unsaved changes
    async fn logout(self: Box<Self>) -> Result<()>;
}

/// Produces destination sessions for a given identity
#[async_trait]
pub trait RepositorySessionProvider: Send + Sync {
    /// Open a session for `identity`
    async fn get_session(
        &self,
        identity: &str,
    ) -> std::result::Result<Box<dyn RepositorySession>, SessionError>;
}
