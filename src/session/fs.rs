//! Filesystem-backed destination repository.
//!
//! Node `/content/site/en` is stored as `<root>/content/site/en/.content.json`.

use super::{NodeRecord, RepositorySession, RepositorySessionProvider};
use crate::error::{Error, Result, SessionError};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// File holding a node's serialized record inside its directory
const NODE_FILE: &str = ".content.json";

/// Directory tree acting as the destination repository
#[derive(Clone, Debug)]
pub struct FsRepository {
    root: PathBuf,
    allowed_identities: Option<Vec<String>>,
}

impl FsRepository {
    /// Repository rooted at `root`, optionally limited to a set of identities
    pub fn new(root: impl Into<PathBuf>, allowed_identities: Option<Vec<String>>) -> Self {
        Self {
            root: root.into(),
            allowed_identities,
        }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read back a saved node, `None` if it was never written
    pub async fn read_node(&self, path: &str) -> Result<Option<NodeRecord>> {
        let file = node_dir(&self.root, path)?.join(NODE_FILE);
        match tokio::fs::read(&file).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[async_trait]
impl RepositorySessionProvider for FsRepository {
    async fn get_session(
        &self,
        identity: &str,
    ) -> std::result::Result<Box<dyn RepositorySession>, SessionError> {
        if identity.trim().is_empty() {
            return Err(SessionError::InvalidIdentity(identity.to_string()));
        }
        if let Some(allowed) = &self.allowed_identities
            && !allowed.iter().any(|a| a == identity)
        {
            return Err(SessionError::InvalidIdentity(identity.to_string()));
        }

        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            SessionError::Unreachable(format!("{}: {}", self.root.display(), e))
        })?;
        let meta = tokio::fs::metadata(&self.root).await.map_err(|e| {
            SessionError::Unreachable(format!("{}: {}", self.root.display(), e))
        })?;
        if !meta.is_dir() {
            return Err(SessionError::Unreachable(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        tracing::debug!(identity, root = %self.root.display(), "opened destination session");
        Ok(Box::new(FsSession {
            root: self.root.clone(),
            user_id: identity.to_string(),
            pending: Vec::new(),
        }))
    }
}

enum Change {
    Write(NodeRecord),
    Remove(String),
}

struct FsSession {
    root: PathBuf,
    user_id: String,
    pending: Vec<Change>,
}

#[async_trait]
impl RepositorySession for FsSession {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn write_node(&mut self, node: NodeRecord) -> Result<()> {
        node_dir(&self.root, &node.path)?;
        self.pending.push(Change::Write(node));
        Ok(())
    }

    async fn remove_subtree(&mut self, path: &str) -> Result<()> {
        node_dir(&self.root, path)?;
        self.pending.push(Change::Remove(path.to_string()));
        Ok(())
    }

    fn pending_changes(&self) -> usize {
        self.pending.len()
    }

    async fn save(&mut self) -> Result<()> {
        for change in self.pending.drain(..) {
            match change {
                Change::Write(node) => {
                    let dir = node_dir(&self.root, &node.path)?;
                    tokio::fs::create_dir_all(&dir).await?;
                    let bytes = serde_json::to_vec_pretty(&node)?;
                    tokio::fs::write(dir.join(NODE_FILE), bytes).await?;
                }
                Change::Remove(path) => {
                    let dir = node_dir(&self.root, &path)?;
                    match tokio::fs::remove_dir_all(&dir).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(Error::Io(e)),
                    }
                }
            }
        }
        Ok(())
    }

    async fn logout(self: Box<Self>) -> Result<()> {
        if !self.pending.is_empty() {
            tracing::warn!(
                identity = %self.user_id,
                discarded = self.pending.len(),
                "logging out with unsaved changes"
            );
        }
        Ok(())
    }
}

/// Map a repository path to its directory, rejecting anything that escapes the root
fn node_dir(root: &Path, repo_path: &str) -> Result<PathBuf> {
    if !repo_path.starts_with('/') {
        return Err(Error::Step {
            step: "session".to_string(),
            message: format!("node path '{}' is not absolute", repo_path),
        });
    }
    let mut dir = root.to_path_buf();
    for component in Path::new(repo_path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => dir.push(part),
            Component::CurDir => {}
            _ => {
                return Err(Error::Step {
                    step: "session".to_string(),
                    message: format!("node path '{}' escapes the repository", repo_path),
                });
            }
        }
    }
    Ok(dir)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn node(path: &str) -> NodeRecord {
        let mut node = NodeRecord {
            path: path.to_string(),
            primary_type: "cq:Page".to_string(),
            properties: Default::default(),
        };
        node.properties
            .insert("jcr:title".into(), serde_json::json!("Title"));
        node
    }

    #[tokio::test]
    async fn saved_nodes_can_be_read_back() {
        let dir = tempdir().unwrap();
        let repo = FsRepository::new(dir.path(), None);
        let mut session = repo.get_session("admin").await.unwrap();
        assert_eq!(session.user_id(), "admin");

        session.write_node(node("/content/site/en")).await.unwrap();
        assert_eq!(session.pending_changes(), 1);
        assert!(repo.read_node("/content/site/en").await.unwrap().is_none());

        session.save().await.unwrap();
        assert_eq!(session.pending_changes(), 0);
        session.logout().await.unwrap();

        let stored = repo.read_node("/content/site/en").await.unwrap().unwrap();
        assert_eq!(stored, node("/content/site/en"));
    }

    #[tokio::test]
    async fn logout_discards_unsaved_changes() {
        let dir = tempdir().unwrap();
        let repo = FsRepository::new(dir.path(), None);
        let mut session = repo.get_session("admin").await.unwrap();
        session.write_node(node("/content/a")).await.unwrap();
        session.logout().await.unwrap();
        assert!(repo.read_node("/content/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_subtree_deletes_descendants() {
        let dir = tempdir().unwrap();
        let repo = FsRepository::new(dir.path(), None);
        let mut session = repo.get_session("admin").await.unwrap();
        session.write_node(node("/content/site")).await.unwrap();
        session.write_node(node("/content/site/en")).await.unwrap();
        session.save().await.unwrap();

        session.remove_subtree("/content/site").await.unwrap();
        session.save().await.unwrap();
        assert!(repo.read_node("/content/site/en").await.unwrap().is_none());

        // Removing something absent is not an error.
        session.remove_subtree("/content/missing").await.unwrap();
        session.save().await.unwrap();
    }

    #[tokio::test]
    async fn identity_checks() {
        let dir = tempdir().unwrap();
        let repo = FsRepository::new(dir.path(), Some(vec!["replicator".into()]));
        assert!(matches!(
            repo.get_session("intruder").await,
            Err(SessionError::InvalidIdentity(_))
        ));
        assert!(matches!(
            repo.get_session("").await,
            Err(SessionError::InvalidIdentity(_))
        ));
        assert!(repo.get_session("replicator").await.is_ok());
    }

    #[tokio::test]
    async fn root_that_is_a_file_is_unreachable() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        let repo = FsRepository::new(&file, None);
        assert!(matches!(
            repo.get_session("admin").await,
            Err(SessionError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn paths_escaping_root_are_rejected() {
        let dir = tempdir().unwrap();
        let repo = FsRepository::new(dir.path(), None);
        let mut session = repo.get_session("admin").await.unwrap();
        assert!(session.write_node(node("/content/../../etc")).await.is_err());
        assert!(session.write_node(node("relative/path")).await.is_err());
        assert_eq!(session.pending_changes(), 0);
    }
}
