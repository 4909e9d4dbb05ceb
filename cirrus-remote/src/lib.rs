use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;

/// Opaque identifier of a file or folder node on the cloud backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeUid(String);

impl NodeUid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Folder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub uid: NodeUid,
    pub name: String,
    pub kind: NodeKind,
}

/// One page of a folder listing. `next_cursor` is `None` on the last page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildPage {
    pub nodes: Vec<NodeInfo>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("node not found: {0}")]
    NotFound(String),
    #[error("stale node reference: {0}")]
    StaleNode(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("remote rejected: {0}")]
    Rejected(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// The cached node identity no longer refers to a valid remote node and
    /// the content has to be re-uploaded under a fresh node.
    pub fn is_stale_node(&self) -> bool {
        matches!(self, RemoteError::StaleNode(_))
    }

    pub fn is_network(&self) -> bool {
        matches!(self, RemoteError::Network(_) | RemoteError::Io(_))
    }
}

/// Narrow capability surface of the cloud storage backend.
///
/// Authentication, crypto, chunking and revision bookkeeping all live behind
/// this trait; the sync engine only sees node identities and outcomes.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Uid of the account's "my files" root folder.
    async fn my_files_root(&self) -> Result<NodeUid, RemoteError>;

    /// One page of children of `folder`. See [`find_child_by_name`] for the
    /// iteration contract.
    async fn list_children_page(
        &self,
        folder: &NodeUid,
        cursor: Option<&str>,
    ) -> Result<ChildPage, RemoteError>;

    async fn create_folder(&self, parent: &NodeUid, name: &str) -> Result<NodeUid, RemoteError>;

    /// Upload a new file under `parent`, streaming content from `source`.
    async fn upload_file(
        &self,
        parent: &NodeUid,
        name: &str,
        source: &Path,
    ) -> Result<NodeUid, RemoteError>;

    /// Upload a new revision of an existing file node.
    async fn upload_revision(&self, node: &NodeUid, source: &Path)
    -> Result<NodeUid, RemoteError>;

    /// Move nodes to the remote trash. Returns one outcome per uid; a uid
    /// that is already trashed or gone reports success.
    async fn trash_nodes(
        &self,
        uids: &[NodeUid],
    ) -> Result<Vec<(NodeUid, Result<(), RemoteError>)>, RemoteError>;

    /// Permanently delete nodes. Same outcome shape as [`Self::trash_nodes`].
    async fn delete_nodes(
        &self,
        uids: &[NodeUid],
    ) -> Result<Vec<(NodeUid, Result<(), RemoteError>)>, RemoteError>;

    /// Re-parent and/or rename a node in place.
    async fn relocate_node(
        &self,
        node: &NodeUid,
        new_parent: Option<&NodeUid>,
        new_name: Option<&str>,
    ) -> Result<(), RemoteError>;
}

/// Look up a direct child of `folder` by name.
///
/// The backend marks its folder-listing cache complete only once the child
/// iteration has been exhausted, so this helper keeps paging to the end even
/// after the name has matched. Do not replace the loop with an early return.
pub async fn find_child_by_name(
    client: &dyn RemoteClient,
    folder: &NodeUid,
    name: &str,
) -> Result<Option<NodeInfo>, RemoteError> {
    let mut found = None;
    let mut cursor: Option<String> = None;
    loop {
        let page = client.list_children_page(folder, cursor.as_deref()).await?;
        for node in page.nodes {
            if found.is_none() && node.name == name {
                found = Some(node);
            }
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    Ok(found)
}
