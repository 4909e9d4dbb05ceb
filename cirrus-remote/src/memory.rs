//! In-memory [`RemoteClient`] backend.
//!
//! Backs the daemon's integration tests and the `CIRRUS_BACKEND=memory`
//! development mode. Failures can be scripted with [`MemoryRemote::push_failure`]:
//! each queued error fails the next trait call, in order.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{ChildPage, NodeInfo, NodeKind, NodeUid, RemoteClient, RemoteError};

const ROOT_UID: &str = "node-0";

#[derive(Debug, Clone)]
struct MemNode {
    name: String,
    kind: NodeKind,
    parent: Option<String>,
    content: Option<Vec<u8>>,
    trashed: bool,
}

#[derive(Debug, Default)]
struct State {
    nodes: HashMap<String, MemNode>,
    next_uid: u64,
    fail_queue: VecDeque<RemoteError>,
    pages_served: usize,
}

pub struct MemoryRemote {
    state: Mutex<State>,
    page_size: usize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::with_page_size(100)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        let mut state = State::default();
        state.nodes.insert(
            ROOT_UID.to_string(),
            MemNode {
                name: "my_files".to_string(),
                kind: NodeKind::Folder,
                parent: None,
                content: None,
                trashed: false,
            },
        );
        state.next_uid = 1;
        Self {
            state: Mutex::new(state),
            page_size: page_size.max(1),
        }
    }

    /// Queue an error; the next trait call consumes and returns it.
    pub fn push_failure(&self, err: RemoteError) {
        self.lock().fail_queue.push_back(err);
    }

    pub fn pages_served(&self) -> usize {
        self.lock().pages_served
    }

    /// Resolve a `a/b/c`-style path from the my-files root.
    pub fn node_at_path(&self, path: &str) -> Option<NodeInfo> {
        let state = self.lock();
        let mut current = ROOT_UID.to_string();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let child = state.nodes.iter().find(|(_, node)| {
                node.parent.as_deref() == Some(current.as_str())
                    && !node.trashed
                    && node.name == segment
            })?;
            current = child.0.clone();
        }
        let node = state.nodes.get(&current)?;
        Some(NodeInfo {
            uid: NodeUid::new(current),
            name: node.name.clone(),
            kind: node.kind,
        })
    }

    pub fn content_at_path(&self, path: &str) -> Option<Vec<u8>> {
        let info = self.node_at_path(path)?;
        self.lock()
            .nodes
            .get(info.uid.as_str())
            .and_then(|node| node.content.clone())
    }

    pub fn live_node_count(&self) -> usize {
        self.lock().nodes.values().filter(|n| !n.trashed).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("memory remote mutex poisoned")
    }

    fn take_failure(&self) -> Result<(), RemoteError> {
        match self.lock().fail_queue.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn mint_uid(state: &mut State) -> String {
        let uid = format!("node-{}", state.next_uid);
        state.next_uid += 1;
        uid
    }

    fn child_by_name(state: &State, parent: &str, name: &str) -> Option<String> {
        state
            .nodes
            .iter()
            .find(|(_, node)| {
                node.parent.as_deref() == Some(parent) && !node.trashed && node.name == name
            })
            .map(|(uid, _)| uid.clone())
    }

    fn descendants(state: &State, uid: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![uid.to_string()];
        while let Some(current) = stack.pop() {
            for (child_uid, node) in &state.nodes {
                if node.parent.as_deref() == Some(current.as_str()) {
                    stack.push(child_uid.clone());
                    out.push(child_uid.clone());
                }
            }
        }
        out
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteClient for MemoryRemote {
    async fn my_files_root(&self) -> Result<NodeUid, RemoteError> {
        self.take_failure()?;
        Ok(NodeUid::new(ROOT_UID))
    }

    async fn list_children_page(
        &self,
        folder: &NodeUid,
        cursor: Option<&str>,
    ) -> Result<ChildPage, RemoteError> {
        self.take_failure()?;
        let mut state = self.lock();
        if !state.nodes.contains_key(folder.as_str()) {
            return Err(RemoteError::NotFound(folder.to_string()));
        }
        let mut children: Vec<NodeInfo> = state
            .nodes
            .iter()
            .filter(|(_, node)| node.parent.as_deref() == Some(folder.as_str()) && !node.trashed)
            .map(|(uid, node)| NodeInfo {
                uid: NodeUid::new(uid.clone()),
                name: node.name.clone(),
                kind: node.kind,
            })
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));

        let offset: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let end = (offset + self.page_size).min(children.len());
        let nodes = children[offset.min(children.len())..end].to_vec();
        let next_cursor = if end < children.len() {
            Some(end.to_string())
        } else {
            None
        };
        state.pages_served += 1;
        Ok(ChildPage { nodes, next_cursor })
    }

    async fn create_folder(&self, parent: &NodeUid, name: &str) -> Result<NodeUid, RemoteError> {
        self.take_failure()?;
        let mut state = self.lock();
        if !state.nodes.contains_key(parent.as_str()) {
            return Err(RemoteError::NotFound(parent.to_string()));
        }
        if let Some(existing) = Self::child_by_name(&state, parent.as_str(), name) {
            // Folder creation is idempotent; a same-name file is a conflict.
            return match state.nodes[&existing].kind {
                NodeKind::Folder => Ok(NodeUid::new(existing)),
                NodeKind::File => Err(RemoteError::Rejected(format!(
                    "name already in use by a file: {name}"
                ))),
            };
        }
        let uid = Self::mint_uid(&mut state);
        state.nodes.insert(
            uid.clone(),
            MemNode {
                name: name.to_string(),
                kind: NodeKind::Folder,
                parent: Some(parent.as_str().to_string()),
                content: None,
                trashed: false,
            },
        );
        Ok(NodeUid::new(uid))
    }

    async fn upload_file(
        &self,
        parent: &NodeUid,
        name: &str,
        source: &Path,
    ) -> Result<NodeUid, RemoteError> {
        self.take_failure()?;
        let content = tokio::fs::read(source).await?;
        let mut state = self.lock();
        if !state.nodes.contains_key(parent.as_str()) {
            return Err(RemoteError::NotFound(parent.to_string()));
        }
        // Re-uploading an existing name replaces the content in place, which
        // keeps replayed CREATE jobs idempotent.
        if let Some(existing) = Self::child_by_name(&state, parent.as_str(), name)
            && state.nodes[&existing].kind == NodeKind::File
        {
            state
                .nodes
                .get_mut(&existing)
                .expect("child uid resolved above")
                .content = Some(content);
            return Ok(NodeUid::new(existing));
        }
        let uid = Self::mint_uid(&mut state);
        state.nodes.insert(
            uid.clone(),
            MemNode {
                name: name.to_string(),
                kind: NodeKind::File,
                parent: Some(parent.as_str().to_string()),
                content: Some(content),
                trashed: false,
            },
        );
        Ok(NodeUid::new(uid))
    }

    async fn upload_revision(
        &self,
        node: &NodeUid,
        source: &Path,
    ) -> Result<NodeUid, RemoteError> {
        self.take_failure()?;
        let content = tokio::fs::read(source).await?;
        let mut state = self.lock();
        match state.nodes.get_mut(node.as_str()) {
            Some(existing) if !existing.trashed && existing.kind == NodeKind::File => {
                existing.content = Some(content);
                Ok(node.clone())
            }
            Some(_) | None => Err(RemoteError::StaleNode(node.to_string())),
        }
    }

    async fn trash_nodes(
        &self,
        uids: &[NodeUid],
    ) -> Result<Vec<(NodeUid, Result<(), RemoteError>)>, RemoteError> {
        self.take_failure()?;
        let mut state = self.lock();
        let mut outcomes = Vec::with_capacity(uids.len());
        for uid in uids {
            let targets = match state.nodes.get(uid.as_str()) {
                Some(_) => {
                    let mut all = Self::descendants(&state, uid.as_str());
                    all.push(uid.as_str().to_string());
                    all
                }
                // Already gone counts as trashed.
                None => Vec::new(),
            };
            for target in targets {
                if let Some(node) = state.nodes.get_mut(&target) {
                    node.trashed = true;
                }
            }
            outcomes.push((uid.clone(), Ok(())));
        }
        Ok(outcomes)
    }

    async fn delete_nodes(
        &self,
        uids: &[NodeUid],
    ) -> Result<Vec<(NodeUid, Result<(), RemoteError>)>, RemoteError> {
        self.take_failure()?;
        let mut state = self.lock();
        let mut outcomes = Vec::with_capacity(uids.len());
        for uid in uids {
            for target in Self::descendants(&state, uid.as_str()) {
                state.nodes.remove(&target);
            }
            state.nodes.remove(uid.as_str());
            outcomes.push((uid.clone(), Ok(())));
        }
        Ok(outcomes)
    }

    async fn relocate_node(
        &self,
        node: &NodeUid,
        new_parent: Option<&NodeUid>,
        new_name: Option<&str>,
    ) -> Result<(), RemoteError> {
        self.take_failure()?;
        let mut state = self.lock();
        if let Some(parent) = new_parent
            && !state.nodes.contains_key(parent.as_str())
        {
            return Err(RemoteError::NotFound(parent.to_string()));
        }
        match state.nodes.get_mut(node.as_str()) {
            Some(existing) if !existing.trashed => {
                if let Some(parent) = new_parent {
                    existing.parent = Some(parent.as_str().to_string());
                }
                if let Some(name) = new_name {
                    existing.name = name.to_string();
                }
                Ok(())
            }
            Some(_) | None => Err(RemoteError::StaleNode(node.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn folder_and_file_round_trip() {
        let remote = MemoryRemote::new();
        let root = remote.my_files_root().await.unwrap();
        let docs = remote.create_folder(&root, "Docs").await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        std::fs::write(&source, b"payload").unwrap();
        remote.upload_file(&docs, "a.txt", &source).await.unwrap();

        assert_eq!(remote.content_at_path("Docs/a.txt").unwrap(), b"payload");
    }

    #[tokio::test]
    async fn trash_hides_subtree_and_tolerates_missing_nodes() {
        let remote = MemoryRemote::new();
        let root = remote.my_files_root().await.unwrap();
        let docs = remote.create_folder(&root, "Docs").await.unwrap();
        remote.create_folder(&docs, "Sub").await.unwrap();

        let outcomes = remote
            .trash_nodes(&[docs.clone(), NodeUid::new("node-99")])
            .await
            .unwrap();
        assert!(outcomes.iter().all(|(_, result)| result.is_ok()));
        assert!(remote.node_at_path("Docs").is_none());
        assert!(remote.node_at_path("Docs/Sub").is_none());
    }

    #[tokio::test]
    async fn relocate_renames_and_reparents() {
        let remote = MemoryRemote::new();
        let root = remote.my_files_root().await.unwrap();
        let docs = remote.create_folder(&root, "Docs").await.unwrap();
        let pics = remote.create_folder(&root, "Pics").await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        std::fs::write(&source, b"x").unwrap();
        let file = remote.upload_file(&docs, "a.txt", &source).await.unwrap();

        remote
            .relocate_node(&file, Some(&pics), Some("b.txt"))
            .await
            .unwrap();
        assert!(remote.node_at_path("Docs/a.txt").is_none());
        assert_eq!(remote.node_at_path("Pics/b.txt").unwrap().uid, file);
    }

    #[tokio::test]
    async fn scripted_failure_fires_once() {
        let remote = MemoryRemote::new();
        remote.push_failure(RemoteError::Network("connection reset".into()));

        let err = remote.my_files_root().await.unwrap_err();
        assert!(err.is_network());
        assert!(remote.my_files_root().await.is_ok());
    }

    #[tokio::test]
    async fn revision_of_trashed_node_is_stale() {
        let remote = MemoryRemote::new();
        let root = remote.my_files_root().await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        std::fs::write(&source, b"x").unwrap();
        let file = remote.upload_file(&root, "a.txt", &source).await.unwrap();
        remote.trash_nodes(std::slice::from_ref(&file)).await.unwrap();

        let err = remote.upload_revision(&file, &source).await.unwrap_err();
        assert!(err.is_stale_node());
    }
}
