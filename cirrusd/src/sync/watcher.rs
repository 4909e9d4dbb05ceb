use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::Read;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use sha1::{Digest, Sha1};
use tokio::sync::mpsc;
use tracing::warn;
use walkdir::WalkDir;

use super::paths;
use super::store::{Store, StoreError};
use crate::config::SyncDir;

/// A filesystem change as delivered by the watcher. `name` is relative to
/// the watch root, forward-slash separated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub name: String,
    pub exists: bool,
    /// Whether this path is freshly observed (as opposed to a change to a
    /// path seen before).
    pub is_new: bool,
    pub kind: EntryKind,
    /// Inode at last observation; 0 when the identity was never captured.
    pub ino: u64,
    /// Hex sha1 of the content, present for files that currently exist.
    pub content_sha1: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// Events delivered atomically for one watch root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBatch {
    pub watch_root: PathBuf,
    pub remote_root: String,
    pub clock: String,
    pub events: Vec<ChangeEvent>,
}

/// A subscription request: the dir plus the clock sequence to resume from.
#[derive(Debug, Clone)]
pub struct WatchSpec {
    pub dir: SyncDir,
    pub last_clock: u64,
}

pub fn parse_clock(token: &str) -> u64 {
    token
        .strip_prefix("c:")
        .and_then(|seq| seq.parse().ok())
        .unwrap_or(0)
}

fn mint_clock(seq: u64) -> String {
    format!("c:{seq}")
}

/// Keeps the notify watchers and batcher tasks alive; dropping or shutting
/// down the handle ends the subscription.
pub struct WatchHandle {
    watchers: Vec<RecommendedWatcher>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl WatchHandle {
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        drop(self.watchers);
    }
}

/// Continuous mode: one notify watcher per sync dir, raw events debounced
/// into [`EventBatch`]es on the returned channel.
pub fn start_watch_subscriptions(
    specs: Vec<WatchSpec>,
    debounce: Duration,
) -> notify::Result<(WatchHandle, mpsc::UnboundedReceiver<EventBatch>)> {
    let (batch_tx, batch_rx) = mpsc::unbounded_channel();
    let mut watchers = Vec::with_capacity(specs.len());
    let mut tasks = Vec::with_capacity(specs.len());

    for spec in specs {
        let root = spec.dir.local_root.clone();
        let known = prime_known(&root);
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<String>();

        let callback_root = root.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "watcher error");
                    return;
                }
            };
            if matches!(event.kind, notify::EventKind::Access(_)) {
                return;
            }
            for path in event.paths {
                if let Ok(relative) = path.strip_prefix(&callback_root) {
                    let name = relative.to_string_lossy().replace('\\', "/");
                    if !name.is_empty() {
                        let _ = raw_tx.send(name);
                    }
                }
            }
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        watchers.push(watcher);

        tasks.push(tokio::spawn(run_batcher(
            root,
            spec.dir.remote_root.clone(),
            spec.last_clock,
            known,
            raw_rx,
            batch_tx.clone(),
            debounce,
        )));
    }

    Ok((WatchHandle { watchers, tasks }, batch_rx))
}

async fn run_batcher(
    root: PathBuf,
    remote_root: String,
    mut seq: u64,
    mut known: HashMap<String, u64>,
    mut raw_rx: mpsc::UnboundedReceiver<String>,
    batch_tx: mpsc::UnboundedSender<EventBatch>,
    debounce: Duration,
) {
    while let Some(first) = raw_rx.recv().await {
        tokio::time::sleep(debounce).await;
        let mut names = BTreeSet::new();
        names.insert(first);
        while let Ok(more) = raw_rx.try_recv() {
            names.insert(more);
        }

        let mut events = Vec::new();
        for name in names {
            if let Some(event) = observe(&root, &name, &mut known) {
                events.push(event);
            }
        }
        if events.is_empty() {
            continue;
        }

        seq += 1;
        let batch = EventBatch {
            watch_root: root.clone(),
            remote_root: remote_root.clone(),
            clock: mint_clock(seq),
            events,
        };
        if batch_tx.send(batch).is_err() {
            return;
        }
    }
}

/// Record the state of a path at watch start so later removals still carry
/// the inode the path had, and pre-existing paths are not reported as new.
fn prime_known(root: &Path) -> HashMap<String, u64> {
    let mut known = HashMap::new();
    for entry in WalkDir::new(root).min_depth(1).into_iter().filter_map(Result::ok) {
        if entry.path_is_symlink() {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        if let Ok(relative) = entry.path().strip_prefix(root) {
            known.insert(relative.to_string_lossy().replace('\\', "/"), meta.ino());
        }
    }
    known
}

fn observe(root: &Path, name: &str, known: &mut HashMap<String, u64>) -> Option<ChangeEvent> {
    let path = root.join(name);
    match std::fs::symlink_metadata(&path) {
        Ok(meta) if meta.file_type().is_symlink() => None,
        Ok(meta) => {
            let kind = if meta.is_dir() { EntryKind::Dir } else { EntryKind::File };
            let is_new = !known.contains_key(name);
            known.insert(name.to_string(), meta.ino());
            let content_sha1 = match kind {
                EntryKind::File => hash_file(&path).ok(),
                EntryKind::Dir => None,
            };
            Some(ChangeEvent {
                name: name.to_string(),
                exists: true,
                is_new,
                kind,
                ino: meta.ino(),
                content_sha1,
            })
        }
        Err(_) => {
            let ino = known.remove(name).unwrap_or(0);
            let child_prefix = format!("{name}/");
            let kind = if known.keys().any(|key| key.starts_with(&child_prefix)) {
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            if kind == EntryKind::Dir {
                known.retain(|key, _| !key.starts_with(&child_prefix));
            }
            Some(ChangeEvent {
                name: name.to_string(),
                exists: false,
                is_new: false,
                kind,
                ino,
                content_sha1: None,
            })
        }
    }
}

pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// One-shot replay: walk every sync dir and synthesize the events that bring
/// the remote in line with the disk, diffed against the stored hashes and
/// mappings. Returns one batch per dir.
pub async fn scan_all_changes(
    store: &Store,
    dirs: &[SyncDir],
) -> Result<Vec<EventBatch>, StoreError> {
    let hashes = store.list_file_hashes().await?;
    let mappings = store.list_node_mappings().await?;
    let mapped_paths: HashSet<&str> = mappings
        .iter()
        .map(|mapping| mapping.local_path.as_str())
        .collect();

    let mut batches = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let root = &dir.local_root;
        let mut events = Vec::new();
        let mut seen = HashSet::new();

        for entry in WalkDir::new(root).min_depth(1).into_iter().filter_map(Result::ok) {
            if entry.path_is_symlink() {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            let Ok(relative) = entry.path().strip_prefix(root) else { continue };
            let name = relative.to_string_lossy().replace('\\', "/");
            let local = paths::local_path(root, &name);
            seen.insert(name.clone());

            if meta.is_dir() {
                events.push(ChangeEvent {
                    name,
                    exists: true,
                    is_new: !mapped_paths.contains(local.as_str()),
                    kind: EntryKind::Dir,
                    ino: meta.ino(),
                    content_sha1: None,
                });
            } else {
                let tracked = mapped_paths.contains(local.as_str())
                    || hashes.iter().any(|(path, _)| path == &local);
                let content_sha1 = match hash_file(entry.path()) {
                    Ok(digest) => Some(digest),
                    Err(err) => {
                        warn!(path = %local, error = %err, "failed to hash file, skipping");
                        continue;
                    }
                };
                events.push(ChangeEvent {
                    name,
                    exists: true,
                    is_new: !tracked,
                    kind: EntryKind::File,
                    ino: meta.ino(),
                    content_sha1,
                });
            }
        }

        // Tracked rows with no matching path on disk became deletes.
        let root_str = root.to_string_lossy().replace('\\', "/");
        let mut deleted = HashSet::new();
        for (path, _) in &hashes {
            if let Some(name) = relative_name(&root_str, path)
                && !seen.contains(&name)
                && deleted.insert(name.clone())
            {
                events.push(delete_event(name, EntryKind::File));
            }
        }
        for mapping in &mappings {
            if let Some(name) = relative_name(&root_str, &mapping.local_path)
                && !seen.contains(&name)
                && deleted.insert(name.clone())
            {
                let kind = if mapping.is_directory { EntryKind::Dir } else { EntryKind::File };
                events.push(delete_event(name, kind));
            }
        }

        let seq = parse_clock(&store.get_clock(&root_str).await?.unwrap_or_default());
        batches.push(EventBatch {
            watch_root: root.clone(),
            remote_root: dir.remote_root.clone(),
            clock: mint_clock(seq + 1),
            events,
        });
    }
    Ok(batches)
}

fn delete_event(name: String, kind: EntryKind) -> ChangeEvent {
    ChangeEvent {
        name,
        exists: false,
        is_new: false,
        kind,
        ino: 0,
        content_sha1: None,
    }
}

fn relative_name(root: &str, local_path: &str) -> Option<String> {
    let prefix = format!("{}/", root.trim_end_matches('/'));
    local_path.strip_prefix(&prefix).map(str::to_string)
}
