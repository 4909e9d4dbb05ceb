use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cirrus_remote::{NodeKind, NodeUid, RemoteClient, RemoteError, find_child_by_name};
use sqlx::SqliteConnection;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::backoff::retry_delay;
use super::paths;
use super::queue::{
    ErrorCategory, EventType, NETWORK_RETRY_CEILING, REUPLOAD_HEAL_AFTER, SyncJob,
    classify_message, classify_remote_error,
};
use super::store::{NodeMappingRow, Store, StoreError, now_unix};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Node mapping not found: {0}")]
    MissingMapping(String),
    #[error("local file is gone: {0}")]
    MissingLocal(String),
}

fn classify(err: &JobError) -> ErrorCategory {
    match err {
        JobError::Remote(remote_err) => classify_remote_error(remote_err),
        other => classify_message(&other.to_string()),
    }
}

/// Bounded-concurrency worker pool. Each tick fills the free slots with due
/// jobs; every job runs on its own task and records its own outcome, so a
/// failure never escapes a worker.
pub struct JobExecutor {
    store: Arc<Store>,
    remote: Arc<dyn RemoteClient>,
    concurrency: Arc<AtomicUsize>,
    active: JoinSet<Result<(), StoreError>>,
}

impl JobExecutor {
    pub fn new(store: Arc<Store>, remote: Arc<dyn RemoteClient>, concurrency: Arc<AtomicUsize>) -> Self {
        Self {
            store,
            remote,
            concurrency,
            active: JoinSet::new(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// One scheduler tick. Returns how many jobs were spawned.
    pub async fn tick(&mut self) -> Result<usize, StoreError> {
        self.reap_finished();
        let limit = self.concurrency.load(Ordering::Relaxed).max(1);
        let mut spawned = 0;
        while self.active.len() < limit {
            let Some(job) = self.store.lease_next_pending(now_unix()).await? else {
                break;
            };
            let store = Arc::clone(&self.store);
            let remote = Arc::clone(&self.remote);
            self.active.spawn(process_job(store, remote, job));
            spawned += 1;
        }
        Ok(spawned)
    }

    /// Drain mode: loop until no task is active and no job is pending. Jobs
    /// waiting on a future `retry_at` are slept on, so a permanently failing
    /// network job keeps a drain alive by design.
    pub async fn drain(&mut self) -> Result<(), StoreError> {
        loop {
            self.tick().await?;
            if let Some(joined) = self.active.join_next().await {
                log_join_outcome(joined);
                continue;
            }
            if !self.store.has_pending_jobs().await? {
                return Ok(());
            }
            let now = now_unix();
            let wait = self
                .store
                .next_pending_retry_at()
                .await?
                .map(|at| (at - now).max(1) as u64)
                .unwrap_or(1);
            debug!(seconds = wait, "drain idle, waiting for next retry");
            tokio::time::sleep(Duration::from_secs(wait)).await;
        }
    }

    /// Wait up to `timeout` for in-flight tasks; abandon the rest. Abandoned
    /// jobs stay PROCESSING and are reset to PENDING on the next startup.
    pub async fn shutdown(mut self, timeout: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.active.join_next()).await {
                Ok(Some(joined)) => log_join_outcome(joined),
                Ok(None) => return 0,
                Err(_) => {
                    let abandoned = self.active.len();
                    self.active.abort_all();
                    return abandoned;
                }
            }
        }
    }

    fn reap_finished(&mut self) {
        while let Some(joined) = self.active.try_join_next() {
            log_join_outcome(joined);
        }
    }
}

fn log_join_outcome(joined: Result<Result<(), StoreError>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            // The job stays PROCESSING and is recovered by the startup reset.
            error!(error = %err, "store failure while recording a job outcome");
        }
        Err(err) if err.is_cancelled() => {}
        Err(err) => error!(error = %err, "worker task panicked"),
    }
}

pub(crate) async fn process_job(
    store: Arc<Store>,
    remote: Arc<dyn RemoteClient>,
    job: SyncJob,
) -> Result<(), StoreError> {
    debug!(id = job.id, kind = job.event_type.as_str(), path = %job.local_path, "job start");
    match execute(&store, remote.as_ref(), &job).await {
        Ok(()) => {
            info!(id = job.id, kind = job.event_type.as_str(), path = %job.local_path, "job synced");
            Ok(())
        }
        Err(err) => handle_failure(&store, remote.as_ref(), &job, err).await,
    }
}

async fn execute(store: &Store, remote: &dyn RemoteClient, job: &SyncJob) -> Result<(), JobError> {
    match job.event_type {
        EventType::Delete => execute_delete(store, remote, job).await,
        EventType::Create | EventType::Update => execute_upload(store, remote, job).await,
        EventType::Rename => execute_rename(store, remote, job).await,
        EventType::Move => execute_move(store, remote, job).await,
    }
}

async fn execute_delete(
    store: &Store,
    remote: &dyn RemoteClient,
    job: &SyncJob,
) -> Result<(), JobError> {
    // Resolve by path; a node that is already gone counts as deleted.
    if let Some(uid) = resolve_remote_node(remote, &job.remote_path).await? {
        for (_, outcome) in remote.trash_nodes(&[uid]).await? {
            match outcome {
                Ok(()) | Err(RemoteError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    let mut tx = store.begin().await.map_err(JobError::Store)?;
    store
        .delete_node_mapping_tx(&mut tx, &job.local_path, &job.remote_path)
        .await?;
    store.mark_job_synced_tx(&mut tx, job.id).await?;
    tx.commit().await.map_err(StoreError::from)?;
    Ok(())
}

async fn execute_upload(
    store: &Store,
    remote: &dyn RemoteClient,
    job: &SyncJob,
) -> Result<(), JobError> {
    let meta = tokio::fs::metadata(&job.local_path)
        .await
        .map_err(|_| JobError::MissingLocal(job.local_path.clone()))?;
    let parent_uid = ensure_remote_parent(remote, &job.remote_path).await?;
    let name = paths::basename(&job.remote_path).to_string();
    let now = now_unix();

    if meta.is_dir() {
        let uid = match find_child_by_name(remote, &parent_uid, &name).await? {
            Some(info) if info.kind == NodeKind::Folder => info.uid,
            _ => remote.create_folder(&parent_uid, &name).await?,
        };
        let mut tx = store.begin().await.map_err(JobError::Store)?;
        store
            .set_node_mapping_tx(
                &mut tx,
                &NodeMappingRow {
                    local_path: job.local_path.clone(),
                    remote_path: job.remote_path.clone(),
                    node_uid: uid.as_str().to_string(),
                    parent_node_uid: Some(parent_uid.as_str().to_string()),
                    is_directory: true,
                    updated_at: now,
                },
            )
            .await?;
        store.mark_job_synced_tx(&mut tx, job.id).await?;
        tx.commit().await.map_err(StoreError::from)?;
        return Ok(());
    }

    // A live mapping means the node exists remotely: upload a revision in
    // place. Otherwise create a fresh file node.
    let mapping = store.get_node_mapping(&job.local_path, &job.remote_path).await?;
    let uid = match mapping {
        Some(mapping) if !mapping.is_directory => {
            remote
                .upload_revision(&NodeUid::new(mapping.node_uid), Path::new(&job.local_path))
                .await?
        }
        _ => {
            remote
                .upload_file(&parent_uid, &name, Path::new(&job.local_path))
                .await?
        }
    };

    let mut tx = store.begin().await.map_err(JobError::Store)?;
    if let Some(hash) = &job.content_hash {
        store.set_file_hash_tx(&mut tx, &job.local_path, hash, now).await?;
    }
    store
        .set_node_mapping_tx(
            &mut tx,
            &NodeMappingRow {
                local_path: job.local_path.clone(),
                remote_path: job.remote_path.clone(),
                node_uid: uid.as_str().to_string(),
                parent_node_uid: Some(parent_uid.as_str().to_string()),
                is_directory: false,
                updated_at: now,
            },
        )
        .await?;
    store.mark_job_synced_tx(&mut tx, job.id).await?;
    tx.commit().await.map_err(StoreError::from)?;
    Ok(())
}

async fn execute_rename(
    store: &Store,
    remote: &dyn RemoteClient,
    job: &SyncJob,
) -> Result<(), JobError> {
    let old_local = job.old_local_path.as_deref().unwrap_or(&job.local_path);
    let old_remote = job.old_remote_path.as_deref().unwrap_or(&job.remote_path);
    let mapping = store
        .get_node_mapping(old_local, old_remote)
        .await?
        .ok_or_else(|| JobError::MissingMapping(old_local.to_string()))?;

    let new_name = paths::basename(&job.local_path);
    remote
        .relocate_node(&NodeUid::new(mapping.node_uid.clone()), None, Some(new_name))
        .await?;

    let now = now_unix();
    let mut tx = store.begin().await.map_err(JobError::Store)?;
    store
        .update_node_mapping_path_tx(
            &mut tx,
            old_local,
            old_remote,
            &job.local_path,
            &job.remote_path,
            None,
            now,
        )
        .await?;
    rekey_descendants(store, &mut tx, &mapping, old_local, old_remote, job, now).await?;
    store.mark_job_synced_tx(&mut tx, job.id).await?;
    tx.commit().await.map_err(StoreError::from)?;
    Ok(())
}

async fn execute_move(
    store: &Store,
    remote: &dyn RemoteClient,
    job: &SyncJob,
) -> Result<(), JobError> {
    let old_local = job.old_local_path.as_deref().unwrap_or(&job.local_path);
    let old_remote = job.old_remote_path.as_deref().unwrap_or(&job.remote_path);
    let mapping = store
        .get_node_mapping(old_local, old_remote)
        .await?
        .ok_or_else(|| JobError::MissingMapping(old_local.to_string()))?;

    let new_parent = ensure_remote_parent(remote, &job.remote_path).await?;
    let new_name = paths::basename(&job.local_path);
    let rename_to = (paths::basename(old_local) != new_name).then_some(new_name);
    remote
        .relocate_node(
            &NodeUid::new(mapping.node_uid.clone()),
            Some(&new_parent),
            rename_to,
        )
        .await?;

    let now = now_unix();
    let mut tx = store.begin().await.map_err(JobError::Store)?;
    store
        .update_node_mapping_path_tx(
            &mut tx,
            old_local,
            old_remote,
            &job.local_path,
            &job.remote_path,
            Some(new_parent.as_str()),
            now,
        )
        .await?;
    rekey_descendants(store, &mut tx, &mapping, old_local, old_remote, job, now).await?;
    store.mark_job_synced_tx(&mut tx, job.id).await?;
    tx.commit().await.map_err(StoreError::from)?;
    Ok(())
}

/// Bookkeeping that rides along with a relocate: a directory's descendants
/// keep their node identities but move under the new prefix, a file re-keys
/// its own hash row.
async fn rekey_descendants(
    store: &Store,
    conn: &mut SqliteConnection,
    mapping: &NodeMappingRow,
    old_local: &str,
    old_remote: &str,
    job: &SyncJob,
    now: i64,
) -> Result<(), StoreError> {
    if mapping.is_directory {
        store
            .rename_file_hashes_under_tx(&mut *conn, old_local, &job.local_path)
            .await?;
        store
            .update_node_mappings_under_tx(
                &mut *conn,
                old_local,
                old_remote,
                &job.local_path,
                &job.remote_path,
                now,
            )
            .await?;
    } else {
        store.rename_file_hash_tx(conn, old_local, &job.local_path).await?;
    }
    Ok(())
}

async fn handle_failure(
    store: &Store,
    remote: &dyn RemoteClient,
    job: &SyncJob,
    err: JobError,
) -> Result<(), StoreError> {
    let category = classify(&err);
    let mut message = err.to_string();

    if category == ErrorCategory::ReuploadNeeded && job.n_retries >= REUPLOAD_HEAL_AFTER {
        info!(id = job.id, path = %job.local_path, "stale node, attempting delete+create heal");
        match heal_reupload(store, remote, job).await {
            Ok(()) => {
                info!(id = job.id, path = %job.local_path, "heal succeeded, job synced");
                return Ok(());
            }
            Err(heal_err) => {
                warn!(id = job.id, error = %heal_err, "heal failed, falling back to retry");
                message = heal_err.to_string();
            }
        }
    }

    let attempts = job.n_retries.saturating_add(1);
    if let Some(max) = category.max_retries()
        && attempts >= max
    {
        warn!(id = job.id, path = %job.local_path, error = %message, "retries exhausted, job blocked");
        let mut tx = store.begin().await?;
        store.mark_job_blocked_tx(&mut tx, job.id, &message).await?;
        tx.commit().await?;
        return Ok(());
    }

    let stored_retries = match category {
        ErrorCategory::Network => attempts.min(NETWORK_RETRY_CEILING),
        _ => attempts,
    };
    let delay = retry_delay(category, job.n_retries);
    let retry_at = now_unix().saturating_add(delay.as_secs() as i64);
    debug!(
        id = job.id,
        path = %job.local_path,
        attempts,
        retry_at,
        error = %message,
        "job rescheduled"
    );
    let mut tx = store.begin().await?;
    store
        .schedule_retry_tx(&mut tx, job.id, stored_retries, retry_at, &message)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Delete+create recovery for a stale local/remote identity: drop whatever
/// the remote path still resolves to, forget the cached mapping, and run the
/// job as a fresh upload.
async fn heal_reupload(
    store: &Store,
    remote: &dyn RemoteClient,
    job: &SyncJob,
) -> Result<(), JobError> {
    if let Some(uid) = resolve_remote_node(remote, &job.remote_path).await? {
        for (_, outcome) in remote.trash_nodes(&[uid]).await? {
            match outcome {
                Ok(()) | Err(RemoteError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
    }
    let mut tx = store.begin().await.map_err(JobError::Store)?;
    store
        .delete_node_mapping_tx(&mut tx, &job.local_path, &job.remote_path)
        .await?;
    if let (Some(old_local), Some(old_remote)) = (
        job.old_local_path.as_deref(),
        job.old_remote_path.as_deref(),
    ) {
        store.delete_node_mapping_tx(&mut tx, old_local, old_remote).await?;
    }
    tx.commit().await.map_err(StoreError::from)?;

    execute_upload(store, remote, job).await
}

/// Walk `remote_path` down from the my-files root, creating missing folders
/// along the way, and return the uid of the parent folder of the final
/// segment.
async fn ensure_remote_parent(
    remote: &dyn RemoteClient,
    remote_path: &str,
) -> Result<NodeUid, RemoteError> {
    let segments: Vec<&str> = paths::remote_segments(remote_path).collect();
    let mut current = remote.my_files_root().await?;
    if segments.len() <= 1 {
        return Ok(current);
    }
    for segment in &segments[..segments.len() - 1] {
        current = match find_child_by_name(remote, &current, segment).await? {
            Some(info) if info.kind == NodeKind::Folder => info.uid,
            Some(info) => {
                return Err(RemoteError::Rejected(format!(
                    "path segment is a file: {}",
                    info.name
                )));
            }
            None => remote.create_folder(&current, segment).await?,
        };
    }
    Ok(current)
}

/// Resolve a remote path to a node uid, or `None` when any segment is
/// missing.
async fn resolve_remote_node(
    remote: &dyn RemoteClient,
    remote_path: &str,
) -> Result<Option<NodeUid>, RemoteError> {
    let segments: Vec<&str> = paths::remote_segments(remote_path).collect();
    let mut current = remote.my_files_root().await?;
    let last = segments.len().saturating_sub(1);
    for (index, segment) in segments.iter().enumerate() {
        match find_child_by_name(remote, &current, segment).await? {
            Some(info) => {
                if index < last && info.kind != NodeKind::Folder {
                    return Ok(None);
                }
                current = info.uid;
            }
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
