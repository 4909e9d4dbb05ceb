use std::collections::HashMap;

use sqlx::SqliteConnection;
use tracing::debug;

use super::paths;
use super::queue::{EventType, NewJob};
use super::store::{Store, StoreError, now_unix};
use super::watcher::{ChangeEvent, EntryKind, EventBatch};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TranslationSummary {
    pub enqueued: usize,
    /// Update events dropped because the stored hash already matches.
    pub suppressed: usize,
}

struct Located<'a> {
    event: &'a ChangeEvent,
    local_path: String,
    remote_path: String,
}

/// Translate one watcher batch into the minimal set of sync jobs, plus the
/// hash and mapping bookkeeping that goes with them. Everything commits in a
/// single transaction; with `dry_run` nothing is written and the summary
/// reports what would have been enqueued.
pub async fn translate_batch(
    store: &Store,
    batch: &EventBatch,
    dry_run: bool,
) -> Result<TranslationSummary, StoreError> {
    let mut summary = TranslationSummary::default();
    let now = now_unix();
    let mut tx = store.begin().await?;

    let mut deletes = Vec::new();
    let mut creates = Vec::new();
    let mut updates = Vec::new();
    for event in &batch.events {
        let located = Located {
            event,
            local_path: paths::local_path(&batch.watch_root, &event.name),
            remote_path: paths::remote_path(&batch.watch_root, &batch.remote_root, &event.name),
        };
        if !event.exists {
            deletes.push(located);
        } else if event.is_new {
            creates.push(located);
        } else {
            updates.push(located);
        }
    }

    // A delete and a create sharing an inode are one rename or move. Inode 0
    // means the identity was never observed and cannot pair.
    let mut delete_by_ino = HashMap::new();
    for (index, delete) in deletes.iter().enumerate() {
        if delete.event.ino != 0 {
            delete_by_ino.entry(delete.event.ino).or_insert(index);
        }
    }
    let mut paired_deletes = vec![false; deletes.len()];
    let mut paired_creates = vec![false; creates.len()];
    let mut pairs = Vec::new();
    for (index, create) in creates.iter().enumerate() {
        if create.event.ino != 0
            && let Some(&delete_index) = delete_by_ino.get(&create.event.ino)
            && !paired_deletes[delete_index]
        {
            paired_deletes[delete_index] = true;
            paired_creates[index] = true;
            pairs.push((delete_index, index));
        }
    }

    for (delete_index, create_index) in pairs {
        let from = &deletes[delete_index];
        let to = &creates[create_index];
        // An in-place relocate needs the remote node identity; without a
        // mapping the pair degrades to delete + create.
        match store
            .get_node_mapping_tx(&mut tx, &from.local_path, &from.remote_path)
            .await?
        {
            Some(_) => {
                let event_type =
                    if paths::dirname(&from.local_path) == paths::dirname(&to.local_path) {
                        EventType::Rename
                    } else {
                        EventType::Move
                    };
                debug!(
                    from = %from.local_path,
                    to = %to.local_path,
                    kind = event_type.as_str(),
                    "paired filesystem identity"
                );
                let job = NewJob::new(event_type, to.local_path.clone(), to.remote_path.clone())
                    .with_hash(to.event.content_sha1.clone())
                    .with_old_paths(from.local_path.clone(), from.remote_path.clone());
                if !dry_run {
                    store.enqueue_job_tx(&mut tx, &job, now).await?;
                }
                summary.enqueued += 1;
            }
            None => {
                emit_delete(store, &mut tx, from, dry_run, now, &mut summary).await?;
                emit_create(store, &mut tx, to, dry_run, now, &mut summary).await?;
            }
        }
    }

    for (index, from) in deletes.iter().enumerate() {
        if !paired_deletes[index] {
            emit_delete(store, &mut tx, from, dry_run, now, &mut summary).await?;
        }
    }
    for (index, to) in creates.iter().enumerate() {
        if !paired_creates[index] {
            emit_create(store, &mut tx, to, dry_run, now, &mut summary).await?;
        }
    }

    for update in &updates {
        if update.event.kind == EntryKind::Dir {
            // Directory metadata changes have no remote representation.
            continue;
        }
        let stored = store.get_file_hash_tx(&mut tx, &update.local_path).await?;
        if stored.is_some() && stored.as_deref() == update.event.content_sha1.as_deref() {
            summary.suppressed += 1;
            continue;
        }
        let job = NewJob::new(
            EventType::Update,
            update.local_path.clone(),
            update.remote_path.clone(),
        )
        .with_hash(update.event.content_sha1.clone());
        if !dry_run {
            store.enqueue_job_tx(&mut tx, &job, now).await?;
        }
        summary.enqueued += 1;
    }

    tx.commit().await?;
    Ok(summary)
}

async fn emit_delete(
    store: &Store,
    conn: &mut SqliteConnection,
    item: &Located<'_>,
    dry_run: bool,
    now: i64,
    summary: &mut TranslationSummary,
) -> Result<(), StoreError> {
    let job = NewJob::new(
        EventType::Delete,
        item.local_path.clone(),
        item.remote_path.clone(),
    );
    if !dry_run {
        store.enqueue_job_tx(&mut *conn, &job, now).await?;
        store.delete_file_hash_tx(&mut *conn, &item.local_path).await?;
        store
            .delete_node_mapping_tx(&mut *conn, &item.local_path, &item.remote_path)
            .await?;
        if item.event.kind == EntryKind::Dir {
            store
                .delete_file_hashes_under_tx(&mut *conn, &item.local_path)
                .await?;
            store
                .delete_node_mappings_under_tx(&mut *conn, &item.local_path, &item.remote_path)
                .await?;
        }
    }
    summary.enqueued += 1;
    Ok(())
}

async fn emit_create(
    store: &Store,
    conn: &mut SqliteConnection,
    item: &Located<'_>,
    dry_run: bool,
    now: i64,
    summary: &mut TranslationSummary,
) -> Result<(), StoreError> {
    let job = NewJob::new(
        EventType::Create,
        item.local_path.clone(),
        item.remote_path.clone(),
    )
    .with_hash(item.event.content_sha1.clone());
    if !dry_run {
        store.enqueue_job_tx(conn, &job, now).await?;
    }
    summary.enqueued += 1;
    Ok(())
}

#[cfg(test)]
#[path = "translator_tests.rs"]
mod tests;
