use std::path::PathBuf;

use sqlx::SqlitePool;

use super::*;
use crate::sync::queue::JobStatus;
use crate::sync::store::NodeMappingRow;

async fn make_store() -> Store {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    let store = Store::from_pool(pool);
    store.init().await.unwrap();
    store
}

fn batch(events: Vec<ChangeEvent>) -> EventBatch {
    EventBatch {
        watch_root: PathBuf::from("/w"),
        remote_root: String::new(),
        clock: "c:1".into(),
        events,
    }
}

fn file_event(name: &str, exists: bool, is_new: bool, ino: u64, hash: Option<&str>) -> ChangeEvent {
    ChangeEvent {
        name: name.into(),
        exists,
        is_new,
        kind: EntryKind::File,
        ino,
        content_sha1: hash.map(str::to_string),
    }
}

fn dir_event(name: &str, exists: bool, is_new: bool, ino: u64) -> ChangeEvent {
    ChangeEvent {
        name: name.into(),
        exists,
        is_new,
        kind: EntryKind::Dir,
        ino,
        content_sha1: None,
    }
}

async fn insert_mapping(store: &Store, local: &str, remote: &str, uid: &str, is_dir: bool) {
    let mut tx = store.begin().await.unwrap();
    store
        .set_node_mapping_tx(
            &mut tx,
            &NodeMappingRow {
                local_path: local.into(),
                remote_path: remote.into(),
                node_uid: uid.into(),
                parent_node_uid: Some("p-1".into()),
                is_directory: is_dir,
                updated_at: 1,
            },
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();
}

async fn pending_count(store: &Store) -> i64 {
    store.count_jobs_with_status(JobStatus::Pending).await.unwrap()
}

#[tokio::test]
async fn mapped_pair_in_same_dir_becomes_one_rename() {
    let store = make_store().await;
    insert_mapping(&store, "/w/a.txt", "w/a.txt", "uid-1", false).await;

    let summary = translate_batch(
        &store,
        &batch(vec![
            file_event("a.txt", false, false, 42, None),
            file_event("b.txt", true, true, 42, Some("h1")),
        ]),
        false,
    )
    .await
    .unwrap();

    assert_eq!(summary.enqueued, 1);
    assert_eq!(pending_count(&store).await, 1);

    let job = store.get_job_by_key("/w/b.txt", "w/b.txt").await.unwrap().unwrap();
    assert_eq!(job.event_type, EventType::Rename);
    assert_eq!(job.old_local_path.as_deref(), Some("/w/a.txt"));
    assert_eq!(job.old_remote_path.as_deref(), Some("w/a.txt"));
    assert_eq!(job.content_hash.as_deref(), Some("h1"));
}

#[tokio::test]
async fn mapped_pair_across_dirs_becomes_one_move() {
    let store = make_store().await;
    insert_mapping(&store, "/w/sub1/x", "w/sub1/x", "uid-1", false).await;

    translate_batch(
        &store,
        &batch(vec![
            file_event("sub1/x", false, false, 7, None),
            file_event("sub2/x", true, true, 7, Some("h2")),
        ]),
        false,
    )
    .await
    .unwrap();

    assert_eq!(pending_count(&store).await, 1);
    let job = store.get_job_by_key("/w/sub2/x", "w/sub2/x").await.unwrap().unwrap();
    assert_eq!(job.event_type, EventType::Move);
    assert_eq!(job.old_local_path.as_deref(), Some("/w/sub1/x"));
}

#[tokio::test]
async fn unmapped_pair_falls_back_to_delete_plus_create() {
    let store = make_store().await;

    let summary = translate_batch(
        &store,
        &batch(vec![
            file_event("sub1/x", false, false, 7, None),
            file_event("sub2/x", true, true, 7, Some("h2")),
        ]),
        false,
    )
    .await
    .unwrap();

    assert_eq!(summary.enqueued, 2);
    let delete = store.get_job_by_key("/w/sub1/x", "w/sub1/x").await.unwrap().unwrap();
    assert_eq!(delete.event_type, EventType::Delete);
    assert_eq!(delete.content_hash, None);
    let create = store.get_job_by_key("/w/sub2/x", "w/sub2/x").await.unwrap().unwrap();
    assert_eq!(create.event_type, EventType::Create);
    assert_eq!(create.content_hash.as_deref(), Some("h2"));
}

#[tokio::test]
async fn unpaired_inode_zero_never_matches() {
    let store = make_store().await;
    insert_mapping(&store, "/w/a.txt", "w/a.txt", "uid-1", false).await;

    // The delete lost its identity (ino 0), so even a same-batch create
    // cannot pair with it.
    translate_batch(
        &store,
        &batch(vec![
            file_event("a.txt", false, false, 0, None),
            file_event("b.txt", true, true, 0, Some("h1")),
        ]),
        false,
    )
    .await
    .unwrap();

    assert_eq!(pending_count(&store).await, 2);
}

#[tokio::test]
async fn update_with_unchanged_hash_is_suppressed() {
    let store = make_store().await;
    let mut tx = store.begin().await.unwrap();
    store.set_file_hash_tx(&mut tx, "/w/f", "h3", 1).await.unwrap();
    tx.commit().await.unwrap();

    let summary = translate_batch(
        &store,
        &batch(vec![file_event("f", true, false, 9, Some("h3"))]),
        false,
    )
    .await
    .unwrap();

    assert_eq!(summary.enqueued, 0);
    assert_eq!(summary.suppressed, 1);
    assert_eq!(pending_count(&store).await, 0);
}

#[tokio::test]
async fn update_with_changed_hash_enqueues_update() {
    let store = make_store().await;
    let mut tx = store.begin().await.unwrap();
    store.set_file_hash_tx(&mut tx, "/w/f", "h3", 1).await.unwrap();
    tx.commit().await.unwrap();

    translate_batch(
        &store,
        &batch(vec![file_event("f", true, false, 9, Some("h4"))]),
        false,
    )
    .await
    .unwrap();

    let job = store.get_job_by_key("/w/f", "w/f").await.unwrap().unwrap();
    assert_eq!(job.event_type, EventType::Update);
    assert_eq!(job.content_hash.as_deref(), Some("h4"));
}

#[tokio::test]
async fn update_without_stored_hash_enqueues_update() {
    let store = make_store().await;
    translate_batch(
        &store,
        &batch(vec![file_event("f", true, false, 9, Some("h1"))]),
        false,
    )
    .await
    .unwrap();
    assert_eq!(pending_count(&store).await, 1);
}

#[tokio::test]
async fn directory_updates_are_ignored() {
    let store = make_store().await;
    let summary = translate_batch(
        &store,
        &batch(vec![dir_event("docs", true, false, 4)]),
        false,
    )
    .await
    .unwrap();
    assert_eq!(summary.enqueued, 0);
    assert_eq!(pending_count(&store).await, 0);
}

#[tokio::test]
async fn directory_delete_purges_descendant_bookkeeping() {
    let store = make_store().await;
    insert_mapping(&store, "/w/docs/a.txt", "w/docs/a.txt", "uid-2", false).await;
    let mut tx = store.begin().await.unwrap();
    store.set_file_hash_tx(&mut tx, "/w/docs/a.txt", "h1", 1).await.unwrap();
    store.set_file_hash_tx(&mut tx, "/w/other.txt", "h2", 1).await.unwrap();
    tx.commit().await.unwrap();

    translate_batch(
        &store,
        &batch(vec![dir_event("docs", false, false, 0)]),
        false,
    )
    .await
    .unwrap();

    let job = store.get_job_by_key("/w/docs", "w/docs").await.unwrap().unwrap();
    assert_eq!(job.event_type, EventType::Delete);
    assert!(store.get_file_hash("/w/docs/a.txt").await.unwrap().is_none());
    assert!(
        store
            .get_node_mapping("/w/docs/a.txt", "w/docs/a.txt")
            .await
            .unwrap()
            .is_none()
    );
    assert!(store.get_file_hash("/w/other.txt").await.unwrap().is_some());
}

#[tokio::test]
async fn file_delete_purges_own_bookkeeping() {
    let store = make_store().await;
    insert_mapping(&store, "/w/a.txt", "w/a.txt", "uid-1", false).await;
    let mut tx = store.begin().await.unwrap();
    store.set_file_hash_tx(&mut tx, "/w/a.txt", "h1", 1).await.unwrap();
    tx.commit().await.unwrap();

    // The mapping lookup happens while pairing; a lone delete still purges.
    translate_batch(
        &store,
        &batch(vec![file_event("a.txt", false, false, 42, None)]),
        false,
    )
    .await
    .unwrap();

    let job = store.get_job_by_key("/w/a.txt", "w/a.txt").await.unwrap().unwrap();
    assert_eq!(job.event_type, EventType::Delete);
    assert!(store.get_file_hash("/w/a.txt").await.unwrap().is_none());
    assert!(store.get_node_mapping("/w/a.txt", "w/a.txt").await.unwrap().is_none());
}

#[tokio::test]
async fn reenqueue_for_same_key_replaces_the_pending_job() {
    let store = make_store().await;
    translate_batch(
        &store,
        &batch(vec![file_event("a.txt", true, true, 1, Some("h1"))]),
        false,
    )
    .await
    .unwrap();
    translate_batch(
        &store,
        &batch(vec![file_event("a.txt", true, false, 1, Some("h2"))]),
        false,
    )
    .await
    .unwrap();

    assert_eq!(pending_count(&store).await, 1);
    let job = store.get_job_by_key("/w/a.txt", "w/a.txt").await.unwrap().unwrap();
    assert_eq!(job.event_type, EventType::Update);
    assert_eq!(job.content_hash.as_deref(), Some("h2"));
    assert_eq!(job.n_retries, 0);
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let store = make_store().await;
    let mut tx = store.begin().await.unwrap();
    store.set_file_hash_tx(&mut tx, "/w/gone.txt", "h1", 1).await.unwrap();
    tx.commit().await.unwrap();

    let summary = translate_batch(
        &store,
        &batch(vec![
            file_event("new.txt", true, true, 3, Some("h2")),
            file_event("gone.txt", false, false, 5, None),
        ]),
        true,
    )
    .await
    .unwrap();

    assert_eq!(summary.enqueued, 2);
    assert_eq!(pending_count(&store).await, 0);
    // Bookkeeping untouched as well.
    assert!(store.get_file_hash("/w/gone.txt").await.unwrap().is_some());
}

#[tokio::test]
async fn remote_prefix_is_applied_to_remote_paths() {
    let store = make_store().await;
    let mut prefixed = batch(vec![file_event("a.txt", true, true, 1, Some("h1"))]);
    prefixed.remote_root = "backup".into();

    translate_batch(&store, &prefixed, false).await.unwrap();
    assert!(
        store
            .get_job_by_key("/w/a.txt", "backup/w/a.txt")
            .await
            .unwrap()
            .is_some()
    );
}
