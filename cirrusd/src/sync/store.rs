use std::{fs, path::Path, path::PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction, migrate::Migrator};
use thiserror::Error;

use super::queue::{EventType, JobStatus, NewJob, QueueError, SyncJob};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XDG data directory is unavailable")]
    MissingDataDir,
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("job not found: {0}")]
    MissingJob(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMappingRow {
    pub local_path: String,
    pub remote_path: String,
    pub node_uid: String,
    pub parent_node_uid: Option<String>,
    pub is_directory: bool,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalRow {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
}

/// Transactional persistence for jobs, hashes, node mappings, clocks, flags
/// and signals. `*_tx` methods run against a caller-supplied connection so
/// multi-row changes commit atomically; the plain forms wrap themselves.
pub struct Store {
    pool: SqlitePool,
}

include!("store_impl.rs");

pub(crate) fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn default_db_path() -> Result<PathBuf, StoreError> {
    let mut path = dirs::data_dir().ok_or(StoreError::MissingDataDir)?;
    path.push("cirrus");
    path.push("sync.db");
    Ok(path)
}

fn is_under(path: &str, root: &str) -> bool {
    let root = root.trim_end_matches('/');
    path == root || path.starts_with(&format!("{root}/"))
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
