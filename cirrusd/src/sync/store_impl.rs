const JOB_COLUMNS: &str = "id, event_type, local_path, remote_path, status, retry_at, n_retries, \
     last_error, content_hash, old_local_path, old_remote_path, created_at";

impl Store {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(database_url).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn new_at(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn new_default() -> Result<Self, StoreError> {
        Self::new_at(&default_db_path()?).await
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        Ok(self.pool.begin().await?)
    }

    // --- jobs ---

    pub async fn enqueue_job_tx(
        &self,
        conn: &mut SqliteConnection,
        job: &NewJob,
        now: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sync_jobs (event_type, local_path, remote_path, status, retry_at, n_retries, last_error, content_hash, old_local_path, old_remote_path, created_at)
             VALUES (?1, ?2, ?3, 'PENDING', ?4, 0, NULL, ?5, ?6, ?7, ?8)
             ON CONFLICT(local_path, remote_path) DO UPDATE SET
                event_type = excluded.event_type,
                status = 'PENDING',
                retry_at = excluded.retry_at,
                n_retries = 0,
                last_error = NULL,
                content_hash = excluded.content_hash,
                old_local_path = excluded.old_local_path,
                old_remote_path = excluded.old_remote_path",
        )
        .bind(job.event_type.as_str())
        .bind(&job.local_path)
        .bind(&job.remote_path)
        .bind(now)
        .bind(&job.content_hash)
        .bind(&job.old_local_path)
        .bind(&job.old_remote_path)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn enqueue_job(&self, job: &NewJob, now: i64) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        self.enqueue_job_tx(&mut tx, job, now).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_job(&self, id: i64) -> Result<Option<SyncJob>, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM sync_jobs WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| Self::map_job(&row)).transpose()
    }

    pub async fn get_job_by_key(
        &self,
        local_path: &str,
        remote_path: &str,
    ) -> Result<Option<SyncJob>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM sync_jobs WHERE local_path = ?1 AND remote_path = ?2"
        ))
        .bind(local_path)
        .bind(remote_path)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| Self::map_job(&row)).transpose()
    }

    /// Fetch the due PENDING job with the smallest `retry_at` and mark it
    /// PROCESSING in the same transaction, so concurrent ticks cannot lease
    /// one job twice.
    pub async fn lease_next_pending(&self, now: i64) -> Result<Option<SyncJob>, StoreError> {
        let mut tx = self.begin().await?;
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM sync_jobs
             WHERE status = 'PENDING' AND retry_at <= ?1
             ORDER BY retry_at ASC, id ASC
             LIMIT 1"
        ))
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut job = Self::map_job(&row)?;
        sqlx::query("UPDATE sync_jobs SET status = 'PROCESSING' WHERE id = ?1")
            .bind(job.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        job.status = JobStatus::Processing;
        Ok(Some(job))
    }

    pub async fn mark_job_synced_tx(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE sync_jobs SET status = 'SYNCED', last_error = NULL WHERE id = ?1")
            .bind(id)
            .execute(conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingJob(id));
        }
        Ok(())
    }

    pub async fn mark_job_blocked_tx(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        error: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE sync_jobs SET status = 'BLOCKED', last_error = ?2 WHERE id = ?1")
            .bind(id)
            .bind(error)
            .execute(conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingJob(id));
        }
        Ok(())
    }

    pub async fn schedule_retry_tx(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        n_retries: u32,
        retry_at: i64,
        error: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE sync_jobs SET status = 'PENDING', retry_at = ?2, n_retries = ?3, last_error = ?4
             WHERE id = ?1",
        )
        .bind(id)
        .bind(retry_at)
        .bind(n_retries)
        .bind(error)
        .execute(conn)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingJob(id));
        }
        Ok(())
    }

    /// Crash recovery: anything left PROCESSING by a previous run goes back
    /// to PENDING and becomes due immediately.
    pub async fn reset_processing_jobs(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE sync_jobs SET status = 'PENDING', retry_at = ?1 WHERE status = 'PROCESSING'",
        )
        .bind(now_unix())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn has_pending_jobs(&self) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT 1 FROM sync_jobs WHERE status IN ('PENDING', 'PROCESSING') LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    pub async fn next_pending_retry_at(&self) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query("SELECT MIN(retry_at) AS retry_at FROM sync_jobs WHERE status = 'PENDING'")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("retry_at")?)
    }

    pub async fn count_jobs_with_status(&self, status: JobStatus) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM sync_jobs WHERE status = ?1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    pub async fn list_blocked_jobs(&self) -> Result<Vec<SyncJob>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM sync_jobs WHERE status = 'BLOCKED' ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::map_job).collect()
    }

    // --- file hashes ---

    pub async fn set_file_hash_tx(
        &self,
        conn: &mut SqliteConnection,
        local_path: &str,
        content_hash: &str,
        now: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO file_hashes (local_path, content_hash, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(local_path) DO UPDATE SET
                content_hash = excluded.content_hash,
                updated_at = excluded.updated_at",
        )
        .bind(local_path)
        .bind(content_hash)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn get_file_hash(&self, local_path: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT content_hash FROM file_hashes WHERE local_path = ?1")
            .bind(local_path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.try_get("content_hash")).transpose()?)
    }

    pub async fn get_file_hash_tx(
        &self,
        conn: &mut SqliteConnection,
        local_path: &str,
    ) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT content_hash FROM file_hashes WHERE local_path = ?1")
            .bind(local_path)
            .fetch_optional(conn)
            .await?;
        Ok(row.map(|row| row.try_get("content_hash")).transpose()?)
    }

    pub async fn delete_file_hash_tx(
        &self,
        conn: &mut SqliteConnection,
        local_path: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM file_hashes WHERE local_path = ?1")
            .bind(local_path)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Delete hash rows strictly below `local_dir`.
    pub async fn delete_file_hashes_under_tx(
        &self,
        conn: &mut SqliteConnection,
        local_dir: &str,
    ) -> Result<(), StoreError> {
        let pattern = format!("{}/%", local_dir.trim_end_matches('/'));
        sqlx::query("DELETE FROM file_hashes WHERE local_path LIKE ?1")
            .bind(pattern)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn rename_file_hash_tx(
        &self,
        conn: &mut SqliteConnection,
        old_local_path: &str,
        new_local_path: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM file_hashes WHERE local_path = ?1")
            .bind(new_local_path)
            .execute(&mut *conn)
            .await?;
        sqlx::query("UPDATE file_hashes SET local_path = ?2 WHERE local_path = ?1")
            .bind(old_local_path)
            .bind(new_local_path)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Rekey hash rows strictly below a renamed or moved directory.
    pub async fn rename_file_hashes_under_tx(
        &self,
        conn: &mut SqliteConnection,
        old_local_dir: &str,
        new_local_dir: &str,
    ) -> Result<(), StoreError> {
        let old_local = old_local_dir.trim_end_matches('/');
        let new_local = new_local_dir.trim_end_matches('/');
        let pattern = format!("{old_local}/%");
        sqlx::query(
            "UPDATE OR REPLACE file_hashes
             SET local_path = ?2 || substr(local_path, length(?1) + 1)
             WHERE local_path LIKE ?3",
        )
        .bind(old_local)
        .bind(new_local)
        .bind(pattern)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn list_file_hashes(&self) -> Result<Vec<(String, String)>, StoreError> {
        let rows = sqlx::query("SELECT local_path, content_hash FROM file_hashes ORDER BY local_path ASC")
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push((row.try_get("local_path")?, row.try_get("content_hash")?));
        }
        Ok(out)
    }

    // --- node mapping ---

    pub async fn set_node_mapping_tx(
        &self,
        conn: &mut SqliteConnection,
        mapping: &NodeMappingRow,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO node_mapping (local_path, remote_path, node_uid, parent_node_uid, is_directory, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(local_path, remote_path) DO UPDATE SET
                node_uid = excluded.node_uid,
                parent_node_uid = excluded.parent_node_uid,
                is_directory = excluded.is_directory,
                updated_at = excluded.updated_at",
        )
        .bind(&mapping.local_path)
        .bind(&mapping.remote_path)
        .bind(&mapping.node_uid)
        .bind(&mapping.parent_node_uid)
        .bind(if mapping.is_directory { 1 } else { 0 })
        .bind(mapping.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn get_node_mapping(
        &self,
        local_path: &str,
        remote_path: &str,
    ) -> Result<Option<NodeMappingRow>, StoreError> {
        let row = sqlx::query(
            "SELECT local_path, remote_path, node_uid, parent_node_uid, is_directory, updated_at
             FROM node_mapping WHERE local_path = ?1 AND remote_path = ?2",
        )
        .bind(local_path)
        .bind(remote_path)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| Self::map_mapping(&row)).transpose()
    }

    pub async fn get_node_mapping_tx(
        &self,
        conn: &mut SqliteConnection,
        local_path: &str,
        remote_path: &str,
    ) -> Result<Option<NodeMappingRow>, StoreError> {
        let row = sqlx::query(
            "SELECT local_path, remote_path, node_uid, parent_node_uid, is_directory, updated_at
             FROM node_mapping WHERE local_path = ?1 AND remote_path = ?2",
        )
        .bind(local_path)
        .bind(remote_path)
        .fetch_optional(conn)
        .await?;
        row.map(|row| Self::map_mapping(&row)).transpose()
    }

    pub async fn delete_node_mapping_tx(
        &self,
        conn: &mut SqliteConnection,
        local_path: &str,
        remote_path: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM node_mapping WHERE local_path = ?1 AND remote_path = ?2")
            .bind(local_path)
            .bind(remote_path)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Delete mapping rows strictly below the `(local_dir, remote_dir)` pair.
    pub async fn delete_node_mappings_under_tx(
        &self,
        conn: &mut SqliteConnection,
        local_dir: &str,
        remote_dir: &str,
    ) -> Result<(), StoreError> {
        let local_pattern = format!("{}/%", local_dir.trim_end_matches('/'));
        let remote_pattern = format!("{}/%", remote_dir.trim_end_matches('/'));
        sqlx::query("DELETE FROM node_mapping WHERE local_path LIKE ?1 AND remote_path LIKE ?2")
            .bind(local_pattern)
            .bind(remote_pattern)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn update_node_mapping_path_tx(
        &self,
        conn: &mut SqliteConnection,
        old_local_path: &str,
        old_remote_path: &str,
        new_local_path: &str,
        new_remote_path: &str,
        new_parent_node_uid: Option<&str>,
        now: i64,
    ) -> Result<(), StoreError> {
        match new_parent_node_uid {
            Some(parent) => {
                sqlx::query(
                    "UPDATE node_mapping
                     SET local_path = ?3, remote_path = ?4, parent_node_uid = ?5, updated_at = ?6
                     WHERE local_path = ?1 AND remote_path = ?2",
                )
                .bind(old_local_path)
                .bind(old_remote_path)
                .bind(new_local_path)
                .bind(new_remote_path)
                .bind(parent)
                .bind(now)
                .execute(conn)
                .await?;
            }
            None => {
                sqlx::query(
                    "UPDATE node_mapping
                     SET local_path = ?3, remote_path = ?4, updated_at = ?5
                     WHERE local_path = ?1 AND remote_path = ?2",
                )
                .bind(old_local_path)
                .bind(old_remote_path)
                .bind(new_local_path)
                .bind(new_remote_path)
                .bind(now)
                .execute(conn)
                .await?;
            }
        }
        Ok(())
    }

    /// Rekey mapping rows strictly below a renamed or moved directory: the
    /// old local/remote prefixes are swapped for the new ones, node identities
    /// and parents untouched (the subtree rode along with the relocate).
    pub async fn update_node_mappings_under_tx(
        &self,
        conn: &mut SqliteConnection,
        old_local_dir: &str,
        old_remote_dir: &str,
        new_local_dir: &str,
        new_remote_dir: &str,
        now: i64,
    ) -> Result<(), StoreError> {
        let old_local = old_local_dir.trim_end_matches('/');
        let old_remote = old_remote_dir.trim_end_matches('/');
        let new_local = new_local_dir.trim_end_matches('/');
        let new_remote = new_remote_dir.trim_end_matches('/');
        let local_pattern = format!("{old_local}/%");
        let remote_pattern = format!("{old_remote}/%");
        sqlx::query(
            "UPDATE OR REPLACE node_mapping
             SET local_path = ?3 || substr(local_path, length(?1) + 1),
                 remote_path = ?4 || substr(remote_path, length(?2) + 1),
                 updated_at = ?5
             WHERE local_path LIKE ?6 AND remote_path LIKE ?7",
        )
        .bind(old_local)
        .bind(old_remote)
        .bind(new_local)
        .bind(new_remote)
        .bind(now)
        .bind(local_pattern)
        .bind(remote_pattern)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn list_node_mappings(&self) -> Result<Vec<NodeMappingRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT local_path, remote_path, node_uid, parent_node_uid, is_directory, updated_at
             FROM node_mapping ORDER BY local_path ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::map_mapping).collect()
    }

    pub async fn list_node_mapping_paths(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT local_path FROM node_mapping ORDER BY local_path ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| row.try_get::<String, _>("local_path").map_err(StoreError::from))
            .collect()
    }

    // --- clocks ---

    pub async fn set_clock(&self, watch_root: &str, clock: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO clocks (watch_root, clock) VALUES (?1, ?2)
             ON CONFLICT(watch_root) DO UPDATE SET clock = excluded.clock",
        )
        .bind(watch_root)
        .bind(clock)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_clock(&self, watch_root: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT clock FROM clocks WHERE watch_root = ?1")
            .bind(watch_root)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.try_get("clock")).transpose()?)
    }

    pub async fn delete_clocks_not_in(&self, keep: &[String]) -> Result<u64, StoreError> {
        let rows = sqlx::query("SELECT watch_root FROM clocks")
            .fetch_all(&self.pool)
            .await?;
        let mut removed = 0;
        for row in rows {
            let watch_root: String = row.try_get("watch_root")?;
            if keep.iter().any(|root| root == &watch_root) {
                continue;
            }
            sqlx::query("DELETE FROM clocks WHERE watch_root = ?1")
                .bind(&watch_root)
                .execute(&self.pool)
                .await?;
            removed += 1;
        }
        Ok(removed)
    }

    // --- flags ---

    pub async fn set_flag(&self, name: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO flags (name) VALUES (?1)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn clear_flag(&self, name: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM flags WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn is_flag_set(&self, name: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM flags WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    // --- signals ---

    pub async fn send_signal(&self, name: &str) -> Result<i64, StoreError> {
        let result = sqlx::query("INSERT INTO signals (name, created_at) VALUES (?1, ?2)")
            .bind(name)
            .bind(now_unix())
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn has_signal(&self, name: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM signals WHERE name = ?1 LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn list_signals(&self) -> Result<Vec<SignalRow>, StoreError> {
        let rows = sqlx::query("SELECT id, name, created_at FROM signals ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(SignalRow {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(out)
    }

    pub async fn list_signals_tx(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<SignalRow>, StoreError> {
        let rows = sqlx::query("SELECT id, name, created_at FROM signals ORDER BY id ASC")
            .fetch_all(conn)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(SignalRow {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(out)
    }

    pub async fn delete_signal_tx(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM signals WHERE id = ?1")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    // --- startup cleanup ---

    /// Remove hash and mapping rows whose local path lies outside every
    /// configured root.
    pub async fn purge_paths_outside(&self, roots: &[String]) -> Result<u64, StoreError> {
        let mut removed = 0;
        let mut tx = self.begin().await?;

        let hash_rows = sqlx::query("SELECT local_path FROM file_hashes")
            .fetch_all(&mut *tx)
            .await?;
        for row in hash_rows {
            let path: String = row.try_get("local_path")?;
            if roots.iter().any(|root| is_under(&path, root)) {
                continue;
            }
            self.delete_file_hash_tx(&mut tx, &path).await?;
            removed += 1;
        }

        let mapping_rows = sqlx::query("SELECT local_path, remote_path FROM node_mapping")
            .fetch_all(&mut *tx)
            .await?;
        for row in mapping_rows {
            let path: String = row.try_get("local_path")?;
            let remote: String = row.try_get("remote_path")?;
            if roots.iter().any(|root| is_under(&path, root)) {
                continue;
            }
            self.delete_node_mapping_tx(&mut tx, &path, &remote).await?;
            removed += 1;
        }

        tx.commit().await?;
        Ok(removed)
    }

    fn map_job(row: &sqlx::sqlite::SqliteRow) -> Result<SyncJob, StoreError> {
        let event_type: String = row.try_get("event_type")?;
        let status: String = row.try_get("status")?;
        Ok(SyncJob {
            id: row.try_get("id")?,
            event_type: EventType::parse(&event_type)?,
            local_path: row.try_get("local_path")?,
            remote_path: row.try_get("remote_path")?,
            status: JobStatus::parse(&status)?,
            retry_at: row.try_get("retry_at")?,
            n_retries: row.try_get("n_retries")?,
            last_error: row.try_get("last_error")?,
            content_hash: row.try_get("content_hash")?,
            old_local_path: row.try_get("old_local_path")?,
            old_remote_path: row.try_get("old_remote_path")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn map_mapping(row: &sqlx::sqlite::SqliteRow) -> Result<NodeMappingRow, StoreError> {
        let is_directory: i64 = row.try_get("is_directory")?;
        Ok(NodeMappingRow {
            local_path: row.try_get("local_path")?,
            remote_path: row.try_get("remote_path")?,
            node_uid: row.try_get("node_uid")?,
            parent_node_uid: row.try_get("parent_node_uid")?,
            is_directory: is_directory != 0,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
