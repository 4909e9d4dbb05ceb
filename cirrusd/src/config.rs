use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

const DEFAULT_SYNC_DIR_NAME: &str = "Cirrus";
const DEFAULT_SYNC_CONCURRENCY: usize = 4;
const DEFAULT_POLL_MS: u64 = 100;
const DEFAULT_SIGNAL_POLL_MS: u64 = 1_000;
const DEFAULT_DEBOUNCE_MS: u64 = 200;
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 30_000;

/// One mirrored directory: a local root and the remote prefix it syncs under
/// (empty prefix means directly below the my-files root).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDir {
    pub local_root: PathBuf,
    #[serde(default)]
    pub remote_root: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub sync_dirs: Vec<SyncDir>,
    pub db_path: Option<PathBuf>,
    pub sync_concurrency: usize,
    pub poll_interval: Duration,
    pub signal_poll_interval: Duration,
    pub debounce_window: Duration,
    pub shutdown_timeout: Duration,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let sync_dirs = match std::env::var("CIRRUS_SYNC_DIRS") {
            Ok(raw) => parse_sync_dirs(&raw)?,
            Err(_) => vec![SyncDir {
                local_root: home.join(DEFAULT_SYNC_DIR_NAME),
                remote_root: String::new(),
            }],
        };
        let db_path = std::env::var("CIRRUS_DB_PATH").ok().map(PathBuf::from);

        Ok(Self {
            sync_dirs,
            db_path,
            sync_concurrency: read_usize_env("CIRRUS_SYNC_CONCURRENCY", DEFAULT_SYNC_CONCURRENCY)
                .max(1),
            poll_interval: Duration::from_millis(read_u64_env("CIRRUS_POLL_MS", DEFAULT_POLL_MS)),
            signal_poll_interval: Duration::from_millis(read_u64_env(
                "CIRRUS_SIGNAL_POLL_MS",
                DEFAULT_SIGNAL_POLL_MS,
            )),
            debounce_window: Duration::from_millis(read_u64_env(
                "CIRRUS_DEBOUNCE_MS",
                DEFAULT_DEBOUNCE_MS,
            )),
            shutdown_timeout: Duration::from_millis(read_u64_env(
                "CIRRUS_SHUTDOWN_TIMEOUT_MS",
                DEFAULT_SHUTDOWN_TIMEOUT_MS,
            )),
        })
    }

    pub fn local_roots(&self) -> Vec<String> {
        self.sync_dirs
            .iter()
            .map(|dir| dir.local_root.to_string_lossy().replace('\\', "/"))
            .collect()
    }
}

/// `CIRRUS_SYNC_DIRS` accepts either a JSON array of `{local_root,
/// remote_root}` objects or a colon-separated list of `path[=remote_prefix]`
/// entries.
fn parse_sync_dirs(raw: &str) -> anyhow::Result<Vec<SyncDir>> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        return serde_json::from_str(raw).context("invalid CIRRUS_SYNC_DIRS JSON");
    }
    let mut dirs = Vec::new();
    for entry in raw.split(':').filter(|entry| !entry.is_empty()) {
        let (local, remote) = match entry.split_once('=') {
            Some((local, remote)) => (local, remote),
            None => (entry, ""),
        };
        dirs.push(SyncDir {
            local_root: PathBuf::from(local),
            remote_root: remote.trim_matches('/').to_string(),
        });
    }
    if dirs.is_empty() {
        anyhow::bail!("CIRRUS_SYNC_DIRS is set but empty");
    }
    Ok(dirs)
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn read_usize_env(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// Publishes live configuration changes to the engine.
pub struct ConfigHandle {
    tx: watch::Sender<DaemonConfig>,
}

impl ConfigHandle {
    pub fn new(config: DaemonConfig) -> (Self, watch::Receiver<DaemonConfig>) {
        let (tx, rx) = watch::channel(config);
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<DaemonConfig> {
        self.tx.subscribe()
    }

    pub fn set_sync_concurrency(&self, sync_concurrency: usize) {
        self.tx
            .send_modify(|config| config.sync_concurrency = sync_concurrency.max(1));
    }

    pub fn set_sync_dirs(&self, sync_dirs: Vec<SyncDir>) {
        self.tx.send_modify(|config| config.sync_dirs = sync_dirs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_colon_separated_dirs() {
        let dirs = parse_sync_dirs("/home/u/Docs=backup:/home/u/Pics").unwrap();
        assert_eq!(dirs.len(), 2);
        assert_eq!(dirs[0].local_root, PathBuf::from("/home/u/Docs"));
        assert_eq!(dirs[0].remote_root, "backup");
        assert_eq!(dirs[1].local_root, PathBuf::from("/home/u/Pics"));
        assert_eq!(dirs[1].remote_root, "");
    }

    #[test]
    fn parses_json_dirs() {
        let dirs = parse_sync_dirs(
            r#"[{"local_root": "/home/u/Docs", "remote_root": "backup"}, {"local_root": "/home/u/Pics"}]"#,
        )
        .unwrap();
        assert_eq!(dirs.len(), 2);
        assert_eq!(dirs[1].remote_root, "");
    }

    #[test]
    fn rejects_empty_dir_list() {
        assert!(parse_sync_dirs("").is_err());
        assert!(parse_sync_dirs(":::").is_err());
    }

    #[test]
    fn config_handle_publishes_updates() {
        let config = DaemonConfig {
            sync_dirs: Vec::new(),
            db_path: None,
            sync_concurrency: 4,
            poll_interval: Duration::from_millis(100),
            signal_poll_interval: Duration::from_secs(1),
            debounce_window: Duration::from_millis(200),
            shutdown_timeout: Duration::from_secs(30),
        };
        let (handle, rx) = ConfigHandle::new(config);

        handle.set_sync_concurrency(9);
        assert_eq!(rx.borrow().sync_concurrency, 9);

        // Concurrency zero would stall the pool; it is clamped on the way in.
        handle.set_sync_concurrency(0);
        assert_eq!(rx.borrow().sync_concurrency, 1);
    }
}
