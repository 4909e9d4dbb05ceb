use std::sync::Arc;

use anyhow::Context;
use cirrus_remote::RemoteClient;
use cirrus_remote::memory::MemoryRemote;
use tracing::warn;

use crate::config::{ConfigHandle, DaemonConfig};
use crate::sync::engine::SyncEngine;
use crate::sync::store::Store;
use crate::sync::{flags, signals};

pub struct DaemonRuntime {
    engine: SyncEngine,
    config_handle: ConfigHandle,
}

impl DaemonRuntime {
    pub async fn bootstrap(config: DaemonConfig) -> anyhow::Result<Self> {
        let store = match &config.db_path {
            Some(path) => Store::new_at(path).await,
            None => Store::new_default().await,
        }
        .context("failed to open the sync database")?;
        let remote = resolve_backend()?;
        let (config_handle, config_rx) = ConfigHandle::new(config);
        let engine = SyncEngine::new(Arc::new(store), remote, config_rx);
        Ok(Self {
            engine,
            config_handle,
        })
    }

    pub fn config_handle(&self) -> &ConfigHandle {
        &self.config_handle
    }

    /// Watch mode until a stop signal (or ctrl-c) arrives.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let registry = self.engine.flags();
        if registry.is_set(flags::RUNNING).await? {
            warn!("RUNNING flag was left set; assuming an unclean previous shutdown");
        }
        registry.set(flags::RUNNING).await?;

        // Ctrl-c goes through the durable signal queue, the same path CLI
        // producers use.
        let bus = self.engine.signals();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = bus.send(signals::STOP).await;
            }
        });

        let result = self.engine.watch().await;
        registry.clear(flags::RUNNING).await?;
        result.context("sync engine failed")
    }

    /// One-shot sync; returns the number of enqueued changes.
    pub async fn run_once(self, dry_run: bool) -> anyhow::Result<usize> {
        self.engine
            .run_once(dry_run)
            .await
            .context("one-shot sync failed")
    }
}

/// The in-tree backend is the in-memory one, useful for development and the
/// integration tests; production backends implement
/// [`cirrus_remote::RemoteClient`] out of tree.
fn resolve_backend() -> anyhow::Result<Arc<dyn RemoteClient>> {
    let backend = std::env::var("CIRRUS_BACKEND").unwrap_or_else(|_| "memory".to_string());
    match backend.as_str() {
        "memory" => {
            warn!("using the in-memory backend, remote state lives only for this process");
            Ok(Arc::new(MemoryRemote::new()))
        }
        other => anyhow::bail!("unknown CIRRUS_BACKEND: {other}"),
    }
}
