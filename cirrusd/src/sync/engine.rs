use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cirrus_remote::RemoteClient;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::executor::JobExecutor;
use super::flags::{self, FlagRegistry};
use super::signals::{self, SignalBus};
use super::store::{Store, StoreError};
use super::translator;
use super::watcher::{self, EventBatch, WatchHandle, WatchSpec};
use crate::config::{DaemonConfig, SyncDir};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("watcher error: {0}")]
    Watch(#[from] notify::Error),
}

/// Wires watcher, translator, queue and executor together and owns the
/// lifecycle: startup cleanup, pause/resume, config reload, shutdown.
pub struct SyncEngine {
    store: Arc<Store>,
    remote: Arc<dyn RemoteClient>,
    flags: FlagRegistry,
    signals: Arc<SignalBus>,
    config_rx: watch::Receiver<DaemonConfig>,
    concurrency: Arc<AtomicUsize>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<Store>,
        remote: Arc<dyn RemoteClient>,
        config_rx: watch::Receiver<DaemonConfig>,
    ) -> Self {
        let config = config_rx.borrow().clone();
        Self {
            flags: FlagRegistry::new(Arc::clone(&store)),
            signals: Arc::new(SignalBus::with_poll_interval(
                Arc::clone(&store),
                config.signal_poll_interval,
            )),
            concurrency: Arc::new(AtomicUsize::new(config.sync_concurrency.max(1))),
            store,
            remote,
            config_rx,
        }
    }

    pub fn flags(&self) -> FlagRegistry {
        self.flags.clone()
    }

    pub fn signals(&self) -> Arc<SignalBus> {
        Arc::clone(&self.signals)
    }

    /// Startup cleanup: recover interrupted jobs and drop bookkeeping for
    /// directories that are no longer configured.
    pub async fn cleanup(&self) -> Result<(), StoreError> {
        let reset = self.store.reset_processing_jobs().await?;
        if reset > 0 {
            info!(jobs = reset, "reset interrupted jobs to pending");
        }
        let roots = self.config_rx.borrow().local_roots();
        let stale_clocks = self.store.delete_clocks_not_in(&roots).await?;
        if stale_clocks > 0 {
            debug!(clocks = stale_clocks, "dropped clocks of unconfigured roots");
        }
        let purged = self.store.purge_paths_outside(&roots).await?;
        if purged > 0 {
            debug!(rows = purged, "purged bookkeeping outside sync roots");
        }
        Ok(())
    }

    /// One-shot sync: cleanup, replay all pending changes, drain the queue.
    pub async fn run_once(&self, dry_run: bool) -> Result<usize, EngineError> {
        self.cleanup().await?;
        let enqueued = self.replay_all(dry_run).await?;
        info!(enqueued, dry_run, "replayed pending changes");
        if dry_run {
            return Ok(enqueued);
        }
        let mut executor = self.make_executor();
        executor.drain().await?;
        Ok(enqueued)
    }

    /// Watch mode: run until a stop signal arrives.
    pub async fn watch(&mut self) -> Result<(), EngineError> {
        self.cleanup().await?;
        self.replay_all(false).await?;

        let mut pause_rx = self.signals.subscribe(signals::PAUSE_SYNC);
        let mut resume_rx = self.signals.subscribe(signals::RESUME_SYNC);
        let mut stop_rx = self.signals.subscribe(signals::STOP);
        let cancel = CancellationToken::new();
        let bus = Arc::clone(&self.signals);
        let bus_token = cancel.child_token();
        let bus_task = tokio::spawn(async move { bus.run(bus_token).await });

        let config = self.config_rx.borrow().clone();
        let mut current_dirs = config.sync_dirs.clone();
        let (mut watch_handle, mut batch_rx) = self.start_subscriptions(&current_dirs).await?;
        let mut executor = self.make_executor();
        let mut poll = tokio::time::interval(config.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut config_rx = self.config_rx.clone();
        let mut config_alive = true;

        info!(dirs = current_dirs.len(), "watch mode started");
        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.poll_tick(&mut executor).await?;
                }
                Some(batch) = batch_rx.recv() => {
                    self.ingest_batch(&batch).await;
                }
                Some(()) = pause_rx.recv() => {
                    self.flags.set(flags::PAUSED).await?;
                    info!("sync paused");
                }
                Some(()) = resume_rx.recv() => {
                    self.flags.clear(flags::PAUSED).await?;
                    info!("sync resumed");
                }
                Some(()) = stop_rx.recv() => {
                    info!("stop signal received");
                    break;
                }
                changed = config_rx.changed(), if config_alive => {
                    if changed.is_err() {
                        config_alive = false;
                        continue;
                    }
                    let config = config_rx.borrow_and_update().clone();
                    self.concurrency
                        .store(config.sync_concurrency.max(1), Ordering::Relaxed);
                    if config.sync_dirs != current_dirs {
                        info!("sync dirs changed, resubscribing");
                        current_dirs = config.sync_dirs.clone();
                        self.cleanup().await?;
                        watch_handle.shutdown();
                        let (handle, rx) = self.start_subscriptions(&current_dirs).await?;
                        watch_handle = handle;
                        batch_rx = rx;
                        self.replay_all(false).await?;
                    }
                }
            }
        }

        cancel.cancel();
        let _ = bus_task.await;
        watch_handle.shutdown();
        let shutdown_timeout = self.config_rx.borrow().shutdown_timeout;
        let abandoned = executor.shutdown(shutdown_timeout).await;
        if abandoned > 0 {
            warn!(abandoned, "shutdown timeout hit, jobs will be recovered on next start");
        }
        Ok(())
    }

    /// One executor poll tick. While PAUSED the tick heartbeats without
    /// dispatching.
    pub async fn poll_tick(&self, executor: &mut JobExecutor) -> Result<bool, StoreError> {
        if self.flags.is_set(flags::PAUSED).await? {
            debug!("paused, heartbeat only");
            return Ok(false);
        }
        Ok(executor.tick().await? > 0)
    }

    pub fn make_executor(&self) -> JobExecutor {
        JobExecutor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.remote),
            Arc::clone(&self.concurrency),
        )
    }

    async fn replay_all(&self, dry_run: bool) -> Result<usize, StoreError> {
        let dirs = self.config_rx.borrow().sync_dirs.clone();
        let batches = watcher::scan_all_changes(&self.store, &dirs).await?;
        let mut enqueued = 0;
        for batch in &batches {
            let summary = translator::translate_batch(&self.store, batch, dry_run).await?;
            enqueued += summary.enqueued;
            if !dry_run {
                let root = batch.watch_root.to_string_lossy().replace('\\', "/");
                self.store.set_clock(&root, &batch.clock).await?;
            }
        }
        Ok(enqueued)
    }

    async fn ingest_batch(&self, batch: &EventBatch) {
        let root = batch.watch_root.to_string_lossy().replace('\\', "/");
        match translator::translate_batch(&self.store, batch, false).await {
            Ok(summary) => {
                if summary.enqueued > 0 {
                    debug!(enqueued = summary.enqueued, root = %root, "batch translated");
                }
                if let Err(err) = self.store.set_clock(&root, &batch.clock).await {
                    error!(error = %err, "failed to persist watch clock");
                }
            }
            Err(err) => error!(error = %err, root = %root, "failed to translate batch"),
        }
    }

    async fn start_subscriptions(
        &self,
        dirs: &[SyncDir],
    ) -> Result<(WatchHandle, mpsc::UnboundedReceiver<EventBatch>), EngineError> {
        let mut specs = Vec::with_capacity(dirs.len());
        for dir in dirs {
            let root = dir.local_root.to_string_lossy().replace('\\', "/");
            let clock = self.store.get_clock(&root).await?.unwrap_or_default();
            specs.push(WatchSpec {
                dir: dir.clone(),
                last_clock: watcher::parse_clock(&clock),
            });
        }
        let debounce = self.config_rx.borrow().debounce_window;
        Ok(watcher::start_watch_subscriptions(specs, debounce)?)
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
