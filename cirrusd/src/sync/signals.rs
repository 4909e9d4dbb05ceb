use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::store::{Store, StoreError};

/// Suspend job dispatch.
pub const PAUSE_SYNC: &str = "pause-sync";
/// Resume job dispatch.
pub const RESUME_SYNC: &str = "resume-sync";
/// Shut the daemon down.
pub const STOP: &str = "stop";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

type ListenerMap = HashMap<String, Vec<mpsc::UnboundedSender<()>>>;

/// Durable inter-process signal queue plus in-process broadcast.
///
/// CLI producers append rows with [`SignalBus::send`]; the daemon's poll loop
/// scans the queue and fires registered listeners. Rows whose name has no
/// listener stay queued until one appears, which doubles as the readiness
/// handshake between producers and the daemon.
pub struct SignalBus {
    store: Arc<Store>,
    listeners: Mutex<ListenerMap>,
    poll_interval: Duration,
}

impl SignalBus {
    pub fn new(store: Arc<Store>) -> Self {
        Self::with_poll_interval(store, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(store: Arc<Store>, poll_interval: Duration) -> Self {
        Self {
            store,
            listeners: Mutex::new(HashMap::new()),
            poll_interval,
        }
    }

    /// Append a signal to the durable queue.
    pub async fn send(&self, name: &str) -> Result<(), StoreError> {
        self.store.send_signal(name).await?;
        Ok(())
    }

    /// Whether an unconsumed signal with this name is queued.
    pub async fn is_queued(&self, name: &str) -> Result<bool, StoreError> {
        self.store.has_signal(name).await
    }

    /// Register an in-process listener for `name`.
    pub fn subscribe(&self, name: &str) -> mpsc::UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners
            .lock()
            .expect("signal listener mutex poisoned")
            .entry(name.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// One queue scan. Each matched row is deleted and committed before its
    /// listener is notified: a handler may terminate the process, and a
    /// consumed signal must not fire twice on the next startup.
    pub async fn dispatch_once(&self) -> Result<usize, StoreError> {
        let names: Vec<String> = {
            let listeners = self.listeners.lock().expect("signal listener mutex poisoned");
            listeners.keys().cloned().collect()
        };
        if names.is_empty() {
            return Ok(0);
        }

        let mut tx = self.store.begin().await?;
        let mut matched = Vec::new();
        for signal in self.store.list_signals_tx(&mut tx).await? {
            if names.iter().any(|name| name == &signal.name) {
                self.store.delete_signal_tx(&mut tx, signal.id).await?;
                matched.push(signal.name);
            }
        }
        tx.commit().await?;

        let mut delivered = 0;
        for name in matched {
            debug!(signal = %name, "dispatching signal");
            let mut listeners = self.listeners.lock().expect("signal listener mutex poisoned");
            if let Some(senders) = listeners.get_mut(&name) {
                senders.retain(|sender| sender.send(()).is_ok());
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    /// Poll loop; runs until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {
                    if let Err(err) = self.dispatch_once().await {
                        warn!(error = %err, "signal dispatch failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    async fn make_bus() -> SignalBus {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = Store::from_pool(pool);
        store.init().await.unwrap();
        SignalBus::new(Arc::new(store))
    }

    #[tokio::test]
    async fn listener_consumes_a_queued_signal() {
        let bus = make_bus().await;
        let mut rx = bus.subscribe(PAUSE_SYNC);

        bus.send(PAUSE_SYNC).await.unwrap();
        assert!(bus.is_queued(PAUSE_SYNC).await.unwrap());

        let delivered = bus.dispatch_once().await.unwrap();
        assert_eq!(delivered, 1);
        rx.try_recv().unwrap();

        // Consumed at most once.
        assert!(!bus.is_queued(PAUSE_SYNC).await.unwrap());
        assert_eq!(bus.dispatch_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn signals_without_listeners_accumulate() {
        let bus = make_bus().await;
        bus.send(STOP).await.unwrap();

        assert_eq!(bus.dispatch_once().await.unwrap(), 0);
        assert!(bus.is_queued(STOP).await.unwrap());

        // Once a listener appears the backlog drains.
        let mut rx = bus.subscribe(STOP);
        assert_eq!(bus.dispatch_once().await.unwrap(), 1);
        rx.try_recv().unwrap();
        assert!(!bus.is_queued(STOP).await.unwrap());
    }

    #[tokio::test]
    async fn row_is_deleted_even_if_the_listener_is_gone() {
        let bus = make_bus().await;
        let rx = bus.subscribe(RESUME_SYNC);
        drop(rx);

        bus.send(RESUME_SYNC).await.unwrap();
        bus.dispatch_once().await.unwrap();
        assert!(!bus.is_queued(RESUME_SYNC).await.unwrap());
    }

    #[tokio::test]
    async fn unrelated_signals_stay_queued() {
        let bus = make_bus().await;
        let _rx = bus.subscribe(PAUSE_SYNC);
        bus.send(STOP).await.unwrap();
        bus.send(PAUSE_SYNC).await.unwrap();

        bus.dispatch_once().await.unwrap();
        assert!(bus.is_queued(STOP).await.unwrap());
        assert!(!bus.is_queued(PAUSE_SYNC).await.unwrap());
    }
}
