use std::sync::Arc;

use super::store::{Store, StoreError};

/// The daemon process is alive.
pub const RUNNING: &str = "RUNNING";
/// Job dispatch is suspended; the poll loop keeps heartbeating.
pub const PAUSED: &str = "PAUSED";
/// An OS service unit has been installed for the daemon.
pub const SERVICE_INSTALLED: &str = "SERVICE_INSTALLED";

/// Named persistent booleans. Presence of the row means true; flags survive
/// process restarts and are shared with CLI producers.
#[derive(Clone)]
pub struct FlagRegistry {
    store: Arc<Store>,
}

impl FlagRegistry {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn set(&self, name: &str) -> Result<(), StoreError> {
        self.store.set_flag(name).await
    }

    pub async fn clear(&self, name: &str) -> Result<(), StoreError> {
        self.store.clear_flag(name).await
    }

    pub async fn is_set(&self, name: &str) -> Result<bool, StoreError> {
        self.store.is_flag_set(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    async fn make_registry() -> FlagRegistry {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = Store::from_pool(pool);
        store.init().await.unwrap();
        FlagRegistry::new(Arc::new(store))
    }

    #[tokio::test]
    async fn set_clear_and_query() {
        let flags = make_registry().await;
        assert!(!flags.is_set(RUNNING).await.unwrap());

        flags.set(RUNNING).await.unwrap();
        flags.set(PAUSED).await.unwrap();
        assert!(flags.is_set(RUNNING).await.unwrap());
        assert!(flags.is_set(PAUSED).await.unwrap());

        flags.clear(PAUSED).await.unwrap();
        assert!(!flags.is_set(PAUSED).await.unwrap());
        assert!(flags.is_set(RUNNING).await.unwrap());
    }
}
