use std::sync::Arc;

use async_trait::async_trait;

use crate::KeyedStore;
use crate::error::Result;
use crate::keys::StoreKey;

/// Routes device-local keys (the session pointer) to a local backend and
/// everything else to the shared backend.
pub struct RoutedStore {
    local: Arc<dyn KeyedStore>,
    shared: Arc<dyn KeyedStore>,
}

impl RoutedStore {
    pub fn new(local: Arc<dyn KeyedStore>, shared: Arc<dyn KeyedStore>) -> Self {
        Self { local, shared }
    }

    fn is_local(key: &str) -> bool {
        key.parse::<StoreKey>()
            .map(|k| k.is_device_local())
            .unwrap_or(false)
    }

    fn route(&self, key: &str) -> &dyn KeyedStore {
        if Self::is_local(key) {
            self.local.as_ref()
        } else {
            self.shared.as_ref()
        }
    }
}

#[async_trait]
impl KeyedStore for RoutedStore {
    fn backend_tag(&self) -> &'static str {
        self.shared.backend_tag()
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.route(key).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.route(key).set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.route(key).delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = self.shared.list(prefix).await?;
        // Only device-local keys count from the local side; anything else there is stale.
        let local = self.local.list(prefix).await?;
        keys.extend(local.into_iter().filter(|k| Self::is_local(k)));
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// Only the device-local side is cleared; the shared store is never wiped from here.
    async fn clear(&self) -> Result<()> {
        self.local.clear().await
    }
}
