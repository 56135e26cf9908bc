pub mod actions;
pub mod document;
pub mod error;
pub mod keys;
pub mod local;
pub mod locks;
pub mod migrations;
pub mod records;
pub mod routed;
pub mod session;
pub mod typed;

use async_trait::async_trait;
use tracing::warn;

pub use actions::ActionLog;
pub use document::DocumentStore;
pub use error::{Result, StoreError};
pub use keys::StoreKey;
pub use local::{Database, LocalStore};
pub use records::Records;
pub use routed::RoutedStore;
pub use session::{Session, SessionUser};
pub use typed::RecordStore;

/// String key/value persistence used by every other layer.
///
/// A missing key is `Ok(None)` from `get` and `Ok(())` from `delete`; an
/// `Err` always means the backend itself failed. `list` returns the keys
/// starting with `prefix`, sorted.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Short name used in logs and the health endpoint.
    fn backend_tag(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove every key this store owns. Shared backends may ignore it.
    async fn clear(&self) -> Result<()>;
}

/// `list` for callers that degrade to "no data" when the backend is down.
pub async fn list_or_empty(store: &dyn KeyedStore, prefix: &str) -> Vec<String> {
    match store.list(prefix).await {
        Ok(keys) => keys,
        Err(e) => {
            warn!("Listing '{}' on {} failed: {}", prefix, store.backend_tag(), e);
            Vec::new()
        }
    }
}

/// `get` for callers that degrade to "no value" when the backend is down.
pub async fn get_or_none(store: &dyn KeyedStore, key: &str) -> Option<String> {
    match store.get(key).await {
        Ok(value) => value,
        Err(e) => {
            warn!("Reading '{}' on {} failed: {}", key, store.backend_tag(), e);
            None
        }
    }
}
