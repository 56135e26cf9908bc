use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use homescreen_types::ValidationError;
use homescreen_types::models::{ActionLogEntry, Notification, Screen, User};

use crate::KeyedStore;
use crate::error::{Result, StoreError};
use crate::keys::StoreKey;

/// A JSON record type that may be stored under a key.
///
/// Decoding is checked at the store boundary: a value that does not parse or
/// does not pass `validate` is reported as [`StoreError::Malformed`].
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    fn validate(&self) -> std::result::Result<(), ValidationError>;
}

impl Record for User {
    // Age rules depend on the current date and are only enforced on write.
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingField("id"));
        }
        if self.display_name.trim().is_empty() {
            return Err(ValidationError::MissingField("displayName"));
        }
        Ok(())
    }
}

impl Record for Screen {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        Screen::validate(self)
    }
}

impl Record for Notification {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        Notification::validate(self)
    }
}

impl Record for ActionLogEntry {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        ActionLogEntry::validate(self)
    }
}

/// Value of `screen:{userId}:current`: names the owner's active screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredPointer")]
pub struct CurrentPointer {
    pub screen_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Older data stored a full copy of the screen under the current key.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredPointer {
    Pointer {
        #[serde(rename = "screenId")]
        screen_id: String,
        #[serde(default, rename = "updatedAt")]
        updated_at: Option<DateTime<Utc>>,
    },
    LegacyCopy {
        id: String,
    },
}

impl From<StoredPointer> for CurrentPointer {
    fn from(stored: StoredPointer) -> Self {
        match stored {
            StoredPointer::Pointer {
                screen_id,
                updated_at,
            } => Self {
                screen_id,
                updated_at,
            },
            StoredPointer::LegacyCopy { id } => Self {
                screen_id: id,
                updated_at: None,
            },
        }
    }
}

impl Record for CurrentPointer {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.screen_id.is_empty() {
            return Err(ValidationError::MissingField("screenId"));
        }
        Ok(())
    }
}

/// Parse and validate a stored value.
pub fn decode<T: Record>(key: &str, raw: &str) -> Result<T> {
    let record: T = serde_json::from_str(raw).map_err(|e| StoreError::Malformed {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    record.validate().map_err(|e| StoreError::Malformed {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    Ok(record)
}

/// Typed access to a KeyedStore.
#[derive(Clone)]
pub struct RecordStore {
    store: Arc<dyn KeyedStore>,
}

impl RecordStore {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    pub fn raw(&self) -> &Arc<dyn KeyedStore> {
        &self.store
    }

    pub async fn get_record<T: Record>(&self, key: &StoreKey) -> Result<Option<T>> {
        let key = key.to_string();
        match self.store.get(&key).await? {
            Some(raw) => decode(&key, &raw).map(Some),
            None => Ok(None),
        }
    }

    /// Validate and write a whole record.
    pub async fn put_record<T: Record>(&self, key: &StoreKey, record: &T) -> Result<()> {
        record.validate()?;
        let raw = serde_json::to_string(record).map_err(|e| StoreError::Malformed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.store.set(&key.to_string(), &raw).await
    }

    pub async fn delete(&self, key: &StoreKey) -> Result<()> {
        self.store.delete(&key.to_string()).await
    }

    /// Decode every record under `prefix` whose key passes `include`.
    ///
    /// Malformed entries are logged and skipped so one bad record does not
    /// hide the rest of the listing.
    pub async fn list_records<T, F>(&self, prefix: &str, include: F) -> Result<Vec<T>>
    where
        T: Record,
        F: Fn(&str) -> bool + Send + Sync,
    {
        let keys = self.store.list(prefix).await?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys.iter().filter(|k| include(k.as_str())) {
            let Some(raw) = self.store.get(key).await? else {
                // removed between list and get
                continue;
            };
            match decode::<T>(key, &raw) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping record: {}", e),
            }
        }
        Ok(records)
    }
}
