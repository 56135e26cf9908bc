use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use homescreen_types::models::new_id;

use crate::KeyedStore;
use crate::error::{Result, StoreError};
use crate::keys::CURRENT_USER_KEY;

/// The signed-in identity. Sign-in is mocked: any email/provider pair gets a fresh id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

impl SessionUser {
    pub fn new(email: &str, provider: &str) -> Self {
        Self {
            id: new_id("user"),
            email: email.to_string(),
            provider: provider.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Device session pointer kept under `current-user`.
pub struct Session {
    store: Arc<dyn KeyedStore>,
}

impl Session {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    pub async fn sign_in(&self, email: &str, provider: &str) -> Result<SessionUser> {
        let user = SessionUser::new(email, provider);
        let raw = serde_json::to_string(&user).map_err(|e| StoreError::Malformed {
            key: CURRENT_USER_KEY.to_string(),
            reason: e.to_string(),
        })?;
        self.store.set(CURRENT_USER_KEY, &raw).await?;
        info!("Signed in {} via {}", user.id, user.provider);
        Ok(user)
    }

    /// Restore the saved session at startup. An unreadable pointer counts as signed out.
    pub async fn restore(&self) -> Result<Option<SessionUser>> {
        let Some(raw) = self.store.get(CURRENT_USER_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!("Ignoring unreadable session pointer: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.store.delete(CURRENT_USER_KEY).await
    }
}
