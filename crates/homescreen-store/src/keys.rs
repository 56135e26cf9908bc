//! Key schema shared by every backend.
//!
//! | Key | Meaning |
//! |---|---|
//! | `user:{userId}` | one user profile |
//! | `screen:{userId}:current` | pointer to the user's active post |
//! | `screen:{userId}:{screenId}` | permanent post record |
//! | `notification:{toUserId}:{notificationId}` | one notification |
//! | `action:{userId}:{actionId}` | one audit-log entry |
//! | `current-user` | device-local session pointer |

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, StoreError};

pub const CURRENT_USER_KEY: &str = "current-user";
const CURRENT_SEGMENT: &str = "current";

pub const USERS_COLLECTION: &str = "users";
pub const SCREENS_COLLECTION: &str = "screens";
pub const NOTIFICATIONS_COLLECTION: &str = "notifications";
pub const ACTIONS_COLLECTION: &str = "actions";
pub const SESSIONS_COLLECTION: &str = "sessions";

pub const ALL_COLLECTIONS: [&str; 5] = [
    USERS_COLLECTION,
    SCREENS_COLLECTION,
    NOTIFICATIONS_COLLECTION,
    ACTIONS_COLLECTION,
    SESSIONS_COLLECTION,
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    User { user_id: String },
    CurrentScreen { user_id: String },
    Screen { user_id: String, screen_id: String },
    Notification { to_user_id: String, notification_id: String },
    Action { user_id: String, action_id: String },
    CurrentUser,
}

impl StoreKey {
    pub fn user(user_id: &str) -> Result<Self> {
        Ok(Self::User {
            user_id: segment(user_id)?,
        })
    }

    pub fn current_screen(user_id: &str) -> Result<Self> {
        Ok(Self::CurrentScreen {
            user_id: segment(user_id)?,
        })
    }

    pub fn screen(user_id: &str, screen_id: &str) -> Result<Self> {
        if screen_id == CURRENT_SEGMENT {
            return Err(StoreError::InvalidKey(format!(
                "screen id '{}' is reserved",
                CURRENT_SEGMENT
            )));
        }
        Ok(Self::Screen {
            user_id: segment(user_id)?,
            screen_id: segment(screen_id)?,
        })
    }

    pub fn notification(to_user_id: &str, notification_id: &str) -> Result<Self> {
        Ok(Self::Notification {
            to_user_id: segment(to_user_id)?,
            notification_id: segment(notification_id)?,
        })
    }

    pub fn action(user_id: &str, action_id: &str) -> Result<Self> {
        Ok(Self::Action {
            user_id: segment(user_id)?,
            action_id: segment(action_id)?,
        })
    }

    /// Keys that hold per-device state and never leave the local backend.
    pub fn is_device_local(&self) -> bool {
        matches!(self, Self::CurrentUser)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User { user_id } => write!(f, "user:{}", user_id),
            Self::CurrentScreen { user_id } => write!(f, "screen:{}:{}", user_id, CURRENT_SEGMENT),
            Self::Screen { user_id, screen_id } => write!(f, "screen:{}:{}", user_id, screen_id),
            Self::Notification {
                to_user_id,
                notification_id,
            } => write!(f, "notification:{}:{}", to_user_id, notification_id),
            Self::Action { user_id, action_id } => write!(f, "action:{}:{}", user_id, action_id),
            Self::CurrentUser => f.write_str(CURRENT_USER_KEY),
        }
    }
}

impl FromStr for StoreKey {
    type Err = StoreError;

    fn from_str(key: &str) -> Result<Self> {
        if key == CURRENT_USER_KEY {
            return Ok(Self::CurrentUser);
        }
        let parts: Vec<&str> = key.split(':').collect();
        match parts.as_slice() {
            ["user", user_id] => Self::user(user_id),
            ["screen", user_id, CURRENT_SEGMENT] => Self::current_screen(user_id),
            ["screen", user_id, screen_id] => Self::screen(user_id, screen_id),
            ["notification", to, id] => Self::notification(to, id),
            ["action", user_id, id] => Self::action(user_id, id),
            _ => Err(StoreError::InvalidKey(key.to_string())),
        }
    }
}

fn segment(id: &str) -> Result<String> {
    if id.is_empty() || id.contains(':') {
        return Err(StoreError::InvalidKey(format!("bad id segment '{}'", id)));
    }
    Ok(id.to_string())
}

// -- Prefixes --

pub const USERS_PREFIX: &str = "user:";

pub fn screens_prefix(user_id: &str) -> Result<String> {
    Ok(format!("screen:{}:", segment(user_id)?))
}

pub fn notifications_prefix(user_id: &str) -> Result<String> {
    Ok(format!("notification:{}:", segment(user_id)?))
}

pub fn actions_prefix(user_id: &str) -> Result<String> {
    Ok(format!("action:{}:", segment(user_id)?))
}

/// True for `screen:{userId}:current`.
pub fn is_current_pointer(key: &str) -> bool {
    key.starts_with("screen:") && key.ends_with(":current")
}

/// The `{userId}` segment of a `user:{userId}` key.
pub fn user_id_from_key(key: &str) -> Option<&str> {
    key.strip_prefix(USERS_PREFIX).filter(|id| !id.is_empty() && !id.contains(':'))
}

// -- Document addressing --

/// Where a key lives in a collection/document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocAddress {
    pub collection: &'static str,
    pub doc_id: String,
}

fn collection_for(kind: &str) -> Option<&'static str> {
    match kind {
        "user" => Some(USERS_COLLECTION),
        "screen" => Some(SCREENS_COLLECTION),
        "notification" => Some(NOTIFICATIONS_COLLECTION),
        "action" => Some(ACTIONS_COLLECTION),
        _ => None,
    }
}

/// Map a key onto `(collection, documentId)`.
///
/// The leading segment picks the collection and the remaining segments are
/// joined with `_` (`screen:u1:abc` → `screens/u1_abc`). Unrecognised keys go
/// to the sessions collection under their full text. The mapping is not
/// injective when ids contain `_`; readers must compare the stored original
/// key.
pub fn doc_address(key: &str) -> Result<DocAddress> {
    let mut parts = key.split(':');
    let kind = parts.next().unwrap_or_default();
    let (collection, doc_id) = match collection_for(kind) {
        Some(collection) => (collection, parts.collect::<Vec<_>>().join("_")),
        None => (SESSIONS_COLLECTION, key.to_string()),
    };
    if doc_id.is_empty() || doc_id.contains('/') {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(DocAddress { collection, doc_id })
}

/// Collections that may contain keys starting with `prefix`.
pub fn collections_for_prefix(prefix: &str) -> Vec<&'static str> {
    match prefix.split_once(':') {
        Some((kind, _)) => vec![collection_for(kind).unwrap_or(SESSIONS_COLLECTION)],
        None => ALL_COLLECTIONS.to_vec(),
    }
}
