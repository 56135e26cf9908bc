use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ActionType, AgePublicSetting, Notification, Screen, User, Visibility};

// -- JWT Claims --

/// Session token claims. `sub` is the signed-in user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignInRequest {
    pub email: String,
    pub provider: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub user_id: String,
    pub token: String,
}

// -- Profiles --

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileSetup {
    pub display_name: String,
    #[serde(default)]
    pub bio: String,
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub age_public_setting: Option<AgePublicSetting>,
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: String,
    pub email: String,
    /// `None` until the profile has been completed.
    pub profile: Option<User>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: String,
    pub display_name: String,
    pub bio: String,
    pub age_display: Option<String>,
    pub profile_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PublicProfile {
    pub fn of(user: User, today: NaiveDate) -> Self {
        Self {
            age_display: user.age_display(today),
            id: user.id,
            display_name: user.display_name,
            bio: user.bio,
            profile_image: user.profile_image,
            created_at: user.created_at,
        }
    }
}

/// The public face of a post's author, attached to feed and saved items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSummary {
    pub id: String,
    pub display_name: String,
    pub age_display: Option<String>,
    pub profile_image: Option<String>,
}

// -- Screens --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadScreenRequest {
    pub images: Vec<String>,
}

/// A screen as returned to clients, with the derived current flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenView {
    #[serde(flatten)]
    pub screen: Screen,
    pub is_current: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthorSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub added: bool,
    pub screen: ScreenView,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddCommentRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VisibilityRequest {
    pub visibility: Visibility,
}

// -- Notifications --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    #[serde(flatten)]
    pub notification: Notification,
    pub from_display_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub unread: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkAllReadResponse {
    pub updated: usize,
}

// -- Action log --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LogActionRequest {
    pub action_type: ActionType,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
}

/// Filter for reading back a user's action log.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionQuery {
    pub action_type: Option<ActionType>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStats {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_day: BTreeMap<String, usize>,
    pub most_active_hour: Option<u32>,
    pub most_active_day: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActionStats {
    pub user_id: String,
    pub display_name: String,
    #[serde(flatten)]
    pub stats: ActionStats,
}

// -- Validation --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    #[serde(default)]
    pub image_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub is_home_screen: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub has_api_key: bool,
    pub backend: String,
}
