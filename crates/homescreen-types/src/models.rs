use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on screenshots attached to one post.
pub const MAX_IMAGES_PER_SCREEN: usize = 5;
/// Comment length limit, counted in characters after trimming.
pub const MAX_COMMENT_CHARS: usize = 200;
/// Profiles claiming this age or older are rejected.
pub const MAX_AGE_YEARS: i32 = 120;

/// Generate a record id of the form `{prefix}_{uuid}`.
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    MissingField(&'static str),
    #[error("birth date {0} is in the future")]
    BirthDateInFuture(NaiveDate),
    #[error("age must be below {MAX_AGE_YEARS}")]
    AgeOutOfRange,
    #[error("a screen needs between 1 and {MAX_IMAGES_PER_SCREEN} images, got {0}")]
    ImageCount(usize),
    #[error("image #{0} is empty")]
    EmptyImage(usize),
    #[error("comment must be between 1 and {MAX_COMMENT_CHARS} characters")]
    CommentLength,
    #[error("{0} contains duplicate user ids")]
    DuplicateMembers(&'static str),
}

// -- Users --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgePublicSetting {
    #[default]
    Age,
    Decade,
    Hide,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub bio: String,
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub age_public_setting: AgePublicSetting,
    /// Inline data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Completed years between `birth` and `today`.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

impl User {
    pub fn age_on(&self, today: NaiveDate) -> i32 {
        age_on(self.birth_date, today)
    }

    /// Age as shown to other users, honouring the owner's privacy setting.
    pub fn age_display(&self, today: NaiveDate) -> Option<String> {
        let age = self.age_on(today).max(0);
        match self.age_public_setting {
            AgePublicSetting::Hide => None,
            AgePublicSetting::Decade => Some(format!("{}s", age / 10 * 10)),
            AgePublicSetting::Age => Some(age.to_string()),
        }
    }

    pub fn validate(&self, today: NaiveDate) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingField("id"));
        }
        if self.display_name.trim().is_empty() {
            return Err(ValidationError::MissingField("displayName"));
        }
        if self.birth_date > today {
            return Err(ValidationError::BirthDateInFuture(self.birth_date));
        }
        if self.age_on(today) >= MAX_AGE_YEARS {
            return Err(ValidationError::AgeOutOfRange);
        }
        Ok(())
    }
}

// -- Screens --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// Build a comment from raw input, trimming and length-checking the text.
    pub fn new(user_id: &str, text: &str, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let text = text.trim();
        let len = text.chars().count();
        if len == 0 || len > MAX_COMMENT_CHARS {
            return Err(ValidationError::CommentLength);
        }
        Ok(Self {
            id: new_id("comment"),
            user_id: user_id.to_string(),
            text: text.to_string(),
            created_at: now,
        })
    }
}

/// A posted set of home-screen screenshots plus its engagement data.
///
/// Whether a screen is the owner's current one is not stored here; it is
/// derived from the owner's current pointer when the screen is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screen {
    pub id: String,
    pub user_id: String,
    pub images: Vec<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub saves: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
}

impl Screen {
    pub fn new(user_id: &str, images: Vec<String>, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        let screen = Self {
            id: new_id("screen"),
            user_id: user_id.to_string(),
            images,
            visibility: Visibility::Public,
            likes: Vec::new(),
            saves: Vec::new(),
            comments: Vec::new(),
            created_at: now,
        };
        screen.validate()?;
        Ok(screen)
    }

    /// Toggle `user_id` in the like set. Returns true when the like was added.
    pub fn toggle_like(&mut self, user_id: &str) -> bool {
        toggle_member(&mut self.likes, user_id)
    }

    /// Toggle `user_id` in the save set. Returns true when the save was added.
    pub fn toggle_save(&mut self, user_id: &str) -> bool {
        toggle_member(&mut self.saves, user_id)
    }

    pub fn is_saved_by(&self, user_id: &str) -> bool {
        self.saves.iter().any(|id| id == user_id)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingField("id"));
        }
        if self.user_id.is_empty() {
            return Err(ValidationError::MissingField("userId"));
        }
        validate_images(&self.images)?;
        if has_duplicates(&self.likes) {
            return Err(ValidationError::DuplicateMembers("likes"));
        }
        if has_duplicates(&self.saves) {
            return Err(ValidationError::DuplicateMembers("saves"));
        }
        Ok(())
    }
}

pub fn validate_images(images: &[String]) -> Result<(), ValidationError> {
    if images.is_empty() || images.len() > MAX_IMAGES_PER_SCREEN {
        return Err(ValidationError::ImageCount(images.len()));
    }
    if let Some(idx) = images.iter().position(|img| img.trim().is_empty()) {
        return Err(ValidationError::EmptyImage(idx));
    }
    Ok(())
}

fn toggle_member(set: &mut Vec<String>, user_id: &str) -> bool {
    if let Some(pos) = set.iter().position(|id| id == user_id) {
        set.remove(pos);
        false
    } else {
        set.push(user_id.to_string());
        true
    }
}

fn has_duplicates(ids: &[String]) -> bool {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    !ids.iter().all(|id| seen.insert(id.as_str()))
}

// -- Notifications --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Like,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub from_user_id: String,
    pub to_user_id: String,
    pub screen_id: String,
    #[serde(default)]
    pub comment_text: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Returns `None` when the actor would be notifying themselves.
    pub fn new(
        kind: NotificationType,
        from_user_id: &str,
        to_user_id: &str,
        screen_id: &str,
        comment_text: Option<String>,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        if from_user_id == to_user_id {
            return None;
        }
        Some(Self {
            id: new_id("notif"),
            kind,
            from_user_id: from_user_id.to_string(),
            to_user_id: to_user_id.to_string(),
            screen_id: screen_id.to_string(),
            comment_text,
            is_read: false,
            created_at: now,
        })
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingField("id"));
        }
        if self.to_user_id.is_empty() {
            return Err(ValidationError::MissingField("toUserId"));
        }
        if self.kind == NotificationType::Comment && self.comment_text.is_none() {
            return Err(ValidationError::MissingField("commentText"));
        }
        Ok(())
    }
}

// -- Action log --

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Login,
    Logout,
    Signup,
    PostCreate,
    PostView,
    PostDelete,
    LikeAdd,
    LikeRemove,
    SaveAdd,
    SaveRemove,
    CommentAdd,
    CommentView,
    ProfileView,
    ProfileEdit,
    ScreenChange,
    NotificationView,
    NotificationClick,
    Search,
    FilterApply,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Signup => "signup",
            Self::PostCreate => "post_create",
            Self::PostView => "post_view",
            Self::PostDelete => "post_delete",
            Self::LikeAdd => "like_add",
            Self::LikeRemove => "like_remove",
            Self::SaveAdd => "save_add",
            Self::SaveRemove => "save_remove",
            Self::CommentAdd => "comment_add",
            Self::CommentView => "comment_view",
            Self::ProfileView => "profile_view",
            Self::ProfileEdit => "profile_edit",
            Self::ScreenChange => "screen_change",
            Self::NotificationView => "notification_view",
            Self::NotificationClick => "notification_click",
            Self::Search => "search",
            Self::FilterApply => "filter_apply",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client environment captured alongside an action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_height: Option<u32>,
}

/// Append-only audit record of something a user did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLogEntry {
    pub id: String,
    pub user_id: String,
    pub action_type: ActionType,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub client: ClientInfo,
}

impl ActionLogEntry {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingField("id"));
        }
        if self.user_id.is_empty() {
            return Err(ValidationError::MissingField("userId"));
        }
        Ok(())
    }
}
