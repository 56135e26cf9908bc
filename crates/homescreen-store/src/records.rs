use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use homescreen_types::api::{AuthorSummary, ProfileSetup, ProfileUpdate, ScreenView};
use homescreen_types::models::{
    AgePublicSetting, Comment, Notification, NotificationType, Screen, User, Visibility,
};

use crate::error::{Result, StoreError};
use crate::keys::{
    USERS_PREFIX, is_current_pointer, notifications_prefix, screens_prefix, user_id_from_key,
};
use crate::locks::OwnerLocks;
use crate::typed::{CurrentPointer, RecordStore, decode};
use crate::{KeyedStore, StoreKey, get_or_none, list_or_empty};

const ANONYMOUS: &str = "Anonymous";
const UNKNOWN_SENDER: &str = "Someone";

/// Lifecycle operations over users, screens and notifications.
///
/// Every read-modify-write on one owner's records runs under that owner's
/// lock, so concurrent requests in this process cannot lose updates.
#[derive(Clone)]
pub struct Records {
    store: RecordStore,
    locks: Arc<OwnerLocks>,
}

impl Records {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self {
            store: RecordStore::new(store),
            locks: Arc::new(OwnerLocks::new()),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    // -- Users --

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        self.store.get_record(&StoreKey::user(user_id)?).await
    }

    /// Create (or re-create) the profile for a freshly signed-in user.
    pub async fn complete_profile(&self, user_id: &str, setup: ProfileSetup) -> Result<User> {
        let key = StoreKey::user(user_id)?;
        let _guard = self.locks.lock(user_id).await;

        let now = Utc::now();
        let existing: Option<User> = self.store.get_record(&key).await?;
        let user = User {
            id: user_id.to_string(),
            display_name: setup.display_name.trim().to_string(),
            bio: setup.bio,
            birth_date: setup.birth_date,
            age_public_setting: existing
                .as_ref()
                .map(|u| u.age_public_setting)
                .unwrap_or(AgePublicSetting::Age),
            profile_image: setup.profile_image,
            created_at: existing.as_ref().map(|u| u.created_at).unwrap_or(now),
            updated_at: now,
        };
        user.validate(now.date_naive())?;
        self.store.put_record(&key, &user).await?;

        info!("Profile completed for {}", user_id);
        Ok(user)
    }

    pub async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> Result<User> {
        let key = StoreKey::user(user_id)?;
        let _guard = self.locks.lock(user_id).await;

        let mut user: User = self
            .store
            .get_record(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        if let Some(name) = update.display_name {
            user.display_name = name.trim().to_string();
        }
        if let Some(bio) = update.bio {
            user.bio = bio;
        }
        if let Some(setting) = update.age_public_setting {
            user.age_public_setting = setting;
        }
        if let Some(image) = update.profile_image {
            user.profile_image = Some(image).filter(|i| !i.is_empty());
        }

        let now = Utc::now();
        user.updated_at = now;
        user.validate(now.date_naive())?;
        self.store.put_record(&key, &user).await?;
        Ok(user)
    }

    /// Public summary of a user; unknown or unreadable profiles show as anonymous.
    pub async fn author_summary(&self, user_id: &str, today: NaiveDate) -> AuthorSummary {
        match self.get_user(user_id).await {
            Ok(Some(user)) => AuthorSummary {
                id: user.id.clone(),
                age_display: user.age_display(today),
                display_name: user.display_name,
                profile_image: user.profile_image,
            },
            Ok(None) => anonymous(user_id),
            Err(e) => {
                warn!("Author {} unavailable: {}", user_id, e);
                anonymous(user_id)
            }
        }
    }

    // -- Screens --

    async fn pointer(&self, owner: &str) -> Result<Option<CurrentPointer>> {
        self.store.get_record(&StoreKey::current_screen(owner)?).await
    }

    async fn load_screen(&self, owner: &str, screen_id: &str) -> Result<Screen> {
        let key = StoreKey::screen(owner, screen_id)?;
        self.store
            .get_record(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    /// Like `load_screen`, but a private screen does not exist for anyone but its owner.
    async fn load_visible(&self, actor: &str, owner: &str, screen_id: &str) -> Result<Screen> {
        let screen = self.load_screen(owner, screen_id).await?;
        if actor != owner && screen.visibility == Visibility::Private {
            return Err(StoreError::NotFound(format!("screen:{}:{}", owner, screen_id)));
        }
        Ok(screen)
    }

    async fn view(&self, screen: Screen) -> Result<ScreenView> {
        let pointer = self.pointer(&screen.user_id).await?;
        Ok(view_of(screen, pointer.as_ref()))
    }

    /// The owner's current screen. A pointer naming a missing screen reads as none.
    pub async fn current_screen(&self, owner: &str) -> Result<Option<ScreenView>> {
        let Some(pointer) = self.pointer(owner).await? else {
            return Ok(None);
        };
        let key = StoreKey::screen(owner, &pointer.screen_id)?;
        match self.store.get_record::<Screen>(&key).await? {
            Some(screen) => Ok(Some(view_of(screen, Some(&pointer)))),
            None => {
                warn!("Current pointer for {} names missing {}", owner, key);
                Ok(None)
            }
        }
    }

    pub async fn get_screen(&self, owner: &str, screen_id: &str) -> Result<Option<ScreenView>> {
        let key = StoreKey::screen(owner, screen_id)?;
        match self.store.get_record::<Screen>(&key).await? {
            Some(screen) => self.view(screen).await.map(Some),
            None => Ok(None),
        }
    }

    /// Post a new screen and make it the owner's current one.
    ///
    /// The screen is written before the pointer swings to it, so a failure in
    /// between leaves the previous current screen in place.
    pub async fn upload_screen(&self, owner: &str, images: Vec<String>) -> Result<ScreenView> {
        let screen = Screen::new(owner, images, Utc::now())?;
        let key = StoreKey::screen(owner, &screen.id)?;
        let _guard = self.locks.lock(owner).await;

        self.store.put_record(&key, &screen).await?;
        let pointer = CurrentPointer {
            screen_id: screen.id.clone(),
            updated_at: Some(screen.created_at),
        };
        self.store
            .put_record(&StoreKey::current_screen(owner)?, &pointer)
            .await?;

        info!("{} posted {} ({} images)", owner, screen.id, screen.images.len());
        Ok(view_of(screen, Some(&pointer)))
    }

    /// Toggle the actor's like. Returns the updated screen and whether the like was added.
    pub async fn toggle_like(&self, actor: &str, owner: &str, screen_id: &str) -> Result<(ScreenView, bool)> {
        let (screen, added) = {
            let _guard = self.locks.lock(owner).await;
            let mut screen = self.load_visible(actor, owner, screen_id).await?;
            let added = screen.toggle_like(actor);
            self.store
                .put_record(&StoreKey::screen(owner, screen_id)?, &screen)
                .await?;
            (screen, added)
        };

        if added {
            self.notify(NotificationType::Like, actor, owner, screen_id, None)
                .await;
        }
        Ok((self.view(screen).await?, added))
    }

    pub async fn toggle_save(&self, actor: &str, owner: &str, screen_id: &str) -> Result<(ScreenView, bool)> {
        let _guard = self.locks.lock(owner).await;
        let mut screen = self.load_visible(actor, owner, screen_id).await?;
        let added = screen.toggle_save(actor);
        self.store
            .put_record(&StoreKey::screen(owner, screen_id)?, &screen)
            .await?;
        Ok((self.view(screen).await?, added))
    }

    pub async fn add_comment(&self, actor: &str, owner: &str, screen_id: &str, text: &str) -> Result<ScreenView> {
        let comment = Comment::new(actor, text, Utc::now())?;
        let comment_text = comment.text.clone();

        let screen = {
            let _guard = self.locks.lock(owner).await;
            let mut screen = self.load_visible(actor, owner, screen_id).await?;
            screen.comments.push(comment);
            self.store
                .put_record(&StoreKey::screen(owner, screen_id)?, &screen)
                .await?;
            screen
        };

        self.notify(NotificationType::Comment, actor, owner, screen_id, Some(comment_text))
            .await;
        self.view(screen).await
    }

    pub async fn set_visibility(
        &self,
        actor: &str,
        owner: &str,
        screen_id: &str,
        visibility: Visibility,
    ) -> Result<ScreenView> {
        require_owner(actor, owner)?;
        let _guard = self.locks.lock(owner).await;
        let mut screen = self.load_screen(owner, screen_id).await?;
        screen.visibility = visibility;
        self.store
            .put_record(&StoreKey::screen(owner, screen_id)?, &screen)
            .await?;
        self.view(screen).await
    }

    /// Remove a screen. Deleting the current screen clears the pointer; no
    /// older screen is promoted in its place.
    pub async fn delete_screen(&self, actor: &str, owner: &str, screen_id: &str) -> Result<()> {
        require_owner(actor, owner)?;
        let key = StoreKey::screen(owner, screen_id)?;
        let _guard = self.locks.lock(owner).await;

        if self.store.raw().get(&key.to_string()).await?.is_none() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        let pointer_key = StoreKey::current_screen(owner)?;
        let pointer: Option<CurrentPointer> = self.store.get_record(&pointer_key).await?;
        if pointer.is_some_and(|p| p.screen_id == screen_id) {
            self.store.delete(&pointer_key).await?;
        }
        self.store.delete(&key).await?;

        info!("{} deleted {}", owner, screen_id);
        Ok(())
    }

    /// Current public screens of every user, newest first.
    ///
    /// A listing fault degrades to an empty feed; one unreadable user does not
    /// hide the others.
    pub async fn feed(&self) -> Vec<ScreenView> {
        let today = Utc::now().date_naive();
        let user_keys = list_or_empty(self.store.raw().as_ref(), USERS_PREFIX).await;

        let mut items = Vec::new();
        for user_id in user_keys.iter().filter_map(|k| user_id_from_key(k)) {
            match self.current_screen(user_id).await {
                Ok(Some(mut view)) if view.screen.visibility == Visibility::Public => {
                    view.user = Some(self.author_summary(user_id, today).await);
                    items.push(view);
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping {} in feed: {}", user_id, e),
            }
        }
        sort_newest_first(&mut items);
        items
    }

    /// An owner's screens as seen by `viewer`: current first, then newest.
    /// Only the owner sees private screens.
    pub async fn profile_screens(&self, owner: &str, viewer: &str) -> Result<Vec<ScreenView>> {
        let screens: Vec<Screen> = self
            .store
            .list_records(&screens_prefix(owner)?, |k| !is_current_pointer(k))
            .await?;
        let pointer = self.pointer(owner).await?;

        let mut views: Vec<ScreenView> = screens
            .into_iter()
            .filter(|s| s.user_id == owner)
            .filter(|s| viewer == owner || s.visibility == Visibility::Public)
            .map(|s| view_of(s, pointer.as_ref()))
            .collect();
        views.sort_by(|a, b| {
            b.is_current
                .cmp(&a.is_current)
                .then(b.screen.created_at.cmp(&a.screen.created_at))
        });
        Ok(views)
    }

    /// Every screen the viewer has saved, across all users, newest first.
    pub async fn saved_screens(&self, viewer: &str) -> Result<Vec<ScreenView>> {
        let today = Utc::now().date_naive();
        let user_keys = self.store.raw().list(USERS_PREFIX).await?;

        let mut items = Vec::new();
        for owner in user_keys.iter().filter_map(|k| user_id_from_key(k)) {
            let screens: Vec<Screen> = self
                .store
                .list_records(&screens_prefix(owner)?, |k| !is_current_pointer(k))
                .await?;
            let saved: Vec<Screen> = screens.into_iter().filter(|s| s.is_saved_by(viewer)).collect();
            if saved.is_empty() {
                continue;
            }

            let pointer = self.pointer(owner).await?;
            let author = self.author_summary(owner, today).await;
            items.extend(saved.into_iter().map(|s| {
                let mut view = view_of(s, pointer.as_ref());
                view.user = Some(author.clone());
                view
            }));
        }
        sort_newest_first(&mut items);
        Ok(items)
    }

    // -- Notifications --

    /// Best effort: a failed write is logged and swallowed.
    async fn notify(
        &self,
        kind: NotificationType,
        actor: &str,
        owner: &str,
        screen_id: &str,
        comment_text: Option<String>,
    ) {
        let Some(notification) = Notification::new(kind, actor, owner, screen_id, comment_text, Utc::now())
        else {
            return;
        };
        let result = match StoreKey::notification(owner, &notification.id) {
            Ok(key) => self.store.put_record(&key, &notification).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Failed to notify {} of {:?} on {}: {}", owner, kind, screen_id, e);
        }
    }

    /// All of a user's notifications, newest first, with the sender's display name.
    pub async fn notifications(&self, user_id: &str) -> Result<Vec<(Notification, String)>> {
        let mut notifications: Vec<Notification> = self
            .store
            .list_records(&notifications_prefix(user_id)?, |_| true)
            .await?;
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut names: HashMap<String, String> = HashMap::new();
        let mut out = Vec::with_capacity(notifications.len());
        for n in notifications {
            if !names.contains_key(&n.from_user_id) {
                let name = match self.get_user(&n.from_user_id).await {
                    Ok(Some(user)) => user.display_name,
                    _ => UNKNOWN_SENDER.to_string(),
                };
                names.insert(n.from_user_id.clone(), name);
            }
            let name = names.get(&n.from_user_id).cloned().unwrap_or_default();
            out.push((n, name));
        }
        Ok(out)
    }

    /// Unread badge count. Backend faults and unreadable entries count as nothing.
    pub async fn unread_count(&self, user_id: &str) -> Result<usize> {
        let store = self.store.raw().as_ref();
        let mut unread = 0;
        for key in list_or_empty(store, &notifications_prefix(user_id)?).await {
            let Some(raw) = get_or_none(store, &key).await else {
                continue;
            };
            match decode::<Notification>(&key, &raw) {
                Ok(n) if !n.is_read => unread += 1,
                Ok(_) => {}
                Err(e) => warn!("Skipping record: {}", e),
            }
        }
        Ok(unread)
    }

    pub async fn mark_read(&self, user_id: &str, notification_id: &str) -> Result<Notification> {
        let key = StoreKey::notification(user_id, notification_id)?;
        let _guard = self.locks.lock(user_id).await;

        let mut notification: Notification = self
            .store
            .get_record(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if !notification.is_read {
            notification.is_read = true;
            self.store.put_record(&key, &notification).await?;
        }
        Ok(notification)
    }

    /// Mark every unread notification read. Returns how many changed.
    pub async fn mark_all_read(&self, user_id: &str) -> Result<usize> {
        let _guard = self.locks.lock(user_id).await;
        let notifications: Vec<Notification> = self
            .store
            .list_records(&notifications_prefix(user_id)?, |_| true)
            .await?;

        let mut updated = 0;
        for mut n in notifications.into_iter().filter(|n| !n.is_read) {
            n.is_read = true;
            self.store
                .put_record(&StoreKey::notification(user_id, &n.id)?, &n)
                .await?;
            updated += 1;
        }
        Ok(updated)
    }
}

fn view_of(screen: Screen, pointer: Option<&CurrentPointer>) -> ScreenView {
    let is_current = pointer.is_some_and(|p| p.screen_id == screen.id);
    ScreenView {
        screen,
        is_current,
        user: None,
    }
}

fn anonymous(user_id: &str) -> AuthorSummary {
    AuthorSummary {
        id: user_id.to_string(),
        display_name: ANONYMOUS.to_string(),
        age_display: None,
        profile_image: None,
    }
}

fn require_owner(actor: &str, owner: &str) -> Result<()> {
    if actor != owner {
        return Err(StoreError::Forbidden(format!(
            "{} cannot modify screens of {}",
            actor, owner
        )));
    }
    Ok(())
}

fn sort_newest_first(items: &mut [ScreenView]) {
    items.sort_by(|a, b| b.screen.created_at.cmp(&a.screen.created_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalStore;
    use homescreen_types::ValidationError;

    fn records() -> Records {
        Records::new(Arc::new(LocalStore::in_memory("test_").unwrap()))
    }

    fn images(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("data:image/jpeg;base64,AAA{}", i)).collect()
    }

    async fn with_profile(records: &Records, user_id: &str, name: &str) {
        let setup = ProfileSetup {
            display_name: name.into(),
            bio: String::new(),
            birth_date: NaiveDate::from_ymd_opt(1995, 3, 1).unwrap(),
            profile_image: None,
        };
        records.complete_profile(user_id, setup).await.unwrap();
    }

    async fn raw(records: &Records, key: &str) -> Option<String> {
        records.store().raw().get(key).await.unwrap()
    }

    #[tokio::test]
    async fn upload_writes_record_and_pointer() {
        let records = records();
        let view = records.upload_screen("a", images(3)).await.unwrap();

        assert!(view.is_current);
        assert!(view.screen.likes.is_empty() && view.screen.saves.is_empty());
        assert!(view.screen.comments.is_empty());
        assert_eq!(view.screen.visibility, Visibility::Public);

        let pointer = raw(&records, "screen:a:current").await.unwrap();
        assert!(pointer.contains(&view.screen.id));
        assert!(raw(&records, &format!("screen:a:{}", view.screen.id)).await.is_some());

        let current = records.current_screen("a").await.unwrap().unwrap();
        let by_id = records.get_screen("a", &view.screen.id).await.unwrap().unwrap();
        assert_eq!(current, by_id);
    }

    #[tokio::test]
    async fn like_adds_once_and_notifies_owner() {
        let records = records();
        let posted = records.upload_screen("a", images(1)).await.unwrap();

        let (view, added) = records.toggle_like("b", "a", &posted.screen.id).await.unwrap();
        assert!(added);
        assert_eq!(view.screen.likes, vec!["b".to_string()]);

        let notes = records.notifications("a").await.unwrap();
        assert_eq!(notes.len(), 1);
        let (n, from_name) = &notes[0];
        assert_eq!(n.kind, NotificationType::Like);
        assert_eq!(n.from_user_id, "b");
        assert_eq!(n.to_user_id, "a");
        assert!(!n.is_read);
        assert_eq!(from_name, UNKNOWN_SENDER);
        assert_eq!(records.unread_count("a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn second_upload_moves_current() {
        let records = records();
        let first = records.upload_screen("a", images(1)).await.unwrap();
        let second = records.upload_screen("a", images(2)).await.unwrap();

        let old = records.get_screen("a", &first.screen.id).await.unwrap().unwrap();
        assert!(!old.is_current);
        assert_eq!(old.screen, first.screen);
        let current = records.current_screen("a").await.unwrap().unwrap();
        assert_eq!(current.screen.id, second.screen.id);
    }

    #[tokio::test]
    async fn empty_notification_listing_is_ok() {
        let records = records();
        assert!(records.notifications("a").await.unwrap().is_empty());
        assert_eq!(records.unread_count("a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn like_twice_restores_state() {
        let records = records();
        let posted = records.upload_screen("a", images(1)).await.unwrap();
        let id = posted.screen.id.clone();

        records.toggle_like("c", "a", &id).await.unwrap();
        let (before, _) = records.toggle_like("b", "a", &id).await.unwrap();
        let (after, added) = records.toggle_like("b", "a", &id).await.unwrap();
        assert!(!added);
        assert_eq!(after.screen.likes, vec!["c".to_string()]);
        assert_eq!(before.screen.likes.len(), 2);
    }

    #[tokio::test]
    async fn self_actions_do_not_notify() {
        let records = records();
        let posted = records.upload_screen("a", images(1)).await.unwrap();
        records.toggle_like("a", "a", &posted.screen.id).await.unwrap();
        records
            .add_comment("a", "a", &posted.screen.id, "mine")
            .await
            .unwrap();
        assert!(records.notifications("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn comment_is_appended_and_notified() {
        let records = records();
        with_profile(&records, "b", "Bea").await;
        let posted = records.upload_screen("a", images(1)).await.unwrap();

        let view = records
            .add_comment("b", "a", &posted.screen.id, "  clean dock ")
            .await
            .unwrap();
        assert_eq!(view.screen.comments.len(), 1);
        assert_eq!(view.screen.comments[0].text, "clean dock");

        let notes = records.notifications("a").await.unwrap();
        assert_eq!(notes[0].0.kind, NotificationType::Comment);
        assert_eq!(notes[0].0.comment_text.as_deref(), Some("clean dock"));
        assert_eq!(notes[0].1, "Bea");

        let err = records
            .add_comment("b", "a", &posted.screen.id, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(ValidationError::CommentLength)));
    }

    #[tokio::test]
    async fn concurrent_likes_are_not_lost() {
        let records = records();
        let posted = records.upload_screen("a", images(1)).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let records = records.clone();
            let id = posted.screen.id.clone();
            tasks.push(tokio::spawn(async move {
                records.toggle_like(&format!("u{}", i), "a", &id).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let view = records.get_screen("a", &posted.screen.id).await.unwrap().unwrap();
        assert_eq!(view.screen.likes.len(), 16);
    }

    #[tokio::test]
    async fn only_owner_changes_visibility_or_deletes() {
        let records = records();
        let posted = records.upload_screen("a", images(1)).await.unwrap();
        let id = posted.screen.id.clone();

        assert!(matches!(
            records.set_visibility("b", "a", &id, Visibility::Private).await,
            Err(StoreError::Forbidden(_))
        ));
        assert!(matches!(
            records.delete_screen("b", "a", &id).await,
            Err(StoreError::Forbidden(_))
        ));

        let view = records
            .set_visibility("a", "a", &id, Visibility::Private)
            .await
            .unwrap();
        assert_eq!(view.screen.visibility, Visibility::Private);
        assert!(view.is_current);
    }

    #[tokio::test]
    async fn deleting_current_clears_pointer_without_promotion() {
        let records = records();
        let first = records.upload_screen("a", images(1)).await.unwrap();
        let second = records.upload_screen("a", images(1)).await.unwrap();

        records.delete_screen("a", "a", &second.screen.id).await.unwrap();
        assert_eq!(raw(&records, "screen:a:current").await, None);
        assert_eq!(records.current_screen("a").await.unwrap(), None);
        assert!(records.get_screen("a", &first.screen.id).await.unwrap().is_some());

        assert!(matches!(
            records.delete_screen("a", "a", &second.screen.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleting_old_screen_keeps_pointer() {
        let records = records();
        let first = records.upload_screen("a", images(1)).await.unwrap();
        let second = records.upload_screen("a", images(1)).await.unwrap();

        records.delete_screen("a", "a", &first.screen.id).await.unwrap();
        let current = records.current_screen("a").await.unwrap().unwrap();
        assert_eq!(current.screen.id, second.screen.id);
    }

    #[tokio::test]
    async fn legacy_current_copy_still_resolves() {
        let records = records();
        let posted = records.upload_screen("a", images(1)).await.unwrap();
        let mut legacy = serde_json::to_value(&posted.screen).unwrap();
        legacy["isCurrent"] = serde_json::Value::Bool(true);
        records
            .store()
            .raw()
            .set("screen:a:current", &legacy.to_string())
            .await
            .unwrap();

        let current = records.current_screen("a").await.unwrap().unwrap();
        assert_eq!(current.screen.id, posted.screen.id);
        assert!(current.is_current);
    }

    #[tokio::test]
    async fn feed_lists_public_current_screens() {
        let records = records();
        with_profile(&records, "a", "Aki").await;
        with_profile(&records, "b", "Ben").await;
        with_profile(&records, "c", "Cho").await;

        records.upload_screen("a", images(1)).await.unwrap();
        let hidden = records.upload_screen("b", images(1)).await.unwrap();
        records
            .set_visibility("b", "b", &hidden.screen.id, Visibility::Private)
            .await
            .unwrap();

        let feed = records.feed().await;
        assert_eq!(feed.len(), 1);
        let author = feed[0].user.as_ref().unwrap();
        assert_eq!(author.display_name, "Aki");
        assert_eq!(author.age_display.as_deref().map(|a| !a.is_empty()), Some(true));
    }

    #[tokio::test]
    async fn profile_orders_current_first_and_hides_private() {
        let records = records();
        let old = records.upload_screen("a", images(1)).await.unwrap();
        let current = records.upload_screen("a", images(1)).await.unwrap();
        records
            .set_visibility("a", "a", &old.screen.id, Visibility::Private)
            .await
            .unwrap();

        let own = records.profile_screens("a", "a").await.unwrap();
        assert_eq!(own.len(), 2);
        assert_eq!(own[0].screen.id, current.screen.id);
        assert!(own[0].is_current && !own[1].is_current);

        let other = records.profile_screens("a", "b").await.unwrap();
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].screen.id, current.screen.id);
    }

    #[tokio::test]
    async fn saved_screens_span_users() {
        let records = records();
        with_profile(&records, "a", "Aki").await;
        with_profile(&records, "b", "Ben").await;
        let sa = records.upload_screen("a", images(1)).await.unwrap();
        let sb = records.upload_screen("b", images(1)).await.unwrap();
        records.upload_screen("b", images(1)).await.unwrap();

        records.toggle_save("c", "a", &sa.screen.id).await.unwrap();
        let (_, added) = records.toggle_save("c", "b", &sb.screen.id).await.unwrap();
        assert!(added);

        let saved = records.saved_screens("c").await.unwrap();
        let ids: Vec<&str> = saved.iter().map(|v| v.screen.id.as_str()).collect();
        assert_eq!(ids, vec![sb.screen.id.as_str(), sa.screen.id.as_str()]);
        assert_eq!(saved[0].user.as_ref().unwrap().display_name, "Ben");
        assert!(records.notifications("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_read_flows() {
        let records = records();
        let posted = records.upload_screen("a", images(1)).await.unwrap();
        records.toggle_like("b", "a", &posted.screen.id).await.unwrap();
        records.toggle_like("c", "a", &posted.screen.id).await.unwrap();

        let first = records.notifications("a").await.unwrap()[0].0.id.clone();
        assert!(records.mark_read("a", &first).await.unwrap().is_read);
        // already read: no-op
        assert!(records.mark_read("a", &first).await.unwrap().is_read);
        assert_eq!(records.unread_count("a").await.unwrap(), 1);

        assert_eq!(records.mark_all_read("a").await.unwrap(), 1);
        assert_eq!(records.unread_count("a").await.unwrap(), 0);
        assert!(matches!(
            records.mark_read("a", "notif_missing").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn profile_lifecycle() {
        let records = records();
        assert!(matches!(
            records.update_profile("a", ProfileUpdate::default()).await,
            Err(StoreError::NotFound(_))
        ));

        with_profile(&records, "a", "  Aki ").await;
        let user = records.get_user("a").await.unwrap().unwrap();
        assert_eq!(user.display_name, "Aki");
        assert_eq!(user.age_public_setting, AgePublicSetting::Age);

        let update = ProfileUpdate {
            bio: Some("widgets only".into()),
            age_public_setting: Some(AgePublicSetting::Hide),
            ..Default::default()
        };
        let updated = records.update_profile("a", update).await.unwrap();
        assert_eq!(updated.bio, "widgets only");
        assert_eq!(updated.created_at, user.created_at);
        assert!(updated.updated_at >= user.updated_at);

        let blank = ProfileUpdate {
            display_name: Some("  ".into()),
            ..Default::default()
        };
        assert!(matches!(
            records.update_profile("a", blank).await,
            Err(StoreError::Invalid(_))
        ));

        let future = ProfileSetup {
            display_name: "Zed".into(),
            bio: String::new(),
            birth_date: Utc::now().date_naive() + chrono::Days::new(2),
            profile_image: None,
        };
        assert!(matches!(
            records.complete_profile("z", future).await,
            Err(StoreError::Invalid(ValidationError::BirthDateInFuture(_)))
        ));
    }

    #[tokio::test]
    async fn private_screens_reject_engagement_from_others() {
        let records = records();
        let screen = records.upload_screen("a", images(1)).await.unwrap().screen;
        records
            .set_visibility("a", "a", &screen.id, Visibility::Private)
            .await
            .unwrap();

        assert!(matches!(
            records.toggle_like("b", "a", &screen.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            records.toggle_save("b", "a", &screen.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            records.add_comment("b", "a", &screen.id, "hi").await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(records.unread_count("a").await.unwrap(), 0);

        // the owner still can
        let (view, added) = records.toggle_save("a", "a", &screen.id).await.unwrap();
        assert!(added);
        assert_eq!(view.screen.saves, vec!["a".to_string()]);
    }

    struct Down;

    #[async_trait::async_trait]
    impl KeyedStore for Down {
        fn backend_tag(&self) -> &'static str {
            "down"
        }
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(StoreError::Backend { backend: "down", message: "offline".into() })
        }
        async fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(StoreError::Backend { backend: "down", message: "offline".into() })
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            Err(StoreError::Backend { backend: "down", message: "offline".into() })
        }
        async fn list(&self, _prefix: &str) -> Result<Vec<String>> {
            Err(StoreError::Backend { backend: "down", message: "offline".into() })
        }
        async fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn backend_outage_empties_feed_but_fails_saved() {
        let records = Records::new(Arc::new(Down));

        assert!(records.feed().await.is_empty());
        assert_eq!(records.unread_count("a").await.unwrap(), 0);

        let err = records.saved_screens("a").await.unwrap_err();
        assert!(matches!(err, StoreError::Backend { .. }));
    }
}
