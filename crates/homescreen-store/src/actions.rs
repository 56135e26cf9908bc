use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use homescreen_types::api::{ActionQuery, ActionStats, UserActionStats};
use homescreen_types::models::{ActionLogEntry, ActionType, ClientInfo, User, new_id};

use crate::error::Result;
use crate::keys::{USERS_PREFIX, actions_prefix, user_id_from_key};
use crate::typed::RecordStore;
use crate::{KeyedStore, StoreKey};

pub const DEFAULT_QUERY_LIMIT: usize = 100;
/// Upper bound on entries read for stats and export.
const SCAN_LIMIT: usize = 10_000;
const CSV_HEADER: &str = "ID,User ID,Action,Timestamp,Metadata";
const ANONYMOUS: &str = "Anonymous";

/// Append-only audit log of user actions.
#[derive(Clone)]
pub struct ActionLog {
    store: RecordStore,
}

impl ActionLog {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self {
            store: RecordStore::new(store),
        }
    }

    /// Record an action. Failures are logged and never reach the caller.
    pub async fn log(
        &self,
        user_id: &str,
        action_type: ActionType,
        metadata: Value,
        client: ClientInfo,
    ) -> Option<ActionLogEntry> {
        let entry = ActionLogEntry {
            id: new_id("action"),
            user_id: user_id.to_string(),
            action_type,
            metadata: if metadata.is_null() {
                Value::Object(Default::default())
            } else {
                metadata
            },
            timestamp: Utc::now(),
            client,
        };

        let result = match StoreKey::action(user_id, &entry.id) {
            Ok(key) => self.store.put_record(&key, &entry).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                debug!("Action logged: {} {}", user_id, action_type);
                Some(entry)
            }
            Err(e) => {
                warn!("Failed to log {} for {}: {}", action_type, user_id, e);
                None
            }
        }
    }

    /// A user's actions matching `query`, newest first.
    pub async fn user_actions(&self, user_id: &str, query: &ActionQuery) -> Result<Vec<ActionLogEntry>> {
        let mut entries: Vec<ActionLogEntry> = self
            .store
            .list_records(&actions_prefix(user_id)?, |_| true)
            .await?;

        entries.retain(|e| {
            query.action_type.is_none_or(|t| e.action_type == t)
                && query.start.is_none_or(|s| e.timestamp >= s)
                && query.end.is_none_or(|end| e.timestamp <= end)
        });
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(query.limit.unwrap_or(DEFAULT_QUERY_LIMIT));
        Ok(entries)
    }

    async fn all_entries(&self, user_id: &str) -> Result<Vec<ActionLogEntry>> {
        let query = ActionQuery {
            limit: Some(SCAN_LIMIT),
            ..Default::default()
        };
        self.user_actions(user_id, &query).await
    }

    pub async fn stats(&self, user_id: &str) -> Result<ActionStats> {
        Ok(compute_stats(&self.all_entries(user_id).await?))
    }

    /// Stats for every user with a profile.
    pub async fn all_users_stats(&self) -> Result<Vec<UserActionStats>> {
        let keys = self.store.raw().list(USERS_PREFIX).await?;
        let mut out = Vec::with_capacity(keys.len());
        for user_id in keys.iter().filter_map(|k| user_id_from_key(k)) {
            let stats = self.stats(user_id).await?;
            let display_name = match self
                .store
                .get_record::<User>(&StoreKey::user(user_id)?)
                .await
            {
                Ok(Some(user)) => user.display_name,
                Ok(None) => ANONYMOUS.to_string(),
                Err(e) => {
                    warn!("Profile {} unreadable: {}", user_id, e);
                    ANONYMOUS.to_string()
                }
            };
            out.push(UserActionStats {
                user_id: user_id.to_string(),
                display_name,
                stats,
            });
        }
        Ok(out)
    }

    pub async fn export_csv(&self, user_id: &str) -> Result<String> {
        let entries = self.all_entries(user_id).await?;
        let mut lines = Vec::with_capacity(entries.len() + 1);
        lines.push(CSV_HEADER.to_string());
        for e in &entries {
            let cells = [
                e.id.clone(),
                e.user_id.clone(),
                e.action_type.to_string(),
                e.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                e.metadata.to_string(),
            ];
            lines.push(
                cells
                    .iter()
                    .map(|c| csv_cell(c))
                    .collect::<Vec<_>>()
                    .join(","),
            );
        }
        Ok(lines.join("\n"))
    }
}

fn csv_cell(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Aggregate counts by type, UTC day, hour and weekday.
///
/// Ties for most active hour or weekday resolve to the earliest one
/// (hour 0, Sunday first).
pub fn compute_stats(entries: &[ActionLogEntry]) -> ActionStats {
    let mut stats = ActionStats {
        total: entries.len(),
        ..Default::default()
    };
    let mut hours = [0usize; 24];
    let mut weekdays = [0usize; 7];

    for e in entries {
        *stats.by_type.entry(e.action_type.to_string()).or_default() += 1;
        *stats.by_day.entry(day_key(&e.timestamp)).or_default() += 1;
        hours[e.timestamp.hour() as usize] += 1;
        weekdays[e.timestamp.weekday().num_days_from_sunday() as usize] += 1;
    }

    stats.most_active_hour = busiest(&hours).map(|h| h as u32);
    stats.most_active_day = busiest(&weekdays).map(|d| weekday_name(d).to_string());
    stats
}

fn day_key(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

/// Index of the largest non-zero bucket, first one on ties.
fn busiest(buckets: &[usize]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (idx, &count) in buckets.iter().enumerate() {
        if count > 0 && best.is_none_or(|(_, c)| count > c) {
            best = Some((idx, count));
        }
    }
    best.map(|(idx, _)| idx)
}

fn weekday_name(days_from_sunday: usize) -> &'static str {
    const NAMES: [&str; 7] = [
        "Sunday",
        "Monday",
        "Tuesday",
        "Wednesday",
        "Thursday",
        "Friday",
        "Saturday",
    ];
    NAMES[days_from_sunday % 7]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalStore;
    use chrono::TimeZone;

    fn entry(action_type: ActionType, ts: DateTime<Utc>) -> ActionLogEntry {
        ActionLogEntry {
            id: new_id("action"),
            user_id: "u1".into(),
            action_type,
            metadata: serde_json::json!({}),
            timestamp: ts,
            client: ClientInfo::default(),
        }
    }

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        // 2024-07-07 is a Sunday
        Utc.with_ymd_and_hms(2024, 7, d, h, 0, 0).unwrap()
    }

    #[test]
    fn stats_aggregate_by_type_day_and_time() {
        let entries = vec![
            entry(ActionType::Login, at(8, 9)),
            entry(ActionType::LikeAdd, at(8, 21)),
            entry(ActionType::LikeAdd, at(9, 21)),
            entry(ActionType::PostCreate, at(7, 21)),
        ];
        let stats = compute_stats(&entries);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.by_type["like_add"], 2);
        assert_eq!(stats.by_type["login"], 1);
        assert_eq!(stats.by_day["2024-07-08"], 2);
        assert_eq!(stats.most_active_hour, Some(21));
        assert_eq!(stats.most_active_day.as_deref(), Some("Monday"));
    }

    #[test]
    fn ties_resolve_to_earliest() {
        let entries = vec![
            entry(ActionType::Login, at(9, 15)),
            entry(ActionType::Login, at(8, 3)),
        ];
        let stats = compute_stats(&entries);
        assert_eq!(stats.most_active_hour, Some(3));
        assert_eq!(stats.most_active_day.as_deref(), Some("Monday"));

        let empty = compute_stats(&[]);
        assert_eq!(empty.total, 0);
        assert_eq!(empty.most_active_hour, None);
        assert_eq!(empty.most_active_day, None);
    }

    #[test]
    fn csv_cells_are_quoted() {
        assert_eq!(csv_cell("plain"), "\"plain\"");
        assert_eq!(csv_cell(r#"{"a":1}"#), r#""{""a"":1}""#);
    }

    #[tokio::test]
    async fn log_and_query() {
        let log = ActionLog::new(Arc::new(LocalStore::in_memory("t_").unwrap()));
        let client = ClientInfo {
            user_agent: Some("test-agent".into()),
            ..Default::default()
        };

        let first = log
            .log("u1", ActionType::Login, Value::Null, client.clone())
            .await
            .unwrap();
        assert_eq!(first.metadata, serde_json::json!({}));
        log.log("u1", ActionType::LikeAdd, serde_json::json!({ "screenId": "s1" }), client.clone())
            .await
            .unwrap();
        log.log("u2", ActionType::Login, Value::Null, client).await.unwrap();

        let all = log.user_actions("u1", &ActionQuery::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].action_type, ActionType::LikeAdd);

        let likes = ActionQuery {
            action_type: Some(ActionType::LikeAdd),
            ..Default::default()
        };
        assert_eq!(log.user_actions("u1", &likes).await.unwrap().len(), 1);

        let limited = ActionQuery {
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(log.user_actions("u1", &limited).await.unwrap().len(), 1);

        let future = ActionQuery {
            start: Some(Utc::now() + chrono::Duration::hours(1)),
            ..Default::default()
        };
        assert!(log.user_actions("u1", &future).await.unwrap().is_empty());

        let csv = log.export_csv("u1").await.unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains(r#""{""screenId"":""s1""}""#));
    }

    #[tokio::test]
    async fn all_users_stats_cover_profiles() {
        let store: Arc<dyn KeyedStore> = Arc::new(LocalStore::in_memory("t_").unwrap());
        let user = serde_json::json!({
            "id": "u1", "displayName": "Aki", "birthDate": "1990-01-01",
            "createdAt": "2024-01-01T00:00:00Z", "updatedAt": "2024-01-01T00:00:00Z"
        });
        store.set("user:u1", &user.to_string()).await.unwrap();

        let log = ActionLog::new(store);
        log.log("u1", ActionType::Signup, Value::Null, ClientInfo::default())
            .await
            .unwrap();

        let all = log.all_users_stats().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].display_name, "Aki");
        assert_eq!(all[0].stats.total, 1);
        assert_eq!(all[0].stats.by_type["signup"], 1);
    }
}
