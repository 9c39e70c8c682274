//! Document store.
//!
//! Each record type lives in its own keyed collection, the way a document
//! database would hold it: settings by key, tokens by token string, bookings
//! and notifications by id. An opened store mirrors every collection into a
//! JSON file, so credentials and sessions survive a restart. Writes go to a
//! sibling temp file that is renamed over the original; a failed write leaves
//! both the file and the in-memory collections untouched.

use super::{SessionRecord, Store, StoreError, StoreResult};
use crate::booking::{Booking, BookingUpdate, Notification, NotificationUpdate};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct Collections {
    settings: HashMap<String, String>,
    tokens: HashMap<String, SessionRecord>,
    bookings: HashMap<String, Booking>,
    notifications: HashMap<String, Notification>,
}

#[derive(Default)]
pub struct DocumentStore {
    collections: Mutex<Collections>,
    /// Backing file. `None` keeps everything in process memory.
    path: Option<PathBuf>,
}

impl DocumentStore {
    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (or create on first write) the JSON document file at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("create {}: {e}", parent.display()))
            })?;
        }

        let collections = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| StoreError::Backend(format!("read {}: {e}", path.display())))?;
            serde_json::from_str(&contents)?
        } else {
            Collections::default()
        };

        Ok(Self {
            collections: Mutex::new(collections),
            path: Some(path.to_path_buf()),
        })
    }

    /// Run `change` against the collections and persist the result.
    /// Nothing is kept unless both the change and the file write succeed.
    fn write<R>(&self, change: impl FnOnce(&mut Collections) -> StoreResult<R>) -> StoreResult<R> {
        let mut guard = self.collections.lock();
        let Some(path) = &self.path else {
            return change(&mut *guard);
        };

        let mut next = guard.clone();
        let out = change(&mut next)?;
        save(path, &next)?;
        *guard = next;
        Ok(out)
    }
}

fn save(path: &Path, collections: &Collections) -> StoreResult<()> {
    let contents = serde_json::to_string_pretty(collections)
        .map_err(|e| StoreError::Backend(format!("encode {}: {e}", path.display())))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents)
        .map_err(|e| StoreError::Backend(format!("write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| StoreError::Backend(format!("replace {}: {e}", path.display())))
}

fn newest_first<T>(mut items: Vec<T>, created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    items
}

impl Store for DocumentStore {
    fn name(&self) -> &str {
        "document"
    }

    fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.collections.lock().settings.get(key).cloned())
    }

    fn put_setting(&self, key: &str, value: &str) -> StoreResult<()> {
        self.write(|c| {
            c.settings.insert(key.to_owned(), value.to_owned());
            Ok(())
        })
    }

    fn insert_setting_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        if self.collections.lock().settings.contains_key(key) {
            return Ok(false);
        }
        self.write(|c| {
            if c.settings.contains_key(key) {
                return Ok(false);
            }
            c.settings.insert(key.to_owned(), value.to_owned());
            Ok(true)
        })
    }

    fn insert_token(&self, record: &SessionRecord) -> StoreResult<()> {
        self.write(|c| {
            if c.tokens.contains_key(&record.token) {
                return Err(StoreError::Duplicate);
            }
            c.tokens.insert(record.token.clone(), record.clone());
            Ok(())
        })
    }

    fn get_token(&self, token: &str) -> StoreResult<Option<SessionRecord>> {
        Ok(self.collections.lock().tokens.get(token).cloned())
    }

    fn delete_token(&self, token: &str) -> StoreResult<bool> {
        if !self.collections.lock().tokens.contains_key(token) {
            return Ok(false);
        }
        self.write(|c| Ok(c.tokens.remove(token).is_some()))
    }

    fn delete_all_tokens(&self) -> StoreResult<u64> {
        self.write(|c| {
            let count = c.tokens.len() as u64;
            c.tokens.clear();
            Ok(count)
        })
    }

    fn delete_expired_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.write(|c| {
            let before = c.tokens.len();
            c.tokens.retain(|_, record| record.expires_at >= now);
            Ok((before - c.tokens.len()) as u64)
        })
    }

    fn list_bookings(&self) -> StoreResult<Vec<Booking>> {
        let bookings = self.collections.lock().bookings.values().cloned().collect();
        Ok(newest_first(bookings, |b| b.created_at))
    }

    fn list_bookings_by_phone(&self, phone: &str) -> StoreResult<Vec<Booking>> {
        let bookings = self
            .collections
            .lock()
            .bookings
            .values()
            .filter(|b| b.phone == phone)
            .cloned()
            .collect();
        Ok(newest_first(bookings, |b| b.created_at))
    }

    fn insert_booking(&self, booking: &Booking) -> StoreResult<()> {
        self.write(|c| {
            if c.bookings.contains_key(&booking.id) {
                return Err(StoreError::Duplicate);
            }
            c.bookings.insert(booking.id.clone(), booking.clone());
            Ok(())
        })
    }

    fn update_booking(
        &self,
        id: &str,
        phone: Option<&str>,
        update: &BookingUpdate,
    ) -> StoreResult<Option<Booking>> {
        self.write(|c| {
            let Some(booking) = c.bookings.get_mut(id) else {
                return Ok(None);
            };
            if phone.is_some_and(|p| p != booking.phone) {
                return Ok(None);
            }
            booking.apply(update);
            Ok(Some(booking.clone()))
        })
    }

    fn delete_booking(&self, id: &str, phone: Option<&str>) -> StoreResult<bool> {
        self.write(|c| {
            let matches = c
                .bookings
                .get(id)
                .is_some_and(|b| phone.is_none_or(|p| p == b.phone));
            if matches {
                c.bookings.remove(id);
            }
            Ok(matches)
        })
    }

    fn delete_bookings_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        self.write(|c| {
            let before = c.bookings.len();
            c.bookings.retain(|_, b| b.created_at >= cutoff);
            Ok((before - c.bookings.len()) as u64)
        })
    }

    fn list_notifications(&self, limit: usize) -> StoreResult<Vec<Notification>> {
        let notifications = self
            .collections
            .lock()
            .notifications
            .values()
            .cloned()
            .collect();
        let mut sorted = newest_first(notifications, |n| n.created_at);
        sorted.truncate(limit);
        Ok(sorted)
    }

    fn insert_notification(&self, notification: &Notification, keep: usize) -> StoreResult<()> {
        self.write(|c| {
            if c.notifications.contains_key(&notification.id) {
                return Err(StoreError::Duplicate);
            }
            c.notifications
                .insert(notification.id.clone(), notification.clone());

            if c.notifications.len() > keep {
                let all: Vec<Notification> = c.notifications.values().cloned().collect();
                let stale: Vec<String> = newest_first(all, |n| n.created_at)
                    .into_iter()
                    .skip(keep)
                    .map(|n| n.id)
                    .collect();
                for id in stale {
                    c.notifications.remove(&id);
                }
            }
            Ok(())
        })
    }

    fn update_notification(
        &self,
        id: &str,
        update: &NotificationUpdate,
    ) -> StoreResult<Option<Notification>> {
        self.write(|c| {
            Ok(c.notifications.get_mut(id).map(|n| {
                n.apply(update);
                n.clone()
            }))
        })
    }

    fn delete_notification(&self, id: &str) -> StoreResult<bool> {
        self.write(|c| Ok(c.notifications.remove(id).is_some()))
    }

    fn health_check(&self) -> bool {
        self.path
            .as_deref()
            .and_then(Path::parent)
            .is_none_or(|dir| dir.as_os_str().is_empty() || dir.is_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionService;
    use crate::booking::{BookingStatus, NewBooking, NewNotification};
    use chrono::Duration;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn booking(phone: &str, created_at: DateTime<Utc>) -> Booking {
        Booking::new(
            NewBooking {
                name: "Dick".into(),
                phone: phone.into(),
                location: "Circus".into(),
                custom_location: None,
                notes: None,
            },
            created_at,
        )
    }

    #[test]
    fn token_collision_is_rejected() {
        let store = DocumentStore::in_memory();
        let now = Utc::now();
        let record = SessionRecord {
            token: "ef".repeat(32),
            created_at: now,
            expires_at: now + Duration::days(7),
        };
        store.insert_token(&record).unwrap();
        assert!(matches!(store.insert_token(&record), Err(StoreError::Duplicate)));
        assert!(store.delete_token(&record.token).unwrap());
        assert!(!store.delete_token(&record.token).unwrap());
    }

    #[test]
    fn bookings_sorted_newest_first() {
        let store = DocumentStore::in_memory();
        let now = Utc::now();
        let a = booking("1111111111", now - Duration::hours(2));
        let b = booking("1111111111", now);
        let c = booking("2222222222", now - Duration::hours(1));
        for item in [&a, &b, &c] {
            store.insert_booking(item).unwrap();
        }

        let ids: Vec<_> = store.list_bookings().unwrap().into_iter().map(|x| x.id).collect();
        assert_eq!(ids, [b.id.clone(), c.id.clone(), a.id.clone()]);

        let mine: Vec<_> = store
            .list_bookings_by_phone("1111111111")
            .unwrap()
            .into_iter()
            .map(|x| x.id)
            .collect();
        assert_eq!(mine, [b.id, a.id]);
    }

    #[test]
    fn update_and_delete_booking_with_phone_guard() {
        let store = DocumentStore::in_memory();
        let b = booking("1111111111", Utc::now());
        store.insert_booking(&b).unwrap();

        let update = BookingUpdate {
            status: Some(BookingStatus::Cancelled),
            eta: None,
        };
        assert!(store.update_booking(&b.id, Some("nope"), &update).unwrap().is_none());
        let updated = store.update_booking(&b.id, None, &update).unwrap().unwrap();
        assert_eq!(updated.status, BookingStatus::Cancelled);

        assert!(!store.delete_booking(&b.id, Some("nope")).unwrap());
        assert!(store.delete_booking(&b.id, Some("1111111111")).unwrap());
        assert!(store.list_bookings().unwrap().is_empty());
    }

    #[test]
    fn notification_prune_keeps_newest() {
        let store = DocumentStore::in_memory();
        let start = Utc::now();
        for i in 0..4 {
            let n = Notification::new(
                NewNotification {
                    message: format!("n{i}"),
                    location: None,
                },
                start + Duration::seconds(i),
            );
            store.insert_notification(&n, 2).unwrap();
        }
        let messages: Vec<_> = store
            .list_notifications(10)
            .unwrap()
            .into_iter()
            .map(|n| n.message)
            .collect();
        assert_eq!(messages, ["n3", "n2"]);
    }

    #[test]
    fn changed_password_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("teacart.json");

        let token = {
            let store = Arc::new(DocumentStore::open(&path).unwrap());
            let sessions = SessionService::new(store);
            assert!(sessions.bootstrap("teatime").unwrap());
            assert!(sessions.update_admin_password("earl-grey-42"));
            sessions.login("earl-grey-42").unwrap()
        };

        let store = Arc::new(DocumentStore::open(&path).unwrap());
        let sessions = SessionService::new(store);
        assert!(!sessions.bootstrap("teatime").unwrap());
        assert!(!sessions.verify_admin_password("teatime"));
        assert!(sessions.verify_admin_password("earl-grey-42"));
        assert!(sessions.verify_token(&token));
    }

    #[test]
    fn bookings_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("teacart.json");
        let b = booking("1111111111", Utc::now());

        DocumentStore::open(&path).unwrap().insert_booking(&b).unwrap();

        let reopened = DocumentStore::open(&path).unwrap();
        assert_eq!(reopened.list_bookings().unwrap(), [b]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn failed_write_keeps_previous_state() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("teacart.json");
        let store = DocumentStore::open(&path).unwrap();
        store.put_setting("shopStatus", r#"{"isOpen":true}"#).unwrap();

        // A directory where the temp file should go makes the write fail.
        std::fs::create_dir(path.with_extension("json.tmp")).unwrap();
        assert!(store.put_setting("shopStatus", r#"{"isOpen":false}"#).is_err());
        assert_eq!(
            store.get_setting("shopStatus").unwrap().as_deref(),
            Some(r#"{"isOpen":true}"#)
        );
    }

    #[test]
    fn corrupt_file_is_reported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("teacart.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(DocumentStore::open(&path), Err(StoreError::Corrupt(_))));
    }
}
