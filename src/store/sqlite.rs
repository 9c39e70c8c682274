//! SQLite-backed store.
//!
//! Tables:
//! - `settings`: key, value (admin credential, shop status)
//! - `auth_tokens`: token, createdAt, expiresAt
//! - `bookings`: customer bookings
//! - `notifications`: dashboard broadcast messages
//!
//! Timestamps are RFC 3339 strings with millisecond precision in UTC, so
//! lexical order matches chronological order.

use super::{SessionRecord, Store, StoreError, StoreResult};
use crate::booking::{Booking, BookingUpdate, Notification, NotificationUpdate};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const BOOKING_COLUMNS: &str =
    "id, name, phone, location, customLocation, notes, status, eta, createdAt";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path.
    pub fn open(db_path: &Path) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(db_path)?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database (for tests).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS auth_tokens (
                token TEXT PRIMARY KEY,
                createdAt TEXT NOT NULL,
                expiresAt TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_auth_tokens_expires ON auth_tokens(expiresAt);

            CREATE TABLE IF NOT EXISTS bookings (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                phone TEXT NOT NULL,
                location TEXT NOT NULL,
                customLocation TEXT,
                notes TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                eta TEXT NOT NULL DEFAULT '',
                createdAt TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_bookings_phone ON bookings(phone);
            CREATE INDEX IF NOT EXISTS idx_bookings_status ON bookings(status);
            CREATE INDEX IF NOT EXISTS idx_bookings_created ON bookings(createdAt DESC);

            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                message TEXT NOT NULL,
                location TEXT,
                createdAt TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_created ON notifications(createdAt DESC);",
        )?;
        Ok(())
    }

    fn get_booking(conn: &Connection, id: &str) -> StoreResult<Option<Booking>> {
        let raw = conn
            .query_row(
                &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
                params![id],
                RawBooking::from_row,
            )
            .optional()?;
        raw.map(RawBooking::into_booking).transpose()
    }

    fn query_bookings(
        conn: &Connection,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> StoreResult<Vec<Booking>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, RawBooking::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawBooking::into_booking).collect()
    }

    fn get_notification(conn: &Connection, id: &str) -> StoreResult<Option<Notification>> {
        let raw = conn
            .query_row(
                "SELECT id, message, location, createdAt FROM notifications WHERE id = ?1",
                params![id],
                RawNotification::from_row,
            )
            .optional()?;
        raw.map(RawNotification::into_notification).transpose()
    }
}

impl Store for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    // ── Settings ────────────────────────────────────────────────────

    fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put_setting(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn insert_setting_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(inserted > 0)
    }

    // ── Session tokens ──────────────────────────────────────────────

    fn insert_token(&self, record: &SessionRecord) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO auth_tokens (token, createdAt, expiresAt) VALUES (?1, ?2, ?3)",
            params![
                record.token,
                to_db_time(record.created_at),
                to_db_time(record.expires_at),
            ],
        )?;
        Ok(())
    }

    fn get_token(&self, token: &str) -> StoreResult<Option<SessionRecord>> {
        let conn = self.conn.lock();
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT token, createdAt, expiresAt FROM auth_tokens WHERE token = ?1",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        row.map(|(token, created_at, expires_at)| {
            Ok(SessionRecord {
                token,
                created_at: from_db_time(&created_at)?,
                expires_at: from_db_time(&expires_at)?,
            })
        })
        .transpose()
    }

    fn delete_token(&self, token: &str) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM auth_tokens WHERE token = ?1", params![token])?;
        Ok(deleted > 0)
    }

    fn delete_all_tokens(&self) -> StoreResult<u64> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM auth_tokens", [])?;
        Ok(deleted as u64)
    }

    fn delete_expired_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM auth_tokens WHERE expiresAt < ?1",
            params![to_db_time(now)],
        )?;
        Ok(deleted as u64)
    }

    // ── Bookings ────────────────────────────────────────────────────

    fn list_bookings(&self) -> StoreResult<Vec<Booking>> {
        let conn = self.conn.lock();
        Self::query_bookings(
            &conn,
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY createdAt DESC"),
            [],
        )
    }

    fn list_bookings_by_phone(&self, phone: &str) -> StoreResult<Vec<Booking>> {
        let conn = self.conn.lock();
        Self::query_bookings(
            &conn,
            &format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE phone = ?1 ORDER BY createdAt DESC"
            ),
            params![phone],
        )
    }

    fn insert_booking(&self, booking: &Booking) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO bookings ({BOOKING_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                booking.id,
                booking.name,
                booking.phone,
                booking.location,
                booking.custom_location,
                booking.notes,
                booking.status.as_str(),
                booking.eta,
                to_db_time(booking.created_at),
            ],
        )?;
        Ok(())
    }

    fn update_booking(
        &self,
        id: &str,
        phone: Option<&str>,
        update: &BookingUpdate,
    ) -> StoreResult<Option<Booking>> {
        let conn = self.conn.lock();
        let Some(mut booking) = Self::get_booking(&conn, id)? else {
            return Ok(None);
        };
        if phone.is_some_and(|p| p != booking.phone) {
            return Ok(None);
        }
        if update.is_empty() {
            return Ok(Some(booking));
        }

        booking.apply(update);
        conn.execute(
            "UPDATE bookings SET status = ?1, eta = ?2 WHERE id = ?3",
            params![booking.status.as_str(), booking.eta, id],
        )?;
        Ok(Some(booking))
    }

    fn delete_booking(&self, id: &str, phone: Option<&str>) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let deleted = match phone {
            Some(phone) => conn.execute(
                "DELETE FROM bookings WHERE id = ?1 AND phone = ?2",
                params![id, phone],
            )?,
            None => conn.execute("DELETE FROM bookings WHERE id = ?1", params![id])?,
        };
        Ok(deleted > 0)
    }

    fn delete_bookings_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM bookings WHERE createdAt < ?1",
            params![to_db_time(cutoff)],
        )?;
        Ok(deleted as u64)
    }

    // ── Notifications ───────────────────────────────────────────────

    fn list_notifications(&self, limit: usize) -> StoreResult<Vec<Notification>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, message, location, createdAt FROM notifications
             ORDER BY createdAt DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], RawNotification::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawNotification::into_notification).collect()
    }

    fn insert_notification(&self, notification: &Notification, keep: usize) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO notifications (id, message, location, createdAt) VALUES (?1, ?2, ?3, ?4)",
            params![
                notification.id,
                notification.message,
                notification.location,
                to_db_time(notification.created_at),
            ],
        )?;
        conn.execute(
            "DELETE FROM notifications WHERE id NOT IN (
                SELECT id FROM notifications ORDER BY createdAt DESC LIMIT ?1
            )",
            params![keep as i64],
        )?;
        Ok(())
    }

    fn update_notification(
        &self,
        id: &str,
        update: &NotificationUpdate,
    ) -> StoreResult<Option<Notification>> {
        let conn = self.conn.lock();
        let Some(mut notification) = Self::get_notification(&conn, id)? else {
            return Ok(None);
        };
        notification.apply(update);
        conn.execute(
            "UPDATE notifications SET message = ?1, location = ?2 WHERE id = ?3",
            params![notification.message, notification.location, id],
        )?;
        Ok(Some(notification))
    }

    fn delete_notification(&self, id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM notifications WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    fn health_check(&self) -> bool {
        let conn = self.conn.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok()
    }

    fn close(&self) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

// ── Row decoding ────────────────────────────────────────────────────

struct RawBooking {
    id: String,
    name: String,
    phone: String,
    location: String,
    custom_location: Option<String>,
    notes: Option<String>,
    status: String,
    eta: Option<String>,
    created_at: String,
}

impl RawBooking {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            phone: row.get(2)?,
            location: row.get(3)?,
            custom_location: row.get(4)?,
            notes: row.get(5)?,
            status: row.get(6)?,
            eta: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_booking(self) -> StoreResult<Booking> {
        Ok(Booking {
            status: self.status.parse().map_err(StoreError::Corrupt)?,
            created_at: from_db_time(&self.created_at)?,
            id: self.id,
            name: self.name,
            phone: self.phone,
            location: self.location,
            custom_location: self.custom_location,
            notes: self.notes,
            eta: self.eta.unwrap_or_default(),
        })
    }
}

struct RawNotification {
    id: String,
    message: String,
    location: Option<String>,
    created_at: String,
}

impl RawNotification {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            message: row.get(1)?,
            location: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn into_notification(self) -> StoreResult<Notification> {
        Ok(Notification {
            created_at: from_db_time(&self.created_at)?,
            id: self.id,
            message: self.message,
            location: self.location,
        })
    }
}

fn to_db_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn from_db_time(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::{BookingStatus, NewBooking, NewNotification};
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn test_store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(&tmp.path().join("teacart.db")).unwrap();
        (tmp, store)
    }

    fn booking(phone: &str, created_at: DateTime<Utc>) -> Booking {
        Booking::new(
            NewBooking {
                name: "Selina".into(),
                phone: phone.into(),
                location: "Rooftop".into(),
                custom_location: Some("north stairs".into()),
                notes: None,
            },
            created_at,
        )
    }

    fn notification(message: &str, created_at: DateTime<Utc>) -> Notification {
        Notification::new(
            NewNotification {
                message: message.into(),
                location: None,
            },
            created_at,
        )
    }

    #[test]
    fn settings_upsert_and_insert_if_absent() {
        let (_tmp, store) = test_store();

        assert_eq!(store.get_setting("k").unwrap(), None);
        assert!(store.insert_setting_if_absent("k", "one").unwrap());
        assert!(!store.insert_setting_if_absent("k", "two").unwrap());
        assert_eq!(store.get_setting("k").unwrap().as_deref(), Some("one"));

        store.put_setting("k", "three").unwrap();
        assert_eq!(store.get_setting("k").unwrap().as_deref(), Some("three"));
    }

    #[test]
    fn token_round_trip_keeps_millisecond_timestamps() {
        let (_tmp, store) = test_store();
        let created_at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let record = SessionRecord {
            token: "ab".repeat(32),
            created_at,
            expires_at: created_at + Duration::days(7),
        };

        store.insert_token(&record).unwrap();
        assert_eq!(store.get_token(&record.token).unwrap(), Some(record));
    }

    #[test]
    fn duplicate_token_is_rejected() {
        let (_tmp, store) = test_store();
        let now = Utc::now();
        let record = SessionRecord {
            token: "cd".repeat(32),
            created_at: now,
            expires_at: now + Duration::days(7),
        };

        store.insert_token(&record).unwrap();
        assert!(matches!(store.insert_token(&record), Err(StoreError::Duplicate)));
    }

    #[test]
    fn delete_expired_tokens_only_removes_past_expiry() {
        let (_tmp, store) = test_store();
        let now = Utc::now();
        for (token, offset) in [("old", -1), ("fresh", 1)] {
            store
                .insert_token(&SessionRecord {
                    token: token.into(),
                    created_at: now - Duration::days(7),
                    expires_at: now + Duration::hours(offset),
                })
                .unwrap();
        }

        assert_eq!(store.delete_expired_tokens(now).unwrap(), 1);
        assert!(store.get_token("old").unwrap().is_none());
        assert!(store.get_token("fresh").unwrap().is_some());
        assert_eq!(store.delete_all_tokens().unwrap(), 1);
    }

    #[test]
    fn bookings_list_newest_first_and_filter_by_phone() {
        let (_tmp, store) = test_store();
        let now = Utc::now();
        let older = booking("1111111111", now - Duration::minutes(5));
        let newer = booking("2222222222", now);
        store.insert_booking(&older).unwrap();
        store.insert_booking(&newer).unwrap();

        let all = store.list_bookings().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, newer.id);
        assert_eq!(all[1].id, older.id);
        assert_eq!(all[1].custom_location.as_deref(), Some("north stairs"));

        let mine = store.list_bookings_by_phone("1111111111").unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, older.id);
    }

    #[test]
    fn update_booking_respects_phone_filter() {
        let (_tmp, store) = test_store();
        let b = booking("1111111111", Utc::now());
        store.insert_booking(&b).unwrap();

        let update = BookingUpdate {
            status: Some(BookingStatus::Confirmed),
            eta: Some("15 min".into()),
        };
        assert!(store
            .update_booking(&b.id, Some("9999999999"), &update)
            .unwrap()
            .is_none());

        let updated = store
            .update_booking(&b.id, Some("1111111111"), &update)
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, BookingStatus::Confirmed);
        assert_eq!(updated.eta, "15 min");
        assert_eq!(store.list_bookings().unwrap()[0], updated);

        assert!(store.update_booking("missing", None, &update).unwrap().is_none());
    }

    #[test]
    fn delete_booking_and_delete_before_cutoff() {
        let (_tmp, store) = test_store();
        let now = Utc::now();
        let old = booking("1111111111", now - Duration::days(2));
        let current = booking("1111111111", now);
        store.insert_booking(&old).unwrap();
        store.insert_booking(&current).unwrap();

        assert!(!store.delete_booking(&current.id, Some("0000000000")).unwrap());
        assert_eq!(store.delete_bookings_before(now - Duration::days(1)).unwrap(), 1);
        assert!(store.delete_booking(&current.id, None).unwrap());
        assert!(!store.delete_booking(&current.id, None).unwrap());
        assert!(store.list_bookings().unwrap().is_empty());
    }

    #[test]
    fn notifications_are_pruned_to_keep_limit() {
        let (_tmp, store) = test_store();
        let start = Utc::now();
        for i in 0..5 {
            store
                .insert_notification(&notification(&format!("n{i}"), start + Duration::seconds(i)), 3)
                .unwrap();
        }

        let listed = store.list_notifications(10).unwrap();
        let messages: Vec<_> = listed.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, ["n4", "n3", "n2"]);
        assert_eq!(store.list_notifications(1).unwrap().len(), 1);
    }

    #[test]
    fn update_and_delete_notification() {
        let (_tmp, store) = test_store();
        let n = notification("Closing early", Utc::now());
        store.insert_notification(&n, 50).unwrap();

        let updated = store
            .update_notification(
                &n.id,
                &NotificationUpdate {
                    message: None,
                    location: Some("Gate 3".into()),
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.message, "Closing early");
        assert_eq!(updated.location.as_deref(), Some("Gate 3"));

        assert!(store.delete_notification(&n.id).unwrap());
        assert!(!store.delete_notification(&n.id).unwrap());
    }

    #[test]
    fn data_survives_reopen_after_close() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("teacart.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.put_setting("adminPassword", "salt:hash").unwrap();
            assert!(store.health_check());
            store.close().unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(
            reopened.get_setting("adminPassword").unwrap().as_deref(),
            Some("salt:hash")
        );
    }
}
