//! Persistence backends for settings, session tokens, bookings and notifications.
//!
//! Two interchangeable backends implement [`Store`]:
//! - [`SqliteStore`]: an embedded relational file (WAL mode)
//! - [`DocumentStore`]: keyed document collections mirrored to a JSON file
//!
//! Every operation is atomic only at the level of a single row/document.
//! There are no multi-operation transactions; callers compose operations
//! and accept last-write-wins between concurrent writers.

pub mod document;
pub mod sqlite;

pub use document::DocumentStore;
pub use sqlite::SqliteStore;

use crate::booking::{Booking, BookingUpdate, Notification, NotificationUpdate};
use crate::config::{StoreBackend, StoreConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Setting key holding the admin credential (`salt:hexDigest`).
pub const ADMIN_PASSWORD_KEY: &str = "adminPassword";

/// Setting key holding the shop status JSON (`{"isOpen": bool}`).
pub const SHOP_STATUS_KEY: &str = "shopStatus";

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with the same key already exists.
    #[error("record already exists")]
    Duplicate,

    /// The backend failed (I/O, locking, SQL error).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored value could not be decoded.
    #[error("stored value is corrupt: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Duplicate
            }
            other => Self::Backend(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A persisted session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Storage operations shared by every backend.
pub trait Store: Send + Sync {
    /// Backend name for logs and health output.
    fn name(&self) -> &str;

    // ── Settings ────────────────────────────────────────────────────

    fn get_setting(&self, key: &str) -> StoreResult<Option<String>>;

    /// Create or replace a setting.
    fn put_setting(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Create a setting only if the key is absent. Returns `true` when written.
    fn insert_setting_if_absent(&self, key: &str, value: &str) -> StoreResult<bool>;

    // ── Session tokens ──────────────────────────────────────────────

    /// Persist a new token. Fails with [`StoreError::Duplicate`] on collision.
    fn insert_token(&self, record: &SessionRecord) -> StoreResult<()>;

    fn get_token(&self, token: &str) -> StoreResult<Option<SessionRecord>>;

    /// Remove one token. Returns whether it existed.
    fn delete_token(&self, token: &str) -> StoreResult<bool>;

    /// Remove every token. Returns the number removed.
    fn delete_all_tokens(&self) -> StoreResult<u64>;

    /// Remove tokens whose expiry is strictly before `now`.
    fn delete_expired_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    // ── Bookings ────────────────────────────────────────────────────

    /// All bookings, newest first.
    fn list_bookings(&self) -> StoreResult<Vec<Booking>>;

    /// Bookings placed with the given phone number, newest first.
    fn list_bookings_by_phone(&self, phone: &str) -> StoreResult<Vec<Booking>>;

    fn insert_booking(&self, booking: &Booking) -> StoreResult<()>;

    /// Apply `update` to the booking with `id` (and `phone`, when given).
    /// Returns the updated record, or `None` if nothing matched.
    fn update_booking(
        &self,
        id: &str,
        phone: Option<&str>,
        update: &BookingUpdate,
    ) -> StoreResult<Option<Booking>>;

    /// Delete the booking with `id` (and `phone`, when given).
    fn delete_booking(&self, id: &str, phone: Option<&str>) -> StoreResult<bool>;

    /// Delete bookings created strictly before `cutoff`.
    fn delete_bookings_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    // ── Notifications ───────────────────────────────────────────────

    /// Newest `limit` notifications, newest first.
    fn list_notifications(&self, limit: usize) -> StoreResult<Vec<Notification>>;

    /// Insert a notification, then prune so only the newest `keep` remain.
    fn insert_notification(&self, notification: &Notification, keep: usize) -> StoreResult<()>;

    fn update_notification(
        &self,
        id: &str,
        update: &NotificationUpdate,
    ) -> StoreResult<Option<Notification>>;

    fn delete_notification(&self, id: &str) -> StoreResult<bool>;

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Cheap liveness probe for the health endpoint.
    fn health_check(&self) -> bool;

    /// Flush and release backend resources before shutdown.
    fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Open the backend selected in config.
pub fn create_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn Store>> {
    let path = config.data_path();
    match config.backend {
        StoreBackend::Sqlite => {
            let store = SqliteStore::open(&path)?;
            tracing::info!(path = %path.display(), "SQLite store opened");
            Ok(Arc::new(store))
        }
        StoreBackend::Document => {
            let store = DocumentStore::open(&path)?;
            tracing::info!(path = %path.display(), "Document store opened");
            Ok(Arc::new(store))
        }
    }
}
