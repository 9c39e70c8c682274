//! Admin credential and bearer-session lifecycle.
//!
//! Token states: issued → (verified)* → expired | revoked | logged out.
//! Every terminal state deletes the record; there are no tombstones.
//! Expiry is enforced lazily, only when a token is presented.
//!
//! Changing the admin password revokes every outstanding token, including the
//! one used to authorize the change. Callers that want continued access issue
//! a fresh token afterwards (see [`SessionService::change_password`]).
//!
//! Password change followed by mass revocation is not atomic with respect to
//! concurrent verifies; a racing verify may observe either side.

use super::error::{AuthError, AuthResult};
use super::password::{hash_password, verify_password};
use super::{Clock, SystemClock};
use crate::store::{SessionRecord, Store, StoreError, ADMIN_PASSWORD_KEY};
use chrono::Duration;
use rand::RngCore;
use std::sync::Arc;

/// Session lifetime, fixed at issuance: 7 days (seconds).
pub const SESSION_TTL_SECS: i64 = 7 * 24 * 3600;

/// Token byte length before hex encoding (32 bytes = 64 hex chars).
const TOKEN_BYTES: usize = 32;

/// Issues, verifies and revokes admin sessions.
pub struct SessionService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl SessionService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    // ── Credential ──────────────────────────────────────────────────

    /// Store the default admin credential if none exists yet.
    /// Returns `true` when a credential was created.
    pub fn bootstrap(&self, default_password: &str) -> AuthResult<bool> {
        if self.store.get_setting(ADMIN_PASSWORD_KEY)?.is_some() {
            return Ok(false);
        }
        let created = self
            .store
            .insert_setting_if_absent(ADMIN_PASSWORD_KEY, &hash_password(default_password))?;
        if created {
            tracing::info!("Default admin credential initialized");
        }
        Ok(created)
    }

    /// Check a plaintext against the stored admin credential.
    pub fn authenticate_admin(&self, plaintext: &str) -> AuthResult<()> {
        let Some(stored) = self.store.get_setting(ADMIN_PASSWORD_KEY)? else {
            // Perform dummy hash to prevent timing side-channel
            let _ = verify_password(plaintext, "00000000000000000000000000000000:00");
            return Err(AuthError::NotFound);
        };
        if verify_password(plaintext, &stored) {
            Ok(())
        } else {
            Err(AuthError::InvalidCredential)
        }
    }

    pub fn verify_admin_password(&self, plaintext: &str) -> bool {
        match self.authenticate_admin(plaintext) {
            Ok(()) => true,
            Err(e) => {
                log_store_failure("verify admin password", &e);
                false
            }
        }
    }

    /// Replace the admin credential, then revoke every session.
    /// Returns the number of sessions revoked.
    pub fn set_admin_password(&self, new_plaintext: &str) -> AuthResult<u64> {
        self.store
            .put_setting(ADMIN_PASSWORD_KEY, &hash_password(new_plaintext))?;
        let revoked = self.store.delete_all_tokens()?;
        tracing::info!(revoked, "Admin password changed; all sessions revoked");
        Ok(revoked)
    }

    pub fn update_admin_password(&self, new_plaintext: &str) -> bool {
        match self.set_admin_password(new_plaintext) {
            Ok(_) => true,
            Err(e) => {
                log_store_failure("update admin password", &e);
                false
            }
        }
    }

    // ── Tokens ──────────────────────────────────────────────────────

    /// Issue and persist a new session token.
    pub fn create_token(&self) -> AuthResult<String> {
        let now = self.clock.now();
        let record = SessionRecord {
            token: generate_token(),
            created_at: now,
            expires_at: now + Duration::seconds(SESSION_TTL_SECS),
        };
        match self.store.insert_token(&record) {
            Ok(()) => Ok(record.token),
            Err(StoreError::Duplicate) => {
                tracing::error!("Session token collision; refusing to issue");
                Err(AuthError::StoreUnavailable(StoreError::Duplicate))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a live token. Expired tokens are deleted on sight.
    pub fn authenticate_token(&self, token: &str) -> AuthResult<SessionRecord> {
        let record = self.store.get_token(token)?.ok_or(AuthError::NotFound)?;
        if self.clock.now() > record.expires_at {
            if let Err(e) = self.store.delete_token(token) {
                tracing::warn!("Failed to delete expired session: {e}");
            }
            return Err(AuthError::Expired);
        }
        Ok(record)
    }

    pub fn verify_token(&self, token: &str) -> bool {
        match self.authenticate_token(token) {
            Ok(_) => true,
            Err(e) => {
                log_store_failure("verify token", &e);
                false
            }
        }
    }

    /// Remove a token. Returns whether it existed.
    pub fn revoke_token(&self, token: &str) -> AuthResult<bool> {
        Ok(self.store.delete_token(token)?)
    }

    /// Log out. Succeeds whether or not the token existed.
    pub fn delete_token(&self, token: &str) -> bool {
        match self.revoke_token(token) {
            Ok(_) => true,
            Err(e) => {
                log_store_failure("delete token", &e);
                false
            }
        }
    }

    /// Remove every expired token. Run once at startup.
    pub fn purge_expired(&self) -> AuthResult<u64> {
        let removed = self.store.delete_expired_tokens(self.clock.now())?;
        if removed > 0 {
            tracing::debug!(removed, "Purged expired sessions");
        }
        Ok(removed)
    }

    // ── Composite flows ─────────────────────────────────────────────

    /// Exchange the admin password for a new session token.
    pub fn login(&self, password: &str) -> AuthResult<String> {
        self.authenticate_admin(password)?;
        self.create_token()
    }

    /// Rotate the admin password using a live session, returning a fresh
    /// token that survives the revocation.
    ///
    /// Token failures surface as `NotFound`/`Expired`; a wrong current
    /// password (or a missing credential) as `InvalidCredential`.
    pub fn change_password(
        &self,
        token: &str,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<String> {
        self.authenticate_token(token)?;
        self.authenticate_admin(current_password)
            .map_err(|e| match e {
                AuthError::NotFound => AuthError::InvalidCredential,
                other => other,
            })?;
        self.set_admin_password(new_password)?;
        self.create_token()
    }
}

fn log_store_failure(action: &str, err: &AuthError) {
    if let AuthError::StoreUnavailable(source) = err {
        tracing::warn!("Session service could not {action}: {source}");
    }
}

/// Generate a random session token (hex-encoded).
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ManualClock;
    use crate::store::{DocumentStore, SqliteStore, StoreResult};
    use chrono::{DateTime, TimeZone, Utc};

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    fn service() -> (Arc<ManualClock>, Arc<DocumentStore>, SessionService) {
        let clock = Arc::new(ManualClock::new(start_time()));
        let store = Arc::new(DocumentStore::in_memory());
        let service = SessionService::with_clock(store.clone(), clock.clone());
        service.bootstrap("teatime").unwrap();
        (clock, store, service)
    }

    #[test]
    fn token_is_64_hex_chars_and_expires_in_seven_days() {
        let (_clock, store, service) = service();
        let token = service.create_token().unwrap();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

        let record = store.get_token(&token).unwrap().unwrap();
        assert_eq!(record.created_at, start_time());
        assert_eq!(record.expires_at, start_time() + Duration::days(7));
    }

    #[test]
    fn two_tokens_are_distinct_and_both_verify() {
        let (_clock, _store, service) = service();
        let a = service.create_token().unwrap();
        let b = service.create_token().unwrap();
        assert_ne!(a, b);
        assert!(service.verify_token(&a));
        assert!(service.verify_token(&b));
    }

    #[test]
    fn token_valid_at_exact_expiry() {
        let (clock, _store, service) = service();
        let token = service.create_token().unwrap();
        clock.advance(Duration::days(7));
        assert!(service.verify_token(&token));
    }

    #[test]
    fn expired_token_is_rejected_and_deleted() {
        let (clock, store, service) = service();
        let token = service.create_token().unwrap();

        clock.advance(Duration::days(7) + Duration::milliseconds(1));
        assert!(matches!(
            service.authenticate_token(&token),
            Err(AuthError::Expired)
        ));
        assert!(store.get_token(&token).unwrap().is_none());

        // Second verify looks exactly like an unknown token.
        assert!(matches!(
            service.authenticate_token(&token),
            Err(AuthError::NotFound)
        ));
        assert!(!service.verify_token(&token));
    }

    #[test]
    fn unknown_token_is_not_found() {
        let (_clock, _store, service) = service();
        assert!(matches!(
            service.authenticate_token("deadbeef"),
            Err(AuthError::NotFound)
        ));
        assert!(!service.verify_token("deadbeef"));
    }

    #[test]
    fn login_verify_logout_scenario() {
        let (_clock, _store, service) = service();
        let token = service.login("teatime").unwrap();
        assert!(service.verify_token(&token));
        assert!(service.delete_token(&token));
        assert!(!service.verify_token(&token));
        // Logging out twice still succeeds.
        assert!(service.delete_token(&token));
        assert!(!service.revoke_token(&token).unwrap());
    }

    #[test]
    fn login_with_wrong_password_is_invalid_credential() {
        let (_clock, store, service) = service();
        assert!(matches!(
            service.login("coffee"),
            Err(AuthError::InvalidCredential)
        ));
        assert_eq!(store.delete_all_tokens().unwrap(), 0);
    }

    #[test]
    fn password_change_revokes_every_session() {
        let (_clock, _store, service) = service();
        let first = service.create_token().unwrap();
        let second = service.create_token().unwrap();

        assert!(service.update_admin_password("earl-grey-42"));

        assert!(!service.verify_token(&first));
        assert!(!service.verify_token(&second));
        assert!(!service.verify_admin_password("teatime"));
        assert!(service.verify_admin_password("earl-grey-42"));
    }

    #[test]
    fn change_password_returns_a_surviving_token() {
        let (_clock, _store, service) = service();
        let old = service.login("teatime").unwrap();

        let fresh = service
            .change_password(&old, "teatime", "earl-grey-42")
            .unwrap();
        assert_ne!(old, fresh);
        assert!(!service.verify_token(&old));
        assert!(service.verify_token(&fresh));
    }

    #[test]
    fn change_password_distinguishes_failures() {
        let (clock, _store, service) = service();
        let token = service.login("teatime").unwrap();

        assert!(matches!(
            service.change_password(&token, "wrong", "earl-grey-42"),
            Err(AuthError::InvalidCredential)
        ));
        assert!(service.verify_admin_password("teatime"));
        assert!(service.verify_token(&token));

        assert!(matches!(
            service.change_password("missing", "teatime", "earl-grey-42"),
            Err(AuthError::NotFound)
        ));

        clock.advance(Duration::days(8));
        assert!(matches!(
            service.change_password(&token, "teatime", "earl-grey-42"),
            Err(AuthError::Expired)
        ));
        assert!(service.verify_admin_password("teatime"));
    }

    #[test]
    fn bootstrap_runs_once() {
        let store = Arc::new(DocumentStore::in_memory());
        let service = SessionService::new(store.clone());

        assert!(!service.verify_admin_password("teatime"));
        assert!(matches!(
            service.authenticate_admin("teatime"),
            Err(AuthError::NotFound)
        ));

        assert!(service.bootstrap("teatime").unwrap());
        let stored = store.get_setting(ADMIN_PASSWORD_KEY).unwrap();
        assert!(service.verify_admin_password("teatime"));

        assert!(!service.bootstrap("something-else").unwrap());
        assert_eq!(store.get_setting(ADMIN_PASSWORD_KEY).unwrap(), stored);
        assert!(!service.verify_admin_password("something-else"));
    }

    #[test]
    fn bootstrap_keeps_a_changed_password() {
        let (_clock, _store, service) = service();
        service.set_admin_password("earl-grey-42").unwrap();
        assert!(!service.bootstrap("teatime").unwrap());
        assert!(service.verify_admin_password("earl-grey-42"));
    }

    #[test]
    fn purge_expired_removes_only_stale_tokens() {
        let (clock, _store, service) = service();
        let stale = service.create_token().unwrap();
        clock.advance(Duration::days(6));
        let live = service.create_token().unwrap();
        clock.advance(Duration::days(2));

        assert_eq!(service.purge_expired().unwrap(), 1);
        assert!(!service.verify_token(&stale));
        assert!(service.verify_token(&live));
    }

    #[test]
    fn works_against_sqlite_backend() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let service = SessionService::with_clock(store, clock.clone());
        service.bootstrap("teatime").unwrap();

        let token = service.login("teatime").unwrap();
        assert!(service.verify_token(&token));
        clock.advance(Duration::days(7) + Duration::milliseconds(1));
        assert!(!service.verify_token(&token));
    }

    /// A store whose every call fails, standing in for an outage.
    struct DownStore;

    impl Store for DownStore {
        fn name(&self) -> &str {
            "down"
        }
        fn get_setting(&self, _key: &str) -> StoreResult<Option<String>> {
            Err(StoreError::Backend("connection refused".into()))
        }
        fn put_setting(&self, _key: &str, _value: &str) -> StoreResult<()> {
            Err(StoreError::Backend("connection refused".into()))
        }
        fn insert_setting_if_absent(&self, _key: &str, _value: &str) -> StoreResult<bool> {
            Err(StoreError::Backend("connection refused".into()))
        }
        fn insert_token(&self, _record: &SessionRecord) -> StoreResult<()> {
            Err(StoreError::Backend("connection refused".into()))
        }
        fn get_token(&self, _token: &str) -> StoreResult<Option<SessionRecord>> {
            Err(StoreError::Backend("connection refused".into()))
        }
        fn delete_token(&self, _token: &str) -> StoreResult<bool> {
            Err(StoreError::Backend("connection refused".into()))
        }
        fn delete_all_tokens(&self) -> StoreResult<u64> {
            Err(StoreError::Backend("connection refused".into()))
        }
        fn delete_expired_tokens(&self, _now: DateTime<Utc>) -> StoreResult<u64> {
            Err(StoreError::Backend("connection refused".into()))
        }
        fn list_bookings(&self) -> StoreResult<Vec<crate::booking::Booking>> {
            Err(StoreError::Backend("connection refused".into()))
        }
        fn list_bookings_by_phone(&self, _phone: &str) -> StoreResult<Vec<crate::booking::Booking>> {
            Err(StoreError::Backend("connection refused".into()))
        }
        fn insert_booking(&self, _booking: &crate::booking::Booking) -> StoreResult<()> {
            Err(StoreError::Backend("connection refused".into()))
        }
        fn update_booking(
            &self,
            _id: &str,
            _phone: Option<&str>,
            _update: &crate::booking::BookingUpdate,
        ) -> StoreResult<Option<crate::booking::Booking>> {
            Err(StoreError::Backend("connection refused".into()))
        }
        fn delete_booking(&self, _id: &str, _phone: Option<&str>) -> StoreResult<bool> {
            Err(StoreError::Backend("connection refused".into()))
        }
        fn delete_bookings_before(&self, _cutoff: DateTime<Utc>) -> StoreResult<u64> {
            Err(StoreError::Backend("connection refused".into()))
        }
        fn list_notifications(&self, _limit: usize) -> StoreResult<Vec<crate::booking::Notification>> {
            Err(StoreError::Backend("connection refused".into()))
        }
        fn insert_notification(
            &self,
            _notification: &crate::booking::Notification,
            _keep: usize,
        ) -> StoreResult<()> {
            Err(StoreError::Backend("connection refused".into()))
        }
        fn update_notification(
            &self,
            _id: &str,
            _update: &crate::booking::NotificationUpdate,
        ) -> StoreResult<Option<crate::booking::Notification>> {
            Err(StoreError::Backend("connection refused".into()))
        }
        fn delete_notification(&self, _id: &str) -> StoreResult<bool> {
            Err(StoreError::Backend("connection refused".into()))
        }
        fn health_check(&self) -> bool {
            false
        }
    }

    #[test]
    fn store_outage_degrades_to_reject() {
        let service = SessionService::new(Arc::new(DownStore));

        assert!(!service.verify_token("anything"));
        assert!(!service.verify_admin_password("teatime"));
        assert!(!service.update_admin_password("earl-grey-42"));
        assert!(!service.delete_token("anything"));

        let err = service.login("teatime").unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable(_)));
        // Backend detail never reaches the display string.
        assert_eq!(err.to_string(), "credential store unavailable");
    }
}
