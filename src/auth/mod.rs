//! Single-admin authentication.
//!
//! Provides:
//! - Admin password hashing (PBKDF2-HMAC-SHA512, 10k rounds + per-hash salt)
//! - Session token management (opaque 64-char hex tokens, 7-day expiry)
//! - Mass session revocation whenever the admin password changes
//!
//! ## Design Decisions
//! - One shared admin credential, stored as a setting in the active store.
//! - Tokens are stored as issued and looked up directly; expiry is checked
//!   only when a token is presented.
//! - Internal results distinguish not-found, expired, invalid and store
//!   failures; the HTTP layer only ever sees success or failure.

pub mod clock;
pub mod error;
pub mod password;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthError, AuthResult};
pub use session::{SessionService, SESSION_TTL_SECS};
