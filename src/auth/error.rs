use crate::store::StoreError;
use thiserror::Error;

/// Why an authentication step failed.
///
/// The public boundary of [`SessionService`](super::SessionService) collapses
/// all of these to `false` or an opaque failure; the variants exist so
/// callers and tests can tell the causes apart internally.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No such token, or no admin credential has been stored yet.
    #[error("not found")]
    NotFound,

    /// The token exists but is past its expiry. It has been deleted.
    #[error("token expired")]
    Expired,

    /// The password did not match the stored credential.
    #[error("invalid credential")]
    InvalidCredential,

    /// The backing store failed. Detail is kept in the source only.
    #[error("credential store unavailable")]
    StoreUnavailable(#[source] StoreError),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        Self::StoreUnavailable(err)
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
