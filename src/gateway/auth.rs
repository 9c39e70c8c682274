//! `/api/auth/*` handlers and the bearer-token guard for admin routes.

use super::{bad_body, failure, opaque_error, validation_failed, ApiResponse, AppState};
use crate::auth::AuthError;
use crate::validation::{self, ChangePasswordInput, LoginInput};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::Json,
};
use serde::Deserialize;

/// Body accepted by verify/logout. The dashboard sends the token here.
#[derive(Debug, Default, Deserialize)]
pub struct TokenBody {
    pub token: Option<String>,
}

/// Extract bearer token from Authorization header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Header token first, then the body's `token` field.
fn presented_token(headers: &HeaderMap, body: Option<String>) -> Option<String> {
    extract_bearer_token(headers)
        .map(String::from)
        .or_else(|| body.filter(|t| !t.is_empty()))
}

/// Whether the request carries a live admin session.
pub fn is_admin(state: &AppState, headers: &HeaderMap) -> bool {
    extract_bearer_token(headers).is_some_and(|token| state.sessions.verify_token(token))
}

/// Reject the request unless it carries a live admin session.
pub fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiResponse> {
    let token = extract_bearer_token(headers)
        .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "Authentication required"))?;
    if state.sessions.verify_token(token) {
        Ok(())
    } else {
        Err(failure(StatusCode::UNAUTHORIZED, "Invalid or expired token"))
    }
}

/// POST /api/auth/login: exchange the admin password for a session token.
pub async fn handle_login(
    State(state): State<AppState>,
    body: Result<Json<LoginInput>, JsonRejection>,
) -> ApiResponse {
    let input = match body {
        Ok(Json(input)) => input,
        Err(e) => return bad_body(&e),
    };
    let password = match validation::validate_login(&input) {
        Ok(password) => password,
        Err(errors) => return validation_failed(errors),
    };

    match state.sessions.login(&password) {
        Ok(token) => (
            StatusCode::OK,
            Json(serde_json::json!({"success": true, "token": token})),
        ),
        Err(AuthError::StoreUnavailable(e)) => opaque_error("Error during login", &e),
        Err(e) => {
            tracing::warn!("Admin login rejected: {e}");
            failure(StatusCode::UNAUTHORIZED, "Invalid password")
        }
    }
}

/// POST /api/auth/verify: `{success: bool}` for the presented token.
pub async fn handle_verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<TokenBody>, JsonRejection>,
) -> ApiResponse {
    let body_token = body.ok().and_then(|Json(b)| b.token);
    let Some(token) = presented_token(&headers, body_token) else {
        return failure(StatusCode::BAD_REQUEST, "Token is required");
    };
    let valid = state.sessions.verify_token(&token);
    (StatusCode::OK, Json(serde_json::json!({"success": valid})))
}

/// POST /api/auth/logout: always succeeds.
pub async fn handle_logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<TokenBody>, JsonRejection>,
) -> ApiResponse {
    let body_token = body.ok().and_then(|Json(b)| b.token);
    if let Some(token) = presented_token(&headers, body_token) {
        state.sessions.delete_token(&token);
    }
    (StatusCode::OK, Json(serde_json::json!({"success": true})))
}

/// POST /api/auth/change-password: rotate the password, revoke every session,
/// and hand back a fresh token.
pub async fn handle_change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChangePasswordInput>, JsonRejection>,
) -> ApiResponse {
    let mut input = match body {
        Ok(Json(input)) => input,
        Err(e) => return bad_body(&e),
    };
    input.token = presented_token(&headers, input.token.take());

    let change = match validation::validate_password_change(&input, state.min_password_len) {
        Ok(change) => change,
        Err(errors) => return validation_failed(errors),
    };

    match state
        .sessions
        .change_password(&change.token, &change.current_password, &change.new_password)
    {
        Ok(token) => (
            StatusCode::OK,
            Json(serde_json::json!({"success": true, "token": token})),
        ),
        Err(AuthError::NotFound | AuthError::Expired) => {
            failure(StatusCode::UNAUTHORIZED, "Invalid or expired token")
        }
        Err(AuthError::InvalidCredential) => {
            tracing::warn!("Password change rejected: current password mismatch");
            failure(StatusCode::UNAUTHORIZED, "Current password is incorrect")
        }
        Err(AuthError::StoreUnavailable(e)) => opaque_error("Error changing password", &e),
    }
}
