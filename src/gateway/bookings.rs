//! Booking, notification and shop-status handlers.
//!
//! Staff act through an admin bearer token. Customers act on their own
//! bookings by presenting the phone number the booking was placed with;
//! without a token they may only cancel.

use super::auth::{is_admin, require_admin};
use super::{bad_body, failure, internal_error, validation_failed, ApiResponse, AppState};
use crate::booking::{
    shop, Booking, BookingStatus, Notification, MAX_STORED_NOTIFICATIONS,
};
use crate::validation::{self, BookingInput, BookingUpdateInput, FieldError, NotificationInput};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Deserialize;

/// `?phone=` scoping for customer access.
#[derive(Debug, Default, Deserialize)]
pub struct PhoneQuery {
    pub phone: Option<String>,
}

impl PhoneQuery {
    fn phone(&self) -> Option<&str> {
        self.phone.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopStatusInput {
    pub is_open: Option<bool>,
}

// ── Bookings ────────────────────────────────────────────────────────

/// GET /api/bookings: every booking for staff, or one customer's by phone.
pub async fn handle_list_bookings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PhoneQuery>,
) -> Response {
    let result = if is_admin(&state, &headers) {
        state.store.list_bookings()
    } else if let Some(phone) = query.phone() {
        state.store.list_bookings_by_phone(phone)
    } else {
        return failure(StatusCode::UNAUTHORIZED, "Authentication required").into_response();
    };

    match result {
        Ok(bookings) => Json(bookings).into_response(),
        Err(e) => internal_error(&state, "Error fetching bookings", &e).into_response(),
    }
}

/// POST /api/bookings: place a booking while the shop is open.
pub async fn handle_create_booking(
    State(state): State<AppState>,
    body: Result<Json<BookingInput>, JsonRejection>,
) -> ApiResponse {
    let input = match body {
        Ok(Json(input)) => input,
        Err(e) => return bad_body(&e),
    };
    let valid = match validation::validate_booking(&input) {
        Ok(valid) => valid,
        Err(errors) => return validation_failed(errors),
    };

    match shop::shop_status(state.store.as_ref()) {
        Ok(status) if !status.is_open => {
            return failure(
                StatusCode::FORBIDDEN,
                "Shop is currently closed. Please try again later.",
            );
        }
        Ok(_) => {}
        Err(e) => return internal_error(&state, "Error creating booking", &e),
    }

    let booking = Booking::new(valid, Utc::now());
    match state.store.insert_booking(&booking) {
        Ok(()) => {
            tracing::info!(id = %booking.id, "Booking created");
            (
                StatusCode::OK,
                Json(serde_json::json!({"success": true, "booking": booking})),
            )
        }
        Err(e) => internal_error(&state, "Error creating booking", &e),
    }
}

/// PUT /api/bookings/{id}: staff set status/ETA; customers may cancel.
pub async fn handle_update_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<PhoneQuery>,
    body: Result<Json<BookingUpdateInput>, JsonRejection>,
) -> ApiResponse {
    let input = match body {
        Ok(Json(input)) => input,
        Err(e) => return bad_body(&e),
    };
    let update = match validation::validate_booking_update(&input) {
        Ok(update) => update,
        Err(errors) => return validation_failed(errors),
    };

    let body_phone = input
        .phone
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());
    let phone = body_phone.or_else(|| query.phone());

    if !is_admin(&state, &headers) {
        if phone.is_none() {
            return failure(StatusCode::UNAUTHORIZED, "Authentication required");
        }
        if update.status != Some(BookingStatus::Cancelled) || update.eta.is_some() {
            return failure(StatusCode::FORBIDDEN, "Customers may only cancel a booking");
        }
    }

    match state.store.update_booking(&id, phone, &update) {
        Ok(Some(booking)) => {
            tracing::info!(id = %booking.id, status = %booking.status, "Booking updated");
            (
                StatusCode::OK,
                Json(serde_json::json!({"success": true, "booking": booking})),
            )
        }
        Ok(None) => failure(StatusCode::NOT_FOUND, "Booking not found"),
        Err(e) => internal_error(&state, "Error updating booking", &e),
    }
}

/// DELETE /api/bookings/{id}
pub async fn handle_delete_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<PhoneQuery>,
) -> ApiResponse {
    let phone = query.phone();
    if phone.is_none() {
        if let Err(resp) = require_admin(&state, &headers) {
            return resp;
        }
    }

    match state.store.delete_booking(&id, phone) {
        Ok(true) => (StatusCode::OK, Json(serde_json::json!({"success": true}))),
        Ok(false) => failure(StatusCode::NOT_FOUND, "Booking not found"),
        Err(e) => internal_error(&state, "Error deleting booking", &e),
    }
}

// ── Notifications ───────────────────────────────────────────────────

/// GET /api/notifications: newest first, public.
pub async fn handle_list_notifications(State(state): State<AppState>) -> Response {
    match state.store.list_notifications(state.notification_limit) {
        Ok(notifications) => Json(notifications).into_response(),
        Err(e) => internal_error(&state, "Error fetching notifications", &e).into_response(),
    }
}

pub async fn handle_create_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<NotificationInput>, JsonRejection>,
) -> ApiResponse {
    if let Err(resp) = require_admin(&state, &headers) {
        return resp;
    }
    let input = match body {
        Ok(Json(input)) => input,
        Err(e) => return bad_body(&e),
    };
    let valid = match validation::validate_notification(&input) {
        Ok(valid) => valid,
        Err(errors) => return validation_failed(errors),
    };

    let notification = Notification::new(valid, Utc::now());
    match state
        .store
        .insert_notification(&notification, MAX_STORED_NOTIFICATIONS)
    {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"success": true, "notification": notification})),
        ),
        Err(e) => internal_error(&state, "Error creating notification", &e),
    }
}

pub async fn handle_update_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<NotificationInput>, JsonRejection>,
) -> ApiResponse {
    if let Err(resp) = require_admin(&state, &headers) {
        return resp;
    }
    let input = match body {
        Ok(Json(input)) => input,
        Err(e) => return bad_body(&e),
    };
    let update = match validation::validate_notification_update(&input) {
        Ok(update) => update,
        Err(errors) => return validation_failed(errors),
    };

    match state.store.update_notification(&id, &update) {
        Ok(Some(notification)) => (
            StatusCode::OK,
            Json(serde_json::json!({"success": true, "notification": notification})),
        ),
        Ok(None) => failure(StatusCode::NOT_FOUND, "Notification not found"),
        Err(e) => internal_error(&state, "Error updating notification", &e),
    }
}

pub async fn handle_delete_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResponse {
    if let Err(resp) = require_admin(&state, &headers) {
        return resp;
    }
    match state.store.delete_notification(&id) {
        Ok(true) => (StatusCode::OK, Json(serde_json::json!({"success": true}))),
        Ok(false) => failure(StatusCode::NOT_FOUND, "Notification not found"),
        Err(e) => internal_error(&state, "Error deleting notification", &e),
    }
}

// ── Shop status ─────────────────────────────────────────────────────

/// GET /api/shop-status: `{isOpen}`.
pub async fn handle_get_shop_status(State(state): State<AppState>) -> Response {
    match shop::shop_status(state.store.as_ref()) {
        Ok(status) => Json(status).into_response(),
        Err(e) => internal_error(&state, "Error fetching shop status", &e).into_response(),
    }
}

pub async fn handle_set_shop_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ShopStatusInput>, JsonRejection>,
) -> ApiResponse {
    if let Err(resp) = require_admin(&state, &headers) {
        return resp;
    }
    let input = match body {
        Ok(Json(input)) => input,
        Err(e) => return bad_body(&e),
    };
    let Some(is_open) = input.is_open else {
        return validation_failed(vec![FieldError {
            field: "isOpen",
            message: "isOpen must be true or false",
        }]);
    };

    match shop::set_shop_status(state.store.as_ref(), is_open) {
        Ok(status) => (
            StatusCode::OK,
            Json(serde_json::json!({"success": true, "status": status})),
        ),
        Err(e) => internal_error(&state, "Error updating shop status", &e),
    }
}
