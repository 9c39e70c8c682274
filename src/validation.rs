//! Request body validation and sanitization.
//!
//! Every validator trims its inputs, checks lengths on the trimmed text,
//! then HTML-escapes free-text fields before they are stored. All field
//! errors are collected, not just the first.

use crate::booking::{BookingStatus, BookingUpdate, NewBooking, NewNotification, NotificationUpdate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9+\-\s()]+$").expect("valid phone regex"));

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 100;
const PHONE_MIN: usize = 10;
const PHONE_MAX: usize = 20;
const LOCATION_MAX: usize = 200;
const NOTES_MAX: usize = 500;
const MESSAGE_MAX: usize = 500;
const ETA_MAX: usize = 100;

/// One rejected field, reported back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

impl FieldError {
    fn new(field: &'static str, message: &'static str) -> Self {
        Self { field, message }
    }
}

pub type Validated<T> = Result<T, Vec<FieldError>>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingInput {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub custom_location: Option<String>,
    pub notes: Option<String>,
}

/// Status/ETA change. `phone` scopes the update to the customer's own booking.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingUpdateInput {
    pub status: Option<String>,
    pub eta: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationInput {
    pub message: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginInput {
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordInput {
    pub token: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

/// A validated password change request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordChange {
    pub token: String,
    pub current_password: String,
    pub new_password: String,
}

/// Escape the characters that matter in HTML text and attributes.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            '\\' => out.push_str("&#x5C;"),
            '`' => out.push_str("&#96;"),
            other => out.push(other),
        }
    }
    out
}

fn trimmed(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim())
}

fn char_len(value: &str) -> usize {
    value.chars().count()
}

/// Optional free text: trimmed, bounded, escaped. Blank becomes `None`.
fn optional_text(
    value: Option<&String>,
    max: usize,
    field: &'static str,
    message: &'static str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    let value = trimmed(value).filter(|v| !v.is_empty())?;
    if char_len(value) > max {
        errors.push(FieldError::new(field, message));
        return None;
    }
    Some(escape_html(value))
}

pub fn validate_booking(input: &BookingInput) -> Validated<NewBooking> {
    let mut errors = Vec::new();

    let name = match trimmed(input.name.as_ref()).filter(|n| !n.is_empty()) {
        None => {
            errors.push(FieldError::new("name", "Name is required"));
            String::new()
        }
        Some(n) if !(NAME_MIN..=NAME_MAX).contains(&char_len(n)) => {
            errors.push(FieldError::new("name", "Name must be 2-100 characters"));
            String::new()
        }
        Some(n) => escape_html(n),
    };

    let phone = match trimmed(input.phone.as_ref()).filter(|p| !p.is_empty()) {
        None => {
            errors.push(FieldError::new("phone", "Phone is required"));
            String::new()
        }
        Some(p) => {
            if !PHONE_PATTERN.is_match(p) {
                errors.push(FieldError::new("phone", "Invalid phone number format"));
            }
            if !(PHONE_MIN..=PHONE_MAX).contains(&char_len(p)) {
                errors.push(FieldError::new("phone", "Phone must be 10-20 characters"));
            }
            p.to_string()
        }
    };

    let location = match trimmed(input.location.as_ref()).filter(|l| !l.is_empty()) {
        None => {
            errors.push(FieldError::new("location", "Location is required"));
            String::new()
        }
        Some(l) if char_len(l) > LOCATION_MAX => {
            errors.push(FieldError::new("location", "Location too long"));
            String::new()
        }
        Some(l) => escape_html(l),
    };

    let custom_location = optional_text(
        input.custom_location.as_ref(),
        LOCATION_MAX,
        "customLocation",
        "Custom location too long",
        &mut errors,
    );
    let notes = optional_text(input.notes.as_ref(), NOTES_MAX, "notes", "Notes too long", &mut errors);

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(NewBooking {
        name,
        phone,
        location,
        custom_location,
        notes,
    })
}

pub fn validate_booking_update(input: &BookingUpdateInput) -> Validated<BookingUpdate> {
    let mut errors = Vec::new();

    let status = match trimmed(input.status.as_ref()).filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => match raw.parse::<BookingStatus>() {
            Ok(status) => Some(status),
            Err(_) => {
                errors.push(FieldError::new("status", "Unknown booking status"));
                None
            }
        },
    };

    // An explicit empty ETA clears it.
    let eta = match trimmed(input.eta.as_ref()) {
        None => None,
        Some(e) if char_len(e) > ETA_MAX => {
            errors.push(FieldError::new("eta", "ETA too long"));
            None
        }
        Some(e) => Some(escape_html(e)),
    };

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(BookingUpdate { status, eta })
}

fn validate_message(
    value: Option<&String>,
    required: bool,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match trimmed(value) {
        None if !required => None,
        None | Some("") => {
            errors.push(FieldError::new("message", "Message is required"));
            None
        }
        Some(m) if char_len(m) > MESSAGE_MAX => {
            errors.push(FieldError::new("message", "Message must be 1-500 characters"));
            None
        }
        Some(m) => Some(escape_html(m)),
    }
}

pub fn validate_notification(input: &NotificationInput) -> Validated<NewNotification> {
    let mut errors = Vec::new();
    let message = validate_message(input.message.as_ref(), true, &mut errors);
    let location = optional_text(
        input.location.as_ref(),
        LOCATION_MAX,
        "location",
        "Location too long",
        &mut errors,
    );
    match message {
        Some(message) if errors.is_empty() => Ok(NewNotification { message, location }),
        _ => Err(errors),
    }
}

pub fn validate_notification_update(input: &NotificationInput) -> Validated<NotificationUpdate> {
    let mut errors = Vec::new();
    let message = validate_message(input.message.as_ref(), false, &mut errors);
    let location = optional_text(
        input.location.as_ref(),
        LOCATION_MAX,
        "location",
        "Location too long",
        &mut errors,
    );
    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(NotificationUpdate { message, location })
}

pub fn validate_login(input: &LoginInput) -> Validated<String> {
    match input.password.as_deref() {
        Some(p) if !p.is_empty() => Ok(p.to_string()),
        _ => Err(vec![FieldError::new("password", "Password is required")]),
    }
}

/// Passwords are compared verbatim; only emptiness and length are checked.
pub fn validate_password_change(
    input: &ChangePasswordInput,
    min_password_len: usize,
) -> Validated<PasswordChange> {
    let mut errors = Vec::new();
    let token = input.token.as_deref().unwrap_or_default();
    let current = input.current_password.as_deref().unwrap_or_default();
    let new = input.new_password.as_deref().unwrap_or_default();

    if token.is_empty() {
        errors.push(FieldError::new("token", "Token is required"));
    }
    if current.is_empty() {
        errors.push(FieldError::new("currentPassword", "Current password is required"));
    }
    if new.is_empty() {
        errors.push(FieldError::new("newPassword", "New password is required"));
    } else if char_len(new) < min_password_len {
        errors.push(FieldError::new("newPassword", "New password is too short"));
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(PasswordChange {
        token: token.to_string(),
        current_password: current.to_string(),
        new_password: new.to_string(),
    })
}
