use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Delivery progress of a booking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BookingStatus {
    #[default]
    Pending,
    Confirmed,
    Preparing,
    OnTheWay,
    Delivered,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Preparing => "preparing",
            Self::OnTheWay => "on-the-way",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "preparing" => Ok(Self::Preparing),
            "on-the-way" | "on_the_way" | "ontheway" => Ok(Self::OnTheWay),
            "delivered" => Ok(Self::Delivered),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

/// A customer's delivery request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub location: String,
    pub custom_location: Option<String>,
    pub notes: Option<String>,
    pub status: BookingStatus,
    /// Free-text arrival estimate set by staff. Empty until set.
    pub eta: String,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// Build a fresh pending booking from validated input.
    pub fn new(input: NewBooking, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: input.name,
            phone: input.phone,
            location: input.location,
            custom_location: input.custom_location,
            notes: input.notes,
            status: BookingStatus::Pending,
            eta: String::new(),
            created_at: now,
        }
    }

    /// Apply the set fields of `update` in place.
    pub fn apply(&mut self, update: &BookingUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(ref eta) = update.eta {
            self.eta.clone_from(eta);
        }
    }
}

/// Validated fields for a new booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub name: String,
    pub phone: String,
    pub location: String,
    pub custom_location: Option<String>,
    pub notes: Option<String>,
}

/// Partial booking update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingUpdate {
    pub status: Option<BookingStatus>,
    pub eta: Option<String>,
}

impl BookingUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.eta.is_none()
    }
}

/// A broadcast message shown on the customer page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub message: String,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(input: NewNotification, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message: input.message,
            location: input.location,
            created_at: now,
        }
    }

    pub fn apply(&mut self, update: &NotificationUpdate) {
        if let Some(ref message) = update.message {
            self.message.clone_from(message);
        }
        if let Some(ref location) = update.location {
            self.location = Some(location.clone());
        }
    }
}

/// Validated fields for a new notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub message: String,
    pub location: Option<String>,
}

/// Partial notification update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationUpdate {
    pub message: Option<String>,
    pub location: Option<String>,
}

/// Whether the shop currently accepts bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopStatus {
    pub is_open: bool,
}

impl Default for ShopStatus {
    fn default() -> Self {
        Self { is_open: true }
    }
}
