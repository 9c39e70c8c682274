//! Booking domain: customer bookings, dashboard notifications and shop state.
//!
//! Provides:
//! - Record types shared by every store backend
//! - Shop open/closed status helpers
//! - The daily cleanup sweep for bookings from previous days

pub mod cleanup;
pub mod models;
pub mod shop;

pub use models::{
    Booking, BookingStatus, BookingUpdate, NewBooking, NewNotification, Notification,
    NotificationUpdate, ShopStatus,
};

/// Notifications retained after each insert.
pub const MAX_STORED_NOTIFICATIONS: usize = 50;
