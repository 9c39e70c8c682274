#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_wrap
)]

//! Tea delivery booking service.
//!
//! Customers place bookings, staff manage them from a dashboard guarded by a
//! single admin password and short-lived bearer tokens.

pub mod auth;
pub mod booking;
pub mod config;
pub mod gateway;
pub mod store;
pub mod validation;
