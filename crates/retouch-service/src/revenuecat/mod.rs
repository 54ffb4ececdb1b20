//! `RevenueCat` webhook integration.
//!
//! `RevenueCat` reports subscription lifecycle changes (purchases, renewals,
//! expirations, transfers) by POSTing an envelope with a single `event` object.
//! The `app_user_id` it reports is the device id the mobile client logged in with.

pub mod types;

pub use types::*;
