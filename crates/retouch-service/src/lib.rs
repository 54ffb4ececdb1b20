//! Retouch HTTP API Service.
//!
//! This crate provides the HTTP API for the retouch mobile app backend:
//!
//! - Device onboarding and cohort assignment
//! - Credit balance reads and optimistic deductions
//! - Paid image generation through fal.ai
//! - `RevenueCat` subscription webhooks
//!
//! # Identity
//!
//! Devices are identified by a client-generated id sent with each request; there
//! is no other authentication on the client API. Webhooks can be protected with a
//! shared `Authorization` value.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router even when the store is sync

pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod fal;
pub mod handlers;
pub mod ledger;
pub mod onboarding;
pub mod revenuecat;
pub mod routes;
pub mod state;

pub use config::{CohortConfig, ServiceConfig, StoreBackend};
pub use error::ApiError;
pub use events::{EventOutcome, SubscriptionEventProcessor};
pub use fal::{EditOutput, EditRequest, FalClient, FalError, ImageGenerator};
pub use ledger::{CreditLedger, Deduction, LedgerBalance};
pub use onboarding::{Onboarding, OnboardingAssigner};
pub use routes::create_router;
pub use state::AppState;
