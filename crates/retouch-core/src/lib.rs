//! Core types and policies for the retouch credit ledger.
//!
//! This crate provides the foundational types shared by the store and the service:
//!
//! - **Identifiers**: `DeviceId`, `GenerationId`
//! - **Balances**: `BalanceRecord`, `CreditBalance`, `Debit`, `BalanceUpdate`
//! - **Catalog**: `ProductCatalog` (billing product id → credits)
//! - **Onboarding**: `CohortPolicy`, `FlatProbability`, `RegionalProbability`, `StartingGrant`
//! - **Generations**: `GenerationRecord`
//!
//! # Credit Pools
//!
//! Every device has two pools:
//!
//! - **Subscription credits** are set by each billing period and zeroed on expiration.
//! - **Extra credits** come from one-time top-ups and never expire.
//!
//! Usage always drains subscription credits first.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod balance;
pub mod catalog;
pub mod cohort;
pub mod error;
pub mod generation;
pub mod ids;

pub use balance::{
    BalanceRecord, BalanceUpdate, CreditBalance, Debit, DeviceProfile, SubscriptionStatus,
};
pub use catalog::{ProductCatalog, SubscriptionProduct, SubscriptionTier, TopUpProduct};
pub use cohort::{
    CohortPolicy, FixedCohort, FlatProbability, RegionalProbability, StartingGrant,
};
pub use error::{BillingError, Result};
pub use generation::{GeneratedImage, GenerationRecord};
pub use ids::{DeviceId, GenerationId, IdError};
