//! Subscription event processor.
//!
//! Applies `RevenueCat` lifecycle events to balance records. Every event resolves to an
//! [`EventOutcome`]; nothing here fails the webhook delivery.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use retouch_core::{BalanceUpdate, DeviceId, ProductCatalog};
use retouch_store::{ProcessedEvent, Store, StoreError, TransferOutcome, WriteOutcome};

use crate::revenuecat::{event_types, RevenueCatEvent};

/// What happened to one webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    /// The event changed at least one record.
    Applied,
    /// A handled event type that could not be applied (missing fields, unknown device).
    Skipped,
    /// An event type this service does not act on.
    Ignored,
    /// An event id that was already applied.
    Duplicate,
    /// The store failed; nothing was written and the id was not claimed.
    Failed,
}

impl EventOutcome {
    /// Wire name of the outcome.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Skipped => "skipped",
            Self::Ignored => "ignored",
            Self::Duplicate => "duplicate",
            Self::Failed => "failed",
        }
    }
}

/// Applies billing events to the balance store.
#[derive(Clone)]
pub struct SubscriptionEventProcessor {
    store: Arc<dyn Store>,
    catalog: Arc<ProductCatalog>,
}

impl SubscriptionEventProcessor {
    /// Create a processor.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, catalog: Arc<ProductCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Process one event.
    ///
    /// An event carrying an `id` is claimed in the same store write that applies it,
    /// so a redelivered or concurrently delivered id is applied at most once. A store
    /// failure leaves both the balance and the claim unwritten.
    pub fn process(&self, event: &RevenueCatEvent) -> EventOutcome {
        let claim = event.event_id().map(|id| ProcessedEvent {
            event_id: id.to_string(),
            event_type: event.event_type.clone(),
            processed_at: Utc::now(),
        });

        let outcome = match self.apply(event, claim.as_ref()) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    event_id = ?event.event_id(),
                    event_type = %event.event_type,
                    error = %e,
                    "Failed to apply billing event"
                );
                EventOutcome::Failed
            }
        };

        tracing::info!(
            event_id = ?event.event_id(),
            event_type = %event.event_type,
            outcome = outcome.as_str(),
            "Billing event processed"
        );
        outcome
    }

    fn apply(
        &self,
        event: &RevenueCatEvent,
        claim: Option<&ProcessedEvent>,
    ) -> Result<EventOutcome, StoreError> {
        match event.event_type.as_str() {
            event_types::INITIAL_PURCHASE | event_types::RENEWAL | event_types::TEST => {
                self.apply_subscription(event, claim)
            }
            event_types::NON_RENEWING_PURCHASE => self.apply_top_up(event, claim),
            event_types::EXPIRATION => self.apply_expiration(event, claim),
            event_types::TRANSFER => self.apply_transfer(event, claim),
            other => {
                tracing::debug!(event_type = %other, "Unhandled billing event type");
                Ok(EventOutcome::Ignored)
            }
        }
    }

    fn apply_subscription(
        &self,
        event: &RevenueCatEvent,
        claim: Option<&ProcessedEvent>,
    ) -> Result<EventOutcome, StoreError> {
        let (Some(device_id), Some(product_id), Some(expires_at)) = (
            device(event.app_user_id()),
            event.product_id(),
            expiry(event.expiration_at_ms),
        ) else {
            tracing::warn!(event_type = %event.event_type, "Missing information for purchase/renewal event");
            return Ok(EventOutcome::Skipped);
        };

        let tier = self.catalog.subscription_tier(product_id);
        let written = self.store.update_balance(
            &device_id,
            &BalanceUpdate::subscription_grant(tier, expires_at),
            true,
            claim,
        )?;
        if written == WriteOutcome::Duplicate {
            return Ok(duplicate(claim));
        }

        tracing::info!(
            device_id = %device_id,
            product_id = %product_id,
            status = tier.status.as_str(),
            credits = tier.credits,
            expires_at = %expires_at,
            "Subscription credits granted"
        );
        Ok(EventOutcome::Applied)
    }

    fn apply_top_up(
        &self,
        event: &RevenueCatEvent,
        claim: Option<&ProcessedEvent>,
    ) -> Result<EventOutcome, StoreError> {
        let (Some(device_id), Some(product_id)) = (device(event.app_user_id()), event.product_id())
        else {
            tracing::warn!("Missing information for non-renewing purchase event");
            return Ok(EventOutcome::Skipped);
        };

        let credits = self.catalog.top_up_credits(product_id);
        if credits == 0 {
            tracing::warn!(device_id = %device_id, product_id = %product_id, "Unknown top-up product, granting nothing");
        }
        let written =
            self.store
                .update_balance(&device_id, &BalanceUpdate::top_up(credits), true, claim)?;
        if written == WriteOutcome::Duplicate {
            return Ok(duplicate(claim));
        }

        tracing::info!(device_id = %device_id, product_id = %product_id, credits, "Extra credits added");
        Ok(EventOutcome::Applied)
    }

    fn apply_expiration(
        &self,
        event: &RevenueCatEvent,
        claim: Option<&ProcessedEvent>,
    ) -> Result<EventOutcome, StoreError> {
        let Some(device_id) = device(event.app_user_id()) else {
            tracing::warn!("Missing app_user_id for expiration event");
            return Ok(EventOutcome::Skipped);
        };

        match self
            .store
            .update_balance(&device_id, &BalanceUpdate::expiration(), false, claim)?
        {
            WriteOutcome::NotFound => {
                tracing::warn!(device_id = %device_id, "Expiration for unknown device");
                Ok(EventOutcome::Skipped)
            }
            WriteOutcome::Duplicate => Ok(duplicate(claim)),
            WriteOutcome::Updated | WriteOutcome::Inserted => {
                tracing::info!(device_id = %device_id, "Subscription expired");
                Ok(EventOutcome::Applied)
            }
        }
    }

    fn apply_transfer(
        &self,
        event: &RevenueCatEvent,
        claim: Option<&ProcessedEvent>,
    ) -> Result<EventOutcome, StoreError> {
        let (Some(from), Some(to)) = (
            device(event.transfer_source()),
            device(event.transfer_destination()),
        ) else {
            tracing::warn!("Missing information for transfer event");
            return Ok(EventOutcome::Skipped);
        };

        if from == to {
            tracing::warn!(device_id = %from, "Transfer to the same device");
            return Ok(EventOutcome::Skipped);
        }

        match self.store.transfer_balance(&from, &to, claim)? {
            TransferOutcome::SourceNotFound => {
                tracing::warn!(from = %from, to = %to, "Transfer source not found");
                Ok(EventOutcome::Skipped)
            }
            TransferOutcome::Duplicate => Ok(duplicate(claim)),
            TransferOutcome::Transferred(_) => {
                tracing::info!(from = %from, to = %to, "Subscription transferred");
                Ok(EventOutcome::Applied)
            }
        }
    }
}

fn duplicate(claim: Option<&ProcessedEvent>) -> EventOutcome {
    if let Some(claim) = claim {
        tracing::info!(event_id = %claim.event_id, event_type = %claim.event_type, "Duplicate billing event");
    }
    EventOutcome::Duplicate
}

/// Parse a device id, logging ids that fail validation.
fn device(raw: Option<&str>) -> Option<DeviceId> {
    let raw = raw?;
    DeviceId::parse(raw)
        .map_err(|e| tracing::warn!(error = %e, "Invalid device id in billing event"))
        .ok()
}

fn expiry(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.filter(|ms| *ms > 0)
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}
