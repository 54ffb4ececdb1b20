//! `RevenueCat` webhook wire types.

use serde::Deserialize;

/// Event types the processor acts on.
pub mod event_types {
    /// First purchase of a subscription.
    pub const INITIAL_PURCHASE: &str = "INITIAL_PURCHASE";
    /// Subscription renewed for a new period.
    pub const RENEWAL: &str = "RENEWAL";
    /// Dashboard test event; treated as a purchase.
    pub const TEST: &str = "TEST";
    /// One-time (consumable) purchase.
    pub const NON_RENEWING_PURCHASE: &str = "NON_RENEWING_PURCHASE";
    /// Subscription lapsed.
    pub const EXPIRATION: &str = "EXPIRATION";
    /// Purchases moved from one app user id to another.
    pub const TRANSFER: &str = "TRANSFER";
}

/// Webhook envelope.
///
/// `event` is kept as raw JSON so a malformed event can be acknowledged and skipped
/// instead of rejecting the delivery.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    /// API version of the payload.
    #[serde(default)]
    pub api_version: Option<String>,
    /// The event object.
    #[serde(default)]
    pub event: Option<serde_json::Value>,
}

/// A `RevenueCat` event. Only the fields the processor reads are modelled.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevenueCatEvent {
    /// Unique event id, used for de-duplication.
    #[serde(default)]
    pub id: Option<String>,
    /// Event type (see [`event_types`]).
    #[serde(rename = "type", default)]
    pub event_type: String,
    /// App user id (the device id).
    #[serde(default)]
    pub app_user_id: Option<String>,
    /// Store product id.
    #[serde(default)]
    pub product_id: Option<String>,
    /// End of the purchased period, in milliseconds since the epoch.
    #[serde(default)]
    pub expiration_at_ms: Option<i64>,
    /// When the event happened, in milliseconds since the epoch.
    #[serde(default)]
    pub event_timestamp_ms: Option<i64>,
    /// `SANDBOX` or `PRODUCTION`.
    #[serde(default)]
    pub environment: Option<String>,
    /// App store the purchase came from.
    #[serde(default)]
    pub store: Option<String>,
    /// Transfer sources.
    #[serde(default)]
    pub transferred_from: Option<Vec<String>>,
    /// Transfer destinations.
    #[serde(default)]
    pub transferred_to: Option<Vec<String>>,
}

impl RevenueCatEvent {
    /// Event id, if present and non-empty.
    #[must_use]
    pub fn event_id(&self) -> Option<&str> {
        non_empty(self.id.as_deref())
    }

    /// App user id, if present and non-empty.
    #[must_use]
    pub fn app_user_id(&self) -> Option<&str> {
        non_empty(self.app_user_id.as_deref())
    }

    /// Product id, if present and non-empty.
    #[must_use]
    pub fn product_id(&self) -> Option<&str> {
        non_empty(self.product_id.as_deref())
    }

    /// First transfer source, if present and non-empty.
    #[must_use]
    pub fn transfer_source(&self) -> Option<&str> {
        first_non_empty(self.transferred_from.as_deref())
    }

    /// First transfer destination, if present and non-empty.
    #[must_use]
    pub fn transfer_destination(&self) -> Option<&str> {
        first_non_empty(self.transferred_to.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn first_non_empty(values: Option<&[String]>) -> Option<&str> {
    non_empty(values.and_then(|v| v.first()).map(String::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_renewal_event() {
        let event: RevenueCatEvent = serde_json::from_value(serde_json::json!({
            "id": "evt-1",
            "type": "RENEWAL",
            "app_user_id": "device-1",
            "product_id": "retouch_weekly_007",
            "expiration_at_ms": 1_900_000_000_000_i64,
            "environment": "PRODUCTION",
            "subscriber_attributes": {}
        }))
        .unwrap();

        assert_eq!(event.event_type, event_types::RENEWAL);
        assert_eq!(event.event_id(), Some("evt-1"));
        assert_eq!(event.product_id(), Some("retouch_weekly_007"));
        assert_eq!(event.expiration_at_ms, Some(1_900_000_000_000));
    }

    #[test]
    fn empty_strings_count_as_missing() {
        let event = RevenueCatEvent {
            app_user_id: Some(String::new()),
            transferred_from: Some(vec![String::new(), "b".into()]),
            transferred_to: Some(vec![]),
            ..RevenueCatEvent::default()
        };
        assert!(event.app_user_id().is_none());
        assert!(event.transfer_source().is_none());
        assert!(event.transfer_destination().is_none());
    }
}
