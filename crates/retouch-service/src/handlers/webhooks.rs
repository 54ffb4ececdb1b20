//! `RevenueCat` webhook handler.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::crypto::constant_time_eq;
use crate::error::ApiError;
use crate::events::EventOutcome;
use crate::revenuecat::{RevenueCatEvent, WebhookEnvelope};
use crate::state::AppState;

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was received.
    pub received: bool,
    /// What happened to the event.
    pub outcome: EventOutcome,
}

/// Handle `RevenueCat` webhooks.
///
/// Every structurally valid envelope is acknowledged with 200 so `RevenueCat` does not
/// retry events this service has chosen to skip.
pub async fn revenuecat_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    if let Some(expected) = &state.config.revenuecat_webhook_auth {
        let provided = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if !constant_time_eq(provided, expected) {
            tracing::warn!("Invalid RevenueCat webhook authorization");
            return Err(ApiError::Unauthorized);
        }
    } else {
        tracing::debug!("RevenueCat webhook auth not configured - skipping verification");
    }

    let envelope: WebhookEnvelope =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let Some(raw_event) = envelope.event.filter(serde_json::Value::is_object) else {
        return Err(ApiError::BadRequest("Invalid webhook payload".into()));
    };

    let outcome = match serde_json::from_value::<RevenueCatEvent>(raw_event) {
        Ok(event) => {
            tracing::info!(
                event_id = ?event.event_id(),
                event_type = %event.event_type,
                environment = ?event.environment,
                api_version = ?envelope.api_version,
                "Received RevenueCat webhook"
            );
            state.events.process(&event)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Malformed RevenueCat event, skipping");
            EventOutcome::Skipped
        }
    };

    Ok(Json(WebhookResponse {
        received: true,
        outcome,
    }))
}
