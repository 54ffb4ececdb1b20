//! Credit balance handler.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use retouch_core::{BillingError, DeviceId};

use crate::error::ApiError;
use crate::state::AppState;

/// Balance query parameters.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditsQuery {
    /// Device to read.
    pub device_id: Option<String>,
}

/// Balance response, in the shape the mobile client reads.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditsResponse {
    /// Subscription credits.
    pub credits: i64,
    /// Extra (top-up) credits.
    pub extra_credits: i64,
}

/// Get a device's credit balance.
///
/// An unknown device is reported as an opaque internal error; clients are expected
/// to call `device_info` first.
pub async fn get_credits(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CreditsQuery>,
) -> Result<Json<CreditsResponse>, ApiError> {
    let device_id = DeviceId::parse_opt(query.device_id.as_deref())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let balance = state.ledger.read_balance(&device_id).map_err(|e| match e {
        BillingError::DeviceNotFound { device_id } => {
            ApiError::Internal(format!("balance requested for unknown device {device_id}"))
        }
        other => other.into(),
    })?;

    Ok(Json(CreditsResponse {
        credits: balance.subscription_credits,
        extra_credits: balance.extra_credits,
    }))
}
