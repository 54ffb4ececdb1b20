//! Device onboarding handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use retouch_core::{DeviceId, DeviceProfile};

use crate::error::ApiError;
use crate::onboarding::Onboarding;
use crate::state::AppState;

/// Device info request, as sent by the mobile client.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfoRequest {
    /// Client-generated device id.
    pub device_id: Option<String>,
    /// Hardware model.
    pub device_model: Option<String>,
    /// OS version.
    pub os_version: Option<String>,
    /// Preferred language.
    pub language: Option<String>,
    /// Locale identifier.
    pub locale: Option<String>,
    /// App version.
    pub app_version: Option<String>,
    /// Last time the app was used.
    pub latest_used_time: Option<String>,
    /// IANA timezone.
    pub time_zone: Option<String>,
}

impl DeviceInfoRequest {
    fn into_profile(self) -> DeviceProfile {
        DeviceProfile {
            device_model: self.device_model,
            os_version: self.os_version,
            language: self.language,
            locale: self.locale,
            app_version: self.app_version,
            latest_used_time: self.latest_used_time,
            time_zone: self.time_zone,
        }
    }
}

/// Device info response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfoResponse {
    /// `created` or `updated`.
    pub status: &'static str,
    /// Cohort flag, only on creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub should_start: Option<bool>,
}

/// Register a device or refresh its metadata.
pub async fn device_info(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<DeviceInfoResponse>, ApiError> {
    let request: DeviceInfoRequest = serde_json::from_str(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?;

    let device_id = DeviceId::parse_opt(request.device_id.as_deref())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let response = match state.onboarding.onboard(&device_id, request.into_profile())? {
        Onboarding::Created { cohort_flag } => DeviceInfoResponse {
            status: "created",
            should_start: Some(cohort_flag),
        },
        Onboarding::Updated => DeviceInfoResponse {
            status: "updated",
            should_start: None,
        },
    };

    Ok(Json(response))
}
