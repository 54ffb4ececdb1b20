//! Billable image generation handler.
//!
//! Read-check, then the paid provider call, then a single deduction. A failed
//! provider call never consumes credit.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use retouch_core::{BillingError, DeviceId, GeneratedImage, GenerationId, GenerationRecord};

use crate::error::ApiError;
use crate::fal::{EditRequest, FalError};
use crate::state::AppState;

/// Query parameters; `deviceId` may come from the query string instead of the body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQuery {
    /// Device to charge.
    pub device_id: Option<String>,
}

/// Generation request.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    /// Device to charge.
    #[serde(rename = "deviceId")]
    pub device_id: Option<String>,
    /// Prompt, forwarded unchanged.
    pub prompt: Option<String>,
    /// Source images.
    pub image_urls: Option<Vec<String>>,
    /// Number of output images.
    pub num_images: Option<u32>,
    /// Output format.
    pub output_format: Option<String>,
    /// Return data URIs instead of hosted URLs.
    pub sync_mode: Option<bool>,
    /// Style tag, echoed back and recorded.
    pub style: Option<String>,
}

/// Generation response.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    /// Output images.
    pub images: Vec<GeneratedImage>,
    /// Model commentary.
    pub description: Option<String>,
    /// Style tag from the request.
    pub style: Option<String>,
}

/// Run a paid generation for a device.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GenerateQuery>,
    body: String,
) -> Result<Json<GenerateResponse>, ApiError> {
    let request: GenerateRequest = if body.trim().is_empty() {
        GenerateRequest::default()
    } else {
        serde_json::from_str(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?
    };

    let raw_device_id = request.device_id.or(query.device_id);
    let prompt = request.prompt.filter(|p| !p.is_empty());
    let image_urls = request.image_urls.filter(|urls| !urls.is_empty());

    let (Some(prompt), Some(image_urls)) = (prompt, image_urls) else {
        return Err(ApiError::BadRequest(
            "Prompt, device identifier, and image_urls are required".into(),
        ));
    };
    let device_id = DeviceId::parse_opt(raw_device_id.as_deref())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let cost = state.config.generation_cost;
    state.ledger.ensure_available(&device_id, cost)?;

    let generator = state
        .generator
        .as_ref()
        .ok_or_else(|| BillingError::from(FalError::NotConfigured))?;

    let edit = EditRequest::new(
        prompt.clone(),
        image_urls,
        request.num_images,
        request.output_format,
        request.sync_mode,
    );

    let output = generator
        .generate(&edit)
        .await
        .map_err(|e| ApiError::from(BillingError::from(e)))?;

    if let Err(e) = state.ledger.deduct(&device_id, cost) {
        tracing::error!(
            device_id = %device_id,
            request_id = ?output.request_id,
            error = %e,
            "Paid action completed but deduction failed"
        );
        return Err(ApiError::Internal(format!("deduction failed: {e}")));
    }

    let record = GenerationRecord {
        id: GenerationId::generate(),
        device_id: device_id.clone(),
        prompt,
        style: request.style.clone(),
        model: generator.model().to_string(),
        provider_request_id: output.request_id,
        images: output.images.clone(),
        description: output.description.clone(),
        cost,
        created_at: Utc::now(),
    };
    if let Err(e) = state.store.put_generation(&record) {
        tracing::warn!(device_id = %device_id, generation_id = %record.id, error = %e, "Failed to record generation");
    }

    tracing::info!(
        device_id = %device_id,
        generation_id = %record.id,
        images = record.images.len(),
        "Generation completed"
    );

    Ok(Json(GenerateResponse {
        images: output.images,
        description: output.description,
        style: request.style,
    }))
}
