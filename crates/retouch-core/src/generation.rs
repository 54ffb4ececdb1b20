//! Records of completed billable generations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DeviceId, GenerationId};

/// One output image returned by the generation provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    /// Public URL of the image.
    pub url: String,
    /// MIME type, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// File name, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Pixel width, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Pixel height, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// A completed, paid generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// Unique generation ID (ULID for time-ordering).
    pub id: GenerationId,
    /// The device that paid for the generation.
    pub device_id: DeviceId,
    /// Prompt as sent by the client.
    pub prompt: String,
    /// Style tag sent by the client, if any.
    pub style: Option<String>,
    /// Provider model used.
    pub model: String,
    /// Provider-side request id, if the provider returned one.
    pub provider_request_id: Option<String>,
    /// Output images.
    pub images: Vec<GeneratedImage>,
    /// Provider's description of the result.
    pub description: Option<String>,
    /// Credits charged.
    pub cost: i64,
    /// When the generation completed.
    pub created_at: DateTime<Utc>,
}
