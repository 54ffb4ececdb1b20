//! fal.ai API types.

use serde::{Deserialize, Serialize};

use retouch_core::GeneratedImage;

/// Default number of images requested.
pub const DEFAULT_NUM_IMAGES: u32 = 1;

/// Default output format.
pub const DEFAULT_OUTPUT_FORMAT: &str = "jpeg";

/// Image edit request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditRequest {
    /// Prompt forwarded to the model.
    pub prompt: String,
    /// Source images.
    pub image_urls: Vec<String>,
    /// Number of output images.
    pub num_images: u32,
    /// `jpeg` or `png`.
    pub output_format: String,
    /// Return data URIs instead of hosted URLs.
    pub sync_mode: bool,
}

impl EditRequest {
    /// Build a request, filling unset options with the defaults.
    #[must_use]
    pub fn new(
        prompt: String,
        image_urls: Vec<String>,
        num_images: Option<u32>,
        output_format: Option<String>,
        sync_mode: Option<bool>,
    ) -> Self {
        Self {
            prompt,
            image_urls,
            num_images: num_images.unwrap_or(DEFAULT_NUM_IMAGES),
            output_format: output_format.unwrap_or_else(|| DEFAULT_OUTPUT_FORMAT.to_string()),
            sync_mode: sync_mode.unwrap_or(false),
        }
    }
}

/// Image edit response body.
#[derive(Debug, Clone, Deserialize)]
pub struct EditResponse {
    /// Output images.
    #[serde(default)]
    pub images: Vec<GeneratedImage>,
    /// Model commentary on the result.
    #[serde(default)]
    pub description: Option<String>,
}

/// A completed edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutput {
    /// Output images.
    pub images: Vec<GeneratedImage>,
    /// Model commentary on the result.
    pub description: Option<String>,
    /// fal request id, if the response carried one.
    pub request_id: Option<String>,
}

/// fal.ai error response.
#[derive(Debug, Clone, Deserialize)]
pub struct FalErrorResponse {
    /// Error detail; a string or a list of validation errors.
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}
