//! fal.ai API client implementation.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use retouch_core::BillingError;

use super::types::{EditOutput, EditRequest, EditResponse, FalErrorResponse};
use super::ImageGenerator;

/// Header fal uses to return its request id.
const REQUEST_ID_HEADER: &str = "x-fal-request-id";

/// Error type for fal operations.
#[derive(Debug, thiserror::Error)]
pub enum FalError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// fal returned an error.
    #[error("fal API error: {status} - {error}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        error: String,
    },

    /// No generator is configured.
    #[error("image generation is not configured")]
    NotConfigured,
}

impl From<FalError> for BillingError {
    fn from(err: FalError) -> Self {
        Self::Upstream {
            service: "fal".to_string(),
            message: err.to_string(),
        }
    }
}

/// fal.ai synchronous-run client.
#[derive(Debug, Clone)]
pub struct FalClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl FalClient {
    /// Create a new fal client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - fal run URL (e.g., `"https://fal.run"`)
    /// * `model` - model path (e.g., `"fal-ai/nano-banana/edit"`)
    /// * `api_key` - fal API key
    /// * `timeout` - per-request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FalError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into().trim_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Run an image edit and wait for the result.
    pub async fn edit(&self, request: &EditRequest) -> Result<EditOutput, FalError> {
        let url = format!("{}/{}", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Key {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);

        let body: EditResponse = Self::handle_response(response).await?;

        tracing::debug!(
            model = %self.model,
            request_id = ?request_id,
            images = body.images.len(),
            "fal edit completed"
        );

        Ok(EditOutput {
            images: body.images,
            description: body.description,
            request_id,
        })
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, FalError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let error = match response.json::<FalErrorResponse>().await {
            Ok(FalErrorResponse {
                detail: Some(serde_json::Value::String(detail)),
            }) => detail,
            Ok(FalErrorResponse {
                detail: Some(detail),
            }) => detail.to_string(),
            _ => format!("HTTP {status}"),
        };

        Err(FalError::Api {
            status: status.as_u16(),
            error,
        })
    }
}

#[async_trait]
impl ImageGenerator for FalClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &EditRequest) -> Result<EditOutput, FalError> {
        self.edit(request).await
    }
}
