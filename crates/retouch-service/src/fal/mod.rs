//! Image generation through fal.ai.
//!
//! Handlers talk to an [`ImageGenerator`]; [`FalClient`] is the production
//! implementation and tests substitute a mock server or a stub generator.

pub mod client;
pub mod types;

use async_trait::async_trait;

pub use client::{FalClient, FalError};
pub use types::*;

/// Runs one paid image-editing request.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Model identifier recorded with each generation.
    fn model(&self) -> &str;

    /// Run the edit and wait for the result.
    async fn generate(&self, request: &EditRequest) -> Result<EditOutput, FalError>;
}
