//! API handlers.

pub mod credits;
pub mod devices;
pub mod generate;
pub mod health;
pub mod webhooks;
