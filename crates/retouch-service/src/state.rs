//! Application state.

use std::sync::Arc;
use std::time::Duration;

use retouch_core::{CohortPolicy, FlatProbability};
use retouch_store::Store;

use crate::config::{CohortConfig, ServiceConfig};
use crate::events::SubscriptionEventProcessor;
use crate::fal::{FalClient, ImageGenerator};
use crate::ledger::CreditLedger;
use crate::onboarding::OnboardingAssigner;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Credit ledger.
    pub ledger: CreditLedger,

    /// First-contact onboarding.
    pub onboarding: OnboardingAssigner,

    /// Billing event processor.
    pub events: SubscriptionEventProcessor,

    /// Image generator (optional).
    pub generator: Option<Arc<dyn ImageGenerator>>,
}

impl AppState {
    /// Create a new application state, building the fal client from `config`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let generator = config.fal_key.as_ref().and_then(|key| {
            match FalClient::new(
                &config.fal_base_url,
                &config.fal_model,
                key,
                Duration::from_secs(config.request_timeout_seconds),
            ) {
                Ok(client) => {
                    tracing::info!(fal_url = %config.fal_base_url, model = %config.fal_model, "fal integration enabled");
                    Some(Arc::new(client) as Arc<dyn ImageGenerator>)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create fal client");
                    None
                }
            }
        });

        if generator.is_none() {
            tracing::warn!("fal not configured - generation requests will fail");
        }

        Self::with_generator(store, config, generator)
    }

    /// Create application state with an explicit generator.
    #[must_use]
    pub fn with_generator(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        generator: Option<Arc<dyn ImageGenerator>>,
    ) -> Self {
        let policy: Arc<dyn CohortPolicy> = match config.cohort {
            CohortConfig::Flat(probability) => Arc::new(FlatProbability::new(probability)),
            CohortConfig::Regional(regional) => Arc::new(regional),
        };

        let ledger = CreditLedger::new(store.clone());
        let onboarding =
            OnboardingAssigner::new(store.clone(), policy, config.starting_grant);
        let events =
            SubscriptionEventProcessor::new(store.clone(), Arc::new(config.catalog.clone()));

        Self {
            store,
            config,
            ledger,
            onboarding,
            events,
            generator,
        }
    }
}
