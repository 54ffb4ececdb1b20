//! Common test utilities for retouch integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use chrono::Utc;
use serde_json::{json, Value};
use tempfile::TempDir;

use retouch_core::{BalanceRecord, DeviceId};
use retouch_service::{create_router, AppState, CohortConfig, ServiceConfig};
use retouch_store::{RocksStore, Store};

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Direct store access for seeding and assertions.
    pub store: Arc<RocksStore>,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
}

impl TestHarness {
    /// Create a new test harness with a fresh database and default config.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Create a harness with a custom config. The fal client is built from
    /// `config.fal_key`/`config.fal_base_url` exactly as in production.
    pub fn with_config(config: ServiceConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open store"));

        let config = ServiceConfig {
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            ..config
        };

        let state = AppState::new(store.clone(), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            _temp_dir: temp_dir,
        }
    }

    /// Seed a balance record directly.
    pub fn seed(&self, device_id: &str, subscription_credits: i64, extra_credits: i64) {
        let mut record = BalanceRecord::new(device(device_id), Utc::now());
        record.subscription_credits = subscription_credits;
        record.extra_credits = extra_credits;
        self.store
            .upsert_device(&record)
            .expect("Failed to seed balance");
    }

    /// Read a balance record directly.
    pub fn balance(&self, device_id: &str) -> Option<BalanceRecord> {
        self.store
            .get_balance(&device(device_id))
            .expect("Failed to read balance")
    }

    /// POST a RevenueCat event and return the response body.
    pub async fn send_event(&self, event: Value) -> Value {
        let response = self
            .server
            .post("/api/revenuecat")
            .json(&json!({ "api_version": "1.0", "event": event }))
            .await;
        response.assert_status_ok();
        response.json()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Config used by most tests: deterministic cohort, no generator.
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        listen_addr: "127.0.0.1:0".into(),
        cohort: CohortConfig::Flat(1.0),
        ..ServiceConfig::default()
    }
}

/// Parse a device id.
pub fn device(id: &str) -> DeviceId {
    DeviceId::parse(id).expect("valid device id")
}
