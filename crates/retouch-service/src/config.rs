//! Service configuration.

use serde::Deserialize;
use std::path::Path;

use retouch_core::{BillingError, ProductCatalog, RegionalProbability, StartingGrant};

/// Default fal.ai synchronous run endpoint.
pub const DEFAULT_FAL_BASE_URL: &str = "https://fal.run";

/// Default image-editing model.
pub const DEFAULT_FAL_MODEL: &str = "fal-ai/nano-banana/edit";

/// Which storage backend the binary opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// `RocksDB` under `data_dir`.
    RocksDb,
    /// Process-local maps; state is lost on restart.
    Memory,
}

impl StoreBackend {
    fn from_env_value(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Self::Memory,
            "rocksdb" | "rocks" => Self::RocksDb,
            other => {
                tracing::warn!(value = %other, "Unknown STORE_BACKEND, using rocksdb");
                Self::RocksDb
            }
        }
    }
}

/// How new devices are assigned to the onboarding cohort.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CohortConfig {
    /// Same probability for every device.
    Flat(f64),
    /// Probability chosen from the device locale.
    Regional(RegionalProbability),
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/retouch").
    pub data_dir: String,

    /// Storage backend (default: `RocksDb`).
    pub store_backend: StoreBackend,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds. Generation calls can take a while.
    pub request_timeout_seconds: u64,

    /// Expected `Authorization` header value on billing webhooks (optional).
    pub revenuecat_webhook_auth: Option<String>,

    /// fal.ai API key. Generation is disabled without one.
    pub fal_key: Option<String>,

    /// fal.ai base URL.
    pub fal_base_url: String,

    /// fal.ai model path.
    pub fal_model: String,

    /// Credits charged per generation.
    pub generation_cost: i64,

    /// Cohort assignment for new devices.
    pub cohort: CohortConfig,

    /// Starting credits per cohort.
    pub starting_grant: StartingGrant,

    /// Product catalog used by the billing event processor.
    pub catalog: ProductCatalog,
}

/// fal.ai secrets file structure.
#[derive(Debug, Deserialize)]
struct FalSecrets {
    api_key: String,
    #[serde(default)]
    base_url: Option<String>,
}

/// `RevenueCat` secrets file structure.
#[derive(Debug, Deserialize)]
struct RevenueCatSecrets {
    webhook_auth: String,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Configuration`] if a loaded value fails
    /// [`ServiceConfig::validate`].
    pub fn from_env() -> Result<Self, BillingError> {
        let defaults = Self::default();

        let (fal_key, fal_base_url) = load_fal_secrets();
        let probability = env_parse("COHORT_PROBABILITY").unwrap_or(1.0);

        let cohort = match std::env::var("COHORT_POLICY").as_deref() {
            Ok("regional") => CohortConfig::Regional(RegionalProbability {
                us: env_parse("COHORT_PROBABILITY_US").unwrap_or(probability),
                eu: env_parse("COHORT_PROBABILITY_EU").unwrap_or(probability),
                other: env_parse("COHORT_PROBABILITY_OTHER").unwrap_or(probability),
            }),
            _ => CohortConfig::Flat(probability),
        };

        let config = Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            store_backend: std::env::var("STORE_BACKEND")
                .map_or(StoreBackend::RocksDb, |v| StoreBackend::from_env_value(&v)),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
            revenuecat_webhook_auth: load_revenuecat_secrets(),
            fal_key,
            fal_base_url: fal_base_url.unwrap_or(defaults.fal_base_url),
            fal_model: std::env::var("FAL_MODEL").unwrap_or(defaults.fal_model),
            generation_cost: env_parse("GENERATION_COST").unwrap_or(defaults.generation_cost),
            cohort,
            starting_grant: StartingGrant {
                accelerated: env_parse("STARTING_CREDITS_ACCELERATED")
                    .unwrap_or(defaults.starting_grant.accelerated),
                standard: env_parse("STARTING_CREDITS_STANDARD")
                    .unwrap_or(defaults.starting_grant.standard),
            },
            catalog: load_catalog(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the billing values: a generation must cost at least one credit and
    /// starting grants cannot be negative.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Configuration`] naming the offending setting.
    pub fn validate(&self) -> Result<(), BillingError> {
        if self.generation_cost <= 0 {
            return Err(BillingError::Configuration(format!(
                "GENERATION_COST must be positive, got {}",
                self.generation_cost
            )));
        }
        if self.starting_grant.accelerated < 0 {
            return Err(BillingError::Configuration(format!(
                "STARTING_CREDITS_ACCELERATED must not be negative, got {}",
                self.starting_grant.accelerated
            )));
        }
        if self.starting_grant.standard < 0 {
            return Err(BillingError::Configuration(format!(
                "STARTING_CREDITS_STANDARD must not be negative, got {}",
                self.starting_grant.standard
            )));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Load the product catalog from `CATALOG_PATH`, falling back to the built-in one.
fn load_catalog() -> ProductCatalog {
    let Ok(path) = std::env::var("CATALOG_PATH") else {
        return ProductCatalog::default();
    };

    match std::fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|json| ProductCatalog::from_json(&json).map_err(|e| e.to_string()))
    {
        Ok(catalog) => {
            tracing::info!(path = %path, version = catalog.version, "Loaded product catalog");
            catalog
        }
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Failed to load product catalog, using built-in");
            ProductCatalog::default()
        }
    }
}

/// Load fal.ai secrets from file or environment.
fn load_fal_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [
        ".secrets/fal.json",
        "retouch/.secrets/fal.json",
        "../.secrets/fal.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<FalSecrets>(path) {
            tracing::info!(path = %path, "Loaded fal secrets from file");
            return (
                Some(secrets.api_key),
                secrets.base_url.or_else(|| std::env::var("FAL_BASE_URL").ok()),
            );
        }
    }

    tracing::debug!("fal secrets file not found, using environment variables");
    (
        std::env::var("FAL_KEY").ok(),
        std::env::var("FAL_BASE_URL").ok(),
    )
}

/// Load the `RevenueCat` webhook authorization value from file or environment.
fn load_revenuecat_secrets() -> Option<String> {
    let secret_paths = [
        ".secrets/revenuecat.json",
        "retouch/.secrets/revenuecat.json",
        "../.secrets/revenuecat.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<RevenueCatSecrets>(path) {
            tracing::info!(path = %path, "Loaded RevenueCat secrets from file");
            return Some(secrets.webhook_auth);
        }
    }

    std::env::var("REVENUECAT_WEBHOOK_AUTH").ok()
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/retouch".into(),
            store_backend: StoreBackend::RocksDb,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 60,
            revenuecat_webhook_auth: None,
            fal_key: None,
            fal_base_url: DEFAULT_FAL_BASE_URL.into(),
            fal_model: DEFAULT_FAL_MODEL.into(),
            generation_cost: 1,
            cohort: CohortConfig::Flat(1.0),
            starting_grant: StartingGrant::default(),
            catalog: ProductCatalog::default(),
        }
    }
}
