//! Product catalog: billing product ids to credit grants.
//!
//! The catalog mirrors the billing provider's product setup and is part of the
//! wire contract with it. It ships with built-in defaults and can be replaced by a
//! JSON document at startup.

use serde::{Deserialize, Serialize};

use crate::balance::SubscriptionStatus;
use crate::error::{BillingError, Result};

/// Built-in catalog version.
pub const DEFAULT_CATALOG_VERSION: u32 = 1;

/// Weekly plan credit grant.
pub const WEEKLY_CREDITS: i64 = 25;

/// Annual plan credit grant.
pub const ANNUAL_CREDITS: i64 = 140;

/// Promotional annual plan credit grant.
pub const ANNUAL_PROMOTIONAL_CREDITS: i64 = 85;

/// What a subscription product grants per billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionTier {
    /// Status the device moves to.
    pub status: SubscriptionStatus,
    /// Subscription credits set for the period.
    pub credits: i64,
}

impl SubscriptionTier {
    /// The tier for products the catalog does not know.
    pub const FREE: Self = Self {
        status: SubscriptionStatus::Free,
        credits: 0,
    };
}

/// A subscription product, matched by substring of the product id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionProduct {
    /// Substring that identifies the product (e.g. "007" for weekly SKUs).
    pub pattern: String,
    /// Status the device moves to.
    pub status: SubscriptionStatus,
    /// Credits granted per period.
    pub credits: i64,
}

/// A one-time top-up product, matched exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopUpProduct {
    /// Exact product id.
    pub product_id: String,
    /// Extra credits added.
    pub credits: i64,
}

/// Versioned mapping of billing product ids to credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCatalog {
    /// Catalog version, logged at startup.
    pub version: u32,
    /// Subscription products, checked in order; first match wins.
    pub subscriptions: Vec<SubscriptionProduct>,
    /// One-time top-up products.
    pub top_ups: Vec<TopUpProduct>,
}

impl Default for ProductCatalog {
    fn default() -> Self {
        let sub = |pattern: &str, status, credits| SubscriptionProduct {
            pattern: pattern.to_string(),
            status,
            credits,
        };
        let top_up = |credits: i64| TopUpProduct {
            product_id: credits.to_string(),
            credits,
        };

        Self {
            version: DEFAULT_CATALOG_VERSION,
            subscriptions: vec![
                sub("007", SubscriptionStatus::Weekly, WEEKLY_CREDITS),
                sub("365", SubscriptionStatus::Annual, ANNUAL_CREDITS),
                sub(
                    "182",
                    SubscriptionStatus::AnnualPromotional,
                    ANNUAL_PROMOTIONAL_CREDITS,
                ),
            ],
            top_ups: [100, 250, 400, 500, 1000].into_iter().map(top_up).collect(),
        }
    }
}

impl ProductCatalog {
    /// Parse and validate a catalog from JSON.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Configuration` if the JSON is malformed or the catalog
    /// fails validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Self = serde_json::from_str(json)
            .map_err(|e| BillingError::Configuration(format!("invalid catalog: {e}")))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check that every grant is non-negative and every key non-empty.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Configuration` describing the first bad entry.
    pub fn validate(&self) -> Result<()> {
        for product in &self.subscriptions {
            if product.pattern.is_empty() {
                return Err(BillingError::Configuration(
                    "subscription product with empty pattern".into(),
                ));
            }
            if product.credits < 0 {
                return Err(BillingError::Configuration(format!(
                    "negative credits for subscription pattern {}",
                    product.pattern
                )));
            }
        }
        for product in &self.top_ups {
            if product.product_id.is_empty() {
                return Err(BillingError::Configuration(
                    "top-up product with empty id".into(),
                ));
            }
            if product.credits < 0 {
                return Err(BillingError::Configuration(format!(
                    "negative credits for top-up {}",
                    product.product_id
                )));
            }
        }
        Ok(())
    }

    /// Resolve a subscription product id. Unknown ids map to [`SubscriptionTier::FREE`].
    #[must_use]
    pub fn subscription_tier(&self, product_id: &str) -> SubscriptionTier {
        self.subscriptions
            .iter()
            .find(|p| product_id.contains(p.pattern.as_str()))
            .map_or(SubscriptionTier::FREE, |p| SubscriptionTier {
                status: p.status,
                credits: p.credits,
            })
    }

    /// Resolve a top-up product id. Unknown ids grant nothing.
    #[must_use]
    pub fn top_up_credits(&self, product_id: &str) -> i64 {
        self.top_ups
            .iter()
            .find(|p| p.product_id == product_id)
            .map_or(0, |p| p.credits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_lookup_by_substring() {
        let catalog = ProductCatalog::default();
        assert_eq!(
            catalog.subscription_tier("retouch_weekly_007_v2"),
            SubscriptionTier {
                status: SubscriptionStatus::Weekly,
                credits: 25
            }
        );
        assert_eq!(catalog.subscription_tier("annual_365").credits, 140);
        assert_eq!(
            catalog.subscription_tier("promo_182").status,
            SubscriptionStatus::AnnualPromotional
        );
        assert_eq!(catalog.subscription_tier("lifetime"), SubscriptionTier::FREE);
    }

    #[test]
    fn subscription_lookup_first_match_wins() {
        let catalog = ProductCatalog::default();
        // Contains both "007" and "365"; weekly is listed first.
        assert_eq!(
            catalog.subscription_tier("007_365").status,
            SubscriptionStatus::Weekly
        );
    }

    #[test]
    fn top_up_lookup_is_exact() {
        let catalog = ProductCatalog::default();
        assert_eq!(catalog.top_up_credits("250"), 250);
        assert_eq!(catalog.top_up_credits("1000"), 1000);
        assert_eq!(catalog.top_up_credits("1000_pack"), 0);
        assert_eq!(catalog.top_up_credits("999"), 0);
    }

    #[test]
    fn catalog_from_json() {
        let json = r#"{
            "version": 2,
            "subscriptions": [{"pattern": "week", "status": "weekly", "credits": 30}],
            "top_ups": [{"product_id": "pack_50", "credits": 50}]
        }"#;
        let catalog = ProductCatalog::from_json(json).unwrap();
        assert_eq!(catalog.version, 2);
        assert_eq!(catalog.subscription_tier("pro_week").credits, 30);
        assert_eq!(catalog.top_up_credits("pack_50"), 50);
    }

    #[test]
    fn catalog_rejects_negative_grants() {
        let json = r#"{
            "version": 2,
            "subscriptions": [],
            "top_ups": [{"product_id": "bad", "credits": -5}]
        }"#;
        assert!(matches!(
            ProductCatalog::from_json(json),
            Err(BillingError::Configuration(_))
        ));
    }
}
