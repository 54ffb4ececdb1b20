//! Onboarding cohort assignment and starting grants.
//!
//! A device's cohort ("shouldStart") is drawn once when its record is created and
//! never recomputed. The draw is behind [`CohortPolicy`] so the experiment can change
//! without touching the credit-seeding logic, which only reads the resulting flag.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::balance::DeviceProfile;

/// Starting credits for devices in the accelerated cohort.
pub const ACCELERATED_STARTING_CREDITS: i64 = 2;

/// Starting credits for devices in the standard cohort.
pub const STANDARD_STARTING_CREDITS: i64 = 1;

/// Country codes in the EU bucket of [`RegionalProbability`].
///
/// ES, FR, IS and IE are deliberately absent.
pub const EU_COUNTRY_CODES: &[&str] = &[
    "AT", "BE", "BG", "HR", "CY", "CZ", "DK", "EE", "FI", "DE", "GR", "HU", "IT", "LV", "LT",
    "LU", "MT", "NL", "PL", "PT", "RO", "SK", "SI", "SE", "GB", "NO", "CH", "LI",
];

/// Decides the cohort flag for a newly seen device.
pub trait CohortPolicy: Send + Sync {
    /// Return `true` to place the device in the accelerated cohort.
    fn assign(&self, device: &DeviceProfile) -> bool;
}

/// Weighted coin flip, the same for every device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlatProbability {
    /// Probability of the accelerated cohort. Values outside `[0, 1]` are clamped.
    pub probability: f64,
}

impl FlatProbability {
    /// Create a flat policy.
    #[must_use]
    pub const fn new(probability: f64) -> Self {
        Self { probability }
    }
}

impl Default for FlatProbability {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl CohortPolicy for FlatProbability {
    fn assign(&self, _device: &DeviceProfile) -> bool {
        flip(self.probability)
    }
}

/// Per-region coin flip keyed off the locale string.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionalProbability {
    /// Probability for locales containing "US".
    pub us: f64,
    /// Probability for locales containing an [`EU_COUNTRY_CODES`] entry.
    pub eu: f64,
    /// Probability for everything else.
    pub other: f64,
}

impl RegionalProbability {
    /// Probability that applies to `device`.
    #[must_use]
    pub fn probability_for(&self, device: &DeviceProfile) -> f64 {
        let locale = device
            .locale
            .as_deref()
            .unwrap_or_default()
            .to_uppercase();

        if locale.contains("US") {
            self.us
        } else if EU_COUNTRY_CODES.iter().any(|code| locale.contains(code)) {
            self.eu
        } else {
            self.other
        }
    }
}

impl CohortPolicy for RegionalProbability {
    fn assign(&self, device: &DeviceProfile) -> bool {
        flip(self.probability_for(device))
    }
}

/// Always returns the same flag. Useful for pinning a cohort in tests and staging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedCohort(pub bool);

impl CohortPolicy for FixedCohort {
    fn assign(&self, _device: &DeviceProfile) -> bool {
        self.0
    }
}

/// Starting subscription credits per cohort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartingGrant {
    /// Credits for the accelerated cohort.
    pub accelerated: i64,
    /// Credits for the standard cohort.
    pub standard: i64,
}

impl StartingGrant {
    /// Starting credits for a cohort flag.
    #[must_use]
    pub const fn credits_for(&self, cohort_flag: bool) -> i64 {
        if cohort_flag {
            self.accelerated
        } else {
            self.standard
        }
    }
}

impl Default for StartingGrant {
    fn default() -> Self {
        Self {
            accelerated: ACCELERATED_STARTING_CREDITS,
            standard: STANDARD_STARTING_CREDITS,
        }
    }
}

fn flip(probability: f64) -> bool {
    if probability.is_nan() {
        return false;
    }
    rand::thread_rng().gen_bool(probability.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_locale(locale: &str) -> DeviceProfile {
        DeviceProfile {
            locale: Some(locale.to_string()),
            ..DeviceProfile::default()
        }
    }

    #[test]
    fn flat_probability_extremes_are_deterministic() {
        let device = DeviceProfile::default();
        for _ in 0..32 {
            assert!(FlatProbability::new(1.0).assign(&device));
            assert!(!FlatProbability::new(0.0).assign(&device));
        }
    }

    #[test]
    fn flat_probability_clamps_out_of_range() {
        let device = DeviceProfile::default();
        assert!(FlatProbability::new(1.35).assign(&device));
        assert!(!FlatProbability::new(-0.5).assign(&device));
        assert!(!FlatProbability::new(f64::NAN).assign(&device));
    }

    #[test]
    fn regional_buckets() {
        let policy = RegionalProbability {
            us: 0.1,
            eu: 0.4,
            other: 0.7,
        };
        assert!((policy.probability_for(&with_locale("en_US")) - 0.1).abs() < f64::EPSILON);
        assert!((policy.probability_for(&with_locale("de_DE")) - 0.4).abs() < f64::EPSILON);
        assert!((policy.probability_for(&with_locale("fr_FR")) - 0.7).abs() < f64::EPSILON);
        assert!((policy.probability_for(&DeviceProfile::default()) - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn starting_grant_per_cohort() {
        let grant = StartingGrant::default();
        assert_eq!(grant.credits_for(true), 2);
        assert_eq!(grant.credits_for(false), 1);
    }
}
