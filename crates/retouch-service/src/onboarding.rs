//! First-contact onboarding.

use std::sync::Arc;

use chrono::Utc;

use retouch_core::{BalanceRecord, CohortPolicy, DeviceId, DeviceProfile, Result, StartingGrant};
use retouch_store::{Store, UpsertOutcome};

/// Result of [`OnboardingAssigner::onboard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Onboarding {
    /// A record was created with this cohort flag.
    Created {
        /// The persisted cohort flag.
        cohort_flag: bool,
    },
    /// The device was already known; only its metadata changed.
    Updated,
}

/// Seeds a balance record the first time a device is seen.
///
/// The cohort is drawn before the write and only persisted if the write inserts; an
/// existing record keeps its original cohort and balance.
#[derive(Clone)]
pub struct OnboardingAssigner {
    store: Arc<dyn Store>,
    policy: Arc<dyn CohortPolicy>,
    grant: StartingGrant,
}

impl OnboardingAssigner {
    /// Create an assigner.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        policy: Arc<dyn CohortPolicy>,
        grant: StartingGrant,
    ) -> Self {
        Self {
            store,
            policy,
            grant,
        }
    }

    /// Create the device's record or refresh its metadata, in one upsert.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the write fails.
    pub fn onboard(&self, device_id: &DeviceId, device: DeviceProfile) -> Result<Onboarding> {
        let cohort_flag = self.policy.assign(&device);
        let seed = BalanceRecord::onboarded(
            device_id.clone(),
            device,
            cohort_flag,
            self.grant.credits_for(cohort_flag),
            Utc::now(),
        );

        match self.store.upsert_device(&seed)? {
            UpsertOutcome::Inserted(record) => {
                tracing::info!(
                    device_id = %device_id,
                    cohort_flag = record.cohort_flag,
                    starting_credits = record.subscription_credits,
                    "New device onboarded"
                );
                Ok(Onboarding::Created {
                    cohort_flag: record.cohort_flag,
                })
            }
            UpsertOutcome::Updated(_) => {
                tracing::debug!(device_id = %device_id, "Device metadata updated");
                Ok(Onboarding::Updated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retouch_core::FixedCohort;
    use retouch_store::MemoryStore;

    fn assigner(store: &Arc<MemoryStore>, flag: bool) -> OnboardingAssigner {
        OnboardingAssigner::new(
            store.clone(),
            Arc::new(FixedCohort(flag)),
            StartingGrant::default(),
        )
    }

    #[test]
    fn onboarding_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let id = DeviceId::parse("phone").unwrap();

        let first = assigner(&store, true)
            .onboard(&id, DeviceProfile::default())
            .unwrap();
        assert_eq!(first, Onboarding::Created { cohort_flag: true });

        let profile = DeviceProfile {
            os_version: Some("18.1".into()),
            ..DeviceProfile::default()
        };
        // A second call with a policy that would now say `false` changes nothing.
        let second = assigner(&store, false).onboard(&id, profile).unwrap();
        assert_eq!(second, Onboarding::Updated);

        let record = store.get_balance(&id).unwrap().unwrap();
        assert!(record.cohort_flag);
        assert_eq!(record.subscription_credits, 2);
        assert_eq!(record.extra_credits, 0);
        assert_eq!(record.device.os_version.as_deref(), Some("18.1"));
    }

    #[test]
    fn standard_cohort_gets_standard_grant() {
        let store = Arc::new(MemoryStore::new());
        let id = DeviceId::parse("phone").unwrap();

        let outcome = assigner(&store, false)
            .onboard(&id, DeviceProfile::default())
            .unwrap();
        assert_eq!(outcome, Onboarding::Created { cohort_flag: false });
        assert_eq!(
            store.get_balance(&id).unwrap().unwrap().subscription_credits,
            1
        );
    }
}
