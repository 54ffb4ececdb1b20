//! Balance record types.
//!
//! A [`BalanceRecord`] is the single per-device document every component writes to.
//! Mutations other than deductions are expressed as [`BalanceUpdate`] documents so a
//! store can apply them as one atomic per-record write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::SubscriptionTier;
use crate::DeviceId;

/// Subscription status of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubscriptionStatus {
    /// No active subscription.
    #[default]
    Free,
    /// Weekly subscription.
    Weekly,
    /// Annual subscription.
    Annual,
    /// Discounted annual subscription.
    AnnualPromotional,
}

impl SubscriptionStatus {
    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Weekly => "weekly",
            Self::Annual => "annual",
            Self::AnnualPromotional => "annual-promotional",
        }
    }
}

/// Mutable device metadata reported at onboarding.
///
/// Every field is optional; the client sends what it has.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Hardware model (e.g. "iPhone15,2").
    pub device_model: Option<String>,
    /// OS version string.
    pub os_version: Option<String>,
    /// Preferred language.
    pub language: Option<String>,
    /// Locale identifier (e.g. "en_US").
    pub locale: Option<String>,
    /// Installed app version.
    pub app_version: Option<String>,
    /// Last time the client reports having used the app.
    pub latest_used_time: Option<String>,
    /// IANA timezone name.
    pub time_zone: Option<String>,
}

/// The two spendable credit pools of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBalance {
    /// Credits granted by the active subscription period.
    pub subscription_credits: i64,
    /// Credits from one-time top-ups.
    pub extra_credits: i64,
}

impl CreditBalance {
    /// Create a balance from its two pools.
    #[must_use]
    pub const fn new(subscription_credits: i64, extra_credits: i64) -> Self {
        Self {
            subscription_credits,
            extra_credits,
        }
    }

    /// Total spendable credits.
    #[must_use]
    pub const fn total(&self) -> i64 {
        self.subscription_credits + self.extra_credits
    }

    /// Split `amount` across the pools, subscription credits first.
    ///
    /// Returns `None` when the balance cannot cover the amount.
    #[must_use]
    pub fn plan_debit(&self, amount: i64) -> Option<Debit> {
        if amount <= 0 || self.total() < amount {
            return None;
        }
        let from_subscription = self.subscription_credits.clamp(0, amount);
        let from_extra = amount - from_subscription;
        if from_extra > self.extra_credits {
            return None;
        }
        Some(Debit {
            from_subscription,
            from_extra,
        })
    }

    /// The balance left after applying `debit`.
    #[must_use]
    pub const fn after(&self, debit: &Debit) -> Self {
        Self {
            subscription_credits: self.subscription_credits - debit.from_subscription,
            extra_credits: self.extra_credits - debit.from_extra,
        }
    }
}

/// How a deduction is split between the two pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Debit {
    /// Credits taken from the subscription pool.
    pub from_subscription: i64,
    /// Credits taken from the extra pool.
    pub from_extra: i64,
}

impl Debit {
    /// Total amount debited.
    #[must_use]
    pub const fn amount(&self) -> i64 {
        self.from_subscription + self.from_extra
    }
}

/// A per-device balance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    /// The device this record belongs to.
    pub device_id: DeviceId,

    /// Credits from the current subscription period.
    #[serde(default)]
    pub subscription_credits: i64,

    /// Credits from one-time top-ups.
    #[serde(default)]
    pub extra_credits: i64,

    /// Lifetime credits spent.
    #[serde(default)]
    pub total_credits_spent: i64,

    /// Current subscription status.
    #[serde(default)]
    pub subscription_status: SubscriptionStatus,

    /// When the current subscription period ends.
    #[serde(default)]
    pub subscription_expires_at: Option<DateTime<Utc>>,

    /// Onboarding cohort ("shouldStart"), fixed at creation.
    #[serde(default)]
    pub cohort_flag: bool,

    /// Device this record received a subscription transfer from.
    #[serde(default)]
    pub transferred_from: Option<DeviceId>,

    /// Device this record's subscription was transferred to.
    #[serde(default)]
    pub transferred_to: Option<DeviceId>,

    /// Device metadata from the last onboarding call.
    #[serde(default)]
    pub device: DeviceProfile,

    /// When subscription credits were last granted.
    #[serde(default)]
    pub last_credit_update: Option<DateTime<Utc>>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl BalanceRecord {
    /// Create an empty free-tier record.
    #[must_use]
    pub fn new(device_id: DeviceId, now: DateTime<Utc>) -> Self {
        Self {
            device_id,
            subscription_credits: 0,
            extra_credits: 0,
            total_credits_spent: 0,
            subscription_status: SubscriptionStatus::Free,
            subscription_expires_at: None,
            cohort_flag: false,
            transferred_from: None,
            transferred_to: None,
            device: DeviceProfile::default(),
            last_credit_update: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create the record for a device seen for the first time at onboarding.
    #[must_use]
    pub fn onboarded(
        device_id: DeviceId,
        device: DeviceProfile,
        cohort_flag: bool,
        starting_credits: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            subscription_credits: starting_credits.max(0),
            cohort_flag,
            device,
            ..Self::new(device_id, now)
        }
    }

    /// The spendable pools.
    #[must_use]
    pub const fn credits(&self) -> CreditBalance {
        CreditBalance::new(self.subscription_credits, self.extra_credits)
    }

    /// Apply a deduction and bump the spend counter.
    pub fn apply_debit(&mut self, debit: &Debit, now: DateTime<Utc>) {
        self.subscription_credits -= debit.from_subscription;
        self.extra_credits -= debit.from_extra;
        self.total_credits_spent += debit.amount();
        self.updated_at = now;
    }

    /// Apply an unconditional update document.
    pub fn apply(&mut self, update: &BalanceUpdate, now: DateTime<Utc>) {
        if let Some(credits) = update.set_subscription_credits {
            self.subscription_credits = credits;
        }
        if let Some(credits) = update.set_extra_credits {
            self.extra_credits = credits;
        }
        self.extra_credits += update.inc_extra_credits;
        if let Some(status) = update.set_subscription_status {
            self.subscription_status = status;
        }
        if let Some(expires_at) = update.set_subscription_expires_at {
            self.subscription_expires_at = expires_at;
        }
        if let Some(from) = &update.set_transferred_from {
            self.transferred_from = Some(from.clone());
        }
        if let Some(to) = &update.set_transferred_to {
            self.transferred_to = Some(to.clone());
        }
        if update.stamp_credit_update {
            self.last_credit_update = Some(now);
        }
        self.updated_at = now;
    }
}

/// An unconditional `set`/`inc` update against one balance record.
///
/// Fields left at their defaults are not touched. `updated_at` is always set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceUpdate {
    /// Overwrite subscription credits.
    pub set_subscription_credits: Option<i64>,
    /// Overwrite extra credits.
    pub set_extra_credits: Option<i64>,
    /// Add to extra credits (applied after `set_extra_credits`).
    pub inc_extra_credits: i64,
    /// Overwrite subscription status.
    pub set_subscription_status: Option<SubscriptionStatus>,
    /// Overwrite expiry; `Some(None)` clears it.
    pub set_subscription_expires_at: Option<Option<DateTime<Utc>>>,
    /// Stamp the transfer source.
    pub set_transferred_from: Option<DeviceId>,
    /// Stamp the transfer destination.
    pub set_transferred_to: Option<DeviceId>,
    /// Set `last_credit_update` to the write time.
    pub stamp_credit_update: bool,
}

impl BalanceUpdate {
    /// A purchase or renewal: the grant replaces whatever was left.
    #[must_use]
    pub fn subscription_grant(tier: SubscriptionTier, expires_at: DateTime<Utc>) -> Self {
        Self {
            set_subscription_credits: Some(tier.credits),
            set_subscription_status: Some(tier.status),
            set_subscription_expires_at: Some(Some(expires_at)),
            stamp_credit_update: true,
            ..Self::default()
        }
    }

    /// A one-time top-up.
    #[must_use]
    pub fn top_up(amount: i64) -> Self {
        Self {
            inc_extra_credits: amount.max(0),
            ..Self::default()
        }
    }

    /// Subscription expired: only the subscription pool is reset.
    #[must_use]
    pub fn expiration() -> Self {
        Self {
            set_subscription_credits: Some(0),
            set_subscription_status: Some(SubscriptionStatus::Free),
            set_subscription_expires_at: Some(None),
            ..Self::default()
        }
    }

    /// Destination side of a transfer: copy the source's balance and subscription.
    #[must_use]
    pub fn transfer_in(source: &BalanceRecord) -> Self {
        Self {
            set_subscription_credits: Some(source.subscription_credits),
            set_extra_credits: Some(source.extra_credits),
            set_subscription_status: Some(source.subscription_status),
            set_subscription_expires_at: Some(source.subscription_expires_at),
            set_transferred_from: Some(source.device_id.clone()),
            ..Self::default()
        }
    }

    /// Source side of a transfer.
    #[must_use]
    pub fn transfer_out(destination: &DeviceId) -> Self {
        Self {
            set_transferred_to: Some(destination.clone()),
            ..Self::default()
        }
    }
}
