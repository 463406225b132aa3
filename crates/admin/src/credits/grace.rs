//! Grace period after the balance runs out.
//!
//! When a free-tier tenant's balance reaches zero, a grace window opens and
//! a few actions may still run. The only persisted piece is a
//! [`GraceRecord`] in the local store; the state itself is re-derived on
//! every evaluation because the balance and the clock move outside this
//! process (another device, a server-side grant).
//!
//! ```text
//! NoGrace --balance <= 0, free tier--> Active --now - started >= duration--> Expired
//!    ^                                   |                                    |
//!    +------- balance > 0 or paid -------+------------------------------------+
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tillwise_core::TenantId;
use tracing::info;

use super::balance::CreditAccount;
use super::policy::GraceConfig;
use crate::store::{KeyValueStore, KeyValueStoreExt, StoreError};

/// Persisted grace-period record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraceRecord {
    /// When the balance was first seen at zero.
    pub started_at: DateTime<Utc>,
    /// Actions already let through during this window.
    pub free_actions_used: u32,
}

/// Derived grace-period state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraceState {
    /// Balance is positive, or the tenant is on the paid tier.
    NoGrace,
    /// Window is open.
    Active {
        /// Window start.
        started_at: DateTime<Utc>,
        /// Window end.
        ends_at: DateTime<Utc>,
        /// Free actions used so far.
        used: u32,
        /// Free actions allowed in total.
        allowed: u32,
    },
    /// Window closed while the balance is still empty.
    Expired {
        /// Window start.
        started_at: DateTime<Utc>,
        /// When the window closed.
        ended_at: DateTime<Utc>,
    },
}

impl GraceState {
    /// Whether the grace window is open.
    #[must_use]
    pub const fn is_in_grace_period(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    /// Free actions still available (0 unless active).
    #[must_use]
    pub const fn remaining_actions(&self) -> u32 {
        match self {
            Self::Active { used, allowed, .. } => allowed.saturating_sub(*used),
            _ => 0,
        }
    }

    /// Time left in the window (zero unless active).
    #[must_use]
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Self::Active { ends_at, .. } if *ends_at > now => *ends_at - now,
            _ => Duration::zero(),
        }
    }
}

/// Change to apply to the stored record after a derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordChange {
    /// Leave the record as it is.
    Keep,
    /// Store a new record (grace started).
    Create(GraceRecord),
    /// Delete the record (grace cleared).
    Remove,
}

/// Derive the grace state from the stored record and the current account.
#[must_use]
pub fn derive_state(
    record: Option<&GraceRecord>,
    account: &CreditAccount,
    config: &GraceConfig,
    now: DateTime<Utc>,
) -> (GraceState, RecordChange) {
    if account.tier.is_paid() || account.balance > 0 {
        let change = if record.is_some() {
            RecordChange::Remove
        } else {
            RecordChange::Keep
        };
        return (GraceState::NoGrace, change);
    }

    let (record, change) = match record {
        Some(existing) => (existing.clone(), RecordChange::Keep),
        None => {
            let fresh = GraceRecord {
                started_at: now,
                free_actions_used: 0,
            };
            (fresh.clone(), RecordChange::Create(fresh))
        }
    };

    let ends_at = record.started_at + config.duration;
    if now >= ends_at {
        return (
            GraceState::Expired {
                started_at: record.started_at,
                ended_at: ends_at,
            },
            change,
        );
    }

    (
        GraceState::Active {
            started_at: record.started_at,
            ends_at,
            used: record.free_actions_used,
            allowed: config.free_actions_allowed,
        },
        change,
    )
}

/// Reads and updates grace records in a [`KeyValueStore`].
#[derive(Debug)]
pub struct GraceTracker<S> {
    store: S,
    config: GraceConfig,
}

impl<S: KeyValueStore> GraceTracker<S> {
    /// Create a tracker.
    #[must_use]
    pub const fn new(store: S, config: GraceConfig) -> Self {
        Self { store, config }
    }

    /// Grace rules in effect.
    #[must_use]
    pub const fn config(&self) -> &GraceConfig {
        &self.config
    }

    fn key(tenant: TenantId) -> String {
        format!("credits:grace:{tenant}")
    }

    /// Load the stored record, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn record(&self, tenant: TenantId) -> Result<Option<GraceRecord>, StoreError> {
        self.store.get_json(&Self::key(tenant))
    }

    /// Derive the current state and persist any transition.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub fn evaluate(
        &self,
        account: &CreditAccount,
        now: DateTime<Utc>,
    ) -> Result<GraceState, StoreError> {
        let tenant = account.tenant_id;
        let record = self.record(tenant)?;
        let (state, change) = derive_state(record.as_ref(), account, &self.config, now);

        match change {
            RecordChange::Keep => {}
            RecordChange::Create(fresh) => {
                info!(%tenant, started_at = %fresh.started_at, "Grace period started");
                self.store.set_json(&Self::key(tenant), &fresh)?;
            }
            RecordChange::Remove => {
                info!(%tenant, balance = account.balance, tier = %account.tier, "Grace period cleared");
                self.store.remove(&Self::key(tenant))?;
            }
        }

        Ok(state)
    }

    /// Count one free action against the open window.
    ///
    /// Returns the number of free actions left afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub fn record_use(&self, tenant: TenantId) -> Result<u32, StoreError> {
        let Some(mut record) = self.record(tenant)? else {
            return Ok(0);
        };
        record.free_actions_used = record.free_actions_used.saturating_add(1);
        self.store.set_json(&Self::key(tenant), &record)?;

        let remaining = self
            .config
            .free_actions_allowed
            .saturating_sub(record.free_actions_used);
        info!(%tenant, used = record.free_actions_used, remaining, "Grace action used");
        Ok(remaining)
    }

    /// Remove the stored record unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn clear(&self, tenant: TenantId) -> Result<(), StoreError> {
        self.store.remove(&Self::key(tenant))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use tillwise_core::CreditTier;

    use super::*;
    use crate::store::MemoryStore;

    fn config() -> GraceConfig {
        GraceConfig {
            duration: Duration::hours(24),
            free_actions_allowed: 3,
            blocked_actions: HashSet::new(),
        }
    }

    fn account(balance: i64, tier: CreditTier) -> CreditAccount {
        CreditAccount {
            tenant_id: TenantId::generate(),
            balance,
            tier,
            lifetime_spent: 0,
            lifetime_earned: 0,
        }
    }

    #[test]
    fn test_zero_balance_starts_grace() {
        let now = Utc::now();
        let (state, change) = derive_state(None, &account(0, CreditTier::Free), &config(), now);
        assert!(state.is_in_grace_period());
        assert_eq!(state.remaining_actions(), 3);
        assert!(matches!(change, RecordChange::Create(r) if r.started_at == now));
    }

    #[test]
    fn test_positive_balance_clears_immediately() {
        let now = Utc::now();
        let record = GraceRecord {
            started_at: now - Duration::hours(1),
            free_actions_used: 2,
        };
        let (state, change) = derive_state(Some(&record), &account(5, CreditTier::Free), &config(), now);
        assert_eq!(state, GraceState::NoGrace);
        assert!(!state.is_in_grace_period());
        assert_eq!(change, RecordChange::Remove);
    }

    #[test]
    fn test_paid_tier_clears() {
        let now = Utc::now();
        let record = GraceRecord {
            started_at: now,
            free_actions_used: 0,
        };
        let (state, change) = derive_state(Some(&record), &account(0, CreditTier::Paid), &config(), now);
        assert_eq!(state, GraceState::NoGrace);
        assert_eq!(change, RecordChange::Remove);
    }

    #[test]
    fn test_expired_after_duration() {
        let now = Utc::now();
        let record = GraceRecord {
            started_at: now - Duration::hours(25),
            free_actions_used: 0,
        };
        let (state, change) = derive_state(Some(&record), &account(0, CreditTier::Free), &config(), now);
        assert!(matches!(state, GraceState::Expired { .. }));
        assert_eq!(change, RecordChange::Keep);
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let record = GraceRecord {
            started_at: now - Duration::hours(24),
            free_actions_used: 0,
        };
        let (state, _) = derive_state(Some(&record), &account(0, CreditTier::Free), &config(), now);
        assert!(matches!(state, GraceState::Expired { .. }));
    }

    #[test]
    fn test_time_remaining() {
        let now = Utc::now();
        let record = GraceRecord {
            started_at: now - Duration::hours(20),
            free_actions_used: 1,
        };
        let (state, _) = derive_state(Some(&record), &account(0, CreditTier::Free), &config(), now);
        assert_eq!(state.time_remaining(now), Duration::hours(4));
        assert_eq!(state.remaining_actions(), 2);
    }

    #[test]
    fn test_tracker_persists_and_clears() {
        let tracker = GraceTracker::new(MemoryStore::new(), config());
        let empty = account(0, CreditTier::Free);
        let now = Utc::now();

        assert!(tracker.evaluate(&empty, now).unwrap().is_in_grace_period());
        assert_eq!(tracker.record_use(empty.tenant_id).unwrap(), 2);

        // Re-evaluation keeps the original start time and counter
        let state = tracker.evaluate(&empty, now + Duration::hours(1)).unwrap();
        assert_eq!(state.remaining_actions(), 2);

        let topped_up = CreditAccount {
            balance: 100,
            ..empty.clone()
        };
        assert_eq!(tracker.evaluate(&topped_up, now).unwrap(), GraceState::NoGrace);
        assert_eq!(tracker.record(empty.tenant_id).unwrap(), None);
    }

    #[test]
    fn test_record_use_without_record() {
        let tracker = GraceTracker::new(MemoryStore::new(), config());
        assert_eq!(tracker.record_use(TenantId::generate()).unwrap(), 0);
    }
}
