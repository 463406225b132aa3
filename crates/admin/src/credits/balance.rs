//! Credit account mirror and balance cache.
//!
//! The hosted backend owns the ledger. The console only keeps a short-lived
//! copy of each tenant's account so the gate can answer without a round
//! trip. Entries expire after a TTL and are dropped early when the backend
//! pushes a ledger change.

use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tillwise_core::{CreditTier, TenantId};
use tracing::{debug, instrument, warn};

use super::policy::BalanceThresholds;
use crate::backend::{BackendError, CreditSource};

/// Read-only mirror of a tenant's credit account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditAccount {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Current balance in credits.
    pub balance: i64,
    /// Billing tier.
    pub tier: CreditTier,
    /// Credits spent over the account's lifetime.
    #[serde(default)]
    pub lifetime_spent: i64,
    /// Credits granted or purchased over the account's lifetime.
    #[serde(default)]
    pub lifetime_earned: i64,
}

impl CreditAccount {
    /// Whether the account can cover `cost` right now.
    #[must_use]
    pub fn can_afford(&self, cost: u32) -> bool {
        self.balance >= i64::from(cost)
    }

    /// Warning level for display.
    #[must_use]
    pub const fn level(&self, thresholds: &BalanceThresholds) -> BalanceLevel {
        BalanceLevel::classify(self.balance, thresholds)
    }
}

/// What the gate knows about an account at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountSnapshot {
    /// Fetched successfully within the cache TTL.
    Fresh(CreditAccount),
    /// Last known value; the latest refresh failed.
    Stale(CreditAccount),
    /// Never fetched successfully.
    Unavailable,
}

impl AccountSnapshot {
    /// The account, fresh or stale.
    #[must_use]
    pub const fn account(&self) -> Option<&CreditAccount> {
        match self {
            Self::Fresh(account) | Self::Stale(account) => Some(account),
            Self::Unavailable => None,
        }
    }

    /// Whether this snapshot came from a successful refresh.
    #[must_use]
    pub const fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }
}

/// Balance warning level shown next to the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceLevel {
    Healthy,
    Low,
    Critical,
    Empty,
}

impl BalanceLevel {
    /// Classify a balance against the policy thresholds.
    #[must_use]
    pub const fn classify(balance: i64, thresholds: &BalanceThresholds) -> Self {
        if balance <= 0 {
            Self::Empty
        } else if balance <= thresholds.critical {
            Self::Critical
        } else if balance <= thresholds.low {
            Self::Low
        } else {
            Self::Healthy
        }
    }
}

/// Tenants held by each balance cache.
pub const BALANCE_CACHE_CAPACITY: u64 = 1_000;

/// TTL cache of credit accounts in front of a [`CreditSource`].
pub struct BalanceCache<S> {
    source: S,
    cache: Cache<TenantId, CreditAccount>,
    /// Last successful fetch per tenant, served when a refresh fails.
    last_known: Cache<TenantId, (CreditAccount, DateTime<Utc>)>,
}

impl<S: CreditSource> BalanceCache<S> {
    /// Create a cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(source: S, ttl: Duration) -> Self {
        Self::with_capacity(source, ttl, BALANCE_CACHE_CAPACITY)
    }

    fn with_capacity(source: S, ttl: Duration, capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        let last_known = Cache::builder().max_capacity(capacity).build();

        Self {
            source,
            cache,
            last_known,
        }
    }

    /// Current snapshot for `tenant`, refreshing when the entry expired.
    ///
    /// Never fails: a failed refresh yields the last known value as
    /// [`AccountSnapshot::Stale`], or [`AccountSnapshot::Unavailable`].
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn snapshot(&self, tenant: TenantId) -> AccountSnapshot {
        if let Some(account) = self.cache.get(&tenant).await {
            debug!("Balance cache hit");
            return AccountSnapshot::Fresh(account);
        }

        match self.refresh(tenant).await {
            Ok(account) => AccountSnapshot::Fresh(account),
            Err(e) => {
                match self.last_known.get(&tenant).await {
                    Some((account, fetched_at)) => {
                        warn!(error = %e, %fetched_at, "Balance refresh failed, using last known value");
                        AccountSnapshot::Stale(account)
                    }
                    None => {
                        warn!(error = %e, "Balance refresh failed and no value is known");
                        AccountSnapshot::Unavailable
                    }
                }
            }
        }
    }

    /// Fetch the account from the backend and cache it.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the fetch fails.
    pub async fn refresh(&self, tenant: TenantId) -> Result<CreditAccount, BackendError> {
        let account = self.source.fetch_account(tenant).await?;
        self.store(account.clone()).await;
        Ok(account)
    }

    /// Apply an account pushed by the backend.
    pub async fn apply_push(&self, account: CreditAccount) {
        debug!(tenant = %account.tenant_id, balance = account.balance, "Applying pushed balance");
        self.store(account).await;
    }

    /// Drop the cached entry so the next snapshot refetches.
    pub async fn invalidate(&self, tenant: TenantId) {
        self.cache.invalidate(&tenant).await;
    }

    async fn store(&self, account: CreditAccount) {
        self.last_known
            .insert(account.tenant_id, (account.clone(), Utc::now()))
            .await;
        self.cache.insert(account.tenant_id, account).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    const THRESHOLDS: BalanceThresholds = BalanceThresholds {
        low: 50,
        critical: 10,
    };

    struct FakeSource {
        tenant: TenantId,
        balance: i64,
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(balance: i64) -> Self {
            Self {
                tenant: TenantId::generate(),
                balance,
                fail: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl CreditSource for &FakeSource {
        async fn fetch_account(&self, tenant: TenantId) -> Result<CreditAccount, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(BackendError::Unavailable("connection refused".to_string()));
            }
            Ok(CreditAccount {
                tenant_id: tenant,
                balance: self.balance,
                tier: CreditTier::Free,
                lifetime_spent: 0,
                lifetime_earned: self.balance,
            })
        }
    }

    #[test]
    fn test_classify_levels() {
        assert_eq!(BalanceLevel::classify(-3, &THRESHOLDS), BalanceLevel::Empty);
        assert_eq!(BalanceLevel::classify(0, &THRESHOLDS), BalanceLevel::Empty);
        assert_eq!(BalanceLevel::classify(10, &THRESHOLDS), BalanceLevel::Critical);
        assert_eq!(BalanceLevel::classify(11, &THRESHOLDS), BalanceLevel::Low);
        assert_eq!(BalanceLevel::classify(50, &THRESHOLDS), BalanceLevel::Low);
        assert_eq!(BalanceLevel::classify(51, &THRESHOLDS), BalanceLevel::Healthy);
    }

    #[tokio::test]
    async fn test_snapshot_caches() {
        let source = FakeSource::new(40);
        let tenant = source.tenant;
        let cache = BalanceCache::new(&source, Duration::from_secs(60));

        assert!(cache.snapshot(tenant).await.is_fresh());
        assert!(cache.snapshot(tenant).await.is_fresh());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let source = FakeSource::new(40);
        let tenant = source.tenant;
        let cache = BalanceCache::new(&source, Duration::from_secs(60));

        cache.snapshot(tenant).await;
        cache.invalidate(tenant).await;
        cache.snapshot(tenant).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_returns_stale() {
        let source = FakeSource::new(40);
        let tenant = source.tenant;
        let cache = BalanceCache::new(&source, Duration::from_secs(60));

        cache.snapshot(tenant).await;
        cache.invalidate(tenant).await;
        source.fail.store(true, Ordering::SeqCst);

        match cache.snapshot(tenant).await {
            AccountSnapshot::Stale(account) => assert_eq!(account.balance, 40),
            other => panic!("expected stale snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stale_copy_outlives_ttl() {
        let source = FakeSource::new(40);
        let tenant = source.tenant;
        let cache = BalanceCache::new(&source, Duration::from_millis(20));

        cache.snapshot(tenant).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        source.fail.store(true, Ordering::SeqCst);

        assert!(matches!(cache.snapshot(tenant).await, AccountSnapshot::Stale(_)));
    }

    #[tokio::test]
    async fn test_last_known_accounts_are_bounded() {
        let source = FakeSource::new(40);
        let cache = BalanceCache::with_capacity(&source, Duration::from_secs(60), 8);

        for _ in 0..200 {
            cache.snapshot(TenantId::generate()).await;
        }
        cache.last_known.run_pending_tasks().await;

        assert!(cache.last_known.entry_count() <= 8);
    }

    #[tokio::test]
    async fn test_failed_first_fetch_is_unavailable() {
        let source = FakeSource::new(40);
        source.fail.store(true, Ordering::SeqCst);
        let cache = BalanceCache::new(&source, Duration::from_secs(60));

        assert_eq!(cache.snapshot(source.tenant).await, AccountSnapshot::Unavailable);
    }

    #[tokio::test]
    async fn test_apply_push_overrides() {
        let source = FakeSource::new(40);
        let tenant = source.tenant;
        let cache = BalanceCache::new(&source, Duration::from_secs(60));

        cache
            .apply_push(CreditAccount {
                tenant_id: tenant,
                balance: 500,
                tier: CreditTier::Free,
                lifetime_spent: 0,
                lifetime_earned: 500,
            })
            .await;

        let snapshot = cache.snapshot(tenant).await;
        assert_eq!(snapshot.account().unwrap().balance, 500);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
