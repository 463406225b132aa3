//! Credit gate.
//!
//! Every credit-costing action goes through [`CreditGate::check`] (or the
//! [`CreditGate::guard`] convenience wrapper) before it runs. The gate never
//! touches the balance: the backend deducts credits after the action
//! completes. Locally it only persists grace counters and "don't ask again"
//! flags.
//!
//! # Stale or missing balances
//!
//! When the latest balance refresh failed the gate fails open only where the
//! answer does not depend on the balance: zero-cost actions, and tenants the
//! last known snapshot shows on the paid tier. Everything else blocks with
//! [`BlockReason::BalanceUnavailable`] and logs a warning.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tillwise_core::{ActionKey, TenantId};
use tracing::{debug, info, warn};

use super::balance::AccountSnapshot;
use super::grace::{GraceState, GraceTracker};
use super::policy::CreditPolicy;
use super::prefs::ConfirmationPrefs;
use crate::store::{KeyValueStore, StoreError};

/// Errors raised by the gate itself (not decisions).
#[derive(Debug, Error)]
pub enum GateError {
    /// Local state could not be read or written.
    #[error("credit gate storage error: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of evaluating an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    /// Run the action now.
    Allow(Allowance),
    /// Ask the user first.
    Confirm(ConfirmationPrompt),
    /// Do not run the action.
    Block(BlockedState),
}

impl GateDecision {
    /// Whether the action may run without further input.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }
}

/// Permission to run an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allowance {
    /// Cost to display, `None` for paid tenants.
    pub cost: Option<u32>,
    /// Why the action was allowed.
    pub reason: AllowReason,
}

/// Why an action was allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AllowReason {
    PaidTier,
    NoCost,
    Affordable,
    ConfirmationSkipped,
    Confirmed,
    Grace {
        /// Free grace actions left after this one.
        remaining: u32,
    },
}

/// Details shown in the confirmation dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationPrompt {
    /// Action awaiting confirmation.
    pub action: ActionKey,
    /// Action description from the cost table.
    pub description: String,
    /// Balance before the action.
    pub current_balance: i64,
    /// Credits the action costs.
    pub cost: u32,
    /// Balance after the backend deducts the cost.
    pub balance_after: i64,
}

/// The user's answer to a [`ConfirmationPrompt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationResponse {
    /// Run the action; optionally never ask again for it.
    Proceed {
        /// Persist a skip flag for this action.
        dont_ask_again: bool,
    },
    /// Do not run the action.
    Cancel,
}

/// Why an action was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// Balance below cost and no grace window.
    InsufficientCredits,
    /// The grace window has expired.
    GraceExpired,
    /// All free grace actions were used.
    GraceExhausted,
    /// The action is never allowed during grace.
    BlockedDuringGrace,
    /// The balance could not be refreshed.
    BalanceUnavailable,
}

impl BlockReason {
    /// Message for the out-of-credits dialog.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InsufficientCredits => "You don't have enough credits for this action.",
            Self::GraceExpired => "Your grace period has ended. Add credits to continue.",
            Self::GraceExhausted => "You've used all free actions in your grace period.",
            Self::BlockedDuringGrace => "This action requires credits and isn't available during the grace period.",
            Self::BalanceUnavailable => "We couldn't confirm your credit balance. Please try again.",
        }
    }
}

/// State behind the out-of-credits dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedState {
    /// The blocked action.
    pub action: ActionKey,
    /// Its cost.
    pub cost: u32,
    /// Balance when blocked, if known.
    pub balance: Option<i64>,
    /// Why it was blocked.
    pub reason: BlockReason,
    /// Credits missing to afford the action, if known.
    pub shortfall: Option<i64>,
    /// Smallest package covering the shortfall.
    pub suggested_package: Option<String>,
    /// Whether upgrading to the paid tier is an option.
    pub upgrade_available: bool,
}

/// Result of [`CreditGate::guard`].
#[derive(Debug)]
pub enum GuardOutcome<T> {
    /// The action ran.
    Ran {
        /// Value returned by the action.
        value: T,
        /// Why it was allowed.
        allowance: Allowance,
    },
    /// The user declined the confirmation.
    Cancelled,
    /// The gate blocked the action.
    Blocked(BlockedState),
}

// =============================================================================
// Decision logic
// =============================================================================

/// Decide what to do with `action`.
///
/// Pure: reads nothing from storage. `grace` must already be derived for the
/// snapshot and `skip_confirmation` reflects the stored preference.
#[must_use]
pub fn decide(
    policy: &CreditPolicy,
    action: &ActionKey,
    snapshot: &AccountSnapshot,
    grace: &GraceState,
    skip_confirmation: bool,
) -> GateDecision {
    let entry = policy.costs.lookup(action);
    let cost = entry.cost;

    let Some(account) = snapshot.account() else {
        if cost == 0 {
            return allow(Some(0), AllowReason::NoCost);
        }
        return GateDecision::Block(blocked(policy, action, cost, None, BlockReason::BalanceUnavailable, true));
    };

    if account.tier.is_paid() {
        return allow(None, AllowReason::PaidTier);
    }
    if cost == 0 {
        return allow(Some(0), AllowReason::NoCost);
    }
    if !snapshot.is_fresh() {
        return GateDecision::Block(blocked(
            policy,
            action,
            cost,
            Some(account.balance),
            BlockReason::BalanceUnavailable,
            true,
        ));
    }

    if account.can_afford(cost) {
        if cost < policy.high_cost_threshold {
            return allow(Some(cost), AllowReason::Affordable);
        }
        if skip_confirmation {
            return allow(Some(cost), AllowReason::ConfirmationSkipped);
        }
        return GateDecision::Confirm(ConfirmationPrompt {
            action: action.clone(),
            description: entry.description.clone(),
            current_balance: account.balance,
            cost,
            balance_after: account.balance - i64::from(cost),
        });
    }

    let reason = match grace {
        GraceState::Active { .. } if policy.grace.is_blocked(action) => BlockReason::BlockedDuringGrace,
        GraceState::Active { .. } if grace.remaining_actions() > 0 => {
            return allow(
                Some(cost),
                AllowReason::Grace {
                    remaining: grace.remaining_actions() - 1,
                },
            );
        }
        GraceState::Active { .. } => BlockReason::GraceExhausted,
        GraceState::Expired { .. } => BlockReason::GraceExpired,
        GraceState::NoGrace => BlockReason::InsufficientCredits,
    };

    GateDecision::Block(blocked(policy, action, cost, Some(account.balance), reason, true))
}

const fn allow(cost: Option<u32>, reason: AllowReason) -> GateDecision {
    GateDecision::Allow(Allowance { cost, reason })
}

fn blocked(
    policy: &CreditPolicy,
    action: &ActionKey,
    cost: u32,
    balance: Option<i64>,
    reason: BlockReason,
    upgrade_available: bool,
) -> BlockedState {
    let shortfall = balance.map(|b| (i64::from(cost) - b).max(0));
    let needed = shortfall.unwrap_or_else(|| i64::from(cost));

    let mut packages: Vec<_> = policy.packages.iter().collect();
    packages.sort_by_key(|p| p.total_credits());
    let suggested_package = packages
        .iter()
        .find(|p| i64::from(p.total_credits()) >= needed)
        .or_else(|| packages.last())
        .map(|p| p.id.clone());

    BlockedState {
        action: action.clone(),
        cost,
        balance,
        reason,
        shortfall,
        suggested_package,
        upgrade_available,
    }
}

// =============================================================================
// CreditGate
// =============================================================================

/// Gate combining the policy with locally persisted grace and preference
/// state.
#[derive(Debug)]
pub struct CreditGate<S> {
    policy: Arc<CreditPolicy>,
    grace: GraceTracker<S>,
    prefs: ConfirmationPrefs<S>,
}

impl<S: KeyValueStore + Clone> CreditGate<S> {
    /// Create a gate. `store` is shared by grace records and preferences.
    #[must_use]
    pub fn new(policy: Arc<CreditPolicy>, store: S) -> Self {
        let grace = GraceTracker::new(store.clone(), policy.grace.clone());
        Self {
            policy,
            grace,
            prefs: ConfirmationPrefs::new(store),
        }
    }
}

impl<S: KeyValueStore> CreditGate<S> {
    /// The policy in effect.
    #[must_use]
    pub fn policy(&self) -> &CreditPolicy {
        &self.policy
    }

    /// Grace tracker (for balance display).
    #[must_use]
    pub const fn grace(&self) -> &GraceTracker<S> {
        &self.grace
    }

    /// Confirmation preferences.
    #[must_use]
    pub const fn prefs(&self) -> &ConfirmationPrefs<S> {
        &self.prefs
    }

    /// Evaluate `action` for `tenant`.
    ///
    /// A fresh snapshot also drives grace transitions. An allowance granted
    /// through grace is counted before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if local state cannot be read or written.
    pub fn check(
        &self,
        tenant: TenantId,
        action: &ActionKey,
        snapshot: &AccountSnapshot,
        now: DateTime<Utc>,
    ) -> Result<GateDecision, GateError> {
        let grace = match snapshot {
            AccountSnapshot::Fresh(account) => self.grace.evaluate(account, now)?,
            AccountSnapshot::Stale(_) | AccountSnapshot::Unavailable => GraceState::NoGrace,
        };

        let cost = self.policy.costs.cost_of(action);
        let skip = cost >= self.policy.high_cost_threshold && self.prefs.skips(tenant, action)?;

        let decision = decide(&self.policy, action, snapshot, &grace, skip);

        match &decision {
            GateDecision::Allow(allowance) => {
                if matches!(allowance.reason, AllowReason::Grace { .. }) {
                    self.grace.record_use(tenant)?;
                }
                debug!(%tenant, %action, reason = ?allowance.reason, "Action allowed");
            }
            GateDecision::Confirm(prompt) => {
                info!(%tenant, %action, cost = prompt.cost, balance = prompt.current_balance, "Action needs confirmation");
            }
            GateDecision::Block(state) if state.reason == BlockReason::BalanceUnavailable => {
                warn!(%tenant, %action, cost, "Blocking action: balance unavailable");
            }
            GateDecision::Block(state) => {
                info!(%tenant, %action, cost, reason = ?state.reason, "Action blocked");
            }
        }

        Ok(decision)
    }

    /// Record the user's confirmation of `prompt`.
    ///
    /// # Errors
    ///
    /// Returns an error if the skip flag cannot be stored.
    pub fn confirm(
        &self,
        tenant: TenantId,
        prompt: &ConfirmationPrompt,
        dont_ask_again: bool,
    ) -> Result<Allowance, GateError> {
        if dont_ask_again {
            self.prefs.skip(tenant, &prompt.action)?;
        }
        Ok(Allowance {
            cost: Some(prompt.cost),
            reason: AllowReason::Confirmed,
        })
    }

    /// Check `action` and run `run` if the gate (and the user) allow it.
    ///
    /// `confirm` is only called for high-cost actions without a skip flag.
    ///
    /// # Errors
    ///
    /// Returns an error if local state cannot be read or written. The action
    /// is not run in that case.
    pub async fn guard<T, Fut>(
        &self,
        tenant: TenantId,
        action: &ActionKey,
        snapshot: &AccountSnapshot,
        now: DateTime<Utc>,
        confirm: impl FnOnce(&ConfirmationPrompt) -> ConfirmationResponse,
        run: impl FnOnce() -> Fut,
    ) -> Result<GuardOutcome<T>, GateError>
    where
        Fut: Future<Output = T>,
    {
        let allowance = match self.check(tenant, action, snapshot, now)? {
            GateDecision::Allow(allowance) => allowance,
            GateDecision::Block(state) => return Ok(GuardOutcome::Blocked(state)),
            GateDecision::Confirm(prompt) => match confirm(&prompt) {
                ConfirmationResponse::Proceed { dont_ask_again } => {
                    self.confirm(tenant, &prompt, dont_ask_again)?
                }
                ConfirmationResponse::Cancel => {
                    debug!(%tenant, %action, "Confirmation cancelled");
                    return Ok(GuardOutcome::Cancelled);
                }
            },
        };

        let value = run().await;
        Ok(GuardOutcome::Ran { value, allowance })
    }
}
