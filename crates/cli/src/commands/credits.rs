//! Credit account commands.
//!
//! # Usage
//!
//! ```bash
//! # Balance, warning level and grace window for the configured tenant
//! tw-cli credits status
//!
//! # What the gate would do for an action right now
//! tw-cli credits check export_report
//!
//! # Start a credit checkout and print the payment page URL
//! tw-cli credits buy growth
//! ```

use std::fmt::Write as _;

use chrono::Utc;
use tillwise_admin::ConsoleError;
use tillwise_admin::credits::gate::{GateDecision, decide};
use tillwise_admin::credits::{
    AccountSnapshot, BalanceCache, CreditGate, GraceState, PurchaseFlow,
};
use tillwise_core::{ActionKey, TenantId};

use super::Context;

/// Describe the tenant's credit account.
///
/// # Errors
///
/// Returns an error if local grace state cannot be read.
pub async fn status(ctx: &Context, tenant: Option<TenantId>) -> Result<String, ConsoleError> {
    let tenant = ctx.tenant(tenant)?;
    let balances = BalanceCache::new(ctx.client.clone(), ctx.config.balance_cache_ttl);
    let snapshot = balances.snapshot(tenant).await;
    let gate = CreditGate::new(ctx.policy.clone(), ctx.store.clone());
    let now = Utc::now();

    let Some(account) = snapshot.account() else {
        return Ok(format!("Tenant {tenant}: balance unavailable"));
    };

    let mut out = String::new();
    let _ = writeln!(out, "Tenant:  {tenant}");
    let _ = writeln!(out, "Tier:    {}", account.tier);
    let _ = writeln!(
        out,
        "Balance: {} credits ({:?}{})",
        account.balance,
        account.level(&ctx.policy.balance_levels),
        if snapshot.is_fresh() { "" } else { ", stale" }
    );
    let _ = writeln!(
        out,
        "Lifetime: {} earned, {} spent",
        account.lifetime_earned, account.lifetime_spent
    );

    if let AccountSnapshot::Fresh(account) = &snapshot {
        match gate.grace().evaluate(account, now)? {
            GraceState::NoGrace => {}
            state @ GraceState::Active { .. } => {
                let left = state.time_remaining(now);
                let _ = writeln!(
                    out,
                    "Grace:   active, {} free actions left, {}h {}m remaining",
                    state.remaining_actions(),
                    left.num_hours(),
                    left.num_minutes() % 60
                );
            }
            GraceState::Expired { ended_at, .. } => {
                let _ = writeln!(out, "Grace:   expired at {}", ended_at.format("%Y-%m-%d %H:%M UTC"));
            }
        }
    }
    Ok(out)
}

/// Evaluate the gate for `action` against the live balance.
///
/// Grace uses are not counted.
///
/// # Errors
///
/// Returns an error if `action` is not a valid key or local state cannot be
/// read.
pub async fn check(
    ctx: &Context,
    tenant: Option<TenantId>,
    action: &str,
) -> Result<String, ConsoleError> {
    let tenant = ctx.tenant(tenant)?;
    let action = ActionKey::parse(action).map_err(|e| ConsoleError::BadRequest(e.to_string()))?;
    let balances = BalanceCache::new(ctx.client.clone(), ctx.config.balance_cache_ttl);
    let snapshot = balances.snapshot(tenant).await;
    let gate = CreditGate::new(ctx.policy.clone(), ctx.store.clone());

    let grace = match &snapshot {
        AccountSnapshot::Fresh(account) => gate.grace().evaluate(account, Utc::now())?,
        _ => GraceState::NoGrace,
    };
    let skip = gate.prefs().skips(tenant, &action)?;
    let decision = decide(gate.policy(), &action, &snapshot, &grace, skip);

    Ok(match decision {
        GateDecision::Allow(allowance) => format!("{action}: allowed ({:?})", allowance.reason),
        GateDecision::Confirm(prompt) => format!(
            "{action}: needs confirmation, {} credits ({} -> {})",
            prompt.cost, prompt.current_balance, prompt.balance_after
        ),
        GateDecision::Block(state) => format!("{action}: blocked. {}", state.reason.message()),
    })
}

/// Start a checkout for `package_id`.
///
/// # Errors
///
/// Returns an error if the package is unknown or the checkout fails.
pub async fn buy(
    ctx: &Context,
    tenant: Option<TenantId>,
    package_id: &str,
) -> Result<String, ConsoleError> {
    let tenant = ctx.tenant(tenant)?;
    let origin = &ctx.config.console_base_url;
    let success = origin
        .join("credits?purchase=success")
        .map_err(|e| ConsoleError::BadRequest(e.to_string()))?;
    let cancel = origin
        .join("credits?purchase=cancelled")
        .map_err(|e| ConsoleError::BadRequest(e.to_string()))?;

    let flow = PurchaseFlow::new(ctx.policy.clone(), ctx.client.clone(), origin.clone());
    let url = flow
        .start(tenant, package_id, success.as_str(), cancel.as_str())
        .await?;
    Ok(url.to_string())
}
