//! Promo code commands.
//!
//! # Usage
//!
//! ```bash
//! tw-cli promo check LAUNCH50
//! tw-cli promo redeem LAUNCH50
//! ```

use std::sync::Arc;

use tillwise_admin::backend::BackendClient;
use tillwise_admin::credits::{BalanceCache, PromoService};
use tillwise_admin::{ConsoleError, NotificationBus};
use tillwise_core::TenantId;

use super::Context;

fn service(ctx: &Context) -> PromoService<BackendClient, BackendClient> {
    let balances = Arc::new(BalanceCache::new(
        ctx.client.clone(),
        ctx.config.balance_cache_ttl,
    ));
    PromoService::new(ctx.client.clone(), balances, NotificationBus::new())
}

/// Check a code without redeeming it.
///
/// # Errors
///
/// Returns an error for a malformed code or a backend failure.
pub async fn check(ctx: &Context, tenant: Option<TenantId>, code: &str) -> Result<String, ConsoleError> {
    let tenant = ctx.tenant(tenant)?;
    let validation = service(ctx).validate(tenant, code).await?;

    Ok(if validation.valid {
        format!("Valid: {} bonus credits", validation.bonus_credits)
    } else {
        format!(
            "Not valid: {}",
            validation
                .message
                .as_deref()
                .unwrap_or("this code can't be redeemed")
        )
    })
}

/// Redeem a code.
///
/// # Errors
///
/// Returns an error for a malformed or rejected code, or a backend failure.
pub async fn redeem(ctx: &Context, tenant: Option<TenantId>, code: &str) -> Result<String, ConsoleError> {
    let tenant = ctx.tenant(tenant)?;
    let redemption = service(ctx).redeem(tenant, code).await?;

    Ok(match redemption.new_balance {
        Some(balance) => format!(
            "Added {} credits, balance is now {balance}",
            redemption.credits_added
        ),
        None => format!("Added {} credits", redemption.credits_added),
    })
}
