//! Credit policy commands.
//!
//! # Usage
//!
//! ```bash
//! # Validate the built-in policy (or a file) and print a summary
//! tw-cli policy check
//! tw-cli policy check --path policy/default_policy.yaml
//!
//! # Show what the gate would do for an action at a given balance
//! tw-cli policy evaluate export_report --balance 3
//! ```

use std::fmt::Write as _;
use std::path::Path;

use chrono::Utc;
use tillwise_admin::ConsoleError;
use tillwise_admin::credits::balance::{AccountSnapshot, CreditAccount};
use tillwise_admin::credits::gate::{GateDecision, decide};
use tillwise_admin::credits::grace::derive_state;
use tillwise_admin::credits::CreditPolicy;
use tillwise_core::{ActionKey, CreditTier, TenantId};

/// Validate a policy and describe it.
///
/// # Errors
///
/// Returns an error if the policy fails validation.
pub fn check(path: Option<&Path>) -> Result<String, ConsoleError> {
    let policy = super::load_policy(path)?;
    tracing::info!(
        actions = policy.costs.len(),
        packages = policy.packages.len(),
        "Policy is valid"
    );
    Ok(summarize(&policy))
}

fn summarize(policy: &CreditPolicy) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "High-cost threshold: {} credits", policy.high_cost_threshold);
    let _ = writeln!(
        out,
        "Grace: {}h, {} free actions, {} blocked",
        policy.grace.duration.num_hours(),
        policy.grace.free_actions_allowed,
        policy.grace.blocked_actions.len()
    );
    let _ = writeln!(
        out,
        "Balance levels: low <= {}, critical <= {}",
        policy.balance_levels.low, policy.balance_levels.critical
    );

    let _ = writeln!(out, "\nActions:");
    for (action, entry) in policy.costs.iter_sorted() {
        let flag = if entry.cost >= policy.high_cost_threshold {
            " (confirm)"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "  {action:<28} {:>4} {:<10}{flag}",
            entry.cost, entry.category
        );
    }

    let _ = writeln!(out, "\nPackages:");
    for package in &policy.packages {
        let _ = writeln!(
            out,
            "  {:<12} {:>6} credits  {}",
            package.id,
            package.total_credits(),
            package.price
        );
    }
    out
}

/// Evaluate the gate offline for a hypothetical account.
///
/// The account is treated as freshly fetched with no prior grace record, so
/// a zero balance opens a new grace window.
///
/// # Errors
///
/// Returns an error if the policy is invalid or `action` is not a valid key.
pub fn evaluate(
    path: Option<&Path>,
    action: &str,
    balance: i64,
    tier: CreditTier,
) -> Result<String, ConsoleError> {
    let policy = super::load_policy(path)?;
    let action = ActionKey::parse(action).map_err(|e| ConsoleError::BadRequest(e.to_string()))?;

    let account = CreditAccount {
        tenant_id: TenantId::generate(),
        balance,
        tier,
        lifetime_spent: 0,
        lifetime_earned: 0,
    };
    let (grace, _) = derive_state(None, &account, &policy.grace, Utc::now());
    let decision = decide(&policy, &action, &AccountSnapshot::Fresh(account), &grace, false);

    Ok(describe(&decision))
}

fn describe(decision: &GateDecision) -> String {
    match decision {
        GateDecision::Allow(allowance) => match allowance.cost {
            Some(cost) => format!("allow ({:?}), {cost} credits", allowance.reason),
            None => format!("allow ({:?})", allowance.reason),
        },
        GateDecision::Confirm(prompt) => format!(
            "confirm: {} costs {} credits, balance {} -> {}",
            prompt.description, prompt.cost, prompt.current_balance, prompt.balance_after
        ),
        GateDecision::Block(state) => {
            let mut line = format!("block: {}", state.reason.message());
            if let Some(shortfall) = state.shortfall {
                let _ = write!(line, " (short {shortfall} credits)");
            }
            if let Some(package) = &state.suggested_package {
                let _ = write!(line, ", suggested package: {package}");
            }
            line
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_check_builtin_lists_fallback() {
        let summary = check(None).unwrap();
        assert!(summary.contains("fallback"));
        assert!(summary.contains("Packages:"));
    }

    #[test]
    fn test_evaluate_paid_tier_allows() {
        let text = evaluate(None, "export_report", 0, CreditTier::Paid).unwrap();
        assert!(text.starts_with("allow (PaidTier)"));
    }

    #[test]
    fn test_evaluate_rejects_bad_key() {
        let err = evaluate(None, "Not A Key", 10, CreditTier::Free).unwrap_err();
        assert!(matches!(err, ConsoleError::BadRequest(_)));
    }

    #[test]
    fn test_evaluate_zero_balance_opens_grace() {
        let text = evaluate(None, "fallback", 0, CreditTier::Free).unwrap();
        assert!(text.contains("Grace"));
    }
}
