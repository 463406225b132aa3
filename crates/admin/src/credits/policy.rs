//! Credit policy loaded from YAML.
//!
//! The policy bundles everything the gate needs that is fixed for the life
//! of the process: the cost table, the confirmation threshold, grace-period
//! rules, balance warning levels, and the purchasable credit packages. It is
//! validated once at load time so the rest of the code can rely on it.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tillwise_core::{ActionKey, ActionKeyError, Money};

use super::cost_table::{CostTable, CreditCostEntry};

/// Policy shipped with the binary.
const DEFAULT_POLICY_YAML: &str = include_str!("../../policy/default_policy.yaml");

/// Errors that can occur while loading a credit policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The policy file could not be read.
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    /// The policy is not valid YAML or has the wrong shape.
    #[error("invalid policy YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The cost table has no `fallback` entry.
    #[error("cost table must define a `fallback` entry")]
    MissingFallback,

    /// A cost table or deny-list key is not a valid action key.
    #[error("invalid action key {key:?}: {source}")]
    InvalidActionKey {
        /// The offending key.
        key: String,
        /// Why it was rejected.
        source: ActionKeyError,
    },

    /// A value is out of range or inconsistent.
    #[error("invalid policy: {0}")]
    Invalid(String),
}

/// Grace-period rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraceConfig {
    /// Length of the grace window.
    pub duration: Duration,
    /// Actions allowed on a zero balance while the window is open.
    pub free_actions_allowed: u32,
    /// Actions that are blocked even during grace.
    pub blocked_actions: HashSet<ActionKey>,
}

impl GraceConfig {
    /// Whether `action` is on the grace deny-list.
    #[must_use]
    pub fn is_blocked(&self, action: &ActionKey) -> bool {
        self.blocked_actions.contains(action)
    }
}

/// Balance values at which the console starts warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceThresholds {
    /// At or below this the balance is "low".
    pub low: i64,
    /// At or below this the balance is "critical".
    pub critical: i64,
}

/// A purchasable bundle of credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditPackage {
    /// Stable package identifier sent to checkout.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Credits granted.
    pub credits: u32,
    /// Extra credits granted on top of `credits`.
    #[serde(default)]
    pub bonus_credits: u32,
    /// Price charged at checkout.
    pub price: Money,
    /// Highlighted in the purchase dialog.
    #[serde(default)]
    pub popular: bool,
}

impl CreditPackage {
    /// Credits granted including the bonus.
    #[must_use]
    pub const fn total_credits(&self) -> u32 {
        self.credits.saturating_add(self.bonus_credits)
    }

    /// Price per credit (including bonus credits).
    #[must_use]
    pub fn price_per_credit(&self) -> Decimal {
        let total = self.total_credits();
        if total == 0 {
            return Decimal::ZERO;
        }
        self.price.amount / Decimal::from(total)
    }
}

/// Fully validated credit policy.
#[derive(Debug, Clone)]
pub struct CreditPolicy {
    /// Cost table with guaranteed fallback.
    pub costs: CostTable,
    /// Costs at or above this require confirmation.
    pub high_cost_threshold: u32,
    /// Grace-period rules.
    pub grace: GraceConfig,
    /// Warning levels for balance display.
    pub balance_levels: BalanceThresholds,
    /// Purchasable packages, in display order.
    pub packages: Vec<CreditPackage>,
}

// =============================================================================
// Raw (on-disk) representation
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawPolicy {
    high_cost_threshold: u32,
    grace: RawGrace,
    balance_levels: BalanceThresholds,
    costs: BTreeMap<String, CreditCostEntry>,
    #[serde(default)]
    packages: Vec<CreditPackage>,
}

#[derive(Debug, Deserialize)]
struct RawGrace {
    duration_hours: u32,
    free_actions_allowed: u32,
    #[serde(default)]
    blocked_actions: Vec<String>,
}

impl CreditPolicy {
    /// The policy compiled into the binary.
    ///
    /// # Errors
    ///
    /// Returns an error only if the embedded document is invalid.
    pub fn builtin() -> Result<Self, PolicyError> {
        Self::from_yaml(DEFAULT_POLICY_YAML)
    }

    /// Load a policy from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails validation.
    pub fn from_path(path: &Path) -> Result<Self, PolicyError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    /// Parse and validate a policy document.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed, the cost table lacks a
    /// fallback, a key is invalid, or thresholds are inconsistent.
    pub fn from_yaml(yaml: &str) -> Result<Self, PolicyError> {
        let raw: RawPolicy = serde_yaml::from_str(yaml)?;

        if raw.high_cost_threshold == 0 {
            return Err(PolicyError::Invalid(
                "high_cost_threshold must be greater than zero".to_string(),
            ));
        }
        if raw.grace.duration_hours == 0 {
            return Err(PolicyError::Invalid(
                "grace.duration_hours must be greater than zero".to_string(),
            ));
        }
        if raw.balance_levels.critical > raw.balance_levels.low {
            return Err(PolicyError::Invalid(format!(
                "balance_levels.critical ({}) must not exceed balance_levels.low ({})",
                raw.balance_levels.critical, raw.balance_levels.low
            )));
        }

        let blocked_actions = raw
            .grace
            .blocked_actions
            .iter()
            .map(|key| {
                ActionKey::parse(key).map_err(|source| PolicyError::InvalidActionKey {
                    key: key.clone(),
                    source,
                })
            })
            .collect::<Result<HashSet<_>, _>>()?;

        validate_packages(&raw.packages)?;

        Ok(Self {
            costs: CostTable::from_entries(raw.costs)?,
            high_cost_threshold: raw.high_cost_threshold,
            grace: GraceConfig {
                duration: Duration::hours(i64::from(raw.grace.duration_hours)),
                free_actions_allowed: raw.grace.free_actions_allowed,
                blocked_actions,
            },
            balance_levels: raw.balance_levels,
            packages: raw.packages,
        })
    }

    /// Find a package by id.
    #[must_use]
    pub fn package(&self, id: &str) -> Option<&CreditPackage> {
        self.packages.iter().find(|p| p.id == id)
    }
}

fn validate_packages(packages: &[CreditPackage]) -> Result<(), PolicyError> {
    let mut seen = HashSet::new();
    for package in packages {
        if !seen.insert(package.id.as_str()) {
            return Err(PolicyError::Invalid(format!(
                "duplicate package id {:?}",
                package.id
            )));
        }
        if package.credits == 0 {
            return Err(PolicyError::Invalid(format!(
                "package {:?} must grant at least one credit",
                package.id
            )));
        }
        if package.price.amount <= Decimal::ZERO {
            return Err(PolicyError::Invalid(format!(
                "package {:?} must have a positive price",
                package.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MINIMAL: &str = r"
high_cost_threshold: 10
grace:
  duration_hours: 24
  free_actions_allowed: 3
  blocked_actions: [storefront_create]
balance_levels:
  low: 50
  critical: 10
costs:
  fallback: { cost: 1, category: general, description: Standard }
  export_report: { cost: 5, category: reports, description: Export }
";

    #[test]
    fn test_builtin_policy_is_valid() {
        let policy = CreditPolicy::builtin().unwrap();
        assert_eq!(policy.high_cost_threshold, 10);
        assert_eq!(policy.grace.duration, Duration::hours(24));
        assert!(policy.package("growth").is_some());
        assert!(!policy.costs.is_empty());
    }

    #[test]
    fn test_minimal_policy() {
        let policy = CreditPolicy::from_yaml(MINIMAL).unwrap();
        assert!(policy.packages.is_empty());
        assert!(
            policy
                .grace
                .is_blocked(&ActionKey::parse("storefront_create").unwrap())
        );
        assert_eq!(policy.costs.cost_of(&ActionKey::parse("export_report").unwrap()), 5);
    }

    #[test]
    fn test_missing_fallback() {
        let yaml = MINIMAL.replace("  fallback: { cost: 1, category: general, description: Standard }\n", "");
        assert!(matches!(
            CreditPolicy::from_yaml(&yaml),
            Err(PolicyError::MissingFallback)
        ));
    }

    #[test]
    fn test_critical_above_low_rejected() {
        let yaml = MINIMAL.replace("critical: 10", "critical: 80");
        assert!(matches!(
            CreditPolicy::from_yaml(&yaml),
            Err(PolicyError::Invalid(_))
        ));
    }

    #[test]
    fn test_invalid_blocked_action() {
        let yaml = MINIMAL.replace("[storefront_create]", "[\"Not Valid\"]");
        assert!(matches!(
            CreditPolicy::from_yaml(&yaml),
            Err(PolicyError::InvalidActionKey { .. })
        ));
    }

    #[test]
    fn test_negative_cost_is_a_yaml_error() {
        let yaml = MINIMAL.replace("cost: 5", "cost: -5");
        assert!(matches!(CreditPolicy::from_yaml(&yaml), Err(PolicyError::Yaml(_))));
    }

    #[test]
    fn test_package_price_per_credit() {
        let policy = CreditPolicy::builtin().unwrap();
        let growth = policy.package("growth").unwrap();
        assert_eq!(growth.total_credits(), 550);
        assert!(growth.price_per_credit() < Decimal::new(8, 2));
    }
}
