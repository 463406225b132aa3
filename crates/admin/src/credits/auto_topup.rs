//! Automatic top-up rules.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::policy::CreditPolicy;

/// Auto top-up settings that cannot be used with the current policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AutoTopUpError {
    #[error("top-up threshold must not be negative (got {0})")]
    NegativeThreshold(i64),

    #[error("unknown credit package {0:?}")]
    UnknownPackage(String),
}

/// Per-tenant auto top-up settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoTopUpSettings {
    pub enabled: bool,
    /// Top up when the balance falls to or below this.
    pub threshold: i64,
    /// Package bought on each top-up.
    pub package_id: String,
    /// Maximum top-ups per calendar month.
    pub monthly_limit: u32,
}

/// What auto top-up should do for the current balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TopUpDecision {
    Disabled,
    NotNeeded,
    LimitReached,
    Trigger { package_id: String },
}

impl AutoTopUpSettings {
    /// Decide whether to buy `package_id` now.
    #[must_use]
    pub fn decide(&self, balance: i64, topups_this_month: u32) -> TopUpDecision {
        if !self.enabled {
            return TopUpDecision::Disabled;
        }
        if balance > self.threshold {
            return TopUpDecision::NotNeeded;
        }
        if topups_this_month >= self.monthly_limit {
            return TopUpDecision::LimitReached;
        }
        TopUpDecision::Trigger {
            package_id: self.package_id.clone(),
        }
    }

    /// Check the settings against the policy's packages.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self, policy: &CreditPolicy) -> Result<(), AutoTopUpError> {
        if self.threshold < 0 {
            return Err(AutoTopUpError::NegativeThreshold(self.threshold));
        }
        if policy.package(&self.package_id).is_none() {
            return Err(AutoTopUpError::UnknownPackage(self.package_id.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn settings() -> AutoTopUpSettings {
        AutoTopUpSettings {
            enabled: true,
            threshold: 20,
            package_id: "starter".to_string(),
            monthly_limit: 2,
        }
    }

    #[test]
    fn test_decide() {
        let s = settings();
        assert_eq!(s.decide(21, 0), TopUpDecision::NotNeeded);
        assert_eq!(
            s.decide(20, 1),
            TopUpDecision::Trigger {
                package_id: "starter".to_string()
            }
        );
        assert_eq!(s.decide(0, 2), TopUpDecision::LimitReached);

        let off = AutoTopUpSettings {
            enabled: false,
            ..settings()
        };
        assert_eq!(off.decide(0, 0), TopUpDecision::Disabled);
    }

    #[test]
    fn test_validate_against_policy() {
        let policy = CreditPolicy::builtin().unwrap();
        assert!(settings().validate(&policy).is_ok());

        let unknown = AutoTopUpSettings {
            package_id: "mega".to_string(),
            ..settings()
        };
        assert_eq!(
            unknown.validate(&policy),
            Err(AutoTopUpError::UnknownPackage("mega".to_string()))
        );

        let negative = AutoTopUpSettings {
            threshold: -1,
            ..settings()
        };
        assert_eq!(
            negative.validate(&policy),
            Err(AutoTopUpError::NegativeThreshold(-1))
        );
    }
}
