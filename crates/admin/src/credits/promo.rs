//! Promo codes.
//!
//! Codes are normalized and checked locally before anything is sent to the
//! backend, so typos never cost a round trip.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tillwise_core::TenantId;
use tracing::{info, instrument};

use super::balance::BalanceCache;
use crate::backend::{BackendError, CreditSource, PromoBackend};
use crate::notify::{Notification, NotificationBus};

/// Minimum code length after trimming.
pub const MIN_CODE_LEN: usize = 4;
/// Maximum code length after trimming.
pub const MAX_CODE_LEN: usize = 32;

/// Errors that can occur when checking or redeeming a promo code.
#[derive(Debug, Error)]
pub enum PromoError {
    #[error("enter a promo code")]
    Empty,

    #[error("promo codes are at least {min} characters")]
    TooShort { min: usize },

    #[error("promo codes are at most {max} characters")]
    TooLong { max: usize },

    #[error("promo codes cannot contain {0:?}")]
    InvalidCharacter(char),

    /// The backend refused the code.
    #[error("{0}")]
    Rejected(String),

    /// The backend could not be reached.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl PromoError {
    /// Whether the error was raised locally without a network call.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Empty | Self::TooShort { .. } | Self::TooLong { .. } | Self::InvalidCharacter(_)
        )
    }
}

/// A normalized promo code: trimmed, upper-case, `[A-Z0-9_-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PromoCode(String);

impl PromoCode {
    /// Normalize and validate user input.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input is empty, out of length bounds,
    /// or contains a character other than ASCII letters, digits, `_` or `-`.
    pub fn parse(raw: &str) -> Result<Self, PromoError> {
        let code = raw.trim().to_ascii_uppercase();

        if code.is_empty() {
            return Err(PromoError::Empty);
        }
        if let Some(c) = code
            .chars()
            .find(|c| !(c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '_' | '-')))
        {
            return Err(PromoError::InvalidCharacter(c));
        }
        let len = code.chars().count();
        if len < MIN_CODE_LEN {
            return Err(PromoError::TooShort { min: MIN_CODE_LEN });
        }
        if len > MAX_CODE_LEN {
            return Err(PromoError::TooLong { max: MAX_CODE_LEN });
        }

        Ok(Self(code))
    }

    /// The normalized code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PromoCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of validating a code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoValidation {
    pub valid: bool,
    /// Credits the code would grant.
    #[serde(default)]
    pub bonus_credits: u32,
    #[serde(default)]
    pub message: Option<String>,
}

/// Result of redeeming a code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoRedemption {
    pub success: bool,
    #[serde(default)]
    pub credits_added: u32,
    /// Balance after redemption, when the backend reports it.
    #[serde(default)]
    pub new_balance: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Promo code checks and redemption.
pub struct PromoService<B, S> {
    backend: B,
    balances: Arc<BalanceCache<S>>,
    notifications: NotificationBus,
}

impl<B: PromoBackend, S: CreditSource> PromoService<B, S> {
    /// Create a service. Redemptions invalidate `balances`.
    #[must_use]
    pub const fn new(
        backend: B,
        balances: Arc<BalanceCache<S>>,
        notifications: NotificationBus,
    ) -> Self {
        Self {
            backend,
            balances,
            notifications,
        }
    }

    /// Check whether `raw` is a redeemable code.
    ///
    /// # Errors
    ///
    /// Returns a local error for malformed input, or a backend error.
    #[instrument(skip(self, raw), fields(tenant = %tenant))]
    pub async fn validate(&self, tenant: TenantId, raw: &str) -> Result<PromoValidation, PromoError> {
        let code = PromoCode::parse(raw)?;
        Ok(self.backend.validate_code(tenant, &code).await?)
    }

    /// Redeem `raw` for `tenant`.
    ///
    /// On success the cached balance is dropped and a success notification
    /// is published.
    ///
    /// # Errors
    ///
    /// Returns a local error for malformed input, `PromoError::Rejected`
    /// when the backend refuses the code, or a backend error.
    #[instrument(skip(self, raw), fields(tenant = %tenant))]
    pub async fn redeem(&self, tenant: TenantId, raw: &str) -> Result<PromoRedemption, PromoError> {
        let code = PromoCode::parse(raw)?;
        let redemption = self.backend.redeem_code(tenant, &code).await?;

        if !redemption.success {
            let message = redemption
                .message
                .unwrap_or_else(|| "This promo code can't be redeemed.".to_string());
            info!(%code, reason = %message, "Promo code rejected");
            return Err(PromoError::Rejected(message));
        }

        self.balances.invalidate(tenant).await;
        info!(%code, credits = redemption.credits_added, "Promo code redeemed");
        self.notifications.publish(Notification::success(
            "Promo code applied",
            format!("{} bonus credits added to your balance.", redemption.credits_added),
        ));

        Ok(redemption)
    }
}
