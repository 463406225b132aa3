//! Unified error handling for the console.

use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::credits::{GateError, PolicyError, PromoError, PurchaseError};
use crate::offline::QueueError;
use crate::pos::{CartError, CheckoutError};
use crate::store::StoreError;

/// Application-level error type for console commands.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Credit policy is invalid.
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Hosted backend call failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Local side table failed.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Credit gate could not read or write its state.
    #[error("Credit gate error: {0}")]
    Gate(#[from] GateError),

    /// Cart operation was rejected.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Checkout could not be attempted.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Offline queue failed.
    #[error("Offline queue error: {0}")]
    Queue(#[from] QueueError),

    /// Promo code was invalid or rejected.
    #[error("Promo error: {0}")]
    Promo(#[from] PromoError),

    /// Credit purchase could not be started.
    #[error("Purchase error: {0}")]
    Purchase(#[from] PurchaseError),

    /// Bad input from the operator.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ConsoleError {
    /// Whether the operation may succeed if retried later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Backend(e) => e.is_retryable(),
            Self::Promo(PromoError::Backend(e)) | Self::Purchase(PurchaseError::Backend(e)) => {
                e.is_retryable()
            }
            _ => false,
        }
    }

    /// Message safe to show an operator. Internal details stay in the logs.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Store(_) | Self::Queue(_) | Self::Gate(_) => {
                "Local storage error. Check the state directory and try again.".to_string()
            }
            Self::Backend(e) if e.is_retryable() => {
                "The backend is unreachable right now. Try again shortly.".to_string()
            }
            Self::Backend(_) => "The backend rejected the request.".to_string(),
            Self::Promo(e) if e.is_local() => e.to_string(),
            _ => self.to_string(),
        }
    }

    /// Report the error to Sentry when it points at a fault rather than
    /// operator input. Returns whether it was reported.
    pub fn report(&self) -> bool {
        let is_fault = match self {
            Self::Config(_) | Self::Cart(_) | Self::BadRequest(_) => false,
            Self::Promo(PromoError::Backend(e)) => !e.is_retryable(),
            Self::Promo(_) => false,
            _ => !self.is_retryable(),
        };
        if is_fault {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Console command error"
            );
        }
        is_fault
    }
}

/// Set the Sentry tenant context.
pub fn set_sentry_tenant(tenant: tillwise_core::TenantId) {
    sentry::configure_scope(|scope| {
        scope.set_tag("tenant_id", tenant);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_error_display() {
        let err = ConsoleError::BadRequest("unknown action".to_string());
        assert_eq!(err.to_string(), "Bad request: unknown action");

        let err = ConsoleError::from(CartError::NotInCart(tillwise_core::ProductId::generate()));
        assert!(err.to_string().starts_with("Cart error:"));
    }

    #[test]
    fn test_retryable_follows_backend() {
        assert!(ConsoleError::from(BackendError::RateLimited(5)).is_retryable());
        assert!(!ConsoleError::from(BackendError::Malformed("x".to_string())).is_retryable());
        assert!(!ConsoleError::BadRequest("x".to_string()).is_retryable());
    }

    #[test]
    fn test_user_message_hides_internals() {
        let err = ConsoleError::from(BackendError::Status {
            status: 400,
            body: "relation \"tenant_credits\" does not exist".to_string(),
        });
        assert!(!err.user_message().contains("tenant_credits"));

        let err = ConsoleError::from(PromoError::Empty);
        assert_eq!(err.user_message(), PromoError::Empty.to_string());
    }

    #[test]
    fn test_operator_errors_are_not_reported() {
        assert!(!ConsoleError::BadRequest("x".to_string()).report());
        assert!(!ConsoleError::from(CartError::NotInCart(tillwise_core::ProductId::generate())).report());
    }

    #[test]
    fn test_promo_refusals_are_not_reported() {
        assert!(!ConsoleError::from(PromoError::Rejected("Code already used".to_string())).report());
        assert!(!ConsoleError::from(PromoError::Empty).report());
        assert!(
            !ConsoleError::from(PromoError::Backend(BackendError::Unavailable("down".to_string())))
                .report()
        );
    }
}
