//! Credit package purchase.
//!
//! The console never handles card data. Purchasing a package creates an
//! external checkout session and hands back the payment page URL; the
//! backend grants the credits once payment succeeds.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tillwise_core::TenantId;
use tracing::{info, instrument};
use url::Url;

use super::policy::{CreditPackage, CreditPolicy};
use crate::backend::{BackendError, CheckoutInitiator};

/// Errors that can occur when starting a purchase.
#[derive(Debug, Error)]
pub enum PurchaseError {
    /// No package with this id in the policy.
    #[error("unknown credit package: {0}")]
    UnknownPackage(String),

    /// A success or cancel URL was rejected.
    #[error("invalid redirect URL {url:?}: {reason}")]
    InvalidRedirect {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The checkout service returned an unusable payment URL.
    #[error("checkout returned an invalid payment URL: {0}")]
    InvalidCheckoutUrl(String),

    /// The checkout service failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Body of a checkout session request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutRequest {
    pub tenant_id: TenantId,
    pub package_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Checkout session response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutRedirect {
    /// External payment page.
    pub url: String,
}

/// Starts credit purchases for the packages in a [`CreditPolicy`].
#[derive(Debug)]
pub struct PurchaseFlow<C> {
    policy: Arc<CreditPolicy>,
    initiator: C,
    console_origin: Url,
}

impl<C: CheckoutInitiator> PurchaseFlow<C> {
    /// Create a flow. Redirect URLs must share `console_origin`'s origin.
    #[must_use]
    pub const fn new(policy: Arc<CreditPolicy>, initiator: C, console_origin: Url) -> Self {
        Self {
            policy,
            initiator,
            console_origin,
        }
    }

    /// Packages offered, in display order.
    #[must_use]
    pub fn packages(&self) -> &[CreditPackage] {
        &self.policy.packages
    }

    /// Start a checkout for `package_id` and return the payment page URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the package is unknown, a redirect URL is
    /// rejected, or the checkout service fails. No request is sent in the
    /// first two cases.
    #[instrument(skip(self, success_url, cancel_url), fields(tenant = %tenant))]
    pub async fn start(
        &self,
        tenant: TenantId,
        package_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<Url, PurchaseError> {
        let package = self
            .policy
            .package(package_id)
            .ok_or_else(|| PurchaseError::UnknownPackage(package_id.to_string()))?;

        let success = validate_redirect(success_url, &self.console_origin)?;
        let cancel = validate_redirect(cancel_url, &self.console_origin)?;

        let request = CheckoutRequest {
            tenant_id: tenant,
            package_id: package.id.clone(),
            success_url: success.into(),
            cancel_url: cancel.into(),
        };
        let redirect = self.initiator.create_checkout(&request).await?;

        let url = Url::parse(&redirect.url)
            .map_err(|_| PurchaseError::InvalidCheckoutUrl(redirect.url.clone()))?;
        if url.scheme() != "https" {
            return Err(PurchaseError::InvalidCheckoutUrl(redirect.url));
        }

        info!(
            package = %package.id,
            credits = package.total_credits(),
            price = %package.price,
            "Credit checkout started"
        );
        Ok(url)
    }
}

/// Check that `raw` is an absolute URL on the console's origin.
///
/// `http` is only accepted for localhost.
///
/// # Errors
///
/// Returns `PurchaseError::InvalidRedirect` describing the first problem.
pub fn validate_redirect(raw: &str, console_origin: &Url) -> Result<Url, PurchaseError> {
    let reject = |reason| PurchaseError::InvalidRedirect {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|_| reject("not an absolute URL"))?;

    let local = matches!(url.host_str(), Some("localhost" | "127.0.0.1"));
    match url.scheme() {
        "https" => {}
        "http" if local => {}
        _ => return Err(reject("must use https")),
    }

    if url.origin() != console_origin.origin() {
        return Err(reject("must point at the console"));
    }

    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct FakeInitiator {
        url: String,
        seen: Mutex<Vec<CheckoutRequest>>,
    }

    impl FakeInitiator {
        fn returning(url: &str) -> Self {
            Self {
                url: url.to_string(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl CheckoutInitiator for &FakeInitiator {
        async fn create_checkout(
            &self,
            request: &CheckoutRequest,
        ) -> Result<CheckoutRedirect, BackendError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(CheckoutRedirect {
                url: self.url.clone(),
            })
        }
    }

    fn origin() -> Url {
        Url::parse("https://console.example.com").unwrap()
    }

    fn flow(initiator: &FakeInitiator) -> PurchaseFlow<&FakeInitiator> {
        PurchaseFlow::new(Arc::new(CreditPolicy::builtin().unwrap()), initiator, origin())
    }

    #[tokio::test]
    async fn test_start_returns_payment_url() {
        let initiator = FakeInitiator::returning("https://pay.example.com/session/abc");
        let tenant = TenantId::generate();

        let url = flow(&initiator)
            .start(
                tenant,
                "growth",
                "https://console.example.com/credits?status=success",
                "https://console.example.com/credits",
            )
            .await
            .unwrap();

        assert_eq!(url.as_str(), "https://pay.example.com/session/abc");
        let seen = initiator.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].package_id, "growth");
        assert_eq!(seen[0].tenant_id, tenant);
    }

    #[tokio::test]
    async fn test_unknown_package_sends_nothing() {
        let initiator = FakeInitiator::returning("https://pay.example.com/x");
        let result = flow(&initiator)
            .start(
                TenantId::generate(),
                "enterprise",
                "https://console.example.com/ok",
                "https://console.example.com/cancel",
            )
            .await;

        assert!(matches!(result, Err(PurchaseError::UnknownPackage(_))));
        assert!(initiator.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_redirect_rejected() {
        let initiator = FakeInitiator::returning("https://pay.example.com/x");
        let result = flow(&initiator)
            .start(
                TenantId::generate(),
                "starter",
                "https://evil.example.net/ok",
                "https://console.example.com/cancel",
            )
            .await;

        assert!(matches!(result, Err(PurchaseError::InvalidRedirect { .. })));
        assert!(initiator.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insecure_payment_url_rejected() {
        let initiator = FakeInitiator::returning("http://pay.example.com/x");
        let result = flow(&initiator)
            .start(
                TenantId::generate(),
                "starter",
                "https://console.example.com/ok",
                "https://console.example.com/cancel",
            )
            .await;

        assert!(matches!(result, Err(PurchaseError::InvalidCheckoutUrl(_))));
    }

    #[test]
    fn test_validate_redirect_rules() {
        let local = Url::parse("http://localhost:3000").unwrap();
        assert!(validate_redirect("http://localhost:3000/credits", &local).is_ok());
        assert!(validate_redirect("/credits", &origin()).is_err());
        assert!(validate_redirect("http://console.example.com/credits", &origin()).is_err());
        assert!(validate_redirect("https://console.example.com:8443/credits", &origin()).is_err());
    }
}
