//! Hosted backend collaborators.
//!
//! The backend owns the credit ledger, stock and payments. Each capability
//! the console needs from it is a small trait so orchestration code can be
//! tested against in-memory fakes. [`BackendClient`] implements all of them
//! over the backend's REST surface.

pub mod client;
pub mod network;

use thiserror::Error;
use tillwise_core::TenantId;

use crate::credits::balance::CreditAccount;
use crate::credits::promo::{PromoCode, PromoRedemption, PromoValidation};
use crate::credits::purchase::{CheckoutRedirect, CheckoutRequest};
use crate::offline::QueuedRequest;
use crate::pos::transaction::{TransactionRequest, TransactionResult};

pub use client::BackendClient;
pub use network::{Connectivity, NetworkStatus};

/// Errors that can occur when talking to the hosted backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A request or response did not have the expected shape.
    #[error("malformed request or response: {0}")]
    Malformed(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited(_) | Self::Unavailable(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Parse(_) | Self::Malformed(_) | Self::NotFound(_) => false,
        }
    }
}

/// Source of credit account snapshots.
#[allow(async_fn_in_trait)]
pub trait CreditSource {
    /// Fetch the current account for `tenant`.
    ///
    /// # Errors
    ///
    /// Returns an error if the account cannot be fetched.
    async fn fetch_account(&self, tenant: TenantId) -> Result<CreditAccount, BackendError>;
}

/// The atomic POS transaction RPC.
#[allow(async_fn_in_trait)]
pub trait TransactionRpc {
    /// Submit a sale. Structured rejections come back as
    /// [`TransactionResult::Failure`], not as errors.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failures or an unrecognized response.
    async fn create_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<TransactionResult, BackendError>;
}

/// Starts an external credit checkout.
#[allow(async_fn_in_trait)]
pub trait CheckoutInitiator {
    /// Create a checkout session and return where to send the user.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be created.
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutRedirect, BackendError>;
}

/// Validates and redeems promo codes.
#[allow(async_fn_in_trait)]
pub trait PromoBackend {
    /// Check a code without redeeming it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    async fn validate_code(
        &self,
        tenant: TenantId,
        code: &PromoCode,
    ) -> Result<PromoValidation, BackendError>;

    /// Redeem a code for `tenant`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    async fn redeem_code(
        &self,
        tenant: TenantId,
        code: &PromoCode,
    ) -> Result<PromoRedemption, BackendError>;
}

/// Sends queued offline requests.
#[allow(async_fn_in_trait)]
pub trait ReplayTransport {
    /// Send `record` to its endpoint and return the decoded response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn send(&self, record: &QueuedRequest) -> Result<serde_json::Value, BackendError>;
}
