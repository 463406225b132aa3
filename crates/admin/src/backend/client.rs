//! REST client for the hosted backend.
//!
//! Table reads go through the `/rest/v1/<table>` surface, stored procedures
//! through `/rest/v1/rpc/<name>` and edge functions through
//! `/functions/v1/<name>`. Every request carries the project key in the
//! `apikey` header and as a bearer token.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tillwise_core::{CreditTier, TenantId};
use tracing::{debug, error, instrument, warn};
use url::Url;

use super::{
    BackendError, CheckoutInitiator, CreditSource, PromoBackend, ReplayTransport, TransactionRpc,
};
use crate::credits::balance::CreditAccount;
use crate::credits::promo::{PromoCode, PromoRedemption, PromoValidation};
use crate::credits::purchase::{CheckoutRedirect, CheckoutRequest};
use crate::offline::QueuedRequest;
use crate::pos::cart::Product;
use crate::pos::catalog::{ProductSource, TransactionSummary};
use crate::pos::transaction::{TransactionRequest, TransactionResult};

/// Credit account table.
const TENANT_CREDITS_PATH: &str = "rest/v1/tenant_credits";
/// Atomic POS transaction procedure.
pub const CREATE_TRANSACTION_PATH: &str = "rest/v1/rpc/create_pos_transaction_atomic";
/// Credit checkout edge function.
const CREDIT_CHECKOUT_PATH: &str = "functions/v1/create-credit-checkout";
const PRODUCTS_PATH: &str = "rest/v1/products";
const POS_TRANSACTIONS_PATH: &str = "rest/v1/pos_transactions";
const VALIDATE_PROMO_PATH: &str = "rest/v1/rpc/validate_promo_code";
const REDEEM_PROMO_PATH: &str = "rest/v1/rpc/redeem_promo_code";

/// Longest response body kept in errors and logs.
const MAX_ERROR_BODY: usize = 500;

/// Client for the hosted backend.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    client: reqwest::Client,
    base_url: Url,
    anon_key: SecretString,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("anon_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Row shape of the `tenant_credits` table.
#[derive(Debug, Deserialize)]
struct TenantCreditsRow {
    tenant_id: TenantId,
    balance: i64,
    #[serde(default)]
    tier: CreditTier,
    #[serde(default)]
    lifetime_spent: i64,
    #[serde(default)]
    lifetime_earned: i64,
}

impl From<TenantCreditsRow> for CreditAccount {
    fn from(row: TenantCreditsRow) -> Self {
        Self {
            tenant_id: row.tenant_id,
            balance: row.balance,
            tier: row.tier,
            lifetime_spent: row.lifetime_spent,
            lifetime_earned: row.lifetime_earned,
        }
    }
}

#[derive(Debug, Serialize)]
struct PromoArgs<'a> {
    p_tenant_id: TenantId,
    p_code: &'a str,
}

impl BackendClient {
    /// Create a client for the project at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(mut base_url: Url, anon_key: SecretString) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        // Url::join drops the last path segment unless it ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            inner: Arc::new(BackendClientInner {
                client,
                base_url,
                anon_key,
            }),
        })
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Resolve `path` against the base URL.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Malformed` if `path` does not form a valid URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.inner
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| BackendError::Malformed(format!("invalid endpoint {path:?}: {e}")))
    }

    // =========================================================================
    // Request execution
    // =========================================================================

    /// Send a request and decode the JSON response.
    #[instrument(skip(self, query, body), fields(method = %method, path = %path))]
    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<T, BackendError> {
        let mut url = self.endpoint(path)?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        let key = self.inner.anon_key.expose_secret();

        let mut request = self
            .inner
            .client
            .request(method, url)
            .header("apikey", key)
            .header("Authorization", format!("Bearer {key}"))
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            warn!(retry_after, "Backend rate limit hit");
            return Err(BackendError::RateLimited(retry_after));
        }

        let text = response.text().await?;

        if !status.is_success() {
            let body = truncate(&text, MAX_ERROR_BODY);
            warn!(status = status.as_u16(), body = %body, "Backend request failed");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(status = status.as_u16(), bytes = text.len(), "Backend response received");

        serde_json::from_str(&text).map_err(|e| {
            error!(error = %e, body = %truncate(&text, MAX_ERROR_BODY), "Failed to decode backend response");
            BackendError::Parse(e)
        })
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", text.get(..idx).unwrap_or(text)),
        None => text.to_string(),
    }
}

fn to_body<T: Serialize>(value: &T) -> Result<serde_json::Value, BackendError> {
    Ok(serde_json::to_value(value)?)
}

impl CreditSource for BackendClient {
    #[instrument(skip(self), fields(tenant = %tenant))]
    async fn fetch_account(&self, tenant: TenantId) -> Result<CreditAccount, BackendError> {
        let rows: Vec<TenantCreditsRow> = self
            .execute(
                Method::GET,
                TENANT_CREDITS_PATH,
                &[
                    ("tenant_id", format!("eq.{tenant}")),
                    ("select", "*".to_string()),
                ],
                None,
            )
            .await?;

        rows.into_iter()
            .next()
            .map(CreditAccount::from)
            .ok_or_else(|| BackendError::NotFound(format!("credit account for tenant {tenant}")))
    }
}

impl TransactionRpc for BackendClient {
    #[instrument(skip(self, request), fields(tenant = %request.p_tenant_id, items = request.p_items.len()))]
    async fn create_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<TransactionResult, BackendError> {
        let body = to_body(request)?;
        self.execute(Method::POST, CREATE_TRANSACTION_PATH, &[], Some(&body))
            .await
    }
}

impl ProductSource for BackendClient {
    #[instrument(skip(self), fields(tenant = %tenant))]
    async fn list_products(&self, tenant: TenantId) -> Result<Vec<Product>, BackendError> {
        self.execute(
            Method::GET,
            PRODUCTS_PATH,
            &[
                ("tenant_id", format!("eq.{tenant}")),
                ("is_active", "eq.true".to_string()),
                ("select", "id,name,sku,barcode,price,stock".to_string()),
                ("order", "name.asc".to_string()),
            ],
            None,
        )
        .await
    }

    #[instrument(skip(self), fields(tenant = %tenant))]
    async fn recent_transactions(
        &self,
        tenant: TenantId,
    ) -> Result<Vec<TransactionSummary>, BackendError> {
        self.execute(
            Method::GET,
            POS_TRANSACTIONS_PATH,
            &[
                ("tenant_id", format!("eq.{tenant}")),
                (
                    "select",
                    "id,transaction_number,total,payment_method,created_at".to_string(),
                ),
                ("order", "created_at.desc".to_string()),
                ("limit", "20".to_string()),
            ],
            None,
        )
        .await
    }
}

impl CheckoutInitiator for BackendClient {
    #[instrument(skip(self, request), fields(tenant = %request.tenant_id, package = %request.package_id))]
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutRedirect, BackendError> {
        let body = to_body(request)?;
        self.execute(Method::POST, CREDIT_CHECKOUT_PATH, &[], Some(&body))
            .await
    }
}

impl PromoBackend for BackendClient {
    #[instrument(skip(self, code), fields(tenant = %tenant))]
    async fn validate_code(
        &self,
        tenant: TenantId,
        code: &PromoCode,
    ) -> Result<PromoValidation, BackendError> {
        let body = to_body(&PromoArgs {
            p_tenant_id: tenant,
            p_code: code.as_str(),
        })?;
        self.execute(Method::POST, VALIDATE_PROMO_PATH, &[], Some(&body))
            .await
    }

    #[instrument(skip(self, code), fields(tenant = %tenant))]
    async fn redeem_code(
        &self,
        tenant: TenantId,
        code: &PromoCode,
    ) -> Result<PromoRedemption, BackendError> {
        let body = to_body(&PromoArgs {
            p_tenant_id: tenant,
            p_code: code.as_str(),
        })?;
        self.execute(Method::POST, REDEEM_PROMO_PATH, &[], Some(&body))
            .await
    }
}

impl ReplayTransport for BackendClient {
    #[instrument(skip(self, record), fields(id = %record.id, endpoint = %record.endpoint))]
    async fn send(&self, record: &QueuedRequest) -> Result<serde_json::Value, BackendError> {
        let method = Method::from_bytes(record.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| BackendError::Malformed(format!("invalid HTTP method {:?}", record.method)))?;
        let body = (method != Method::GET).then_some(&record.payload);
        self.execute(method, &record.endpoint, &[], body).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> BackendClient {
        BackendClient::new(
            Url::parse(base).unwrap(),
            SecretString::from("test-anon-key".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = client("https://project.example.com/api");
        assert_eq!(
            client.endpoint(CREATE_TRANSACTION_PATH).unwrap().as_str(),
            "https://project.example.com/api/rest/v1/rpc/create_pos_transaction_atomic"
        );
        assert_eq!(
            client.endpoint("/functions/v1/create-credit-checkout").unwrap().as_str(),
            "https://project.example.com/api/functions/v1/create-credit-checkout"
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", client("https://project.example.com"));
        assert!(!rendered.contains("test-anon-key"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_tenant_credits_row_defaults() {
        let tenant = TenantId::generate();
        let rows: Vec<TenantCreditsRow> =
            serde_json::from_value(serde_json::json!([{ "tenant_id": tenant, "balance": 12 }]))
                .unwrap();
        let account = CreditAccount::from(rows.into_iter().next().unwrap());
        assert_eq!(account.tenant_id, tenant);
        assert_eq!(account.balance, 12);
        assert_eq!(account.tier, CreditTier::Free);
        assert_eq!(account.lifetime_spent, 0);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
