//! Integration tests for the Tillwise console.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p tillwise-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `credits_flow` - Gate, grace period, promo codes and purchases end to end
//! - `register_flow` - Register checkout, offline queuing and replay
//!
//! The tests run against [`FakeBackend`], an in-memory stand-in for the
//! hosted backend that implements every backend trait the console uses.
//! Its transaction RPC applies the same all-or-nothing stock rules as the
//! real procedure.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tillwise_admin::backend::client::CREATE_TRANSACTION_PATH;
use tillwise_admin::backend::{
    BackendError, CheckoutInitiator, CreditSource, PromoBackend, ReplayTransport, TransactionRpc,
};
use tillwise_admin::credits::{
    CheckoutRedirect, CheckoutRequest, CreditAccount, PromoCode, PromoRedemption, PromoValidation,
};
use tillwise_admin::offline::QueuedRequest;
use tillwise_admin::pos::{Product, ProductSource, TransactionRequest, TransactionResult, TransactionSummary};
use tillwise_core::{CreditTier, ProductId, TenantId, TransactionId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory hosted backend.
#[derive(Default)]
pub struct FakeBackend {
    account: Mutex<Option<CreditAccount>>,
    products: Mutex<Vec<Product>>,
    sales: Mutex<Vec<TransactionRequest>>,
    promo_codes: Mutex<HashMap<String, u32>>,
    checkouts: Mutex<Vec<CheckoutRequest>>,
    offline: AtomicBool,
    account_fetches: AtomicUsize,
}

impl FakeBackend {
    /// A backend holding `account`.
    #[must_use]
    pub fn with_account(account: CreditAccount) -> Self {
        Self {
            account: Mutex::new(Some(account)),
            ..Self::default()
        }
    }

    /// Replace the stocked products.
    pub fn stock(&self, products: Vec<Product>) {
        *lock(&self.products) = products;
    }

    /// Register a single-use promo code worth `bonus` credits.
    pub fn add_promo(&self, code: &str, bonus: u32) {
        lock(&self.promo_codes).insert(code.to_string(), bonus);
    }

    /// Make every call fail as if the network were down.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Overwrite the balance, as a purchase webhook would.
    pub fn set_balance(&self, balance: i64) {
        if let Some(account) = lock(&self.account).as_mut() {
            account.balance = balance;
        }
    }

    /// Current stock of `id`.
    #[must_use]
    pub fn stock_of(&self, id: ProductId) -> Option<i32> {
        lock(&self.products).iter().find(|p| p.id == id).map(|p| p.stock)
    }

    /// Sales recorded so far.
    #[must_use]
    pub fn sales(&self) -> Vec<TransactionRequest> {
        lock(&self.sales).clone()
    }

    /// Checkout sessions requested so far.
    #[must_use]
    pub fn checkouts(&self) -> Vec<CheckoutRequest> {
        lock(&self.checkouts).clone()
    }

    /// Account fetches served.
    #[must_use]
    pub fn account_fetches(&self) -> usize {
        self.account_fetches.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> Result<(), BackendError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    /// Apply a sale atomically: every line is filled or nothing changes.
    fn apply_sale(&self, request: &TransactionRequest) -> serde_json::Value {
        if request.p_items.is_empty() {
            return json!({ "success": false, "error_code": "EMPTY_CART" });
        }

        let mut products = lock(&self.products);
        let mut short = Vec::new();
        for line in &request.p_items {
            let Some(product) = products.iter().find(|p| p.id == line.product_id) else {
                return json!({ "success": false, "error_code": "PRODUCT_NOT_FOUND" });
            };
            if i64::from(product.stock) < i64::from(line.quantity) {
                short.push(json!({
                    "product_id": product.id,
                    "product_name": product.name,
                    "requested": line.quantity,
                    "available": product.stock,
                }));
            }
        }
        if !short.is_empty() {
            return json!({
                "success": false,
                "error_code": "INSUFFICIENT_STOCK",
                "insufficient_items": short,
            });
        }

        for line in &request.p_items {
            if let Some(product) = products.iter_mut().find(|p| p.id == line.product_id) {
                product.stock -= i32::try_from(line.quantity).unwrap_or(i32::MAX);
            }
        }
        drop(products);

        let mut sales = lock(&self.sales);
        sales.push(request.clone());
        let total = request.p_subtotal - request.p_discount_amount + request.p_tax_amount;
        json!({
            "success": true,
            "transaction_id": TransactionId::generate(),
            "transaction_number": format!("POS-{:06}", sales.len()),
            "total": total.max(Decimal::ZERO).to_string(),
            "created_at": Utc::now(),
        })
    }
}

impl CreditSource for &FakeBackend {
    async fn fetch_account(&self, tenant: TenantId) -> Result<CreditAccount, BackendError> {
        self.ensure_online()?;
        self.account_fetches.fetch_add(1, Ordering::SeqCst);
        lock(&self.account)
            .clone()
            .filter(|a| a.tenant_id == tenant)
            .ok_or_else(|| BackendError::NotFound(format!("tenant {tenant}")))
    }
}

impl TransactionRpc for &FakeBackend {
    async fn create_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<TransactionResult, BackendError> {
        self.ensure_online()?;
        Ok(serde_json::from_value(self.apply_sale(request))?)
    }
}

impl ReplayTransport for &FakeBackend {
    async fn send(&self, record: &QueuedRequest) -> Result<serde_json::Value, BackendError> {
        self.ensure_online()?;
        if record.endpoint != CREATE_TRANSACTION_PATH {
            return Err(BackendError::NotFound(record.endpoint.clone()));
        }
        let request: TransactionRequest = serde_json::from_value(record.payload.clone())?;
        Ok(self.apply_sale(&request))
    }
}

impl ProductSource for &FakeBackend {
    async fn list_products(&self, _tenant: TenantId) -> Result<Vec<Product>, BackendError> {
        self.ensure_online()?;
        Ok(lock(&self.products).clone())
    }

    async fn recent_transactions(
        &self,
        _tenant: TenantId,
    ) -> Result<Vec<TransactionSummary>, BackendError> {
        self.ensure_online()?;
        Ok(Vec::new())
    }
}

impl PromoBackend for &FakeBackend {
    async fn validate_code(
        &self,
        _tenant: TenantId,
        code: &PromoCode,
    ) -> Result<PromoValidation, BackendError> {
        self.ensure_online()?;
        let bonus = lock(&self.promo_codes).get(code.as_str()).copied();
        Ok(PromoValidation {
            valid: bonus.is_some(),
            bonus_credits: bonus.unwrap_or(0),
            message: bonus.is_none().then(|| "Unknown or expired code".to_string()),
        })
    }

    async fn redeem_code(
        &self,
        _tenant: TenantId,
        code: &PromoCode,
    ) -> Result<PromoRedemption, BackendError> {
        self.ensure_online()?;
        let Some(bonus) = lock(&self.promo_codes).remove(code.as_str()) else {
            return Ok(PromoRedemption {
                success: false,
                credits_added: 0,
                new_balance: None,
                message: Some("Code already used".to_string()),
            });
        };

        let mut account = lock(&self.account);
        let new_balance = account.as_mut().map(|a| {
            a.balance += i64::from(bonus);
            a.lifetime_earned += i64::from(bonus);
            a.balance
        });
        Ok(PromoRedemption {
            success: true,
            credits_added: bonus,
            new_balance,
            message: None,
        })
    }
}

impl CheckoutInitiator for &FakeBackend {
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutRedirect, BackendError> {
        self.ensure_online()?;
        lock(&self.checkouts).push(request.clone());
        Ok(CheckoutRedirect {
            url: format!("https://pay.example.test/session/{}", request.package_id),
        })
    }
}

/// A free-tier account with `balance` credits.
#[must_use]
pub fn free_account(tenant: TenantId, balance: i64) -> CreditAccount {
    CreditAccount {
        tenant_id: tenant,
        balance,
        tier: CreditTier::Free,
        lifetime_spent: 0,
        lifetime_earned: balance.max(0),
    }
}

/// A stocked product with a barcode.
#[must_use]
pub fn product(name: &str, price: Decimal, stock: i32, barcode: &str) -> Product {
    Product {
        id: ProductId::generate(),
        name: name.to_string(),
        sku: None,
        barcode: Some(barcode.to_string()),
        price,
        stock,
    }
}

/// A fresh directory under the system temp dir for file-backed state.
#[must_use]
pub fn temp_state_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("tillwise-it-{label}-{}", uuid::Uuid::new_v4()))
}
