//! Register product and transaction views.
//!
//! Caches the product list (used for barcode lookup) and the recent
//! transactions list using `moka` (2-minute TTL). A completed sale
//! invalidates both because stock and history changed server-side.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tillwise_core::{PaymentMethod, TenantId, TransactionId};
use tracing::{debug, instrument};

use super::cart::Product;
use crate::backend::BackendError;

/// Default time-to-live for cached views.
const VIEW_TTL: Duration = Duration::from_secs(120);

/// A row of the recent transactions view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub id: TransactionId,
    #[serde(default)]
    pub transaction_number: Option<String>,
    pub total: Decimal,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
}

/// Source of register views.
#[allow(async_fn_in_trait)]
pub trait ProductSource {
    /// Active products for `tenant`.
    ///
    /// # Errors
    ///
    /// Returns an error if the products cannot be fetched.
    async fn list_products(&self, tenant: TenantId) -> Result<Vec<Product>, BackendError>;

    /// Most recent register transactions for `tenant`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the transactions cannot be fetched.
    async fn recent_transactions(
        &self,
        tenant: TenantId,
    ) -> Result<Vec<TransactionSummary>, BackendError>;
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Products(TenantId),
    Transactions(TenantId),
}

#[derive(Debug, Clone)]
enum CacheValue {
    Products(Arc<Vec<Product>>),
    Transactions(Arc<Vec<TransactionSummary>>),
}

/// Cached register views over a [`ProductSource`].
pub struct ProductCatalog<P> {
    source: P,
    cache: Cache<CacheKey, CacheValue>,
}

impl<P: ProductSource> ProductCatalog<P> {
    /// Create a catalog with the default TTL.
    #[must_use]
    pub fn new(source: P) -> Self {
        Self::with_ttl(source, VIEW_TTL)
    }

    /// Create a catalog whose views live for `ttl`.
    #[must_use]
    pub fn with_ttl(source: P, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(100)
            .time_to_live(ttl)
            .build();
        Self { source, cache }
    }

    /// Products for `tenant`.
    ///
    /// # Errors
    ///
    /// Returns an error if the list is not cached and cannot be fetched.
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn products(&self, tenant: TenantId) -> Result<Arc<Vec<Product>>, BackendError> {
        let key = CacheKey::Products(tenant);
        if let Some(CacheValue::Products(products)) = self.cache.get(&key).await {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let products = Arc::new(self.source.list_products(tenant).await?);
        self.cache
            .insert(key, CacheValue::Products(Arc::clone(&products)))
            .await;
        Ok(products)
    }

    /// Product whose barcode equals `code` exactly.
    ///
    /// # Errors
    ///
    /// Returns an error if the product list cannot be fetched.
    pub async fn find_by_barcode(
        &self,
        tenant: TenantId,
        code: &str,
    ) -> Result<Option<Product>, BackendError> {
        let products = self.products(tenant).await?;
        Ok(products
            .iter()
            .find(|p| p.barcode.as_deref() == Some(code))
            .cloned())
    }

    /// Recent transactions for `tenant`.
    ///
    /// # Errors
    ///
    /// Returns an error if the list is not cached and cannot be fetched.
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn recent_transactions(
        &self,
        tenant: TenantId,
    ) -> Result<Arc<Vec<TransactionSummary>>, BackendError> {
        let key = CacheKey::Transactions(tenant);
        if let Some(CacheValue::Transactions(transactions)) = self.cache.get(&key).await {
            debug!("Cache hit for transactions");
            return Ok(transactions);
        }

        let transactions = Arc::new(self.source.recent_transactions(tenant).await?);
        self.cache
            .insert(key, CacheValue::Transactions(Arc::clone(&transactions)))
            .await;
        Ok(transactions)
    }

    /// Drop both views for `tenant` after a sale.
    pub async fn invalidate_sale_views(&self, tenant: TenantId) {
        self.cache.invalidate(&CacheKey::Products(tenant)).await;
        self.cache.invalidate(&CacheKey::Transactions(tenant)).await;
        debug!(%tenant, "Register views invalidated");
    }
}
