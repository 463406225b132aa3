//! Register checkout orchestration.
//!
//! The [`Register`] owns the cart for one tenant and drives the checkout
//! call. The backend RPC does the real work (stock deduction, recording the
//! sale); this type only decides where the request goes and how the result
//! is reflected back to the cashier.
//!
//! While a checkout is in flight a second call returns
//! [`CheckoutError::AlreadyPending`] without touching the backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tillwise_core::{CustomerId, Money, PaymentMethod, ProductId, QueuedRequestId, TenantId};
use tracing::{error, info, instrument, warn};

use super::barcode::{BarcodeScanner, KeyInput};
use super::cart::{AddOutcome, Cart, CartError, CartItem, CartTotals, DiscountKind, Product};
use super::catalog::{ProductCatalog, ProductSource};
use super::receipt::Receipt;
use super::transaction::{TransactionFailure, TransactionRequest, TransactionResult};
use crate::backend::client::CREATE_TRANSACTION_PATH;
use crate::backend::{Connectivity, TransactionRpc};
use crate::notify::{Notification, NotificationBus};
use crate::offline::{OfflineQueue, QueueError, QueuedRequest};
use crate::store::KeyValueStore;

/// Errors that stop a checkout before any request is made.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("the cart is empty")]
    EmptyCart,

    #[error("a checkout is already in progress")]
    AlreadyPending,

    #[error("sale could not be queued: {0}")]
    Queue(#[from] QueueError),

    #[error("request could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// How a checkout ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// The sale was recorded. The sold lines leave the cart.
    Completed(Receipt),
    /// Offline: the sale was queued for replay. The sold lines leave the cart.
    Queued {
        id: QueuedRequestId,
        totals: CartTotals,
    },
    /// The backend refused the sale. The cart is kept.
    Rejected {
        failure: TransactionFailure,
        message: String,
    },
    /// The request failed in transit. The cart is kept.
    Failed { message: String, retryable: bool },
}

/// Result of a completed barcode scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Product matched and added.
    Added {
        product_id: ProductId,
        outcome: AddOutcome,
    },
    /// Product matched but has no stock.
    OutOfStock { product_id: ProductId },
    /// No product has this barcode.
    NotFound { code: String },
    /// The product list could not be loaded.
    LookupFailed { code: String },
}

/// Clears the pending flag when a checkout ends, however it ends.
struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A register for one tenant.
pub struct Register<R, P, S, C> {
    tenant: TenantId,
    rpc: R,
    catalog: ProductCatalog<P>,
    queue: OfflineQueue<S>,
    connectivity: C,
    notifications: NotificationBus,
    cart: Mutex<Cart>,
    scanner: Mutex<BarcodeScanner>,
    pending: AtomicBool,
    last_receipt: Mutex<Option<Receipt>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<R, P, S, C> Register<R, P, S, C>
where
    R: TransactionRpc,
    P: ProductSource,
    S: KeyValueStore,
    C: Connectivity,
{
    /// Create a register starting from `cart`.
    #[must_use]
    pub fn new(
        tenant: TenantId,
        cart: Cart,
        rpc: R,
        catalog: ProductCatalog<P>,
        queue: OfflineQueue<S>,
        connectivity: C,
        notifications: NotificationBus,
    ) -> Self {
        Self {
            tenant,
            rpc,
            catalog,
            queue,
            connectivity,
            notifications,
            cart: Mutex::new(cart),
            scanner: Mutex::new(BarcodeScanner::default()),
            pending: AtomicBool::new(false),
            last_receipt: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn tenant(&self) -> TenantId {
        self.tenant
    }

    /// Copy of the current cart.
    #[must_use]
    pub fn cart(&self) -> Cart {
        lock(&self.cart).clone()
    }

    #[must_use]
    pub fn totals(&self) -> CartTotals {
        lock(&self.cart).totals()
    }

    /// Whether a checkout is in flight.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Receipt of the latest completed sale.
    #[must_use]
    pub fn last_receipt(&self) -> Option<Receipt> {
        lock(&self.last_receipt).clone()
    }

    /// The offline queue used when disconnected.
    #[must_use]
    pub const fn queue(&self) -> &OfflineQueue<S> {
        &self.queue
    }

    /// The cached product and transaction views.
    #[must_use]
    pub const fn catalog(&self) -> &ProductCatalog<P> {
        &self.catalog
    }

    // =========================================================================
    // Cart operations
    // =========================================================================

    /// Add one unit of `product`. Out-of-stock products raise a warning.
    ///
    /// # Errors
    ///
    /// Returns `CartError::OutOfStock` when the product has no stock.
    pub fn add_item(&self, product: &Product) -> Result<AddOutcome, CartError> {
        let result = lock(&self.cart).add_item(product);
        match &result {
            Err(e) => self
                .notifications
                .publish(Notification::warning("Out of stock", e.to_string())),
            Ok(AddOutcome::AtStockLimit { quantity }) => self.notifications.publish(
                Notification::warning("Stock limit", format!("Only {quantity} of {} in stock.", product.name)),
            ),
            Ok(_) => {}
        }
        result
    }

    /// See [`Cart::update_quantity`].
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotInCart` if the product has no line.
    pub fn update_quantity(&self, product_id: ProductId, delta: i64) -> Result<u32, CartError> {
        lock(&self.cart).update_quantity(product_id, delta)
    }

    /// See [`Cart::remove_item`].
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotInCart` if the product has no line.
    pub fn remove_item(&self, product_id: ProductId) -> Result<CartItem, CartError> {
        lock(&self.cart).remove_item(product_id)
    }

    /// See [`Cart::apply_discount`]. Rejections raise a warning.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidDiscount` when the discount is rejected.
    pub fn apply_discount(&self, kind: DiscountKind, value: Decimal) -> Result<(), CartError> {
        let result = lock(&self.cart).apply_discount(kind, value);
        if let Err(e) = &result {
            self.notifications
                .publish(Notification::warning("Invalid discount", e.to_string()));
        }
        result
    }

    pub fn clear_discount(&self) {
        lock(&self.cart).clear_discount();
    }

    pub fn set_customer(&self, customer: Option<CustomerId>) {
        lock(&self.cart).set_customer(customer);
    }

    /// Empty the cart.
    pub fn clear_cart(&self) {
        lock(&self.cart).clear();
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Check out the current cart.
    ///
    /// Offline, the sale is queued without calling the backend. Online, the
    /// atomic RPC is called once. Only a completed or queued sale takes its
    /// lines out of the cart; anything added while the call was in flight
    /// stays for the next sale.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart is empty, a checkout is already in
    /// progress, or an offline sale cannot be queued. Backend failures are
    /// reported through [`CheckoutOutcome`], not as errors.
    #[instrument(skip(self), fields(tenant = %self.tenant))]
    pub async fn checkout(
        &self,
        payment_method: PaymentMethod,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        if self
            .pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Checkout already in progress");
            return Err(CheckoutError::AlreadyPending);
        }
        let _pending = PendingGuard(&self.pending);

        let cart = self.cart();
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let request = TransactionRequest::from_cart(self.tenant, &cart, payment_method);

        if !self.connectivity.is_online() {
            return self.queue_sale(&cart, &request);
        }

        match self.rpc.create_transaction(&request).await {
            Ok(TransactionResult::Success(confirmation)) => {
                let receipt = Receipt::new(&confirmation, &cart, payment_method, Utc::now());
                lock(&self.cart).settle(&cart);
                *lock(&self.last_receipt) = Some(receipt.clone());
                self.catalog.invalidate_sale_views(self.tenant).await;

                info!(
                    transaction = %confirmation.transaction_id,
                    total = %receipt.totals.total,
                    "Sale completed"
                );
                self.notifications.publish(Notification::success(
                    "Sale completed",
                    format!("Total {}", Money::new(receipt.totals.total, receipt.currency)),
                ));
                Ok(CheckoutOutcome::Completed(receipt))
            }
            Ok(TransactionResult::Failure(failure)) => {
                let message = failure.user_message();
                info!(code = %failure.code, "Sale rejected by backend");
                self.notifications
                    .publish(Notification::error("Sale not completed", message.clone()));
                Ok(CheckoutOutcome::Rejected { failure, message })
            }
            Err(e) => {
                error!(error = %e, "Checkout request failed");
                let message =
                    "The sale could not be completed. Check your connection and try again."
                        .to_string();
                self.notifications
                    .publish(Notification::error("Checkout failed", message.clone()));
                Ok(CheckoutOutcome::Failed {
                    message,
                    retryable: e.is_retryable(),
                })
            }
        }
    }

    fn queue_sale(
        &self,
        cart: &Cart,
        request: &TransactionRequest,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let record = QueuedRequest::new(
            CREATE_TRANSACTION_PATH,
            "POST",
            serde_json::to_value(request)?,
            Utc::now(),
        );
        let id = self.queue.enqueue(record)?;
        let totals = cart.totals();
        lock(&self.cart).settle(cart);

        info!(%id, "Offline: sale queued");
        self.notifications.publish(Notification::info(
            "Sale saved offline",
            "The sale will be sent when the connection returns.",
        ));
        Ok(CheckoutOutcome::Queued { id, totals })
    }

    // =========================================================================
    // Barcode input
    // =========================================================================

    /// Feed a key event to the scanner; completes a scan on Enter.
    pub async fn handle_key(&self, key: KeyInput, at: Instant) -> Option<ScanOutcome> {
        let code = lock(&self.scanner).on_key(key, at)?;
        Some(self.handle_scan(&code).await)
    }

    /// Add the product whose barcode is exactly `code`.
    pub async fn handle_scan(&self, code: &str) -> ScanOutcome {
        let product = match self.catalog.find_by_barcode(self.tenant, code).await {
            Ok(product) => product,
            Err(e) => {
                error!(error = %e, "Product lookup failed");
                self.notifications.publish(Notification::error(
                    "Scan failed",
                    "Products could not be loaded. Try again.",
                ));
                return ScanOutcome::LookupFailed {
                    code: code.to_string(),
                };
            }
        };

        let Some(product) = product else {
            self.notifications.publish(Notification::warning(
                "Product not found",
                format!("No product has barcode {code}."),
            ));
            return ScanOutcome::NotFound {
                code: code.to_string(),
            };
        };

        match self.add_item(&product) {
            Ok(outcome) => ScanOutcome::Added {
                product_id: product.id,
                outcome,
            },
            Err(_) => ScanOutcome::OutOfStock {
                product_id: product.id,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use serde_json::json;
    use tillwise_core::TransactionId;

    use super::*;
    use crate::backend::{BackendError, NetworkStatus};
    use crate::notify::NotificationLevel;
    use crate::pos::catalog::TransactionSummary;
    use crate::store::MemoryStore;

    #[derive(Default)]
    struct FakeRpc {
        calls: AtomicUsize,
        delay: Duration,
        response: Mutex<Option<serde_json::Value>>,
    }

    impl FakeRpc {
        fn answering(value: serde_json::Value) -> Self {
            Self {
                response: Mutex::new(Some(value)),
                ..Self::default()
            }
        }
    }

    impl TransactionRpc for &FakeRpc {
        async fn create_transaction(
            &self,
            _request: &TransactionRequest,
        ) -> Result<TransactionResult, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match lock(&self.response).clone() {
                Some(value) => Ok(serde_json::from_value(value)?),
                None => Err(BackendError::Unavailable("connection reset".to_string())),
            }
        }
    }

    struct Shelf(Vec<Product>);

    impl ProductSource for &Shelf {
        async fn list_products(&self, _tenant: TenantId) -> Result<Vec<Product>, BackendError> {
            Ok(self.0.clone())
        }

        async fn recent_transactions(
            &self,
            _tenant: TenantId,
        ) -> Result<Vec<TransactionSummary>, BackendError> {
            Ok(Vec::new())
        }
    }

    fn product(name: &str, price: &str, stock: i32, barcode: &str) -> Product {
        Product {
            id: ProductId::generate(),
            name: name.to_string(),
            sku: None,
            barcode: Some(barcode.to_string()),
            price: Decimal::from_str(price).unwrap(),
            stock,
        }
    }

    fn success() -> serde_json::Value {
        json!({ "success": true, "transaction_id": TransactionId::generate() })
    }

    type TestRegister<'a> = Register<&'a FakeRpc, &'a Shelf, MemoryStore, NetworkStatus>;

    fn register<'a>(rpc: &'a FakeRpc, shelf: &'a Shelf, network: NetworkStatus) -> TestRegister<'a> {
        Register::new(
            TenantId::generate(),
            Cart::new(Decimal::from_str("0.0825").unwrap()).unwrap(),
            rpc,
            ProductCatalog::new(shelf),
            OfflineQueue::new(MemoryStore::new(), 5),
            network,
            NotificationBus::new(),
        )
    }

    #[tokio::test]
    async fn test_empty_cart_makes_no_call() {
        let rpc = FakeRpc::answering(success());
        let shelf = Shelf(vec![]);
        let register = register(&rpc, &shelf, NetworkStatus::default());

        assert!(matches!(
            register.checkout(PaymentMethod::Cash).await,
            Err(CheckoutError::EmptyCart)
        ));
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 0);
        assert!(!register.is_pending());
    }

    #[tokio::test]
    async fn test_success_clears_cart_and_keeps_receipt() {
        let rpc = FakeRpc::answering(success());
        let shelf = Shelf(vec![]);
        let register = register(&rpc, &shelf, NetworkStatus::default());
        register.add_item(&product("Mug", "12", 3, "1111")).unwrap();

        let outcome = register.checkout(PaymentMethod::Card).await.unwrap();

        assert!(matches!(outcome, CheckoutOutcome::Completed(_)));
        assert!(register.cart().is_empty());
        assert_eq!(register.last_receipt().unwrap().lines.len(), 1);
    }

    #[tokio::test]
    async fn test_double_checkout_sends_one_request() {
        let rpc = FakeRpc {
            delay: Duration::from_millis(50),
            ..FakeRpc::answering(success())
        };
        let shelf = Shelf(vec![]);
        let register = register(&rpc, &shelf, NetworkStatus::default());
        register.add_item(&product("Mug", "12", 3, "1111")).unwrap();

        let (first, second) = tokio::join!(
            register.checkout(PaymentMethod::Cash),
            register.checkout(PaymentMethod::Cash)
        );

        assert!(matches!(first, Ok(CheckoutOutcome::Completed(_))));
        assert!(matches!(second, Err(CheckoutError::AlreadyPending)));
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 1);
        assert!(!register.is_pending());
    }

    #[tokio::test]
    async fn test_item_added_during_checkout_stays_in_cart() {
        let rpc = FakeRpc {
            delay: Duration::from_millis(50),
            ..FakeRpc::answering(success())
        };
        let shelf = Shelf(vec![]);
        let register = register(&rpc, &shelf, NetworkStatus::default());
        let tea = product("Tea", "4", 5, "3333");
        register.add_item(&product("Mug", "12", 3, "1111")).unwrap();

        let (outcome, added) = tokio::join!(register.checkout(PaymentMethod::Cash), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            register.add_item(&tea)
        });

        let CheckoutOutcome::Completed(receipt) = outcome.unwrap() else {
            panic!("expected completed sale");
        };
        assert_eq!(added.unwrap(), AddOutcome::Added);
        assert_eq!(receipt.lines.len(), 1);
        let cart = register.cart();
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].product_id, tea.id);
    }

    #[tokio::test]
    async fn test_structured_failure_keeps_cart() {
        let rpc = FakeRpc::answering(json!({
            "success": false,
            "error_code": "INSUFFICIENT_STOCK",
            "insufficient_items": [{ "product_name": "X", "requested": 10, "available": 5 }]
        }));
        let shelf = Shelf(vec![]);
        let register = register(&rpc, &shelf, NetworkStatus::default());
        register.add_item(&product("X", "2", 20, "2222")).unwrap();
        let before = register.cart();
        let mut notes = register.notifications.subscribe();

        let outcome = register.checkout(PaymentMethod::Cash).await.unwrap();

        let CheckoutOutcome::Rejected { message, .. } = outcome else {
            panic!("expected rejection");
        };
        assert!(message.contains("X: need 10, have 5"));
        assert_eq!(register.cart(), before);
        assert_eq!(notes.try_recv().unwrap().level, NotificationLevel::Error);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_cart() {
        let rpc = FakeRpc::default();
        let shelf = Shelf(vec![]);
        let register = register(&rpc, &shelf, NetworkStatus::default());
        register.add_item(&product("Mug", "12", 3, "1111")).unwrap();

        let outcome = register.checkout(PaymentMethod::Cash).await.unwrap();

        assert!(matches!(outcome, CheckoutOutcome::Failed { retryable: true, .. }));
        assert!(!register.cart().is_empty());
    }

    #[tokio::test]
    async fn test_offline_checkout_queues_once() {
        let rpc = FakeRpc::answering(success());
        let shelf = Shelf(vec![]);
        let register = register(&rpc, &shelf, NetworkStatus::new(false));
        register.add_item(&product("Mug", "12", 3, "1111")).unwrap();

        let outcome = register.checkout(PaymentMethod::Cash).await.unwrap();

        assert!(matches!(outcome, CheckoutOutcome::Queued { .. }));
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 0);
        assert!(register.cart().is_empty());
        let pending = register.queue().pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].endpoint, CREATE_TRANSACTION_PATH);
        assert_eq!(pending[0].payload["p_subtotal"], json!(12.0));
    }

    #[tokio::test]
    async fn test_scanner_burst_adds_product() {
        let rpc = FakeRpc::default();
        let shelf = Shelf(vec![product("Beans", "18", 4, "1234567890")]);
        let register = register(&rpc, &shelf, NetworkStatus::default());

        let mut at = Instant::now();
        for c in "1234567890".chars() {
            assert!(register.handle_key(KeyInput::Char(c), at).await.is_none());
            at += Duration::from_millis(20);
        }
        let outcome = register.handle_key(KeyInput::Enter, at).await;

        assert!(matches!(
            outcome,
            Some(ScanOutcome::Added {
                outcome: AddOutcome::Added,
                ..
            })
        ));
        assert_eq!(register.cart().items().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_barcode_notifies() {
        let rpc = FakeRpc::default();
        let shelf = Shelf(vec![product("Beans", "18", 4, "1234567890")]);
        let register = register(&rpc, &shelf, NetworkStatus::default());
        let mut notes = register.notifications.subscribe();

        let outcome = register.handle_scan("9999999999").await;

        assert!(matches!(outcome, ScanOutcome::NotFound { .. }));
        let note = notes.try_recv().unwrap();
        assert_eq!(note.title, "Product not found");
        assert!(register.cart().is_empty());
    }
}
