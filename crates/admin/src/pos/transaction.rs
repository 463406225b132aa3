//! Atomic transaction RPC payloads.
//!
//! The backend procedure deducts stock and records the sale in one
//! database transaction. It answers with a tagged object: either
//! `{"success": true, ...}` or `{"success": false, "error_code": ...}`.
//! Structured rejections are ordinary results here; only transport
//! failures and unrecognized shapes are errors.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tillwise_core::{CustomerId, PaymentMethod, ProductId, TenantId, TransactionId, round_for_display};

use super::cart::{Cart, CartTotals};

// =============================================================================
// Request
// =============================================================================

/// One line sent to the RPC, priced at the snapshot taken when added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLine {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
}

/// Arguments of `create_pos_transaction_atomic`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub p_tenant_id: TenantId,
    pub p_items: Vec<TransactionLine>,
    pub p_payment_method: PaymentMethod,
    #[serde(with = "rust_decimal::serde::float")]
    pub p_subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub p_tax_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub p_discount_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_customer_id: Option<CustomerId>,
}

impl TransactionRequest {
    /// Build the request for `cart`. Amounts are rounded to cents.
    #[must_use]
    pub fn from_cart(tenant: TenantId, cart: &Cart, payment_method: PaymentMethod) -> Self {
        let CartTotals {
            subtotal,
            discount_amount,
            tax_amount,
            ..
        } = cart.totals();

        Self {
            p_tenant_id: tenant,
            p_items: cart
                .items()
                .iter()
                .map(|item| TransactionLine {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
            p_payment_method: payment_method,
            p_subtotal: round_for_display(subtotal),
            p_tax_amount: round_for_display(tax_amount),
            p_discount_amount: round_for_display(discount_amount),
            p_customer_id: cart.customer(),
        }
    }
}

// =============================================================================
// Result
// =============================================================================

/// Rejection codes returned by the RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionErrorCode {
    NegativeTotal,
    EmptyCart,
    InvalidQuantity,
    ProductNotFound,
    InsufficientStock,
    TransactionFailed,
    /// A code this version does not know.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for TransactionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::NegativeTotal => "NEGATIVE_TOTAL",
            Self::EmptyCart => "EMPTY_CART",
            Self::InvalidQuantity => "INVALID_QUANTITY",
            Self::ProductNotFound => "PRODUCT_NOT_FOUND",
            Self::InsufficientStock => "INSUFFICIENT_STOCK",
            Self::TransactionFailed => "TRANSACTION_FAILED",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(code)
    }
}

/// A line the backend could not fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsufficientItem {
    #[serde(default, alias = "productId")]
    pub product_id: Option<ProductId>,
    #[serde(alias = "productName")]
    pub product_name: String,
    pub requested: i64,
    pub available: i64,
}

/// A completed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionReceipt {
    pub transaction_id: TransactionId,
    /// Human-readable number printed on receipts.
    pub transaction_number: Option<String>,
    /// Total charged, as recorded by the backend.
    pub total: Option<Decimal>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A structured rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionFailure {
    pub code: TransactionErrorCode,
    /// Message supplied by the backend, if any.
    pub message: Option<String>,
    pub insufficient_items: Vec<InsufficientItem>,
}

impl TransactionFailure {
    /// Message for the cashier.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self.code {
            TransactionErrorCode::InsufficientStock if !self.insufficient_items.is_empty() => {
                let lines: Vec<String> = self
                    .insufficient_items
                    .iter()
                    .map(|item| {
                        format!(
                            "{}: need {}, have {}",
                            item.product_name, item.requested, item.available
                        )
                    })
                    .collect();
                format!("Not enough stock. {}", lines.join("; "))
            }
            TransactionErrorCode::InsufficientStock => {
                "Not enough stock for one or more items.".to_string()
            }
            TransactionErrorCode::NegativeTotal => {
                "The total can't be negative. Check the discount.".to_string()
            }
            TransactionErrorCode::EmptyCart => "The cart is empty.".to_string(),
            TransactionErrorCode::InvalidQuantity => {
                "One or more quantities are invalid.".to_string()
            }
            TransactionErrorCode::ProductNotFound => {
                "A product in the cart no longer exists. Remove it and try again.".to_string()
            }
            TransactionErrorCode::TransactionFailed | TransactionErrorCode::Unknown => self
                .message
                .clone()
                .unwrap_or_else(|| "The transaction could not be completed. Please try again.".to_string()),
        }
    }
}

/// Decoded RPC response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawTransactionResult")]
pub enum TransactionResult {
    Success(TransactionReceipt),
    Failure(TransactionFailure),
}

#[derive(Debug, Deserialize)]
struct RawTransactionResult {
    success: bool,
    #[serde(default, alias = "transactionId")]
    transaction_id: Option<TransactionId>,
    #[serde(default, alias = "transactionNumber")]
    transaction_number: Option<String>,
    #[serde(default)]
    total: Option<Decimal>,
    #[serde(default, alias = "createdAt")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "errorCode")]
    error_code: Option<TransactionErrorCode>,
    #[serde(default, alias = "error")]
    message: Option<String>,
    #[serde(default, alias = "insufficientItems")]
    insufficient_items: Option<Vec<InsufficientItem>>,
}

impl TryFrom<RawTransactionResult> for TransactionResult {
    type Error = String;

    fn try_from(raw: RawTransactionResult) -> Result<Self, Self::Error> {
        if raw.success {
            let transaction_id = raw
                .transaction_id
                .ok_or_else(|| "successful transaction without transaction_id".to_string())?;
            return Ok(Self::Success(TransactionReceipt {
                transaction_id,
                transaction_number: raw.transaction_number,
                total: raw.total,
                created_at: raw.created_at,
            }));
        }

        Ok(Self::Failure(TransactionFailure {
            code: raw.error_code.unwrap_or(TransactionErrorCode::TransactionFailed),
            message: raw.message,
            insufficient_items: raw.insufficient_items.unwrap_or_default(),
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;

    use super::*;
    use crate::pos::cart::{DiscountKind, Product};

    #[test]
    fn test_request_wire_shape() {
        let mut cart = Cart::new(Decimal::from_str("0.0825").unwrap()).unwrap();
        let product = Product {
            id: ProductId::generate(),
            name: "Oat Latte".to_string(),
            sku: None,
            barcode: None,
            price: Decimal::from(10),
            stock: 5,
        };
        cart.add_item(&product).unwrap();
        cart.add_item(&product).unwrap();
        cart.apply_discount(DiscountKind::Fixed, Decimal::from(5)).unwrap();
        let tenant = TenantId::generate();

        let value =
            serde_json::to_value(TransactionRequest::from_cart(tenant, &cart, PaymentMethod::Card))
                .unwrap();

        assert_eq!(value["p_tenant_id"], json!(tenant.to_string()));
        assert_eq!(value["p_payment_method"], json!("card"));
        assert_eq!(value["p_subtotal"], json!(20.0));
        assert_eq!(value["p_discount_amount"], json!(5.0));
        assert_eq!(value["p_tax_amount"], json!(1.24));
        assert_eq!(value["p_items"][0]["quantity"], json!(2));
        assert_eq!(value["p_items"][0]["unit_price"], json!(10.0));
        assert!(value.get("p_customer_id").is_none());
    }

    #[test]
    fn test_parse_success() {
        let id = TransactionId::generate();
        let result: TransactionResult = serde_json::from_value(json!({
            "success": true,
            "transaction_id": id,
            "transaction_number": "POS-000123",
            "total": 16.24
        }))
        .unwrap();

        match result {
            TransactionResult::Success(receipt) => {
                assert_eq!(receipt.transaction_id, id);
                assert_eq!(receipt.transaction_number.as_deref(), Some("POS-000123"));
                assert_eq!(receipt.total, Some(Decimal::from_str("16.24").unwrap()));
            }
            TransactionResult::Failure(f) => panic!("unexpected failure {f:?}"),
        }
    }

    #[test]
    fn test_insufficient_stock_message() {
        let result: TransactionResult = serde_json::from_value(json!({
            "success": false,
            "errorCode": "INSUFFICIENT_STOCK",
            "insufficientItems": [{ "product_name": "X", "requested": 10, "available": 5 }]
        }))
        .unwrap();

        let TransactionResult::Failure(failure) = result else {
            panic!("expected failure");
        };
        assert_eq!(failure.code, TransactionErrorCode::InsufficientStock);
        assert!(failure.user_message().contains("X: need 10, have 5"));
    }

    #[test]
    fn test_unknown_code_uses_backend_message() {
        let result: TransactionResult = serde_json::from_value(json!({
            "success": false,
            "error_code": "REGISTER_CLOSED",
            "error": "Register is closed"
        }))
        .unwrap();

        let TransactionResult::Failure(failure) = result else {
            panic!("expected failure");
        };
        assert_eq!(failure.code, TransactionErrorCode::Unknown);
        assert_eq!(failure.user_message(), "Register is closed");
    }

    #[test]
    fn test_unrecognized_shapes_are_errors() {
        assert!(serde_json::from_value::<TransactionResult>(json!({ "ok": true })).is_err());
        assert!(serde_json::from_value::<TransactionResult>(json!({ "success": true })).is_err());
    }
}
