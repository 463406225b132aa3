//! Printable receipts.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tillwise_core::{CurrencyCode, Money, PaymentMethod, TransactionId};

use super::cart::{Cart, CartTotals};
use super::transaction::TransactionReceipt;

/// Receipt width in characters.
const WIDTH: usize = 40;

/// One printed line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptLine {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// A completed sale as shown to the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub transaction_id: TransactionId,
    pub transaction_number: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub payment_method: PaymentMethod,
    pub lines: Vec<ReceiptLine>,
    pub totals: CartTotals,
    pub currency: CurrencyCode,
}

impl Receipt {
    /// Combine the backend's confirmation with the cart as it was sold.
    #[must_use]
    pub fn new(
        confirmation: &TransactionReceipt,
        cart: &Cart,
        payment_method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Self {
        let mut totals = cart.totals();
        if let Some(total) = confirmation.total {
            totals.total = total;
        }

        Self {
            transaction_id: confirmation.transaction_id,
            transaction_number: confirmation.transaction_number.clone(),
            issued_at: confirmation.created_at.unwrap_or(now),
            payment_method,
            lines: cart
                .items()
                .iter()
                .map(|item| ReceiptLine {
                    name: item.name.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    line_total: item.line_total(),
                })
                .collect(),
            totals,
            currency: CurrencyCode::default(),
        }
    }

    fn money(&self, amount: Decimal) -> String {
        Money::new(amount, self.currency).to_string()
    }

    /// Plain-text rendering with amounts rounded to cents.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let rule = "-".repeat(WIDTH);
        let number = self
            .transaction_number
            .clone()
            .unwrap_or_else(|| self.transaction_id.to_string());

        let _ = writeln!(out, "Receipt {number}");
        let _ = writeln!(out, "{}", self.issued_at.format("%Y-%m-%d %H:%M UTC"));
        let _ = writeln!(out, "{rule}");

        for line in &self.lines {
            let _ = writeln!(out, "{}", line.name);
            let detail = format!("  {} x {}", line.quantity, self.money(line.unit_price));
            let _ = writeln!(out, "{}", columns(&detail, &self.money(line.line_total)));
        }

        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "{}", columns("Subtotal", &self.money(self.totals.subtotal)));
        if !self.totals.discount_amount.is_zero() {
            let _ = writeln!(
                out,
                "{}",
                columns("Discount", &self.money(-self.totals.discount_amount))
            );
        }
        let _ = writeln!(out, "{}", columns("Tax", &self.money(self.totals.tax_amount)));
        let _ = writeln!(out, "{}", columns("Total", &self.money(self.totals.total)));
        let _ = writeln!(out, "{}", columns("Paid by", &self.payment_method.to_string()));

        out
    }
}

fn columns(left: &str, right: &str) -> String {
    let pad = WIDTH.saturating_sub(left.chars().count() + right.chars().count()).max(1);
    format!("{left}{}{right}", " ".repeat(pad))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use tillwise_core::ProductId;

    use super::*;
    use crate::pos::cart::{DiscountKind, Product};

    #[test]
    fn test_render_rounds_to_cents() {
        let mut cart = Cart::new(Decimal::from_str("0.0825").unwrap()).unwrap();
        let product = Product {
            id: ProductId::generate(),
            name: "House Blend 1lb".to_string(),
            sku: None,
            barcode: None,
            price: Decimal::from(10),
            stock: 3,
        };
        cart.add_item(&product).unwrap();
        cart.add_item(&product).unwrap();
        cart.apply_discount(DiscountKind::Fixed, Decimal::from(5)).unwrap();

        let confirmation = TransactionReceipt {
            transaction_id: TransactionId::generate(),
            transaction_number: Some("POS-000042".to_string()),
            total: None,
            created_at: None,
        };
        let text = Receipt::new(&confirmation, &cart, PaymentMethod::Cash, Utc::now()).render();

        assert!(text.starts_with("Receipt POS-000042"));
        assert!(text.contains("2 x $10.00"));
        assert!(text.contains("-$5.00"));
        assert!(text.contains("$1.24"));
        assert!(text.contains("$16.24"));
        assert!(text.contains("cash"));
        assert!(text.lines().all(|l| l.chars().count() <= WIDTH));
    }
}
