//! Register quote command.
//!
//! Prices a cart without touching the backend, using the same math as the
//! register.
//!
//! # Usage
//!
//! ```bash
//! # Two coffees and a pastry, 10% off, 8.25% tax
//! tw-cli cart quote --item "Latte:4.50:2" --item "Croissant:3.25" \
//!     --discount 10% --tax-rate 0.0825
//! ```

use std::fmt::Write as _;
use std::str::FromStr;

use rust_decimal::Decimal;
use tillwise_admin::ConsoleError;
use tillwise_admin::pos::{Cart, CartTotals, DiscountKind, Product};
use tillwise_core::{CurrencyCode, Money, ProductId};

/// A line given on the command line as `NAME:PRICE[:QTY]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteLine {
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
}

impl FromStr for QuoteLine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let name = parts
            .next()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| format!("missing item name in {s:?}"))?;
        let price = parts
            .next()
            .ok_or_else(|| format!("missing price in {s:?}"))?
            .trim()
            .parse::<Decimal>()
            .map_err(|e| format!("invalid price in {s:?}: {e}"))?;
        let quantity = match parts.next() {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid quantity in {s:?}: {e}"))?,
            None => 1,
        };
        if parts.next().is_some() {
            return Err(format!("expected NAME:PRICE[:QTY], got {s:?}"));
        }
        if quantity == 0 {
            return Err(format!("quantity must be at least 1 in {s:?}"));
        }

        Ok(Self {
            name: name.to_string(),
            price,
            quantity,
        })
    }
}

/// A discount given as `10%` or `5.00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteDiscount {
    pub kind: DiscountKind,
    pub value: Decimal,
}

impl FromStr for QuoteDiscount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (kind, raw) = match s.strip_suffix('%') {
            Some(pct) => (DiscountKind::Percentage, pct),
            None => (DiscountKind::Fixed, s),
        };
        let value = raw
            .trim()
            .parse::<Decimal>()
            .map_err(|e| format!("invalid discount {s:?}: {e}"))?;
        Ok(Self { kind, value })
    }
}

/// Build a cart from the given lines and return its totals.
///
/// # Errors
///
/// Returns a cart error for a negative tax rate, a negative price or an
/// invalid discount.
pub fn build_quote(
    lines: &[QuoteLine],
    discount: Option<QuoteDiscount>,
    tax_rate: Decimal,
) -> Result<Cart, ConsoleError> {
    let mut cart = Cart::new(tax_rate)?;

    for line in lines {
        if line.price < Decimal::ZERO {
            return Err(ConsoleError::BadRequest(format!(
                "price of {} cannot be negative",
                line.name
            )));
        }
        let product = Product {
            id: ProductId::generate(),
            name: line.name.clone(),
            sku: None,
            barcode: None,
            price: line.price,
            stock: i32::try_from(line.quantity).unwrap_or(i32::MAX),
        };
        cart.add_item(&product)?;
        if line.quantity > 1 {
            cart.update_quantity(product.id, i64::from(line.quantity) - 1)?;
        }
    }

    if let Some(discount) = discount {
        cart.apply_discount(discount.kind, discount.value)?;
    }

    Ok(cart)
}

/// Price a cart and render the totals.
///
/// # Errors
///
/// See [`build_quote`].
pub fn quote(
    lines: &[QuoteLine],
    discount: Option<QuoteDiscount>,
    tax_rate: Decimal,
) -> Result<String, ConsoleError> {
    if lines.is_empty() {
        return Err(ConsoleError::BadRequest("add at least one --item".to_string()));
    }
    let cart = build_quote(lines, discount, tax_rate)?;
    Ok(render(&cart, &cart.totals()))
}

fn render(cart: &Cart, totals: &CartTotals) -> String {
    let money = |amount: Decimal| Money::new(amount, CurrencyCode::default()).to_string();
    let mut out = String::new();

    for item in cart.items() {
        let _ = writeln!(
            out,
            "{:<24} {:>3} x {:>9} {:>10}",
            item.name,
            item.quantity,
            money(item.unit_price),
            money(item.line_total())
        );
    }
    let _ = writeln!(out, "{:<40} {:>10}", "Subtotal", money(totals.subtotal));
    if !totals.discount_amount.is_zero() {
        let _ = writeln!(out, "{:<40} {:>10}", "Discount", money(-totals.discount_amount));
    }
    let _ = writeln!(out, "{:<40} {:>10}", "Tax", money(totals.tax_amount));
    let _ = writeln!(out, "{:<40} {:>10}", "Total", money(totals.total));
    out
}
