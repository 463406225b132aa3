//! In-memory register cart.
//!
//! Holds line items with the unit price captured when each product was
//! added, an optional discount, the tax rate and the selected customer.
//! Totals are always derived, never stored.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tillwise_core::{CustomerId, ProductId};

/// Errors from cart operations. None of them mutate the cart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("{name} is out of stock")]
    OutOfStock { name: String },

    #[error("product {0} is not in the cart")]
    NotInCart(ProductId),

    #[error("{0}")]
    InvalidDiscount(&'static str),

    #[error("tax rate must not be negative")]
    NegativeTaxRate,
}

/// A sellable product as listed at the register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    /// Current unit price.
    pub price: Decimal,
    /// Units on hand.
    pub stock: i32,
}

/// A cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub name: String,
    /// Price when the product was added.
    pub unit_price: Decimal,
    /// Always within `1..=stock_at_add`.
    pub quantity: u32,
    /// Stock when the product was last added.
    pub stock_at_add: u32,
}

impl CartItem {
    /// `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// How a discount is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// Percent of the subtotal, `0..=100`.
    Percentage,
    /// Fixed amount, at most the subtotal when applied.
    Fixed,
}

/// A discount applied to the whole cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub kind: DiscountKind,
    pub value: Decimal,
}

/// Result of adding a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// New line with quantity 1.
    Added,
    /// Existing line incremented to `quantity`.
    Incremented { quantity: u32 },
    /// Existing line already at the stock limit; unchanged.
    AtStockLimit { quantity: u32 },
}

/// Derived cart totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    pub subtotal: Decimal,
    /// Never more than `subtotal`.
    pub discount_amount: Decimal,
    /// `subtotal - discount_amount`.
    pub taxable_amount: Decimal,
    pub tax_amount: Decimal,
    /// `max(0, taxable_amount + tax_amount)`.
    pub total: Decimal,
}

/// The register's cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
    discount: Option<Discount>,
    tax_rate: Decimal,
    customer: Option<CustomerId>,
}

fn stock_limit(stock: i32) -> u32 {
    u32::try_from(stock).unwrap_or(0)
}

impl Cart {
    /// Empty cart taxed at `tax_rate` (e.g. `0.0825`).
    ///
    /// # Errors
    ///
    /// Returns `CartError::NegativeTaxRate` for a negative rate.
    pub fn new(tax_rate: Decimal) -> Result<Self, CartError> {
        if tax_rate < Decimal::ZERO {
            return Err(CartError::NegativeTaxRate);
        }
        Ok(Self {
            tax_rate,
            ..Self::default()
        })
    }

    /// Lines in the order they were added.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total units across all lines.
    #[must_use]
    pub fn unit_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    #[must_use]
    pub const fn discount(&self) -> Option<Discount> {
        self.discount
    }

    #[must_use]
    pub const fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    #[must_use]
    pub const fn customer(&self) -> Option<CustomerId> {
        self.customer
    }

    pub const fn set_customer(&mut self, customer: Option<CustomerId>) {
        self.customer = customer;
    }

    /// Add one unit of `product`.
    ///
    /// # Errors
    ///
    /// Returns `CartError::OutOfStock` when the product has no stock.
    pub fn add_item(&mut self, product: &Product) -> Result<AddOutcome, CartError> {
        if product.stock <= 0 {
            return Err(CartError::OutOfStock {
                name: product.name.clone(),
            });
        }
        let stock = stock_limit(product.stock);

        if let Some(item) = self.items.iter_mut().find(|i| i.product_id == product.id) {
            item.stock_at_add = stock;
            if item.quantity >= stock {
                item.quantity = stock;
                return Ok(AddOutcome::AtStockLimit {
                    quantity: item.quantity,
                });
            }
            item.quantity += 1;
            return Ok(AddOutcome::Incremented {
                quantity: item.quantity,
            });
        }

        self.items.push(CartItem {
            product_id: product.id,
            name: product.name.clone(),
            unit_price: product.price,
            quantity: 1,
            stock_at_add: stock,
        });
        Ok(AddOutcome::Added)
    }

    /// Change a line's quantity by `delta`, clamped to `[1, stock]`.
    ///
    /// Returns the new quantity.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotInCart` if the product has no line.
    pub fn update_quantity(&mut self, product_id: ProductId, delta: i64) -> Result<u32, CartError> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.product_id == product_id)
            .ok_or(CartError::NotInCart(product_id))?;

        let max = i64::from(item.stock_at_add.max(1));
        let next = i64::from(item.quantity).saturating_add(delta).clamp(1, max);
        item.quantity = u32::try_from(next).unwrap_or(1);
        Ok(item.quantity)
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotInCart` if the product has no line.
    pub fn remove_item(&mut self, product_id: ProductId) -> Result<CartItem, CartError> {
        let idx = self
            .items
            .iter()
            .position(|i| i.product_id == product_id)
            .ok_or(CartError::NotInCart(product_id))?;
        Ok(self.items.remove(idx))
    }

    /// Apply a discount, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidDiscount` for a negative value, a
    /// percentage above 100, or a fixed amount above the subtotal. The cart
    /// is left unchanged.
    pub fn apply_discount(&mut self, kind: DiscountKind, value: Decimal) -> Result<(), CartError> {
        if value < Decimal::ZERO {
            return Err(CartError::InvalidDiscount("Discount cannot be negative"));
        }
        match kind {
            DiscountKind::Percentage if value > Decimal::ONE_HUNDRED => {
                return Err(CartError::InvalidDiscount("Percentage discount cannot exceed 100%"));
            }
            DiscountKind::Fixed if value > self.subtotal() => {
                return Err(CartError::InvalidDiscount("Discount cannot exceed the subtotal"));
            }
            _ => {}
        }
        self.discount = Some(Discount { kind, value });
        Ok(())
    }

    pub const fn clear_discount(&mut self) {
        self.discount = None;
    }

    /// Empty the cart, keeping the tax rate.
    pub fn clear(&mut self) {
        self.items.clear();
        self.discount = None;
        self.customer = None;
    }

    /// Take the units of `sold` out of this cart.
    ///
    /// Lines added or grown after `sold` was copied stay behind, as do a
    /// discount or customer that changed in the meantime.
    pub fn settle(&mut self, sold: &Self) {
        for line in &sold.items {
            if let Some(item) = self.items.iter_mut().find(|i| i.product_id == line.product_id) {
                item.quantity = item.quantity.saturating_sub(line.quantity);
            }
        }
        self.items.retain(|i| i.quantity > 0);
        if self.discount == sold.discount {
            self.discount = None;
        }
        if self.customer == sold.customer {
            self.customer = None;
        }
    }

    /// Sum of line totals.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Derive the totals at full precision.
    #[must_use]
    pub fn totals(&self) -> CartTotals {
        let subtotal = self.subtotal();
        let discount_amount = match self.discount {
            None => Decimal::ZERO,
            Some(Discount {
                kind: DiscountKind::Percentage,
                value,
            }) => subtotal * value / Decimal::ONE_HUNDRED,
            Some(Discount {
                kind: DiscountKind::Fixed,
                value,
            }) => value,
        }
        .clamp(Decimal::ZERO, subtotal.max(Decimal::ZERO));

        let taxable_amount = subtotal - discount_amount;
        let tax_amount = taxable_amount * self.tax_rate;
        let total = (taxable_amount + tax_amount).max(Decimal::ZERO);

        CartTotals {
            subtotal,
            discount_amount,
            taxable_amount,
            tax_amount,
            total,
        }
    }
}
