//! Point-of-sale register.
//!
//! Cart math, checkout through the atomic transaction RPC, offline queuing,
//! barcode scanning and receipts.

pub mod barcode;
pub mod cart;
pub mod catalog;
pub mod receipt;
pub mod register;
pub mod transaction;

pub use barcode::{BarcodeScanner, KeyInput};
pub use cart::{AddOutcome, Cart, CartError, CartItem, CartTotals, Discount, DiscountKind, Product};
pub use catalog::{ProductCatalog, ProductSource, TransactionSummary};
pub use receipt::Receipt;
pub use register::{CheckoutError, CheckoutOutcome, Register, ScanOutcome};
pub use transaction::{
    InsufficientItem, TransactionErrorCode, TransactionFailure, TransactionReceipt,
    TransactionRequest, TransactionResult,
};
