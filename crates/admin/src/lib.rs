//! Tillwise console library.
//!
//! Credit metering and point-of-sale orchestration for the Tillwise
//! console, written against the hosted backend that owns the ledger,
//! inventory and transaction storage.
//!
//! # Modules
//!
//! - [`credits`] - Cost table, credit gate, grace period, purchases, promos
//! - [`pos`] - Cart, checkout, barcode scanning, receipts
//! - [`offline`] - Queue of requests captured while offline, and replay
//! - [`backend`] - HTTP client and the traits the rest of the crate talks to
//! - [`store`] - Local key-value side table
//!
//! # Security
//!
//! The console only ever holds the backend's public anon key. Credit
//! deduction and balance checks are authoritative on the backend; the gate
//! here is advisory and must fail closed.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod credits;
pub mod error;
pub mod notify;
pub mod offline;
pub mod pos;
pub mod store;
pub mod telemetry;

pub use config::{ConfigError, ConsoleConfig};
pub use error::ConsoleError;
pub use notify::{Notification, NotificationBus, NotificationLevel};
