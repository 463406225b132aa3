//! Tillwise Core - Shared types library.
//!
//! This crate provides common types used across all Tillwise components:
//! - `admin` - Credits gate, grace period, and POS register library
//! - `cli` - Command-line tools for policy checks and offline queue replay
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no network clients, no local
//! storage. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money, action keys, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
