//! Core types for Tillwise.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod action;
pub mod id;
pub mod money;
pub mod status;

pub use action::{ActionKey, ActionKeyError};
pub use id::*;
pub use money::{CurrencyCode, DISPLAY_SCALE, Money, round_for_display};
pub use status::*;
