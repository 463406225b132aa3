//! Credits metering.
//!
//! Gates credit-costing actions against the tenant's balance and tier,
//! tracks the zero-balance grace period, and drives the purchase, promo,
//! auto top-up and usage flows around the backend-owned ledger.

pub mod auto_topup;
pub mod balance;
pub mod cost_table;
pub mod gate;
pub mod grace;
pub mod policy;
pub mod prefs;
pub mod promo;
pub mod purchase;
pub mod usage;

pub use auto_topup::{AutoTopUpError, AutoTopUpSettings, TopUpDecision};
pub use balance::{AccountSnapshot, BalanceCache, BalanceLevel, CreditAccount};
pub use cost_table::{CostCategory, CostTable, CreditCostEntry, FALLBACK_KEY};
pub use gate::{
    AllowReason, Allowance, BlockReason, BlockedState, ConfirmationPrompt, ConfirmationResponse,
    CreditGate, GateDecision, GateError, GuardOutcome,
};
pub use grace::{GraceRecord, GraceState, GraceTracker};
pub use policy::{BalanceThresholds, CreditPackage, CreditPolicy, GraceConfig, PolicyError};
pub use prefs::ConfirmationPrefs;
pub use promo::{PromoCode, PromoError, PromoRedemption, PromoService, PromoValidation};
pub use purchase::{CheckoutRedirect, CheckoutRequest, PurchaseError, PurchaseFlow};
pub use usage::{UsageEntry, UsageReport};
