//! Static credit cost table.
//!
//! Maps every gated action to its credit cost. The table must contain a
//! [`FALLBACK_KEY`] entry; unknown action keys are charged at the fallback
//! cost, so lookups never fail at call time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tillwise_core::ActionKey;

use super::policy::PolicyError;

/// Name of the mandatory fallback entry.
pub const FALLBACK_KEY: &str = "fallback";

/// Grouping used for usage analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostCategory {
    General,
    Pos,
    Storefront,
    Reports,
    Ai,
    Marketing,
    Inventory,
}

impl std::fmt::Display for CostCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::General => "general",
            Self::Pos => "pos",
            Self::Storefront => "storefront",
            Self::Reports => "reports",
            Self::Ai => "ai",
            Self::Marketing => "marketing",
            Self::Inventory => "inventory",
        };
        f.write_str(name)
    }
}

/// Cost of one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCostEntry {
    /// Credits charged (server-side) when the action completes.
    pub cost: u32,
    /// Analytics grouping.
    pub category: CostCategory,
    /// Human-readable description shown in confirmations.
    pub description: String,
}

/// Immutable action -> cost mapping with a guaranteed fallback.
#[derive(Debug, Clone)]
pub struct CostTable {
    entries: HashMap<ActionKey, CreditCostEntry>,
    fallback: CreditCostEntry,
}

impl CostTable {
    /// Build a table from raw string keys.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::MissingFallback`] if no `fallback` entry is
    /// present, or [`PolicyError::InvalidActionKey`] if a key is malformed.
    pub fn from_entries(
        raw: impl IntoIterator<Item = (String, CreditCostEntry)>,
    ) -> Result<Self, PolicyError> {
        let mut entries = HashMap::new();
        let mut fallback = None;

        for (key, entry) in raw {
            if key == FALLBACK_KEY {
                fallback = Some(entry);
                continue;
            }
            let action = ActionKey::parse(&key).map_err(|source| PolicyError::InvalidActionKey {
                key: key.clone(),
                source,
            })?;
            entries.insert(action, entry);
        }

        let fallback = fallback.ok_or(PolicyError::MissingFallback)?;
        Ok(Self { entries, fallback })
    }

    /// Look up the entry for `action`, falling back when unknown.
    #[must_use]
    pub fn lookup(&self, action: &ActionKey) -> &CreditCostEntry {
        self.entries.get(action).unwrap_or(&self.fallback)
    }

    /// Credit cost of `action`.
    #[must_use]
    pub fn cost_of(&self, action: &ActionKey) -> u32 {
        self.lookup(action).cost
    }

    /// Whether `action` has its own entry (rather than the fallback).
    #[must_use]
    pub fn contains(&self, action: &ActionKey) -> bool {
        self.entries.contains_key(action)
    }

    /// The fallback entry.
    #[must_use]
    pub const fn fallback(&self) -> &CreditCostEntry {
        &self.fallback
    }

    /// Iterate explicit entries sorted by key.
    pub fn iter_sorted(&self) -> impl Iterator<Item = (&ActionKey, &CreditCostEntry)> {
        let mut pairs: Vec<_> = self.entries.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs.into_iter()
    }

    /// Number of explicit entries (excluding the fallback).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no explicit entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
