//! "Don't ask again" preferences for high-cost confirmations.

use std::collections::BTreeSet;

use tillwise_core::{ActionKey, TenantId};
use tracing::debug;

use crate::store::{KeyValueStore, KeyValueStoreExt, StoreError};

/// Per-tenant set of actions whose confirmation prompt is skipped.
#[derive(Debug)]
pub struct ConfirmationPrefs<S> {
    store: S,
}

impl<S: KeyValueStore> ConfirmationPrefs<S> {
    /// Create preferences over `store`.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    fn key(tenant: TenantId) -> String {
        format!("credits:skip_confirm:{tenant}")
    }

    fn load(&self, tenant: TenantId) -> Result<BTreeSet<ActionKey>, StoreError> {
        Ok(self.store.get_json(&Self::key(tenant))?.unwrap_or_default())
    }

    /// Whether the prompt for `action` is skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn skips(&self, tenant: TenantId, action: &ActionKey) -> Result<bool, StoreError> {
        Ok(self.load(tenant)?.contains(action))
    }

    /// Stop asking for `action`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub fn skip(&self, tenant: TenantId, action: &ActionKey) -> Result<(), StoreError> {
        let mut skipped = self.load(tenant)?;
        if skipped.insert(action.clone()) {
            debug!(%tenant, %action, "Confirmation disabled for action");
            self.store.set_json(&Self::key(tenant), &skipped)?;
        }
        Ok(())
    }

    /// Ask again for every action.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn reset(&self, tenant: TenantId) -> Result<(), StoreError> {
        self.store.remove(&Self::key(tenant))
    }
}
