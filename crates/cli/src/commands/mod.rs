//! Command implementations.
//!
//! Each command returns the text to print. `main` owns stdout.

pub mod cart;
pub mod credits;
pub mod policy;
pub mod promo;
pub mod queue;

use std::path::Path;
use std::sync::Arc;

use tillwise_admin::backend::BackendClient;
use tillwise_admin::credits::CreditPolicy;
use tillwise_admin::store::FileStore;
use tillwise_admin::{ConsoleConfig, ConsoleError};
use tillwise_core::TenantId;

/// Everything a backend-facing command needs.
pub struct Context {
    pub config: ConsoleConfig,
    pub policy: Arc<CreditPolicy>,
    pub client: BackendClient,
    pub store: Arc<FileStore>,
}

impl Context {
    /// Build the context from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy, backend client or state directory
    /// cannot be set up.
    pub fn new(config: ConsoleConfig) -> Result<Self, ConsoleError> {
        let policy = Arc::new(config.load_policy()?);
        let client = BackendClient::new(
            config.backend_url.clone(),
            config.backend_anon_key.clone(),
        )?;
        let store = Arc::new(FileStore::in_dir(config.state_dir())?);
        tracing::debug!(state = %store.path().display(), "Local state opened");

        Ok(Self {
            config,
            policy,
            client,
            store,
        })
    }

    /// Tenant from the flag, falling back to `TENANT_ID`.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if neither is set.
    pub fn tenant(&self, flag: Option<TenantId>) -> Result<TenantId, ConsoleError> {
        let tenant = flag.or(self.config.tenant_id).ok_or_else(|| {
            ConsoleError::BadRequest("no tenant: pass --tenant or set TENANT_ID".to_string())
        })?;
        tillwise_admin::error::set_sentry_tenant(tenant);
        Ok(tenant)
    }
}

/// Load a policy from `path`, or the built-in one.
///
/// # Errors
///
/// Returns an error if the file cannot be read or fails validation.
pub fn load_policy(path: Option<&Path>) -> Result<CreditPolicy, ConsoleError> {
    let policy = match path {
        Some(path) => CreditPolicy::from_path(path)?,
        None => CreditPolicy::builtin()?,
    };
    Ok(policy)
}
