//! Console configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BACKEND_URL` - Base URL of the hosted backend (REST and RPC)
//! - `BACKEND_ANON_KEY` - Public anon key sent with every backend request
//! - `CONSOLE_BASE_URL` - Origin of the console, used to validate checkout redirects
//!
//! ## Optional
//! - `TENANT_ID` - Tenant to operate on (CLI commands may override it)
//! - `CREDIT_POLICY_PATH` - YAML credit policy (default: built-in policy)
//! - `STATE_DIR` - Directory for the local side table (default: `.tillwise`)
//! - `POS_TAX_RATE` - Register tax rate as a fraction, e.g. `0.0825` (default: 0)
//! - `BALANCE_CACHE_TTL_SECS` - Credit balance cache lifetime (default: 30)
//! - `OFFLINE_MAX_RETRIES` - Replay attempts before a queued sale is abandoned (default: 5)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Sentry error sample rate (default: 1.0)

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use tillwise_core::TenantId;
use url::Url;

use crate::credits::{CreditPolicy, PolicyError};
use crate::offline::DEFAULT_MAX_RETRIES;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_STATE_DIR: &str = ".tillwise";
const DEFAULT_BALANCE_CACHE_TTL_SECS: u64 = 30;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
    #[error("Credit policy error: {0}")]
    Policy(#[from] PolicyError),
}

/// Console configuration.
///
/// Implements `Debug` manually to redact the backend key.
#[derive(Clone)]
pub struct ConsoleConfig {
    /// Hosted backend base URL
    pub backend_url: Url,
    /// Backend anon key
    pub backend_anon_key: SecretString,
    /// Console origin for checkout redirects
    pub console_base_url: Url,
    /// Default tenant
    pub tenant_id: Option<TenantId>,
    /// Credit policy override
    pub credit_policy_path: Option<PathBuf>,
    /// Local side table directory
    pub state_dir: PathBuf,
    /// Register tax rate
    pub pos_tax_rate: Decimal,
    /// Balance cache TTL
    pub balance_cache_ttl: Duration,
    /// Offline replay attempts
    pub offline_max_retries: u32,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
}

impl std::fmt::Debug for ConsoleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleConfig")
            .field("backend_url", &self.backend_url.as_str())
            .field("backend_anon_key", &"[REDACTED]")
            .field("console_base_url", &self.console_base_url.as_str())
            .field("tenant_id", &self.tenant_id)
            .field("credit_policy_path", &self.credit_policy_path)
            .field("state_dir", &self.state_dir)
            .field("pos_tax_rate", &self.pos_tax_rate)
            .field("balance_cache_ttl", &self.balance_cache_ttl)
            .field("offline_max_retries", &self.offline_max_retries)
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[REDACTED]"))
            .field("sentry_environment", &self.sentry_environment)
            .field("sentry_sample_rate", &self.sentry_sample_rate)
            .finish()
    }
}

impl ConsoleConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the anon key fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let backend_url = get_required_url("BACKEND_URL")?;
        let backend_anon_key = get_validated_secret("BACKEND_ANON_KEY")?;
        let console_base_url = get_required_url("CONSOLE_BASE_URL")?;

        let tenant_id = get_optional_env("TENANT_ID")
            .map(|raw| parse_env::<TenantId>("TENANT_ID", &raw))
            .transpose()?;

        let pos_tax_rate = parse_env::<Decimal>("POS_TAX_RATE", &get_env_or_default("POS_TAX_RATE", "0"))?;
        if pos_tax_rate < Decimal::ZERO {
            return Err(ConfigError::InvalidEnvVar(
                "POS_TAX_RATE".to_string(),
                "must not be negative".to_string(),
            ));
        }

        let ttl_secs = parse_env::<u64>(
            "BALANCE_CACHE_TTL_SECS",
            &get_env_or_default(
                "BALANCE_CACHE_TTL_SECS",
                &DEFAULT_BALANCE_CACHE_TTL_SECS.to_string(),
            ),
        )?;

        let offline_max_retries = parse_env::<u32>(
            "OFFLINE_MAX_RETRIES",
            &get_env_or_default("OFFLINE_MAX_RETRIES", &DEFAULT_MAX_RETRIES.to_string()),
        )?;

        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);

        Ok(Self {
            backend_url,
            backend_anon_key,
            console_base_url,
            tenant_id,
            credit_policy_path: get_optional_env("CREDIT_POLICY_PATH").map(PathBuf::from),
            state_dir: PathBuf::from(get_env_or_default("STATE_DIR", DEFAULT_STATE_DIR)),
            pos_tax_rate,
            balance_cache_ttl: Duration::from_secs(ttl_secs),
            offline_max_retries,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate,
        })
    }

    /// Load the credit policy this configuration points at.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Policy` if the YAML cannot be read or fails
    /// validation.
    pub fn load_policy(&self) -> Result<CreditPolicy, ConfigError> {
        let policy = match &self.credit_policy_path {
            Some(path) => CreditPolicy::from_path(path)?,
            None => CreditPolicy::builtin()?,
        };
        Ok(policy)
    }

    /// Directory holding the local side table.
    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as an absolute URL.
fn get_required_url(key: &str) -> Result<Url, ConfigError> {
    let value = get_required_env(key)?;
    Url::parse(&value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment value, naming the variable on failure.
fn parse_env<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
