//! Tillwise CLI - credit policy, register and offline queue tools.
//!
//! # Usage
//!
//! ```bash
//! # Validate the credit policy
//! tw-cli policy check --path policy.yaml
//!
//! # Price a cart
//! tw-cli cart quote --item "Latte:4.50:2" --discount 10% --tax-rate 0.0825
//!
//! # Inspect the tenant's credits
//! tw-cli credits status --tenant 3f0c...
//!
//! # Replay sales captured while offline
//! tw-cli queue replay
//! ```
//!
//! # Commands
//!
//! - `policy` - Validate and evaluate credit policies (offline)
//! - `cart` - Price a cart with register math (offline)
//! - `credits` - Balance, gate checks and credit purchases
//! - `promo` - Check and redeem promo codes
//! - `queue` - Inspect and replay the offline queue

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tillwise_admin::{ConsoleConfig, ConsoleError, telemetry};
use tillwise_core::{CreditTier, QueuedRequestId, TenantId};

mod commands;

use commands::Context;
use commands::cart::{QuoteDiscount, QuoteLine};

#[derive(Parser)]
#[command(name = "tw-cli")]
#[command(author, version, about = "Tillwise console tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and evaluate credit policies
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },
    /// Price a cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Inspect and spend credits
    Credits {
        /// Tenant (defaults to `TENANT_ID`)
        #[arg(short, long, global = true)]
        tenant: Option<TenantId>,

        #[command(subcommand)]
        action: CreditsAction,
    },
    /// Check and redeem promo codes
    Promo {
        /// Tenant (defaults to `TENANT_ID`)
        #[arg(short, long, global = true)]
        tenant: Option<TenantId>,

        #[command(subcommand)]
        action: PromoAction,
    },
    /// Inspect and replay the offline queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand)]
enum PolicyAction {
    /// Validate a policy and print a summary
    Check {
        /// Policy YAML (defaults to the built-in policy)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
    /// Show the gate decision for an action at a given balance
    Evaluate {
        /// Action key, e.g. `export_report`
        action: String,

        /// Account balance in credits
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        balance: i64,

        /// Billing tier (`free`, `paid`)
        #[arg(long, default_value = "free")]
        tier: CreditTier,

        /// Policy YAML (defaults to the built-in policy)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Print cart totals
    Quote {
        /// Line item as `NAME:PRICE[:QTY]`
        #[arg(short, long = "item", required = true)]
        items: Vec<QuoteLine>,

        /// Cart discount, `10%` or `5.00`
        #[arg(short, long)]
        discount: Option<QuoteDiscount>,

        /// Tax rate as a fraction, e.g. `0.0825`
        #[arg(long, default_value = "0")]
        tax_rate: Decimal,
    },
}

#[derive(Subcommand)]
enum CreditsAction {
    /// Show balance, warning level and grace window
    Status,
    /// Show what the gate would do for an action now
    Check {
        /// Action key
        action: String,
    },
    /// Start a credit purchase and print the payment URL
    Buy {
        /// Package id from the policy
        package: String,
    },
}

#[derive(Subcommand)]
enum PromoAction {
    /// Check a code without redeeming it
    Check { code: String },
    /// Redeem a code
    Redeem { code: String },
}

#[derive(Subcommand)]
enum QueueAction {
    /// List queued requests
    List,
    /// Send queued requests to the backend
    Replay,
    /// Discard one queued request
    Drop { id: QueuedRequestId },
    /// Discard every queued request
    Clear,
}

impl Commands {
    const fn needs_backend(&self) -> bool {
        !matches!(self, Self::Policy { .. } | Self::Cart { .. })
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = if cli.command.needs_backend() {
        match ConsoleConfig::from_env() {
            Ok(config) => Some(config),
            Err(e) => {
                telemetry::init_tracing();
                tracing::error!("Failed to load configuration: {e}");
                std::process::exit(2);
            }
        }
    } else {
        None
    };

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = telemetry::init(config.as_ref());

    match run(cli.command, config).await {
        Ok(output) => emit(&output),
        Err(e) => {
            e.report();
            tracing::error!("Command failed: {}", e.user_message());
            std::process::exit(1);
        }
    }
}

#[allow(clippy::print_stdout)]
fn emit(output: &str) {
    print!("{output}");
    if !output.ends_with('\n') {
        println!();
    }
}

async fn run(command: Commands, config: Option<ConsoleConfig>) -> Result<String, ConsoleError> {
    let context = || {
        config
            .ok_or_else(|| ConsoleError::BadRequest("configuration not loaded".to_string()))
            .and_then(Context::new)
    };

    match command {
        Commands::Policy { action } => match action {
            PolicyAction::Check { path } => commands::policy::check(path.as_deref()),
            PolicyAction::Evaluate {
                action,
                balance,
                tier,
                path,
            } => commands::policy::evaluate(path.as_deref(), &action, balance, tier),
        },
        Commands::Cart { action } => match action {
            CartAction::Quote {
                items,
                discount,
                tax_rate,
            } => commands::cart::quote(&items, discount, tax_rate),
        },
        Commands::Credits { tenant, action } => {
            let ctx = context()?;
            match action {
                CreditsAction::Status => commands::credits::status(&ctx, tenant).await,
                CreditsAction::Check { action } => {
                    commands::credits::check(&ctx, tenant, &action).await
                }
                CreditsAction::Buy { package } => {
                    commands::credits::buy(&ctx, tenant, &package).await
                }
            }
        }
        Commands::Promo { tenant, action } => {
            let ctx = context()?;
            match action {
                PromoAction::Check { code } => commands::promo::check(&ctx, tenant, &code).await,
                PromoAction::Redeem { code } => commands::promo::redeem(&ctx, tenant, &code).await,
            }
        }
        Commands::Queue { action } => {
            let ctx = context()?;
            match action {
                QueueAction::List => commands::queue::list(&ctx),
                QueueAction::Replay => commands::queue::replay(&ctx).await,
                QueueAction::Drop { id } => commands::queue::drop_request(&ctx, id),
                QueueAction::Clear => {
                    let dropped = commands::queue::clear(&commands::queue::open(&ctx))?;
                    tracing::warn!(dropped, "Offline queue cleared by operator");
                    Ok(format!("Discarded {dropped} queued requests"))
                }
            }
        }
    }
}
