//! Pashmiya CLI - drive the storefront engine from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (password from PASHMIYA_PASSWORD if omitted)
//! pashmiya login -e shopper@example.com -p hunter2
//!
//! # Put a product in the cart and look at it
//! pashmiya cart add 42 --size M --color Red
//! pashmiya cart list
//!
//! # Quote shipping and check out
//! pashmiya rates 400001
//! pashmiya checkout --name "Asha Rao" --email asha@example.com ...
//!
//! # Follow live notifications until Ctrl-C
//! pashmiya notifications watch
//! ```
//!
//! Local state (cart, currency, session) lives under `PASHMIYA_DATA_DIR`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use pashmiya_storefront::config::StorefrontConfig;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{CliError, Context};

#[derive(Parser)]
#[command(name = "pashmiya")]
#[command(author, version, about = "Pashmiya storefront CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session locally
    Login {
        #[arg(short, long)]
        email: String,

        /// Falls back to `PASHMIYA_PASSWORD`
        #[arg(short, long, env = "PASHMIYA_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        email: String,

        /// Falls back to `PASHMIYA_PASSWORD`
        #[arg(short, long, env = "PASHMIYA_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        phone: Option<String>,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in customer
    Whoami,
    /// Manage the local cart
    Cart {
        #[command(subcommand)]
        action: commands::cart::CartAction,
    },
    /// Show or change the display currency
    Currency {
        #[command(subcommand)]
        action: commands::currency::CurrencyAction,
    },
    /// Manage the wishlist
    Wishlist {
        #[command(subcommand)]
        action: commands::wishlist::WishlistAction,
    },
    /// Quote shipping to a postal code
    Rates {
        /// Delivery postal code
        pin: String,
    },
    /// Read and manage notifications
    Notifications {
        #[command(subcommand)]
        action: commands::notifications::NotificationAction,
    },
    /// Pay for the cart (or one product) through the payment gateway
    Checkout(commands::checkout::CheckoutArgs),
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt::init();
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(2);
        }
    };

    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pashmiya_storefront=info,pashmiya_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, config).await {
        tracing::error!("{}", e.user_message());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: StorefrontConfig) -> Result<(), CliError> {
    let ctx = Context::new(config)?;

    match cli.command {
        Commands::Login { email, password } => {
            commands::account::login(&ctx, &email, password.into()).await?;
        }
        Commands::Register {
            name,
            email,
            password,
            phone,
        } => {
            commands::account::register(&ctx, &name, &email, password.into(), phone.as_deref())
                .await?;
        }
        Commands::Logout => commands::account::logout(&ctx).await,
        Commands::Whoami => commands::account::whoami(&ctx).await?,
        Commands::Cart { action } => commands::cart::run(&ctx, action).await?,
        Commands::Currency { action } => commands::currency::run(&ctx, action)?,
        Commands::Wishlist { action } => commands::wishlist::run(&ctx, action).await?,
        Commands::Rates { pin } => commands::checkout::rates(&ctx, &pin).await,
        Commands::Notifications { action } => {
            commands::notifications::run(&ctx, action).await?;
        }
        Commands::Checkout(args) => commands::checkout::run(&ctx, args).await?,
    }
    Ok(())
}
