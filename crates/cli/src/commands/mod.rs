//! CLI subcommands.
//!
//! Each command builds what it needs from a shared [`Context`]; results are
//! reported through `tracing`.

pub mod account;
pub mod cart;
pub mod checkout;
pub mod currency;
pub mod notifications;
pub mod wishlist;

use std::sync::Arc;

use pashmiya_core::EmailError;
use pashmiya_storefront::api::{ApiClient, ApiError};
use pashmiya_storefront::cart::CartStore;
use pashmiya_storefront::checkout::CheckoutError;
use pashmiya_storefront::config::StorefrontConfig;
use pashmiya_storefront::currency::CurrencyPreference;
use pashmiya_storefront::notifications::FeedError;
use pashmiya_storefront::session::SessionContext;
use pashmiya_storefront::storage::{FileStore, SharedStore};
use pashmiya_storefront::AppError;
use thiserror::Error;

/// Errors that end a CLI command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Engine failure.
    #[error(transparent)]
    App(#[from] AppError),

    /// Malformed email argument.
    #[error("Invalid email: {0}")]
    Email(#[from] EmailError),

    /// The command needs a stored session.
    #[error("Not signed in. Run `pashmiya login` first.")]
    NotSignedIn,

    /// Malformed argument or prompt answer.
    #[error("{0}")]
    Input(String),

    /// Terminal I/O failed.
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Message shown to the shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::App(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

impl From<ApiError> for CliError {
    fn from(e: ApiError) -> Self {
        Self::App(e.into())
    }
}

impl From<CheckoutError> for CliError {
    fn from(e: CheckoutError) -> Self {
        Self::App(e.into())
    }
}

impl From<FeedError> for CliError {
    fn from(e: FeedError) -> Self {
        Self::App(e.into())
    }
}

/// Engine handles shared by every command.
pub struct Context {
    pub config: StorefrontConfig,
    pub store: SharedStore,
    pub session: SessionContext,
    pub api: ApiClient,
}

impl Context {
    /// Open local storage and rehydrate the session.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: StorefrontConfig) -> Result<Self, CliError> {
        let store: SharedStore = Arc::new(FileStore::new(&config.data_dir));
        let session = SessionContext::new(Arc::clone(&store));
        let api = ApiClient::new(&config, session.clone())?;
        Ok(Self {
            config,
            store,
            session,
            api,
        })
    }

    /// Fail early for commands that need a credential.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::NotSignedIn`] without a stored session.
    pub fn require_session(&self) -> Result<(), CliError> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err(CliError::NotSignedIn)
        }
    }

    #[must_use]
    pub fn cart(&self) -> CartStore {
        CartStore::open(Arc::clone(&self.store))
    }

    #[must_use]
    pub fn currency(&self) -> CurrencyPreference {
        CurrencyPreference::load(Arc::clone(&self.store), &self.config.locale)
    }
}
