//! Storefront client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `PASHMIYA_API_URL` - REST API base URL (default: `http://localhost:8080/api`)
//! - `PASHMIYA_WS_URL` - Push channel URL (default: `ws://localhost:8080/ws`)
//! - `PASHMIYA_DATA_DIR` - Durable local storage directory (default: `.pashmiya`)
//! - `PASHMIYA_PICKUP_PIN` - Origin postal code for shipping quotes (default: 110001)
//! - `PASHMIYA_RECONNECT_DELAY_SECS` - Push channel reconnect delay (default: 5)
//! - `PASHMIYA_LOCALE` - Locale used to seed the display currency (fallback: `LANG`)
//! - `RAZORPAY_KEY_ID` - Payment gateway public key (checkout refuses to pay without it)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;
use url::Url;

const DEFAULT_API_URL: &str = "http://localhost:8080/api";
const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws";
const DEFAULT_DATA_DIR: &str = ".pashmiya";
const DEFAULT_PICKUP_PIN: &str = "110001";
const DEFAULT_LOCALE: &str = "en-US";
const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
const MERCHANT_NAME: &str = "Pashmiya";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// REST API base URL (all endpoints are relative to it)
    pub api_url: Url,
    /// WebSocket push channel URL
    pub ws_url: Url,
    /// Directory backing durable local storage
    pub data_dir: PathBuf,
    /// Locale tag used to seed the display currency
    pub locale: String,
    /// Delay between a push channel close and the next connection attempt
    pub reconnect_delay: Duration,
    /// Checkout settings
    pub checkout: CheckoutConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Checkout-specific settings.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Origin postal code sent with every shipping quote
    pub pickup_pin: String,
    /// Payment gateway public key id
    pub gateway_key: Option<String>,
    /// Merchant name shown in the payment widget
    pub merchant_name: String,
    /// Postal codes shorter than this never trigger a rate lookup
    pub min_postal_code_len: usize,
    /// Parcel weight in kilograms quoted to the rate service
    pub parcel_weight_kg: Decimal,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            pickup_pin: DEFAULT_PICKUP_PIN.to_string(),
            gateway_key: None,
            merchant_name: MERCHANT_NAME.to_string(),
            min_postal_code_len: 4,
            parcel_weight_kg: Decimal::new(5, 1),
        }
    }
}

impl StorefrontConfig {
    /// Configuration pointing at explicit endpoints, everything else defaulted.
    #[must_use]
    pub fn new(api_url: Url, ws_url: Url) -> Self {
        Self {
            api_url,
            ws_url,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            locale: DEFAULT_LOCALE.to_string(),
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
            checkout: CheckoutConfig::default(),
            sentry_dsn: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = parse_url(
            "PASHMIYA_API_URL",
            &get_env_or_default("PASHMIYA_API_URL", DEFAULT_API_URL),
        )?;
        let ws_url = parse_url(
            "PASHMIYA_WS_URL",
            &get_env_or_default("PASHMIYA_WS_URL", DEFAULT_WS_URL),
        )?;
        let reconnect_delay = get_env_or_default(
            "PASHMIYA_RECONNECT_DELAY_SECS",
            &DEFAULT_RECONNECT_DELAY_SECS.to_string(),
        )
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| {
            ConfigError::InvalidEnvVar("PASHMIYA_RECONNECT_DELAY_SECS".to_string(), e.to_string())
        })?;

        let locale = get_optional_env("PASHMIYA_LOCALE")
            .or_else(|| get_optional_env("LANG"))
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string());

        let checkout = CheckoutConfig {
            pickup_pin: get_env_or_default("PASHMIYA_PICKUP_PIN", DEFAULT_PICKUP_PIN),
            gateway_key: get_optional_env("RAZORPAY_KEY_ID"),
            ..CheckoutConfig::default()
        };

        Ok(Self {
            api_url,
            ws_url,
            data_dir: PathBuf::from(get_env_or_default("PASHMIYA_DATA_DIR", DEFAULT_DATA_DIR)),
            locale,
            reconnect_delay,
            checkout,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get an optional environment variable, treating blank values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse a URL-valued variable, requiring a host.
fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "URL must have a host".to_string(),
        ));
    }
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_valid() {
        let url = parse_url("TEST_URL", "http://localhost:8080/api").unwrap();
        assert_eq!(url.host_str(), Some("localhost"));
        assert_eq!(url.path(), "/api");
    }

    #[test]
    fn test_parse_url_rejects_garbage() {
        let err = parse_url("TEST_URL", "not a url").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(key, _) if key == "TEST_URL"));
    }

    #[test]
    fn test_parse_url_requires_host() {
        assert!(parse_url("TEST_URL", "data:text/plain,hello").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = StorefrontConfig::new(
            Url::parse(DEFAULT_API_URL).unwrap(),
            Url::parse(DEFAULT_WS_URL).unwrap(),
        );
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.checkout.pickup_pin, "110001");
        assert_eq!(config.checkout.min_postal_code_len, 4);
        assert_eq!(config.checkout.parcel_weight_kg, Decimal::new(5, 1));
        assert!(config.checkout.gateway_key.is_none());
    }
}
