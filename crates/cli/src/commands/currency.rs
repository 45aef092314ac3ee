//! Display currency commands.

use clap::Subcommand;
use pashmiya_core::{Currency, CurrencyCode};
use rust_decimal::Decimal;

use super::{CliError, Context};

#[derive(Subcommand)]
pub enum CurrencyAction {
    /// Show the selected currency
    Show,
    /// List supported currencies with a sample price
    List,
    /// Select and persist a display currency
    Set { code: String },
}

/// # Errors
///
/// Returns error for an unsupported currency code.
pub fn run(ctx: &Context, action: CurrencyAction) -> Result<(), CliError> {
    let mut preference = ctx.currency();

    match action {
        CurrencyAction::Show => {
            let currency = preference.currency();
            tracing::info!(rate = %currency.rate, "{} ({})", currency.code, currency.symbol);
        }
        CurrencyAction::List => {
            let sample = Decimal::new(100, 0);
            for currency in Currency::catalog() {
                let marker = if currency.code == preference.code() { "*" } else { " " };
                tracing::info!(
                    "{marker} {} {:>4} {}",
                    currency.code,
                    currency.symbol,
                    currency.format(sample)
                );
            }
        }
        CurrencyAction::Set { code } => {
            let code = code
                .parse::<CurrencyCode>()
                .map_err(|e| CliError::Input(e.to_string()))?;
            preference.select(code);
            tracing::info!("Display currency set to {code}");
        }
    }
    Ok(())
}
