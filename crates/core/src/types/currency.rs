//! Currency catalog and display formatting.
//!
//! All prices are stored and transmitted in the reference currency
//! ([`CurrencyCode::REFERENCE`]). A display currency is derived by
//! multiplying the reference amount by the currency's static rate; the
//! reference amount itself is never mutated.
//!
//! ```rust
//! use pashmiya_core::CurrencyCode;
//! use rust_decimal::Decimal;
//!
//! let usd = CurrencyCode::USD.currency();
//! assert_eq!(usd.format(Decimal::new(1999, 0)), "$2,198.9");
//! assert_eq!(CurrencyCode::JPY.currency().format(Decimal::new(10, 0)), "¥1,650");
//! ```

use core::fmt;
use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., euros, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Create a price in the reference currency.
    #[must_use]
    pub const fn reference(amount: Decimal) -> Self {
        Self::new(amount, CurrencyCode::REFERENCE)
    }

    /// Amount in minor units (e.g., paise, cents), rounded half away from zero.
    ///
    /// Returns `None` if the amount does not fit in an `i64`.
    #[must_use]
    pub fn minor_units(&self) -> Option<i64> {
        let scaled = (self.amount * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        i64::try_from(scaled).ok()
    }

    /// Format for display in the price's own currency.
    #[must_use]
    pub fn display(&self) -> String {
        format_amount(self.amount, self.currency_code)
    }
}

/// ISO 4217 currency codes offered by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    EUR,
    USD,
    GBP,
    INR,
    JPY,
    AUD,
    CAD,
    CHF,
    CNY,
    SGD,
}

impl CurrencyCode {
    /// The currency every stored and transmitted price is expressed in.
    pub const REFERENCE: Self = Self::EUR;

    /// Every supported currency, in picker order.
    pub const ALL: [Self; 10] = [
        Self::EUR,
        Self::USD,
        Self::GBP,
        Self::INR,
        Self::JPY,
        Self::AUD,
        Self::CAD,
        Self::CHF,
        Self::CNY,
        Self::SGD,
    ];

    /// The three-letter ISO code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EUR => "EUR",
            Self::USD => "USD",
            Self::GBP => "GBP",
            Self::INR => "INR",
            Self::JPY => "JPY",
            Self::AUD => "AUD",
            Self::CAD => "CAD",
            Self::CHF => "CHF",
            Self::CNY => "CNY",
            Self::SGD => "SGD",
        }
    }

    /// Catalog entry (symbol and rate) for this code.
    #[must_use]
    pub fn currency(self) -> Currency {
        let (symbol, rate) = match self {
            Self::EUR => ("€", Decimal::ONE),
            Self::USD => ("$", Decimal::new(11, 1)),
            Self::GBP => ("£", Decimal::new(85, 2)),
            Self::INR => ("₹", Decimal::new(90, 0)),
            Self::JPY => ("¥", Decimal::new(165, 0)),
            Self::AUD => ("A$", Decimal::new(165, 2)),
            Self::CAD => ("C$", Decimal::new(15, 1)),
            Self::CHF => ("CHF", Decimal::new(95, 2)),
            Self::CNY => ("¥", Decimal::new(78, 1)),
            Self::SGD => ("S$", Decimal::new(145, 2)),
        };
        Currency {
            code: self,
            symbol,
            rate,
        }
    }

    /// Pick a currency from a locale tag such as `en-US` or `en_GB.UTF-8`.
    ///
    /// Only the region subtag is consulted. Returns `None` when the region is
    /// missing or has no mapped currency.
    #[must_use]
    pub fn for_locale(locale: &str) -> Option<Self> {
        let region = locale
            .split(['-', '_'])
            .nth(1)?
            .split('.')
            .next()?
            .to_ascii_uppercase();

        match region.as_str() {
            "US" => Some(Self::USD),
            "GB" => Some(Self::GBP),
            "IN" => Some(Self::INR),
            "JP" => Some(Self::JPY),
            "AU" => Some(Self::AUD),
            "CA" => Some(Self::CAD),
            "CH" => Some(Self::CHF),
            "CN" => Some(Self::CNY),
            "SG" => Some(Self::SGD),
            _ => None,
        }
    }

    /// Maximum fraction digits shown for this currency.
    const fn fraction_digits(self) -> u32 {
        match self {
            Self::JPY => 0,
            _ => 2,
        }
    }

    /// Prefix used by en-US currency formatting.
    const fn display_prefix(self) -> &'static str {
        match self {
            Self::EUR => "€",
            Self::USD => "$",
            Self::GBP => "£",
            Self::INR => "₹",
            Self::JPY => "¥",
            Self::AUD => "A$",
            Self::CAD => "CA$",
            Self::CHF => "CHF\u{a0}",
            Self::CNY => "CN¥",
            Self::SGD => "SGD\u{a0}",
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a supported currency code.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported currency code: {0}")]
pub struct ParseCurrencyError(pub String);

impl FromStr for CurrencyCode {
    type Err = ParseCurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|code| code.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ParseCurrencyError(s.to_owned()))
    }
}

/// A display currency: code, picker symbol, and rate against the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Currency {
    /// ISO code.
    pub code: CurrencyCode,
    /// Symbol shown in currency pickers.
    pub symbol: &'static str,
    /// Multiplier applied to reference-currency amounts.
    pub rate: Decimal,
}

impl Currency {
    /// The full catalog in picker order.
    #[must_use]
    pub fn catalog() -> Vec<Self> {
        CurrencyCode::ALL.into_iter().map(CurrencyCode::currency).collect()
    }

    /// Convert a reference-currency amount into this currency.
    #[must_use]
    pub fn convert(&self, reference_amount: Decimal) -> Decimal {
        reference_amount * self.rate
    }

    /// Convert and format a reference-currency amount for display.
    #[must_use]
    pub fn format(&self, reference_amount: Decimal) -> String {
        format_amount(self.convert(reference_amount), self.code)
    }
}

/// Render an amount already expressed in `code` with en-US currency rules
/// and zero minimum fraction digits.
fn format_amount(amount: Decimal, code: CurrencyCode) -> String {
    let rounded = amount
        .round_dp_with_strategy(code.fraction_digits(), RoundingStrategy::MidpointAwayFromZero)
        .normalize();
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };

    let digits = rounded.abs().to_string();
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (digits.as_str(), None),
    };

    let mut out = format!("{sign}{}{}", code.display_prefix(), group_thousands(whole));
    if let Some(fraction) = fraction {
        out.push('.');
        out.push_str(fraction);
    }
    out
}

fn group_thousands(whole: &str) -> String {
    let len = whole.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
