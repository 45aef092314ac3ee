//! Display currency preference.
//!
//! The selected code is persisted to storage. Without a saved choice the
//! locale's region picks one, falling back to the reference currency.

use pashmiya_core::{Currency, CurrencyCode};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::storage::{self, SharedStore, keys};

/// The shopper's selected display currency.
#[derive(Clone)]
pub struct CurrencyPreference {
    store: SharedStore,
    selected: CurrencyCode,
}

impl CurrencyPreference {
    /// Load the saved choice, or seed it from `locale`.
    #[must_use]
    pub fn load(store: SharedStore, locale: &str) -> Self {
        let saved = match storage::load_json::<String>(store.as_ref(), keys::CURRENCY) {
            Ok(saved) => saved.and_then(|code| code.parse::<CurrencyCode>().ok()),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable currency preference");
                None
            }
        };

        let selected = saved
            .or_else(|| CurrencyCode::for_locale(locale))
            .unwrap_or(CurrencyCode::REFERENCE);
        debug!(currency = %selected, locale, "Display currency selected");

        Self { store, selected }
    }

    #[must_use]
    pub const fn code(&self) -> CurrencyCode {
        self.selected
    }

    /// Catalog entry of the selected currency.
    #[must_use]
    pub fn currency(&self) -> Currency {
        self.selected.currency()
    }

    /// Change and persist the display currency.
    pub fn select(&mut self, code: CurrencyCode) {
        self.selected = code;
        if let Err(e) = storage::save_json(self.store.as_ref(), keys::CURRENCY, code.as_str()) {
            warn!(error = %e, "Failed to persist currency preference");
        }
    }

    /// Format a reference-currency amount in the selected currency.
    #[must_use]
    pub fn format(&self, reference_amount: Decimal) -> String {
        self.currency().format(reference_amount)
    }

    /// Convert without formatting.
    #[must_use]
    pub fn convert(&self, reference_amount: Decimal) -> Decimal {
        self.currency().convert(reference_amount)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::{KeyValueStore, MemoryStore};

    #[test]
    fn test_locale_seeds_when_nothing_saved() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        assert_eq!(
            CurrencyPreference::load(Arc::clone(&store), "en-IN").code(),
            CurrencyCode::INR
        );
        assert_eq!(
            CurrencyPreference::load(store, "fr-FR").code(),
            CurrencyCode::EUR
        );
    }

    #[test]
    fn test_saved_choice_wins_over_locale() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let mut pref = CurrencyPreference::load(Arc::clone(&store), "en-US");
        pref.select(CurrencyCode::GBP);

        let reloaded = CurrencyPreference::load(store, "en-US");
        assert_eq!(reloaded.code(), CurrencyCode::GBP);
        assert_eq!(reloaded.format(Decimal::new(100, 0)), "£85");
    }

    #[test]
    fn test_unknown_saved_code_falls_back_to_locale() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        store.set(keys::CURRENCY, "\"XYZ\"").unwrap();
        assert_eq!(
            CurrencyPreference::load(store, "ja_JP.UTF-8").code(),
            CurrencyCode::JPY
        );
    }
}
