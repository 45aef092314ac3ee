//! Shipping form and its validation.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::ShippingRate;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid regex"));

/// Loose international phone shape, checked after whitespace is removed.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+]?[(]?[0-9]{3}[)]?[-\s.]?[0-9]{3}[-\s.]?[0-9]{4,6}$").expect("Invalid regex")
});

/// Why a shipping form was rejected. One message per attempt, no per-field
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("Please fill in all required fields")]
    MissingFields,
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Please enter a valid phone number")]
    InvalidPhone,
    #[error("Please select a shipping method")]
    NoShippingMethod,
}

/// Destination and contact details entered at checkout. Every field is
/// required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub zip: String,
}

impl ShippingForm {
    fn required(&self) -> [&str; 8] {
        [
            self.name.as_str(),
            self.email.as_str(),
            self.phone.as_str(),
            self.address.as_str(),
            self.city.as_str(),
            self.state.as_str(),
            self.country.as_str(),
            self.zip.as_str(),
        ]
    }

    /// Check the form and the rate choice, in that order.
    ///
    /// # Errors
    ///
    /// Returns the first failing check.
    pub fn validate(&self, selected_rate: Option<&ShippingRate>) -> Result<(), FormError> {
        if self.required().iter().any(|field| field.trim().is_empty()) {
            return Err(FormError::MissingFields);
        }

        if !EMAIL_RE.is_match(&self.email) {
            return Err(FormError::InvalidEmail);
        }

        let phone: String = self.phone.chars().filter(|c| !c.is_whitespace()).collect();
        if !PHONE_RE.is_match(&phone) {
            return Err(FormError::InvalidPhone);
        }

        if selected_rate.is_none() {
            return Err(FormError::NoShippingMethod);
        }

        Ok(())
    }

    /// Whether the destination is complete enough to quote shipping.
    #[must_use]
    pub fn ready_for_rates(&self, min_postal_code_len: usize) -> bool {
        !self.country.trim().is_empty() && self.zip.trim().chars().count() >= min_postal_code_len
    }
}
