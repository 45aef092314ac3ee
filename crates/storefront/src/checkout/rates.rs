//! Shipping rate lookup with a fixed fallback.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::api::{ApiClient, RateQuery, ShippingRate};
use crate::config::CheckoutConfig;

/// Quotes shown when the rate service is unavailable.
#[must_use]
pub fn fallback_rates() -> Vec<ShippingRate> {
    vec![
        ShippingRate {
            courier_name: "Standard Shipping".to_string(),
            rate: Decimal::new(150, 0),
            currency: "INR".to_string(),
            estimated_days: 5,
            service_type: "standard".to_string(),
            courier_company_id: None,
        },
        ShippingRate {
            courier_name: "Express Shipping".to_string(),
            rate: Decimal::new(300, 0),
            currency: "INR".to_string(),
            estimated_days: 2,
            service_type: "express".to_string(),
            courier_company_id: None,
        },
    ]
}

/// Result of a rate lookup. The first rate is the default choice.
#[derive(Debug, Clone, PartialEq)]
pub struct RateQuote {
    pub rates: Vec<ShippingRate>,
    /// Whether the service failed and the fixed rates were substituted.
    pub fallback: bool,
}

/// Quote shipping to `delivery_pin`. Never fails: service errors and empty
/// answers degrade to [`fallback_rates`].
pub async fn quote(api: &ApiClient, config: &CheckoutConfig, delivery_pin: &str) -> RateQuote {
    let query = RateQuery {
        pickup_pin: config.pickup_pin.clone(),
        delivery_pin: delivery_pin.trim().to_string(),
        weight: config.parcel_weight_kg,
        cod: 0,
    };

    match api.calculate_shipping_rates(&query).await {
        Ok(rates) if !rates.is_empty() => {
            debug!(count = rates.len(), "Shipping rates received");
            RateQuote {
                rates,
                fallback: false,
            }
        }
        Ok(_) => {
            warn!(delivery_pin = %query.delivery_pin, "Rate service returned no couriers, using fallback rates");
            RateQuote {
                rates: fallback_rates(),
                fallback: true,
            }
        }
        Err(e) => {
            warn!(error = %e, delivery_pin = %query.delivery_pin, "Rate lookup failed, using fallback rates");
            RateQuote {
                rates: fallback_rates(),
                fallback: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_rates() {
        let rates = fallback_rates();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].courier_name, "Standard Shipping");
        assert_eq!(rates[0].rate, Decimal::new(150, 0));
        assert_eq!(rates[0].estimated_days, 5);
        assert_eq!(rates[1].service_type, "express");
        assert_eq!(rates[1].rate, Decimal::new(300, 0));
        assert_eq!(rates[1].estimated_days, 2);
    }
}
