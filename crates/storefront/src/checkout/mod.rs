//! Checkout orchestration.
//!
//! A [`Checkout`] is opened over the cart (or a single cart line in buy-now
//! mode), collects the shipping form, quotes shipping, creates the order and
//! the gateway intent, hands off to the payment widget, and finalizes the cart
//! only after the backend has verified the gateway's signature.
//!
//! ```text
//! Loading ─► Empty
//!    │
//!    ▼
//! AddressEntry ─► PaymentPending ─► Verifying ─► Success
//!    ▲                 │   │            │
//!    └──── dismiss ────┘   ▼            ▼
//!                  Failed (retryable)  Failed (terminal)
//! ```
//!
//! Only one payment attempt is in flight at a time.

mod form;
mod payment;
mod rates;

pub use form::{FormError, ShippingForm};
pub use payment::{PaymentGateway, PaymentOutcome, PaymentRequest, Prefill};
pub use rates::{RateQuote, fallback_rates, quote};

use pashmiya_core::{CurrencyCode, OrderId, OrderStatus, Price, ProductId};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::api::{
    ApiClient, ApiError, GatewayConfirmation, OrderItemRequest, OrderRequest,
    PaymentIntentRequest, PaymentNotes, PaymentVerification, ShippingRate,
};
use crate::cart::{CartItem, CartStore, VariantKey};
use crate::config::CheckoutConfig;
use crate::error::add_breadcrumb;

const PAYMENT_METHOD: &str = "razorpay";

/// Errors that end a checkout step.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The shipping form failed validation.
    #[error(transparent)]
    Invalid(#[from] FormError),

    /// Nothing to check out.
    #[error("Your cart is empty")]
    Empty,

    /// No gateway key is configured.
    #[error("Payment configuration error")]
    PaymentConfiguration,

    /// The backend did not return an order id.
    #[error("Failed to create order")]
    OrderCreation,

    /// The backend did not return a gateway order id.
    #[error("Failed to create payment intent")]
    PaymentIntent,

    /// The total cannot be expressed in minor units.
    #[error("Order total is out of range")]
    AmountOutOfRange,

    /// Another payment attempt is already running.
    #[error("A payment is already in progress")]
    InProgress,

    /// No payment is waiting for the widget.
    #[error("No payment is awaiting confirmation")]
    NotPending,

    /// The checkout has finished (successfully or terminally).
    #[error("This checkout is closed")]
    Closed,

    /// The gateway reported a failed charge.
    #[error("Payment failed: {0}")]
    Gateway(String),

    /// The shopper closed the widget.
    #[error("Payment was cancelled")]
    Dismissed,

    /// The backend could not confirm the payment signature.
    #[error("Payment verification failed. Please contact support.")]
    Verification,

    /// An API call failed.
    #[error("{0}")]
    Api(#[from] ApiError),
}

/// Which items are being bought.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMode {
    /// Everything in the cart.
    Cart,
    /// Only the first cart line of this product.
    BuyNow(ProductId),
}

/// Where the checkout is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutState {
    Loading,
    /// The target item set is empty.
    Empty,
    AddressEntry,
    PaymentPending { order_id: OrderId },
    Verifying { order_id: OrderId },
    Success { order_id: OrderId },
    Failed { message: String, retryable: bool },
}

/// Proof of a verified payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutReceipt {
    pub order_id: OrderId,
    /// Route of the order confirmation view.
    pub route: String,
}

impl CheckoutReceipt {
    fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            route: format!("/checkout/success?orderId={order_id}"),
        }
    }
}

/// One checkout session.
pub struct Checkout {
    api: ApiClient,
    config: CheckoutConfig,
    mode: CheckoutMode,
    items: Vec<CartItem>,
    form: ShippingForm,
    rates: Vec<ShippingRate>,
    selected_rate: Option<usize>,
    quoted_for: Option<(String, String)>,
    state: CheckoutState,
    submitting: bool,
    error: Option<String>,
}

impl Checkout {
    /// Create a checkout in the `Loading` state.
    #[must_use]
    pub fn new(api: ApiClient, config: CheckoutConfig, mode: CheckoutMode) -> Self {
        Self {
            api,
            config,
            mode,
            items: Vec::new(),
            form: ShippingForm::default(),
            rates: Vec::new(),
            selected_rate: None,
            quoted_for: None,
            state: CheckoutState::Loading,
            submitting: false,
            error: None,
        }
    }

    /// Create a checkout and resolve its items from `cart`.
    #[must_use]
    pub fn open(
        api: ApiClient,
        config: CheckoutConfig,
        mode: CheckoutMode,
        cart: &CartStore,
    ) -> Self {
        let mut checkout = Self::new(api, config, mode);
        checkout.load(cart);
        checkout
    }

    /// Resolve the target item set from the current cart.
    pub fn load(&mut self, cart: &CartStore) {
        self.items = match self.mode {
            CheckoutMode::Cart => cart.items().to_vec(),
            CheckoutMode::BuyNow(product_id) => cart.find(product_id).cloned().into_iter().collect(),
        };
        self.state = if self.items.is_empty() {
            CheckoutState::Empty
        } else {
            CheckoutState::AddressEntry
        };
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[must_use]
    pub const fn state(&self) -> &CheckoutState {
        &self.state
    }

    #[must_use]
    pub const fn mode(&self) -> CheckoutMode {
        self.mode
    }

    /// Items being bought.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    #[must_use]
    pub const fn form(&self) -> &ShippingForm {
        &self.form
    }

    #[must_use]
    pub fn rates(&self) -> &[ShippingRate] {
        &self.rates
    }

    #[must_use]
    pub fn selected_rate(&self) -> Option<&ShippingRate> {
        self.selected_rate.and_then(|i| self.rates.get(i))
    }

    /// Whether a payment attempt is in flight.
    #[must_use]
    pub const fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Message of the last failed step, cleared by the next form edit.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Sum of item line totals.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Cost of the selected rate, zero if none.
    #[must_use]
    pub fn shipping_cost(&self) -> Decimal {
        self.selected_rate().map_or(Decimal::ZERO, |r| r.rate)
    }

    /// Subtotal plus the selected shipping rate.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.subtotal() + self.shipping_cost()
    }

    // =========================================================================
    // Address and shipping
    // =========================================================================

    /// Replace the shipping form. Returns whether a rate lookup is now due.
    pub fn set_form(&mut self, form: ShippingForm) -> bool {
        self.form = form;
        self.error = None;
        self.rate_lookup_due()
    }

    /// Whether the destination changed into a quotable one since the last
    /// lookup.
    #[must_use]
    pub fn rate_lookup_due(&self) -> bool {
        self.form.ready_for_rates(self.config.min_postal_code_len)
            && self.quoted_for.as_ref() != Some(&self.destination())
    }

    fn destination(&self) -> (String, String) {
        (
            self.form.country.trim().to_string(),
            self.form.zip.trim().to_string(),
        )
    }

    /// Replace the form and quote shipping if the destination changed.
    pub async fn update_address(&mut self, form: ShippingForm) {
        if self.set_form(form) {
            self.refresh_rates().await;
        }
    }

    /// Quote shipping for the current destination and preselect the first
    /// rate. Falls back to fixed rates if the service fails.
    #[instrument(skip(self), fields(zip = %self.form.zip))]
    pub async fn refresh_rates(&mut self) {
        let RateQuote { rates, fallback } = quote(&self.api, &self.config, &self.form.zip).await;
        if fallback {
            add_breadcrumb("checkout", "Using fallback shipping rates", None);
        }
        self.selected_rate = (!rates.is_empty()).then_some(0);
        self.rates = rates;
        self.quoted_for = Some(self.destination());
    }

    /// Choose a quoted rate by position.
    ///
    /// Returns `false` if there is no such rate.
    pub fn select_rate(&mut self, index: usize) -> bool {
        if index < self.rates.len() {
            self.selected_rate = Some(index);
            true
        } else {
            false
        }
    }

    // =========================================================================
    // Payment
    // =========================================================================

    /// Validate, create the order and the gateway intent, and return the
    /// widget request.
    ///
    /// # Errors
    ///
    /// Returns error if the checkout is not accepting payment, the form is
    /// invalid, the gateway key is missing, or the backend refuses the order
    /// or intent. The checkout stays retryable in all of those cases.
    #[instrument(skip(self), fields(mode = ?self.mode))]
    pub async fn begin_payment(&mut self) -> Result<PaymentRequest, CheckoutError> {
        match &self.state {
            CheckoutState::AddressEntry
            | CheckoutState::Failed {
                retryable: true, ..
            } => {}
            CheckoutState::Empty => return Err(CheckoutError::Empty),
            CheckoutState::PaymentPending { .. } | CheckoutState::Verifying { .. } => {
                return Err(CheckoutError::InProgress);
            }
            CheckoutState::Loading
            | CheckoutState::Success { .. }
            | CheckoutState::Failed { .. } => return Err(CheckoutError::Closed),
        }
        if self.submitting {
            return Err(CheckoutError::InProgress);
        }

        if let Err(e) = self.form.validate(self.selected_rate()) {
            self.error = Some(e.to_string());
            return Err(e.into());
        }

        let Some(key) = self.config.gateway_key.clone() else {
            error!("Gateway key is not configured");
            return Err(self.abort(CheckoutError::PaymentConfiguration));
        };

        self.submitting = true;
        self.error = None;
        self.state = CheckoutState::AddressEntry;

        match self.create_order_and_intent(key).await {
            Ok(request) => {
                info!(order_id = %request.internal_order_id, "Awaiting payment");
                self.state = CheckoutState::PaymentPending {
                    order_id: request.internal_order_id,
                };
                Ok(request)
            }
            Err(e) => {
                warn!(error = %e, "Payment setup failed");
                Err(self.abort(e))
            }
        }
    }

    async fn create_order_and_intent(&self, key: String) -> Result<PaymentRequest, CheckoutError> {
        let total = self.total();
        let currency = CurrencyCode::REFERENCE.as_str().to_string();

        let order = OrderRequest {
            status: OrderStatus::PendingPayment,
            total_amount: total,
            shipping_cost: self.shipping_cost(),
            currency: currency.clone(),
            shipping_name: self.form.name.clone(),
            shipping_email: self.form.email.clone(),
            shipping_address: self.form.address.clone(),
            shipping_city: self.form.city.clone(),
            shipping_state: self.form.state.clone(),
            shipping_country: self.form.country.clone(),
            shipping_zip: self.form.zip.clone(),
            shipping_phone: self.form.phone.clone(),
            payment_method: PAYMENT_METHOD.to_string(),
            items: self
                .items
                .iter()
                .map(|item| OrderItemRequest {
                    product_id: item.product.id,
                    quantity: item.quantity,
                    price: item.product.price,
                    color: item.selected_color.clone(),
                    size: item.selected_size.clone(),
                })
                .collect(),
        };

        let order_id = self
            .api
            .create_order(&order)
            .await?
            .order_id()
            .ok_or(CheckoutError::OrderCreation)?;

        let intent = PaymentIntentRequest {
            amount: total,
            currency: currency.clone(),
            receipt: format!("order_{order_id}"),
            notes: PaymentNotes { order_id },
        };
        let gateway_order_id = self
            .api
            .create_payment_intent(&intent)
            .await?
            .id
            .filter(|id| !id.is_empty())
            .ok_or(CheckoutError::PaymentIntent)?;

        let amount = Price::reference(total)
            .minor_units()
            .ok_or(CheckoutError::AmountOutOfRange)?;

        Ok(PaymentRequest {
            key,
            amount,
            currency,
            name: self.config.merchant_name.clone(),
            description: format!("Order #{order_id}"),
            order_id: gateway_order_id,
            prefill: Prefill {
                name: self.form.name.clone(),
                email: self.form.email.clone(),
                contact: self.form.phone.clone(),
            },
            internal_order_id: order_id,
        })
    }

    /// Verify the widget's confirmation and finalize the cart.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::NotPending`] if no payment is waiting, and
    /// [`CheckoutError::Verification`] if the backend does not confirm the
    /// payment. Verification failure closes the checkout.
    #[instrument(skip(self, confirmation, cart))]
    pub async fn complete_payment(
        &mut self,
        confirmation: GatewayConfirmation,
        cart: &mut CartStore,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        let CheckoutState::PaymentPending { order_id } = self.state else {
            return Err(CheckoutError::NotPending);
        };
        self.state = CheckoutState::Verifying { order_id };

        let verification = PaymentVerification {
            confirmation,
            order_id,
        };
        let verified = match self.api.verify_payment(&verification).await {
            Ok(verified) => verified,
            Err(e) => {
                error!(error = %e, order_id = %order_id, "Payment verification request failed");
                false
            }
        };

        self.submitting = false;
        if !verified {
            error!(order_id = %order_id, "Payment could not be verified");
            let message = CheckoutError::Verification.to_string();
            self.error = Some(message.clone());
            self.state = CheckoutState::Failed {
                message,
                retryable: false,
            };
            return Err(CheckoutError::Verification);
        }

        self.finalize(cart);
        info!(order_id = %order_id, "Payment verified");
        self.state = CheckoutState::Success { order_id };
        Ok(CheckoutReceipt::new(order_id))
    }

    fn finalize(&self, cart: &mut CartStore) {
        match self.mode {
            CheckoutMode::Cart => cart.clear_cart(),
            CheckoutMode::BuyNow(_) => {
                for item in &self.items {
                    cart.remove_variant(&item.key());
                }
            }
        }
    }

    /// The shopper closed the widget; allow another attempt.
    pub fn dismiss_payment(&mut self) {
        if matches!(self.state, CheckoutState::PaymentPending { .. }) {
            info!("Payment widget dismissed");
            self.state = CheckoutState::AddressEntry;
            self.submitting = false;
        }
    }

    /// The gateway reported a failed charge; allow another attempt.
    pub fn fail_payment(&mut self, reason: &str) {
        if matches!(self.state, CheckoutState::PaymentPending { .. }) {
            warn!(reason, "Gateway reported a failed payment");
            let message = CheckoutError::Gateway(reason.to_string()).to_string();
            self.error = Some(message.clone());
            self.state = CheckoutState::Failed {
                message,
                retryable: true,
            };
            self.submitting = false;
        }
    }

    /// Run a whole payment attempt through `gateway`.
    ///
    /// # Errors
    ///
    /// Returns error for any failed step, including [`CheckoutError::Dismissed`]
    /// when the shopper closes the widget.
    pub async fn submit<G: PaymentGateway>(
        &mut self,
        gateway: &G,
        cart: &mut CartStore,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        let request = self.begin_payment().await?;
        match gateway.open(&request).await {
            PaymentOutcome::Completed(confirmation) => {
                self.complete_payment(confirmation, cart).await
            }
            PaymentOutcome::Dismissed => {
                self.dismiss_payment();
                Err(CheckoutError::Dismissed)
            }
            PaymentOutcome::Failed { reason } => {
                self.fail_payment(&reason);
                Err(CheckoutError::Gateway(reason))
            }
        }
    }

    /// Record a recoverable failure and release the submitting flag.
    fn abort(&mut self, err: CheckoutError) -> CheckoutError {
        self.error = Some(err.to_string());
        self.submitting = false;
        err
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use url::Url;

    use super::*;
    use crate::api::Product;
    use crate::session::SessionContext;
    use crate::storage::{MemoryStore, SharedStore};

    fn product(id: i64, price: i64) -> Product {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": format!("Stole {id}"),
            "price": price,
            "stock": 10,
        }))
        .unwrap()
    }

    fn api() -> ApiClient {
        // Port 9 (discard) is never listening; any request fails fast.
        ApiClient::with_client(
            reqwest::Client::new(),
            &Url::parse("http://127.0.0.1:9/api").unwrap(),
            SessionContext::ephemeral(),
        )
    }

    fn cart() -> CartStore {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let mut cart = CartStore::open(store);
        let first = product(1, 40);
        cart.add_to_cart(&first, "M", "Red");
        cart.add_to_cart(&first, "M", "Red");
        cart.add_to_cart(&product(7, 95), "S", "Blue");
        cart
    }

    #[test]
    fn test_buy_now_restricts_items_and_total() {
        let cart = cart();
        let checkout = Checkout::open(
            api(),
            CheckoutConfig::default(),
            CheckoutMode::BuyNow(ProductId::new(7)),
            &cart,
        );
        assert_eq!(checkout.state(), &CheckoutState::AddressEntry);
        assert_eq!(checkout.items().len(), 1);
        assert_eq!(checkout.subtotal(), Decimal::new(95, 0));
        assert_eq!(checkout.total(), Decimal::new(95, 0));
    }

    #[test]
    fn test_cart_mode_uses_every_line() {
        let checkout = Checkout::open(api(), CheckoutConfig::default(), CheckoutMode::Cart, &cart());
        assert_eq!(checkout.subtotal(), Decimal::new(175, 0));
    }

    #[test]
    fn test_buy_now_for_absent_product_is_empty() {
        let checkout = Checkout::open(
            api(),
            CheckoutConfig::default(),
            CheckoutMode::BuyNow(ProductId::new(99)),
            &cart(),
        );
        assert_eq!(checkout.state(), &CheckoutState::Empty);
    }

    #[tokio::test]
    async fn test_rate_outage_falls_back_with_standard_selected() {
        let mut checkout =
            Checkout::open(api(), CheckoutConfig::default(), CheckoutMode::Cart, &cart());
        let form = ShippingForm {
            country: "India".to_string(),
            zip: "400001".to_string(),
            ..ShippingForm::default()
        };
        checkout.update_address(form).await;

        assert_eq!(checkout.rates().len(), 2);
        assert_eq!(checkout.selected_rate().unwrap().courier_name, "Standard Shipping");
        assert_eq!(checkout.total(), Decimal::new(325, 0));
        assert!(!checkout.rate_lookup_due());

        assert!(checkout.select_rate(1));
        assert!(!checkout.select_rate(2));
        assert_eq!(checkout.shipping_cost(), Decimal::new(300, 0));
    }

    #[tokio::test]
    async fn test_invalid_form_blocks_payment_before_network() {
        let mut checkout =
            Checkout::open(api(), CheckoutConfig::default(), CheckoutMode::Cart, &cart());
        let err = checkout.begin_payment().await.unwrap_err();
        assert!(matches!(err, CheckoutError::Invalid(FormError::MissingFields)));
        assert_eq!(checkout.error(), Some("Please fill in all required fields"));
        assert!(!checkout.is_submitting());
        assert_eq!(checkout.state(), &CheckoutState::AddressEntry);
    }

    #[tokio::test]
    async fn test_missing_gateway_key_is_configuration_error() {
        let mut checkout =
            Checkout::open(api(), CheckoutConfig::default(), CheckoutMode::Cart, &cart());
        checkout
            .update_address(ShippingForm {
                name: "Asha".to_string(),
                email: "asha@example.com".to_string(),
                phone: "9876543210".to_string(),
                address: "12 MG Road".to_string(),
                city: "Mumbai".to_string(),
                state: "MH".to_string(),
                country: "India".to_string(),
                zip: "400001".to_string(),
            })
            .await;

        let err = checkout.begin_payment().await.unwrap_err();
        assert!(matches!(err, CheckoutError::PaymentConfiguration));
        assert_eq!(checkout.error(), Some("Payment configuration error"));
        assert!(!checkout.is_submitting());
    }

    #[test]
    fn test_receipt_route() {
        assert_eq!(
            CheckoutReceipt::new(OrderId::new(31)).route,
            "/checkout/success?orderId=31"
        );
    }
}
