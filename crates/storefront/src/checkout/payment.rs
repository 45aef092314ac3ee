//! Hosted payment widget seam.

use std::future::Future;

use pashmiya_core::OrderId;
use serde::Serialize;

use crate::api::GatewayConfirmation;

/// Contact details prefilled in the widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prefill {
    pub name: String,
    pub email: String,
    pub contact: String,
}

/// Everything the widget needs to collect one payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRequest {
    /// Gateway public key.
    pub key: String,
    /// Amount in minor units.
    pub amount: i64,
    pub currency: String,
    /// Merchant name shown in the widget header.
    pub name: String,
    pub description: String,
    /// Gateway order created for this payment.
    pub order_id: String,
    pub prefill: Prefill,
    /// Internal order the payment settles.
    #[serde(skip)]
    pub internal_order_id: OrderId,
}

/// How the shopper left the widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The gateway reported success with signed confirmation fields.
    Completed(GatewayConfirmation),
    /// The shopper closed the widget without paying.
    Dismissed,
    /// The gateway reported a failed charge.
    Failed { reason: String },
}

/// A hosted payment widget.
pub trait PaymentGateway {
    /// Show the widget and wait for the shopper to finish with it.
    fn open(&self, request: &PaymentRequest) -> impl Future<Output = PaymentOutcome> + Send;
}
