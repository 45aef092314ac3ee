//! Shipping quotes and checkout.
//!
//! The hosted payment widget is replaced by a terminal prompt: the command
//! prints the gateway order and waits for the payment id and signature the
//! gateway returned.

use clap::Args;
use pashmiya_core::ProductId;
use pashmiya_storefront::api::GatewayConfirmation;
use pashmiya_storefront::checkout::{
    Checkout, CheckoutError, CheckoutMode, CheckoutState, PaymentGateway, PaymentOutcome,
    PaymentRequest, ShippingForm, quote,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{CliError, Context};

#[derive(Args)]
pub struct CheckoutArgs {
    /// Buy only this product's cart line
    #[arg(long)]
    buy_now: Option<ProductId>,
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    phone: String,
    #[arg(long)]
    address: String,
    #[arg(long)]
    city: String,
    #[arg(long)]
    state: String,
    #[arg(long)]
    country: String,
    #[arg(long)]
    zip: String,
    /// Position of the shipping rate to use; 0 is the first quote
    #[arg(long, default_value_t = 0)]
    rate: usize,
}

impl CheckoutArgs {
    fn form(&self) -> ShippingForm {
        ShippingForm {
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            country: self.country.clone(),
            zip: self.zip.clone(),
        }
    }
}

/// Print shipping quotes for a postal code.
pub async fn rates(ctx: &Context, pin: &str) {
    let quote = quote(&ctx.api, &ctx.config.checkout, pin).await;
    if quote.fallback {
        tracing::warn!("Rate service unavailable, showing standard rates");
    }
    for (index, rate) in quote.rates.iter().enumerate() {
        tracing::info!(
            index,
            service = %rate.service_type,
            "{} {} {} ({} days)",
            rate.courier_name,
            rate.rate,
            rate.currency,
            rate.estimated_days
        );
    }
}

/// Run a checkout end to end. Works signed out; the order is then placed
/// as a guest.
///
/// # Errors
///
/// Returns error if there is nothing to buy, the form is invalid, or any
/// payment step fails.
pub async fn run(ctx: &Context, args: CheckoutArgs) -> Result<(), CliError> {
    let mut cart = ctx.cart();
    let mode = args.buy_now.map_or(CheckoutMode::Cart, CheckoutMode::BuyNow);
    let mut checkout = Checkout::open(ctx.api.clone(), ctx.config.checkout.clone(), mode, &cart);
    if checkout.state() == &CheckoutState::Empty {
        return Err(CheckoutError::Empty.into());
    }

    checkout.update_address(args.form()).await;
    if !checkout.select_rate(args.rate) {
        return Err(CliError::Input(format!("No shipping rate #{}", args.rate)));
    }

    let currency = ctx.currency();
    tracing::info!(
        subtotal = %currency.format(checkout.subtotal()),
        shipping = %currency.format(checkout.shipping_cost()),
        "Order total {}",
        currency.format(checkout.total())
    );

    let receipt = checkout.submit(&TerminalGateway, &mut cart).await?;
    tracing::info!(order_id = %receipt.order_id, "Payment verified, see {}", receipt.route);
    Ok(())
}

/// Collects the gateway's answer from stdin.
struct TerminalGateway;

impl PaymentGateway for TerminalGateway {
    async fn open(&self, request: &PaymentRequest) -> PaymentOutcome {
        tracing::info!(
            key = %request.key,
            gateway_order = %request.order_id,
            amount = request.amount,
            currency = %request.currency,
            "{}: {}",
            request.name,
            request.description
        );
        tracing::info!("Enter `<payment_id> <signature>`, `fail <reason>`, or an empty line to cancel");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return PaymentOutcome::Dismissed,
            Err(e) => {
                return PaymentOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        parse_answer(&line, request)
    }
}

/// Interpret one line typed at the payment prompt.
fn parse_answer(line: &str, request: &PaymentRequest) -> PaymentOutcome {
    let line = line.trim();
    if let Some(reason) = line.strip_prefix("fail") {
        return PaymentOutcome::Failed {
            reason: reason.trim().to_string(),
        };
    }

    let mut words = line.split_whitespace();
    match (words.next(), words.next()) {
        (None, _) => PaymentOutcome::Dismissed,
        (Some(payment_id), Some(signature)) => PaymentOutcome::Completed(GatewayConfirmation {
            razorpay_order_id: request.order_id.clone(),
            razorpay_payment_id: payment_id.to_string(),
            razorpay_signature: signature.to_string(),
        }),
        (Some(_), None) => PaymentOutcome::Failed {
            reason: "missing payment signature".to_string(),
        },
    }
}
