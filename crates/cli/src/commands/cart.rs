//! Cart commands.

use clap::Subcommand;
use pashmiya_core::ProductId;
use pashmiya_storefront::cart::{CartStore, VariantKey};
use pashmiya_storefront::catalog::Catalog;
use pashmiya_storefront::currency::CurrencyPreference;

use super::{CliError, Context};

#[derive(Subcommand)]
pub enum CartAction {
    /// Show cart lines and totals
    List,
    /// Add one unit of a product variant
    Add {
        product_id: ProductId,
        #[arg(long, default_value = "")]
        size: String,
        #[arg(long, default_value = "")]
        color: String,
    },
    /// Set a line's quantity; zero or less removes it
    Update {
        product_id: ProductId,
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
        /// Only touch this size (requires --color too)
        #[arg(long, requires = "color")]
        size: Option<String>,
        #[arg(long, requires = "size")]
        color: Option<String>,
    },
    /// Remove a product; with --size/--color only that variant
    Remove {
        product_id: ProductId,
        #[arg(long, requires = "color")]
        size: Option<String>,
        #[arg(long, requires = "size")]
        color: Option<String>,
    },
    /// Empty the cart
    Clear,
}

/// # Errors
///
/// Returns error if a product lookup fails.
pub async fn run(ctx: &Context, action: CartAction) -> Result<(), CliError> {
    let mut cart = ctx.cart();
    let currency = ctx.currency();

    match action {
        CartAction::List => {}
        CartAction::Add {
            product_id,
            size,
            color,
        } => {
            let catalog = Catalog::new(ctx.api.clone());
            let product = catalog.product(product_id).await?;
            if cart.add_to_cart(&product, &size, &color) {
                tracing::info!("Added {} to cart", product.name);
            } else {
                tracing::warn!("{} is at its stock limit, nothing added", product.name);
            }
        }
        CartAction::Update {
            product_id,
            quantity,
            size,
            color,
        } => match (size, color) {
            (Some(size), Some(color)) => {
                cart.update_variant_quantity(&VariantKey::new(product_id, size, color), quantity);
            }
            _ => cart.update_quantity(product_id, quantity),
        },
        CartAction::Remove {
            product_id,
            size,
            color,
        } => match (size, color) {
            (Some(size), Some(color)) => {
                cart.remove_variant(&VariantKey::new(product_id, size, color));
            }
            _ => cart.remove_from_cart(product_id),
        },
        CartAction::Clear => cart.clear_cart(),
    }

    show(&cart, &currency);
    Ok(())
}

fn show(cart: &CartStore, currency: &CurrencyPreference) {
    if cart.is_empty() {
        tracing::info!("Cart is empty");
        return;
    }

    for item in cart.items() {
        tracing::info!(
            product_id = %item.product.id,
            size = %item.selected_size,
            color = %item.selected_color,
            "{} x{} {}",
            item.product.name,
            item.quantity,
            currency.format(item.line_total())
        );
    }
    tracing::info!(
        items = cart.total_items(),
        "Total {}",
        currency.format(cart.total_price())
    );
}
