//! Wishlist commands.

use clap::Subcommand;
use pashmiya_core::ProductId;
use pashmiya_storefront::reconcile::Reconciliation;
use pashmiya_storefront::wishlist::WishlistStore;

use super::{CliError, Context};

#[derive(Subcommand)]
pub enum WishlistAction {
    /// Show saved products
    List,
    /// Save a product
    Add { product_id: ProductId },
    /// Forget a product
    Remove { product_id: ProductId },
    /// Save or forget a product depending on its current state
    Toggle { product_id: ProductId },
}

/// # Errors
///
/// Returns error if there is no session or the server refuses.
pub async fn run(ctx: &Context, action: WishlistAction) -> Result<(), CliError> {
    ctx.require_session()?;
    let wishlist = WishlistStore::new(ctx.api.clone());
    wishlist.refresh().await?;

    match action {
        WishlistAction::List => {}
        WishlistAction::Add { product_id } => wishlist.add(product_id).await?,
        WishlistAction::Remove { product_id } => wishlist.remove(product_id).await?,
        WishlistAction::Toggle { product_id } => match wishlist.toggle(product_id).await {
            Reconciliation::Confirmed(true) => tracing::info!("Saved product {product_id}"),
            Reconciliation::Confirmed(false) => tracing::info!("Removed product {product_id}"),
            Reconciliation::Stale => tracing::warn!("Wishlist changed while saving, reloaded"),
            Reconciliation::RolledBack { error } => return Err(error.into()),
        },
    }

    let currency = ctx.currency();
    let items = wishlist.items();
    if items.is_empty() {
        tracing::info!("Wishlist is empty");
    }
    for item in items {
        tracing::info!(
            product_id = %item.product_id,
            "{} {}",
            item.product.name,
            currency.format(item.product.price)
        );
    }
    Ok(())
}
