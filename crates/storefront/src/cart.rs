//! Local cart store.
//!
//! The cart is an ordered list of line items keyed by [`VariantKey`]. It lives
//! in memory and every change is written to storage as a full snapshot; the
//! snapshot is read back once when the store is opened.
//!
//! Quantities are soft-capped at the product's last-known stock: an add past
//! the cap is silently ignored, and a direct quantity update is clamped. Stock
//! is never re-checked against the server here.

use pashmiya_core::ProductId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::Product;
use crate::error::add_breadcrumb;
use crate::storage::{self, SharedStore, keys};

/// The slice of a product a cart line needs to render and price itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartProduct {
    pub id: ProductId,
    pub name: String,
    /// Unit price in the reference currency.
    pub price: Decimal,
    /// Last-known stock. `None` means untracked.
    #[serde(default)]
    pub stock: Option<u32>,
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
}

impl From<&Product> for CartProduct {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            price: product.price,
            stock: product.stock,
            image: product.image.clone(),
            category: product.category_name().map(str::to_owned),
            colors: product.colors.clone(),
            sizes: product.sizes.clone(),
        }
    }
}

impl CartProduct {
    /// Largest quantity the stock allows.
    fn ceiling(&self) -> u32 {
        self.stock.unwrap_or(u32::MAX)
    }
}

/// Identity of a cart line: the same product in another size or color is a
/// separate line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantKey {
    pub product_id: ProductId,
    pub size: String,
    pub color: String,
}

impl VariantKey {
    #[must_use]
    pub fn new(product_id: ProductId, size: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            product_id,
            size: size.into(),
            color: color.into(),
        }
    }
}

/// One line of the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product: CartProduct,
    pub quantity: u32,
    pub selected_size: String,
    pub selected_color: String,
}

impl CartItem {
    #[must_use]
    pub fn key(&self) -> VariantKey {
        VariantKey::new(
            self.product.id,
            self.selected_size.clone(),
            self.selected_color.clone(),
        )
    }

    fn matches(&self, key: &VariantKey) -> bool {
        self.product.id == key.product_id
            && self.selected_size == key.size
            && self.selected_color == key.color
    }

    /// `quantity × unit price`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.product.price * Decimal::from(self.quantity)
    }
}

/// The shopper's cart, mirrored to durable storage.
pub struct CartStore {
    items: Vec<CartItem>,
    store: SharedStore,
}

impl CartStore {
    /// Open the cart, restoring the last snapshot.
    ///
    /// An unreadable snapshot starts an empty cart. Restored lines are
    /// re-clamped to their recorded stock.
    #[must_use]
    pub fn open(store: SharedStore) -> Self {
        let items = match storage::load_json::<Vec<CartItem>>(store.as_ref(), keys::CART) {
            Ok(items) => items.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable cart snapshot");
                Vec::new()
            }
        };

        let items: Vec<CartItem> = items
            .into_iter()
            .filter_map(|mut item| {
                item.quantity = item.quantity.min(item.product.ceiling());
                (item.quantity > 0).then_some(item)
            })
            .collect();
        debug!(lines = items.len(), "Cart restored");

        Self { items, store }
    }

    /// Add one unit of a variant.
    ///
    /// Returns `false` when the add was refused because the line is already at
    /// the stock ceiling (or the product is out of stock).
    pub fn add_to_cart(&mut self, product: &Product, size: &str, color: &str) -> bool {
        let key = VariantKey::new(product.id, size, color);
        let ceiling = product.stock.unwrap_or(u32::MAX);

        let added = if let Some(item) = self.items.iter_mut().find(|i| i.matches(&key)) {
            if item.quantity >= ceiling {
                false
            } else {
                item.quantity += 1;
                true
            }
        } else if ceiling == 0 {
            false
        } else {
            self.items.push(CartItem {
                product: CartProduct::from(product),
                quantity: 1,
                selected_size: key.size,
                selected_color: key.color,
            });
            true
        };

        if added {
            let id = product.id.to_string();
            add_breadcrumb("cart", "Added to cart", Some(&[("product_id", id.as_str())]));
            self.persist();
        } else {
            debug!(product_id = %product.id, "Add refused at stock ceiling");
        }
        added
    }

    /// Remove every line of `product_id`, whatever its size and color.
    pub fn remove_from_cart(&mut self, product_id: ProductId) {
        let before = self.items.len();
        self.items.retain(|i| i.product.id != product_id);
        if self.items.len() != before {
            self.persist();
        }
    }

    /// Remove exactly one variant line.
    pub fn remove_variant(&mut self, key: &VariantKey) {
        let before = self.items.len();
        self.items.retain(|i| !i.matches(key));
        if self.items.len() != before {
            self.persist();
        }
    }

    /// Set the quantity of every line of `product_id`.
    ///
    /// Zero or negative removes the lines; larger values are clamped to each
    /// line's stock.
    pub fn update_quantity(&mut self, product_id: ProductId, quantity: i64) {
        self.set_quantity(quantity, |item| item.product.id == product_id);
    }

    /// Set the quantity of exactly one variant line.
    pub fn update_variant_quantity(&mut self, key: &VariantKey, quantity: i64) {
        self.set_quantity(quantity, |item| item.matches(key));
    }

    fn set_quantity(&mut self, quantity: i64, mut target: impl FnMut(&CartItem) -> bool) {
        let requested = u32::try_from(quantity.max(0)).unwrap_or(u32::MAX);
        let mut changed = false;

        self.items.retain_mut(|item| {
            if !target(item) {
                return true;
            }
            let next = requested.min(item.product.ceiling());
            changed |= next != item.quantity;
            item.quantity = next;
            next > 0
        });

        if changed {
            self.persist();
        }
    }

    pub fn clear_cart(&mut self) {
        if !self.items.is_empty() {
            self.items.clear();
            self.persist();
        }
    }

    /// Lines in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// First line of `product_id`.
    #[must_use]
    pub fn find(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product.id == product_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of quantities.
    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    /// Sum of line totals in the reference currency.
    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.items.iter().map(CartItem::line_total).sum()
    }

    fn persist(&self) {
        if let Err(e) = storage::save_json(self.store.as_ref(), keys::CART, &self.items) {
            warn!(error = %e, "Failed to persist cart snapshot");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::{KeyValueStore, MemoryStore};

    fn product(id: i64, price: i64, stock: Option<u32>) -> Product {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": format!("Shawl {id}"),
            "price": price,
            "colors": ["Red", "Blue"],
            "sizes": ["S", "M"],
            "stock": stock,
        }))
        .unwrap()
    }

    fn cart() -> (CartStore, SharedStore) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        (CartStore::open(Arc::clone(&store)), store)
    }

    fn assert_totals_consistent(cart: &CartStore) {
        let qty: u64 = cart.items().iter().map(|i| u64::from(i.quantity)).sum();
        let price: Decimal = cart
            .items()
            .iter()
            .map(|i| i.product.price * Decimal::from(i.quantity))
            .sum();
        assert_eq!(cart.total_items(), qty);
        assert_eq!(cart.total_price(), price);
        assert!(cart.items().iter().all(|i| i.quantity >= 1));
    }

    #[test]
    fn test_variant_isolation_and_ceiling() {
        let (mut cart, _) = cart();
        let shawl = product(42, 100, Some(3));

        assert!(cart.add_to_cart(&shawl, "M", "Red"));
        assert!(cart.add_to_cart(&shawl, "M", "Red"));
        assert!(cart.add_to_cart(&shawl, "M", "Red"));
        assert!(!cart.add_to_cart(&shawl, "M", "Red"));

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 3);

        assert!(cart.add_to_cart(&shawl, "S", "Red"));
        assert_eq!(cart.items().len(), 2);
        assert_totals_consistent(&cart);
    }

    #[test]
    fn test_out_of_stock_cannot_be_added() {
        let (mut cart, _) = cart();
        assert!(!cart.add_to_cart(&product(1, 10, Some(0)), "M", "Red"));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_untracked_stock_is_unbounded() {
        let (mut cart, _) = cart();
        let shawl = product(5, 10, None);
        for _ in 0..50 {
            assert!(cart.add_to_cart(&shawl, "M", "Red"));
        }
        assert_eq!(cart.total_items(), 50);
    }

    #[test]
    fn test_quantity_floor_removes_line() {
        let (mut cart, _) = cart();
        cart.add_to_cart(&product(1, 10, Some(5)), "M", "Red");
        cart.add_to_cart(&product(2, 10, Some(5)), "M", "Red");

        cart.update_quantity(ProductId::new(1), 0);
        assert!(cart.find(ProductId::new(1)).is_none());

        cart.update_quantity(ProductId::new(2), -1);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_update_quantity_clamps_to_stock() {
        let (mut cart, _) = cart();
        cart.add_to_cart(&product(1, 25, Some(4)), "M", "Red");
        cart.update_quantity(ProductId::new(1), 10);
        assert_eq!(cart.items()[0].quantity, 4);
        cart.update_quantity(ProductId::new(1), 2);
        assert_eq!(cart.items()[0].quantity, 2);
        assert_eq!(cart.total_price(), Decimal::new(50, 0));
    }

    #[test]
    fn test_remove_by_id_takes_every_variant() {
        let (mut cart, _) = cart();
        let shawl = product(7, 10, None);
        cart.add_to_cart(&shawl, "M", "Red");
        cart.add_to_cart(&shawl, "S", "Blue");
        cart.add_to_cart(&product(8, 10, None), "M", "Red");

        cart.remove_from_cart(ProductId::new(7));
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].product.id, ProductId::new(8));
    }

    #[test]
    fn test_variant_precise_operations() {
        let (mut cart, _) = cart();
        let shawl = product(7, 10, None);
        cart.add_to_cart(&shawl, "M", "Red");
        cart.add_to_cart(&shawl, "S", "Blue");

        cart.update_variant_quantity(&VariantKey::new(ProductId::new(7), "S", "Blue"), 3);
        assert_eq!(cart.total_items(), 4);

        cart.remove_variant(&VariantKey::new(ProductId::new(7), "M", "Red"));
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].selected_size, "S");
    }

    #[test]
    fn test_totals_hold_across_mixed_sequence() {
        let (mut cart, _) = cart();
        let a = product(1, 30, Some(2));
        let b = product(2, 45, None);

        cart.add_to_cart(&a, "M", "Red");
        assert_totals_consistent(&cart);
        cart.add_to_cart(&b, "S", "Blue");
        assert_totals_consistent(&cart);
        cart.add_to_cart(&a, "M", "Red");
        cart.add_to_cart(&a, "M", "Red");
        assert_totals_consistent(&cart);
        cart.update_quantity(ProductId::new(2), 4);
        assert_totals_consistent(&cart);
        cart.remove_from_cart(ProductId::new(1));
        assert_totals_consistent(&cart);
        assert_eq!(cart.total_price(), Decimal::new(180, 0));
        cart.clear_cart();
        assert_totals_consistent(&cart);
        assert_eq!(cart.total_items(), 0);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let (mut cart, store) = cart();
        cart.add_to_cart(&product(1, 10, Some(5)), "M", "Red");
        cart.add_to_cart(&product(2, 20, Some(5)), "S", "Blue");
        cart.update_quantity(ProductId::new(2), 3);

        let restored = CartStore::open(store);
        assert_eq!(restored.items(), cart.items());
        assert_eq!(restored.total_price(), Decimal::new(70, 0));
    }

    #[test]
    fn test_corrupt_snapshot_starts_empty() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        store.set(keys::CART, "[{\"product\":").unwrap();
        assert!(CartStore::open(store).is_empty());
    }

    #[test]
    fn test_restore_reclamps_snapshot() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let raw = serde_json::json!([
            {"product": {"id": 1, "name": "A", "price": "10", "stock": 2},
             "quantity": 9, "selected_size": "M", "selected_color": "Red"},
            {"product": {"id": 2, "name": "B", "price": "10"},
             "quantity": 0, "selected_size": "M", "selected_color": "Red"}
        ]);
        store.set(keys::CART, &raw.to_string()).unwrap();

        let cart = CartStore::open(store);
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 2);
    }
}
