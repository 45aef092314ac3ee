//! Request and response bodies of the storefront REST API.

use chrono::{DateTime, Utc};
use pashmiya_core::{
    CatalogueId, CategoryId, NotificationChannel, NotificationId, NotificationStatus,
    NotificationType, OrderId, OrderStatus, ProductId, UserId, WishlistItemId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Catalog
// =============================================================================

/// Category label embedded in a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: CategoryId,
    pub name: String,
}

/// A product as served by the catalog endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    /// Unit price in the reference currency.
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_price: Option<Decimal>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryRef>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    /// Last-known stock. `None` when the backend does not track it.
    #[serde(default)]
    pub stock: Option<u32>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Product {
    /// Display label of the product's category.
    #[must_use]
    pub fn category_name(&self) -> Option<&str> {
        self.category.as_ref().map(|c| c.name.as_str())
    }
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// Facets offered by the shop filter panel.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterOptions {
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub min_price: Decimal,
    #[serde(default)]
    pub max_price: Decimal,
}

/// A curated product collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalogue {
    pub id: CatalogueId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Query string of `GET /products`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ProductQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
}

/// Query string of `GET /catalogues`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct CatalogueQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

// =============================================================================
// Wishlist
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WishlistItem {
    pub id: WishlistItemId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub product: Product,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Shipping
// =============================================================================

/// A courier quote for one parcel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingRate {
    pub courier_name: String,
    pub rate: Decimal,
    pub currency: String,
    /// Transit days. Couriers sometimes quote a range as text; the lower
    /// bound is kept.
    #[serde(default, deserialize_with = "lenient_days")]
    pub estimated_days: u32,
    #[serde(default)]
    pub service_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub courier_company_id: Option<i64>,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn lenient_days<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    let days = match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        serde_json::Value::String(s) => s
            .split(|c: char| !c.is_ascii_digit())
            .find(|part| !part.is_empty())
            .and_then(|part| part.parse().ok()),
        _ => None,
    };
    Ok(days.and_then(|d| u32::try_from(d).ok()).unwrap_or_default())
}

/// Query string of `GET /shipping/calculate-rates`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateQuery {
    pub pickup_pin: String,
    pub delivery_pin: String,
    pub weight: Decimal,
    pub cod: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RatesResponse {
    #[serde(default)]
    pub rates: Vec<ShippingRate>,
}

// =============================================================================
// Orders
// =============================================================================

/// One line of a new order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub color: String,
    pub size: String,
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub status: OrderStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub shipping_cost: Decimal,
    pub currency: String,
    pub shipping_name: String,
    pub shipping_email: String,
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_state: String,
    pub shipping_country: String,
    pub shipping_zip: String,
    pub shipping_phone: String,
    pub payment_method: String,
    pub items: Vec<OrderItemRequest>,
}

/// Response of `POST /orders`. Older backends answer with `order_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderCreated {
    #[serde(default)]
    pub id: Option<OrderId>,
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
}

impl OrderCreated {
    /// The created order's id, whichever field carried it.
    #[must_use]
    pub const fn order_id(&self) -> Option<OrderId> {
        match (self.id, self.order_id) {
            (Some(id), _) | (None, Some(id)) => Some(id),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: OrderId,
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<Product>,
    pub quantity: u32,
    pub price: Decimal,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub size: String,
}

/// An order from the customer's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    #[serde(default)]
    pub shipping_cost: Option<Decimal>,
    #[serde(default)]
    pub shipping_name: String,
    #[serde(default)]
    pub shipping_address: String,
    #[serde(default)]
    pub shipping_city: String,
    #[serde(default)]
    pub shipping_country: String,
    #[serde(default)]
    pub shipping_zip: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Payments
// =============================================================================

/// Free-form notes attached to a gateway order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentNotes {
    pub order_id: OrderId,
}

/// Body of `POST /payments/create-intent`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentIntentRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    pub receipt: String,
    pub notes: PaymentNotes,
}

/// Gateway order created by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    #[serde(default)]
    pub id: Option<String>,
}

/// Signed confirmation fields returned by the gateway widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfirmation {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

/// Body of `POST /payments/verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentVerification {
    #[serde(flatten)]
    pub confirmation: GatewayConfirmation,
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct VerifyResponse {
    #[serde(default)]
    pub success: bool,
}

// =============================================================================
// Notifications
// =============================================================================

/// A notification addressed to the signed-in customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(rename = "type", default)]
    pub kind: NotificationType,
    #[serde(default)]
    pub channel: NotificationChannel,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    #[must_use]
    pub const fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }
}

/// Response of `GET /notifications/user`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationList {
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub unread_count: usize,
}

/// Per-user notification switches. Saved as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct NotificationPreferences {
    #[serde(default)]
    pub order_created: bool,
    #[serde(default)]
    pub order_shipped: bool,
    #[serde(default)]
    pub order_delivered: bool,
    #[serde(default)]
    pub order_status: bool,
    #[serde(default)]
    pub low_stock: bool,
    #[serde(default)]
    pub product_updates: bool,
    #[serde(default)]
    pub newsletter: bool,
    #[serde(default)]
    pub marketing: bool,
    #[serde(default)]
    pub email_enabled: bool,
    #[serde(default)]
    pub sms_enabled: bool,
    #[serde(default)]
    pub push_enabled: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            order_created: true,
            order_shipped: true,
            order_delivered: true,
            order_status: true,
            low_stock: false,
            product_updates: false,
            newsletter: false,
            marketing: false,
            email_enabled: true,
            sms_enabled: false,
            push_enabled: true,
        }
    }
}

// =============================================================================
// Auth
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RegisterRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WishlistAddRequest {
    pub product_id: ProductId,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_product_decodes_sparse_payload() {
        let product: Product = serde_json::from_value(json!({
            "id": 42,
            "name": "Kashmir Shawl",
            "price": 120.5,
            "category": {"id": 3, "name": "Shawls"},
            "colors": ["Red"],
            "sizes": ["M"],
            "stock": 3
        }))
        .unwrap();
        assert_eq!(product.price, Decimal::new(1205, 1));
        assert_eq!(product.stock, Some(3));
        assert_eq!(product.category_name(), Some("Shawls"));
        assert!(product.is_active);
    }

    #[test]
    fn test_order_created_accepts_either_id_field() {
        let a: OrderCreated = serde_json::from_value(json!({"id": 9, "status": "pending_payment"})).unwrap();
        let b: OrderCreated = serde_json::from_value(json!({"order_id": 11})).unwrap();
        let c: OrderCreated = serde_json::from_value(json!({"status": "pending"})).unwrap();
        assert_eq!(a.order_id(), Some(OrderId::new(9)));
        assert_eq!(b.order_id(), Some(OrderId::new(11)));
        assert_eq!(c.order_id(), None);
    }

    #[test]
    fn test_money_is_sent_as_json_numbers() {
        let body = serde_json::to_value(PaymentIntentRequest {
            amount: Decimal::new(1150, 0),
            currency: "EUR".to_string(),
            receipt: "order_9".to_string(),
            notes: PaymentNotes {
                order_id: OrderId::new(9),
            },
        })
        .unwrap();
        assert_eq!(body["amount"], json!(1150.0));
        assert_eq!(body["notes"]["order_id"], json!(9));
    }

    #[test]
    fn test_verification_body_is_flat() {
        let body = serde_json::to_value(PaymentVerification {
            confirmation: GatewayConfirmation {
                razorpay_order_id: "order_X".to_string(),
                razorpay_payment_id: "pay_Y".to_string(),
                razorpay_signature: "sig".to_string(),
            },
            order_id: OrderId::new(4),
        })
        .unwrap();
        assert_eq!(body["razorpay_payment_id"], "pay_Y");
        assert_eq!(body["order_id"], 4);
    }

    #[test]
    fn test_estimated_days_is_lenient() {
        let rate: ShippingRate = serde_json::from_value(json!({
            "courier_name": "Delhivery",
            "rate": 95,
            "currency": "INR",
            "estimated_days": "3-4"
        }))
        .unwrap();
        assert_eq!(rate.estimated_days, 3);
        assert_eq!(rate.rate, Decimal::new(95, 0));
    }

    #[test]
    fn test_notification_defaults() {
        let n: Notification = serde_json::from_value(json!({
            "id": 1,
            "type": "order_shipped",
            "title": "Shipped",
            "message": "On its way",
            "created_at": "2026-01-05T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(n.kind, NotificationType::OrderShipped);
        assert_eq!(n.channel, NotificationChannel::InApp);
        assert!(n.is_unread());
    }
}
