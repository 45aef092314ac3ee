//! Status enums and tags for orders and notifications.
//!
//! Notification tags arrive from the backend as free-form strings; unknown
//! values decode to an `Other` variant instead of failing the whole payload.

use serde::{Deserialize, Serialize};

/// Order lifecycle status as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created at checkout, waiting for the payment gateway.
    #[default]
    PendingPayment,
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
    #[serde(other)]
    Other,
}

impl OrderStatus {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::Other => "other",
        }
    }
}

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    OrderCreated,
    OrderShipped,
    OrderDelivered,
    OrderStatus,
    LowStock,
    ProductUpdate,
    #[default]
    #[serde(other)]
    Other,
}

/// How a notification was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Sms,
    Push,
    #[default]
    InApp,
    #[serde(other)]
    Other,
}

/// Server-side delivery state of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    #[default]
    Sent,
    Failed,
    #[serde(other)]
    Other,
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OrderCreated => "order_created",
            Self::OrderShipped => "order_shipped",
            Self::OrderDelivered => "order_delivered",
            Self::OrderStatus => "order_status",
            Self::LowStock => "low_stock",
            Self::ProductUpdate => "product_update",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}
