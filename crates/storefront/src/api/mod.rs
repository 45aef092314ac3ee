//! REST API gateway client.
//!
//! # Architecture
//!
//! - Thin request/response layer over `reqwest`; no caching here (see
//!   [`crate::catalog`] for cached catalog reads)
//! - Bearer token injected from the [`SessionContext`] on every request
//! - Any `401` expires the session and surfaces as [`ApiError::Unauthorized`]
//! - Error bodies are unwrapped from `{"error": "..."}`, falling back to the
//!   raw body text
//!
//! # Example
//!
//! ```rust,ignore
//! use pashmiya_storefront::api::ApiClient;
//!
//! let client = ApiClient::new(&config, session.clone())?;
//! let products = client.get_products(&ProductQuery::default()).await?;
//! ```

mod types;

pub use types::*;

use std::sync::Arc;

use pashmiya_core::{CatalogueId, NotificationId, OrderId, ProductId};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::StorefrontConfig;
use crate::session::{AuthResponse, SessionContext, User};

/// Message used when the backend gives no usable error body.
const GENERIC_ERROR: &str = "An error occurred";

/// Errors that can occur when calling the storefront API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server rejected the credential; the session has been cleared.
    #[error("Session expired. Please login again.")]
    Unauthorized,

    /// The server answered with a non-success status.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// Response body did not match the expected shape.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Endpoint URL could not be built.
    #[error("Invalid endpoint: {0}")]
    Endpoint(String),
}

impl ApiError {
    /// HTTP status carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Parse(_) | Self::Endpoint(_) => None,
        }
    }

    /// Message suitable for showing to the shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized | Self::Status { .. } => self.to_string(),
            Self::Http(_) | Self::Parse(_) | Self::Endpoint(_) => GENERIC_ERROR.to_string(),
        }
    }
}

/// Extract the shopper-facing message from a non-success body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| match v.get("error") {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        })
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| GENERIC_ERROR.to_string())
}

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the storefront REST API.
///
/// Cheap to clone; clones share one connection pool and one session.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base: String,
    session: SessionContext,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &StorefrontConfig, session: SessionContext) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pashmiya/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, &config.api_url, session))
    }

    /// Create a client around an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base: &Url, session: SessionContext) -> Self {
        Self {
            inner: Arc::new(ApiClientInner {
                client,
                base: base.as_str().trim_end_matches('/').to_string(),
                session,
            }),
        }
    }

    /// The session this client authenticates with.
    #[must_use]
    pub fn session(&self) -> &SessionContext {
        &self.inner.session
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.inner.base, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let mut builder = self.inner.client.request(method, self.endpoint(path));
        if let Some(auth) = self.inner.session.authorization() {
            let value = HeaderValue::from_str(&auth)
                .map_err(|e| ApiError::Endpoint(format!("Invalid token format: {e}")))?;
            builder = builder.header(AUTHORIZATION, value);
        }
        Ok(builder)
    }

    /// Send a request and map non-success statuses to errors.
    async fn dispatch(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            self.inner.session.expire();
            return Err(ApiError::Unauthorized);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body);
            debug!(status = %status, message = %message, "API returned non-success status");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    /// Send a request and decode the JSON body.
    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.dispatch(builder).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            warn!(
                error = %e,
                body = %text.chars().take(500).collect::<String>(),
                "Failed to parse API response"
            );
            ApiError::Parse(e)
        })
    }

    /// Send a request whose response body is irrelevant.
    async fn send_unit(&self, builder: RequestBuilder) -> Result<(), ApiError> {
        self.dispatch(builder).await.map(drop)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(self.request(Method::GET, path)?).await
    }

    async fn get_with<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<T, ApiError> {
        self.send_json(self.request(Method::GET, path)?.query(query))
            .await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(self.request(Method::POST, path)?.json(body))
            .await
    }

    // =========================================================================
    // Auth
    // =========================================================================

    /// Sign in with email and password, storing the credential in the session.
    ///
    /// # Errors
    ///
    /// Returns error if the credentials are rejected or the request fails.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let auth: AuthResponse = self
            .post("auth/login", &LoginRequest { email, password })
            .await?;
        let user = auth.user.clone();
        self.inner.session.sign_in(auth);
        Ok(user)
    }

    /// Create an account, storing the credential in the session.
    ///
    /// # Errors
    ///
    /// Returns error if registration is rejected or the request fails.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        phone: Option<&str>,
    ) -> Result<User, ApiError> {
        let body = RegisterRequest {
            name,
            email,
            password,
            phone,
        };
        let auth: AuthResponse = self.post("auth/register", &body).await?;
        let user = auth.user.clone();
        self.inner.session.sign_in(auth);
        Ok(user)
    }

    /// Sign out. The local session is cleared even if the server call fails.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let result = match self.request(Method::POST, "auth/logout") {
            Ok(builder) => self.send_unit(builder).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            debug!(error = %e, "Server logout failed");
        }
        self.inner.session.sign_out();
    }

    /// Fetch the signed-in user's profile and refresh the cached copy.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn current_user(&self) -> Result<User, ApiError> {
        let user: User = self.get("user/me").await?;
        self.inner.session.update_user(user.clone());
        Ok(user)
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn get_products(&self, query: &ProductQuery) -> Result<Vec<Product>, ApiError> {
        self.get_with("products", query).await
    }

    /// # Errors
    ///
    /// Returns error if the product does not exist or the request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product, ApiError> {
        self.get(&format!("products/{id}")).await
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn search_products(&self, q: &str) -> Result<Vec<Product>, ApiError> {
        self.get_with("products/search", &[("q", q)]).await
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn get_filters(&self) -> Result<FilterOptions, ApiError> {
        self.get("filters").await
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn get_categories(&self) -> Result<Vec<Category>, ApiError> {
        self.get("categories").await
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn get_catalogues(&self, query: &CatalogueQuery) -> Result<Vec<Catalogue>, ApiError> {
        self.get_with("catalogues", query).await
    }

    /// # Errors
    ///
    /// Returns error if the catalogue does not exist or the request fails.
    #[instrument(skip(self), fields(catalogue_id = %id))]
    pub async fn get_catalogue(&self, id: CatalogueId) -> Result<Catalogue, ApiError> {
        self.get(&format!("catalogues/{id}")).await
    }

    // =========================================================================
    // Wishlist
    // =========================================================================

    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn get_wishlist(&self) -> Result<Vec<WishlistItem>, ApiError> {
        self.get("wishlist").await
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_to_wishlist(&self, product_id: ProductId) -> Result<(), ApiError> {
        let builder = self
            .request(Method::POST, "wishlist")?
            .json(&WishlistAddRequest { product_id });
        self.send_unit(builder).await
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_from_wishlist(&self, product_id: ProductId) -> Result<(), ApiError> {
        let builder = self.request(Method::DELETE, &format!("wishlist/{product_id}"))?;
        self.send_unit(builder).await
    }

    // =========================================================================
    // Shipping, orders and payments
    // =========================================================================

    /// Quote couriers for one parcel.
    ///
    /// # Errors
    ///
    /// Returns error if the rate service fails.
    #[instrument(skip(self), fields(delivery_pin = %query.delivery_pin))]
    pub async fn calculate_shipping_rates(
        &self,
        query: &RateQuery,
    ) -> Result<Vec<ShippingRate>, ApiError> {
        let response: RatesResponse = self.get_with("shipping/calculate-rates", query).await?;
        Ok(response.rates)
    }

    /// # Errors
    ///
    /// Returns error if the order is rejected or the request fails.
    #[instrument(skip(self, order), fields(items = order.items.len(), total = %order.total_amount))]
    pub async fn create_order(&self, order: &OrderRequest) -> Result<OrderCreated, ApiError> {
        self.post("orders", order).await
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn get_orders(&self) -> Result<Vec<Order>, ApiError> {
        self.get("orders").await
    }

    /// # Errors
    ///
    /// Returns error if the order does not exist or the request fails.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn get_order(&self, id: OrderId) -> Result<Order, ApiError> {
        self.get(&format!("orders/{id}")).await
    }

    /// # Errors
    ///
    /// Returns error if the gateway order cannot be created.
    #[instrument(skip(self, intent), fields(receipt = %intent.receipt))]
    pub async fn create_payment_intent(
        &self,
        intent: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ApiError> {
        self.post("payments/create-intent", intent).await
    }

    /// Ask the backend to check the gateway signature. Returns the verdict.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self, verification), fields(order_id = %verification.order_id))]
    pub async fn verify_payment(
        &self,
        verification: &PaymentVerification,
    ) -> Result<bool, ApiError> {
        let response: VerifyResponse = self.post("payments/verify", verification).await?;
        Ok(response.success)
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn get_notifications(&self) -> Result<NotificationList, ApiError> {
        self.get("notifications/user").await
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self), fields(notification_id = %id))]
    pub async fn mark_notification_read(&self, id: NotificationId) -> Result<(), ApiError> {
        let builder = self.request(Method::PUT, &format!("notifications/{id}/read"))?;
        self.send_unit(builder).await
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self))]
    pub async fn mark_all_notifications_read(&self) -> Result<(), ApiError> {
        let builder = self.request(Method::PUT, "notifications/read-all")?;
        self.send_unit(builder).await
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self), fields(notification_id = %id))]
    pub async fn delete_notification(&self, id: NotificationId) -> Result<(), ApiError> {
        let builder = self.request(Method::DELETE, &format!("notifications/{id}"))?;
        self.send_unit(builder).await
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn get_notification_preferences(
        &self,
    ) -> Result<NotificationPreferences, ApiError> {
        self.get("notifications/preferences").await
    }

    /// Overwrite the preference row and return the stored copy.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    #[instrument(skip(self, preferences))]
    pub async fn update_notification_preferences(
        &self,
        preferences: &NotificationPreferences,
    ) -> Result<NotificationPreferences, ApiError> {
        self.send_json(
            self.request(Method::PUT, "notifications/preferences")?
                .json(preferences),
        )
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::with_client(
            reqwest::Client::new(),
            &Url::parse(base).unwrap(),
            SessionContext::ephemeral(),
        )
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let api = client("http://localhost:8080/api/");
        assert_eq!(api.endpoint("products"), "http://localhost:8080/api/products");
        assert_eq!(
            api.endpoint("/notifications/read-all"),
            "http://localhost:8080/api/notifications/read-all"
        );
    }

    #[test]
    fn test_error_message_prefers_json_error_field() {
        assert_eq!(error_message(r#"{"error":"Out of stock"}"#), "Out of stock");
    }

    #[test]
    fn test_error_message_falls_back_to_text_then_generic() {
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(error_message(r#"{"message":"nope"}"#), r#"{"message":"nope"}"#);
        assert_eq!(error_message("   "), GENERIC_ERROR);
        assert_eq!(error_message(r#"{"error":""}"#), r#"{"error":""}"#);
    }

    #[test]
    fn test_status_accessor() {
        assert_eq!(ApiError::Unauthorized.status(), Some(401));
        let err = ApiError::Status {
            status: 409,
            message: "Already in wishlist".to_string(),
        };
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.user_message(), "Already in wishlist");
    }
}
