//! End-to-end harness for the Pashmiya storefront engine.
//!
//! [`FakeBackend`] serves the REST endpoints and the push WebSocket the engine
//! talks to, in-process on `127.0.0.1:0`. Tests flip its failure switches and
//! read back what the engine sent.
//!
//! ```rust,ignore
//! let backend = FakeBackend::start().await;
//! let api = backend.signed_in_client().await;
//! assert!(api.session().is_authenticated());
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use pashmiya_storefront::api::ApiClient;
use pashmiya_storefront::config::StorefrontConfig;
use pashmiya_storefront::session::SessionContext;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use url::Url;

/// Token the fake backend hands out and accepts.
pub const TOKEN: &str = "test-token";
/// Password accepted by the fake login endpoint.
pub const PASSWORD: &str = "secret";
/// Postal code for which the rate service fails.
pub const FAILING_PIN: &str = "400001";
/// Internal order id returned by `POST /orders`.
pub const ORDER_ID: i64 = 31;
/// Gateway order id returned by `POST /payments/create-intent`.
pub const GATEWAY_ORDER_ID: &str = "order_rzp_1";
/// User the fake login signs in.
pub const USER_ID: i64 = 7;

/// Lock a mutex, ignoring poisoning from a panicked test task.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A catalog product as the backend serializes it.
#[must_use]
pub fn product(id: i64, name: &str, price: i64, stock: u32) -> Value {
    json!({
        "id": id,
        "name": name,
        "price": price,
        "stock": stock,
        "colors": ["Red", "Blue"],
        "sizes": ["S", "M"],
        "category": {"id": 1, "name": "Shawls"},
    })
}

/// A stored notification as the backend serializes it.
#[must_use]
pub fn notification(id: i64, title: &str, read: bool) -> Value {
    let mut value = json!({
        "id": id,
        "user_id": USER_ID,
        "type": "order_status",
        "channel": "in_app",
        "title": title,
        "message": format!("{title} details"),
        "status": "sent",
        "created_at": "2026-03-01T10:00:00Z",
    });
    if read {
        value["read_at"] = json!("2026-03-01T11:00:00Z");
    }
    value
}

/// Shared state of the fake backend.
pub struct BackendState {
    pub products: Mutex<Vec<Value>>,
    pub wishlist: Mutex<Vec<i64>>,
    pub notifications: Mutex<Vec<Value>>,
    pub preferences: Mutex<Value>,

    /// Bodies received by `POST /orders`.
    pub orders: Mutex<Vec<Value>>,
    /// Bodies received by `POST /payments/create-intent`.
    pub intents: Mutex<Vec<Value>>,
    /// Bodies received by `POST /payments/verify`.
    pub verifications: Mutex<Vec<Value>>,
    /// Query strings received by the rate endpoint.
    pub rate_queries: Mutex<Vec<HashMap<String, String>>>,
    /// `Authorization` headers seen on authenticated endpoints.
    pub authorizations: Mutex<Vec<Option<String>>>,

    /// Messages the clients sent over the push socket.
    pub ws_handshakes: Mutex<Vec<Value>>,
    /// Query strings of push socket upgrades.
    pub ws_queries: Mutex<Vec<HashMap<String, String>>>,
    /// Push sockets ever accepted.
    pub ws_connections: AtomicUsize,

    pub revoke_token: AtomicBool,
    pub fail_categories: AtomicBool,
    pub fail_wishlist_writes: AtomicBool,
    pub fail_notification_writes: AtomicBool,
    /// `POST /orders` answers 500.
    pub fail_orders: AtomicBool,
    /// `POST /payments/create-intent` answers without a gateway order id.
    pub fail_intents: AtomicBool,
    pub reject_verification: AtomicBool,

    push: broadcast::Sender<String>,
    kick: broadcast::Sender<()>,
}

impl BackendState {
    fn new() -> Self {
        Self {
            products: Mutex::new(vec![
                product(1, "Kani Stole", 40, 10),
                product(7, "Sozni Shawl", 95, 3),
                product(42, "Ring Shawl", 120, 3),
            ]),
            wishlist: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
            preferences: Mutex::new(json!({
                "order_created": true,
                "order_shipped": true,
                "order_delivered": true,
                "order_status": true,
                "low_stock": false,
                "product_updates": false,
                "newsletter": false,
                "marketing": false,
                "email_enabled": true,
                "sms_enabled": false,
                "push_enabled": true,
            })),
            orders: Mutex::new(Vec::new()),
            intents: Mutex::new(Vec::new()),
            verifications: Mutex::new(Vec::new()),
            rate_queries: Mutex::new(Vec::new()),
            authorizations: Mutex::new(Vec::new()),
            ws_handshakes: Mutex::new(Vec::new()),
            ws_queries: Mutex::new(Vec::new()),
            ws_connections: AtomicUsize::new(0),
            revoke_token: AtomicBool::new(false),
            fail_categories: AtomicBool::new(false),
            fail_wishlist_writes: AtomicBool::new(false),
            fail_notification_writes: AtomicBool::new(false),
            fail_orders: AtomicBool::new(false),
            fail_intents: AtomicBool::new(false),
            reject_verification: AtomicBool::new(false),
            push: broadcast::channel(16).0,
            kick: broadcast::channel(4).0,
        }
    }

    /// Send one text frame to every open push socket. Returns how many
    /// sockets received it.
    pub fn push_frame(&self, frame: &str) -> usize {
        self.push.send(frame.to_string()).unwrap_or(0)
    }

    /// Close every open push socket from the server side.
    pub fn kick_sockets(&self) {
        let _ = self.kick.send(());
    }

    pub fn set(&self, flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }
}

/// A running fake backend.
pub struct FakeBackend {
    addr: SocketAddr,
    state: Arc<BackendState>,
}

impl FakeBackend {
    /// Bind to an ephemeral port and start serving.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::new());
        let app = router(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });

        Self { addr, state }
    }

    #[must_use]
    pub fn state(&self) -> &BackendState {
        &self.state
    }

    /// # Panics
    ///
    /// Never in practice; the address is always a valid URL.
    #[must_use]
    pub fn api_url(&self) -> Url {
        Url::parse(&format!("http://{}/api", self.addr)).expect("api url")
    }

    /// # Panics
    ///
    /// Never in practice; the address is always a valid URL.
    #[must_use]
    pub fn ws_url(&self) -> Url {
        Url::parse(&format!("ws://{}/ws", self.addr)).expect("ws url")
    }

    /// Engine configuration pointing at this backend, with a short reconnect
    /// delay and a gateway key.
    #[must_use]
    pub fn config(&self) -> StorefrontConfig {
        let mut config = StorefrontConfig::new(self.api_url(), self.ws_url());
        config.reconnect_delay = Duration::from_millis(200);
        config.checkout.gateway_key = Some("rzp_test_key".to_string());
        config
    }

    /// A client with a fresh in-memory session, not signed in.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built.
    #[must_use]
    pub fn client(&self) -> ApiClient {
        ApiClient::new(&self.config(), SessionContext::ephemeral()).expect("api client")
    }

    /// A client signed in as [`USER_ID`].
    ///
    /// # Panics
    ///
    /// Panics if the fake login fails.
    pub async fn signed_in_client(&self) -> ApiClient {
        let api = self.client();
        api.login("asha@example.com", PASSWORD)
            .await
            .expect("fake login");
        api
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

// =============================================================================
// Routes
// =============================================================================

type Shared = State<Arc<BackendState>>;

fn router(state: Arc<BackendState>) -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(ok))
        .route("/api/user/me", get(me))
        .route("/api/products", get(products))
        .route("/api/products/{id}", get(product_by_id))
        .route("/api/categories", get(categories))
        .route("/api/filters", get(filters))
        .route("/api/wishlist", get(wishlist).post(wishlist_add))
        .route("/api/wishlist/{id}", axum::routing::delete(wishlist_remove))
        .route("/api/shipping/calculate-rates", get(rates))
        .route("/api/orders", post(create_order))
        .route("/api/payments/create-intent", post(create_intent))
        .route("/api/payments/verify", post(verify))
        .route("/api/notifications/user", get(notifications))
        .route("/api/notifications/read-all", put(read_all))
        .route("/api/notifications/preferences", get(preferences).put(save_preferences))
        .route("/api/notifications/{id}/read", put(read_one))
        .route("/api/notifications/{id}", axum::routing::delete(delete_notification))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn check_auth(state: &BackendState, headers: &HeaderMap) -> Result<(), Response> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let valid = header.as_deref() == Some(&format!("Bearer {TOKEN}"))
        && !state.revoke_token.load(Ordering::SeqCst);
    lock(&state.authorizations).push(header);
    if valid {
        Ok(())
    } else {
        Err(error(StatusCode::UNAUTHORIZED, "Unauthorized"))
    }
}

/// Like [`check_auth`], but a missing header is a guest and passes.
fn check_guest_or_auth(state: &BackendState, headers: &HeaderMap) -> Result<(), Response> {
    if headers.contains_key(AUTHORIZATION) {
        check_auth(state, headers)
    } else {
        lock(&state.authorizations).push(None);
        Ok(())
    }
}

fn user() -> Value {
    json!({"id": USER_ID, "email": "asha@example.com", "name": "Asha Rao", "role": "customer"})
}

async fn ok() -> Json<Value> {
    Json(json!({}))
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["password"] == PASSWORD {
        Json(json!({ "user": user(), "token": TOKEN })).into_response()
    } else {
        error(StatusCode::BAD_REQUEST, "Invalid email or password")
    }
}

async fn me(State(state): Shared, headers: HeaderMap) -> Response {
    if let Err(denied) = check_auth(&state, &headers) {
        return denied;
    }
    Json(user()).into_response()
}

async fn products(State(state): Shared) -> Json<Value> {
    Json(Value::Array(lock(&state.products).clone()))
}

async fn product_by_id(State(state): Shared, Path(id): Path<i64>) -> Response {
    lock(&state.products)
        .iter()
        .find(|p| p["id"] == id)
        .map_or_else(
            || error(StatusCode::NOT_FOUND, "Product not found"),
            |p| Json(p.clone()).into_response(),
        )
}

async fn categories(State(state): Shared) -> Response {
    if state.fail_categories.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable").into_response();
    }
    Json(json!([{"id": 1, "name": "Shawls", "slug": "shawls"}])).into_response()
}

async fn filters() -> Json<Value> {
    Json(json!({"colors": ["Red", "Blue"], "sizes": ["S", "M"], "min_price": 40, "max_price": 120}))
}

async fn wishlist(State(state): Shared, headers: HeaderMap) -> Response {
    if let Err(denied) = check_auth(&state, &headers) {
        return denied;
    }
    let ids = lock(&state.wishlist).clone();
    let products = lock(&state.products).clone();
    let items: Vec<Value> = ids
        .iter()
        .enumerate()
        .filter_map(|(i, id)| {
            let product = products.iter().find(|p| p["id"] == *id)?;
            Some(json!({
                "id": i + 1,
                "user_id": USER_ID,
                "product_id": id,
                "product": product,
                "created_at": "2026-03-01T10:00:00Z",
            }))
        })
        .collect();
    Json(Value::Array(items)).into_response()
}

async fn wishlist_add(State(state): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(denied) = check_auth(&state, &headers) {
        return denied;
    }
    if state.fail_wishlist_writes.load(Ordering::SeqCst) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update wishlist");
    }
    let Some(id) = body["product_id"].as_i64() else {
        return error(StatusCode::BAD_REQUEST, "product_id is required");
    };
    let mut wishlist = lock(&state.wishlist);
    if !wishlist.contains(&id) {
        wishlist.push(id);
    }
    (StatusCode::CREATED, Json(json!({"message": "Added"}))).into_response()
}

async fn wishlist_remove(State(state): Shared, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    if let Err(denied) = check_auth(&state, &headers) {
        return denied;
    }
    if state.fail_wishlist_writes.load(Ordering::SeqCst) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update wishlist");
    }
    lock(&state.wishlist).retain(|p| *p != id);
    Json(json!({"message": "Removed"})).into_response()
}

async fn rates(State(state): Shared, Query(query): Query<HashMap<String, String>>) -> Response {
    let failing = query.get("delivery_pin").map(String::as_str) == Some(FAILING_PIN);
    lock(&state.rate_queries).push(query);
    if failing {
        return error(StatusCode::BAD_GATEWAY, "Courier service unavailable");
    }
    Json(json!({
        "rates": [
            {"courier_name": "Delhivery Surface", "rate": 80, "currency": "INR", "estimated_days": "4", "service_type": "surface", "courier_company_id": 12},
            {"courier_name": "Blue Dart Air", "rate": 210.5, "currency": "INR", "estimated_days": 1, "service_type": "air", "courier_company_id": 3},
        ]
    }))
    .into_response()
}

async fn create_order(State(state): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(denied) = check_guest_or_auth(&state, &headers) {
        return denied;
    }
    lock(&state.orders).push(body);
    if state.fail_orders.load(Ordering::SeqCst) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create order");
    }
    (
        StatusCode::CREATED,
        Json(json!({"order_id": ORDER_ID, "status": "pending_payment"})),
    )
        .into_response()
}

async fn create_intent(State(state): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(denied) = check_guest_or_auth(&state, &headers) {
        return denied;
    }
    lock(&state.intents).push(body);
    if state.fail_intents.load(Ordering::SeqCst) {
        return Json(json!({"status": "failed"})).into_response();
    }
    Json(json!({"id": GATEWAY_ORDER_ID, "status": "created"})).into_response()
}

async fn verify(State(state): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(denied) = check_guest_or_auth(&state, &headers) {
        return denied;
    }
    lock(&state.verifications).push(body);
    let success = !state.reject_verification.load(Ordering::SeqCst);
    Json(json!({ "success": success })).into_response()
}

async fn notifications(State(state): Shared, headers: HeaderMap) -> Response {
    if let Err(denied) = check_auth(&state, &headers) {
        return denied;
    }
    let list = lock(&state.notifications).clone();
    let unread = list.iter().filter(|n| n["read_at"].is_null()).count();
    Json(json!({"notifications": list, "unread_count": unread})).into_response()
}

fn notification_write(state: &BackendState, headers: &HeaderMap) -> Result<(), Response> {
    check_auth(state, headers)?;
    if state.fail_notification_writes.load(Ordering::SeqCst) {
        return Err(error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update notification"));
    }
    Ok(())
}

async fn read_one(State(state): Shared, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    if let Err(denied) = notification_write(&state, &headers) {
        return denied;
    }
    for n in lock(&state.notifications).iter_mut().filter(|n| n["id"] == id) {
        n["read_at"] = json!("2026-03-02T09:00:00Z");
    }
    Json(json!({})).into_response()
}

async fn read_all(State(state): Shared, headers: HeaderMap) -> Response {
    if let Err(denied) = notification_write(&state, &headers) {
        return denied;
    }
    for n in lock(&state.notifications).iter_mut() {
        n["read_at"] = json!("2026-03-02T09:00:00Z");
    }
    Json(json!({})).into_response()
}

async fn delete_notification(State(state): Shared, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    if let Err(denied) = notification_write(&state, &headers) {
        return denied;
    }
    lock(&state.notifications).retain(|n| n["id"] != id);
    Json(json!({})).into_response()
}

async fn preferences(State(state): Shared, headers: HeaderMap) -> Response {
    if let Err(denied) = check_auth(&state, &headers) {
        return denied;
    }
    Json(lock(&state.preferences).clone()).into_response()
}

async fn save_preferences(State(state): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(denied) = check_auth(&state, &headers) {
        return denied;
    }
    *lock(&state.preferences) = body.clone();
    Json(body).into_response()
}

// =============================================================================
// Push socket
// =============================================================================

async fn ws_upgrade(
    State(state): Shared,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    lock(&state.ws_queries).push(query);
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(socket: WebSocket, state: Arc<BackendState>) {
    state.ws_connections.fetch_add(1, Ordering::SeqCst);
    let mut push = state.push.subscribe();
    let mut kick = state.kick.subscribe();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = push.recv() => {
                let Ok(frame) = frame else { break };
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            _ = kick.recv() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                        lock(&state.ws_handshakes).push(value);
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            }
        }
    }
}
