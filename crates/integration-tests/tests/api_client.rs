//! API client behavior against the fake backend: authentication, error
//! unwrapping and catalog degradation.
//!
//! Run with: cargo test -p pashmiya-integration-tests

use std::sync::Arc;

use pashmiya_core::{ProductId, UserId};
use pashmiya_integration_tests::{FakeBackend, TOKEN, USER_ID, lock};
use pashmiya_storefront::api::{ApiClient, ApiError, ProductQuery};
use pashmiya_storefront::catalog::Catalog;
use pashmiya_storefront::session::SessionContext;
use pashmiya_storefront::storage::{MemoryStore, SharedStore, keys};
use pashmiya_storefront::wishlist::WishlistStore;

#[tokio::test]
async fn test_login_signs_in_and_sends_bearer() {
    let backend = FakeBackend::start().await;
    let api = backend.signed_in_client().await;

    assert!(api.session().is_authenticated());
    assert_eq!(api.session().user_id(), Some(UserId::new(USER_ID)));

    let user = api.current_user().await.expect("current user");
    assert_eq!(user.email, "asha@example.com");

    let seen = lock(&backend.state().authorizations).clone();
    assert_eq!(seen, vec![Some(format!("Bearer {TOKEN}"))]);
}

#[tokio::test]
async fn test_session_survives_in_store() {
    let backend = FakeBackend::start().await;
    let store: SharedStore = Arc::new(MemoryStore::new());

    let session = SessionContext::new(Arc::clone(&store));
    let api = ApiClient::new(&backend.config(), session).expect("api client");
    api.login("asha@example.com", "secret").await.expect("login");
    assert!(store.get(keys::TOKEN).expect("read token").is_some());

    let restored = SessionContext::new(store);
    assert!(restored.is_authenticated());
    assert_eq!(restored.user_id(), Some(UserId::new(USER_ID)));
}

#[tokio::test]
async fn test_anonymous_request_has_no_authorization() {
    let backend = FakeBackend::start().await;
    let api = backend.client();

    let err = api.get_wishlist().await.expect_err("wishlist needs a session");
    assert!(matches!(err, ApiError::Unauthorized));

    let seen = lock(&backend.state().authorizations).clone();
    assert_eq!(seen, vec![None]);
}

#[tokio::test]
async fn test_bad_login_surfaces_server_message() {
    let backend = FakeBackend::start().await;
    let api = backend.client();

    let err = api
        .login("asha@example.com", "wrong")
        .await
        .expect_err("wrong password");

    match err {
        ApiError::Status { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Invalid email or password");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!api.session().is_authenticated());
}

#[tokio::test]
async fn test_unauthorized_response_ends_session() {
    let backend = FakeBackend::start().await;
    let api = backend.signed_in_client().await;
    let mut session = api.session().subscribe();
    session.borrow_and_update();

    backend.state().set(&backend.state().revoke_token, true);
    let wishlist = WishlistStore::new(api.clone());
    let err = wishlist.refresh().await.expect_err("token revoked");

    assert!(matches!(err, ApiError::Unauthorized));
    assert!(!api.session().is_authenticated());
    assert!(api.session().token().is_none());
    assert!(session.has_changed().expect("session sender alive"));
}

#[tokio::test]
async fn test_logout_clears_session() {
    let backend = FakeBackend::start().await;
    let api = backend.signed_in_client().await;

    api.logout().await;
    assert!(!api.session().is_authenticated());
    assert!(api.session().user().is_none());
}

#[tokio::test]
async fn test_catalog_reads_and_degrades() {
    let backend = FakeBackend::start().await;
    let catalog = Catalog::new(backend.client());

    let products = catalog.products(&ProductQuery::default()).await;
    assert_eq!(products.len(), 3);

    let product = catalog.product(ProductId::new(42)).await.expect("product 42");
    assert_eq!(product.name, "Ring Shawl");
    assert_eq!(product.stock, Some(3));

    let missing = catalog.product(ProductId::new(999)).await.expect_err("no product 999");
    assert_eq!(missing.status(), Some(404));

    backend.state().set(&backend.state().fail_categories, true);
    assert!(catalog.categories().await.is_empty());
}
