//! Wishlist store against the fake backend.

use pashmiya_core::ProductId;
use pashmiya_integration_tests::{FakeBackend, lock};
use pashmiya_storefront::reconcile::Reconciliation;
use pashmiya_storefront::wishlist::WishlistStore;

#[tokio::test]
async fn test_add_and_remove_resync() {
    let backend = FakeBackend::start().await;
    let wishlist = WishlistStore::new(backend.signed_in_client().await);

    wishlist.add(ProductId::new(42)).await.expect("add");
    assert!(wishlist.is_in_wishlist(ProductId::new(42)));
    let items = wishlist.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product.name, "Ring Shawl");

    wishlist.remove(ProductId::new(42)).await.expect("remove");
    assert!(!wishlist.is_in_wishlist(ProductId::new(42)));
    assert!(lock(&backend.state().wishlist).is_empty());
}

#[tokio::test]
async fn test_toggle_flips_membership() {
    let backend = FakeBackend::start().await;
    let wishlist = WishlistStore::new(backend.signed_in_client().await);

    assert!(matches!(
        wishlist.toggle(ProductId::new(7)).await,
        Reconciliation::Confirmed(true)
    ));
    assert_eq!(lock(&backend.state().wishlist).clone(), [7]);

    assert!(matches!(
        wishlist.toggle(ProductId::new(7)).await,
        Reconciliation::Confirmed(false)
    ));
    assert!(wishlist.items().is_empty());
    assert!(lock(&backend.state().wishlist).is_empty());
}

#[tokio::test]
async fn test_refused_toggle_removal_is_restored() {
    let backend = FakeBackend::start().await;
    *lock(&backend.state().wishlist) = vec![1, 42];
    let wishlist = WishlistStore::new(backend.signed_in_client().await);
    wishlist.refresh().await.expect("refresh");

    backend.state().set(&backend.state().fail_wishlist_writes, true);
    let outcome = wishlist.toggle(ProductId::new(42)).await;

    assert!(matches!(outcome, Reconciliation::RolledBack { .. }));
    let ids: Vec<ProductId> = wishlist.items().iter().map(|i| i.product_id).collect();
    assert_eq!(ids, [ProductId::new(1), ProductId::new(42)]);
}

#[tokio::test]
async fn test_refused_add_leaves_list_alone() {
    let backend = FakeBackend::start().await;
    let wishlist = WishlistStore::new(backend.signed_in_client().await);
    backend.state().set(&backend.state().fail_wishlist_writes, true);

    let outcome = wishlist.toggle(ProductId::new(1)).await;
    assert!(matches!(outcome, Reconciliation::RolledBack { .. }));
    assert!(!wishlist.is_in_wishlist(ProductId::new(1)));
}

#[tokio::test]
async fn test_signed_out_refresh_empties_cache() {
    let backend = FakeBackend::start().await;
    *lock(&backend.state().wishlist) = vec![1];
    let api = backend.signed_in_client().await;
    let wishlist = WishlistStore::new(api.clone());
    wishlist.refresh().await.expect("refresh");
    assert_eq!(wishlist.items().len(), 1);

    api.session().sign_out();
    wishlist.refresh().await.expect("refresh");
    assert!(wishlist.items().is_empty());
}
