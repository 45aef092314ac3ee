//! Server-backed wishlist.
//!
//! The server owns the set; this store caches it for membership checks.
//! Adding calls the API and then refetches the whole list so server-computed
//! fields come back. Removing calls the API and filters the cached list
//! locally. Only `toggle` removes optimistically, and it rolls back if the
//! server refuses.

use std::sync::Arc;

use pashmiya_core::ProductId;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::api::{ApiClient, ApiError, WishlistItem};
use crate::reconcile::Reconciliation;

/// Cached wishlist published to subscribers.
#[derive(Debug, Clone, Default)]
pub struct WishlistState {
    pub items: Vec<WishlistItem>,
    /// Bumped on every replacement or local edit.
    pub revision: u64,
}

impl WishlistState {
    #[must_use]
    pub fn contains(&self, product_id: ProductId) -> bool {
        self.items.iter().any(|i| i.product_id == product_id)
    }
}

/// The signed-in shopper's wishlist.
#[derive(Clone)]
pub struct WishlistStore {
    api: ApiClient,
    state: Arc<watch::Sender<WishlistState>>,
}

impl WishlistStore {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        let (state, _) = watch::channel(WishlistState::default());
        Self {
            api,
            state: Arc::new(state),
        }
    }

    /// Reload the list. Without a credential the cache is emptied instead.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails; the cached list is kept.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), ApiError> {
        if !self.api.session().is_authenticated() {
            self.replace(Vec::new());
            return Ok(());
        }

        let items = self.api.get_wishlist().await?;
        debug!(count = items.len(), "Wishlist loaded");
        self.replace(items);
        Ok(())
    }

    /// Add a product, then resync the full list.
    ///
    /// A failed resync is logged; the add itself succeeded.
    ///
    /// # Errors
    ///
    /// Returns error if the server refuses the add.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add(&self, product_id: ProductId) -> Result<(), ApiError> {
        self.api.add_to_wishlist(product_id).await?;
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Wishlist resync after add failed");
        }
        Ok(())
    }

    /// Remove a product and drop it from the cached list.
    ///
    /// # Errors
    ///
    /// Returns error if the server refuses the removal; the cache is untouched.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove(&self, product_id: ProductId) -> Result<(), ApiError> {
        self.api.remove_from_wishlist(product_id).await?;
        self.state.send_if_modified(|state| {
            let before = state.items.len();
            state.items.retain(|i| i.product_id != product_id);
            let changed = state.items.len() != before;
            if changed {
                state.revision += 1;
            }
            changed
        });
        Ok(())
    }

    /// Flip membership. Returns the confirmed membership on success.
    ///
    /// Removal is applied immediately and restored if the server refuses,
    /// unless the list was replaced in the meantime.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn toggle(&self, product_id: ProductId) -> Reconciliation<bool> {
        if !self.is_in_wishlist(product_id) {
            return match self.add(product_id).await {
                Ok(()) => Reconciliation::Confirmed(true),
                Err(error) => Reconciliation::RolledBack { error },
            };
        }

        let mut prior = Vec::new();
        let mut tentative = 0;
        self.state.send_modify(|state| {
            prior.clone_from(&state.items);
            state.items.retain(|i| i.product_id != product_id);
            state.revision += 1;
            tentative = state.revision;
        });

        match self.api.remove_from_wishlist(product_id).await {
            Ok(()) => Reconciliation::Confirmed(false),
            Err(error) => {
                let restored = self.state.send_if_modified(|state| {
                    if state.revision != tentative {
                        return false;
                    }
                    state.items = prior;
                    state.revision += 1;
                    true
                });
                if restored {
                    warn!(error = %error, "Wishlist removal refused, restored");
                    Reconciliation::RolledBack { error }
                } else {
                    warn!(error = %error, "Wishlist removal refused after list changed");
                    Reconciliation::Stale
                }
            }
        }
    }

    #[must_use]
    pub fn is_in_wishlist(&self, product_id: ProductId) -> bool {
        self.state.borrow().contains(product_id)
    }

    /// Cached items.
    #[must_use]
    pub fn items(&self) -> Vec<WishlistItem> {
        self.state.borrow().items.clone()
    }

    /// Observe changes, e.g. for heart icons.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<WishlistState> {
        self.state.subscribe()
    }

    fn replace(&self, items: Vec<WishlistItem>) {
        self.state.send_modify(|state| {
            state.items = items;
            state.revision += 1;
        });
    }
}
