//! Authenticated session context.
//!
//! `SessionContext` owns the bearer token and the cached user profile. It is
//! created once at the application root and cloned into every component that
//! needs auth. Components observe sign-in, sign-out and expiry by subscribing
//! to the watch channel; a 401 from any API call ends the session here.

use std::fmt;
use std::sync::Arc;

use pashmiya_core::UserId;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{clear_sentry_user, set_sentry_user};
use crate::storage::{self, KeyValueStore, MemoryStore, SharedStore, keys};

/// A signed-in customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: String,
}

/// Response body of the login and register endpoints.
#[derive(Clone, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

impl fmt::Debug for AuthResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthResponse")
            .field("user", &self.user)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Snapshot of the session published to subscribers.
#[derive(Debug, Default)]
pub struct SessionState {
    token: Option<SecretString>,
    user: Option<User>,
}

impl SessionState {
    /// Whether a bearer credential is present.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub(crate) const fn token(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }

    /// Cached user profile, if any.
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Identity used by the push channel handshake.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|u| u.id)
    }
}

/// Shared handle to the current session.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    store: SharedStore,
    state: watch::Sender<SessionState>,
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    /// Rehydrate the session from durable storage.
    ///
    /// Unreadable slots are treated as signed out.
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        let token = match storage::load_json::<String>(store.as_ref(), keys::TOKEN) {
            Ok(token) => token.filter(|t| !t.is_empty()).map(SecretString::from),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable stored token");
                None
            }
        };
        let user = match storage::load_json::<User>(store.as_ref(), keys::USER) {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable stored user");
                None
            }
        };

        if let Some(user) = &user {
            set_sentry_user(&user.id, Some(&user.email));
        }

        let (state, _) = watch::channel(SessionState { token, user });
        Self {
            inner: Arc::new(SessionInner { store, state }),
        }
    }

    /// A signed-out session backed by memory only.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// The store this session persists to.
    #[must_use]
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.inner.store)
    }

    /// Current bearer token.
    #[must_use]
    pub fn token(&self) -> Option<SecretString> {
        self.inner
            .state
            .borrow()
            .token
            .as_ref()
            .map(|t| SecretString::from(t.expose_secret().to_owned()))
    }

    /// `Authorization` header value for the current token.
    pub(crate) fn authorization(&self) -> Option<String> {
        self.inner
            .state
            .borrow()
            .token
            .as_ref()
            .map(|t| format!("Bearer {}", t.expose_secret()))
    }

    /// Cached user profile.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.inner.state.borrow().user.clone()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.inner.state.borrow().user_id()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// Observe session transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Store a fresh credential and profile.
    pub fn sign_in(&self, auth: AuthResponse) {
        let AuthResponse { user, token } = auth;
        self.persist(keys::TOKEN, &token);
        self.persist(keys::USER, &user);

        info!(user_id = %user.id, "Signed in");
        set_sentry_user(&user.id, Some(&user.email));

        self.inner.state.send_replace(SessionState {
            token: Some(SecretString::from(token)),
            user: Some(user),
        });
    }

    /// Replace the cached profile, keeping the credential.
    pub fn update_user(&self, user: User) {
        self.persist(keys::USER, &user);
        self.inner.state.send_modify(|state| state.user = Some(user));
    }

    /// End the session at the user's request.
    pub fn sign_out(&self) {
        if self.clear() {
            info!("Signed out");
        }
    }

    /// End the session because the server rejected the credential.
    pub fn expire(&self) {
        if self.clear() {
            warn!("Session expired, credential cleared");
        }
    }

    /// Drop the credential and profile. Returns whether a credential was held.
    fn clear(&self) -> bool {
        for key in [keys::TOKEN, keys::USER] {
            if let Err(e) = self.inner.store.remove(key) {
                warn!(error = %e, key, "Failed to clear session slot");
            }
        }
        clear_sentry_user();

        let mut had_token = false;
        self.inner.state.send_if_modified(|state| {
            had_token = state.token.is_some();
            let changed = had_token || state.user.is_some();
            state.token = None;
            state.user = None;
            changed
        });
        had_token
    }

    fn persist<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = storage::save_json(self.inner.store.as_ref(), key, value) {
            warn!(error = %e, key, "Failed to persist session slot");
        } else {
            debug!(key, "Session slot persisted");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn auth(id: i64) -> AuthResponse {
        AuthResponse {
            user: User {
                id: UserId::new(id),
                email: "asha@example.com".to_string(),
                name: "Asha".to_string(),
                phone: None,
                role: "customer".to_string(),
            },
            token: "tok-123".to_string(),
        }
    }

    #[test]
    fn test_sign_in_persists_and_rehydrates() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let session = SessionContext::new(Arc::clone(&store));
        assert!(!session.is_authenticated());

        session.sign_in(auth(7));
        assert_eq!(session.user_id(), Some(UserId::new(7)));
        assert_eq!(session.authorization().as_deref(), Some("Bearer tok-123"));

        let restored = SessionContext::new(store);
        assert!(restored.is_authenticated());
        assert_eq!(restored.user().unwrap().name, "Asha");
        assert_eq!(restored.token().unwrap().expose_secret(), "tok-123");
    }

    #[tokio::test]
    async fn test_expire_notifies_subscribers() {
        let session = SessionContext::ephemeral();
        session.sign_in(auth(1));

        let mut rx = session.subscribe();
        rx.borrow_and_update();

        session.expire();
        rx.changed().await.unwrap();
        assert!(!rx.borrow().is_authenticated());
        assert!(session.store().get(keys::TOKEN).unwrap().is_none());
    }

    #[test]
    fn test_clearing_signed_out_session_is_silent() {
        let session = SessionContext::ephemeral();
        let rx = session.subscribe();
        session.sign_out();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_corrupt_user_slot_is_ignored() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        store.set(keys::USER, "{broken").unwrap();
        storage::save_json(store.as_ref(), keys::TOKEN, "tok").unwrap();

        let session = SessionContext::new(store);
        assert!(session.is_authenticated());
        assert!(session.user().is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", auth(3));
        assert!(!rendered.contains("tok-123"));
    }
}
