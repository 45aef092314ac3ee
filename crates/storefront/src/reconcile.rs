//! Outcome of an optimistic mutation.
//!
//! Wishlist toggles and notification mutations apply their local effect
//! before the server answers. Once it does, the tentative state is either kept
//! (`Confirmed`), reverted to the prior snapshot (`RolledBack`), or left alone
//! because something else replaced the state in the meantime (`Stale`).

use crate::api::ApiError;

#[derive(Debug)]
#[must_use]
pub enum Reconciliation<T> {
    /// The server accepted the change.
    Confirmed(T),
    /// The server refused; local state was restored.
    RolledBack { error: ApiError },
    /// Local state moved on before the server answered; nothing was reverted.
    Stale,
}

impl<T> Reconciliation<T> {
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }

    /// The confirmed value, if any.
    pub fn confirmed(self) -> Option<T> {
        match self {
            Self::Confirmed(value) => Some(value),
            Self::RolledBack { .. } | Self::Stale => None,
        }
    }

    /// Convert into a `Result`, treating a stale outcome as success.
    ///
    /// # Errors
    ///
    /// Returns the server error when the change was rolled back.
    pub fn into_result(self) -> Result<Option<T>, ApiError> {
        match self {
            Self::Confirmed(value) => Ok(Some(value)),
            Self::Stale => Ok(None),
            Self::RolledBack { error } => Err(error),
        }
    }
}
