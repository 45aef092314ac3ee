//! Host notification facility.

/// Whether the host lets us raise system notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Permission {
    Granted,
    Denied,
    /// Never asked.
    #[default]
    Default,
}

/// Raises native desktop notifications for live pushes.
///
/// Only consulted for pushes; snapshot loads never raise anything.
pub trait DesktopNotifier: Send + Sync {
    fn permission(&self) -> Permission;

    fn show(&self, title: &str, body: &str);
}
