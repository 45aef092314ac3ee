//! Notification inbox.
//!
//! [`NotificationFeed`] merges the REST snapshot with live pushes into one
//! newest-first [`Inbox`] and publishes it through a watch channel. Every
//! mutation keeps `unread_count` equal to the number of items without a read
//! timestamp.
//!
//! Mark-read, mark-all-read and delete apply locally first and are reverted
//! if the server refuses, unless the affected items changed in the meantime.

mod channel;
mod desktop;
mod frame;

pub use channel::{ConnectionState, PushChannel};
pub use desktop::{DesktopNotifier, Permission};
pub use frame::parse_frame;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pashmiya_core::NotificationId;
use thiserror::Error;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::api::{ApiClient, ApiError, Notification, NotificationPreferences};
use crate::reconcile::Reconciliation;
use crate::session::SessionContext;

/// Errors from the notification feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// A REST call failed.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// The push socket failed.
    #[error("WebSocket error: {0}")]
    Socket(#[from] Box<tungstenite::Error>),
}

// =============================================================================
// Inbox
// =============================================================================

/// Newest-first notification list with its unread counter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inbox {
    notifications: Vec<Notification>,
    unread_count: usize,
    loaded: bool,
    /// Bumped whenever the list is replaced wholesale.
    epoch: u64,
}

impl Inbox {
    #[must_use]
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    #[must_use]
    pub const fn unread_count(&self) -> usize {
        self.unread_count
    }

    /// Whether a snapshot has been applied since the last clear.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    #[must_use]
    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == id)
    }

    fn replace(&mut self, notifications: Vec<Notification>) {
        self.unread_count = notifications.iter().filter(|n| n.is_unread()).count();
        self.notifications = notifications;
        self.loaded = true;
        self.epoch += 1;
    }

    fn clear(&mut self) -> bool {
        let changed = self.loaded || !self.notifications.is_empty();
        self.notifications.clear();
        self.unread_count = 0;
        self.loaded = false;
        self.epoch += 1;
        changed
    }

    /// Prepend a pushed notification. Duplicates by id are ignored.
    fn push(&mut self, notification: Notification) -> bool {
        if self.get(notification.id).is_some() {
            return false;
        }
        if notification.is_unread() {
            self.unread_count += 1;
        }
        self.notifications.insert(0, notification);
        true
    }

    /// Stamp an unread item as read. Returns `false` if absent or already read.
    fn set_read(&mut self, id: NotificationId, at: DateTime<Utc>) -> bool {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(n) if n.is_unread() => {
                n.read_at = Some(at);
                self.unread_count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Undo [`Self::set_read`] if the item still carries our stamp.
    fn unset_read(&mut self, id: NotificationId, stamp: DateTime<Utc>) -> bool {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(n) if n.read_at == Some(stamp) => {
                n.read_at = None;
                self.unread_count += 1;
                true
            }
            _ => false,
        }
    }

    /// Stamp every unread item. Returns the ids that changed.
    fn mark_all(&mut self, at: DateTime<Utc>) -> Vec<NotificationId> {
        let marked: Vec<NotificationId> = self
            .notifications
            .iter_mut()
            .filter(|n| n.is_unread())
            .map(|n| {
                n.read_at = Some(at);
                n.id
            })
            .collect();
        self.unread_count -= marked.len();
        marked
    }

    fn remove(&mut self, id: NotificationId) -> Option<(usize, Notification)> {
        let index = self.notifications.iter().position(|n| n.id == id)?;
        let removed = self.notifications.remove(index);
        if removed.is_unread() {
            self.unread_count -= 1;
        }
        Some((index, removed))
    }

    /// Put a removed item back near where it was.
    fn restore(&mut self, index: usize, notification: Notification) -> bool {
        if self.get(notification.id).is_some() {
            return false;
        }
        if notification.is_unread() {
            self.unread_count += 1;
        }
        let index = index.min(self.notifications.len());
        self.notifications.insert(index, notification);
        true
    }
}

// =============================================================================
// Feed
// =============================================================================

/// The signed-in customer's notifications.
#[derive(Clone)]
pub struct NotificationFeed {
    api: ApiClient,
    inbox: Arc<watch::Sender<Inbox>>,
    notifier: Option<Arc<dyn DesktopNotifier>>,
}

impl NotificationFeed {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        let (inbox, _) = watch::channel(Inbox::default());
        Self {
            api,
            inbox: Arc::new(inbox),
            notifier: None,
        }
    }

    /// Raise desktop notifications for pushes when the host allows it.
    #[must_use]
    pub fn with_desktop_notifier(mut self, notifier: Arc<dyn DesktopNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn session(&self) -> &SessionContext {
        self.api.session()
    }

    /// Current inbox.
    #[must_use]
    pub fn inbox(&self) -> Inbox {
        self.inbox.borrow().clone()
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.inbox.borrow().unread_count
    }

    /// Observe inbox changes, e.g. for a bell badge.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Inbox> {
        self.inbox.subscribe()
    }

    /// Replace the inbox with the server's list. Without a credential the
    /// inbox is cleared instead.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails; the inbox is kept.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), FeedError> {
        if !self.api.session().is_authenticated() {
            self.clear();
            return Ok(());
        }

        let list = self.api.get_notifications().await?;
        let reported = list.unread_count;
        self.inbox
            .send_modify(|inbox| inbox.replace(list.notifications));

        let counted = self.unread_count();
        if reported != counted {
            warn!(reported, counted, "Server unread count disagrees with its list");
        }
        debug!(unread = counted, "Notifications loaded");
        Ok(())
    }

    /// Drop every cached notification.
    pub fn clear(&self) {
        self.inbox.send_if_modified(Inbox::clear);
    }

    /// Merge one pushed notification. Returns `false` for a duplicate.
    pub fn apply_push(&self, notification: Notification) -> bool {
        let toast = self
            .notifier
            .as_ref()
            .filter(|n| n.permission() == Permission::Granted)
            .map(|n| (Arc::clone(n), notification.title.clone(), notification.message.clone()));

        let inserted = self
            .inbox
            .send_if_modified(|inbox| inbox.push(notification));

        if inserted && let Some((notifier, title, body)) = toast {
            notifier.show(&title, &body);
        }
        inserted
    }

    /// Merge every notification in a push frame, in frame order. Returns how
    /// many were new.
    pub fn apply_frame(&self, frame: &str) -> usize {
        parse_frame(frame)
            .into_iter()
            .map(|n| self.apply_push(n))
            .filter(|inserted| *inserted)
            .count()
    }

    /// Mark one notification read.
    #[instrument(skip(self), fields(notification_id = %id))]
    pub async fn mark_read(&self, id: NotificationId) -> Reconciliation<()> {
        let stamp = Utc::now();
        let mut marked = false;
        self.inbox.send_if_modified(|inbox| {
            marked = inbox.set_read(id, stamp);
            marked
        });

        match self.api.mark_notification_read(id).await {
            Ok(()) => Reconciliation::Confirmed(()),
            Err(error) if !marked => Reconciliation::RolledBack { error },
            Err(error) => {
                if self
                    .inbox
                    .send_if_modified(|inbox| inbox.unset_read(id, stamp))
                {
                    warn!(error = %error, "Mark-read refused, restored");
                    Reconciliation::RolledBack { error }
                } else {
                    warn!(error = %error, "Mark-read refused after inbox changed");
                    Reconciliation::Stale
                }
            }
        }
    }

    /// Mark every notification read.
    #[instrument(skip(self))]
    pub async fn mark_all_read(&self) -> Reconciliation<()> {
        let stamp = Utc::now();
        let mut marked = Vec::new();
        self.inbox.send_if_modified(|inbox| {
            marked = inbox.mark_all(stamp);
            !marked.is_empty()
        });

        match self.api.mark_all_notifications_read().await {
            Ok(()) => Reconciliation::Confirmed(()),
            Err(error) if marked.is_empty() => Reconciliation::RolledBack { error },
            Err(error) => {
                let restored = self.inbox.send_if_modified(|inbox| {
                    marked
                        .iter()
                        .fold(false, |any, id| inbox.unset_read(*id, stamp) || any)
                });
                warn!(error = %error, restored, "Mark-all-read refused");
                if restored {
                    Reconciliation::RolledBack { error }
                } else {
                    Reconciliation::Stale
                }
            }
        }
    }

    /// Delete one notification.
    #[instrument(skip(self), fields(notification_id = %id))]
    pub async fn delete(&self, id: NotificationId) -> Reconciliation<()> {
        let mut removed = None;
        let mut epoch = 0;
        self.inbox.send_if_modified(|inbox| {
            epoch = inbox.epoch;
            removed = inbox.remove(id);
            removed.is_some()
        });

        match self.api.delete_notification(id).await {
            Ok(()) => Reconciliation::Confirmed(()),
            Err(error) => {
                let Some((index, notification)) = removed else {
                    return Reconciliation::RolledBack { error };
                };
                let restored = self.inbox.send_if_modified(|inbox| {
                    inbox.epoch == epoch && inbox.restore(index, notification)
                });
                if restored {
                    warn!(error = %error, "Delete refused, restored");
                    Reconciliation::RolledBack { error }
                } else {
                    warn!(error = %error, "Delete refused after inbox changed");
                    Reconciliation::Stale
                }
            }
        }
    }

    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn preferences(&self) -> Result<NotificationPreferences, FeedError> {
        Ok(self.api.get_notification_preferences().await?)
    }

    /// Overwrite the preference row.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn save_preferences(
        &self,
        preferences: &NotificationPreferences,
    ) -> Result<NotificationPreferences, FeedError> {
        Ok(self.api.update_notification_preferences(preferences).await?)
    }

    /// Start the live push channel for this feed.
    #[must_use]
    pub fn connect(&self, ws_url: Url, reconnect_delay: Duration) -> PushChannel {
        PushChannel::spawn(self.clone(), ws_url, reconnect_delay)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use pashmiya_core::{NotificationChannel, NotificationStatus, NotificationType};

    use super::*;

    fn notification(id: i64, read: bool) -> Notification {
        Notification {
            id: NotificationId::new(id),
            user_id: None,
            kind: NotificationType::OrderStatus,
            channel: NotificationChannel::InApp,
            title: format!("Update {id}"),
            message: "Your order moved".to_string(),
            data: None,
            status: NotificationStatus::Sent,
            created_at: Utc::now(),
            sent_at: None,
            read_at: read.then(Utc::now),
        }
    }

    fn counted(inbox: &Inbox) -> usize {
        inbox.notifications().iter().filter(|n| n.is_unread()).count()
    }

    fn offline_feed() -> NotificationFeed {
        // Nothing listens on the discard port; every request fails.
        NotificationFeed::new(ApiClient::with_client(
            reqwest::Client::new(),
            &Url::parse("http://127.0.0.1:9/api").unwrap(),
            SessionContext::ephemeral(),
        ))
    }

    #[test]
    fn test_unread_invariant_across_operations() {
        let mut inbox = Inbox::default();
        inbox.replace(vec![notification(3, false), notification(2, true), notification(1, false)]);
        assert_eq!(inbox.unread_count(), 2);

        let at = Utc::now();
        let steps: Vec<Box<dyn Fn(&mut Inbox)>> = vec![
            Box::new(|i| assert!(i.push(notification(4, false)))),
            Box::new(|i| assert!(!i.push(notification(4, false)))),
            Box::new(move |i| assert!(i.set_read(NotificationId::new(3), at))),
            Box::new(move |i| assert!(!i.set_read(NotificationId::new(3), at))),
            Box::new(move |i| assert!(!i.set_read(NotificationId::new(2), at))),
            Box::new(|i| assert!(i.remove(NotificationId::new(2)).is_some())),
            Box::new(|i| assert!(i.remove(NotificationId::new(1)).is_some())),
            Box::new(|i| assert!(i.push(notification(5, false)))),
            Box::new(move |i| assert_eq!(i.mark_all(at).len(), 2)),
            Box::new(move |i| assert!(i.unset_read(NotificationId::new(5), at))),
        ];

        for step in steps {
            step(&mut inbox);
            assert_eq!(inbox.unread_count(), counted(&inbox));
        }
        assert_eq!(inbox.unread_count(), 1);
        assert_eq!(inbox.notifications()[0].id, NotificationId::new(5));
    }

    #[test]
    fn test_restore_keeps_position() {
        let mut inbox = Inbox::default();
        inbox.replace(vec![notification(3, false), notification(2, false), notification(1, true)]);

        let (index, removed) = inbox.remove(NotificationId::new(2)).unwrap();
        assert_eq!(inbox.unread_count(), 1);
        assert!(inbox.restore(index, removed));
        assert_eq!(inbox.notifications()[1].id, NotificationId::new(2));
        assert_eq!(inbox.unread_count(), 2);
    }

    #[test]
    fn test_frame_merges_newest_first() {
        let feed = offline_feed();
        let frame = concat!(
            r#"{"type":"notification","id":10,"title":"A","message":"a"}"#,
            "\n",
            "garbage",
            "\n",
            r#"{"type":"notification","id":11,"title":"B","message":"b"}"#,
        );
        assert_eq!(feed.apply_frame(frame), 2);
        assert_eq!(feed.apply_frame(r#"{"type":"notification","id":11,"title":"B","message":"b"}"#), 0);

        let inbox = feed.inbox();
        assert_eq!(inbox.unread_count(), 2);
        assert_eq!(inbox.notifications()[0].id, NotificationId::new(11));
        assert_eq!(inbox.notifications()[1].id, NotificationId::new(10));
    }

    #[tokio::test]
    async fn test_refused_mark_read_restores_counter() {
        let feed = offline_feed();
        feed.apply_push(notification(1, false));

        let outcome = feed.mark_read(NotificationId::new(1)).await;
        assert!(matches!(outcome, Reconciliation::RolledBack { .. }));
        assert_eq!(feed.unread_count(), 1);
        assert!(feed.inbox().get(NotificationId::new(1)).unwrap().is_unread());
    }

    #[tokio::test]
    async fn test_refused_delete_restores_item() {
        let feed = offline_feed();
        feed.apply_push(notification(1, false));
        feed.apply_push(notification(2, true));

        let outcome = feed.delete(NotificationId::new(1)).await;
        assert!(matches!(outcome, Reconciliation::RolledBack { .. }));
        let inbox = feed.inbox();
        assert_eq!(inbox.notifications().len(), 2);
        assert_eq!(inbox.notifications()[1].id, NotificationId::new(1));
        assert_eq!(inbox.unread_count(), 1);
    }

    #[tokio::test]
    async fn test_refused_mark_all_restores_only_ours() {
        let feed = offline_feed();
        feed.apply_push(notification(1, false));
        feed.apply_push(notification(2, true));
        feed.apply_push(notification(3, false));

        let outcome = feed.mark_all_read().await;
        assert!(matches!(outcome, Reconciliation::RolledBack { .. }));
        let inbox = feed.inbox();
        assert_eq!(inbox.unread_count(), 2);
        assert!(!inbox.get(NotificationId::new(2)).unwrap().is_unread());
    }

    #[tokio::test]
    async fn test_refresh_without_credential_clears() {
        let feed = offline_feed();
        feed.apply_push(notification(1, false));
        feed.refresh().await.unwrap();
        let inbox = feed.inbox();
        assert!(inbox.notifications().is_empty());
        assert_eq!(inbox.unread_count(), 0);
        assert!(!inbox.is_loaded());
    }

    struct Recorder {
        permission: Permission,
        shown: Mutex<Vec<String>>,
    }

    impl DesktopNotifier for Recorder {
        fn permission(&self) -> Permission {
            self.permission
        }

        fn show(&self, title: &str, _body: &str) {
            self.shown.lock().unwrap().push(title.to_string());
        }
    }

    #[test]
    fn test_desktop_notice_requires_permission() {
        for (permission, expected) in [(Permission::Granted, 1), (Permission::Default, 0)] {
            let recorder = Arc::new(Recorder {
                permission,
                shown: Mutex::new(Vec::new()),
            });
            let feed = offline_feed().with_desktop_notifier(recorder.clone());
            feed.apply_push(notification(1, false));
            feed.apply_push(notification(1, false));
            assert_eq!(recorder.shown.lock().unwrap().len(), expected);
        }
    }
}
