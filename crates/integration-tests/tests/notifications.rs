//! Notification feed against the fake backend: snapshot, optimistic
//! mutations and the live push channel.

use std::sync::atomic::Ordering;
use std::time::Duration;

use pashmiya_core::{NotificationId, UserId};
use pashmiya_integration_tests::{FakeBackend, USER_ID, lock, notification, wait_for};
use pashmiya_storefront::notifications::{ConnectionState, NotificationFeed};
use pashmiya_storefront::reconcile::Reconciliation;
use pashmiya_storefront::session::{AuthResponse, User};
use serde_json::json;

const PATIENCE: Duration = Duration::from_secs(5);

fn seed(backend: &FakeBackend) {
    *lock(&backend.state().notifications) = vec![
        notification(3, "Order shipped", false),
        notification(2, "Order confirmed", false),
        notification(1, "Welcome", true),
    ];
}

fn push_line(id: i64, title: &str) -> String {
    json!({
        "type": "notification",
        "id": id,
        "title": title,
        "message": format!("{title} details"),
        "notif_type": "order_delivered",
        "channel": "push",
        "created_at": "2026-03-03T08:00:00Z",
    })
    .to_string()
}

#[tokio::test]
async fn test_snapshot_and_mutations_keep_unread_count() {
    let backend = FakeBackend::start().await;
    seed(&backend);
    let feed = NotificationFeed::new(backend.signed_in_client().await);

    feed.refresh().await.expect("snapshot");
    assert!(feed.inbox().is_loaded());
    assert_eq!(feed.inbox().notifications().len(), 3);
    assert_eq!(feed.unread_count(), 2);

    assert!(feed.mark_read(NotificationId::new(3)).await.is_confirmed());
    assert_eq!(feed.unread_count(), 1);

    assert!(feed.delete(NotificationId::new(2)).await.is_confirmed());
    assert_eq!(feed.unread_count(), 0);
    assert_eq!(feed.inbox().notifications().len(), 2);

    feed.refresh().await.expect("snapshot");
    assert_eq!(feed.inbox().notifications().len(), 2);
    assert_eq!(feed.unread_count(), 0);
}

#[tokio::test]
async fn test_refused_mutations_roll_back() {
    let backend = FakeBackend::start().await;
    seed(&backend);
    let feed = NotificationFeed::new(backend.signed_in_client().await);
    feed.refresh().await.expect("snapshot");
    backend.state().set(&backend.state().fail_notification_writes, true);

    let outcome = feed.mark_read(NotificationId::new(2)).await;
    assert!(matches!(outcome, Reconciliation::RolledBack { .. }));
    assert_eq!(feed.unread_count(), 2);

    let outcome = feed.mark_all_read().await;
    assert!(matches!(outcome, Reconciliation::RolledBack { .. }));
    assert_eq!(feed.unread_count(), 2);

    let outcome = feed.delete(NotificationId::new(3)).await;
    assert!(matches!(outcome, Reconciliation::RolledBack { .. }));
    let ids: Vec<i64> = feed
        .inbox()
        .notifications()
        .iter()
        .map(|n| n.id.as_i64())
        .collect();
    assert_eq!(ids, [3, 2, 1]);
}

#[tokio::test]
async fn test_preferences_round_trip_through_server() {
    let backend = FakeBackend::start().await;
    let feed = NotificationFeed::new(backend.signed_in_client().await);

    let mut prefs = feed.preferences().await.expect("preferences");
    assert!(prefs.push_enabled);
    assert!(!prefs.marketing);

    prefs.marketing = true;
    let saved = feed.save_preferences(&prefs).await.expect("save");
    assert!(saved.marketing);
    assert_eq!(lock(&backend.state().preferences)["marketing"], true);
}

#[tokio::test]
async fn test_push_channel_merges_batched_frames() {
    let backend = FakeBackend::start().await;
    seed(&backend);
    let feed = NotificationFeed::new(backend.signed_in_client().await);
    feed.refresh().await.expect("snapshot");

    let config = backend.config();
    let channel = feed.connect(config.ws_url, config.reconnect_delay);
    assert!(wait_for(PATIENCE, || !lock(&backend.state().ws_handshakes).is_empty()).await);
    assert!(channel.is_connected());

    let handshake = lock(&backend.state().ws_handshakes)[0].clone();
    assert_eq!(handshake, json!({"type": "auth", "user_id": USER_ID}));
    let query = lock(&backend.state().ws_queries)[0].clone();
    assert_eq!(query.get("user_id"), Some(&USER_ID.to_string()));

    let frame = format!(
        "{}\nnot json\n{{\"type\":\"ping\"}}\n{}\n{}",
        push_line(10, "Order delivered"),
        push_line(11, "Back in stock"),
        push_line(3, "Order shipped"),
    );
    assert_eq!(backend.state().push_frame(&frame), 1);

    assert!(wait_for(PATIENCE, || feed.inbox().notifications().len() == 5).await);
    let inbox = feed.inbox();
    let ids: Vec<i64> = inbox.notifications().iter().map(|n| n.id.as_i64()).collect();
    assert_eq!(ids, [11, 10, 3, 2, 1]);
    assert_eq!(inbox.unread_count(), 4);

    channel.shutdown().await;
}

#[tokio::test]
async fn test_push_channel_reconnects_once_after_delay() {
    let backend = FakeBackend::start().await;
    let feed = NotificationFeed::new(backend.signed_in_client().await);

    let delay = Duration::from_secs(1);
    let channel = feed.connect(backend.ws_url(), delay);
    assert!(wait_for(PATIENCE, || lock(&backend.state().ws_handshakes).len() == 1).await);

    backend.state().kick_sockets();
    assert!(wait_for(PATIENCE, || channel.state() == ConnectionState::Reconnecting).await);
    tokio::time::sleep(delay / 2).await;
    assert_eq!(backend.state().ws_connections.load(Ordering::SeqCst), 1);

    assert!(wait_for(PATIENCE, || lock(&backend.state().ws_handshakes).len() == 2).await);
    assert!(wait_for(PATIENCE, || channel.state() == ConnectionState::Connected).await);
    assert_eq!(backend.state().ws_connections.load(Ordering::SeqCst), 2);

    tokio::time::sleep(delay * 2).await;
    assert_eq!(backend.state().ws_connections.load(Ordering::SeqCst), 2);

    backend.state().push_frame(&push_line(20, "After reconnect"));
    assert!(wait_for(PATIENCE, || feed.unread_count() == 1).await);

    channel.shutdown().await;
}

#[tokio::test]
async fn test_sign_out_closes_channel_and_clears_inbox() {
    let backend = FakeBackend::start().await;
    seed(&backend);
    let api = backend.signed_in_client().await;
    let feed = NotificationFeed::new(api.clone());
    feed.refresh().await.expect("snapshot");

    let config = backend.config();
    let channel = feed.connect(config.ws_url, config.reconnect_delay);
    assert!(wait_for(PATIENCE, || channel.is_connected()).await);

    api.session().sign_out();

    assert!(wait_for(PATIENCE, || channel.state() == ConnectionState::Disconnected).await);
    assert!(feed.inbox().notifications().is_empty());
    assert_eq!(feed.unread_count(), 0);

    tokio::time::sleep(config.reconnect_delay * 2).await;
    assert_eq!(lock(&backend.state().ws_handshakes).len(), 1);

    channel.shutdown().await;
}

#[tokio::test]
async fn test_channel_waits_for_sign_in() {
    let backend = FakeBackend::start().await;
    let api = backend.client();
    let feed = NotificationFeed::new(api.clone());

    let config = backend.config();
    let channel = feed.connect(config.ws_url, config.reconnect_delay);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(channel.state(), ConnectionState::Disconnected);
    assert!(lock(&backend.state().ws_handshakes).is_empty());

    api.login("asha@example.com", "secret").await.expect("login");
    assert!(wait_for(PATIENCE, || lock(&backend.state().ws_handshakes).len() == 1).await);

    channel.shutdown().await;
}

#[tokio::test]
async fn test_sign_out_while_reconnecting_clears_inbox() {
    let backend = FakeBackend::start().await;
    seed(&backend);
    let api = backend.signed_in_client().await;
    let feed = NotificationFeed::new(api.clone());
    feed.refresh().await.expect("snapshot");

    let channel = feed.connect(backend.ws_url(), Duration::from_secs(30));
    assert!(wait_for(PATIENCE, || channel.is_connected()).await);

    backend.state().kick_sockets();
    assert!(wait_for(PATIENCE, || channel.state() == ConnectionState::Reconnecting).await);
    api.session().sign_out();

    assert!(wait_for(PATIENCE, || channel.state() == ConnectionState::Disconnected).await);
    assert!(feed.inbox().notifications().is_empty());
    assert_eq!(feed.unread_count(), 0);
    assert_eq!(backend.state().ws_connections.load(Ordering::SeqCst), 1);

    channel.shutdown().await;
}

#[tokio::test]
async fn test_switching_user_reconnects_as_new_user() {
    let backend = FakeBackend::start().await;
    seed(&backend);
    let api = backend.signed_in_client().await;
    let feed = NotificationFeed::new(api.clone());
    feed.refresh().await.expect("snapshot");
    assert_eq!(feed.unread_count(), 2);

    // A long delay: only an immediate reconnect can reach the second handshake.
    let channel = feed.connect(backend.ws_url(), Duration::from_secs(30));
    assert!(wait_for(PATIENCE, || lock(&backend.state().ws_handshakes).len() == 1).await);

    api.session().sign_in(AuthResponse {
        user: User {
            id: UserId::new(8),
            email: "ravi@example.com".to_string(),
            name: "Ravi Kaul".to_string(),
            phone: None,
            role: "customer".to_string(),
        },
        token: "second-token".to_string(),
    });

    assert!(wait_for(PATIENCE, || lock(&backend.state().ws_handshakes).len() == 2).await);
    let handshake = lock(&backend.state().ws_handshakes)[1].clone();
    assert_eq!(handshake, json!({"type": "auth", "user_id": 8}));
    let query = lock(&backend.state().ws_queries)[1].clone();
    assert_eq!(query.get("user_id").map(String::as_str), Some("8"));

    assert!(feed.inbox().notifications().is_empty());
    assert_eq!(feed.unread_count(), 0);
    assert!(wait_for(PATIENCE, || channel.is_connected()).await);

    channel.shutdown().await;
}

#[tokio::test]
async fn test_profile_refresh_keeps_socket() {
    let backend = FakeBackend::start().await;
    let api = backend.signed_in_client().await;
    let feed = NotificationFeed::new(api.clone());

    let channel = feed.connect(backend.ws_url(), Duration::from_millis(200));
    assert!(wait_for(PATIENCE, || channel.is_connected()).await);

    let mut user = api.session().user().expect("signed in");
    user.name = "Asha R.".to_string();
    api.session().update_user(user);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(channel.is_connected());
    assert_eq!(backend.state().ws_connections.load(Ordering::SeqCst), 1);

    channel.shutdown().await;
}
