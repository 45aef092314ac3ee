//! Live push connection.
//!
//! A background task keeps one WebSocket open while the session holds a
//! credential. After the socket closes it waits a fixed delay and tries again
//! if a credential is still present; there is no backoff and no retry cap.
//! Signing out, or signing in as someone else, closes the socket and empties
//! the inbox; a new credential reconnects at once.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use pashmiya_core::UserId;
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};
use url::Url;

use super::frame::AuthHandshake;
use super::{FeedError, NotificationFeed};
use crate::session::SessionState;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle of the push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No credential, or shut down.
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the reconnect delay.
    Reconnecting,
}

/// Handle to the push task. Dropping it stops the task.
pub struct PushChannel {
    state: watch::Receiver<ConnectionState>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
    _guard: DropGuard,
}

impl PushChannel {
    /// Spawn the push task on the current runtime.
    #[must_use]
    pub fn spawn(feed: NotificationFeed, ws_url: Url, reconnect_delay: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);

        let worker = PushWorker {
            feed,
            ws_url,
            reconnect_delay,
            state: state_tx,
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(worker.run());

        Self {
            state,
            _guard: shutdown.clone().drop_guard(),
            shutdown,
            task,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Observe connection transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Close the socket and wait for the task to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Push task ended abnormally");
        }
    }
}

/// Why a connected session ended.
enum SessionEnd {
    Closed,
    /// Signed out, or the credential now belongs to someone else.
    Changed,
    Shutdown,
}

/// Credential a socket was opened with.
struct Identity {
    token: SecretString,
    user_id: Option<UserId>,
}

impl Identity {
    fn current(session: &mut watch::Receiver<SessionState>) -> Option<Self> {
        let state = session.borrow_and_update();
        state.token().map(|token| Self {
            token: SecretString::from(token.expose_secret().to_owned()),
            user_id: state.user_id(),
        })
    }

    fn matches(&self, state: &SessionState) -> bool {
        state
            .token()
            .is_some_and(|t| t.expose_secret() == self.token.expose_secret())
            && state.user_id() == self.user_id
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.user_id == other.user_id && self.token.expose_secret() == other.token.expose_secret()
    }
}

struct PushWorker {
    feed: NotificationFeed,
    ws_url: Url,
    reconnect_delay: Duration,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

impl PushWorker {
    async fn run(self) {
        debug!("Push task started");
        let mut session = self.feed.session().subscribe();
        let mut held: Option<Identity> = None;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            // The inbox belongs to whoever held the credential last.
            let current = Identity::current(&mut session);
            if held.is_some() && held != current {
                info!("Session ended or switched, inbox cleared");
                self.feed.clear();
            }
            held = current;

            let Some(identity) = held.as_ref() else {
                self.set_state(ConnectionState::Disconnected);
                if self.wait_for_session_change(&mut session).await {
                    continue;
                }
                break;
            };

            self.set_state(ConnectionState::Connecting);
            match self.connect(identity.user_id).await {
                Ok(ws) => {
                    info!("Push channel connected");
                    self.set_state(ConnectionState::Connected);
                    match self.run_session(ws, &mut session, identity).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Changed => continue,
                        SessionEnd::Closed => info!("Push channel disconnected"),
                    }
                }
                Err(e) => warn!(error = %e, "Push channel connection failed"),
            }

            self.set_state(ConnectionState::Reconnecting);
            if !self.wait_for_retry(&mut session, identity).await {
                break;
            }
        }

        self.set_state(ConnectionState::Disconnected);
        debug!("Push task stopped");
    }

    /// Open the socket and send the auth handshake.
    async fn connect(&self, user_id: Option<UserId>) -> Result<WsStream, FeedError> {
        let mut url = self.ws_url.clone();
        if let Some(id) = user_id {
            url.query_pairs_mut()
                .append_pair("user_id", &id.to_string());
        }

        let (mut ws, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(Box::new)?;

        if let Some(id) = user_id {
            let handshake = serde_json::to_string(&AuthHandshake::new(id))
                .unwrap_or_default();
            ws.send(Message::Text(handshake.into()))
                .await
                .map_err(Box::new)?;
        }
        Ok(ws)
    }

    async fn run_session(
        &self,
        ws: WsStream,
        session: &mut watch::Receiver<SessionState>,
        identity: &Identity,
    ) -> SessionEnd {
        let (mut sink, mut stream) = ws.split();

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    let _ = sink.close().await;
                    return SessionEnd::Shutdown;
                }

                changed = session.changed() => {
                    if changed.is_err() || !identity.matches(&session.borrow_and_update()) {
                        let _ = sink.close().await;
                        return SessionEnd::Changed;
                    }
                }

                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        let merged = self.feed.apply_frame(&text);
                        debug!(merged, "Push frame applied");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Closed,
                    Some(Err(e)) => {
                        warn!(error = %e, "Push channel error");
                        return SessionEnd::Closed;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    /// Sleep out the reconnect delay. Cut short when the credential changes.
    ///
    /// Returns `false` on shutdown.
    async fn wait_for_retry(
        &self,
        session: &mut watch::Receiver<SessionState>,
        identity: &Identity,
    ) -> bool {
        let delay = tokio::time::sleep(self.reconnect_delay);
        tokio::pin!(delay);

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => return false,
                () = &mut delay => return true,
                changed = session.changed() => {
                    if changed.is_err() || !identity.matches(&session.borrow_and_update()) {
                        return true;
                    }
                }
            }
        }
    }

    /// Returns `false` on shutdown.
    async fn wait_for_session_change(&self, session: &mut watch::Receiver<SessionState>) -> bool {
        tokio::select! {
            () = self.shutdown.cancelled() => false,
            changed = session.changed() => changed.is_ok(),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }
}
