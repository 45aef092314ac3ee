//! Push frame decoding.
//!
//! One WebSocket text message may carry several newline-separated JSON
//! messages. Each line is decoded on its own so a bad line never drops the
//! rest of the batch.

use chrono::{DateTime, Utc};
use pashmiya_core::{NotificationChannel, NotificationId, NotificationStatus, NotificationType, UserId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::Notification;

const NOTIFICATION: &str = "notification";

/// One logical server message.
#[derive(Debug, Deserialize)]
struct PushMessage {
    #[serde(rename = "type")]
    kind: String,
    id: Option<NotificationId>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    message: String,
    notif_type: Option<NotificationType>,
    channel: Option<NotificationChannel>,
    created_at: Option<DateTime<Utc>>,
}

/// Client handshake sent right after the socket opens.
#[derive(Debug, Serialize)]
pub(crate) struct AuthHandshake {
    #[serde(rename = "type")]
    kind: &'static str,
    user_id: UserId,
}

impl AuthHandshake {
    pub(crate) const fn new(user_id: UserId) -> Self {
        Self {
            kind: "auth",
            user_id,
        }
    }
}

/// Decode the notifications carried by one frame, in frame order.
///
/// Blank lines and messages of other types are skipped.
#[must_use]
pub fn parse_frame(frame: &str) -> Vec<Notification> {
    frame
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Option<Notification> {
    let message: PushMessage = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Dropping undecodable push message");
            return None;
        }
    };

    if message.kind != NOTIFICATION {
        debug!(kind = %message.kind, "Ignoring push message");
        return None;
    }

    let Some(id) = message.id else {
        warn!("Dropping push notification without id");
        return None;
    };

    Some(Notification {
        id,
        user_id: None,
        kind: message.notif_type.unwrap_or_default(),
        channel: message.channel.unwrap_or_default(),
        title: message.title,
        message: message.message,
        data: None,
        status: NotificationStatus::Sent,
        created_at: message.created_at.unwrap_or_else(Utc::now),
        sent_at: None,
        read_at: None,
    })
}
