//! Notification commands.

use clap::{Args, Subcommand};
use pashmiya_core::NotificationId;
use pashmiya_storefront::api::NotificationPreferences;
use pashmiya_storefront::notifications::{Inbox, NotificationFeed};
use pashmiya_storefront::reconcile::Reconciliation;

use super::{CliError, Context};

#[derive(Subcommand)]
pub enum NotificationAction {
    /// Show the inbox
    List,
    /// Mark one notification read
    Read { id: NotificationId },
    /// Mark everything read
    ReadAll,
    /// Delete one notification
    Delete { id: NotificationId },
    /// Show or change notification preferences
    Preferences(PreferenceArgs),
    /// Follow live notifications until Ctrl-C
    Watch,
}

/// Switches to change; unset ones keep their stored value.
#[derive(Args)]
#[allow(clippy::struct_field_names)]
pub struct PreferenceArgs {
    #[arg(long)]
    order_created: Option<bool>,
    #[arg(long)]
    order_shipped: Option<bool>,
    #[arg(long)]
    order_delivered: Option<bool>,
    #[arg(long)]
    order_status: Option<bool>,
    #[arg(long)]
    low_stock: Option<bool>,
    #[arg(long)]
    product_updates: Option<bool>,
    #[arg(long)]
    newsletter: Option<bool>,
    #[arg(long)]
    marketing: Option<bool>,
    #[arg(long)]
    email: Option<bool>,
    #[arg(long)]
    sms: Option<bool>,
    #[arg(long)]
    push: Option<bool>,
}

impl PreferenceArgs {
    /// Overlay the requested switches. Returns whether anything was set.
    fn apply(&self, prefs: &mut NotificationPreferences) -> bool {
        let pairs = [
            (self.order_created, &mut prefs.order_created),
            (self.order_shipped, &mut prefs.order_shipped),
            (self.order_delivered, &mut prefs.order_delivered),
            (self.order_status, &mut prefs.order_status),
            (self.low_stock, &mut prefs.low_stock),
            (self.product_updates, &mut prefs.product_updates),
            (self.newsletter, &mut prefs.newsletter),
            (self.marketing, &mut prefs.marketing),
            (self.email, &mut prefs.email_enabled),
            (self.sms, &mut prefs.sms_enabled),
            (self.push, &mut prefs.push_enabled),
        ];
        let mut changed = false;
        for (wanted, slot) in pairs {
            if let Some(value) = wanted {
                *slot = value;
                changed = true;
            }
        }
        changed
    }
}

/// # Errors
///
/// Returns error if there is no session or the server refuses.
pub async fn run(ctx: &Context, action: NotificationAction) -> Result<(), CliError> {
    ctx.require_session()?;
    let feed = NotificationFeed::new(ctx.api.clone());
    feed.refresh().await?;

    match action {
        NotificationAction::List => {}
        NotificationAction::Read { id } => report(feed.mark_read(id).await)?,
        NotificationAction::ReadAll => report(feed.mark_all_read().await)?,
        NotificationAction::Delete { id } => report(feed.delete(id).await)?,
        NotificationAction::Preferences(args) => {
            let mut prefs = feed.preferences().await?;
            if args.apply(&mut prefs) {
                prefs = feed.save_preferences(&prefs).await?;
                tracing::info!("Preferences saved");
            }
            tracing::info!(?prefs, "Notification preferences");
            return Ok(());
        }
        NotificationAction::Watch => return watch(ctx, &feed).await,
    }

    show(&feed.inbox());
    Ok(())
}

fn report(outcome: Reconciliation<()>) -> Result<(), CliError> {
    outcome.into_result()?;
    Ok(())
}

fn show(inbox: &Inbox) {
    for n in inbox.notifications() {
        let marker = if n.is_unread() { "*" } else { " " };
        tracing::info!(
            id = %n.id,
            kind = %n.kind,
            at = %n.created_at.format("%Y-%m-%d %H:%M"),
            "{marker} {}: {}",
            n.title,
            n.message
        );
    }
    tracing::info!(unread = inbox.unread_count(), "{} notifications", inbox.notifications().len());
}

async fn watch(ctx: &Context, feed: &NotificationFeed) -> Result<(), CliError> {
    let channel = feed.connect(ctx.config.ws_url.clone(), ctx.config.reconnect_delay);
    let mut inbox = feed.subscribe();
    let mut state = channel.subscribe();
    let mut seen = inbox.borrow_and_update().notifications().len();
    tracing::info!(unread = feed.unread_count(), "Watching for notifications (Ctrl-C to stop)");

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                tracing::info!(state = ?current, "Push channel");
            }
            changed = inbox.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = inbox.borrow_and_update().clone();
                let total = snapshot.notifications().len();
                for n in snapshot.notifications().iter().take(total.saturating_sub(seen)) {
                    tracing::info!(id = %n.id, kind = %n.kind, "{}: {}", n.title, n.message);
                }
                seen = total;
                tracing::info!(unread = snapshot.unread_count(), "Inbox updated");
            }
        }
    }

    channel.shutdown().await;
    Ok(())
}
