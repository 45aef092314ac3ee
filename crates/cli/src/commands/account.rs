//! Sign-in and sign-out.

use pashmiya_core::Email;
use secrecy::{ExposeSecret, SecretString};

use super::{CliError, Context};

/// Sign in and persist the session.
///
/// # Errors
///
/// Returns error if the email is malformed or the server refuses.
pub async fn login(ctx: &Context, email: &str, password: SecretString) -> Result<(), CliError> {
    let email = Email::parse(email)?;
    let user = ctx.api.login(email.as_str(), password.expose_secret()).await?;
    tracing::info!(user_id = %user.id, "Signed in as {}", user.email);
    Ok(())
}

/// Create an account and sign in.
///
/// # Errors
///
/// Returns error if the email is malformed or registration is refused.
pub async fn register(
    ctx: &Context,
    name: &str,
    email: &str,
    password: SecretString,
    phone: Option<&str>,
) -> Result<(), CliError> {
    let email = Email::parse(email)?;
    let user = ctx
        .api
        .register(name, email.as_str(), password.expose_secret(), phone)
        .await?;
    tracing::info!(user_id = %user.id, "Registered {}", user.email);
    Ok(())
}

/// Sign out. The local session is dropped even if the server call fails.
pub async fn logout(ctx: &Context) {
    if !ctx.session.is_authenticated() {
        tracing::info!("Not signed in");
        return;
    }
    ctx.api.logout().await;
    tracing::info!("Signed out");
}

/// Show the signed-in customer, refreshing the cached profile.
///
/// # Errors
///
/// Returns error if there is no session or the server refuses.
pub async fn whoami(ctx: &Context) -> Result<(), CliError> {
    ctx.require_session()?;
    let user = ctx.api.current_user().await?;
    tracing::info!(
        user_id = %user.id,
        phone = user.phone.as_deref().unwrap_or("-"),
        "{} <{}>",
        user.name,
        user.email
    );
    Ok(())
}
