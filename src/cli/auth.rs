use std::{sync::Arc, time::Duration};

use tokio::time::timeout;

use crate::{
    Res,
    cli::Context,
    error::AuthError,
    info,
    server::{ListenerCallback, ListenerEvent, RedirectListener},
    success, utils, warning,
};

const AUTH_TIMEOUT: Duration = Duration::from_secs(120);

pub async fn auth(ctx: &Context) -> Res<()> {
    authenticate(ctx).await?;
    success!("Token saved to {}", ctx.tokens.path().display());
    Ok(())
}

pub async fn logout(ctx: &Context) -> Res<()> {
    ctx.tokens.remove().await?;
    success!("Stored token removed");
    Ok(())
}

/// Runs the redirect flow end to end and persists the new token.
///
/// Opens the authorize URL in the system browser as soon as the listener is
/// bound. If the browser cannot be launched the URL is printed instead.
pub(crate) async fn authenticate(ctx: &Context) -> Res<String> {
    let settings = &ctx.settings;
    let state = utils::generate_state();
    let authorize_url = ctx.client.build_authorize_url(
        &settings.credentials.client_id,
        &settings.credentials.redirect_uri,
        &settings.scopes,
        Some(&state),
    );

    let callback: ListenerCallback = {
        let authorize_url = authorize_url.to_string();
        Arc::new(move |event: ListenerEvent| match event {
            ListenerEvent::RequestingAuthorization => {
                info!("Opening browser for authorization...");
                if webbrowser::open(&authorize_url).is_err() {
                    warning!("Cannot open browser. Please visit:\n{}", authorize_url);
                }
            }
            ListenerEvent::TokenReceived(_) => success!("Authorization received"),
            ListenerEvent::AuthorizationError(reason) => {
                warning!("Authorization failed: {}", reason)
            }
            ListenerEvent::SpotifyError(e) => warning!("Spotify rejected the login: {}", e),
            ListenerEvent::SocketError(e) => warning!("Redirect listener error: {}", e),
        })
    };

    let mut handle = RedirectListener::new(
        settings.redirect_port,
        settings.credentials.clone(),
        ctx.client.clone(),
        callback,
    )
    .with_expected_state(state)
    .start()?;

    let outcome = match timeout(AUTH_TIMEOUT, handle.token()).await {
        Ok(outcome) => outcome,
        Err(_) => Err(AuthError::Timeout),
    };

    handle.stop();
    tokio::task::spawn_blocking(move || handle.join()).await?;

    let token = outcome?;
    ctx.tokens.save(Some(&token)).await?;
    tracing::info!(path = %ctx.tokens.path().display(), "auth.token_saved");
    Ok(token)
}
