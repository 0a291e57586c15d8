use crate::{
    Res,
    cli::{Context, auth::authenticate},
    error::ApiError,
    types::User,
    warning,
};

/// Stored token, or a fresh one from the redirect flow when none is stored.
pub(crate) async fn valid_token(ctx: &Context) -> Res<String> {
    match ctx.tokens.token().await {
        Some(token) => Ok(token),
        None => {
            warning!("No token stored, starting authentication");
            authenticate(ctx).await
        }
    }
}

/// Profile of the token's owner. Erases the stored token if Spotify rejects it.
pub(crate) async fn current_user(ctx: &Context, token: &str) -> Result<User, ApiError> {
    let result = ctx.client.get_user_info(token).await;
    if let Err(e) = &result {
        forget_rejected_token(ctx, e).await;
    }
    result
}

pub(crate) async fn forget_rejected_token(ctx: &Context, error: &ApiError) {
    if !error.invalidates_token() {
        return;
    }
    tracing::warn!(error = %error, "session.token_rejected");
    if let Err(e) = ctx.tokens.remove().await {
        warning!("Cannot erase rejected token. Err: {}", e);
    }
}
