use std::sync::Arc;

use axum::{Extension, extract::RawQuery, response::Html};

use crate::server::ListenerShared;

const AUTHORIZED_PAGE: &str = "<!DOCTYPE html>
<html>
  <head><meta charset=\"utf-8\"><title>spbackup</title></head>
  <body style=\"font-family: sans-serif; text-align: center; margin-top: 4em\">
    <h2>You are now authorized.</h2>
    <p>You can close this page and return to spbackup.</p>
  </body>
</html>";

const FAILED_PAGE: &str = "<!DOCTYPE html>
<html>
  <head><meta charset=\"utf-8\"><title>spbackup</title></head>
  <body style=\"font-family: sans-serif; text-align: center; margin-top: 4em\">
    <h2>Authorization failed.</h2>
    <p>Close this page and check the terminal for details.</p>
  </body>
</html>";

const ALREADY_HANDLED_PAGE: &str = "<h4>This login request was already handled.</h4>";

/// Handles the OAuth redirect. Only the first request is processed.
///
/// The exchange runs in its own task: hyper drops this future when the browser
/// disconnects, and the claimed redirect must still report its outcome.
pub(crate) async fn redirect(
    RawQuery(query): RawQuery,
    Extension(listener): Extension<Arc<ListenerShared>>,
) -> Html<&'static str> {
    if !listener.claim() {
        return Html(ALREADY_HANDLED_PAGE);
    }

    let shared = listener.clone();
    let exchange = tokio::spawn(async move { shared.complete(query.as_deref()).await });

    match exchange.await {
        Ok(Ok(_)) => Html(AUTHORIZED_PAGE),
        Ok(Err(_)) => Html(FAILED_PAGE),
        Err(e) => {
            tracing::error!(error = %e, "listener.exchange_failed");
            listener.abandon();
            Html(FAILED_PAGE)
        }
    }
}
