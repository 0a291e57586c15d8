use std::collections::BTreeSet;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::header::AUTHORIZATION;
use url::Url;

use super::{Credentials, SpotifyClient, check_status, send_json};
use crate::{error::ApiError, types::TokenResponse};

/// Builds the value of a `Basic` authorization header for the token endpoint.
///
/// # Example
///
/// ```
/// let header = basic_auth_header("id", "secret");
/// assert_eq!(header, "Basic aWQ6c2VjcmV0");
/// ```
pub fn basic_auth_header(client_id: &str, client_secret: &str) -> String {
    let encoded = STANDARD.encode(format!("{client_id}:{client_secret}"));
    format!("Basic {encoded}")
}

impl SpotifyClient {
    /// Constructs the URL the user has to visit to grant access.
    ///
    /// Pure string construction, no network call. Scopes are joined with spaces in
    /// sorted order so the URL is deterministic.
    ///
    /// # Arguments
    ///
    /// * `client_id` - The application's client id
    /// * `redirect_uri` - Where Spotify redirects after consent, must match the app settings
    /// * `scopes` - Requested permission scopes
    /// * `state` - Optional opaque value echoed back on the redirect
    ///
    /// # Example
    ///
    /// ```
    /// let url = client.build_authorize_url("abc", "http://localhost:3000", &scopes, None);
    /// assert!(url.as_str().contains("response_type=code"));
    /// ```
    pub fn build_authorize_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scopes: &BTreeSet<String>,
        state: Option<&str>,
    ) -> Url {
        let scope = scopes
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");

        let mut url = self.endpoints.authorize_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("scope", &scope)
                .append_pair("client_id", client_id);
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }
        url
    }

    /// Requests the authorize URL and returns the URL it finally resolves to.
    ///
    /// Used when the login page has to be shown somewhere other than the system
    /// browser. Expects a successful response after redirects.
    ///
    /// # Errors
    ///
    /// Any non-success status is mapped through [`ApiError::from_status`].
    pub async fn resolve_authorize_url(&self, authorize_url: &Url) -> Result<Url, ApiError> {
        let response = self.http.get(authorize_url.clone()).send().await?;
        let response = check_status(response)?;
        Ok(response.url().clone())
    }

    /// Exchanges a one-time authorization code for an access token.
    ///
    /// Sends a form-encoded `POST` to the token endpoint with a `Basic` header made
    /// from the client credentials.
    ///
    /// # Arguments
    ///
    /// * `client_id` - The application's client id
    /// * `client_secret` - The application's client secret
    /// * `code` - The code received on the redirect
    /// * `redirect_uri` - The same redirect URI used to build the authorize URL
    ///
    /// # Returns
    ///
    /// The `access_token` field of the response.
    ///
    /// # Errors
    ///
    /// - Status errors as described in the module docs
    /// - [`ApiError::Parse`] if the body has no `access_token`
    pub async fn exchange_code_for_token(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<String, ApiError> {
        let request = self
            .http
            .post(self.endpoints.token_url.clone())
            .header(AUTHORIZATION, basic_auth_header(client_id, client_secret))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ]);

        let token: TokenResponse = send_json(request).await?;
        if token.access_token.is_empty() {
            return Err(ApiError::Parse(
                "token response did not contain an access_token".to_string(),
            ));
        }

        tracing::info!(scope = %token.scope, expires_in = token.expires_in, "auth.token_exchanged");
        Ok(token.access_token)
    }
}

/// Turns an authorization code into an access token.
///
/// The redirect listener only depends on this trait, so tests can stub the exchange.
#[async_trait]
pub trait CodeExchanger: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<String, ApiError>;
}

/// [`CodeExchanger`] backed by the real token endpoint.
#[derive(Debug, Clone)]
pub struct SpotifyCodeExchange {
    client: SpotifyClient,
    credentials: Credentials,
}

impl SpotifyCodeExchange {
    pub fn new(client: SpotifyClient, credentials: Credentials) -> Self {
        Self {
            client,
            credentials,
        }
    }
}

#[async_trait]
impl CodeExchanger for SpotifyCodeExchange {
    async fn exchange_code(&self, code: &str) -> Result<String, ApiError> {
        self.client
            .exchange_code_for_token(
                &self.credentials.client_id,
                &self.credentials.client_secret,
                code,
                &self.credentials.redirect_uri,
            )
            .await
    }
}
