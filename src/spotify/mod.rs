//! # Spotify Integration Module
//!
//! HTTP client for the parts of the Spotify Web API that spbackup needs: the OAuth 2.0
//! authorization-code flow, paginated playlist and track listings, and the current
//! user's profile.
//!
//! ## Architecture
//!
//! ```text
//! Application Layer (CLI, Backup Orchestrator, Redirect Listener)
//!          ↓
//! Spotify Integration Layer
//!     ├── Authentication (authorize URL, code exchange)
//!     ├── Playlists (playlists and playlist tracks, offset/limit pages)
//!     └── User (profile lookup)
//!          ↓
//! HTTP Layer (reqwest, JSON)
//!          ↓
//! Spotify Web API
//! ```
//!
//! ## Error Mapping
//!
//! Every call maps the HTTP status uniformly through [`ApiError::from_status`]:
//!
//! | Status | Error |
//! |--------|-------|
//! | 401 | [`ApiError::BadToken`] |
//! | 403 | [`ApiError::BadOAuthRequest`] |
//! | 429 | [`ApiError::RateLimited`] |
//! | other non-2xx | [`ApiError::Unknown`] |
//!
//! Retrying is not done here. Callers decide what to retry, see
//! [`crate::backup::RetryPolicy`].
//!
//! ## Configuration
//!
//! Endpoints are carried by an [`Endpoints`] value so the client can be pointed at a
//! local server in tests. Requests carry a bounded timeout configured through
//! [`crate::config::Settings::http_timeout`].

mod auth;
mod playlists;
mod user;

pub use auth::{CodeExchanger, SpotifyCodeExchange, basic_auth_header};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, header::RETRY_AFTER};
use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    error::ApiError,
    types::{Page, PlaylistItem, TrackItem},
};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// OAuth application credentials plus the redirect URI registered with Spotify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Remote endpoints used by [`SpotifyClient`].
///
/// `api_base` must end with a `/` so relative paths join beneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub authorize_url: Url,
    pub token_url: Url,
    pub api_base: Url,
}

/// Thin wrapper around a shared [`reqwest::Client`].
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    http: Client,
    endpoints: Endpoints,
}

impl SpotifyClient {
    /// Creates a client with the given endpoints and per-request timeout.
    ///
    /// # Arguments
    ///
    /// * `endpoints` - Authorization, token and API base URLs
    /// * `timeout` - Upper bound for each HTTP request, independent of any retry sleep
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the TLS backend cannot be initialised.
    pub fn new(endpoints: Endpoints, timeout: Duration) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to build http client: {e}")))?;

        Ok(Self { http, endpoints })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn api_url(&self, path: &str) -> Result<Url, ApiError> {
        self.endpoints
            .api_base
            .join(path)
            .map_err(|e| ApiError::Transport(format!("invalid api path {path}: {e}")))
    }

    fn get(&self, token: &str, url: Url) -> RequestBuilder {
        self.http.get(url).bearer_auth(token)
    }
}

/// Sends a request and decodes a JSON body from a successful response.
async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
    let response = check_status(request.send().await?)?;
    Ok(response.json::<T>().await?)
}

/// Maps a non-success HTTP status to the matching [`ApiError`].
fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error = match ApiError::from_status(status.as_u16()) {
        ApiError::RateLimited { status, .. } => ApiError::RateLimited {
            status,
            retry_after: retry_after(&response),
        },
        other => other,
    };

    if let ApiError::RateLimited { retry_after, .. } = &error {
        tracing::debug!(url = %response.url(), retry_after = ?retry_after, "http.rate_limited");
    } else {
        tracing::warn!(url = %response.url(), status = %status, "http.error");
    }

    Err(error)
}

fn retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Source of paginated playlist data consumed by the backup orchestrator.
///
/// Implemented by [`SpotifyClient`]; tests provide in-memory fakes.
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn playlists(
        &self,
        token: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<PlaylistItem>, ApiError>;

    async fn playlist_tracks(
        &self,
        token: &str,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<TrackItem>, ApiError>;
}

#[async_trait]
impl PlaylistSource for SpotifyClient {
    async fn playlists(
        &self,
        token: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<PlaylistItem>, ApiError> {
        self.get_playlists(token, offset, limit).await
    }

    async fn playlist_tracks(
        &self,
        token: &str,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<TrackItem>, ApiError> {
        self.get_playlist_tracks(token, playlist_id, offset, limit)
            .await
    }
}
