//! Configuration management for spbackup.
//!
//! Values come from the process environment, optionally seeded from a `.env` file in
//! the local data directory, and are resolved once into a [`Settings`] value that is
//! passed explicitly to every component.
//!
//! The configuration system follows a hierarchical approach:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. Application defaults (where applicable)

use std::{collections::BTreeSet, path::PathBuf, str::FromStr, time::Duration};

use url::Url;

use crate::{
    backup::{BackupOptions, RetryPolicy},
    error::ConfigError,
    spotify::{Credentials, Endpoints},
    store::{MissingTrackPolicy, RowNormalization, StoreOptions},
};

pub const APP_NAME: &str = "spbackup";

pub const DEFAULT_REDIRECT_PORT: u16 = 3000;
pub const DEFAULT_SCOPES: &str = "playlist-read-private playlist-read-collaborative";
pub const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1/";
pub const DEFAULT_LOG_FILTER: &str = "spbackup=info";

/// Root of everything spbackup writes to disk.
///
/// - Linux: `~/.local/share/spbackup`
/// - macOS: `~/Library/Application Support/spbackup`
/// - Windows: `%LOCALAPPDATA%/spbackup`
pub fn app_data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_NAME);
    path
}

pub fn token_path() -> PathBuf {
    app_data_dir().join(".token.json")
}

pub fn log_dir() -> PathBuf {
    app_data_dir().join("logs")
}

/// Directory holding one user's backup database.
pub fn user_backup_dir(user_id: &str) -> PathBuf {
    app_data_dir().join("user_backups").join(user_id)
}

pub fn backup_database_path(user_id: &str) -> PathBuf {
    user_backup_dir(user_id).join("playlists.db")
}

/// Loads environment variables from `.env` in the local data directory.
///
/// Creates the data directory if it doesn't exist. A missing `.env` file is not an
/// error since every value can also come from the process environment.
///
/// # Errors
///
/// Returns an error string if the directory cannot be created or the file exists
/// but cannot be parsed.
pub async fn load_env() -> Result<(), String> {
    let dir = app_data_dir();
    async_fs::create_dir_all(&dir)
        .await
        .map_err(|e| e.to_string())?;

    let path = dir.join(".env");
    if async_fs::metadata(&path).await.is_err() {
        return Ok(());
    }

    dotenv::from_path(&path).map_err(|e| e.to_string())
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub redirect_port: u16,
    pub scopes: BTreeSet<String>,
    pub endpoints: Endpoints,
    pub http_timeout: Duration,
    pub playlist_page_limit: u32,
    pub tracks_page_limit: u32,
    pub max_concurrent_playlist_fetches: usize,
    pub max_concurrent_track_fetches: usize,
    pub retry: RetryPolicy,
    pub normalization: RowNormalization,
    pub missing_tracks: MissingTrackPolicy,
    pub log_filter: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let client_id = get("SPOTIFY_CLIENT_ID").ok_or(ConfigError::Missing("SPOTIFY_CLIENT_ID"))?;
        let client_secret =
            get("SPOTIFY_CLIENT_SECRET").ok_or(ConfigError::Missing("SPOTIFY_CLIENT_SECRET"))?;

        let redirect_port = parse_or(&get, "SPBACKUP_REDIRECT_PORT", DEFAULT_REDIRECT_PORT)?;
        let redirect_uri = get("SPOTIFY_REDIRECT_URI")
            .unwrap_or_else(|| format!("http://localhost:{redirect_port}"));
        url_value("SPOTIFY_REDIRECT_URI", &redirect_uri)?;

        let scopes = get("SPOTIFY_SCOPES")
            .unwrap_or_else(|| DEFAULT_SCOPES.to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let endpoints = Endpoints {
            authorize_url: url_value(
                "SPOTIFY_AUTH_URL",
                &get("SPOTIFY_AUTH_URL").unwrap_or_else(|| DEFAULT_AUTH_URL.into()),
            )?,
            token_url: url_value(
                "SPOTIFY_TOKEN_URL",
                &get("SPOTIFY_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.into()),
            )?,
            api_base: api_base_value(
                &get("SPOTIFY_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into()),
            )?,
        };

        let delay: f64 = parse_or(&get, "SPBACKUP_RATE_LIMIT_DELAY_SECS", 1.0)?;
        let backoff: f64 = parse_or(&get, "SPBACKUP_RATE_LIMIT_BACKOFF_SECS", 0.1)?;
        let retry = RetryPolicy {
            initial_delay: seconds("SPBACKUP_RATE_LIMIT_DELAY_SECS", delay)?,
            backoff_increment: seconds("SPBACKUP_RATE_LIMIT_BACKOFF_SECS", backoff)?,
            max_retries: match get("SPBACKUP_RATE_LIMIT_MAX_RETRIES") {
                Some(raw) => Some(parse_value("SPBACKUP_RATE_LIMIT_MAX_RETRIES", &raw)?),
                None => None,
            },
        };

        let timeout_secs: u64 = parse_or(&get, "SPBACKUP_HTTP_TIMEOUT_SECS", 30)?;

        Ok(Settings {
            credentials: Credentials {
                client_id,
                client_secret,
                redirect_uri,
            },
            redirect_port,
            scopes,
            endpoints,
            http_timeout: Duration::from_secs(timeout_secs.max(1)),
            playlist_page_limit: parse_or(&get, "SPBACKUP_PLAYLIST_PAGE_LIMIT", 50)?,
            tracks_page_limit: parse_or(&get, "SPBACKUP_TRACKS_PAGE_LIMIT", 50)?,
            max_concurrent_playlist_fetches: parse_or(&get, "SPBACKUP_MAX_PLAYLIST_FETCHES", 5)?,
            max_concurrent_track_fetches: parse_or(&get, "SPBACKUP_MAX_TRACK_FETCHES", 5)?,
            retry,
            normalization: parse_or(&get, "SPBACKUP_NORMALIZE_ROWS", RowNormalization::default())?,
            missing_tracks: parse_or(&get, "SPBACKUP_MISSING_TRACKS", MissingTrackPolicy::default())?,
            log_filter: get("SPBACKUP_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            normalization: self.normalization,
            missing_tracks: self.missing_tracks,
        }
    }

    pub fn backup_options(&self, name: &str, description: &str) -> BackupOptions {
        BackupOptions {
            name: name.to_string(),
            description: description.to_string(),
            playlist_page_limit: self.playlist_page_limit,
            tracks_page_limit: self.tracks_page_limit,
            max_concurrent_playlist_fetches: self.max_concurrent_playlist_fetches,
            max_concurrent_track_fetches: self.max_concurrent_track_fetches,
            retry: self.retry.clone(),
        }
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

fn seconds(key: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

fn url_value(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

// `Url::join` drops the last path segment unless the base ends with a slash.
fn api_base_value(raw: &str) -> Result<Url, ConfigError> {
    if raw.ends_with('/') {
        url_value("SPOTIFY_API_URL", raw)
    } else {
        url_value("SPOTIFY_API_URL", &format!("{raw}/"))
    }
}
