//! Typed errors for every layer of the backup pipeline.
//!
//! All error types are `Clone` so they can travel inside [`crate::backup::BackupEvent`]
//! and [`crate::server::ListenerEvent`] payloads without losing information.

use thiserror::Error;

/// Errors raised by the Spotify Web API client.
///
/// HTTP status codes are mapped uniformly: 401 becomes [`ApiError::BadToken`], 403
/// becomes [`ApiError::BadOAuthRequest`], 429 becomes [`ApiError::RateLimited`] and
/// every other non-success status becomes [`ApiError::Unknown`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Bad or expired token. Please re-authenticate (status {status})")]
    BadToken { status: u16 },

    #[error(
        "Wrong consumer key, bad nonce or expired timestamp. Please log out and authenticate again (status {status})"
    )]
    BadOAuthRequest { status: u16 },

    #[error("The app has exceeded its rate limit (status {status})")]
    RateLimited {
        status: u16,
        retry_after: Option<u64>,
    },

    #[error("Unknown status code: {status}. Please check the Spotify Web API documentation")]
    Unknown { status: u16 },

    #[error("http error: {0}")]
    Transport(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl ApiError {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ApiError::BadToken { status },
            403 => ApiError::BadOAuthRequest { status },
            429 => ApiError::RateLimited {
                status,
                retry_after: None,
            },
            _ => ApiError::Unknown { status },
        }
    }

    /// Numeric HTTP status carried by the error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::BadToken { status }
            | ApiError::BadOAuthRequest { status }
            | ApiError::RateLimited { status, .. }
            | ApiError::Unknown { status } => Some(*status),
            ApiError::Transport(_) | ApiError::Parse(_) => None,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. })
    }

    /// True when the stored access token must be erased.
    pub fn invalidates_token(&self) -> bool {
        matches!(
            self,
            ApiError::BadToken { .. } | ApiError::BadOAuthRequest { .. }
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Parse(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::from_status(status.as_u16())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Parse(e.to_string())
    }
}

/// Outcome of a failed redirect-listener run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("authorization code missing from redirect: {0}")]
    MissingCode(String),

    #[error("authorization denied by Spotify: {0}")]
    Denied(String),

    #[error("redirect state parameter does not match the authorization request")]
    StateMismatch,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("socket error: {0}")]
    Socket(String),

    #[error("listener stopped before a token was received")]
    Stopped,

    #[error("timed out waiting for the authorization redirect")]
    Timeout,
}

/// Failures of the local backup database.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

/// Failures while writing the persisted token file.
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors that end a backup run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackupError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("gave up after {attempts} rate-limited retries: {last}")]
    RetriesExhausted { attempts: u32, last: ApiError },

    #[error("backup cancelled")]
    Cancelled,
}

/// Invalid or missing configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_statuses() {
        assert_eq!(ApiError::from_status(401), ApiError::BadToken { status: 401 });
        assert_eq!(
            ApiError::from_status(403),
            ApiError::BadOAuthRequest { status: 403 }
        );
        assert!(ApiError::from_status(429).is_rate_limit());
        assert_eq!(ApiError::from_status(502), ApiError::Unknown { status: 502 });
    }

    #[test]
    fn unknown_status_message_names_the_code() {
        let msg = ApiError::from_status(418).to_string();
        assert!(msg.contains("418"));
    }

    #[test]
    fn only_auth_failures_invalidate_the_token() {
        assert!(ApiError::from_status(401).invalidates_token());
        assert!(ApiError::from_status(403).invalidates_token());
        assert!(!ApiError::from_status(429).invalidates_token());
        assert!(!ApiError::Transport("reset".into()).invalidates_token());
    }
}
