use std::{collections::HashMap, time::Duration};

use spbackup::config::{DEFAULT_REDIRECT_PORT, Settings};
use spbackup::error::ConfigError;
use spbackup::store::{MissingTrackPolicy, RowNormalization};

// Helper function to build settings from a fixed set of variables
fn settings_from(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
    let mut map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    map.entry("SPOTIFY_CLIENT_ID".to_string())
        .or_insert_with(|| "id".to_string());
    map.entry("SPOTIFY_CLIENT_SECRET".to_string())
        .or_insert_with(|| "secret".to_string());
    Settings::from_lookup(|key| map.get(key).cloned())
}

#[test]
fn test_defaults() {
    let settings = settings_from(&[]).unwrap();

    assert_eq!(settings.credentials.client_id, "id");
    assert_eq!(settings.credentials.client_secret, "secret");
    assert_eq!(settings.redirect_port, DEFAULT_REDIRECT_PORT);
    assert_eq!(settings.credentials.redirect_uri, "http://localhost:3000");
    assert!(settings.scopes.contains("playlist-read-private"));
    assert!(settings.scopes.contains("playlist-read-collaborative"));
    assert_eq!(
        settings.endpoints.api_base.as_str(),
        "https://api.spotify.com/v1/"
    );
    assert_eq!(settings.http_timeout, Duration::from_secs(30));
    assert_eq!(settings.playlist_page_limit, 50);
    assert_eq!(settings.max_concurrent_playlist_fetches, 5);
    assert_eq!(settings.retry.initial_delay, Duration::from_secs(1));
    assert_eq!(settings.retry.backoff_increment, Duration::from_millis(100));
    assert_eq!(settings.retry.max_retries, None);
    assert_eq!(settings.normalization, RowNormalization::Duplicate);
    assert_eq!(settings.missing_tracks, MissingTrackPolicy::Placeholder);
}

#[test]
fn test_missing_credentials() {
    let result = Settings::from_lookup(|_| None);
    assert_eq!(result.unwrap_err(), ConfigError::Missing("SPOTIFY_CLIENT_ID"));

    let result = Settings::from_lookup(|key| (key == "SPOTIFY_CLIENT_ID").then(|| "id".to_string()));
    assert_eq!(
        result.unwrap_err(),
        ConfigError::Missing("SPOTIFY_CLIENT_SECRET")
    );
}

#[test]
fn test_empty_values_count_as_missing() {
    let result = Settings::from_lookup(|_| Some("  ".to_string()));
    assert_eq!(result.unwrap_err(), ConfigError::Missing("SPOTIFY_CLIENT_ID"));
}

#[test]
fn test_port_drives_default_redirect_uri() {
    let settings = settings_from(&[("SPBACKUP_REDIRECT_PORT", "8888")]).unwrap();

    assert_eq!(settings.redirect_port, 8888);
    assert_eq!(settings.credentials.redirect_uri, "http://localhost:8888");
}

#[test]
fn test_overrides() {
    let settings = settings_from(&[
        ("SPOTIFY_API_URL", "http://127.0.0.1:9000/v1"),
        ("SPOTIFY_SCOPES", "user-read-email playlist-read-private"),
        ("SPBACKUP_RATE_LIMIT_DELAY_SECS", "2.5"),
        ("SPBACKUP_RATE_LIMIT_BACKOFF_SECS", "0"),
        ("SPBACKUP_RATE_LIMIT_MAX_RETRIES", "4"),
        ("SPBACKUP_NORMALIZE_ROWS", "dedup"),
        ("SPBACKUP_MISSING_TRACKS", "SKIP"),
        ("SPBACKUP_MAX_TRACK_FETCHES", "2"),
    ])
    .unwrap();

    // A trailing slash is added so relative paths join below /v1
    assert_eq!(
        settings.endpoints.api_base.as_str(),
        "http://127.0.0.1:9000/v1/"
    );
    assert_eq!(settings.scopes.len(), 2);
    assert!(settings.scopes.contains("user-read-email"));
    assert_eq!(settings.retry.initial_delay, Duration::from_millis(2500));
    assert_eq!(settings.retry.backoff_increment, Duration::ZERO);
    assert_eq!(settings.retry.max_retries, Some(4));
    assert_eq!(settings.normalization, RowNormalization::Dedup);
    assert_eq!(settings.missing_tracks, MissingTrackPolicy::Skip);
    assert_eq!(settings.max_concurrent_track_fetches, 2);
}

#[test]
fn test_invalid_values() {
    let err = settings_from(&[("SPBACKUP_REDIRECT_PORT", "not-a-port")]).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Invalid {
            key: "SPBACKUP_REDIRECT_PORT",
            ..
        }
    ));

    let err = settings_from(&[("SPBACKUP_RATE_LIMIT_DELAY_SECS", "-1")]).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Invalid {
            key: "SPBACKUP_RATE_LIMIT_DELAY_SECS",
            ..
        }
    ));

    let err = settings_from(&[("SPBACKUP_NORMALIZE_ROWS", "sometimes")]).unwrap_err();
    assert!(err.to_string().contains("SPBACKUP_NORMALIZE_ROWS"));

    let err = settings_from(&[("SPOTIFY_TOKEN_URL", "not a url")]).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Invalid {
            key: "SPOTIFY_TOKEN_URL",
            ..
        }
    ));
}

#[test]
fn test_backup_options_carry_settings() {
    let settings = settings_from(&[("SPBACKUP_TRACKS_PAGE_LIMIT", "100")]).unwrap();
    let options = settings.backup_options("name", "description");

    assert_eq!(options.name, "name");
    assert_eq!(options.description, "description");
    assert_eq!(options.tracks_page_limit, 100);
    assert_eq!(options.retry, settings.retry);

    let store = settings.store_options();
    assert_eq!(store.normalization, settings.normalization);
}
