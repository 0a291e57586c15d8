use chrono::NaiveDate;
use spbackup::types::{AlbumRef, ArtistRef, Page, Track};
use spbackup::utils::*;

// Helper function to create a test track
fn create_test_track(name: &str, album: Option<&str>, artists: &[&str]) -> Track {
    Track {
        id: Some(format!("{}_id", name)),
        name: name.to_string(),
        uri: format!("spotify:track:{}", name),
        album: album.map(|a| AlbumRef {
            id: None,
            name: a.to_string(),
        }),
        artists: artists
            .iter()
            .map(|a| ArtistRef {
                id: None,
                name: a.to_string(),
            })
            .collect(),
    }
}

#[test]
fn test_generate_state() {
    let state = generate_state();

    // Should be exactly 16 characters
    assert_eq!(state.len(), 16);

    // Should contain only alphanumeric characters
    assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));

    // Two generated states should be different
    assert_ne!(state, generate_state());
}

#[test]
fn test_page_offsets_exact_multiple() {
    assert_eq!(page_offsets(100, 50), vec![0, 50]);
}

#[test]
fn test_page_offsets_partial_last_page() {
    // 137 playlists with 50 per page need three requests
    assert_eq!(page_offsets(137, 50), vec![0, 50, 100]);
}

#[test]
fn test_page_offsets_empty() {
    assert!(page_offsets(0, 50).is_empty());

    // A zero limit never produces pages
    assert!(page_offsets(10, 0).is_empty());
}

#[test]
fn test_page_offsets_limit_one() {
    assert_eq!(page_offsets(3, 1), vec![0, 1, 2]);
}

#[test]
fn test_default_backup_name() {
    let now = NaiveDate::from_ymd_opt(2024, 3, 9)
        .unwrap()
        .and_hms_opt(7, 5, 42)
        .unwrap();

    assert_eq!(default_backup_name(now), "Backup 2024-03-09 07:05");
}

#[test]
fn test_truncate_short_values_unchanged() {
    assert_eq!(truncate("Road Trip", 20), "Road Trip");
    assert_eq!(truncate("", 5), "");
}

#[test]
fn test_truncate_long_values() {
    let truncated = truncate("A very long playlist name", 10);

    assert_eq!(truncated.chars().count(), 10);
    assert!(truncated.ends_with('…'));
    assert_eq!(truncated, "A very lo…");
}

#[test]
fn test_truncate_counts_characters_not_bytes() {
    // Multi-byte characters must not be split
    assert_eq!(truncate("Sigur Rós – Hoppípolla", 9), "Sigur Ró…");
}

#[test]
fn test_track_album_name_and_artists() {
    let track = create_test_track("song", Some("Album"), &["First", "Second"]);

    assert_eq!(track.album_name(), "Album");
    assert_eq!(track.joined_artist_names(), "First,Second");
}

#[test]
fn test_track_without_album_or_artists() {
    let track = create_test_track("song", None, &[]);

    assert_eq!(track.album_name(), "");
    assert_eq!(track.joined_artist_names(), "");
}

#[test]
fn test_page_deserializes_with_null_fields() {
    let json = r#"{
        "href": "https://api.spotify.com/v1/me/playlists",
        "items": [],
        "limit": 50,
        "next": null,
        "offset": 0,
        "previous": null,
        "total": 0
    }"#;

    let page: Page<serde_json::Value> = serde_json::from_str(json).unwrap();
    assert_eq!(page.total, 0);
    assert!(!page.has_next());
}

#[test]
fn test_page_of_tracks_with_null_items_and_missing_fields() {
    let json = r#"{
        "href": null,
        "items": null,
        "total": 3
    }"#;

    let page: Page<spbackup::types::TrackItem> = serde_json::from_str(json).unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.href, "");
    assert_eq!(page.total, 3);
    assert_eq!(page.limit, 0);
    assert!(!page.has_next());
}
