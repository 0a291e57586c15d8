use serde::{Deserialize, Deserializer, Serialize};
use tabled::Tabled;

// Spotify sends `null` for many string fields; treat it like a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenFile {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenResponse {
    #[serde(deserialize_with = "nullable")]
    pub access_token: String,
    #[serde(deserialize_with = "nullable")]
    pub token_type: String,
    #[serde(deserialize_with = "nullable")]
    pub scope: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
}

/// One page of an offset/limit paginated collection.
///
/// `next` is present iff more items remain after this page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, bound(deserialize = "T: Deserialize<'de> + Default"))]
pub struct Page<T> {
    #[serde(deserialize_with = "nullable")]
    pub href: String,
    #[serde(deserialize_with = "nullable")]
    pub items: Vec<T>,
    pub limit: u32,
    pub next: Option<String>,
    pub offset: u32,
    pub previous: Option<String>,
    pub total: u32,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistItem {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub uri: String,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    pub description: Option<String>,
    pub collaborative: bool,
    pub public: Option<bool>,
    #[serde(deserialize_with = "nullable")]
    pub snapshot_id: String,
    #[serde(deserialize_with = "nullable")]
    pub tracks: PlaylistTracksRef,
    pub owner: Option<Owner>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistTracksRef {
    #[serde(deserialize_with = "nullable")]
    pub href: String,
    pub total: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Owner {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    pub display_name: Option<String>,
}

/// Entry of a playlist's track listing.
///
/// `track` is `None` for podcast episodes and items Spotify no longer serves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackItem {
    pub added_at: Option<String>,
    pub is_local: bool,
    pub track: Option<Track>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Track {
    pub id: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    #[serde(deserialize_with = "nullable")]
    pub uri: String,
    pub album: Option<AlbumRef>,
    #[serde(deserialize_with = "nullable")]
    pub artists: Vec<ArtistRef>,
}

impl Track {
    pub fn album_name(&self) -> &str {
        self.album.as_ref().map(|a| a.name.as_str()).unwrap_or("")
    }

    /// Artist names joined with `,` the way they are stored.
    pub fn joined_artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlbumRef {
    pub id: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtistRef {
    pub id: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
    pub product: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub uri: String,
    pub followers: Option<Followers>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Followers {
    pub total: u64,
}

#[derive(Tabled)]
pub struct BackupTableRow {
    pub id: i64,
    pub date: String,
    pub name: String,
    pub description: String,
}

#[derive(Tabled)]
pub struct PlaylistTableRow {
    pub id: i64,
    pub name: String,
    pub tracks: i64,
    pub uri: String,
}

#[derive(Tabled)]
pub struct TrackTableRow {
    pub name: String,
    pub artists: String,
    pub album: String,
    pub uri: String,
}

#[derive(Tabled)]
pub struct UserTableRow {
    pub field: String,
    pub value: String,
}
