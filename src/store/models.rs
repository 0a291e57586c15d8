use chrono::NaiveDateTime;

/// One execution of the backup orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRun {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub date_added: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistRecord {
    pub id: i64,
    /// Spotify id of the playlist.
    pub playlist_id: String,
    pub uri: String,
    pub name: String,
    pub description: String,
    pub total_songs: i64,
    pub backup_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRecord {
    pub id: i64,
    pub uri: String,
    pub name: String,
    pub playlist_id: i64,
    pub artists_id: i64,
    pub album_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumRecord {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistRecord {
    pub id: i64,
    /// Artist names of one track, joined with `,`.
    pub name: String,
}

/// A stored track with its album and artist names resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDetails {
    pub id: i64,
    pub uri: String,
    pub name: String,
    pub album: String,
    pub artists: String,
}
