//! DDL for the per-user backup database. Every statement is idempotent.

pub(crate) const CREATE_BACKUPS: &str = "
CREATE TABLE IF NOT EXISTS Backups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    description TEXT,
    date_added DATETIME NOT NULL
)";

pub(crate) const CREATE_PLAYLISTS: &str = "
CREATE TABLE IF NOT EXISTS Playlists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    playlist_id TEXT NOT NULL,
    uri TEXT NOT NULL,
    name TEXT,
    description TEXT,
    total_songs INTEGER,
    backup_id INTEGER,
    FOREIGN KEY (backup_id) REFERENCES Backups (id)
)";

pub(crate) const CREATE_ALBUMS: &str = "
CREATE TABLE IF NOT EXISTS Albums (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT
)";

pub(crate) const CREATE_ARTISTS: &str = "
CREATE TABLE IF NOT EXISTS Artists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT
)";

pub(crate) const CREATE_TRACKS: &str = "
CREATE TABLE IF NOT EXISTS Tracks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uri TEXT NOT NULL,
    name TEXT NOT NULL,
    playlist_id INTEGER,
    artists_id INTEGER,
    album_id INTEGER,
    FOREIGN KEY (playlist_id) REFERENCES Playlists (id),
    FOREIGN KEY (artists_id) REFERENCES Artists (id),
    FOREIGN KEY (album_id) REFERENCES Albums (id)
)";

pub(crate) const CREATE_INDEXES: [&str; 4] = [
    "CREATE INDEX IF NOT EXISTS idx_playlists_backup ON Playlists (backup_id)",
    "CREATE INDEX IF NOT EXISTS idx_tracks_playlist ON Tracks (playlist_id)",
    "CREATE INDEX IF NOT EXISTS idx_albums_name ON Albums (name)",
    "CREATE INDEX IF NOT EXISTS idx_artists_name ON Artists (name)",
];

/// Creation order respects foreign keys.
pub(crate) const CREATE_TABLES: [&str; 5] = [
    CREATE_BACKUPS,
    CREATE_PLAYLISTS,
    CREATE_ALBUMS,
    CREATE_ARTISTS,
    CREATE_TRACKS,
];
