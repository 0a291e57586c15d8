//! Local backup database.
//!
//! One SQLite file per Spotify user holds every backup run of that user. All writes
//! happen in a short transaction per call; a failed call leaves its transaction
//! uncommitted and is reported to the optional error handler before the error is
//! returned.

mod models;
mod schema;

pub use models::{
    AlbumRecord, ArtistRecord, BackupRun, PlaylistRecord, TrackDetails, TrackRecord,
};

use std::{path::Path, str::FromStr, sync::Arc, time::Duration};

use chrono::{Local, NaiveDateTime};
use sqlx::{
    Row, SqliteConnection, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
};

use crate::{
    error::StoreError,
    types::{PlaylistItem, TrackItem},
};

/// Text format of `Backups.date_added`.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// How album and artist rows are written for each track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RowNormalization {
    /// Insert a fresh album and artist row for every track.
    #[default]
    Duplicate,
    /// Reuse an existing row with the same name.
    Dedup,
}

impl FromStr for RowNormalization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "duplicate" => Ok(RowNormalization::Duplicate),
            "dedup" => Ok(RowNormalization::Dedup),
            other => Err(format!("expected `duplicate` or `dedup`, got `{other}`")),
        }
    }
}

/// What to do with playlist entries that carry no track object (podcast episodes,
/// removed items).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingTrackPolicy {
    /// Store a track with empty name, uri, album and artists.
    #[default]
    Placeholder,
    /// Store nothing.
    Skip,
}

impl FromStr for MissingTrackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "placeholder" => Ok(MissingTrackPolicy::Placeholder),
            "skip" => Ok(MissingTrackPolicy::Skip),
            other => Err(format!("expected `placeholder` or `skip`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    pub normalization: RowNormalization,
    pub missing_tracks: MissingTrackPolicy,
}

/// Called with every error before it is returned to the caller.
pub type ErrorHandler = Arc<dyn Fn(&StoreError) + Send + Sync>;

#[derive(Clone, Copy)]
enum NameTable {
    Albums,
    Artists,
}

impl NameTable {
    fn select_sql(self) -> &'static str {
        match self {
            NameTable::Albums => "SELECT id FROM Albums WHERE name = ? ORDER BY id LIMIT 1",
            NameTable::Artists => "SELECT id FROM Artists WHERE name = ? ORDER BY id LIMIT 1",
        }
    }

    fn insert_sql(self) -> &'static str {
        match self {
            NameTable::Albums => "INSERT INTO Albums (name) VALUES (?)",
            NameTable::Artists => "INSERT INTO Artists (name) VALUES (?)",
        }
    }
}

/// Handle to one user's backup database. Cheap to clone.
#[derive(Clone)]
pub struct BackupStore {
    pool: SqlitePool,
    options: StoreOptions,
    error_handler: Option<ErrorHandler>,
}

impl BackupStore {
    /// Opens (creating if needed) the database file at `path`.
    ///
    /// The pool holds a single connection so writers are serialized by the pool
    /// instead of failing with `database is locked`.
    pub async fn open(path: &Path, options: StoreOptions) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            async_fs::create_dir_all(parent).await?;
        }

        let connect = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect)
            .await?;

        tracing::debug!(path = %path.display(), "store.open");
        Ok(Self {
            pool,
            options,
            error_handler: None,
        })
    }

    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = Some(handler);
        self
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn report<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if let Err(e) = &result {
            tracing::error!(error = %e, "store.error");
            if let Some(handler) = &self.error_handler {
                handler(e);
            }
        }
        result
    }

    /// Creates all tables and indexes if they do not exist yet.
    pub async fn create_tables(&self) -> Result<(), StoreError> {
        let result = self.create_tables_tx().await;
        self.report(result)
    }

    async fn create_tables_tx(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for ddl in schema::CREATE_TABLES.iter().chain(schema::CREATE_INDEXES.iter()) {
            sqlx::query(ddl).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Records a new backup run stamped with the current local time.
    pub async fn add_backup(&self, name: &str, description: &str) -> Result<i64, StoreError> {
        let result = self.add_backup_tx(name, description).await;
        self.report(result)
    }

    async fn add_backup_tx(&self, name: &str, description: &str) -> Result<i64, StoreError> {
        let date_added = Local::now().naive_local().format(DATE_FORMAT).to_string();

        let mut tx = self.pool.begin().await?;
        let id = sqlx::query("INSERT INTO Backups (name, description, date_added) VALUES (?, ?, ?)")
            .bind(name)
            .bind(description)
            .bind(date_added.as_str())
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();
        tx.commit().await?;
        Ok(id)
    }

    pub async fn insert_playlist(
        &self,
        item: &PlaylistItem,
        backup_id: i64,
    ) -> Result<i64, StoreError> {
        let result = self.insert_playlist_tx(item, backup_id).await;
        self.report(result)
    }

    async fn insert_playlist_tx(
        &self,
        item: &PlaylistItem,
        backup_id: i64,
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let id = sqlx::query(
            "INSERT INTO Playlists (playlist_id, uri, name, description, total_songs, backup_id) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(item.id.as_str())
        .bind(item.uri.as_str())
        .bind(item.name.as_str())
        .bind(item.description.as_deref().unwrap_or(""))
        .bind(i64::from(item.tracks.total))
        .bind(backup_id)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        tx.commit().await?;
        Ok(id)
    }

    /// Stores one playlist entry as an album row, an artist row and a track row.
    ///
    /// Returns `None` when the entry has no track object and the store is configured
    /// with [`MissingTrackPolicy::Skip`].
    pub async fn insert_track(
        &self,
        item: &TrackItem,
        playlist_id: i64,
    ) -> Result<Option<i64>, StoreError> {
        let result = self.insert_track_tx(item, playlist_id).await;
        self.report(result)
    }

    async fn insert_track_tx(
        &self,
        item: &TrackItem,
        playlist_id: i64,
    ) -> Result<Option<i64>, StoreError> {
        let (name, uri, album, artists) = match &item.track {
            Some(track) => (
                track.name.as_str(),
                track.uri.as_str(),
                track.album_name(),
                track.joined_artist_names(),
            ),
            None => match self.options.missing_tracks {
                MissingTrackPolicy::Skip => return Ok(None),
                MissingTrackPolicy::Placeholder => ("", "", "", String::new()),
            },
        };

        let normalization = self.options.normalization;
        let mut tx = self.pool.begin().await?;
        let album_id = name_row(&mut *tx, NameTable::Albums, album, normalization).await?;
        let artists_id = name_row(&mut *tx, NameTable::Artists, &artists, normalization).await?;
        let id = sqlx::query(
            "INSERT INTO Tracks (uri, name, playlist_id, artists_id, album_id) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uri)
        .bind(name)
        .bind(playlist_id)
        .bind(artists_id)
        .bind(album_id)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        tx.commit().await?;
        Ok(Some(id))
    }

    /// All backup runs, oldest first.
    pub async fn get_backups(&self) -> Result<Vec<BackupRun>, StoreError> {
        let result = self.get_backups_query().await;
        self.report(result)
    }

    async fn get_backups_query(&self) -> Result<Vec<BackupRun>, StoreError> {
        let rows = sqlx::query("SELECT id, name, description, date_added FROM Backups ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(backup_from_row).collect()
    }

    pub async fn get_backup(&self, id: i64) -> Result<Option<BackupRun>, StoreError> {
        let result = self.get_backup_query(id).await;
        self.report(result)
    }

    async fn get_backup_query(&self, id: i64) -> Result<Option<BackupRun>, StoreError> {
        let row = sqlx::query("SELECT id, name, description, date_added FROM Backups WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(backup_from_row).transpose()
    }

    /// Playlists stored by one backup run, in insertion order.
    pub async fn get_playlists(&self, backup_id: i64) -> Result<Vec<PlaylistRecord>, StoreError> {
        let result = self.get_playlists_query(backup_id).await;
        self.report(result)
    }

    async fn get_playlists_query(&self, backup_id: i64) -> Result<Vec<PlaylistRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, playlist_id, uri, name, description, total_songs, backup_id \
             FROM Playlists WHERE backup_id = ? ORDER BY id",
        )
        .bind(backup_id)
        .fetch_all(&self.pool)
        .await?;

        let mut playlists = Vec::with_capacity(rows.len());
        for row in &rows {
            playlists.push(PlaylistRecord {
                id: row.try_get("id")?,
                playlist_id: row.try_get("playlist_id")?,
                uri: row.try_get("uri")?,
                name: optional_text(row, "name")?,
                description: optional_text(row, "description")?,
                total_songs: row.try_get::<Option<i64>, _>("total_songs")?.unwrap_or(0),
                backup_id: row.try_get("backup_id")?,
            });
        }
        Ok(playlists)
    }

    /// Tracks stored for one playlist record, in insertion order.
    pub async fn get_tracks(&self, playlist_id: i64) -> Result<Vec<TrackRecord>, StoreError> {
        let result = self.get_tracks_query(playlist_id).await;
        self.report(result)
    }

    async fn get_tracks_query(&self, playlist_id: i64) -> Result<Vec<TrackRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, uri, name, playlist_id, artists_id, album_id \
             FROM Tracks WHERE playlist_id = ? ORDER BY id",
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await?;

        let mut tracks = Vec::with_capacity(rows.len());
        for row in &rows {
            tracks.push(TrackRecord {
                id: row.try_get("id")?,
                uri: row.try_get("uri")?,
                name: row.try_get("name")?,
                playlist_id: row.try_get("playlist_id")?,
                artists_id: row.try_get("artists_id")?,
                album_id: row.try_get("album_id")?,
            });
        }
        Ok(tracks)
    }

    /// Tracks of one playlist record joined with their album and artist names.
    pub async fn get_track_details(&self, playlist_id: i64) -> Result<Vec<TrackDetails>, StoreError> {
        let result = self.get_track_details_query(playlist_id).await;
        self.report(result)
    }

    async fn get_track_details_query(
        &self,
        playlist_id: i64,
    ) -> Result<Vec<TrackDetails>, StoreError> {
        let rows = sqlx::query(
            "SELECT t.id, t.uri, t.name, al.name AS album, ar.name AS artists \
             FROM Tracks t \
             LEFT JOIN Albums al ON al.id = t.album_id \
             LEFT JOIN Artists ar ON ar.id = t.artists_id \
             WHERE t.playlist_id = ? ORDER BY t.id",
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await?;

        let mut tracks = Vec::with_capacity(rows.len());
        for row in &rows {
            tracks.push(TrackDetails {
                id: row.try_get("id")?,
                uri: row.try_get("uri")?,
                name: row.try_get("name")?,
                album: optional_text(row, "album")?,
                artists: optional_text(row, "artists")?,
            });
        }
        Ok(tracks)
    }

    pub async fn get_albums(&self) -> Result<Vec<AlbumRecord>, StoreError> {
        let result = self.name_rows("SELECT id, name FROM Albums ORDER BY id").await;
        self.report(result.map(|rows| {
            rows.into_iter()
                .map(|(id, name)| AlbumRecord { id, name })
                .collect()
        }))
    }

    pub async fn get_artists(&self) -> Result<Vec<ArtistRecord>, StoreError> {
        let result = self.name_rows("SELECT id, name FROM Artists ORDER BY id").await;
        self.report(result.map(|rows| {
            rows.into_iter()
                .map(|(id, name)| ArtistRecord { id, name })
                .collect()
        }))
    }

    async fn name_rows(&self, sql: &'static str) -> Result<Vec<(i64, String)>, StoreError> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push((row.try_get("id")?, optional_text(row, "name")?));
        }
        Ok(out)
    }
}

async fn name_row(
    conn: &mut SqliteConnection,
    table: NameTable,
    name: &str,
    normalization: RowNormalization,
) -> Result<i64, sqlx::Error> {
    if normalization == RowNormalization::Dedup {
        let existing = sqlx::query(table.select_sql())
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;
        if let Some(row) = existing {
            return row.try_get("id");
        }
    }

    let result = sqlx::query(table.insert_sql())
        .bind(name)
        .execute(&mut *conn)
        .await?;
    Ok(result.last_insert_rowid())
}

fn optional_text(row: &SqliteRow, column: &str) -> Result<String, StoreError> {
    Ok(row.try_get::<Option<String>, _>(column)?.unwrap_or_default())
}

fn backup_from_row(row: &SqliteRow) -> Result<BackupRun, StoreError> {
    let raw: String = row.try_get("date_added")?;
    let date_added = NaiveDateTime::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| StoreError::Database(format!("invalid date_added `{raw}`: {e}")))?;

    Ok(BackupRun {
        id: row.try_get("id")?,
        name: optional_text(row, "name")?,
        description: optional_text(row, "description")?,
        date_added,
    })
}
