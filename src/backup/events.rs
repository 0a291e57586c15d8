use std::{sync::Arc, time::Duration};

use crate::{
    error::{BackupError, StoreError},
    types::{PlaylistItem, TrackItem},
};

/// Progress notifications emitted by a backup run.
///
/// The callback is invoked from the task driving the run; consumers that own a UI
/// thread must marshal events themselves.
#[derive(Debug, Clone)]
pub enum BackupEvent {
    BackupStart {
        backup_id: i64,
    },
    /// Total number of playlists reported by the first page.
    PlaylistsFound {
        total: u32,
    },
    PlaylistAdded {
        record_id: i64,
        item: PlaylistItem,
    },
    TrackAdded {
        record_id: i64,
        playlist_record_id: i64,
        item: TrackItem,
    },
    /// An entry without a track object was not stored.
    TrackSkipped {
        playlist_record_id: i64,
        item: TrackItem,
    },
    RateLimited {
        delay: Duration,
        attempt: u32,
    },
    BackupSuccess {
        backup_id: i64,
    },
    BackupCancelled,
    BackupError {
        error: BackupError,
    },
    DatabaseError {
        error: StoreError,
    },
}

pub type BackupCallback = Arc<dyn Fn(BackupEvent) + Send + Sync>;
