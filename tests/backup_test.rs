use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use spbackup::backup::{
    BackupCallback, BackupEvent, BackupOptions, BackupOrchestrator, RetryPolicy,
};
use spbackup::error::{ApiError, BackupError, StoreError};
use spbackup::spotify::PlaylistSource;
use spbackup::store::{BackupStore, MissingTrackPolicy, StoreOptions};
use spbackup::types::{Page, PlaylistItem, PlaylistTracksRef, Track, TrackItem};
use tempfile::TempDir;

/// In-memory playlist source with call counters.
#[derive(Default)]
struct FakeState {
    playlists: Vec<PlaylistItem>,
    playlist_calls: AtomicUsize,
    track_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    // One-shot failures of the playlists endpoint keyed by offset
    playlist_failures: Mutex<HashMap<u32, ApiError>>,
    // Track positions served without a track object
    missing_tracks: Mutex<Vec<u32>>,
}

#[derive(Clone)]
struct FakeSource(Arc<FakeState>);

impl FakeSource {
    fn new(track_counts: &[u32]) -> Self {
        let playlists = track_counts
            .iter()
            .enumerate()
            .map(|(i, &total)| PlaylistItem {
                id: format!("p{}", i),
                uri: format!("spotify:playlist:p{}", i),
                name: format!("Playlist {}", i),
                tracks: PlaylistTracksRef {
                    href: String::new(),
                    total,
                },
                ..Default::default()
            })
            .collect();

        FakeSource(Arc::new(FakeState {
            playlists,
            ..Default::default()
        }))
    }

    fn fail_playlists_once(self, offset: u32, error: ApiError) -> Self {
        self.0
            .playlist_failures
            .lock()
            .unwrap()
            .insert(offset, error);
        self
    }

    fn without_tracks_at(self, positions: &[u32]) -> Self {
        self.0
            .missing_tracks
            .lock()
            .unwrap()
            .extend_from_slice(positions);
        self
    }

    fn playlist_calls(&self) -> usize {
        self.0.playlist_calls.load(Ordering::SeqCst)
    }

    fn track_calls(&self) -> usize {
        self.0.track_calls.load(Ordering::SeqCst)
    }

    fn peak_in_flight(&self) -> usize {
        self.0.peak_in_flight.load(Ordering::SeqCst)
    }

    // Lets sibling requests of the same batch start before this one returns
    async fn in_flight(&self) {
        let now = self.0.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn page<T: Clone + Default>(all: &[T], offset: u32, limit: u32) -> Page<T> {
    let start = (offset as usize).min(all.len());
    let end = (start + limit as usize).min(all.len());
    Page {
        items: all[start..end].to_vec(),
        limit,
        offset,
        next: (end < all.len()).then(|| format!("offset={}", end)),
        total: all.len() as u32,
        ..Default::default()
    }
}

#[async_trait]
impl PlaylistSource for FakeSource {
    async fn playlists(
        &self,
        _token: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<PlaylistItem>, ApiError> {
        self.0.playlist_calls.fetch_add(1, Ordering::SeqCst);
        self.in_flight().await;

        let failure = self.0.playlist_failures.lock().unwrap().remove(&offset);
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(page(&self.0.playlists, offset, limit))
    }

    async fn playlist_tracks(
        &self,
        _token: &str,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<TrackItem>, ApiError> {
        self.0.track_calls.fetch_add(1, Ordering::SeqCst);

        let total = self
            .0
            .playlists
            .iter()
            .find(|p| p.id == playlist_id)
            .map(|p| p.tracks.total)
            .unwrap_or(0);
        let missing = self.0.missing_tracks.lock().unwrap().clone();
        let tracks: Vec<TrackItem> = (0..total)
            .map(|n| TrackItem {
                track: (!missing.contains(&n)).then(|| Track {
                    name: format!("{}-t{}", playlist_id, n),
                    uri: format!("spotify:track:{}-t{}", playlist_id, n),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .collect();
        Ok(page(&tracks, offset, limit))
    }
}

// Helper function to build options with a fast retry policy
fn create_test_options() -> BackupOptions {
    let mut options = BackupOptions::new("test", "");
    options.retry = RetryPolicy {
        initial_delay: Duration::from_millis(10),
        backoff_increment: Duration::ZERO,
        max_retries: Some(3),
    };
    options
}

async fn create_test_store() -> (TempDir, BackupStore) {
    create_test_store_with(StoreOptions::default()).await
}

async fn create_test_store_with(options: StoreOptions) -> (TempDir, BackupStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = BackupStore::open(&dir.path().join("playlists.db"), options)
        .await
        .unwrap();
    (dir, store)
}

fn recorder() -> (Arc<Mutex<Vec<BackupEvent>>>, BackupCallback) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let callback: BackupCallback = {
        let events = events.clone();
        Arc::new(move |event: BackupEvent| events.lock().unwrap().push(event))
    };
    (events, callback)
}

#[tokio::test]
async fn test_backup_pages_through_all_playlists() {
    let source = FakeSource::new(&[0; 137]);
    let (_dir, store) = create_test_store().await;
    let orchestrator = BackupOrchestrator::new(source.clone(), store, create_test_options());
    let (events, callback) = recorder();

    let backup_id = orchestrator
        .backup_playlists("token", callback)
        .await
        .unwrap();

    // ceil(137 / 50) requests, the first page is not fetched twice
    assert_eq!(source.playlist_calls(), 3);
    assert_eq!(source.track_calls(), 0);

    let stored = orchestrator.store().get_playlists(backup_id).await.unwrap();
    assert_eq!(stored.len(), 137);

    let events = events.lock().unwrap();
    assert!(matches!(events.first(), Some(BackupEvent::BackupStart { .. })));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, BackupEvent::PlaylistsFound { total: 137 }))
    );
    let added = events
        .iter()
        .filter(|e| matches!(e, BackupEvent::PlaylistAdded { .. }))
        .count();
    assert_eq!(added, 137);
    assert!(matches!(
        events.last(),
        Some(BackupEvent::BackupSuccess { backup_id: id }) if *id == backup_id
    ));
}

#[tokio::test]
async fn test_backup_bounds_concurrent_page_fetches() {
    let source = FakeSource::new(&[0; 12]);
    let (_dir, store) = create_test_store().await;
    let mut options = create_test_options();
    options.playlist_page_limit = 1;
    options.max_concurrent_playlist_fetches = 5;
    let orchestrator = BackupOrchestrator::new(source.clone(), store, options);
    let (_events, callback) = recorder();

    let backup_id = orchestrator
        .backup_playlists("token", callback)
        .await
        .unwrap();

    assert_eq!(source.playlist_calls(), 12);
    assert!(source.peak_in_flight() <= 5);
    assert!(source.peak_in_flight() > 1);

    let stored = orchestrator.store().get_playlists(backup_id).await.unwrap();
    assert_eq!(stored.len(), 12);
}

#[tokio::test]
async fn test_backup_pages_through_tracks() {
    let source = FakeSource::new(&[7, 0]);
    let (_dir, store) = create_test_store().await;
    let mut options = create_test_options();
    options.tracks_page_limit = 3;
    let orchestrator = BackupOrchestrator::new(source.clone(), store, options);
    let (events, callback) = recorder();

    let backup_id = orchestrator
        .backup_playlists("token", callback)
        .await
        .unwrap();

    // Offsets 0, 3 and 6 for the first playlist, none for the empty one
    assert_eq!(source.track_calls(), 3);

    let store = orchestrator.store();
    let playlists = store.get_playlists(backup_id).await.unwrap();
    assert_eq!(playlists.len(), 2);

    let tracks = store.get_tracks(playlists[0].id).await.unwrap();
    assert_eq!(tracks.len(), 7);
    assert!(tracks.iter().all(|t| t.playlist_id == playlists[0].id));
    assert!(store.get_tracks(playlists[1].id).await.unwrap().is_empty());

    let added = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| {
            matches!(e, BackupEvent::TrackAdded { playlist_record_id, .. } if *playlist_record_id == playlists[0].id)
        })
        .count();
    assert_eq!(added, 7);
}

#[tokio::test]
async fn test_backup_retries_rate_limited_page() {
    let source = FakeSource::new(&[0; 3]).fail_playlists_once(0, ApiError::from_status(429));
    let (_dir, store) = create_test_store().await;
    let orchestrator = BackupOrchestrator::new(source.clone(), store, create_test_options());
    let (events, callback) = recorder();

    let backup_id = orchestrator
        .backup_playlists("token", callback)
        .await
        .unwrap();

    // The rate limited request is repeated once
    assert_eq!(source.playlist_calls(), 2);
    assert_eq!(
        orchestrator
            .store()
            .get_playlists(backup_id)
            .await
            .unwrap()
            .len(),
        3
    );

    let events = events.lock().unwrap();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, BackupEvent::RateLimited { attempt: 1, .. }))
    );
    assert!(matches!(events.last(), Some(BackupEvent::BackupSuccess { .. })));
}

#[tokio::test]
async fn test_backup_stops_on_bad_token() {
    let source = FakeSource::new(&[0; 3]).fail_playlists_once(1, ApiError::from_status(401));
    let (_dir, store) = create_test_store().await;
    let mut options = create_test_options();
    options.playlist_page_limit = 1;
    let orchestrator = BackupOrchestrator::new(source.clone(), store, options);
    let (events, callback) = recorder();

    let result = orchestrator.backup_playlists("token", callback).await;

    assert!(matches!(
        result,
        Err(BackupError::Api(ApiError::BadToken { status: 401 }))
    ));

    let events = events.lock().unwrap();
    assert!(matches!(events.last(), Some(BackupEvent::BackupError { .. })));
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, BackupEvent::BackupSuccess { .. }))
    );

    // Playlists written before the failure are kept
    let backups = orchestrator.store().get_backups().await.unwrap();
    assert_eq!(backups.len(), 1);
    let stored = orchestrator
        .store()
        .get_playlists(backups[0].id)
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn test_backup_rate_limit_exhaustion_fails() {
    let source = FakeSource::new(&[0; 1]).fail_playlists_once(0, ApiError::from_status(429));
    let (_dir, store) = create_test_store().await;
    let mut options = create_test_options();
    options.retry.max_retries = Some(0);
    let orchestrator = BackupOrchestrator::new(source.clone(), store, options);
    let (_events, callback) = recorder();

    let result = orchestrator.backup_playlists("token", callback).await;

    assert!(matches!(
        result,
        Err(BackupError::RetriesExhausted { attempts: 0, .. })
    ));
    assert_eq!(source.playlist_calls(), 1);
}

#[tokio::test]
async fn test_backup_cancelled() {
    let source = FakeSource::new(&[2; 4]);
    let (_dir, store) = create_test_store().await;
    let orchestrator = BackupOrchestrator::new(source.clone(), store, create_test_options());
    orchestrator.cancellation().cancel();
    let (events, callback) = recorder();

    let result = orchestrator.backup_playlists("token", callback).await;

    assert!(matches!(result, Err(BackupError::Cancelled)));
    assert_eq!(source.track_calls(), 0);

    let events = events.lock().unwrap();
    assert!(matches!(events.last(), Some(BackupEvent::BackupCancelled)));
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, BackupEvent::PlaylistAdded { .. }))
    );
}

#[tokio::test]
async fn test_backup_skips_entries_without_track() {
    let source = FakeSource::new(&[4]).without_tracks_at(&[1, 3]);
    let (_dir, store) = create_test_store_with(StoreOptions {
        missing_tracks: MissingTrackPolicy::Skip,
        ..Default::default()
    })
    .await;
    let orchestrator = BackupOrchestrator::new(source.clone(), store, create_test_options());
    let (events, callback) = recorder();

    let backup_id = orchestrator
        .backup_playlists("token", callback)
        .await
        .unwrap();

    let store = orchestrator.store();
    let playlists = store.get_playlists(backup_id).await.unwrap();
    let tracks = store.get_tracks(playlists[0].id).await.unwrap();
    let names: Vec<&str> = tracks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["p0-t0", "p0-t2"]);

    let events = events.lock().unwrap();
    let skipped = events
        .iter()
        .filter(|e| {
            matches!(e, BackupEvent::TrackSkipped { playlist_record_id, item }
                if *playlist_record_id == playlists[0].id && item.track.is_none())
        })
        .count();
    assert_eq!(skipped, 2);
    let added = events
        .iter()
        .filter(|e| matches!(e, BackupEvent::TrackAdded { .. }))
        .count();
    assert_eq!(added, 2);
    assert!(matches!(events.last(), Some(BackupEvent::BackupSuccess { .. })));
}

#[tokio::test]
async fn test_backup_reports_database_error() {
    let source = FakeSource::new(&[1; 2]);
    let (_dir, store) = create_test_store().await;
    // Clones share the pool, so closing one closes the orchestrator's store too
    store.clone().close().await;
    let orchestrator = BackupOrchestrator::new(source.clone(), store, create_test_options());
    let (events, callback) = recorder();

    let result = orchestrator.backup_playlists("token", callback).await;

    let error = match result {
        Err(BackupError::Store(error)) => error,
        other => panic!("expected a store error, got {:?}", other),
    };
    assert!(matches!(error, StoreError::Database(_)));

    // Nothing is fetched once the database is unusable
    assert_eq!(source.playlist_calls(), 0);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        BackupEvent::DatabaseError { error: reported } if *reported == error
    ));
    assert!(matches!(
        &events[1],
        BackupEvent::BackupError { error: BackupError::Store(reported) } if *reported == error
    ));
}
