//! # Backup Orchestrator
//!
//! Drives one backup run: records a [`crate::store::BackupRun`], walks the user's
//! playlists page by page and, for every playlist, walks its tracks page by page,
//! writing each item through [`BackupStore`] as soon as it arrives.
//!
//! ## Concurrency
//!
//! Pages are fetched in batches. A batch of at most `max_concurrent_*` page futures
//! is polled together on the calling task and fully awaited before the next batch
//! starts, so batch *N* always completes before batch *N+1* begins. A failure in
//! one page does not interrupt its siblings; the first error is returned once the
//! whole batch has settled.
//!
//! Track pagination for a playlist happens inside the page task that stored the
//! playlist, so up to `max_concurrent_playlist_fetches * max_concurrent_track_fetches`
//! requests may be in flight.
//!
//! ## Rate Limiting
//!
//! Every page fetch goes through [`RetryPolicy::run`]: `429` responses are retried
//! after a linearly growing delay, everything else propagates.
//!
//! ## Cancellation
//!
//! The [`CancellationToken`] is checked before every batch and raced against every
//! retry sleep. Rows already written stay written.

mod events;
mod retry;

pub use events::{BackupCallback, BackupEvent};
pub use retry::{RetryError, RetryPolicy};

use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ApiError, BackupError, StoreError},
    spotify::PlaylistSource,
    store::BackupStore,
    types::{Page, PlaylistItem, TrackItem},
    utils,
};

/// Largest page size accepted by the playlists endpoint.
pub const MAX_PLAYLIST_PAGE_LIMIT: u32 = 50;
/// Largest page size accepted by the playlist tracks endpoint.
pub const MAX_TRACKS_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct BackupOptions {
    pub name: String,
    pub description: String,
    pub playlist_page_limit: u32,
    pub tracks_page_limit: u32,
    pub max_concurrent_playlist_fetches: usize,
    pub max_concurrent_track_fetches: usize,
    pub retry: RetryPolicy,
}

impl BackupOptions {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            playlist_page_limit: MAX_PLAYLIST_PAGE_LIMIT,
            tracks_page_limit: 50,
            max_concurrent_playlist_fetches: 5,
            max_concurrent_track_fetches: 5,
            retry: RetryPolicy::default(),
        }
    }

    fn playlist_limit(&self) -> u32 {
        self.playlist_page_limit.clamp(1, MAX_PLAYLIST_PAGE_LIMIT)
    }

    fn tracks_limit(&self) -> u32 {
        self.tracks_page_limit.clamp(1, MAX_TRACKS_PAGE_LIMIT)
    }

    fn playlist_batch(&self) -> usize {
        self.max_concurrent_playlist_fetches.max(1)
    }

    fn track_batch(&self) -> usize {
        self.max_concurrent_track_fetches.max(1)
    }
}

impl From<RetryError<ApiError>> for BackupError {
    fn from(e: RetryError<ApiError>) -> Self {
        match e {
            RetryError::Failed(e) => BackupError::Api(e),
            RetryError::Exhausted { attempts, last } => {
                BackupError::RetriesExhausted { attempts, last }
            }
            RetryError::Cancelled => BackupError::Cancelled,
        }
    }
}

/// Per-run values shared by every page task.
#[derive(Clone, Copy)]
struct Run<'a> {
    token: &'a str,
    callback: &'a BackupCallback,
    backup_id: i64,
}

impl Run<'_> {
    fn emit(&self, event: BackupEvent) {
        (self.callback)(event);
    }
}

pub struct BackupOrchestrator<S> {
    source: S,
    store: BackupStore,
    options: BackupOptions,
    cancel: CancellationToken,
}

impl<S: PlaylistSource> BackupOrchestrator<S> {
    pub fn new(source: S, store: BackupStore, options: BackupOptions) -> Self {
        Self {
            source,
            store,
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts the run when cancelled.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &BackupStore {
        &self.store
    }

    /// Backs up every playlist of the user owning `token`.
    ///
    /// Emits [`BackupEvent::BackupSuccess`], [`BackupEvent::BackupCancelled`] or
    /// [`BackupEvent::BackupError`] exactly once at the end and returns the id of
    /// the backup run on success. Partial data of a failed run is kept.
    pub async fn backup_playlists(
        &self,
        token: &str,
        callback: BackupCallback,
    ) -> Result<i64, BackupError> {
        tracing::info!(name = %self.options.name, "backup.start");

        match self.run(token, &callback).await {
            Ok(backup_id) => {
                tracing::info!(backup_id, "backup.success");
                callback(BackupEvent::BackupSuccess { backup_id });
                Ok(backup_id)
            }
            Err(BackupError::Cancelled) => {
                tracing::warn!("backup.cancelled");
                callback(BackupEvent::BackupCancelled);
                Err(BackupError::Cancelled)
            }
            Err(error) => {
                tracing::error!(error = %error, "backup.failed");
                callback(BackupEvent::BackupError {
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    async fn run(&self, token: &str, callback: &BackupCallback) -> Result<i64, BackupError> {
        self.stored(callback, self.store.create_tables().await)?;
        let backup_id = self.stored(
            callback,
            self.store
                .add_backup(&self.options.name, &self.options.description)
                .await,
        )?;

        let run = Run {
            token,
            callback,
            backup_id,
        };
        run.emit(BackupEvent::BackupStart { backup_id });

        let limit = self.options.playlist_limit();
        let first = self.fetch_playlists(run, 0, limit).await?;
        let total = first.total;
        tracing::info!(backup_id, total, "backup.playlists_found");
        run.emit(BackupEvent::PlaylistsFound { total });

        // The first page is reused for offset 0 instead of being fetched twice.
        let mut first = Some(first);
        for batch in utils::page_offsets(total, limit).chunks(self.options.playlist_batch()) {
            self.checkpoint()?;
            let tasks = batch.iter().map(|&offset| {
                let prefetched = if offset == 0 { first.take() } else { None };
                self.playlist_page(run, offset, limit, prefetched)
            });
            settle(join_all(tasks).await)?;
        }

        Ok(backup_id)
    }

    async fn playlist_page(
        &self,
        run: Run<'_>,
        offset: u32,
        limit: u32,
        prefetched: Option<Page<PlaylistItem>>,
    ) -> Result<(), BackupError> {
        let page = match prefetched {
            Some(page) => page,
            None => self.fetch_playlists(run, offset, limit).await?,
        };

        for item in page.items {
            let record_id = self.stored(
                run.callback,
                self.store.insert_playlist(&item, run.backup_id).await,
            )?;
            tracing::debug!(playlist = %item.id, record_id, "backup.playlist_added");

            let playlist_id = item.id.clone();
            let total_tracks = item.tracks.total;
            run.emit(BackupEvent::PlaylistAdded { record_id, item });

            self.backup_tracks(run, &playlist_id, record_id, total_tracks)
                .await?;
        }

        Ok(())
    }

    async fn backup_tracks(
        &self,
        run: Run<'_>,
        playlist_id: &str,
        record_id: i64,
        total: u32,
    ) -> Result<(), BackupError> {
        let limit = self.options.tracks_limit();
        for batch in utils::page_offsets(total, limit).chunks(self.options.track_batch()) {
            self.checkpoint()?;
            let tasks = batch
                .iter()
                .map(|&offset| self.track_page(run, playlist_id, record_id, offset, limit));
            settle(join_all(tasks).await)?;
        }
        Ok(())
    }

    async fn track_page(
        &self,
        run: Run<'_>,
        playlist_id: &str,
        playlist_record_id: i64,
        offset: u32,
        limit: u32,
    ) -> Result<(), BackupError> {
        let page = self.fetch_tracks(run, playlist_id, offset, limit).await?;

        for item in page.items {
            let inserted = self.stored(
                run.callback,
                self.store.insert_track(&item, playlist_record_id).await,
            )?;
            match inserted {
                Some(record_id) => run.emit(BackupEvent::TrackAdded {
                    record_id,
                    playlist_record_id,
                    item,
                }),
                None => run.emit(BackupEvent::TrackSkipped {
                    playlist_record_id,
                    item,
                }),
            }
        }

        Ok(())
    }

    async fn fetch_playlists(
        &self,
        run: Run<'_>,
        offset: u32,
        limit: u32,
    ) -> Result<Page<PlaylistItem>, BackupError> {
        let page = self
            .options
            .retry
            .run(
                &self.cancel,
                move || self.source.playlists(run.token, offset, limit),
                ApiError::is_rate_limit,
                move |delay, attempt| self.rate_limited(run, delay, attempt),
            )
            .await?;
        Ok(page)
    }

    async fn fetch_tracks(
        &self,
        run: Run<'_>,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<TrackItem>, BackupError> {
        let page = self
            .options
            .retry
            .run(
                &self.cancel,
                move || {
                    self.source
                        .playlist_tracks(run.token, playlist_id, offset, limit)
                },
                ApiError::is_rate_limit,
                move |delay, attempt| self.rate_limited(run, delay, attempt),
            )
            .await?;
        Ok(page)
    }

    fn rate_limited(&self, run: Run<'_>, delay: Duration, attempt: u32) {
        tracing::warn!(delay = ?delay, attempt, "backup.rate_limited");
        run.emit(BackupEvent::RateLimited { delay, attempt });
    }

    fn stored<T>(
        &self,
        callback: &BackupCallback,
        result: Result<T, StoreError>,
    ) -> Result<T, BackupError> {
        result.map_err(|error| {
            callback(BackupEvent::DatabaseError {
                error: error.clone(),
            });
            BackupError::Store(error)
        })
    }

    fn checkpoint(&self) -> Result<(), BackupError> {
        if self.cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }
        Ok(())
    }
}

/// Returns the first failure of a settled batch and logs the rest.
fn settle(results: Vec<Result<(), BackupError>>) -> Result<(), BackupError> {
    let mut first = None;
    for result in results {
        if let Err(error) = result {
            if first.is_none() {
                first = Some(error);
            } else {
                tracing::warn!(error = %error, "backup.sibling_failed");
            }
        }
    }
    first.map_or(Ok(()), Err)
}
