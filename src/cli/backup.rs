use std::sync::{
    Arc,
    atomic::{AtomicU32, AtomicU64, Ordering},
};

use indicatif::ProgressBar;
use tokio_util::sync::CancellationToken;

use crate::{
    Res,
    backup::{BackupCallback, BackupEvent, BackupOrchestrator},
    cli::{
        Context,
        auth::authenticate,
        session::{forget_rejected_token, valid_token},
    },
    config,
    error::{ApiError, BackupError, StoreError},
    info,
    store::BackupStore,
    success, utils, warning,
};

/// Backs up every playlist of the authenticated user into their database.
///
/// A token Spotify answers with `401` is erased and the redirect flow runs once
/// more before the backup restarts. Ctrl-C cancels the run; rows written until
/// then are kept.
///
/// # Arguments
///
/// * `ctx` - The command context
/// * `name` - Backup name, defaults to one derived from the current time
/// * `description` - Free-form description, empty by default
pub async fn backup(ctx: &Context, name: Option<String>, description: Option<String>) -> Res<()> {
    let name = name.unwrap_or_else(utils::default_backup_name_now);
    let description = description.unwrap_or_default();
    let mut reauthenticated = false;

    loop {
        let token = valid_token(ctx).await?;

        match run_backup(ctx, &token, &name, &description).await {
            Ok(()) => return Ok(()),
            Err(BackupError::Api(ApiError::BadToken { .. })) if !reauthenticated => {
                warning!("Spotify rejected the stored token, authenticating again");
                ctx.tokens.remove().await?;
                authenticate(ctx).await?;
                reauthenticated = true;
            }
            Err(BackupError::Api(e)) => {
                forget_rejected_token(ctx, &e).await;
                if e.invalidates_token() {
                    warning!("Stored token erased. Run `spbackup auth` to log in again");
                }
                return Err(e.into());
            }
            Err(BackupError::Cancelled) => {
                warning!("Backup cancelled. Data written so far was kept");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn run_backup(
    ctx: &Context,
    token: &str,
    name: &str,
    description: &str,
) -> Result<(), BackupError> {
    let user = ctx.client.get_user_info(token).await?;
    let db_path = config::backup_database_path(&user.id);

    let progress = Arc::new(BackupProgress::new());
    let store = BackupStore::open(&db_path, ctx.settings.store_options())
        .await?
        .with_error_handler({
            let progress = progress.clone();
            Arc::new(move |e: &StoreError| progress.warn(&format!("Database error: {e}")))
        });

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let orchestrator = BackupOrchestrator::new(
        ctx.client.clone(),
        store,
        ctx.settings.backup_options(name, description),
    )
    .with_cancellation(cancel);

    let callback: BackupCallback = {
        let progress = progress.clone();
        Arc::new(move |event| progress.handle(event))
    };

    let result = orchestrator.backup_playlists(token, callback).await;
    ctrl_c.abort();
    orchestrator.store().close().await;
    progress.finish();

    let backup_id = result?;
    success!(
        "Backup #{} \"{}\" saved: {} playlists, {} tracks",
        backup_id,
        name,
        progress.playlists.load(Ordering::Relaxed),
        progress.tracks.load(Ordering::Relaxed)
    );
    let skipped = progress.skipped.load(Ordering::Relaxed);
    if skipped > 0 {
        warning!("{} entries without track data were skipped", skipped);
    }
    info!("Database: {}", db_path.display());
    Ok(())
}

/// Spinner fed by [`BackupEvent`]s.
struct BackupProgress {
    bar: ProgressBar,
    total_playlists: AtomicU32,
    playlists: AtomicU32,
    tracks: AtomicU64,
    skipped: AtomicU64,
}

impl BackupProgress {
    fn new() -> Self {
        Self {
            bar: utils::spinner("Starting backup..."),
            total_playlists: AtomicU32::new(0),
            playlists: AtomicU32::new(0),
            tracks: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    fn handle(&self, event: BackupEvent) {
        match event {
            BackupEvent::BackupStart { backup_id } => {
                self.bar
                    .set_message(format!("Backup #{backup_id}: fetching playlists..."));
            }
            BackupEvent::PlaylistsFound { total } => {
                self.total_playlists.store(total, Ordering::Relaxed);
            }
            BackupEvent::PlaylistAdded { item, .. } => {
                self.playlists.fetch_add(1, Ordering::Relaxed);
                self.bar.set_message(format!(
                    "[{}/{}] {}",
                    self.playlists.load(Ordering::Relaxed),
                    self.total_playlists.load(Ordering::Relaxed),
                    utils::truncate(&item.name, 40)
                ));
            }
            BackupEvent::TrackAdded { .. } => {
                self.tracks.fetch_add(1, Ordering::Relaxed);
            }
            BackupEvent::TrackSkipped { .. } => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            BackupEvent::RateLimited { delay, attempt } => {
                self.bar.set_message(format!(
                    "Rate limited, retry {} in {:.1}s...",
                    attempt,
                    delay.as_secs_f64()
                ));
            }
            // Outcomes are reported once the run returns; store errors by the store handler.
            BackupEvent::BackupSuccess { .. }
            | BackupEvent::BackupCancelled
            | BackupEvent::BackupError { .. }
            | BackupEvent::DatabaseError { .. } => {}
        }
    }

    fn warn(&self, message: &str) {
        self.bar.suspend(|| warning!("{}", message));
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
