use std::path::PathBuf;

use tabled::Table;

use crate::{
    Res,
    cli::{
        Context,
        session::{current_user, valid_token},
    },
    config,
    store::{BackupStore, DATE_FORMAT},
    types::{BackupTableRow, PlaylistTableRow, TrackTableRow},
    utils, warning,
};

/// Lists the backup runs stored for `user`, or for the authenticated user.
pub async fn list_backups(ctx: &Context, user: Option<String>) -> Res<()> {
    let Some(store) = open_store(ctx, user).await? else {
        return Ok(());
    };

    let backups = store.get_backups().await?;
    store.close().await;

    if backups.is_empty() {
        warning!("No backups yet. Run `spbackup backup` to create one");
        return Ok(());
    }

    let rows: Vec<BackupTableRow> = backups
        .into_iter()
        .map(|b| BackupTableRow {
            id: b.id,
            date: b.date_added.format("%Y-%m-%d %H:%M").to_string(),
            name: b.name,
            description: utils::truncate(&b.description, 50),
        })
        .collect();

    println!("{}", Table::new(rows));
    Ok(())
}

/// Lists the playlists captured by backup run `id`.
pub async fn show_backup(ctx: &Context, user: Option<String>, id: i64) -> Res<()> {
    let Some(store) = open_store(ctx, user).await? else {
        return Ok(());
    };

    let Some(run) = store.get_backup(id).await? else {
        store.close().await;
        return Err(format!("backup #{id} does not exist").into());
    };
    let playlists = store.get_playlists(id).await?;
    store.close().await;

    println!(
        "Backup #{} \"{}\" from {}",
        run.id,
        run.name,
        run.date_added.format(DATE_FORMAT)
    );

    let rows: Vec<PlaylistTableRow> = playlists
        .into_iter()
        .map(|p| PlaylistTableRow {
            id: p.id,
            name: utils::truncate(&p.name, 40),
            tracks: p.total_songs,
            uri: p.uri,
        })
        .collect();

    println!("{}", Table::new(rows));
    Ok(())
}

/// Lists the tracks stored for playlist record `playlist`.
pub async fn show_tracks(ctx: &Context, user: Option<String>, playlist: i64) -> Res<()> {
    let Some(store) = open_store(ctx, user).await? else {
        return Ok(());
    };

    let tracks = store.get_track_details(playlist).await?;
    store.close().await;

    if tracks.is_empty() {
        warning!("No tracks stored for playlist record {}", playlist);
        return Ok(());
    }

    let rows: Vec<TrackTableRow> = tracks
        .into_iter()
        .map(|t| TrackTableRow {
            name: utils::truncate(&t.name, 40),
            artists: utils::truncate(&t.artists, 40),
            album: utils::truncate(&t.album, 30),
            uri: t.uri,
        })
        .collect();

    println!("{}", Table::new(rows));
    Ok(())
}

/// Opens the database of `user`, looking the user up through the API when absent.
///
/// Returns `None` after a warning when no database exists yet.
async fn open_store(ctx: &Context, user: Option<String>) -> Res<Option<BackupStore>> {
    let path = database_path(ctx, user).await?;
    if async_fs::metadata(&path).await.is_err() {
        warning!("No backup database at {}", path.display());
        return Ok(None);
    }

    let store = BackupStore::open(&path, ctx.settings.store_options()).await?;
    store.create_tables().await?;
    Ok(Some(store))
}

async fn database_path(ctx: &Context, user: Option<String>) -> Res<PathBuf> {
    let user_id = match user {
        Some(id) => id,
        None => {
            let token = valid_token(ctx).await?;
            current_user(ctx, &token).await?.id
        }
    };
    Ok(config::backup_database_path(&user_id))
}
