//! # CLI Module
//!
//! User-facing commands of spbackup. Each command takes the [`Context`] built once
//! in `main` and turns library results into coloured terminal output, spinners
//! and tables.
//!
//! ## Commands
//!
//! - [`auth`] - Runs the OAuth redirect flow and stores the access token
//! - [`backup`] - Backs up every playlist of the current user
//! - [`list_backups`] - Lists the backup runs stored for a user
//! - [`show_backup`] - Lists the playlists captured by one backup run
//! - [`show_tracks`] - Lists the tracks stored for one playlist record
//! - [`user`] - Shows the profile of the authenticated user
//! - [`logout`] - Forgets the stored access token
//!
//! ## Typical Session
//!
//! ```bash
//! spbackup auth                 # Authorize with Spotify
//! spbackup backup --name weekly # Capture all playlists
//! spbackup backups              # List previous runs
//! spbackup backups show 3       # Playlists of run 3
//! ```
//!
//! ## Errors
//!
//! Commands return [`crate::Res`]; `main` prints the error and exits. Expected
//! conditions such as an empty backup list are reported with `warning!` instead.

mod auth;
mod backup;
mod backups;
mod session;
mod user;

pub use auth::{auth, logout};
pub use backup::backup;
pub use backups::{list_backups, show_backup, show_tracks};
pub use user::user;

use crate::{Res, config::Settings, management::TokenStore, spotify::SpotifyClient};

/// Everything a command needs, created once per process.
#[derive(Debug, Clone)]
pub struct Context {
    pub settings: Settings,
    pub client: SpotifyClient,
    pub tokens: TokenStore,
}

impl Context {
    /// Builds the HTTP client from `settings` and uses the default token location.
    pub fn new(settings: Settings) -> Res<Self> {
        let client = SpotifyClient::new(settings.endpoints.clone(), settings.http_timeout)?;
        Ok(Self {
            settings,
            client,
            tokens: TokenStore::default(),
        })
    }
}
