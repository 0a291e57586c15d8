use clap::{
    CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};

use spbackup::{cli, config, error, logging, warning};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  author=env!("CARGO_PKG_AUTHORS"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Authorize with Spotify API
    Auth,

    /// Back up all playlists of the current user
    Backup(BackupOptions),

    /// Browse stored backups
    Backups(BackupsOptions),

    /// Show the authenticated user
    User,

    /// Forget the stored access token
    Logout,

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
pub struct BackupOptions {
    /// Name of the backup, defaults to the current date and time
    #[clap(long)]
    pub name: Option<String>,

    /// Description stored with the backup
    #[clap(long)]
    pub description: Option<String>,
}

#[derive(Parser, Debug, Clone)]
#[command(about = "Browse stored backups")]
pub struct BackupsOptions {
    /// Spotify user id whose database to read (skips the profile lookup)
    #[clap(long, global = true)]
    pub user: Option<String>,

    /// Subcommands under `backups` (e.g., `show`)
    #[command(subcommand)]
    pub command: Option<BackupsSubcommand>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum BackupsSubcommand {
    /// List the playlists of a backup
    Show {
        /// Backup id
        id: i64,
    },

    /// List the tracks of a stored playlist
    Tracks {
        /// Playlist record id as shown by `backups show`
        playlist: i64,
    },
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Command::Completions(opt) = &cli.command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(opt.shell, &mut cmd, name, &mut std::io::stdout());
        return;
    }

    if let Err(e) = config::load_env().await {
        warning!("Cannot load environment. Err: {}", e);
    }

    let settings = match config::Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => error!("Invalid configuration. Err: {}", e),
    };

    let logging_guard = match logging::init_logging(&settings.log_filter, &config::log_dir()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            warning!("Cannot initialize logging. Err: {}", e);
            None
        }
    };

    let ctx = match cli::Context::new(settings) {
        Ok(ctx) => ctx,
        Err(e) => error!("Cannot create HTTP client. Err: {}", e),
    };

    let result = match cli.command {
        Command::Auth => cli::auth(&ctx).await,
        Command::Backup(opt) => cli::backup(&ctx, opt.name, opt.description).await,
        Command::Backups(opt) => match opt.command {
            Some(BackupsSubcommand::Show { id }) => cli::show_backup(&ctx, opt.user, id).await,
            Some(BackupsSubcommand::Tracks { playlist }) => {
                cli::show_tracks(&ctx, opt.user, playlist).await
            }
            None => cli::list_backups(&ctx, opt.user).await,
        },
        Command::User => cli::user(&ctx).await,
        Command::Logout => cli::logout(&ctx).await,
        Command::Completions(_) => Ok(()),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command.failed");
        drop(logging_guard);
        error!("{}", e);
    }
}
