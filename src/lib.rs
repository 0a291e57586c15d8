//! spbackup library
//!
//! Backs up a Spotify user's playlists into a local SQLite database. The pipeline
//! authenticates through the OAuth 2.0 authorization-code flow, then pages through
//! the user's playlists and each playlist's tracks while respecting rate limits.
//!
//! # Modules
//!
//! - `api` - HTTP handlers for the local redirect listener
//! - `backup` - The backup orchestrator and its retry policy
//! - `cli` - Command-line interface implementations
//! - `config` - Configuration management and environment variables
//! - `error` - Typed errors for every layer
//! - `logging` - `tracing` subscriber setup
//! - `management` - Persisted access token
//! - `server` - Single-use local HTTP listener for the OAuth redirect
//! - `spotify` - Spotify Web API client implementation
//! - `store` - SQLite backup database
//! - `types` - Data structures and type definitions
//! - `utils` - Utility functions and helpers
//!
//! # Example
//!
//! ```
//! use spbackup::{config, cli};
//!
//! #[tokio::main]
//! async fn main() -> spbackup::Res<()> {
//!     config::load_env().await?;
//!     let ctx = cli::Context::new(config::Settings::from_env()?)?;
//!     cli::backup(&ctx, None, None).await
//! }
//! ```

pub mod api;
pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod management;
pub mod server;
pub mod spotify;
pub mod store;
pub mod types;
pub mod utils;

/// Boxed error result used by the command layer.
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

// Terminal output. Each macro takes `format!` arguments and prefixes the line with a
// coloured marker; `warning!` and `error!` write to stderr.

#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints the message and exits with status 1. Destructors do not run, so flush
/// anything buffered (such as the log guard) first.
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
