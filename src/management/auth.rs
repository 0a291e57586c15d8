use std::path::{Path, PathBuf};

use crate::{config, error::TokenError, types::TokenFile};

/// Persists the access token as `{"token": <string|null>}` at a fixed path.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TokenStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the token file. Never fails: unreadable or malformed files yield an
    /// empty [`TokenFile`].
    pub async fn load(&self) -> TokenFile {
        let content = match async_fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "token.load_failed");
                return TokenFile::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "token.parse_failed");
                TokenFile::default()
            }
        }
    }

    /// Convenience for callers that only care about a usable token.
    pub async fn token(&self) -> Option<String> {
        self.load().await.token.filter(|t| !t.is_empty())
    }

    /// Overwrites the file with `token`, creating parent directories first.
    pub async fn save(&self, token: Option<&str>) -> Result<(), TokenError> {
        if let Some(parent) = self.path.parent() {
            async_fs::create_dir_all(parent).await?;
        }

        let file = TokenFile {
            token: token.map(str::to_string),
        };
        let json = serde_json::to_string(&file)?;
        async_fs::write(&self.path, json).await?;
        Ok(())
    }

    /// Nulls the stored token. The file itself is kept; nothing happens if it does
    /// not exist.
    pub async fn remove(&self) -> Result<(), TokenError> {
        if async_fs::metadata(&self.path).await.is_err() {
            return Ok(());
        }
        self.save(None).await
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new(config::token_path())
    }
}
