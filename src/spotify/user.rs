use super::{SpotifyClient, send_json};
use crate::{error::ApiError, types::User};

impl SpotifyClient {
    /// Looks up the profile of the user owning `token`.
    ///
    /// The returned id selects the per-user backup database, see
    /// [`crate::config::backup_database_path`].
    pub async fn get_user_info(&self, token: &str) -> Result<User, ApiError> {
        let url = self.api_url("me")?;
        send_json(self.get(token, url)).await
    }
}
