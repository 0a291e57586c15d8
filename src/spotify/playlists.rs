use url::Url;

use super::{SpotifyClient, send_json};
use crate::{
    error::ApiError,
    types::{Page, PlaylistItem, TrackItem},
};

impl SpotifyClient {
    /// Fetches one page of the current user's playlists.
    ///
    /// # Arguments
    ///
    /// * `token` - Bearer access token
    /// * `offset` - Index of the first playlist to return
    /// * `limit` - Page size, at most 50
    ///
    /// # Example
    ///
    /// ```
    /// let page = client.get_playlists(&token, 0, 50).await?;
    /// println!("{} of {} playlists", page.items.len(), page.total);
    /// ```
    pub async fn get_playlists(
        &self,
        token: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<PlaylistItem>, ApiError> {
        let url = self.api_url("me/playlists")?;
        let request = self
            .get(token, url)
            .query(&[("offset", offset), ("limit", limit)]);
        send_json(request).await
    }

    /// Fetches a playlist page from an explicit pagination URL such as `next`.
    pub async fn get_playlists_from_url(
        &self,
        token: &str,
        url: &str,
    ) -> Result<Page<PlaylistItem>, ApiError> {
        send_json(self.get(token, parse_page_url(url)?)).await
    }

    /// Fetches one page of a playlist's tracks.
    ///
    /// # Arguments
    ///
    /// * `token` - Bearer access token
    /// * `playlist_id` - Spotify id of the playlist
    /// * `offset` - Index of the first item to return
    /// * `limit` - Page size, at most 100
    pub async fn get_playlist_tracks(
        &self,
        token: &str,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<TrackItem>, ApiError> {
        let url = self.api_url(&format!("playlists/{playlist_id}/tracks"))?;
        let request = self
            .get(token, url)
            .query(&[("offset", offset), ("limit", limit)]);
        send_json(request).await
    }

    /// Fetches a track page from an explicit pagination URL such as `next`.
    pub async fn get_tracks_from_url(
        &self,
        token: &str,
        url: &str,
    ) -> Result<Page<TrackItem>, ApiError> {
        send_json(self.get(token, parse_page_url(url)?)).await
    }
}

fn parse_page_url(url: &str) -> Result<Url, ApiError> {
    Url::parse(url).map_err(|e| ApiError::Transport(format!("invalid pagination url {url}: {e}")))
}
