//! # API Module
//!
//! HTTP handlers served by the local redirect listener (see [`crate::server`]).
//!
//! ## Endpoints
//!
//! - [`redirect`] - Receives Spotify's OAuth redirect (`GET /?code=...`), exchanges
//!   the code for an access token and answers with a static HTML page. The route
//!   path follows the configured redirect URI.

mod callback;

pub(crate) use callback::redirect;
