pub mod executor;
pub mod spotify;
pub mod spotify_auth;

use crate::config::Config;
use reqwest::Client;
use std::time::Duration;

/// Shared HTTP client. Every request is bounded by the configured timeout.
pub fn http_client(cfg: &Config) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(cfg.request_timeout_secs.max(1)))
        .user_agent(concat!("playlist-finder/", env!("CARGO_PKG_VERSION")))
        .build()
}
