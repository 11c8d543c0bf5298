use crate::api::spotify::SpotifyApi;
use crate::cache::CacheGateway;
use crate::error::FetchError;
use crate::models::{Playlist, Track};
use crate::pagination::fetch_all;
use tracing::info;

/// Cache key for the user's playlists.
pub const PLAYLISTS_KEY: &str = "playlists";
/// Cache key for the flattened tracks of every playlist.
pub const TRACKS_KEY: &str = "all_tracks";

/// Builds the playlist and track collections, cache first.
///
/// Keys are not namespaced by account; this tool serves one user.
pub struct CatalogFetcher {
    api: SpotifyApi,
    cache: CacheGateway,
    page_size: u32,
}

impl CatalogFetcher {
    pub fn new(api: SpotifyApi, cache: CacheGateway, page_size: u32) -> Self {
        Self { api, cache, page_size }
    }

    pub fn cache(&self) -> &CacheGateway {
        &self.cache
    }

    pub async fn get_playlists(&self) -> Result<Vec<Playlist>, FetchError> {
        info!("Fetching playlists...");
        if let Some(cached) = self.cache.get_json::<Vec<Playlist>>(PLAYLISTS_KEY).await {
            return Ok(cached);
        }
        let api = &self.api;
        let playlists = fetch_all(self.page_size, move |offset, limit| {
            api.playlists_page(offset, limit)
        })
        .await?;
        info!(count = playlists.len(), "fetched playlists");
        self.cache.put_json(PLAYLISTS_KEY, &playlists).await;
        Ok(playlists)
    }

    /// Every track of every playlist, in playlist order then API order.
    pub async fn get_tracks(&self, playlists: &[Playlist]) -> Result<Vec<Track>, FetchError> {
        if let Some(cached) = self.cache.get_json::<Vec<Track>>(TRACKS_KEY).await {
            return Ok(cached);
        }
        let api = &self.api;
        let mut tracks = Vec::new();
        for playlist in playlists {
            info!("Fetching tracks from {}", playlist.name);
            let page_tracks = fetch_all(self.page_size, move |offset, limit| {
                api.playlist_tracks_page(playlist, offset, limit)
            })
            .await?;
            tracks.extend(page_tracks);
        }
        info!(count = tracks.len(), "Fetched all tracks.");
        self.cache.put_json(TRACKS_KEY, &tracks).await;
        Ok(tracks)
    }

    /// Drop both cached collections so the next run refetches.
    pub async fn clear_cache(&self) -> Result<(), crate::error::CacheError> {
        self.cache.invalidate(PLAYLISTS_KEY).await?;
        self.cache.invalidate(TRACKS_KEY).await
    }
}
