use crate::api::executor::ResilientExecutor;
use crate::api::spotify::SpotifyApi;
use crate::api::spotify_auth::AuthClient;
use crate::cache::{CacheGateway, CacheStore, MemoryCache, SqliteCache};
use crate::catalog::CatalogFetcher;
use crate::config::Config;
use crate::error::FetchError;
use crate::matcher::find_playlists;
use crate::models::TrackCandidate;
use crate::tokens::TokenStore;
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Open the cache backend named by `cfg.cache_backend`.
pub fn open_cache(cfg: &Config) -> Result<Arc<dyn CacheStore>> {
    match cfg.cache_backend.as_str() {
        "sqlite" => {
            let cache = SqliteCache::open(&cfg.cache_path)
                .with_context(|| format!("opening cache at {}", cfg.cache_path.display()))?;
            Ok(Arc::new(cache))
        }
        "memory" => Ok(Arc::new(MemoryCache::new())),
        other => Err(anyhow!("unknown cache_backend '{}'; expected 'sqlite' or 'memory'", other)),
    }
}

/// One configured pipeline: auth, API access, cached catalog and matching.
pub struct Finder {
    auth: Arc<AuthClient>,
    api: SpotifyApi,
    catalog: CatalogFetcher,
    search_limit: u32,
}

impl Finder {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let cache = open_cache(cfg)?;
        Self::with_cache(cfg, cache)
    }

    pub fn with_cache(cfg: &Config, cache: Arc<dyn CacheStore>) -> Result<Self> {
        let client = crate::api::http_client(cfg).context("building HTTP client")?;
        let store = TokenStore::open(&cfg.env_file)
            .with_context(|| format!("reading settings from {}", cfg.env_file.display()))?;
        let auth = Arc::new(AuthClient::new(client.clone(), cfg, store)?);
        let api = SpotifyApi::new(client, &cfg.api_base, ResilientExecutor::new(auth.clone()));
        let gateway = CacheGateway::new(cache, Duration::from_secs(cfg.cache_ttl_secs));
        let catalog = CatalogFetcher::new(api.clone(), gateway, cfg.page_size);
        info!(
            api_base = %cfg.api_base,
            backend = %cfg.cache_backend,
            "finder ready"
        );
        Ok(Self {
            auth,
            api,
            catalog,
            search_limit: cfg.search_limit,
        })
    }

    pub fn auth(&self) -> &Arc<AuthClient> {
        &self.auth
    }

    pub fn catalog(&self) -> &CatalogFetcher {
        &self.catalog
    }

    pub async fn search(
        &self,
        song: &str,
        artist: &str,
    ) -> Result<Vec<TrackCandidate>, FetchError> {
        self.api.search_tracks(song, artist, self.search_limit).await
    }

    /// Playlists containing `song`: playlists, then their tracks, then match.
    pub async fn locate(&self, song: &str) -> Result<BTreeSet<String>, FetchError> {
        let playlists = self.catalog.get_playlists().await?;
        let tracks = self.catalog.get_tracks(&playlists).await?;
        Ok(find_playlists(song, &tracks))
    }
}
