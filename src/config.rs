use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// KEY=VALUE file holding CLIENT_ID, CLIENT_SECRET and the tokens.
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    // Endpoints
    #[serde(default = "default_auth_base")]
    pub auth_base: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_search_limit")]
    pub search_limit: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// "sqlite" or "memory"
    #[serde(default = "default_cache_backend")]
    pub cache_backend: String,
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_env_file() -> PathBuf { ".env".into() }
fn default_redirect_uri() -> String { "https://spotify.com".into() }
fn default_auth_base() -> String { "https://accounts.spotify.com".into() }
fn default_api_base() -> String { "https://api.spotify.com/v1".into() }
fn default_page_size() -> u32 { 50 }
fn default_search_limit() -> u32 { 5 }
fn default_request_timeout() -> u64 { 30 }
fn default_cache_backend() -> String { "sqlite".into() }
fn default_cache_ttl() -> u64 { 3600 }

fn default_scopes() -> Vec<String> {
    vec!["user-read-private", "user-read-email", "playlist-read-private"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("playlist-finder")
}

fn default_cache_path() -> PathBuf { data_dir().join("cache.db") }
fn default_log_dir() -> PathBuf { data_dir().join("logs") }

impl Default for Config {
    fn default() -> Self {
        Self {
            env_file: default_env_file(),
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
            auth_base: default_auth_base(),
            api_base: default_api_base(),
            page_size: default_page_size(),
            search_limit: default_search_limit(),
            request_timeout_secs: default_request_timeout(),
            cache_backend: default_cache_backend(),
            cache_path: default_cache_path(),
            cache_ttl_secs: default_cache_ttl(),
            log_dir: default_log_dir(),
        }
    }
}

impl Config {
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&s)?;
        Ok(cfg)
    }

    /// Default location: `<config dir>/playlist-finder/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("playlist-finder").join("config.toml"))
    }

    /// SPOTIFY_AUTH_BASE and SPOTIFY_API_BASE override the endpoints.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(base) = std::env::var("SPOTIFY_AUTH_BASE") {
            self.auth_base = base;
        }
        if let Ok(base) = std::env::var("SPOTIFY_API_BASE") {
            self.api_base = base;
        }
    }
}
