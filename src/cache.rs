//! Cache-aside storage for fetched collections.
//!
//! `CacheStore` is the raw key/value backend with per-key expiry.
//! `CacheGateway` sits in front of it, speaks JSON, and never lets a backend
//! failure escape: a broken cache reads as a miss and a failed write is
//! logged and skipped.

use crate::error::CacheError;
use async_trait::async_trait;
use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Value for `key` if present and not expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    fn name(&self) -> &str;
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);";

/// SQLite-backed store; survives between runs.
pub struct SqliteCache {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteCache {
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(2).build(manager)?;
        pool.get()?.execute_batch(SCHEMA)?;
        Ok(Self { pool })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, CacheError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await?
    }
}

#[async_trait]
impl CacheStore for SqliteCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let key = key.to_string();
        self.blocking(move |conn| {
            let now = Utc::now().timestamp();
            let mut stmt = conn.prepare(
                "SELECT value FROM cache_entries WHERE key = ?1 AND expires_at > ?2 LIMIT 1",
            )?;
            let row = stmt
                .query_row(params![key, now], |r| r.get::<_, String>(0))
                .optional()?;
            Ok(row)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let key = key.to_string();
        let value = value.to_string();
        self.blocking(move |conn| {
            let expires_at = Utc::now().timestamp() + ttl.as_secs() as i64;
            conn.execute(
                "INSERT INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE
                 SET value = excluded.value, expires_at = excluded.expires_at",
                params![key, value, expires_at],
            )?;
            // Opportunistic sweep of anything already stale.
            conn.execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?1",
                params![Utc::now().timestamp()],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let key = key.to_string();
        self.blocking(move |conn| {
            conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

/// In-process store; lives for one run only.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant, Duration)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut map = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let fresh = map
            .get(key)
            .map(|(v, at, ttl)| (at.elapsed() < *ttl).then(|| v.clone()));
        match fresh {
            Some(Some(v)) => Ok(Some(v)),
            Some(None) => {
                map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut map = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(key.to_string(), (value.to_string(), Instant::now(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut map = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        map.remove(key);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// JSON cache-aside front for a `CacheStore`.
#[derive(Clone)]
pub struct CacheGateway {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl CacheGateway {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Cached value for `key`. Backend errors and undecodable entries are
    /// reported as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "cache read failed; fetching from network");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(v) => {
                info!(key = %key, backend = self.store.name(), "cache hit");
                Some(v)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    pub async fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                warn!(key = %key, error = %e, "could not serialize value for cache");
                return;
            }
        };
        match self.store.set(key, &raw, self.ttl).await {
            Ok(()) => debug!(key = %key, ttl_secs = self.ttl.as_secs(), "cache set"),
            Err(e) => warn!(key = %key, error = %e, "cache write failed"),
        }
    }

    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.store.delete(key).await
    }
}
