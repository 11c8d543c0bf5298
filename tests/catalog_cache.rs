use async_trait::async_trait;
use mockito::{Matcher, Server, ServerGuard};
use playlist_finder::cache::{CacheStore, MemoryCache};
use playlist_finder::catalog::{PLAYLISTS_KEY, TRACKS_KEY};
use playlist_finder::config::Config;
use playlist_finder::error::{CacheError, FetchError};
use playlist_finder::finder::Finder;
use playlist_finder::models::Playlist;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const ENV: &str = "CLIENT_ID=id\nCLIENT_SECRET=secret\nACCESS_TOKEN=tok\nREFRESH_TOKEN=ref\n";

fn finder(base: &str, cache: Arc<dyn CacheStore>) -> (TempDir, Finder) {
    let td = tempfile::tempdir().expect("tmpdir");
    let env_path = td.path().join(".env");
    std::fs::write(&env_path, ENV).expect("write env");
    let cfg = Config {
        env_file: env_path,
        auth_base: base.to_string(),
        api_base: base.to_string(),
        cache_backend: "memory".into(),
        page_size: 2,
        ..Config::default()
    };
    let finder = Finder::with_cache(&cfg, cache).expect("finder");
    (td, finder)
}

fn page_query(offset: u32) -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("limit".into(), "2".into()),
        Matcher::UrlEncoded("offset".into(), offset.to_string()),
    ])
}

/// Two playlist pages: [pl1, pl2] then [pl3].
async fn mock_playlists(server: &mut ServerGuard, hits: usize) -> Vec<mockito::Mock> {
    let first = server
        .mock("GET", "/me/playlists")
        .match_query(page_query(0))
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "items": [{"id": "pl1", "name": "Classics"}, {"id": "pl2", "name": "Oldies"}],
                "next": "https://api.spotify.com/v1/me/playlists?offset=2&limit=2"
            })
            .to_string(),
        )
        .expect(hits)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/me/playlists")
        .match_query(page_query(2))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"items": [{"id": "pl3", "name": "Road Trip"}], "next": null}).to_string())
        .expect(hits)
        .create_async()
        .await;
    vec![first, second]
}

fn track_item(id: &str, name: &str, artist: &str) -> serde_json::Value {
    json!({"track": {"id": id, "name": name, "artists": [{"name": artist}]}})
}

async fn mock_tracks(server: &mut ServerGuard) -> Vec<mockito::Mock> {
    let mut mocks = Vec::new();
    mocks.push(
        server
            .mock("GET", "/playlists/pl1/tracks")
            .match_query(page_query(0))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "items": [
                        track_item("t1", "Imagine", "John Lennon"),
                        {"track": null},
                    ],
                    "next": "more"
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await,
    );
    mocks.push(
        server
            .mock("GET", "/playlists/pl1/tracks")
            .match_query(page_query(2))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"items": [track_item("t2", "Yesterday", "The Beatles")], "next": null}).to_string())
            .expect(1)
            .create_async()
            .await,
    );
    mocks.push(
        server
            .mock("GET", "/playlists/pl2/tracks")
            .match_query(page_query(0))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"items": [], "next": null}).to_string())
            .expect(1)
            .create_async()
            .await,
    );
    mocks.push(
        server
            .mock("GET", "/playlists/pl3/tracks")
            .match_query(page_query(0))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"items": [track_item("t1", "IMAGINE", "John Lennon")], "next": null}).to_string())
            .expect(1)
            .create_async()
            .await,
    );
    mocks
}

#[tokio::test]
async fn playlists_are_paginated_in_order_and_cached() {
    let mut server = Server::new_async().await;
    let mocks = mock_playlists(&mut server, 1).await;

    let cache = Arc::new(MemoryCache::new());
    let (_td, finder) = finder(&server.url(), cache.clone());

    let first = finder.catalog().get_playlists().await.expect("playlists");
    let names: Vec<&str> = first.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Classics", "Oldies", "Road Trip"]);

    // Second call inside the TTL never touches the network.
    let second = finder.catalog().get_playlists().await.expect("cached playlists");
    assert_eq!(first, second);

    let cached = cache.get(PLAYLISTS_KEY).await.unwrap().expect("cache entry");
    let decoded: Vec<Playlist> = serde_json::from_str(&cached).unwrap();
    assert_eq!(decoded, first);

    for m in mocks {
        m.assert_async().await;
    }
}

#[tokio::test]
async fn tracks_are_flattened_per_playlist_and_tagged() {
    let mut server = Server::new_async().await;
    let _p = mock_playlists(&mut server, 1).await;
    let track_mocks = mock_tracks(&mut server).await;

    let (_td, finder) = finder(&server.url(), Arc::new(MemoryCache::new()));
    let playlists = finder.catalog().get_playlists().await.expect("playlists");
    let tracks = finder.catalog().get_tracks(&playlists).await.expect("tracks");

    let flat: Vec<(&str, &str)> = tracks
        .iter()
        .map(|t| (t.name.as_str(), t.playlist_name.as_str()))
        .collect();
    assert_eq!(
        flat,
        vec![
            ("Imagine", "Classics"),
            ("Yesterday", "Classics"),
            ("IMAGINE", "Road Trip"),
        ]
    );
    assert_eq!(tracks[0].artist, "John Lennon");

    // Served from cache the second time round.
    let again = finder.catalog().get_tracks(&playlists).await.expect("cached tracks");
    assert_eq!(again, tracks);
    for m in track_mocks {
        m.assert_async().await;
    }
}

#[tokio::test]
async fn locate_finds_every_playlist_holding_the_song() {
    let mut server = Server::new_async().await;
    let _p = mock_playlists(&mut server, 1).await;
    let _t = mock_tracks(&mut server).await;

    let (_td, finder) = finder(&server.url(), Arc::new(MemoryCache::new()));
    let found: Vec<String> = finder.locate("imagine").await.expect("locate").into_iter().collect();
    assert_eq!(found, vec!["Classics".to_string(), "Road Trip".to_string()]);

    let none = finder.locate("let it be").await.expect("locate");
    assert!(none.is_empty());
}

#[tokio::test]
async fn cache_hit_replaces_network_build() {
    let mut server = Server::new_async().await;
    let mocks = mock_playlists(&mut server, 0).await;

    let cache = Arc::new(MemoryCache::new());
    cache
        .set(
            PLAYLISTS_KEY,
            &json!([{"id": "cached", "name": "From Cache"}]).to_string(),
            Duration::from_secs(60),
        )
        .await
        .unwrap();
    let (_td, finder) = finder(&server.url(), cache);

    let playlists = finder.catalog().get_playlists().await.expect("playlists");
    assert_eq!(
        playlists,
        vec![Playlist {
            id: "cached".into(),
            name: "From Cache".into()
        }]
    );
    for m in mocks {
        m.assert_async().await;
    }
}

#[tokio::test]
async fn token_expiring_mid_pagination_refreshes_and_continues() {
    let mut server = Server::new_async().await;
    let first = server
        .mock("GET", "/me/playlists")
        .match_query(page_query(0))
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"items": [{"id": "pl1", "name": "Classics"}, {"id": "pl2", "name": "Oldies"}], "next": "more"})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let expired = server
        .mock("GET", "/me/playlists")
        .match_query(page_query(2))
        .match_header("authorization", "Bearer tok")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/me/playlists")
        .match_query(page_query(2))
        .match_header("authorization", "Bearer renewed")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"items": [{"id": "pl3", "name": "Road Trip"}], "next": null}).to_string())
        .expect(1)
        .create_async()
        .await;
    let token = server
        .mock("POST", "/api/token")
        .match_body(Matcher::Regex("grant_type=refresh_token".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"access_token": "renewed"}).to_string())
        .expect(1)
        .create_async()
        .await;

    let (_td, finder) = finder(&server.url(), Arc::new(MemoryCache::new()));
    let playlists = finder.catalog().get_playlists().await.expect("playlists across refresh");
    let names: Vec<&str> = playlists.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Classics", "Oldies", "Road Trip"]);

    for m in [first, expired, second, token] {
        m.assert_async().await;
    }
}

/// A cache whose backend is always down.
#[derive(Default)]
struct BrokenCache {
    reads: AtomicUsize,
    writes: AtomicUsize,
}

#[async_trait]
impl CacheStore for BrokenCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Backend(rusqlite::Error::QueryReturnedNoRows))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Backend(rusqlite::Error::QueryReturnedNoRows))
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "broken"
    }
}

#[tokio::test]
async fn broken_cache_falls_back_to_network() {
    let mut server = Server::new_async().await;
    let mocks = mock_playlists(&mut server, 1).await;

    let cache = Arc::new(BrokenCache::default());
    let (_td, finder) = finder(&server.url(), cache.clone());

    let playlists = finder.catalog().get_playlists().await.expect("playlists despite cache");
    assert_eq!(playlists.len(), 3);
    assert_eq!(cache.reads.load(Ordering::SeqCst), 1);
    assert_eq!(cache.writes.load(Ordering::SeqCst), 1);
    for m in mocks {
        m.assert_async().await;
    }
}

#[tokio::test]
async fn failing_page_aborts_without_caching() {
    let mut server = Server::new_async().await;
    let _first = server
        .mock("GET", "/me/playlists")
        .match_query(page_query(0))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"items": [{"id": "pl1", "name": "Classics"}], "next": "more"}).to_string())
        .create_async()
        .await;
    let _second = server
        .mock("GET", "/me/playlists")
        .match_query(page_query(2))
        .with_status(500)
        .create_async()
        .await;

    let cache = Arc::new(MemoryCache::new());
    let (_td, finder) = finder(&server.url(), cache.clone());
    let err = finder.catalog().get_playlists().await.unwrap_err();
    assert!(matches!(err, FetchError::Request(_)));
    assert_eq!(cache.get(PLAYLISTS_KEY).await.unwrap(), None);
    assert_eq!(cache.get(TRACKS_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn clear_cache_drops_both_collections() {
    let cache = Arc::new(MemoryCache::new());
    cache.set(PLAYLISTS_KEY, "[]", Duration::from_secs(60)).await.unwrap();
    cache.set(TRACKS_KEY, "[]", Duration::from_secs(60)).await.unwrap();
    let (_td, finder) = finder("http://127.0.0.1:9", cache.clone());

    finder.catalog().clear_cache().await.unwrap();
    assert_eq!(cache.get(PLAYLISTS_KEY).await.unwrap(), None);
    assert_eq!(cache.get(TRACKS_KEY).await.unwrap(), None);
}
