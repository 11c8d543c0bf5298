use super::executor::ResilientExecutor;
use crate::error::{FetchError, RequestError};
use crate::models::{Page, Playlist, Track, TrackCandidate};
use log::debug;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Deserialize)]
struct Paging<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistObject {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct PlaylistItem {
    track: Option<TrackObject>,
}

#[derive(Deserialize)]
struct TrackObject {
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    artists: Vec<NamedObject>,
    album: Option<AlbumObject>,
}

#[derive(Deserialize)]
struct AlbumObject {
    #[serde(default)]
    name: String,
    #[serde(default)]
    artists: Vec<NamedObject>,
}

#[derive(Deserialize)]
struct NamedObject {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: Option<Paging<TrackObject>>,
}

/// Read-only client for the Spotify Web API resources this tool needs.
/// All calls go through the resilient executor.
#[derive(Clone)]
pub struct SpotifyApi {
    client: Client,
    api_base: String,
    executor: ResilientExecutor,
}

impl SpotifyApi {
    pub fn new(client: Client, api_base: &str, executor: ResilientExecutor) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            executor,
        }
    }

    pub fn executor(&self) -> &ResilientExecutor {
        &self.executor
    }

    /// One page of the current user's playlists.
    pub async fn playlists_page(
        &self,
        offset: u32,
        limit: u32,
    ) -> Result<Page<Playlist>, FetchError> {
        let url = format!("{}/me/playlists", self.api_base);
        let paging: Option<Paging<PlaylistObject>> = self
            .get_json(&url, &[("limit", limit.to_string()), ("offset", offset.to_string())])
            .await?;
        Ok(match paging {
            Some(p) => Page {
                has_more: p.next.is_some(),
                items: p
                    .items
                    .into_iter()
                    .map(|pl| Playlist { id: pl.id, name: pl.name })
                    .collect(),
            },
            None => Page::empty(),
        })
    }

    /// One page of the tracks in `playlist`, tagged with its name. Items
    /// without a track object (removed or local files) are skipped.
    pub async fn playlist_tracks_page(
        &self,
        playlist: &Playlist,
        offset: u32,
        limit: u32,
    ) -> Result<Page<Track>, FetchError> {
        let url = format!(
            "{}/playlists/{}/tracks",
            self.api_base,
            urlencoding::encode(&playlist.id)
        );
        let paging: Option<Paging<PlaylistItem>> = self
            .get_json(&url, &[("limit", limit.to_string()), ("offset", offset.to_string())])
            .await?;
        Ok(match paging {
            Some(p) => Page {
                has_more: p.next.is_some(),
                items: p
                    .items
                    .into_iter()
                    .filter_map(|it| it.track)
                    .map(|t| Track {
                        id: t.id.unwrap_or_default(),
                        artist: t.artists.into_iter().next().map(|a| a.name).unwrap_or_default(),
                        name: t.name,
                        playlist_name: playlist.name.clone(),
                    })
                    .collect(),
            },
            None => Page::empty(),
        })
    }

    /// Search tracks by song title and artist.
    pub async fn search_tracks(
        &self,
        song: &str,
        artist: &str,
        limit: u32,
    ) -> Result<Vec<TrackCandidate>, FetchError> {
        let url = format!("{}/search", self.api_base);
        let q = format!("artist:{} track:{}", artist.trim(), song.trim());
        let resp: Option<SearchResponse> = self
            .get_json(
                &url,
                &[("q", q), ("type", "track".to_string()), ("limit", limit.to_string())],
            )
            .await?;
        let items = resp
            .and_then(|r| r.tracks)
            .map(|p| p.items)
            .unwrap_or_default();
        Ok(items.into_iter().map(candidate).collect())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, FetchError> {
        debug!("GET {} {:?}", url, query);
        let resp = self
            .executor
            .execute(|token| {
                self.client
                    .get(url)
                    .header(AUTHORIZATION, format!("Bearer {}", token))
                    .header(ACCEPT, "application/json")
                    .query(query)
            })
            .await?;
        match resp {
            Some(r) => Ok(Some(decode(url, r).await?)),
            None => Ok(None),
        }
    }
}

async fn decode<T: DeserializeOwned>(url: &str, resp: Response) -> Result<T, RequestError> {
    let body = resp.text().await.map_err(RequestError::Transport)?;
    serde_json::from_str(&body).map_err(|e| RequestError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

fn candidate(t: TrackObject) -> TrackCandidate {
    let (album, album_artist) = match t.album {
        Some(a) => (a.name, a.artists.into_iter().next().map(|x| x.name)),
        None => (String::new(), None),
    };
    TrackCandidate {
        id: t.id.unwrap_or_default(),
        artist: album_artist
            .or_else(|| t.artists.into_iter().next().map(|a| a.name))
            .unwrap_or_default(),
        name: t.name,
        album,
    }
}
