use crate::models::Track;
use std::collections::BTreeSet;

/// Names of the playlists holding a track called `song` (case-insensitive,
/// whole title only). No match is an empty set.
pub fn find_playlists(song: &str, tracks: &[Track]) -> BTreeSet<String> {
    let wanted = song.to_lowercase();
    tracks
        .iter()
        .filter(|t| t.name.to_lowercase() == wanted)
        .map(|t| t.playlist_name.clone())
        .collect()
}
