//! Catalog resolution wire types.
//!
//! Shapes returned by the `/song`, `/playlist`, `/album` and `/search`
//! routes of the resolver service.
//!
//! # Wire Format
//!
//! A resolved song:
//!
//! ```json
//! {
//!     "status": 200,
//!     "data": {
//!         "id": "1962165898",
//!         "name": "Track A",
//!         "ar_name": "Artist",
//!         "al_name": "Album",
//!         "duration": 254000,
//!         "level": "lossless",
//!         "size": "24.37MB",
//!         "pic": "https://img.example.com/cover.jpg",
//!         "url": "https://audio.example.com/file.flac",
//!         "in_navidrome": {
//!             "exists": true,
//!             "is_mp3": false,
//!             "artists": "Artist",
//!             "album": "Album"
//!         }
//!     }
//! }
//! ```
//!
//! Playlists arrived through several catalog revisions, so the field
//! names vary: tracks are delivered as `songs` or `tracks`, the declared
//! count as `songCount` or `trackCount`, the owner as `creator` or
//! `author`. The types below accept every combination.
//!
//! # Number Handling
//!
//! Catalog IDs are numbers in some responses and decimal strings in
//! others; they are accepted in either form and normalized to integers.

use serde::Deserialize;
use serde_with::{serde_as, DefaultOnError, DisplayFromStr, PickFirst};
use url::Url;

use super::Endpoint;
use crate::track::Quality;

/// Match result of the resolver's lookup against the external local
/// media library.
///
/// `exists` with `is_mp3` set means the library already holds the track,
/// but only as a lossy copy.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct LibraryMatch {
    #[serde(default)]
    pub exists: bool,

    #[serde(default)]
    pub is_mp3: bool,

    /// Artist string of the matched copy.
    #[serde(default)]
    pub artists: String,

    /// Album of the matched copy.
    #[serde(default)]
    pub album: String,
}

/// A fully resolved song.
impl Endpoint for SongDetail {
    const PATH: &'static str = "/song";
}

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct SongDetail {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub id: u64,

    pub name: String,

    /// Display name of all contributing artists.
    #[serde(rename = "ar_name", default)]
    pub artists: String,

    #[serde(rename = "al_name", default)]
    pub album: String,

    /// Duration in milliseconds.
    #[serde(default)]
    pub duration: u64,

    /// Quality tier the catalog actually served, which may be lower than
    /// the one requested.
    #[serde(default)]
    pub level: Option<Quality>,

    /// File size as formatted by the server.
    #[serde(default)]
    pub size: Option<String>,

    /// Cover image. The server sends an empty string when it has none.
    #[serde(default)]
    #[serde_as(as = "DefaultOnError")]
    pub pic: Option<Url>,

    /// Direct catalog URL of the audio payload.
    #[serde(default)]
    #[serde_as(as = "DefaultOnError")]
    pub url: Option<Url>,

    #[serde(rename = "in_navidrome", default)]
    pub in_library: Option<LibraryMatch>,
}

/// One track of a playlist, album or search listing.
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct CatalogTrack {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub id: u64,

    pub name: String,

    #[serde(alias = "artist_string", default)]
    pub artists: String,

    #[serde(default)]
    pub album: String,

    #[serde(rename = "picUrl", default)]
    #[serde_as(as = "DefaultOnError")]
    pub pic_url: Option<Url>,

    #[serde(rename = "in_navidrome", default)]
    pub in_library: Option<LibraryMatch>,
}

/// Payload of `/playlist`: the playlist object nested in `data`.
impl Endpoint for PlaylistData {
    const PATH: &'static str = "/playlist";
}

#[derive(Clone, Debug, Deserialize)]
pub struct PlaylistData {
    pub playlist: Playlist,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Playlist {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub id: u64,

    pub name: String,

    #[serde(alias = "author", default)]
    pub creator: String,

    /// Creation date, formatted by the server.
    #[serde(rename = "createTime", default)]
    #[serde_as(as = "DefaultOnError")]
    pub create_time: Option<String>,

    /// Declared track count; may exceed the tracks eagerly delivered.
    #[serde(rename = "trackCount", alias = "songCount", default)]
    pub track_count: Option<usize>,

    #[serde(alias = "songs", default)]
    pub tracks: Vec<CatalogTrack>,
}

/// Payload of `/album`: the album object nested in `data`.
impl Endpoint for AlbumData {
    const PATH: &'static str = "/album";
}

#[derive(Clone, Debug, Deserialize)]
pub struct AlbumData {
    pub album: Album,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Album {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub id: u64,

    pub name: String,

    #[serde(default)]
    pub artist: String,

    /// Publish timestamp, seconds or milliseconds since the epoch.
    #[serde(rename = "publishTime", default)]
    pub publish_time: Option<i64>,

    #[serde(default)]
    pub songs: Vec<CatalogTrack>,
}

/// Payload of `/search`: a bare list of matching tracks.
impl Endpoint for SearchResults {
    const PATH: &'static str = "/search";
}

#[derive(Clone, Debug, Deserialize)]
#[serde(transparent)]
pub struct SearchResults(pub Vec<CatalogTrack>);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Envelope;

    #[test]
    fn song_accepts_string_id_and_library_annotation() {
        let json = r#"{
            "status": 200,
            "data": {
                "id": "1962165898",
                "name": "Track A",
                "ar_name": "Artist",
                "al_name": "Album",
                "duration": 254000,
                "level": "lossless",
                "size": "24.37MB",
                "pic": "",
                "url": "https://audio.example.com/file.flac",
                "in_navidrome": {"exists": true, "is_mp3": true, "artists": "Artist", "album": "Album"}
            }
        }"#;
        let song: SongDetail = serde_json::from_str::<Envelope<SongDetail>>(json)
            .unwrap()
            .into_data()
            .unwrap();

        assert_eq!(song.id, 1_962_165_898);
        assert_eq!(song.level, Some(Quality::Lossless));
        assert_eq!(song.pic, None, "empty cover URL is tolerated");
        assert!(song.url.is_some());
        let library = song.in_library.unwrap();
        assert!(library.exists && library.is_mp3);
    }

    #[test]
    fn playlist_accepts_both_field_dialects() {
        let with_songs = r#"{
            "id": 789, "name": "Mix", "author": "someone",
            "songCount": 120,
            "songs": [{"id": 1, "name": "a", "artists": "x", "album": "y"}]
        }"#;
        let playlist: Playlist = serde_json::from_str(with_songs).unwrap();
        assert_eq!(playlist.creator, "someone");
        assert_eq!(playlist.track_count, Some(120));
        assert_eq!(playlist.tracks.len(), 1);

        let with_tracks = r#"{
            "id": "789", "name": "Mix", "creator": "someone",
            "trackCount": 2, "createTime": "2023-01-15",
            "tracks": [
                {"id": "1", "name": "a", "artist_string": "x"},
                {"id": 2, "name": "b"}
            ]
        }"#;
        let playlist: Playlist = serde_json::from_str(with_tracks).unwrap();
        assert_eq!(playlist.id, 789);
        assert_eq!(playlist.create_time.as_deref(), Some("2023-01-15"));
        assert_eq!(playlist.tracks[0].artists, "x");
        assert_eq!(playlist.tracks.len(), 2);
    }

    #[test]
    fn album_carries_raw_publish_stamp() {
        let json = r#"{
            "id": 5, "name": "LP", "artist": "Band",
            "publishTime": 1620000000000,
            "songs": [{"id": 6, "name": "s", "artists": "Band", "album": "LP"}]
        }"#;
        let album: Album = serde_json::from_str(json).unwrap();
        assert_eq!(album.publish_time, Some(1_620_000_000_000));
        assert_eq!(album.songs.len(), 1);
    }
}
