use std::{fmt, str::FromStr, time::Duration};

use serde::Deserialize;
use time::{macros::format_description, OffsetDateTime};
use url::Url;

use crate::{
    error::Error,
    protocol::catalog::{self, LibraryMatch},
};

/// Audio quality tier selecting encoding and bitrate.
///
/// The three spatial/master tiers ([`Jyeffect`](Self::Jyeffect),
/// [`Sky`](Self::Sky), [`Jymaster`](Self::Jymaster)) require a VIP
/// entitlement on the session, as do [`Lossless`](Self::Lossless) and
/// above.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Standard bitrate.
    Standard,
    /// High bitrate.
    Exhigh,
    /// Lossless (CD quality).
    #[default]
    Lossless,
    /// Hi-Res.
    Hires,
    /// High-definition surround.
    Jyeffect,
    /// Immersive surround.
    Sky,
    /// Ultra-clear master.
    Jymaster,
}

impl Quality {
    /// All tiers in ascending order, as accepted on the command line and
    /// by the resolver service.
    pub const ALL: [Quality; 7] = [
        Quality::Standard,
        Quality::Exhigh,
        Quality::Lossless,
        Quality::Hires,
        Quality::Jyeffect,
        Quality::Sky,
        Quality::Jymaster,
    ];

    /// Wire name of the tier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Standard => "standard",
            Quality::Exhigh => "exhigh",
            Quality::Lossless => "lossless",
            Quality::Hires => "hires",
            Quality::Jyeffect => "jyeffect",
            Quality::Sky => "sky",
            Quality::Jymaster => "jymaster",
        }
    }

    /// Human-readable tier name for listings.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Quality::Standard => "Standard",
            Quality::Exhigh => "High",
            Quality::Lossless => "Lossless",
            Quality::Hires => "Hi-Res",
            Quality::Jyeffect => "Surround (HD)",
            Quality::Sky => "Immersive",
            Quality::Jymaster => "Master",
        }
    }

    /// File extension used when the server does not name the file.
    ///
    /// Only the lossless tier falls back to FLAC; everything else gets
    /// the generic audio extension.
    #[must_use]
    pub fn fallback_extension(self) -> &'static str {
        match self {
            Quality::Lossless => "flac",
            _ => "mp3",
        }
    }
}

impl FromStr for Quality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|quality| quality.as_str() == s)
            .ok_or_else(|| {
                Error::invalid_argument(format!(
                    "unknown quality \"{s}\" (expected one of: standard, exhigh, lossless, hires, jyeffect, sky, jymaster)"
                ))
            })
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One catalog track as displayed in listings.
///
/// Immutable once produced; a fresh parse replaces the whole collection
/// it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration: Option<Duration>,
    pub cover: Option<Url>,
    pub quality: Option<Quality>,
    /// File size as formatted by the server, e.g. `"24.37MB"`.
    pub size: Option<String>,
    /// Match against the external local media library, when the server
    /// annotated one.
    pub library: Option<LibraryMatch>,
}

impl Track {
    /// Track length formatted as `m:ss`.
    #[must_use]
    pub fn duration_display(&self) -> String {
        match self.duration {
            Some(duration) => {
                let secs = duration.as_secs();
                format!("{}:{:02}", secs / 60, secs % 60)
            }
            None => String::from("-:--"),
        }
    }

    /// Short annotation when the track already exists in the local
    /// library, e.g. `"in library (lossy)"`.
    #[must_use]
    pub fn library_note(&self) -> Option<&'static str> {
        let library = self.library.as_ref()?;
        if !library.exists {
            return None;
        }
        Some(if library.is_mp3 {
            "in library (lossy)"
        } else {
            "in library"
        })
    }
}

/// What a displayed collection was resolved from.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum CollectionKind {
    Song,
    Playlist,
    Album,
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollectionKind::Song => "song",
            CollectionKind::Playlist => "playlist",
            CollectionKind::Album => "album",
        };
        write!(f, "{name}")
    }
}

/// The currently displayed parse result.
///
/// A playlist or album maps one-to-one; a resolved single song becomes a
/// one-track collection so paging, gating and batch download treat all
/// modes uniformly. Replaced wholesale on each parse, never merged.
#[derive(Clone, Debug, PartialEq)]
pub struct Collection {
    pub kind: CollectionKind,
    pub id: String,
    pub name: String,
    /// Playlist creator or album artist.
    pub owner: String,
    /// Creation or publish date, already formatted for display.
    pub published: Option<String>,
    /// Track count declared by the catalog; may exceed the number of
    /// tracks actually delivered.
    pub declared_total: Option<usize>,
    pub tracks: Vec<Track>,
}

impl Collection {
    /// Wraps a resolved single song.
    #[must_use]
    pub fn from_song(id: &str, song: catalog::SongDetail) -> Self {
        let track = Track::from(song);
        Self {
            kind: CollectionKind::Song,
            id: id.to_owned(),
            name: track.title.clone(),
            owner: track.artist.clone(),
            published: None,
            declared_total: Some(1),
            tracks: vec![track],
        }
    }

    /// Number of tracks actually delivered and displayable.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Declared catalog total, falling back to the delivered count.
    #[must_use]
    pub fn total(&self) -> usize {
        self.declared_total.unwrap_or_else(|| self.tracks.len())
    }
}

impl From<catalog::SongDetail> for Track {
    fn from(song: catalog::SongDetail) -> Self {
        Self {
            id: song.id.to_string(),
            title: song.name,
            artist: song.artists,
            album: song.album,
            duration: (song.duration > 0).then(|| Duration::from_millis(song.duration)),
            cover: song.pic,
            quality: song.level,
            size: song.size,
            library: song.in_library,
        }
    }
}

impl From<catalog::CatalogTrack> for Track {
    fn from(track: catalog::CatalogTrack) -> Self {
        Self {
            id: track.id.to_string(),
            title: track.name,
            artist: track.artists,
            album: track.album,
            duration: None,
            cover: track.pic_url,
            quality: None,
            size: None,
            library: track.in_library,
        }
    }
}

impl From<catalog::Playlist> for Collection {
    fn from(playlist: catalog::Playlist) -> Self {
        Self {
            kind: CollectionKind::Playlist,
            id: playlist.id.to_string(),
            name: playlist.name,
            owner: playlist.creator,
            published: playlist.create_time,
            declared_total: playlist.track_count,
            tracks: playlist.tracks.into_iter().map(Track::from).collect(),
        }
    }
}

impl From<catalog::Album> for Collection {
    fn from(album: catalog::Album) -> Self {
        let published = album.publish_time.and_then(format_catalog_date);
        Self {
            kind: CollectionKind::Album,
            id: album.id.to_string(),
            name: album.name,
            owner: album.artist,
            published,
            declared_total: Some(album.songs.len()),
            tracks: album.songs.into_iter().map(Track::from).collect(),
        }
    }
}

/// Formats a catalog timestamp as `YYYY-MM-DD`.
///
/// The catalog mixes second and millisecond precision; values between
/// 10^10 and 5 × 10^11 are taken as seconds, larger ones as
/// milliseconds. Anything shorter, or past 2100, yields `None`.
#[must_use]
pub fn format_catalog_date(stamp: i64) -> Option<String> {
    const MAX_MILLIS: i64 = 4_102_444_799_000; // 2100-12-31 23:59:59

    if stamp < 10_i64.pow(10) {
        return None;
    }
    let millis = if stamp < 5 * 10_i64.pow(11) {
        stamp.checked_mul(1000)?
    } else {
        stamp
    };
    if !(0..=MAX_MILLIS).contains(&millis) {
        return None;
    }

    let timestamp = OffsetDateTime::from_unix_timestamp(millis / 1000).ok()?;
    let format = format_description!("[year]-[month]-[day]");
    timestamp.format(&format).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_round_trips_wire_names() {
        for quality in Quality::ALL {
            assert_eq!(quality.as_str().parse::<Quality>().unwrap(), quality);
        }
        assert!("cd-quality".parse::<Quality>().is_err());
    }

    #[test]
    fn only_lossless_falls_back_to_flac() {
        assert_eq!(Quality::Lossless.fallback_extension(), "flac");
        assert_eq!(Quality::Exhigh.fallback_extension(), "mp3");
        assert_eq!(Quality::Hires.fallback_extension(), "mp3");
        assert_eq!(Quality::Jymaster.fallback_extension(), "mp3");
    }

    #[test]
    fn duration_display_is_minutes_and_seconds() {
        let track = Track {
            id: "1".to_owned(),
            title: "t".to_owned(),
            artist: "a".to_owned(),
            album: "b".to_owned(),
            duration: Some(Duration::from_millis(754_000)),
            cover: None,
            quality: None,
            size: None,
            library: None,
        };
        assert_eq!(track.duration_display(), "12:34");
    }

    #[test]
    fn catalog_dates_handle_both_precisions() {
        // 2021-05-03, milliseconds.
        assert_eq!(
            format_catalog_date(1_620_000_000_000).as_deref(),
            Some("2021-05-03")
        );
        // 12-digit values sit in the seconds band.
        assert_eq!(
            format_catalog_date(400_000_000_000).as_deref(),
            None,
            "seconds past 2100 are rejected"
        );
        // Too short to be a catalog timestamp.
        assert_eq!(format_catalog_date(1_620_000_000), None);
        assert_eq!(format_catalog_date(123_456), None);
    }
}
