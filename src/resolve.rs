//! Link extraction and parse dispatch.
//!
//! [`extract_id`] turns user input (a catalog link or a bare numeric ID)
//! into the ID to resolve, or nothing, in which case the caller rejects
//! locally and no network call is made.
//!
//! [`Dispatcher`] owns the displayed result. Parses are identified by a
//! monotonic [`Ticket`]; a response is only installed when its ticket is
//! still the latest, so the last dispatched parse wins no matter in
//! which order responses arrive. A rejected commit leaves the previous
//! result untouched.

use std::fmt;

use regex_lite::Regex;

use crate::{
    client::Api,
    error::{Error, Result},
    page::PageView,
    track::{Collection, Quality},
};

/// What kind of catalog object an input should resolve to.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Mode {
    Song,
    Playlist,
    Album,
}

impl Mode {
    /// Path segment identifying this mode in catalog links.
    fn segment(self) -> &'static str {
        match self {
            Mode::Song => "song",
            Mode::Playlist => "playlist",
            Mode::Album => "album",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segment())
    }
}

impl std::str::FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "song" => Ok(Mode::Song),
            "playlist" => Ok(Mode::Playlist),
            "album" => Ok(Mode::Album),
            other => Err(Error::invalid_argument(format!(
                "unknown mode \"{other}\" (expected song, playlist or album)"
            ))),
        }
    }
}

/// Extracts the numeric catalog ID for `mode` from user input.
///
/// Accepts, in order:
/// 1. a catalog link whose `mode` path segment carries a query ID
///    (`…/song?id=N`, also behind a `/#/` client-route prefix),
/// 2. for songs, a link ending in a numeric path segment (`…/song/N`),
/// 3. a bare all-digits ID.
///
/// Returns `None` otherwise; the caller rejects without a network call.
#[must_use]
pub fn extract_id(input: &str, mode: Mode) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let query = Regex::new(&format!(r"{}\?id=(\d+)", mode.segment())).expect("pattern is valid");
    if let Some(captures) = query.captures(input) {
        return Some(captures[1].to_owned());
    }

    // Short links redirect to song pages with the ID as the last path
    // segment instead of a query parameter.
    if mode == Mode::Song {
        let trailing = Regex::new(r"/(\d+)/?(?:[?#]\S*)?$").expect("pattern is valid");
        if input.contains('/') {
            if let Some(captures) = trailing.captures(input) {
                return Some(captures[1].to_owned());
            }
        }
    }

    if input.chars().all(|chr| chr.is_ascii_digit()) {
        return Some(input.to_owned());
    }

    None
}

/// Infers the mode from a catalog link.
///
/// Bare numeric IDs are ambiguous and yield `None`; the caller must ask
/// for an explicit mode.
#[must_use]
pub fn detect_mode(input: &str) -> Option<Mode> {
    for mode in [Mode::Playlist, Mode::Album, Mode::Song] {
        let query =
            Regex::new(&format!(r"{}\?id=\d+", mode.segment())).expect("pattern is valid");
        if query.is_match(input) {
            return Some(mode);
        }
    }

    let trailing = Regex::new(r"/\d+/?(?:[?#]\S*)?$").expect("pattern is valid");
    if input.contains("song/") && trailing.is_match(input) {
        return Some(Mode::Song);
    }

    None
}

/// Resolves user input to a fresh collection.
///
/// Input that yields no ID is rejected locally with no network call. A
/// resolved single song is wrapped into a one-track collection.
pub async fn resolve(api: &Api, mode: Mode, input: &str, quality: Quality) -> Result<Collection> {
    let id = extract_id(input, mode).ok_or_else(|| {
        Error::invalid_argument(format!("no {mode} ID found in \"{input}\""))
    })?;

    match mode {
        Mode::Song => api
            .resolve_song(&id, quality)
            .await
            .map(|song| Collection::from_song(&id, song)),
        Mode::Playlist => api.resolve_playlist(&id).await.map(Collection::from),
        Mode::Album => api.resolve_album(&id).await.map(Collection::from),
    }
}

/// Identifies one dispatched parse.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Ticket(u64);

/// Owner of the displayed result and its page state.
#[derive(Debug, Default)]
pub struct Dispatcher {
    collection: Option<Collection>,
    page: Option<PageView>,
    latest: u64,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new parse and returns its ticket. Any parse begun
    /// earlier becomes stale immediately.
    pub fn begin(&mut self) -> Ticket {
        self.latest += 1;
        Ticket(self.latest)
    }

    /// Installs a parse result if its ticket is still the latest.
    ///
    /// On success the collection replaces the displayed one wholesale
    /// and paging resets to page 1. A stale ticket leaves the displayed
    /// state untouched and returns `false`.
    pub fn commit(&mut self, ticket: Ticket, collection: Collection) -> bool {
        if ticket.0 != self.latest {
            debug!(
                "discarding stale parse response for {} \"{}\"",
                collection.kind, collection.name
            );
            return false;
        }

        self.page = Some(PageView::new(collection.len()));
        self.collection = Some(collection);
        true
    }

    #[must_use]
    pub fn collection(&self) -> Option<&Collection> {
        self.collection.as_ref()
    }

    #[must_use]
    pub fn page(&self) -> Option<&PageView> {
        self.page.as_ref()
    }

    pub fn page_mut(&mut self) -> Option<&mut PageView> {
        self.page.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::CollectionKind;

    fn collection(name: &str) -> Collection {
        Collection {
            kind: CollectionKind::Playlist,
            id: "1".to_owned(),
            name: name.to_owned(),
            owner: String::new(),
            published: None,
            declared_total: None,
            tracks: Vec::new(),
        }
    }

    #[test]
    fn song_links_yield_their_query_id() {
        assert_eq!(
            extract_id("https://x/song?id=123", Mode::Song).as_deref(),
            Some("123")
        );
        assert_eq!(
            extract_id("https://x/#/song?id=123&userid=9", Mode::Song).as_deref(),
            Some("123")
        );
    }

    #[test]
    fn bare_digits_pass_through_any_mode() {
        for mode in [Mode::Song, Mode::Playlist, Mode::Album] {
            assert_eq!(extract_id("  456 ", mode).as_deref(), Some("456"));
        }
    }

    #[test]
    fn mismatched_links_are_rejected() {
        assert_eq!(extract_id("https://x/playlist?id=789", Mode::Song), None);
        assert_eq!(extract_id("https://x/song?id=123", Mode::Album), None);
        assert_eq!(extract_id("", Mode::Song), None);
        assert_eq!(extract_id("not a link", Mode::Playlist), None);
    }

    #[test]
    fn trailing_path_segments_only_count_for_songs() {
        assert_eq!(
            extract_id("https://x/song/99?from=share", Mode::Song).as_deref(),
            Some("99")
        );
        assert_eq!(extract_id("https://x/song/99", Mode::Playlist), None);
    }

    #[test]
    fn modes_are_detected_from_links_but_not_bare_ids() {
        assert_eq!(detect_mode("https://x/playlist?id=789"), Some(Mode::Playlist));
        assert_eq!(detect_mode("https://x/#/album?id=4"), Some(Mode::Album));
        assert_eq!(detect_mode("https://x/song/99"), Some(Mode::Song));
        assert_eq!(detect_mode("456"), None);
    }

    #[test]
    fn the_last_dispatched_parse_wins() {
        let mut dispatcher = Dispatcher::new();

        // A dispatched first, B second; A's response arrives last.
        let ticket_a = dispatcher.begin();
        let ticket_b = dispatcher.begin();
        assert!(dispatcher.commit(ticket_b, collection("B")));
        assert!(!dispatcher.commit(ticket_a, collection("A")));
        assert_eq!(dispatcher.collection().unwrap().name, "B");

        // Same dispatch order, responses in dispatch order: A is already
        // stale when it arrives.
        let ticket_a = dispatcher.begin();
        let ticket_b = dispatcher.begin();
        assert!(!dispatcher.commit(ticket_a, collection("A")));
        assert_eq!(
            dispatcher.collection().unwrap().name,
            "B",
            "stale response must not overwrite the displayed result"
        );
        assert!(dispatcher.commit(ticket_b, collection("B2")));
        assert_eq!(dispatcher.collection().unwrap().name, "B2");
    }

    #[test]
    fn committing_resets_paging_to_the_first_page() {
        let mut dispatcher = Dispatcher::new();

        let ticket = dispatcher.begin();
        let mut big = collection("big");
        big.tracks = vec![
            crate::track::Track {
                id: "1".to_owned(),
                title: "t".to_owned(),
                artist: String::new(),
                album: String::new(),
                duration: None,
                cover: None,
                quality: None,
                size: None,
                library: None,
            };
            65
        ];
        assert!(dispatcher.commit(ticket, big));
        assert!(dispatcher.page_mut().unwrap().goto(3));

        let ticket = dispatcher.begin();
        assert!(dispatcher.commit(ticket, collection("fresh")));
        assert_eq!(dispatcher.page().unwrap().current(), 1);
    }
}
