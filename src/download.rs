//! Download orchestration.
//!
//! A [`Job`] tracks one download attempt: requested track and quality, a
//! synthetic progress percentage and a terminal state. Actual transfer
//! progress is not observable for the service's file responses, so the
//! bar creeps from 0 toward 90 on a fixed tick while the request is in
//! flight and only jumps to 100 on completion.
//!
//! [`Downloader::fetch_one`] resolves with a success flag in every case:
//! server failure, transport failure and timeout all land the job in a
//! terminal state instead of leaving the caller waiting.
//! [`Downloader::fetch_all`] runs a collection with bounded concurrency
//! (one at a time unless configured otherwise); cancelling stops further
//! items but lets the in-flight ones finish or fail naturally.

use std::{
    path::PathBuf,
    time::Duration,
};

use futures_util::{stream::FuturesUnordered, StreamExt};
use percent_encoding::percent_decode_str;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::{
    client::Api,
    config::Config,
    error::{Error, Result},
    track::{Quality, Track},
};

/// Header the service sets with the percent-encoded filename.
const FILENAME_HEADER: &str = "X-Download-Filename";

/// Percentage points the synthetic progress advances per tick.
pub const PROGRESS_STEP: u8 = 5;

/// Ceiling of the synthetic progress; only completion reaches 100.
pub const PROGRESS_CEILING: u8 = 90;

/// Tick interval of the synthetic progress.
pub const PROGRESS_TICK: Duration = Duration::from_millis(500);

/// State of one download attempt.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
pub enum JobState {
    #[default]
    Pending,
    Fetching,
    Done,
    Failed,
    TimedOut,
}

/// One download attempt. Exists only for its duration; never persisted.
#[derive(Clone, Debug)]
pub struct Job {
    pub track_id: String,
    pub quality: Quality,
    /// Display name, also the stem of the fallback filename.
    pub name: String,
    progress: u8,
    state: JobState,
}

impl Job {
    #[must_use]
    pub fn new(track: &Track, quality: Quality) -> Self {
        let name = if track.artist.is_empty() {
            track.title.clone()
        } else {
            format!("{} - {}", track.artist, track.title)
        };
        Self {
            track_id: track.id.clone(),
            quality,
            name,
            progress: 0,
            state: JobState::Pending,
        }
    }

    /// Progress percentage in `[0, 100]`.
    #[must_use]
    pub fn progress(&self) -> u8 {
        self.progress
    }

    #[must_use]
    pub fn state(&self) -> JobState {
        self.state
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == JobState::Done
    }

    fn begin(&mut self) {
        self.state = JobState::Fetching;
        self.progress = 0;
    }

    /// One synthetic progress tick; clamped below the ceiling so the
    /// bar never claims completion early.
    fn advance(&mut self) {
        if self.state == JobState::Fetching {
            self.progress = (self.progress + PROGRESS_STEP).min(PROGRESS_CEILING);
        }
    }

    fn complete(&mut self) {
        self.progress = 100;
        self.state = JobState::Done;
    }

    fn fail(&mut self) {
        self.state = JobState::Failed;
    }

    fn time_out(&mut self) {
        self.state = JobState::TimedOut;
    }
}

/// Result tally of one batch run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BatchReport {
    pub completed: usize,
    pub failed: usize,
    /// Items never started because the batch was cancelled.
    pub skipped: usize,
    pub cancelled: bool,
}

/// Drives downloads against the resolver service.
pub struct Downloader<'a> {
    api: &'a Api,
    downloads_dir: PathBuf,
    timeout: Duration,
    concurrency: usize,
}

impl<'a> Downloader<'a> {
    #[must_use]
    pub fn new(api: &'a Api, config: &Config) -> Self {
        Self {
            api,
            downloads_dir: config.downloads_dir.clone(),
            timeout: config.download_timeout,
            concurrency: config.batch_concurrency.max(1),
        }
    }

    /// Downloads one track.
    ///
    /// `on_tick` is called whenever the job changes, so a caller can
    /// render the bar. Resolves with the success flag in every case; a
    /// timeout marks the job [`TimedOut`](JobState::TimedOut) with its
    /// own message, distinct from other failures.
    pub async fn fetch_one<F>(&self, job: &mut Job, mut on_tick: F) -> bool
    where
        F: FnMut(&Job),
    {
        job.begin();
        on_tick(job);

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        // The request must not borrow the job: the ticker arm below keeps
        // mutating it while the request is in flight.
        let (track_id, quality, name) = (job.track_id.clone(), job.quality, job.name.clone());
        let fetch = self.fetch_file(&track_id, quality, &name);
        tokio::pin!(fetch);

        let mut ticker = tokio::time::interval(PROGRESS_TICK);
        loop {
            tokio::select! {
                () = &mut deadline => {
                    job.time_out();
                    on_tick(job);
                    warn!(
                        "download of \"{}\" timed out after {}s",
                        job.name,
                        self.timeout.as_secs()
                    );
                    return false;
                }
                result = &mut fetch => {
                    match result {
                        Ok(path) => {
                            job.complete();
                            on_tick(job);
                            info!("saved \"{}\" to {}", job.name, path.display());
                            return true;
                        }
                        Err(e) => {
                            job.fail();
                            on_tick(job);
                            error!("download of \"{}\" failed: {e}", job.name);
                            return false;
                        }
                    }
                }
                _ = ticker.tick() => {
                    job.advance();
                    on_tick(job);
                }
            }
        }
    }

    /// Downloads a whole collection with bounded concurrency.
    ///
    /// `on_item` is called as each item reaches a terminal state.
    /// Cancelling stops admission of further items; items already in
    /// flight finish or fail naturally and are tallied.
    pub async fn fetch_all<F>(
        &self,
        tracks: &[Track],
        quality: Quality,
        cancel: &CancellationToken,
        mut on_item: F,
    ) -> BatchReport
    where
        F: FnMut(&Job),
    {
        let mut report = BatchReport::default();
        let mut queue = tracks.iter();
        let mut admitted = 0usize;
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < self.concurrency && !cancel.is_cancelled() {
                match queue.next() {
                    Some(track) => {
                        admitted += 1;
                        in_flight.push(async move {
                            let mut job = Job::new(track, quality);
                            let ok = self.fetch_one(&mut job, |_| {}).await;
                            (job, ok)
                        });
                    }
                    None => break,
                }
            }

            match in_flight.next().await {
                Some((job, ok)) => {
                    on_item(&job);
                    if ok {
                        report.completed += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                None => break,
            }
        }

        if cancel.is_cancelled() {
            report.cancelled = true;
            report.skipped = tracks.len() - admitted;
        }
        report
    }

    /// Requests, names and stores the payload for one track.
    async fn fetch_file(&self, id: &str, quality: Quality, name: &str) -> Result<PathBuf> {
        let response = self.api.download(id, quality).await?;
        let filename = filename_from_headers(response.headers())
            .unwrap_or_else(|| fallback_filename(name, quality));

        tokio::fs::create_dir_all(&self.downloads_dir).await?;
        let path = self.downloads_dir.join(filename);

        match self.store_body(response, &path).await {
            Ok(()) => Ok(path),
            Err(e) => {
                // Do not leave truncated audio files around.
                let _ = tokio::fs::remove_file(&path).await;
                Err(e)
            }
        }
    }

    async fn store_body(&self, response: reqwest::Response, path: &std::path::Path) -> Result<()> {
        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(Error::from)?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

/// Filename announced by the server, if any.
///
/// The dedicated header wins; otherwise `Content-Disposition` is
/// consulted, preferring the RFC 5987 `filename*` parameter over the
/// plain `filename`. The result is sanitized for the filesystem.
#[must_use]
pub fn filename_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(FILENAME_HEADER) {
        if let Some(decoded) = value
            .to_str()
            .ok()
            .and_then(|raw| percent_decode_str(raw).decode_utf8().ok())
        {
            return Some(sanitize(&decoded));
        }
    }

    let disposition = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    parse_content_disposition(disposition).map(|name| sanitize(&name))
}

fn parse_content_disposition(value: &str) -> Option<String> {
    // `filename*=UTF-8''…` carries percent-encoded UTF-8.
    for part in value.split(';') {
        let part = part.trim();
        if let Some(encoded) = part.strip_prefix("filename*=") {
            let encoded = encoded
                .trim_matches('"')
                .trim_start_matches("UTF-8''")
                .trim_start_matches("utf-8''");
            if let Ok(decoded) = percent_decode_str(encoded).decode_utf8() {
                return Some(decoded.into_owned());
            }
        }
    }

    for part in value.split(';') {
        let part = part.trim();
        if let Some(name) = part.strip_prefix("filename=") {
            let name = name.trim_matches('"');
            if !name.is_empty() {
                return Some(name.to_owned());
            }
        }
    }

    None
}

/// Fallback filename when the server does not announce one:
/// `"{name}.{ext}"`, FLAC for the lossless tier and the generic audio
/// extension otherwise.
#[must_use]
pub fn fallback_filename(name: &str, quality: Quality) -> String {
    format!("{}.{}", sanitize(name), quality.fallback_extension())
}

/// Replaces characters the filesystem cannot take and bounds the length.
fn sanitize(name: &str) -> String {
    const ILLEGAL: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

    let mut cleaned: String = name
        .chars()
        .map(|chr| {
            if chr.is_control() || ILLEGAL.contains(&chr) {
                '_'
            } else {
                chr
            }
        })
        .collect();

    if cleaned.chars().count() > 200 {
        cleaned = cleaned.chars().take(200).collect();
    }

    let trimmed = cleaned.trim_matches(|chr: char| chr == '.' || chr.is_whitespace());
    if trimmed.is_empty() {
        String::from("unnamed")
    } else {
        trimmed.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};

    fn track(id: &str, artist: &str, title: &str) -> Track {
        Track {
            id: id.to_owned(),
            title: title.to_owned(),
            artist: artist.to_owned(),
            album: String::new(),
            duration: None,
            cover: None,
            quality: None,
            size: None,
            library: None,
        }
    }

    #[test]
    fn synthetic_progress_stalls_below_completion() {
        let mut job = Job::new(&track("1", "Artist", "Song"), Quality::Lossless);
        assert_eq!(job.state(), JobState::Pending);

        job.begin();
        for _ in 0..100 {
            job.advance();
        }
        assert_eq!(
            job.progress(),
            PROGRESS_CEILING,
            "the bar never reaches 100 before completion"
        );

        job.complete();
        assert_eq!(job.progress(), 100);
        assert!(job.succeeded());

        // Ticks after a terminal state change nothing.
        job.advance();
        assert_eq!(job.progress(), 100);
    }

    #[test]
    fn failures_and_timeouts_are_distinct_terminal_states() {
        let mut job = Job::new(&track("1", "", "Song"), Quality::Exhigh);
        assert_eq!(job.name, "Song", "no artist prefix without an artist");

        job.begin();
        job.advance();
        let reached = job.progress();
        job.fail();
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.progress(), reached, "the red bar keeps its position");

        let mut job = Job::new(&track("1", "", "Song"), Quality::Exhigh);
        job.begin();
        job.time_out();
        assert_eq!(job.state(), JobState::TimedOut);
        assert!(!job.succeeded());
    }

    #[test]
    fn dedicated_header_wins_and_is_percent_decoded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-download-filename"),
            HeaderValue::from_static("Artist%20-%20Song.flac"),
        );
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"other.mp3\""),
        );

        assert_eq!(
            filename_from_headers(&headers).as_deref(),
            Some("Artist - Song.flac")
        );
    }

    #[test]
    fn content_disposition_prefers_the_extended_parameter() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static(
                "attachment; filename=\"plain.mp3\"; filename*=UTF-8''f%C3%BCr%20Elise.flac",
            ),
        );
        assert_eq!(
            filename_from_headers(&headers).as_deref(),
            Some("für Elise.flac")
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"plain.mp3\""),
        );
        assert_eq!(filename_from_headers(&headers).as_deref(), Some("plain.mp3"));

        assert_eq!(filename_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn fallback_extension_depends_on_the_tier() {
        assert_eq!(
            fallback_filename("Track A", Quality::Lossless),
            "Track A.flac"
        );
        assert_eq!(fallback_filename("Track A", Quality::Exhigh), "Track A.mp3");
        assert_eq!(fallback_filename("Track A", Quality::Hires), "Track A.mp3");
    }

    #[test]
    fn filenames_are_sanitized_for_the_filesystem() {
        assert_eq!(sanitize("a/b\\c:d*e?f"), "a_b_c_d_e_f");
        assert_eq!(sanitize("  .hidden.  "), "hidden");
        assert_eq!(sanitize("..."), "unnamed");
        assert!(sanitize(&"x".repeat(500)).chars().count() <= 200);
    }
}
