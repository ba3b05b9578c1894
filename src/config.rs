use std::{path::PathBuf, time::Duration};

use sysinfo;
use url::Url;

use crate::track::Quality;

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,
    pub app_lang: String,

    /// Base URL of the resolver service.
    pub base_url: Url,

    /// Quality tier requested when resolving and downloading.
    pub quality: Quality,

    /// Directory where downloaded files are saved.
    pub downloads_dir: PathBuf,

    /// Upper bound on the wait for a single download.
    pub download_timeout: Duration,

    /// Maximum number of downloads in flight during a batch.
    ///
    /// Defaults to 1: batch items are fetched one at a time so the
    /// resolver service is never hit with an unbounded burst.
    pub batch_concurrency: usize,

    pub user_agent: String,
}

impl Config {
    /// Default wait bound for a single download.
    const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

    #[must_use]
    pub fn with_base_url(base_url: Url) -> Self {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();
        let app_lang = "en".to_owned();

        // Additional `User-Agent` string checks on top of `reqwest::HeaderValue`.
        let illegal_chars = |chr| chr == '/' || chr == ';';
        if app_name.is_empty()
            || app_name.contains(illegal_chars)
            || app_version.is_empty()
            || app_version.contains(illegal_chars)
            || app_lang.chars().count() != 2
            || app_lang.contains(illegal_chars)
        {
            panic!(
                "application name, version and/or language invalid (\"{app_name}\"; \"{app_version}\"; \"{app_lang}\")"
            );
        }

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version().unwrap_or_else(|| String::from("0"));
        if os_name.is_empty()
            || os_name.contains(illegal_chars)
            || os_version.is_empty()
            || os_version.contains(illegal_chars)
        {
            panic!("os name and/or version invalid (\"{os_name}\"; \"{os_version}\")");
        }

        let user_agent =
            format!("{app_name}/{app_version} (Rust; {os_name}/{os_version}; Headless; {app_lang})");
        trace!("user agent: {user_agent}");

        Self {
            app_name,
            app_version,
            app_lang,

            base_url,

            quality: Quality::default(),
            downloads_dir: PathBuf::from("downloads"),
            download_timeout: Self::DOWNLOAD_TIMEOUT,
            batch_concurrency: 1,

            user_agent,
        }
    }
}
