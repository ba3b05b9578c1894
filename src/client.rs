//! Typed client for the resolver service.
//!
//! [`Api`] pairs the rate-limited [`http::Client`](crate::http::Client)
//! with the wire types in [`protocol`](crate::protocol): one method per
//! service route, envelope unwrapping included. Server-reported failures
//! surface as [`Error`]s carrying the server message verbatim; transport
//! failures map through the `reqwest` error conversion.
//!
//! Nothing in here retries: a failed call is reported and the next
//! attempt is whatever the user triggers.

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    config::Config,
    error::{Error, ErrorKind, Result},
    http::Client as HttpClient,
    protocol::{
        auth::{CookieStatus, Unlocked},
        catalog::{Album, AlbumData, CatalogTrack, Playlist, PlaylistData, SearchResults, SongDetail},
        qr::{CheckStatus, Issued},
        Endpoint, Envelope,
    },
    track::Quality,
};

/// Client for all resolver service routes.
pub struct Api {
    http_client: HttpClient,
    base_url: Url,
}

impl Api {
    /// The `Content-Type` for the form-encoded POST routes.
    const FORM_CONTENT: HeaderValue = HeaderValue::from_static("application/x-www-form-urlencoded");

    /// Creates a client against the configured service base URL.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the underlying HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http_client: HttpClient::new(config)?,
            base_url: config.base_url.clone(),
        })
    }

    /// Builds the absolute URL for an endpoint path plus query pairs.
    ///
    /// Appends to any path prefix of the base URL, so the service may be
    /// mounted under a subpath behind a reverse proxy.
    fn endpoint_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| Error::invalid_argument("base URL cannot be a base"))?;
            segments.pop_if_empty();
            for segment in path.split('/').filter(|segment| !segment.is_empty()) {
                segments.push(segment);
            }
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Executes a GET against `T`'s route and unwraps the envelope.
    async fn get_data<T>(&self, query: &[(&str, &str)]) -> Result<T>
    where
        T: Endpoint + DeserializeOwned + std::fmt::Debug,
    {
        let url = self.endpoint_url(T::PATH, query)?;
        let request = self.http_client.get(url, "");

        let response = self.http_client.execute(request).await?;
        let envelope = response.json::<Envelope<T>>().await?;

        // Poll responses can carry the session credential.
        let redacted = T::PATH == CheckStatus::PATH;
        if redacted {
            trace!("{}: {{ ... }}", T::PATH);
        } else {
            trace!("{}: {envelope:#?}", T::PATH);
        }

        envelope.into_data()
    }

    /// Executes a form-encoded POST against `T`'s route and unwraps the
    /// envelope.
    async fn post_form<T>(&self, form: &[(&str, &str)]) -> Result<T>
    where
        T: Endpoint + DeserializeOwned + std::fmt::Debug,
    {
        let url = self.endpoint_url(T::PATH, &[])?;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();

        let mut request = self.http_client.post(url, body);
        request
            .headers_mut()
            .try_insert(CONTENT_TYPE, Self::FORM_CONTENT)?;

        let response = self.http_client.execute(request).await?;
        let envelope = response.json::<Envelope<T>>().await?;
        trace!("{}: {envelope:#?}", T::PATH);

        envelope.into_data()
    }

    /// Resolves one song to its metadata and direct audio URL.
    pub async fn resolve_song(&self, id: &str, quality: Quality) -> Result<SongDetail> {
        self.post_form(&[("url", id), ("level", quality.as_str()), ("type", "json")])
            .await
    }

    /// Resolves a playlist with its track listing.
    pub async fn resolve_playlist(&self, id: &str) -> Result<Playlist> {
        let data: PlaylistData = self.get_data(&[("id", id)]).await?;
        Ok(data.playlist)
    }

    /// Resolves an album with its track listing.
    pub async fn resolve_album(&self, id: &str) -> Result<Album> {
        let data: AlbumData = self.get_data(&[("id", id)]).await?;
        Ok(data.album)
    }

    /// Searches the catalog by keyword.
    pub async fn search(&self, keyword: &str, limit: u32) -> Result<Vec<CatalogTrack>> {
        let limit = limit.to_string();
        let results: SearchResults = self
            .get_data(&[("keyword", keyword), ("limit", &limit)])
            .await?;
        Ok(results.0)
    }

    /// Requests a fresh login QR code.
    pub async fn qr_issue(&self) -> Result<Issued> {
        self.get_data(&[]).await
    }

    /// Polls the scan status of a login code.
    pub async fn qr_check(&self, qr_key: &str) -> Result<CheckStatus> {
        self.get_data(&[("qr_key", qr_key)]).await
    }

    /// Checks validity and entitlement of the stored session.
    pub async fn cookie_status(&self) -> Result<CookieStatus> {
        self.get_data(&[]).await
    }

    /// Unlocks the QR login feature with the service password.
    pub async fn unlock_qr(&self, password: &str) -> Result<()> {
        let url = self.endpoint_url(Unlocked::PATH, &[("password", password)])?;
        let request = self.http_client.get(url, "");

        let response = self.http_client.execute(request).await?;
        let envelope = response.json::<Envelope<Unlocked>>().await?;
        if envelope.is_success() {
            Ok(())
        } else {
            Err(Error::permission_denied(envelope.message().to_owned()))
        }
    }

    /// Requests the audio file for a track.
    ///
    /// Returns the raw response so the caller can stream the body; the
    /// filename headers are still attached. Non-success statuses are
    /// turned into errors here, with the server message when the body
    /// carries an envelope.
    pub async fn download(&self, id: &str, quality: Quality) -> Result<reqwest::Response> {
        let url = self.endpoint_url("/download", &[])?;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs([("id", id), ("quality", quality.as_str()), ("format", "file")])
            .finish();

        let mut request = self.http_client.post(url, body);
        request
            .headers_mut()
            .try_insert(CONTENT_TYPE, Self::FORM_CONTENT)?;

        let response = self.http_client.execute(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let kind = match status.as_u16() {
            401 => ErrorKind::Unauthenticated,
            403 => ErrorKind::PermissionDenied,
            404 => ErrorKind::NotFound,
            429 => ErrorKind::ResourceExhausted,
            500.. => ErrorKind::Unavailable,
            _ => ErrorKind::FailedPrecondition,
        };
        let message = response
            .text()
            .await
            .ok()
            .and_then(|text| serde_json::from_str::<Envelope<serde_json::Value>>(&text).ok())
            .map_or_else(
                || format!("download failed with HTTP {status}"),
                |envelope| envelope.message().to_owned(),
            );
        Err(Error::new(kind, message))
    }
}
