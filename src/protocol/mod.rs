//! Wire contract of the resolver service.
//!
//! This module contains the typed request/response shapes used across the
//! service's endpoint families:
//!
//! # Submodules
//!
//! * [`auth`] - Session validity check and the QR password gate
//! * [`catalog`] - Song, playlist and album resolution plus search
//! * [`qr`] - QR login issue and status polling
//!
//! # Envelope
//!
//! Every JSON endpoint wraps its payload in the same envelope:
//!
//! ```json
//! {
//!     "status": 200,
//!     "success": true,
//!     "message": "ok",
//!     "data": { ... }
//! }
//! ```
//!
//! Catalog routes signal success through the HTTP-like `status` field,
//! the login routes through `success`; [`Envelope`] accepts either.
//! Server-reported failures keep the server's `message` verbatim so it
//! can be surfaced to the user unchanged.

pub mod auth;
pub mod catalog;
pub mod qr;

use serde::Deserialize;

use crate::error::{Error, ErrorKind, Result};

/// Names the resolver service route a wire type is returned from.
///
/// Each type implementing this trait represents the `data` payload of a
/// specific endpoint, identified by its path.
pub trait Endpoint {
    /// Path of the endpoint, relative to the service base URL.
    const PATH: &'static str;
}

/// Response envelope common to all JSON endpoints.
#[derive(Clone, Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Envelope<T> {
    /// HTTP-like status code, set by the catalog routes.
    #[serde(default)]
    pub status: Option<i64>,

    /// Success flag, set by the login routes.
    #[serde(default)]
    pub success: Option<bool>,

    /// Human-readable server message, kept verbatim.
    #[serde(default)]
    pub message: Option<String>,

    /// Endpoint payload, absent on failure.
    #[serde(default)]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Whether the server reported success in either envelope dialect.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success.unwrap_or(false) || self.status == Some(200)
    }

    /// Server message, or a placeholder when none was sent.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message
            .as_deref()
            .filter(|message| !message.is_empty())
            .unwrap_or("no message from server")
    }

    /// Unwraps the payload.
    ///
    /// Server-reported failures become errors categorized by the envelope
    /// status, carrying the server message verbatim. A success envelope
    /// without a payload is treated as data loss.
    pub fn into_data(self) -> Result<T> {
        if !self.is_success() {
            let kind = match self.status {
                Some(401) => ErrorKind::Unauthenticated,
                Some(403) => ErrorKind::PermissionDenied,
                Some(404) => ErrorKind::NotFound,
                Some(429) => ErrorKind::ResourceExhausted,
                Some(status) if status >= 500 => ErrorKind::Unavailable,
                _ => ErrorKind::FailedPrecondition,
            };
            return Err(Error::new(kind, self.message().to_owned()));
        }

        let message = self.message().to_owned();
        self.data
            .ok_or_else(|| Error::data_loss(format!("response without payload: {message}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        value: u32,
    }

    #[test]
    fn catalog_dialect_succeeds_by_status() {
        let envelope: Envelope<Payload> =
            serde_json::from_str(r#"{"status": 200, "data": {"value": 7}}"#).unwrap();
        assert!(envelope.is_success());
        assert_eq!(envelope.into_data().unwrap(), Payload { value: 7 });
    }

    #[test]
    fn login_dialect_succeeds_by_flag() {
        let envelope: Envelope<Payload> =
            serde_json::from_str(r#"{"success": true, "data": {"value": 3}}"#).unwrap();
        assert!(envelope.is_success());
    }

    #[test]
    fn failure_keeps_server_message_verbatim() {
        let envelope: Envelope<Payload> = serde_json::from_str(
            r#"{"status": 404, "success": false, "message": "song is region locked"}"#,
        )
        .unwrap();
        let err = envelope.into_data().unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(err.to_string().contains("song is region locked"));
    }

    #[test]
    fn missing_payload_on_success_is_data_loss() {
        let envelope: Envelope<Payload> = serde_json::from_str(r#"{"status": 200}"#).unwrap();
        assert_eq!(envelope.into_data().unwrap_err().kind, ErrorKind::DataLoss);
    }
}
