//! QR login wire types.
//!
//! The resolver service issues login QR codes on behalf of the catalog
//! and reports their scan status with the catalog's integer codes.
//!
//! # Wire Format
//!
//! Issue:
//!
//! ```json
//! { "success": true, "data": { "qr_key": "…", "qr_base64": "…" } }
//! ```
//!
//! Poll:
//!
//! ```json
//! {
//!     "success": true,
//!     "data": {
//!         "status_code": 803,
//!         "message": "login confirmed",
//!         "cookie": "MUSIC_U=…",
//!         "is_vip": true
//!     }
//! }
//! ```

use serde::Deserialize;
use serde_repr::Deserialize_repr;

use super::Endpoint;

/// A freshly issued login code.
impl Endpoint for Issued {
    const PATH: &'static str = "/api/qr/generate";
}

#[derive(Clone, Debug, Deserialize)]
pub struct Issued {
    /// Opaque key correlating the displayed code with its status polls.
    pub qr_key: String,

    /// PNG image of the code, Base64 encoded.
    pub qr_base64: String,
}

/// Catalog status codes for a login code.
#[derive(Clone, Copy, Debug, Deserialize_repr, Eq, Hash, PartialEq)]
#[repr(u16)]
pub enum StatusCode {
    /// The code expired on the server.
    Expired = 800,

    /// Displayed but not scanned yet.
    Waiting = 801,

    /// Scanned, awaiting confirmation on the phone.
    Scanned = 802,

    /// Confirmed; the session credential accompanies this code.
    Confirmed = 803,

    /// Any other code the catalog may send while the login is pending.
    #[serde(other)]
    Pending = 0,
}

/// One poll result for a login code.
impl Endpoint for CheckStatus {
    const PATH: &'static str = "/api/qr/check";
}

#[derive(Clone, Debug, Deserialize)]
pub struct CheckStatus {
    pub status_code: StatusCode,

    #[serde(default)]
    pub message: String,

    /// Session credential, present once the login is confirmed.
    #[serde(default)]
    pub cookie: Option<String>,

    /// VIP entitlement of the confirmed session.
    #[serde(default)]
    pub is_vip: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_and_tolerate_unknowns() {
        let confirmed: CheckStatus = serde_json::from_str(
            r#"{"status_code": 803, "message": "ok", "cookie": "MUSIC_U=abc", "is_vip": true}"#,
        )
        .unwrap();
        assert_eq!(confirmed.status_code, StatusCode::Confirmed);
        assert_eq!(confirmed.cookie.as_deref(), Some("MUSIC_U=abc"));

        let odd: CheckStatus = serde_json::from_str(r#"{"status_code": 850}"#).unwrap();
        assert_eq!(odd.status_code, StatusCode::Pending);
        assert_eq!(odd.cookie, None);
    }
}
