//! Session validity and password gate wire types.

use serde::Deserialize;

use super::Endpoint;

/// Snapshot of the stored session's validity, checked before every gated
/// action.
impl Endpoint for CookieStatus {
    const PATH: &'static str = "/api/check-cookie";
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct CookieStatus {
    /// Whether the stored credential is present and not expired.
    #[serde(default)]
    pub valid: bool,

    /// VIP entitlement of the session.
    #[serde(default)]
    pub is_vip: bool,
}

/// Result of the QR password gate; carries no payload beyond the
/// envelope's success flag.
impl Endpoint for Unlocked {
    const PATH: &'static str = "/api/qr/unlock";
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct Unlocked {}
