//! Per-action session and entitlement gate.
//!
//! Downloads and song-level parses out of a displayed collection only
//! make sense with a valid, VIP-entitled catalog session. The gate
//! re-checks the stored session against the service before every such
//! action (the result is never cached across actions) and runs the
//! action only when both checks pass.
//!
//! Refusals map onto the error categories the caller already handles:
//! a missing or expired session asks for a fresh QR login, a valid but
//! entitlement-less session is refused outright, and a failed check
//! reports the service as unreachable.

use std::future::Future;

use crate::{
    client::Api,
    error::{Error, Result},
    protocol::auth::CookieStatus,
};

/// Outcome of the pre-action session check.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Access {
    /// Valid session with VIP entitlement; the action may run.
    Granted,

    /// Session missing, invalid or expired; a fresh login is needed.
    LoginRequired,

    /// Valid session without the VIP entitlement.
    VipRequired,

    /// The validity check itself failed.
    Unreachable,
}

impl Access {
    /// Classifies a session snapshot from the validity endpoint.
    #[must_use]
    pub fn from_status(status: CookieStatus) -> Self {
        match (status.valid, status.is_vip) {
            (false, _) => Access::LoginRequired,
            (true, false) => Access::VipRequired,
            (true, true) => Access::Granted,
        }
    }

    #[must_use]
    pub fn is_granted(self) -> bool {
        self == Access::Granted
    }
}

/// Runs `action` exactly once when `access` grants it.
///
/// Every other access level returns the matching error without
/// invoking the action.
pub async fn admit<F, Fut, T>(access: Access, action: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match access {
        Access::Granted => action().await,
        Access::LoginRequired => Err(Error::unauthenticated(
            "session is missing or expired; sign in with the login QR code",
        )),
        Access::VipRequired => Err(Error::permission_denied(
            "session has no VIP entitlement; elevated quality tiers are unavailable",
        )),
        Access::Unreachable => Err(Error::unavailable(
            "could not verify the session; try again or sign in anew",
        )),
    }
}

/// The gate itself, bound to a service client.
pub struct Gate<'a> {
    api: &'a Api,
}

impl<'a> Gate<'a> {
    #[must_use]
    pub fn new(api: &'a Api) -> Self {
        Self { api }
    }

    /// Checks the session now. Each call hits the service; earlier
    /// results are never reused.
    pub async fn check(&self) -> Access {
        match self.api.cookie_status().await {
            Ok(status) => Access::from_status(status),
            Err(e) => {
                warn!("session check failed: {e}");
                Access::Unreachable
            }
        }
    }

    /// Checks the session and runs `action` only when it is valid and
    /// VIP-entitled.
    pub async fn require<F, Fut, T>(&self, action: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        admit(self.check().await, action).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn snapshots_classify_by_validity_then_entitlement() {
        let status = |valid, is_vip| CookieStatus { valid, is_vip };

        assert_eq!(
            Access::from_status(status(false, false)),
            Access::LoginRequired
        );
        assert_eq!(
            Access::from_status(status(false, true)),
            Access::LoginRequired,
            "entitlement is irrelevant on an invalid session"
        );
        assert_eq!(
            Access::from_status(status(true, false)),
            Access::VipRequired
        );
        assert_eq!(Access::from_status(status(true, true)), Access::Granted);
    }

    #[tokio::test]
    async fn granted_access_runs_the_action_exactly_once() {
        let mut calls = 0;
        let result = admit(Access::Granted, || {
            calls += 1;
            async { Ok(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn refusals_never_invoke_the_action() {
        for (access, kind) in [
            (Access::LoginRequired, ErrorKind::Unauthenticated),
            (Access::VipRequired, ErrorKind::PermissionDenied),
            (Access::Unreachable, ErrorKind::Unavailable),
        ] {
            let mut calls = 0;
            let result: Result<i32> = admit(access, || {
                calls += 1;
                async { Ok(1) }
            })
            .await;

            assert_eq!(result.unwrap_err().kind, kind);
            assert_eq!(calls, 0, "{access:?} must not run the action");
        }
    }
}
