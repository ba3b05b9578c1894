//! QR login state machine and its timer driver.
//!
//! A login attempt is a small state machine:
//!
//! ```text
//! Idle → Waiting → Scanned → Confirmed
//!            \________\____→ Expired | Failed
//! ```
//!
//! [`LoginFlow`] holds the machine. It is driven entirely through
//! [`tick`](LoginFlow::tick) with explicit instants, so tests can run it
//! on synthetic time; [`run`] owns the real timers and the network
//! round-trips.
//!
//! Two schedules run while a code is on screen: a 180-second countdown
//! and a 3-second poll cadence capped at 60 polls. Whatever resolves
//! the attempt (confirmation, expiry, poll exhaustion, a transport
//! failure, or a manual reset) retires both schedules at once. After
//! that the machine is inert: no late tick or poll response mutates it.

use std::{
    io::Write,
    path::Path,
    time::{Duration, Instant},
};

use base64::prelude::*;
use qrcode::{render::unicode::Dense1x2, QrCode};

use crate::{
    client::Api,
    error::{Error, Result},
    protocol::qr::{CheckStatus, Issued, StatusCode},
    session::Credential,
};

/// Lifetime of a login code.
pub const CODE_LIFETIME: Duration = Duration::from_secs(180);

/// Interval between status polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Upper bound on status polls for one code.
pub const MAX_POLLS: u32 = 60;

/// Login page an issued key points at; the QR code encodes this link.
const LOGIN_URL: &str = "https://music.163.com/login?codekey=";

/// State of one login attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LoginState {
    /// No code issued.
    Idle,

    /// Code displayed, not scanned yet.
    Waiting,

    /// Scanned on the phone, awaiting confirmation there.
    Scanned,

    /// Login confirmed; the session credential was captured.
    Confirmed {
        /// Raw credential as delivered by the poll.
        cookie: String,
        /// VIP entitlement of the fresh session.
        is_vip: bool,
    },

    /// The code expired: server-side, countdown, or poll budget.
    Expired,

    /// A transport failure ended the attempt.
    Failed,
}

/// A status poll due for the given key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Poll {
    pub key: String,
}

/// The login state machine.
///
/// At most one attempt is live per machine; [`start`](Self::start)
/// rebuilds it around a fresh key, which makes any earlier attempt's
/// schedules dead on the spot.
#[derive(Debug)]
pub struct LoginFlow {
    state: LoginState,
    key: Option<String>,
    deadline: Option<Instant>,
    next_poll: Option<Instant>,
    polls: u32,

    lifetime: Duration,
    poll_interval: Duration,
    max_polls: u32,
}

impl Default for LoginFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginFlow {
    /// A machine with the standard timing.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timing(CODE_LIFETIME, POLL_INTERVAL, MAX_POLLS)
    }

    /// A machine with explicit timing, for driving on synthetic time.
    #[must_use]
    pub fn with_timing(lifetime: Duration, poll_interval: Duration, max_polls: u32) -> Self {
        Self {
            state: LoginState::Idle,
            key: None,
            deadline: None,
            next_poll: None,
            polls: 0,
            lifetime,
            poll_interval,
            max_polls,
        }
    }

    /// Arms the countdown and the poll schedule for a freshly issued key.
    pub fn start(&mut self, key: String, now: Instant) {
        self.state = LoginState::Waiting;
        self.key = Some(key);
        self.deadline = Some(now + self.lifetime);
        self.next_poll = Some(now + self.poll_interval);
        self.polls = 0;
    }

    /// Manual reset to [`Idle`](LoginState::Idle) from any state. Stops
    /// countdown and polling and clears the displayed key.
    pub fn reset(&mut self) {
        self.state = LoginState::Idle;
        self.key = None;
        self.deadline = None;
        self.next_poll = None;
        self.polls = 0;
    }

    #[must_use]
    pub fn state(&self) -> &LoginState {
        &self.state
    }

    /// Whether the attempt has resolved one way or the other.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            LoginState::Confirmed { .. } | LoginState::Expired | LoginState::Failed
        )
    }

    /// Countdown left before the code expires.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline
            .map_or(Duration::ZERO, |deadline| {
                deadline.saturating_duration_since(now)
            })
    }

    /// Countdown formatted `m:ss` for display.
    #[must_use]
    pub fn countdown(&self, now: Instant) -> String {
        let secs = self.remaining(now).as_secs();
        format!("{}:{:02}", secs / 60, secs % 60)
    }

    /// Advances the schedules to `now` and reports the action due.
    ///
    /// The poll budget is checked before the countdown so exhaustion
    /// forces expiry even while the countdown still shows time left.
    /// Once resolved, every later tick is a no-op.
    pub fn tick(&mut self, now: Instant) -> Option<Poll> {
        if !self.is_polling() {
            return None;
        }

        let poll_due = self.next_poll.is_some_and(|at| now >= at);
        if poll_due && self.polls >= self.max_polls {
            debug!("login gave up after {} polls", self.polls);
            self.resolve(LoginState::Expired);
            return None;
        }

        if self.deadline.is_some_and(|deadline| now >= deadline) {
            debug!("login code expired after its countdown");
            self.resolve(LoginState::Expired);
            return None;
        }

        if !poll_due {
            return None;
        }

        self.polls += 1;
        self.next_poll = Some(now + self.poll_interval);
        self.key.clone().map(|key| Poll { key })
    }

    /// Applies a poll result. Inert unless a code is being polled.
    pub fn on_status(&mut self, status: &CheckStatus) {
        if !self.is_polling() {
            return;
        }

        match status.status_code {
            StatusCode::Confirmed => match &status.cookie {
                Some(cookie) => {
                    let is_vip = status.is_vip.unwrap_or(false);
                    self.resolve(LoginState::Confirmed {
                        cookie: cookie.clone(),
                        is_vip,
                    });
                }
                None => {
                    warn!("login confirmed but no credential was delivered");
                    self.resolve(LoginState::Failed);
                }
            },
            StatusCode::Expired => self.resolve(LoginState::Expired),
            StatusCode::Scanned => self.state = LoginState::Scanned,
            StatusCode::Waiting | StatusCode::Pending => {}
        }
    }

    /// A transport failure during polling ends the attempt.
    pub fn on_transport_error(&mut self) {
        if self.is_polling() {
            self.resolve(LoginState::Failed);
        }
    }

    fn is_polling(&self) -> bool {
        matches!(self.state, LoginState::Waiting | LoginState::Scanned)
    }

    /// Enters a terminal state, retiring countdown and polling together.
    fn resolve(&mut self, state: LoginState) {
        self.state = state;
        self.deadline = None;
        self.next_poll = None;
    }
}

/// A completed login.
#[derive(Debug)]
pub struct LoginOutcome {
    pub credential: Credential,
    pub is_vip: bool,
}

/// Drives a full QR login against the resolver service.
///
/// Unlocks the QR feature first when a password is given, issues a code,
/// renders it to the terminal (and optionally to a PNG file), then runs
/// countdown and polling until the machine resolves.
pub async fn run(
    api: &Api,
    password: Option<&str>,
    image_path: Option<&Path>,
) -> Result<LoginOutcome> {
    if let Some(password) = password {
        api.unlock_qr(password).await?;
    }

    let issued = api.qr_issue().await?;
    if let Some(path) = image_path {
        save_code_image(&issued, path)?;
        info!("login code image written to {}", path.display());
    }

    println!("{}", render_terminal_code(&issued.qr_key)?);
    println!("scan the code with the catalog app; it is valid for 3 minutes");

    let mut flow = LoginFlow::new();
    flow.start(issued.qr_key, Instant::now());

    let mut scanned_shown = false;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let now = Instant::now();

        if let Some(poll) = flow.tick(now) {
            match api.qr_check(&poll.key).await {
                Ok(status) => flow.on_status(&status),
                Err(e) => {
                    error!("login status poll failed: {e}");
                    flow.on_transport_error();
                }
            }
        }

        match flow.state() {
            LoginState::Confirmed { cookie, is_vip } => {
                println!();
                let is_vip = *is_vip;
                let credential = Credential::from_session_token(cookie)?;
                return Ok(LoginOutcome { credential, is_vip });
            }
            LoginState::Expired => {
                println!("\nthe login code expired; run login again for a fresh one");
                return Err(Error::deadline_exceeded("login code expired"));
            }
            LoginState::Failed => {
                println!();
                return Err(Error::unavailable("login failed; try again"));
            }
            LoginState::Scanned if !scanned_shown => {
                scanned_shown = true;
                println!("\ncode scanned; confirm the login on your phone");
            }
            _ => {}
        }

        print!("\rcode expires in {}  ", flow.countdown(now));
        let _ = std::io::stdout().flush();
    }
}

/// Renders the login link for `key` as a terminal QR code.
fn render_terminal_code(key: &str) -> Result<String> {
    let code = QrCode::new(format!("{LOGIN_URL}{key}").as_bytes())?;
    Ok(code.render::<Dense1x2>().quiet_zone(true).build())
}

/// Writes the server-rendered PNG of the code to `path`.
fn save_code_image(issued: &Issued, path: &Path) -> Result<()> {
    // Some revisions of the service send a data URL instead of bare Base64.
    let encoded = issued
        .qr_base64
        .rsplit_once("base64,")
        .map_or(issued.qr_base64.as_str(), |(_, data)| data);

    let image = BASE64_STANDARD.decode(encoded)?;
    std::fs::write(path, image)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: StatusCode) -> CheckStatus {
        CheckStatus {
            status_code: code,
            message: String::new(),
            cookie: None,
            is_vip: None,
        }
    }

    fn confirmed(cookie: &str, is_vip: bool) -> CheckStatus {
        CheckStatus {
            status_code: StatusCode::Confirmed,
            message: String::new(),
            cookie: Some(cookie.to_owned()),
            is_vip: Some(is_vip),
        }
    }

    #[test]
    fn scan_and_confirm_walks_the_states() {
        let t0 = Instant::now();
        let mut flow = LoginFlow::new();
        assert_eq!(*flow.state(), LoginState::Idle);
        assert_eq!(flow.tick(t0), None, "idle machines never poll");

        flow.start("key-1".to_owned(), t0);
        assert_eq!(*flow.state(), LoginState::Waiting);
        assert_eq!(flow.countdown(t0), "3:00");

        // Not due yet.
        assert_eq!(flow.tick(t0 + Duration::from_secs(1)), None);

        let poll = flow.tick(t0 + Duration::from_secs(3)).unwrap();
        assert_eq!(poll.key, "key-1");
        flow.on_status(&status(StatusCode::Waiting));
        assert_eq!(*flow.state(), LoginState::Waiting);

        assert!(flow.tick(t0 + Duration::from_secs(6)).is_some());
        flow.on_status(&status(StatusCode::Scanned));
        assert_eq!(*flow.state(), LoginState::Scanned);

        assert!(flow.tick(t0 + Duration::from_secs(9)).is_some());
        flow.on_status(&confirmed("MUSIC_U=tok", true));
        assert_eq!(
            *flow.state(),
            LoginState::Confirmed {
                cookie: "MUSIC_U=tok".to_owned(),
                is_vip: true
            }
        );

        // Resolved machines are inert.
        assert_eq!(flow.tick(t0 + Duration::from_secs(12)), None);
        flow.on_status(&status(StatusCode::Expired));
        assert!(matches!(*flow.state(), LoginState::Confirmed { .. }));
    }

    #[test]
    fn countdown_expiry_beats_any_late_poll_result() {
        let t0 = Instant::now();
        let mut flow = LoginFlow::new();
        flow.start("key".to_owned(), t0);

        assert_eq!(flow.tick(t0 + CODE_LIFETIME), None);
        assert_eq!(*flow.state(), LoginState::Expired);
        assert_eq!(flow.remaining(t0 + CODE_LIFETIME), Duration::ZERO);

        // A confirmation that was in flight when the countdown hit zero
        // must not resurrect the attempt.
        flow.on_status(&confirmed("MUSIC_U=tok", false));
        assert_eq!(*flow.state(), LoginState::Expired);
        assert_eq!(flow.tick(t0 + CODE_LIFETIME + Duration::from_secs(3)), None);
    }

    #[test]
    fn poll_budget_forces_expiry_before_the_countdown() {
        let t0 = Instant::now();
        // Generous lifetime so only the poll budget can end the attempt.
        let mut flow = LoginFlow::with_timing(Duration::from_secs(600), POLL_INTERVAL, MAX_POLLS);
        flow.start("key".to_owned(), t0);

        let mut now = t0;
        for n in 1..=MAX_POLLS {
            now += POLL_INTERVAL;
            assert!(flow.tick(now).is_some(), "poll {n} should be issued");
            flow.on_status(&status(StatusCode::Waiting));
        }

        now += POLL_INTERVAL;
        assert_eq!(flow.tick(now), None);
        assert_eq!(*flow.state(), LoginState::Expired);
        assert!(
            flow.remaining(now) == Duration::ZERO,
            "expiry retires the countdown"
        );
    }

    #[test]
    fn transport_failures_end_the_attempt() {
        let t0 = Instant::now();
        let mut flow = LoginFlow::new();
        flow.start("key".to_owned(), t0);

        assert!(flow.tick(t0 + POLL_INTERVAL).is_some());
        flow.on_transport_error();
        assert_eq!(*flow.state(), LoginState::Failed);
        assert_eq!(flow.tick(t0 + POLL_INTERVAL * 2), None);

        // A second failure report is inert.
        flow.on_transport_error();
        assert_eq!(*flow.state(), LoginState::Failed);
    }

    #[test]
    fn confirmation_without_a_credential_fails() {
        let t0 = Instant::now();
        let mut flow = LoginFlow::new();
        flow.start("key".to_owned(), t0);

        assert!(flow.tick(t0 + POLL_INTERVAL).is_some());
        flow.on_status(&status(StatusCode::Confirmed));
        assert_eq!(*flow.state(), LoginState::Failed);
    }

    #[test]
    fn reset_returns_to_idle_and_cancels_both_schedules() {
        let t0 = Instant::now();
        let mut flow = LoginFlow::new();
        flow.start("key".to_owned(), t0);
        assert!(flow.tick(t0 + POLL_INTERVAL).is_some());

        flow.reset();
        assert_eq!(*flow.state(), LoginState::Idle);
        assert_eq!(flow.remaining(t0), Duration::ZERO);
        assert_eq!(flow.tick(t0 + POLL_INTERVAL * 2), None);
    }

    #[test]
    fn restarting_supersedes_the_previous_attempt() {
        let t0 = Instant::now();
        let mut flow = LoginFlow::new();
        flow.start("old".to_owned(), t0);
        assert!(flow.tick(t0 + POLL_INTERVAL).is_some());

        flow.start("new".to_owned(), t0 + Duration::from_secs(10));
        assert_eq!(*flow.state(), LoginState::Waiting);

        let poll = flow.tick(t0 + Duration::from_secs(13)).unwrap();
        assert_eq!(poll.key, "new", "old key must never be polled again");
        assert_eq!(flow.countdown(t0 + Duration::from_secs(10)), "3:00");
    }
}
