//! Session credential storage.
//!
//! The resolver service keeps the catalog session server-side; this
//! client stores its own copy of the credential in a TOML secrets file
//! so login state survives restarts. The credential is the catalog's
//! cookie string and grants full account access, so it is:
//!
//! * Redacted in debug output
//! * Size- and format-checked before use
//! * Never logged by this crate

use std::{fs, path::Path, str::FromStr};

use veil::Redact;

use crate::error::{Error, Result};

/// Cookie field that carries the account session.
const SESSION_FIELD: &str = "MUSIC_U";

/// Key under which the credential is stored in the secrets file.
const SECRETS_KEY: &str = "cookie";

/// Catalog session credential.
///
/// Holds the full cookie string (`MUSIC_U=…;os=pc;…`) as the catalog
/// expects it. Constructed from a secrets file or from the bare session
/// token a confirmed QR login returns.
#[derive(Redact, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Credential {
    /// Full cookie string. Redacted in debug output.
    #[redact]
    cookie: String,
}

impl Credential {
    /// Prevent out-of-memory condition: the secrets file should be small.
    const MAX_FILE_SIZE: u64 = 4096;

    /// Wraps the session token from a confirmed login into a full cookie
    /// string. A value that already looks like a cookie string is kept
    /// as-is.
    pub fn from_session_token(token: &str) -> Result<Self> {
        let token = token.trim();
        if token.contains('=') {
            token.parse()
        } else {
            format!("{SESSION_FIELD}={token};os=pc;appver=8.9.70;").parse()
        }
    }

    /// The cookie string as sent to the catalog.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.cookie
    }

    /// Loads the credential from a TOML secrets file.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file is missing, oversized, not valid
    /// TOML, or does not contain a plausible cookie under `cookie`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let attributes = fs::metadata(path)?;
        if attributes.len() > Self::MAX_FILE_SIZE {
            return Err(Error::invalid_argument(format!(
                "{} is too large",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        let value = contents.parse::<toml::Table>()?;

        match value.get(SECRETS_KEY).and_then(toml::Value::as_str) {
            Some(cookie) => cookie.parse(),
            None => Err(Error::invalid_argument(format!(
                "{} does not contain a cookie",
                path.display()
            ))),
        }
    }

    /// Writes the credential to the TOML secrets file, replacing any
    /// previous contents.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut table = toml::Table::new();
        table.insert(
            SECRETS_KEY.to_owned(),
            toml::Value::String(self.cookie.clone()),
        );
        fs::write(path, table.to_string())?;
        Ok(())
    }
}

impl FromStr for Credential {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let cookie = s.trim();
        if cookie.is_empty() {
            return Err(Error::invalid_argument("cookie is empty"));
        }
        if !cookie.contains(SESSION_FIELD) {
            return Err(Error::invalid_argument(format!(
                "cookie does not contain a {SESSION_FIELD} session field"
            )));
        }
        if cookie.chars().any(char::is_control) {
            return Err(Error::invalid_argument("cookie contains control characters"));
        }

        Ok(Self {
            cookie: cookie.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_token_is_wrapped_into_a_cookie() {
        let credential = Credential::from_session_token("abc123").unwrap();
        assert!(credential.as_str().starts_with("MUSIC_U=abc123;"));

        let full = Credential::from_session_token("MUSIC_U=abc123;os=pc;").unwrap();
        assert_eq!(full.as_str(), "MUSIC_U=abc123;os=pc;");
    }

    #[test]
    fn rejects_cookies_without_a_session_field() {
        assert!("".parse::<Credential>().is_err());
        assert!("os=pc;appver=1.0;".parse::<Credential>().is_err());
        assert!("MUSIC_U=x;\nMUSIC_A=y".parse::<Credential>().is_err());
    }

    #[test]
    fn debug_output_is_redacted() {
        let credential: Credential = "MUSIC_U=super-secret-token;".parse().unwrap();
        let debug = format!("{credential:?}");
        assert!(!debug.contains("super-secret-token"));
    }

    #[test]
    fn secrets_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");

        let credential = Credential::from_session_token("roundtrip").unwrap();
        credential.save(&path).unwrap();

        let loaded = Credential::from_file(&path).unwrap();
        assert_eq!(loaded, credential);
    }

    #[test]
    fn oversized_secrets_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        let filler = "x".repeat(8192);
        std::fs::write(&path, format!("cookie = \"MUSIC_U={filler}\"\n")).unwrap();

        assert!(Credential::from_file(&path).is_err());
    }
}
