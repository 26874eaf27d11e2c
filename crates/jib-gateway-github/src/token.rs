use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use jib_gateway_core::AuthMode;
use jib_gateway_core::config::home_dir;
use secrecy::SecretString;
use serde::Deserialize;

/// Environment variable holding the incognito personal access token.
pub const INCOGNITO_TOKEN_VAR: &str = "GITHUB_INCOGNITO_TOKEN";

/// Token becomes unusable this many seconds before its declared expiry.
const EXPIRY_GUARD_SECS: f64 = 300.0;

/// On-disk shape written by the external token refresher.
#[derive(Debug, Deserialize)]
struct TokenFile {
    token: String,
    expires_at_unix: f64,
    #[serde(default)]
    expires_at: String,
}

/// A GitHub App installation token with its expiry metadata.
#[derive(Clone)]
struct CachedToken {
    secret: SecretString,
    expires_at_unix: f64,
    expires_at: String,
}

impl CachedToken {
    /// Expired means "within the guard band of expiry": a push that starts
    /// with two minutes of validity left will fail halfway through.
    fn is_expired(&self) -> bool {
        unix_now() > self.expires_at_unix - EXPIRY_GUARD_SECS
    }

    fn minutes_until_expiry(&self) -> f64 {
        (self.expires_at_unix - unix_now()) / 60.0
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("GitHub token not available. Check the github-token-refresher service.")]
    BotUnavailable,

    #[error("Incognito token not available. Set {INCOGNITO_TOKEN_VAR} environment variable.")]
    IncognitoUnavailable,
}

/// Holds the bot installation token (re-read from disk on expiry) and the
/// optional incognito PAT (read from the environment once at construction).
///
/// Readers receive an immutable [`SecretString`] snapshot; the store is the
/// only owner. Token bytes never appear in `Debug` output or logs.
pub struct TokenStore {
    token_file: PathBuf,
    cached: Mutex<Option<CachedToken>>,
    incognito: Option<SecretString>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("token_file", &self.token_file)
            .field("incognito_configured", &self.incognito.is_some())
            .finish()
    }
}

impl TokenStore {
    /// Construct with the incognito PAT taken from [`INCOGNITO_TOKEN_VAR`].
    pub fn new(token_file: PathBuf) -> Self {
        let incognito = std::env::var(INCOGNITO_TOKEN_VAR)
            .ok()
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .map(SecretString::from);
        Self::with_incognito(token_file, incognito)
    }

    /// Construct with an explicit incognito PAT (or none).
    pub fn with_incognito(token_file: PathBuf, incognito: Option<SecretString>) -> Self {
        Self {
            token_file,
            cached: Mutex::new(None),
            incognito,
        }
    }

    /// The standard token file location: the in-container secrets mount when
    /// present, otherwise the host refresher drop point.
    pub fn default_token_file() -> PathBuf {
        let mounted = PathBuf::from("/secrets/.github-token");
        if mounted.exists() {
            mounted
        } else {
            home_dir().join(".jib-gateway").join(".github-token")
        }
    }

    pub fn token_file(&self) -> &Path {
        &self.token_file
    }

    /// The token for `mode`, or a typed "not available".
    ///
    /// Bot tokens are cached in memory and re-read from disk only once the
    /// cached copy passes its expiry guard; the lock ensures two concurrent
    /// refreshes do not both hit the filesystem.
    pub fn token_for_mode(&self, mode: AuthMode) -> Result<SecretString, TokenError> {
        match mode {
            AuthMode::Incognito => self
                .incognito
                .clone()
                .ok_or(TokenError::IncognitoUnavailable),
            AuthMode::Bot => self.bot_token().ok_or(TokenError::BotUnavailable),
        }
    }

    pub fn is_valid(&self, mode: AuthMode) -> bool {
        self.token_for_mode(mode).is_ok()
    }

    fn bot_token(&self) -> Option<SecretString> {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Some(token.secret.clone());
            }
        }

        let fresh = self.read_token_file()?;
        if fresh.is_expired() {
            tracing::warn!(
                expires_at = %fresh.expires_at,
                "token from file is expired"
            );
            *cached = None;
            return None;
        }

        tracing::debug!(
            minutes_until_expiry = %format!("{:.1}", fresh.minutes_until_expiry()),
            "token loaded from file"
        );
        let secret = fresh.secret.clone();
        *cached = Some(fresh);
        Some(secret)
    }

    fn read_token_file(&self) -> Option<CachedToken> {
        let raw = match std::fs::read_to_string(&self.token_file) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(
                    token_file = %self.token_file.display(),
                    error = %err,
                    "token file not readable"
                );
                return None;
            }
        };

        match serde_json::from_str::<TokenFile>(&raw) {
            Ok(parsed) => Some(CachedToken {
                secret: SecretString::from(parsed.token),
                expires_at_unix: parsed.expires_at_unix,
                expires_at: parsed.expires_at,
            }),
            Err(err) => {
                tracing::error!(
                    token_file = %self.token_file.display(),
                    error = %err,
                    "failed to parse token file"
                );
                None
            }
        }
    }
}
