use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use jib_gateway_core::AuthMode;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::executor::{ExecOutcome, GhExecutor, RealGhExecutor};
use crate::token::{INCOGNITO_TOKEN_VAR, TokenStore};

/// Default timeout for typed helper calls.
const HELPER_TIMEOUT: Duration = Duration::from_secs(60);

/// A failure talking to GitHub that is not "the resource does not exist".
#[derive(Debug, thiserror::Error)]
pub enum GhClientError {
    #[error("gh transport failure: {0}")]
    Transport(String),

    #[error("failed to parse gh output: {0}")]
    Parse(String),
}

/// PR author as returned by `gh --json`: sometimes a bare login string,
/// sometimes a `{login}` object. Normalised via [`Author::login`] before any
/// policy code sees it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Author {
    Object { login: String },
    Plain(String),
}

impl Default for Author {
    fn default() -> Self {
        Author::Plain(String::new())
    }
}

impl Author {
    pub fn login(&self) -> &str {
        match self {
            Author::Object { login } => login,
            Author::Plain(login) => login,
        }
    }
}

/// PR metadata as the handlers and the policy engine consume it.
#[derive(Debug, Clone, Deserialize)]
pub struct PrInfo {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: Author,
    #[serde(default)]
    pub state: String,
    #[serde(default, rename = "headRefName")]
    pub head_branch: String,
    #[serde(default, rename = "baseRefName")]
    pub base_branch: String,
}

impl PrInfo {
    pub fn author_login(&self) -> &str {
        self.author.login()
    }
}

/// Client for executing `gh` CLI commands with token injection.
///
/// The child environment is fully replaced: the chosen token in `GH_TOKEN`, a
/// fixed `PATH`, and `safe.directory=*` so git calls gh makes internally work
/// inside container-owned worktrees. Parameterized over the executor for
/// testability, like the rest of the subprocess layer.
pub struct GitHubClient<E: GhExecutor = RealGhExecutor> {
    executor: E,
    tokens: Arc<TokenStore>,
}

impl GitHubClient<RealGhExecutor> {
    pub fn new(tokens: Arc<TokenStore>) -> Self {
        Self {
            executor: RealGhExecutor,
            tokens,
        }
    }
}

impl<E: GhExecutor> GitHubClient<E> {
    pub fn with_executor(executor: E, tokens: Arc<TokenStore>) -> Self {
        Self { executor, tokens }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Execute a gh command under `mode`'s token.
    ///
    /// A missing token is reported as a failed outcome, not a panic or an
    /// inherited-credential fallback.
    pub async fn execute(
        &self,
        args: &[String],
        timeout: Duration,
        cwd: Option<&Path>,
        mode: AuthMode,
    ) -> ExecOutcome {
        let token = match self.tokens.token_for_mode(mode) {
            Ok(token) => token,
            Err(err) => {
                return ExecOutcome {
                    success: false,
                    stdout: String::new(),
                    stderr: err.to_string(),
                    returncode: 1,
                };
            }
        };

        let env = vec![
            ("GH_TOKEN".to_owned(), token.expose_secret().to_owned()),
            ("PATH".to_owned(), "/usr/bin:/bin".to_owned()),
            ("GIT_CONFIG_COUNT".to_owned(), "1".to_owned()),
            ("GIT_CONFIG_KEY_0".to_owned(), "safe.directory".to_owned()),
            ("GIT_CONFIG_VALUE_0".to_owned(), "*".to_owned()),
        ];

        tracing::debug!(command_args = ?args, cwd = ?cwd, mode = %mode, "executing gh command");
        let outcome = self
            .executor
            .exec(args, timeout, cwd.map(Path::to_path_buf), &env)
            .await;
        if !outcome.success {
            tracing::warn!(
                command_args = ?args,
                returncode = outcome.returncode,
                stderr = %truncate(&outcome.stderr, 500),
                "gh command failed"
            );
        }
        outcome
    }

    // ── Typed helpers ──

    /// PR metadata, or `Ok(None)` when the PR does not exist or is not
    /// accessible under the current token.
    pub async fn pr_info(
        &self,
        repo: &str,
        number: u64,
        mode: AuthMode,
    ) -> Result<Option<PrInfo>, GhClientError> {
        let args = vec![
            "pr".to_owned(),
            "view".to_owned(),
            number.to_string(),
            "--repo".to_owned(),
            repo.to_owned(),
            "--json".to_owned(),
            "number,title,author,state,headRefName,baseRefName".to_owned(),
        ];
        let outcome = self.execute(&args, HELPER_TIMEOUT, None, mode).await;

        if outcome.returncode == -1 {
            return Err(GhClientError::Transport(outcome.stderr.trim().to_owned()));
        }
        if !outcome.success {
            return Ok(None);
        }
        serde_json::from_str(&outcome.stdout)
            .map(Some)
            .map_err(|err| GhClientError::Parse(err.to_string()))
    }

    /// Open (or `state`-matching) PRs whose head is `branch`.
    pub async fn list_prs_for_branch(
        &self,
        repo: &str,
        branch: &str,
        state: &str,
        mode: AuthMode,
    ) -> Result<Vec<PrInfo>, GhClientError> {
        let args = vec![
            "pr".to_owned(),
            "list".to_owned(),
            "--repo".to_owned(),
            repo.to_owned(),
            "--head".to_owned(),
            branch.to_owned(),
            "--state".to_owned(),
            state.to_owned(),
            "--json".to_owned(),
            "number,title,author,state,headRefName".to_owned(),
        ];
        let outcome = self.execute(&args, HELPER_TIMEOUT, None, mode).await;

        if !outcome.success {
            return Err(GhClientError::Transport(outcome.stderr.trim().to_owned()));
        }
        serde_json::from_str(&outcome.stdout).map_err(|err| GhClientError::Parse(err.to_string()))
    }

    /// Whether `branch` exists on the remote repository.
    pub async fn branch_exists(&self, repo: &str, branch: &str, mode: AuthMode) -> bool {
        let args = vec![
            "api".to_owned(),
            format!("repos/{repo}/branches/{branch}"),
            "--silent".to_owned(),
        ];
        self.execute(&args, HELPER_TIMEOUT, None, mode).await.success
    }

    /// The login the current token authenticates as.
    pub async fn authenticated_user(&self, mode: AuthMode) -> Option<String> {
        let args = vec![
            "api".to_owned(),
            "/user".to_owned(),
            "--jq".to_owned(),
            ".login".to_owned(),
        ];
        let outcome = self.execute(&args, HELPER_TIMEOUT, None, mode).await;
        if outcome.success && !outcome.stdout.trim().is_empty() {
            Some(outcome.stdout.trim().to_owned())
        } else {
            None
        }
    }

    /// Verify the incognito PAT belongs to the configured user.
    ///
    /// `Ok(None)` when no incognito user is configured (incognito mode simply
    /// stays disabled). A failure is fatal for incognito operation only.
    pub async fn validate_incognito_config(
        &self,
        configured_user: Option<&str>,
    ) -> Result<Option<String>, IncognitoError> {
        let Some(configured) = configured_user.map(str::trim).filter(|u| !u.is_empty()) else {
            return Ok(None);
        };

        if !self.tokens.is_valid(AuthMode::Incognito) {
            return Err(IncognitoError::TokenMissing {
                configured: configured.to_owned(),
            });
        }

        let actual = self
            .authenticated_user(AuthMode::Incognito)
            .await
            .ok_or(IncognitoError::AuthFailed)?;

        if !actual.eq_ignore_ascii_case(configured) {
            return Err(IncognitoError::UserMismatch {
                configured: configured.to_owned(),
                actual,
            });
        }
        Ok(Some(actual))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IncognitoError {
    #[error("incognito user '{configured}' configured but {INCOGNITO_TOKEN_VAR} not set")]
    TokenMissing { configured: String },

    #[error("could not authenticate with {INCOGNITO_TOKEN_VAR} - token may be invalid")]
    AuthFailed,

    #[error(
        "token/user mismatch: {INCOGNITO_TOKEN_VAR} belongs to '{actual}' \
         but incognito.github_user is '{configured}'"
    )]
    UserMismatch { configured: String, actual: String },
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        s
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}
