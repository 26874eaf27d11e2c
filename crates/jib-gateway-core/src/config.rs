use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable that overrides the `repositories.yaml` location.
pub const REPO_CONFIG_VAR: &str = "JIB_REPO_CONFIG";

/// Top-level `repositories.yaml` configuration.
///
/// This is the single source of truth for which repositories the gateway may
/// touch and under which identity. All sections are optional; an absent file
/// behaves like an empty one (bot identity, no repositories).
///
/// # Example
///
/// ```yaml
/// github_username: james-in-a-box
/// bot_username: jib
/// writable_repos:
///   - acme/foo
/// readable_repos:
///   - acme/docs
/// repo_settings:
///   acme/foo:
///     auth_mode: incognito
/// incognito:
///   github_user: alice
///   git_name: Alice Example
///   git_email: alice@example.com
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    /// The bot's own GitHub login (the GitHub App name).
    pub github_username: Option<String>,
    /// Short bot identity, contributes to the bot identity set.
    #[serde(default = "default_bot_username")]
    pub bot_username: String,
    #[serde(default)]
    pub writable_repos: Vec<String>,
    #[serde(default)]
    pub readable_repos: Vec<String>,
    /// Default reviewer for created PRs; falls back to `github_username`.
    pub default_reviewer: Option<String>,
    /// Per-repository overrides, keyed by `owner/repo` (case-insensitive).
    #[serde(default)]
    pub repo_settings: HashMap<String, RepoSettings>,
    /// Identity used when a repository runs in incognito mode.
    /// Accepted under the legacy `user_mode` key as well.
    #[serde(default, alias = "user_mode")]
    pub incognito: Option<IncognitoConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoSettings {
    #[serde(default)]
    pub auth_mode: AuthMode,
    #[serde(default)]
    pub restrict_to_configured_users: bool,
    #[serde(default)]
    pub disable_auto_fix: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncognitoConfig {
    /// GitHub login operations are attributed to.
    #[serde(default)]
    pub github_user: String,
    /// Git author/committer name for incognito commits.
    #[serde(default)]
    pub git_name: String,
    /// Git author/committer email for incognito commits.
    #[serde(default)]
    pub git_email: String,
}

/// Authentication identity used for a repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// GitHub App installation token; operations attributed to the bot.
    #[default]
    Bot,
    /// Personal access token; operations attributed to a human.
    /// The legacy config value `user` means the same thing.
    #[serde(alias = "user")]
    Incognito,
}

impl AuthMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMode::Bot => "bot",
            AuthMode::Incognito => "incognito",
        }
    }
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access the gateway has to a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    Writable,
    Readable,
    None,
}

fn default_bot_username() -> String {
    "jib".to_owned()
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            github_username: None,
            bot_username: default_bot_username(),
            writable_repos: Vec::new(),
            readable_repos: Vec::new(),
            default_reviewer: None,
            repo_settings: HashMap::new(),
            incognito: None,
        }
    }
}

impl RepoConfig {
    /// Load configuration from an explicit path.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| Error::ConfigLoad {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load configuration from the standard search path:
    /// `JIB_REPO_CONFIG` env override, then `~/.config/jib/repositories.yaml`.
    pub fn load_default() -> Result<Self> {
        if let Some(path) = std::env::var_os(REPO_CONFIG_VAR) {
            let path = PathBuf::from(path);
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading repo config from env override");
                return Self::load(&path);
            }
        }
        let fallback = config_dir().join("repositories.yaml");
        if fallback.exists() {
            tracing::debug!(path = %fallback.display(), "loading repo config");
            return Self::load(&fallback);
        }
        Err(Error::ConfigMissing { fallback })
    }

    pub fn is_writable(&self, repo: &str) -> bool {
        contains_repo(&self.writable_repos, repo)
    }

    pub fn is_readable(&self, repo: &str) -> bool {
        contains_repo(&self.readable_repos, repo)
    }

    pub fn access_level(&self, repo: &str) -> AccessLevel {
        if self.is_writable(repo) {
            AccessLevel::Writable
        } else if self.is_readable(repo) {
            AccessLevel::Readable
        } else {
            AccessLevel::None
        }
    }

    /// Per-repo settings, matched case-insensitively on `owner/repo`.
    pub fn settings_for(&self, repo: &str) -> Option<&RepoSettings> {
        let repo = repo.to_lowercase();
        self.repo_settings
            .iter()
            .find(|(configured, _)| configured.to_lowercase() == repo)
            .map(|(_, settings)| settings)
    }

    /// The authentication mode a repository operates under.
    pub fn auth_mode(&self, repo: &str) -> AuthMode {
        self.settings_for(repo)
            .map(|s| s.auth_mode)
            .unwrap_or_default()
    }

    /// The configured incognito GitHub login, lowercased, if any.
    pub fn incognito_user(&self) -> Option<String> {
        self.incognito
            .as_ref()
            .map(|i| i.github_user.trim().to_lowercase())
            .filter(|u| !u.is_empty())
    }

    pub fn default_reviewer(&self) -> Option<&str> {
        self.default_reviewer
            .as_deref()
            .or(self.github_username.as_deref())
    }
}

fn contains_repo(repos: &[String], repo: &str) -> bool {
    let repo = repo.to_lowercase();
    repos.iter().any(|r| r.to_lowercase() == repo)
}

/// The invoking user's home directory, from `$HOME`.
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// `~/.config/jib`, where the gateway secret and `repositories.yaml` live.
pub fn config_dir() -> PathBuf {
    home_dir().join(".config").join("jib")
}
