use std::path::PathBuf;
use std::sync::Arc;

use jib_gateway_core::{BotIdentities, RepoConfig, TrustedUsers};
use jib_gateway_github::{GitHubClient, TokenStore};
use jib_gateway_policy::PolicyEngine;
use secrecy::SecretString;

use crate::ratelimit::{RateLimiter, RateLimits};

/// Shared application state: every process-wide component is owned here,
/// behind an `Arc`, so tests construct isolated instances instead of
/// touching hidden globals.
#[derive(Clone)]
pub struct AppState {
    pub secret: SecretString,
    pub tokens: Arc<TokenStore>,
    pub github: Arc<GitHubClient>,
    pub policy: Arc<PolicyEngine>,
    pub repo_config: Arc<RepoConfig>,
    pub rate: Arc<RateLimiter>,
    /// Roots a request's `repo_path` must live under.
    pub repo_roots: Arc<Vec<PathBuf>>,
}

impl AppState {
    pub fn new(
        secret: SecretString,
        repo_config: RepoConfig,
        tokens: Arc<TokenStore>,
        trusted: TrustedUsers,
        limits: RateLimits,
        repo_roots: Vec<PathBuf>,
    ) -> Self {
        let github = Arc::new(GitHubClient::new(Arc::clone(&tokens)));

        let bot_username = repo_config.bot_username.clone();
        let mut bot_names = vec![bot_username.as_str()];
        if let Some(app_name) = repo_config.github_username.as_deref() {
            bot_names.push(app_name);
        }
        let identities = BotIdentities::new(bot_names);

        let policy = Arc::new(PolicyEngine::new(
            Arc::clone(&github),
            bot_username,
            identities,
            trusted,
            repo_config.incognito_user(),
        ));

        Self {
            secret,
            tokens,
            github,
            policy,
            repo_config: Arc::new(repo_config),
            rate: Arc::new(RateLimiter::new(limits)),
            repo_roots: Arc::new(repo_roots),
        }
    }
}
