use std::sync::Arc;
use std::time::Duration;

use jib_gateway_core::{AuthMode, BotIdentities, BranchPrefixes, TrustedUsers};
use jib_gateway_github::client::GhClientError;
use jib_gateway_github::executor::GhExecutor;
use jib_gateway_github::{GitHubClient, RealGhExecutor};
use serde_json::{Value, json};
use tokio::time::Instant;

use crate::cache::BoundedCache;

pub const PR_CACHE_CAPACITY: usize = 500;
pub const BRANCH_PR_CACHE_CAPACITY: usize = 200;
pub const PR_CACHE_TTL: Duration = Duration::from_secs(300);
pub const BRANCH_PR_CACHE_TTL: Duration = Duration::from_secs(120);

/// Result of a policy check.
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: String,
    /// Opaque to the transport; carried back in the error body on denial.
    pub details: Value,
}

impl PolicyDecision {
    fn allow(reason: impl Into<String>, details: Value) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            details,
        }
    }

    fn deny(reason: impl Into<String>, details: Value) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            details,
        }
    }
}

/// PR metadata, author already normalised to a plain login string.
#[derive(Debug, Clone)]
struct CachedPr {
    author_login: String,
    state: String,
    head_branch: String,
    fetched_at: Instant,
}

impl CachedPr {
    fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() > PR_CACHE_TTL
    }
}

#[derive(Debug, Clone)]
struct CachedBranchPrs {
    numbers: Vec<u64>,
    fetched_at: Instant,
}

impl CachedBranchPrs {
    fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() > BRANCH_PR_CACHE_TTL
    }
}

/// Policy enforcement engine for git/gh operations.
///
/// Pure function of remote state plus cache: no internal state machine.
/// Parameterized over the gh executor so tests can script GitHub's answers.
pub struct PolicyEngine<E: GhExecutor = RealGhExecutor> {
    github: Arc<GitHubClient<E>>,
    bot_username: String,
    identities: BotIdentities,
    prefixes: BranchPrefixes,
    trusted: TrustedUsers,
    incognito_user: Option<String>,
    pr_cache: BoundedCache<(String, u64), CachedPr>,
    branch_cache: BoundedCache<(String, String), CachedBranchPrs>,
}

impl<E: GhExecutor> PolicyEngine<E> {
    pub fn new(
        github: Arc<GitHubClient<E>>,
        bot_username: impl Into<String>,
        identities: BotIdentities,
        trusted: TrustedUsers,
        incognito_user: Option<String>,
    ) -> Self {
        let bot_username = bot_username.into();
        Self {
            github,
            prefixes: BranchPrefixes::for_bot(&bot_username),
            bot_username,
            identities,
            trusted,
            incognito_user,
            pr_cache: BoundedCache::new(PR_CACHE_CAPACITY),
            branch_cache: BoundedCache::new(BRANCH_PR_CACHE_CAPACITY),
        }
    }

    /// Can the current identity push to `branch`?
    ///
    /// Bot mode allows bot-prefixed branches outright, then branches with an
    /// open PR authored by the bot or by a trusted user. Incognito mode
    /// allows everything: the PAT's owner is accountable and GitHub enforces
    /// that human's real permissions.
    pub async fn check_branch_ownership(
        &self,
        repo: &str,
        branch: &str,
        mode: AuthMode,
    ) -> PolicyDecision {
        if mode == AuthMode::Incognito {
            if let Some(user) = self.incognito_user.clone() {
                return self.check_branch_incognito(repo, branch, &user).await;
            }
        }

        // Check 1: prefix ownership needs no remote state at all.
        if self.prefixes.owns(branch) {
            tracing::debug!(repo, branch, "branch ownership verified by prefix");
            return PolicyDecision::allow(
                format!(
                    "Branch '{branch}' is owned by {bot} ({bot}-prefixed branch)",
                    bot = self.bot_username
                ),
                json!({ "branch": branch, "reason": "bot_prefix" }),
            );
        }

        // Checks 2 and 3: an open PR by the bot or by a trusted user.
        let numbers = match self.prs_for_branch(repo, branch, mode).await {
            Ok(numbers) => numbers,
            Err(err) => return transport_denial(branch, &err),
        };

        for number in &numbers {
            let pr = match self.pr_info(repo, *number, mode).await {
                Ok(Some(pr)) => pr,
                Ok(None) => continue,
                Err(err) => return transport_denial(branch, &err),
            };

            if self.identities.contains(&pr.author_login) {
                tracing::debug!(repo, branch, pr_number = number, author = %pr.author_login,
                    "branch ownership verified by PR");
                return PolicyDecision::allow(
                    format!(
                        "Branch '{branch}' has open PR #{number} owned by {}",
                        self.bot_username
                    ),
                    json!({
                        "branch": branch,
                        "pr_number": number,
                        "author": pr.author_login,
                        "reason": "bot_pr",
                    }),
                );
            }

            if self.trusted.contains(&pr.author_login) {
                tracing::debug!(repo, branch, pr_number = number, author = %pr.author_login,
                    "branch push allowed, PR owned by trusted user");
                return PolicyDecision::allow(
                    format!(
                        "Branch '{branch}' has open PR #{number} owned by trusted user '{}'",
                        pr.author_login
                    ),
                    json!({
                        "branch": branch,
                        "pr_number": number,
                        "author": pr.author_login,
                        "reason": "trusted_user_pr",
                    }),
                );
            }
        }

        tracing::info!(repo, branch, open_prs = ?numbers, mode = %mode,
            "branch push denied, not owned by bot or trusted user");
        let mut hint = format!(
            "Use a {bot}-prefixed branch ({prefixes}), or create a PR from this branch first",
            bot = self.bot_username,
            prefixes = self.prefixes.describe(),
        );
        if !self.trusted.is_empty() {
            hint.push_str(&format!(". Trusted users: {}", self.trusted.sorted().join(", ")));
        }
        PolicyDecision::deny(
            format!(
                "Branch '{branch}' is not owned by {bot} or a trusted user. \
                 Either use a {bot}-prefixed branch or create a PR first.",
                bot = self.bot_username
            ),
            json!({
                "branch": branch,
                "open_prs": numbers,
                "hint": hint,
                "auth_mode": mode.as_str(),
            }),
        )
    }

    async fn check_branch_incognito(
        &self,
        repo: &str,
        branch: &str,
        user: &str,
    ) -> PolicyDecision {
        // Prefer the precise reason when an open PR by the user exists.
        if let Ok(numbers) = self.prs_for_branch(repo, branch, AuthMode::Incognito).await {
            for number in numbers {
                if let Ok(Some(pr)) = self.pr_info(repo, number, AuthMode::Incognito).await {
                    if pr.author_login.eq_ignore_ascii_case(user) {
                        return PolicyDecision::allow(
                            format!(
                                "Branch '{branch}' has open PR #{number} owned by \
                                 incognito user '{user}'"
                            ),
                            json!({
                                "branch": branch,
                                "pr_number": number,
                                "author": pr.author_login,
                                "reason": "incognito_pr",
                                "auth_mode": "incognito",
                            }),
                        );
                    }
                }
            }
        }

        // No PR needed: the user is authenticated as themselves, and GitHub
        // enforces what that account may actually push.
        tracing::debug!(repo, branch, incognito_user = user,
            "branch push allowed, incognito user authenticated");
        PolicyDecision::allow(
            format!("Incognito mode: push allowed as user '{user}'"),
            json!({
                "branch": branch,
                "reason": "incognito_auth",
                "auth_mode": "incognito",
                "incognito_user": user,
            }),
        )
    }

    /// Does the current identity own PR `number`?
    pub async fn check_pr_ownership(
        &self,
        repo: &str,
        number: u64,
        mode: AuthMode,
    ) -> PolicyDecision {
        let pr = match self.pr_info(repo, number, mode).await {
            Ok(Some(pr)) => pr,
            Ok(None) => {
                tracing::warn!(repo, pr_number = number, "PR not found or inaccessible");
                return PolicyDecision::deny(
                    format!("PR #{number} not found or inaccessible"),
                    json!({ "repo": repo, "pr_number": number }),
                );
            }
            Err(err) => {
                return PolicyDecision::deny(
                    format!("Unable to verify PR #{number}: {err}"),
                    json!({ "repo": repo, "pr_number": number, "error": err.to_string() }),
                );
            }
        };

        if mode == AuthMode::Incognito {
            if let Some(user) = &self.incognito_user {
                if pr.author_login.eq_ignore_ascii_case(user) {
                    return PolicyDecision::allow(
                        format!("PR is owned by incognito user ({user})"),
                        json!({ "author": pr.author_login, "auth_mode": "incognito" }),
                    );
                }
            }
        }

        if self.identities.contains(&pr.author_login) {
            tracing::debug!(repo, pr_number = number, author = %pr.author_login,
                "PR ownership verified");
            return PolicyDecision::allow(
                format!("PR is owned by {}", self.bot_username),
                json!({ "author": pr.author_login }),
            );
        }

        tracing::info!(repo, pr_number = number, author = %pr.author_login, mode = %mode,
            "PR ownership denied");
        let mut expected: Vec<String> = self.identities.sorted();
        if mode == AuthMode::Incognito {
            if let Some(user) = &self.incognito_user {
                expected.push(user.clone());
            }
        }
        PolicyDecision::deny(
            format!(
                "PR #{number} is not owned by the authorized identity (author: {})",
                pr.author_login
            ),
            json!({
                "author": pr.author_login,
                "expected": expected,
                "auth_mode": mode.as_str(),
            }),
        )
    }

    /// Commenting is allowed on any PR that exists. Agents collaborate on
    /// PRs they did not author.
    pub async fn check_pr_comment_allowed(
        &self,
        repo: &str,
        number: u64,
        mode: AuthMode,
    ) -> PolicyDecision {
        match self.pr_info(repo, number, mode).await {
            Ok(Some(pr)) => PolicyDecision::allow(
                "Comments are allowed on any PR",
                json!({ "pr_number": number, "author": pr.author_login }),
            ),
            Ok(None) => PolicyDecision::deny(
                format!("PR #{number} not found or inaccessible"),
                json!({ "repo": repo, "pr_number": number }),
            ),
            Err(err) => PolicyDecision::deny(
                format!("Unable to verify PR #{number}: {err}"),
                json!({ "repo": repo, "pr_number": number, "error": err.to_string() }),
            ),
        }
    }

    /// PR creation is a bot-mode operation. A human acting through the tool
    /// creates PRs in the GitHub UI under their own account.
    pub fn check_pr_create_allowed(&self, repo: &str, mode: AuthMode) -> PolicyDecision {
        match mode {
            AuthMode::Bot => PolicyDecision::allow(
                "PR creation allowed",
                json!({ "repo": repo, "auth_mode": "bot" }),
            ),
            AuthMode::Incognito => PolicyDecision::deny(
                "PR creation is blocked in incognito mode. \
                 Create the PR manually via the GitHub UI.",
                json!({ "repo": repo, "auth_mode": "incognito" }),
            ),
        }
    }

    /// Unconditional deny. Merging is never a gateway operation.
    pub fn check_merge_allowed(&self, repo: &str, number: u64) -> PolicyDecision {
        tracing::info!(repo, pr_number = number, "merge operation blocked by policy");
        PolicyDecision::deny(
            "Merge operations are not supported. Human must merge via GitHub UI.",
            json!({
                "repo": repo,
                "pr_number": number,
                "action": "Use the GitHub web UI to merge",
            }),
        )
    }

    // ── Cached reads ──

    async fn pr_info(
        &self,
        repo: &str,
        number: u64,
        mode: AuthMode,
    ) -> Result<Option<CachedPr>, GhClientError> {
        let key = (repo.to_lowercase(), number);

        if let Some(cached) = self.pr_cache.get(&key) {
            if !cached.is_stale() {
                return Ok(Some(cached));
            }
        }

        let Some(info) = self.github.pr_info(repo, number, mode).await? else {
            return Ok(None);
        };
        let entry = CachedPr {
            author_login: info.author_login().to_owned(),
            state: info.state,
            head_branch: info.head_branch,
            fetched_at: Instant::now(),
        };
        tracing::debug!(repo, pr_number = number, author = %entry.author_login,
            state = %entry.state, head_branch = %entry.head_branch, "PR metadata fetched");
        self.pr_cache.insert(key, entry.clone());
        Ok(Some(entry))
    }

    async fn prs_for_branch(
        &self,
        repo: &str,
        branch: &str,
        mode: AuthMode,
    ) -> Result<Vec<u64>, GhClientError> {
        let key = (repo.to_lowercase(), branch.to_owned());

        if let Some(cached) = self.branch_cache.get(&key) {
            if !cached.is_stale() {
                return Ok(cached.numbers);
            }
        }

        let prs = self
            .github
            .list_prs_for_branch(repo, branch, "open", mode)
            .await?;
        let numbers: Vec<u64> = prs.iter().map(|pr| pr.number).collect();

        self.branch_cache.insert(
            key,
            CachedBranchPrs {
                numbers: numbers.clone(),
                fetched_at: Instant::now(),
            },
        );
        // The listing already carries the PR metadata; prime the PR cache so
        // the per-PR checks that follow do not refetch.
        for pr in prs {
            self.pr_cache.insert(
                (repo.to_lowercase(), pr.number),
                CachedPr {
                    author_login: pr.author_login().to_owned(),
                    state: pr.state,
                    head_branch: pr.head_branch,
                    fetched_at: Instant::now(),
                },
            );
        }

        Ok(numbers)
    }
}

fn transport_denial(branch: &str, err: &GhClientError) -> PolicyDecision {
    tracing::warn!(branch, error = %err, "policy check failed against GitHub");
    PolicyDecision::deny(
        format!("Unable to verify branch ownership: {err}"),
        json!({ "branch": branch, "error": err.to_string() }),
    )
}
