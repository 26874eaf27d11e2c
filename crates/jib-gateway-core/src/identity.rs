use std::collections::HashSet;

/// Environment variable holding the comma-separated trusted-user list.
pub const TRUSTED_USERS_VAR: &str = "GATEWAY_TRUSTED_USERS";

/// The set of GitHub logins that count as the bot.
///
/// Built once at startup from the configured bot names. Each name contributes
/// four variants: `name`, `name[bot]`, `app/name`, `apps/name`; GitHub
/// surfaces App identities under all of these depending on the API used.
/// Membership tests are exact lowercase comparisons.
#[derive(Debug, Clone)]
pub struct BotIdentities {
    logins: HashSet<String>,
}

impl BotIdentities {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut logins = HashSet::new();
        for name in names {
            let name = name.trim().to_lowercase();
            if name.is_empty() {
                continue;
            }
            logins.insert(format!("{name}[bot]"));
            logins.insert(format!("app/{name}"));
            logins.insert(format!("apps/{name}"));
            logins.insert(name);
        }
        Self { logins }
    }

    pub fn contains(&self, login: &str) -> bool {
        self.logins.contains(&login.to_lowercase())
    }

    /// Sorted logins, for denial details.
    pub fn sorted(&self) -> Vec<String> {
        let mut logins: Vec<String> = self.logins.iter().cloned().collect();
        logins.sort();
        logins
    }
}

/// Branch prefixes that mark a branch as bot-owned before any PR exists.
#[derive(Debug, Clone)]
pub struct BranchPrefixes {
    prefixes: [String; 2],
}

impl BranchPrefixes {
    pub fn for_bot(bot_username: &str) -> Self {
        Self {
            prefixes: [format!("{bot_username}-"), format!("{bot_username}/")],
        }
    }

    pub fn owns(&self, branch: &str) -> bool {
        self.prefixes.iter().any(|p| branch.starts_with(p.as_str()))
    }

    /// `"jib-* or jib/*"`, for denial hints.
    pub fn describe(&self) -> String {
        format!("{}* or {}*", self.prefixes[0], self.prefixes[1])
    }
}

/// GitHub users whose open PRs the bot may push to.
///
/// Loaded once at startup from [`TRUSTED_USERS_VAR`], comma-separated.
#[derive(Debug, Clone, Default)]
pub struct TrustedUsers {
    users: HashSet<String>,
}

impl TrustedUsers {
    pub fn from_env() -> Self {
        let raw = std::env::var(TRUSTED_USERS_VAR).unwrap_or_default();
        Self::from_list(&raw)
    }

    pub fn from_list(raw: &str) -> Self {
        let users = raw
            .split(',')
            .map(|u| u.trim().to_lowercase())
            .filter(|u| !u.is_empty())
            .collect();
        Self { users }
    }

    pub fn contains(&self, login: &str) -> bool {
        self.users.contains(&login.to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn sorted(&self) -> Vec<String> {
        let mut users: Vec<String> = self.users.iter().cloned().collect();
        users.sort();
        users
    }
}
