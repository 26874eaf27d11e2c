//! Request-input validators.
//!
//! Every string that reaches a subprocess command line goes through one of
//! these functions first. They are pure and total: any input outside the
//! allow-lists is rejected before a command is even built.

use std::path::{Component, Path, PathBuf};

use crate::config::home_dir;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("repo_path must be an absolute path")]
    RelativePath,

    #[error("repo_path contains a parent-directory component")]
    PathTraversal,

    #[error("repo_path does not exist or cannot be resolved")]
    Unresolvable(#[source] std::io::Error),

    #[error("repo_path is outside the allowed worktree roots")]
    OutsideAllowedRoots,

    #[error("argument not permitted for git {operation}: {argument}")]
    DisallowedArgument {
        operation: &'static str,
        argument: String,
    },

    #[error("gh api access is restricted to read-only GET endpoints: {method} {path}")]
    ApiPathDenied { method: String, path: String },

    #[error("invalid {name}: {reason}")]
    InvalidIdentifier {
        name: &'static str,
        reason: &'static str,
    },
}

/// The worktree roots a `repo_path` is allowed to live under.
pub fn allowed_repo_roots() -> Vec<PathBuf> {
    let home = home_dir();
    vec![home.join(".jib-worktrees"), home.join("repos")]
}

/// Validate that `repo_path` resolves to a directory strictly inside one of
/// `roots`.
///
/// Rejects relative paths and any `..` component before touching the
/// filesystem, then canonicalises (resolving symlinks) and requires the
/// result to be under a root. A symlink that points outside the roots fails
/// here even though its lexical form looked fine.
pub fn validate_repo_path(repo_path: &str, roots: &[PathBuf]) -> Result<PathBuf, ValidationError> {
    let path = Path::new(repo_path);
    if !path.is_absolute() {
        return Err(ValidationError::RelativePath);
    }
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(ValidationError::PathTraversal);
    }

    let canonical = path.canonicalize().map_err(ValidationError::Unresolvable)?;

    for root in roots {
        // Roots that do not exist yet cannot contain the path.
        let Ok(root) = root.canonicalize() else {
            continue;
        };
        if canonical.starts_with(&root) && canonical != root {
            return Ok(canonical);
        }
    }
    Err(ValidationError::OutsideAllowedRoots)
}

/// Read-only git operations served by `/git/fetch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitReadOp {
    Fetch,
    LsRemote,
}

impl GitReadOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fetch" => Some(GitReadOp::Fetch),
            "ls-remote" => Some(GitReadOp::LsRemote),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GitReadOp::Fetch => "fetch",
            GitReadOp::LsRemote => "ls-remote",
        }
    }
}

/// Validate extra arguments for a read-only git operation.
///
/// `fetch` admits exactly `--all`, `--tags`, `--prune`, `--depth=N` (N a
/// positive integer), the `--` terminator, and ref-like positionals.
/// `ls-remote` admits `--` and ref patterns (glob `*` allowed). Anything
/// else (in particular any unknown option) is rejected.
pub fn validate_git_args(op: GitReadOp, args: &[String]) -> Result<Vec<String>, ValidationError> {
    let mut validated = Vec::with_capacity(args.len());
    for arg in args {
        let ok = match op {
            GitReadOp::Fetch => match arg.as_str() {
                "--all" | "--tags" | "--prune" | "--" => true,
                a if a.starts_with("--depth=") => a["--depth=".len()..]
                    .parse::<u64>()
                    .is_ok_and(|depth| depth > 0),
                a if a.starts_with('-') => false,
                a => is_ref_like(a, false),
            },
            GitReadOp::LsRemote => match arg.as_str() {
                "--" => true,
                a if a.starts_with('-') => false,
                a => is_ref_like(a, true),
            },
        };
        if !ok {
            return Err(ValidationError::DisallowedArgument {
                operation: op.as_str(),
                argument: arg.clone(),
            });
        }
        validated.push(arg.clone());
    }
    Ok(validated)
}

/// A conservative shape check for branch names and ref patterns.
fn is_ref_like(s: &str, allow_glob: bool) -> bool {
    if s.is_empty() || s.contains("..") {
        return false;
    }
    let first = s.chars().next().unwrap_or('-');
    if !first.is_ascii_alphanumeric() {
        return false;
    }
    s.chars().all(|c| {
        c.is_ascii_alphanumeric()
            || matches!(c, '/' | '.' | '_' | '-')
            || (allow_glob && c == '*')
    })
}

/// Validate a `gh api` path and method against the read-only allow-list.
///
/// Only the endpoints the handlers actually need are admitted:
/// branch lookups, check-runs, PR review comments, and `/user`.
pub fn validate_gh_api_path(path: &str, method: &str) -> Result<(), ValidationError> {
    let denied = || ValidationError::ApiPathDenied {
        method: method.to_owned(),
        path: path.to_owned(),
    };

    if !method.eq_ignore_ascii_case("GET") {
        return Err(denied());
    }

    // Query strings do not affect which resource is addressed.
    let bare = path.split('?').next().unwrap_or(path);
    let segments: Vec<&str> = bare
        .trim_start_matches('/')
        .trim_end_matches('/')
        .split('/')
        .collect();
    if segments.iter().any(|s| s.is_empty() || *s == "..") {
        return Err(denied());
    }

    let allowed = match segments.as_slice() {
        ["user"] => true,
        ["repos", _owner, _repo, "branches", _branch] => true,
        ["repos", _owner, _repo, "commits", _sha, "check-runs"] => true,
        ["repos", _owner, _repo, "pulls", number, "comments"] => {
            number.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    };
    if allowed { Ok(()) } else { Err(denied()) }
}

/// gh subcommands that are never allowed through the gateway, no matter what.
pub const BLOCKED_GH_COMMANDS: &[&str] = &[
    "auth logout",
    "pr merge",
    "release delete",
    "repo delete",
    "secret set",
    "variable set",
];

/// gh subcommands `/gh/execute` accepts. `api` paths additionally go through
/// [`validate_gh_api_path`].
pub const READONLY_GH_COMMANDS: &[&str] = &[
    "api",
    "issue list",
    "issue view",
    "pr checks",
    "pr diff",
    "pr list",
    "pr status",
    "pr view",
    "repo view",
    "run list",
    "run view",
    "search prs",
];

/// The leading one or two tokens of a gh invocation, used for allow/deny
/// matching.
pub fn gh_command_string(args: &[String]) -> String {
    match args {
        [] => String::new(),
        [single] => single.clone(),
        [first, second, ..] => format!("{first} {second}"),
    }
}

/// The deny-list entry a gh invocation trips, if any.
pub fn blocked_gh_command(args: &[String]) -> Option<&'static str> {
    let cmd = gh_command_string(args);
    BLOCKED_GH_COMMANDS
        .iter()
        .copied()
        .find(|blocked| cmd.starts_with(blocked))
}

/// Whether a gh invocation is on the read-only allow-list.
pub fn is_readonly_gh_command(args: &[String]) -> bool {
    if args.is_empty() {
        return false;
    }
    let cmd = gh_command_string(args);
    READONLY_GH_COMMANDS
        .iter()
        .any(|allowed| cmd == *allowed || cmd.starts_with(&format!("{allowed} ")))
}

/// Extract `owner/repo` from a git remote URL.
///
/// Accepts `https://github.com/owner/repo[.git]`,
/// `git@github.com:owner/repo[.git]`, and
/// `ssh://git@github.com/owner/repo[.git]`. Other hosts yield `None`.
pub fn parse_remote_url(url: &str) -> Option<String> {
    let url = url.trim();
    let rest = url
        .strip_prefix("https://github.com/")
        .or_else(|| url.strip_prefix("git@github.com:"))
        .or_else(|| url.strip_prefix("ssh://git@github.com/"))?;

    let rest = rest.trim_end_matches('/');
    let rest = rest.strip_suffix(".git").unwrap_or(rest);

    let (owner, repo) = rest.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some(format!("{owner}/{repo}"))
}

/// Convert an SSH remote URL to its HTTPS form.
///
/// The gateway has no SSH keys; pushes authenticate over HTTPS with a token.
/// Returns the input unchanged when it is already HTTPS or unrecognised.
pub fn ssh_url_to_https(url: &str) -> String {
    let stripped = url
        .strip_prefix("git@github.com:")
        .or_else(|| url.strip_prefix("ssh://git@github.com/"));
    match stripped {
        Some(rest) => {
            let rest = rest.strip_suffix(".git").unwrap_or(rest);
            format!("https://github.com/{rest}.git")
        }
        None => url.to_owned(),
    }
}

/// Extract the destination branch from a git refspec.
///
/// `+refs/heads/a:refs/heads/b` → `b`; `feature` → `feature`; empty → `None`.
pub fn parse_refspec_branch(refspec: &str) -> Option<String> {
    let refspec = refspec.strip_prefix('+').unwrap_or(refspec);
    let remote_ref = refspec.rsplit(':').next().unwrap_or(refspec);
    let branch = remote_ref.strip_prefix("refs/heads/").unwrap_or(remote_ref);
    if branch.is_empty() {
        None
    } else {
        Some(branch.to_owned())
    }
}

/// Validate a container id or repo name used to build filesystem paths.
///
/// Must start alphanumeric, continue with `[A-Za-z0-9._-]`, and contain no
/// `..` sequence.
pub fn validate_identifier(value: &str, name: &'static str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::InvalidIdentifier {
            name,
            reason: "cannot be empty",
        });
    }
    let mut chars = value.chars();
    let first = chars.next().unwrap_or(' ');
    if !first.is_ascii_alphanumeric() {
        return Err(ValidationError::InvalidIdentifier {
            name,
            reason: "must start with an alphanumeric character",
        });
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')) {
        return Err(ValidationError::InvalidIdentifier {
            name,
            reason: "must be alphanumeric with ._- allowed",
        });
    }
    if value.contains("..") {
        return Err(ValidationError::InvalidIdentifier {
            name,
            reason: "path traversal not allowed",
        });
    }
    Ok(())
}
