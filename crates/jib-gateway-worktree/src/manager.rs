use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jib_gateway_core::ValidationError;
use jib_gateway_core::config::home_dir;
use jib_gateway_core::validate::validate_identifier;
use jib_gateway_github::run_git;

const GIT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum WorktreeError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("repository not found: {0}")]
    RepoNotFound(String),

    #[error("git worktree operation failed: {stderr}")]
    GitFailed { stderr: String },

    #[error("failed to chown {path} to {uid}:{gid}: {detail}")]
    Chown {
        path: PathBuf,
        uid: u32,
        gid: u32,
        detail: String,
    },

    #[error("io error at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

type Result<T> = std::result::Result<T, WorktreeError>;

/// A container's worktree for one repository.
#[derive(Debug, Clone)]
pub struct WorktreeInfo {
    pub container_id: String,
    pub repo_name: String,
    pub branch: String,
    pub worktree_path: PathBuf,
    /// Git's per-worktree admin directory under `.git/worktrees/` in the
    /// main repo.
    pub admin_dir: PathBuf,
}

/// Outcome of a removal. Refusal over uncommitted changes is a non-success
/// outcome, not an error.
#[derive(Debug, Clone, Default)]
pub struct WorktreeRemoval {
    pub success: bool,
    pub uncommitted_changes: bool,
    pub branch_deleted: bool,
    pub warning: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WorktreeListing {
    pub name: String,
    pub path: PathBuf,
    pub branch: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ContainerWorktrees {
    pub container_id: String,
    pub repos: Vec<WorktreeListing>,
}

/// Manages worktree directories under `<worktree_root>/<container_id>/<repo>`.
///
/// Operations on the same `(container_id, repo_name)` pair are serialised by
/// the caller; the host launcher drives this lifecycle, not concurrent agent
/// requests.
pub struct WorktreeManager {
    worktree_root: PathBuf,
    repos_root: PathBuf,
    bot_username: String,
}

impl WorktreeManager {
    pub fn new(worktree_root: PathBuf, repos_root: PathBuf, bot_username: impl Into<String>) -> Self {
        Self {
            worktree_root,
            repos_root,
            bot_username: bot_username.into(),
        }
    }

    /// The standard roots: `~/.jib-worktrees` and `~/repos`.
    pub fn with_default_roots(bot_username: impl Into<String>) -> Self {
        let home = home_dir();
        Self::new(home.join(".jib-worktrees"), home.join("repos"), bot_username)
    }

    pub fn worktree_root(&self) -> &Path {
        &self.worktree_root
    }

    fn branch_for(&self, container_id: &str) -> String {
        format!("{}/{container_id}/work", self.bot_username)
    }

    fn paths_for(&self, container_id: &str, repo_name: &str) -> (PathBuf, PathBuf) {
        (
            self.worktree_root.join(container_id).join(repo_name),
            self.repos_root.join(repo_name),
        )
    }

    /// Create (or reuse) an isolated worktree for a container.
    ///
    /// Idempotent: an existing valid worktree is re-owned and returned as-is,
    /// and a branch left over from a crashed session is reattached rather
    /// than recreated.
    pub async fn create(
        &self,
        repo_name: &str,
        container_id: &str,
        base_branch: &str,
        uid: u32,
        gid: u32,
    ) -> Result<WorktreeInfo> {
        validate_identifier(container_id, "container_id")?;
        validate_identifier(repo_name, "repo_name")?;

        let (worktree_path, main_repo) = self.paths_for(container_id, repo_name);
        if !main_repo.exists() {
            return Err(WorktreeError::RepoNotFound(repo_name.to_owned()));
        }
        let branch = self.branch_for(container_id);

        if let Some(parent) = worktree_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| WorktreeError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        if is_valid_worktree(&worktree_path) {
            tracing::info!(container_id, repo = repo_name, path = %worktree_path.display(),
                "worktree already exists");
            // Ownership may date from a previous run with a different uid.
            chown_recursive(&worktree_path, uid, gid).await?;
            chown_single(worktree_path.parent().unwrap_or(&worktree_path), uid, gid)?;
            let admin_dir = find_admin_dir(&main_repo, &worktree_path);
            return Ok(WorktreeInfo {
                container_id: container_id.to_owned(),
                repo_name: repo_name.to_owned(),
                branch,
                worktree_path,
                admin_dir,
            });
        }

        if worktree_path.exists() {
            tracing::warn!(container_id, repo = repo_name, path = %worktree_path.display(),
                "removing invalid worktree directory");
            let _ = std::fs::remove_dir_all(&worktree_path);
        }

        let branch_exists = run_git(
            &main_repo,
            &to_args(&["rev-parse", "--verify", &branch]),
            GIT_TIMEOUT,
        )
        .await
        .success;

        let outcome = if branch_exists {
            // Left over from a crashed session; reattach instead of recreating.
            tracing::info!(%branch, container_id, "reusing existing branch for worktree");
            run_git(
                &main_repo,
                &to_args(&[
                    "worktree",
                    "add",
                    worktree_path.to_str().unwrap_or_default(),
                    &branch,
                ]),
                GIT_TIMEOUT,
            )
            .await
        } else {
            run_git(
                &main_repo,
                &to_args(&[
                    "worktree",
                    "add",
                    "-b",
                    &branch,
                    worktree_path.to_str().unwrap_or_default(),
                    base_branch,
                ]),
                GIT_TIMEOUT,
            )
            .await
        };

        if !outcome.success {
            return Err(WorktreeError::GitFailed {
                stderr: outcome.stderr,
            });
        }

        chown_recursive(&worktree_path, uid, gid).await?;
        chown_single(worktree_path.parent().unwrap_or(&worktree_path), uid, gid)?;

        let admin_dir = find_admin_dir(&main_repo, &worktree_path);
        tracing::info!(container_id, repo = repo_name, path = %worktree_path.display(),
            %branch, "worktree created");

        Ok(WorktreeInfo {
            container_id: container_id.to_owned(),
            repo_name: repo_name.to_owned(),
            branch,
            worktree_path,
            admin_dir,
        })
    }

    /// Remove a container's worktree, optionally deleting its branch.
    pub async fn remove(
        &self,
        container_id: &str,
        repo_name: &str,
        force: bool,
        delete_branch: bool,
    ) -> Result<WorktreeRemoval> {
        validate_identifier(container_id, "container_id")?;
        validate_identifier(repo_name, "repo_name")?;

        let (worktree_path, main_repo) = self.paths_for(container_id, repo_name);
        let branch = self.branch_for(container_id);
        let mut removal = WorktreeRemoval::default();

        if !worktree_path.exists() {
            removal.success = true;
            return Ok(removal);
        }

        if main_repo.exists() {
            let status = run_git(
                &worktree_path,
                &to_args(&["status", "--porcelain"]),
                GIT_TIMEOUT,
            )
            .await;
            let has_changes = !status.stdout.trim().is_empty();

            if has_changes && !force {
                removal.uncommitted_changes = true;
                removal.warning = Some(
                    "Worktree has uncommitted changes. Use force to remove anyway, \
                     or commit/stash changes first."
                        .to_owned(),
                );
                return Ok(removal);
            }
            if has_changes {
                tracing::warn!(container_id, repo = repo_name,
                    "removing worktree with uncommitted changes");
                removal.warning = Some("Worktree removed with uncommitted changes".to_owned());
            }

            let removed = run_git(
                &main_repo,
                &to_args(&[
                    "worktree",
                    "remove",
                    worktree_path.to_str().unwrap_or_default(),
                    "--force",
                ]),
                GIT_TIMEOUT,
            )
            .await;
            if !removed.success {
                tracing::warn!(container_id, repo = repo_name, stderr = %removed.stderr,
                    "git worktree remove failed, deleting directory");
                let _ = std::fs::remove_dir_all(&worktree_path);
            }

            let _ = run_git(&main_repo, &to_args(&["worktree", "prune"]), GIT_TIMEOUT).await;

            if delete_branch {
                removal.branch_deleted = delete_worktree_branch(&main_repo, &branch, force).await;
                if !removal.branch_deleted && !force {
                    let note =
                        format!("Branch {branch} has unmerged commits and was not deleted.");
                    removal.warning = Some(match removal.warning.take() {
                        Some(prior) => format!("{prior} {note}"),
                        None => note,
                    });
                }
            }
        } else {
            let _ = std::fs::remove_dir_all(&worktree_path);
        }

        // Drop the container directory once its last worktree is gone.
        let container_dir = self.worktree_root.join(container_id);
        if container_dir.exists()
            && container_dir
                .read_dir()
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false)
        {
            let _ = std::fs::remove_dir(&container_dir);
        }

        tracing::info!(container_id, repo = repo_name, force,
            branch_deleted = removal.branch_deleted, "worktree removed");
        removal.success = true;
        Ok(removal)
    }

    /// All worktrees currently on disk, with branches resolved through each
    /// worktree's `gitdir` pointer.
    pub fn list(&self) -> Vec<ContainerWorktrees> {
        let mut containers = Vec::new();
        let Ok(entries) = self.worktree_root.read_dir() else {
            return containers;
        };

        for entry in entries.flatten() {
            let container_dir = entry.path();
            if !container_dir.is_dir() {
                continue;
            }
            let container_id = entry.file_name().to_string_lossy().into_owned();

            let mut repos = Vec::new();
            let Ok(repo_entries) = container_dir.read_dir() else {
                continue;
            };
            for repo_entry in repo_entries.flatten() {
                let path = repo_entry.path();
                if !path.is_dir() {
                    continue;
                }
                repos.push(WorktreeListing {
                    name: repo_entry.file_name().to_string_lossy().into_owned(),
                    branch: read_worktree_branch(&path),
                    path,
                });
            }

            if !repos.is_empty() {
                containers.push(ContainerWorktrees {
                    container_id,
                    repos,
                });
            }
        }
        containers
    }

    /// Remove worktrees belonging to containers that no longer exist.
    ///
    /// Safe to call at startup and periodically; containers in `active` are
    /// never touched, so a sweep can run while new containers are being set
    /// up. Returns the number of worktrees removed.
    pub async fn orphan_sweep(&self, active: &HashSet<String>) -> usize {
        let mut removed = 0;
        let Ok(entries) = self.worktree_root.read_dir() else {
            return removed;
        };

        for entry in entries.flatten() {
            let container_dir = entry.path();
            if !container_dir.is_dir() {
                continue;
            }
            let container_id = entry.file_name().to_string_lossy().into_owned();
            if active.contains(&container_id) {
                continue;
            }

            tracing::info!(%container_id, "cleaning up orphaned worktrees");
            if let Ok(repo_entries) = container_dir.read_dir() {
                for repo_entry in repo_entries.flatten() {
                    if !repo_entry.path().is_dir() {
                        continue;
                    }
                    let repo_name = repo_entry.file_name().to_string_lossy().into_owned();
                    match self.remove(&container_id, &repo_name, true, true).await {
                        Ok(result) if result.success => removed += 1,
                        Ok(_) => {}
                        Err(err) => {
                            tracing::warn!(%container_id, repo = %repo_name, error = %err,
                                "failed to remove orphaned worktree");
                        }
                    }
                }
            }

            let _ = std::fs::remove_dir_all(&container_dir);
        }
        removed
    }
}

/// A valid worktree has a `.git` file (not directory) whose first line is a
/// `gitdir:` pointer.
fn is_valid_worktree(worktree_path: &Path) -> bool {
    let git_file = worktree_path.join(".git");
    worktree_path.exists()
        && git_file.is_file()
        && std::fs::read_to_string(&git_file)
            .map(|content| content.trim_start().starts_with("gitdir:"))
            .unwrap_or(false)
}

/// Locate the admin directory for a worktree.
///
/// Git names it after the worktree's basename and appends a numeric suffix on
/// collisions, so a basename match alone is not proof: the `gitdir` marker
/// file has to point back at our path.
fn find_admin_dir(main_repo: &Path, worktree_path: &Path) -> PathBuf {
    let basename = worktree_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let expected = main_repo.join(".git").join("worktrees").join(&basename);
    if expected.exists() {
        return expected;
    }

    let worktrees_dir = main_repo.join(".git").join("worktrees");
    if let Ok(entries) = worktrees_dir.read_dir() {
        for entry in entries.flatten() {
            if !entry.file_name().to_string_lossy().starts_with(&basename) {
                continue;
            }
            let gitdir_file = entry.path().join("gitdir");
            if let Ok(content) = std::fs::read_to_string(&gitdir_file) {
                if content.contains(&*worktree_path.to_string_lossy()) {
                    return entry.path();
                }
            }
        }
    }

    // Expected location even when not found; callers treat it as advisory.
    expected
}

/// The branch a worktree has checked out, read via its `gitdir` pointer.
fn read_worktree_branch(worktree_path: &Path) -> Option<String> {
    let git_file = worktree_path.join(".git");
    let content = std::fs::read_to_string(git_file).ok()?;
    let gitdir = content.trim().strip_prefix("gitdir: ")?;
    let head = std::fs::read_to_string(Path::new(gitdir).join("HEAD")).ok()?;
    head.trim()
        .strip_prefix("ref: refs/heads/")
        .map(str::to_owned)
}

async fn delete_worktree_branch(main_repo: &Path, branch: &str, force: bool) -> bool {
    let merged = run_git(
        main_repo,
        &to_args(&["branch", "--merged", "HEAD", "--list", branch]),
        GIT_TIMEOUT,
    )
    .await;
    let is_merged = merged.stdout.contains(branch);

    if is_merged || force {
        let flag = if force { "-D" } else { "-d" };
        run_git(main_repo, &to_args(&["branch", flag, branch]), GIT_TIMEOUT)
            .await
            .success
    } else {
        false
    }
}

fn chown_single(path: &Path, uid: u32, gid: u32) -> Result<()> {
    std::os::unix::fs::chown(path, Some(uid), Some(gid)).map_err(|err| WorktreeError::Chown {
        path: path.to_path_buf(),
        uid,
        gid,
        detail: err.to_string(),
    })
}

/// `chown -R` as a subprocess; large worktrees make per-entry syscalls from
/// here needlessly slow.
async fn chown_recursive(path: &Path, uid: u32, gid: u32) -> Result<()> {
    let output = tokio::process::Command::new("chown")
        .arg("-R")
        .arg(format!("{uid}:{gid}"))
        .arg(path)
        .output()
        .await
        .map_err(|err| WorktreeError::Chown {
            path: path.to_path_buf(),
            uid,
            gid,
            detail: err.to_string(),
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(WorktreeError::Chown {
            path: path.to_path_buf(),
            uid,
            gid,
            detail: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Names of currently running docker containers, for the orphan sweep.
/// Absent or unresponsive docker yields the empty set.
pub async fn active_docker_containers() -> HashSet<String> {
    let command = tokio::process::Command::new("docker")
        .args(["ps", "--format", "{{.Names}}"])
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(Duration::from_secs(10), command).await {
        Ok(Ok(output)) if output.status.success() => output,
        _ => return HashSet::new(),
    };

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| (*s).to_owned()).collect()
}
