use std::collections::HashSet;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::time::Duration;

use jib_gateway_github::run_git;
use jib_gateway_worktree::{WorktreeError, WorktreeManager};
use tempfile::TempDir;

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_owned()).collect()
}

async fn git_in(repo: &Path, args: &[&str]) {
    let outcome = run_git(repo, &strings(args), Duration::from_secs(30)).await;
    assert!(outcome.success, "git {args:?} failed: {}", outcome.stderr);
}

struct Fixture {
    _tmp: TempDir,
    manager: WorktreeManager,
    uid: u32,
    gid: u32,
}

/// A worktree root, a repos root holding `myrepo` with one commit, and the
/// current uid/gid (chown to self needs no privileges).
async fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let worktree_root = tmp.path().join("worktrees");
    let repos_root = tmp.path().join("repos");
    let main_repo = repos_root.join("myrepo");
    std::fs::create_dir_all(&worktree_root).unwrap();
    std::fs::create_dir_all(&main_repo).unwrap();

    git_in(&main_repo, &["init", "--initial-branch=main"]).await;
    std::fs::write(main_repo.join("README.md"), "hello\n").unwrap();
    git_in(&main_repo, &["add", "."]).await;
    git_in(
        &main_repo,
        &[
            "-c",
            "user.email=gateway@test",
            "-c",
            "user.name=gateway",
            "commit",
            "-m",
            "init",
        ],
    )
    .await;

    let meta = std::fs::metadata(tmp.path()).unwrap();
    let (uid, gid) = (meta.uid(), meta.gid());
    let manager = WorktreeManager::new(worktree_root, repos_root, "jib");
    Fixture {
        _tmp: tmp,
        manager,
        uid,
        gid,
    }
}

#[tokio::test]
async fn create_produces_a_real_worktree() {
    let fx = fixture().await;
    let info = fx
        .manager
        .create("myrepo", "c1", "HEAD", fx.uid, fx.gid)
        .await
        .unwrap();

    assert_eq!(info.branch, "jib/c1/work");
    assert!(info.worktree_path.ends_with("c1/myrepo"));

    // A worktree's .git is a file with a gitdir pointer, not a directory.
    let git_file = info.worktree_path.join(".git");
    assert!(git_file.is_file());
    let content = std::fs::read_to_string(&git_file).unwrap();
    assert!(content.starts_with("gitdir:"));

    // The admin dir is discovered, not guessed.
    assert!(info.admin_dir.exists(), "admin dir: {}", info.admin_dir.display());
    assert!(info.admin_dir.join("gitdir").exists());
}

#[tokio::test]
async fn create_twice_reuses_the_worktree() {
    let fx = fixture().await;
    let first = fx
        .manager
        .create("myrepo", "c1", "HEAD", fx.uid, fx.gid)
        .await
        .unwrap();
    let second = fx
        .manager
        .create("myrepo", "c1", "HEAD", fx.uid, fx.gid)
        .await
        .unwrap();

    assert_eq!(first.worktree_path, second.worktree_path);
    assert_eq!(first.branch, second.branch);
}

#[tokio::test]
async fn create_rejects_traversal_identifiers() {
    let fx = fixture().await;
    for bad in ["../escape", "a/b", "", ".hidden"] {
        let result = fx.manager.create("myrepo", bad, "HEAD", fx.uid, fx.gid).await;
        assert!(
            matches!(result, Err(WorktreeError::Invalid(_))),
            "{bad:?} should be rejected"
        );
    }
}

#[tokio::test]
async fn create_unknown_repo_is_an_error() {
    let fx = fixture().await;
    let result = fx.manager.create("ghost", "c1", "HEAD", fx.uid, fx.gid).await;
    assert!(matches!(result, Err(WorktreeError::RepoNotFound(_))));
}

#[tokio::test]
async fn remove_deletes_worktree_and_merged_branch() {
    let fx = fixture().await;
    let info = fx
        .manager
        .create("myrepo", "c1", "HEAD", fx.uid, fx.gid)
        .await
        .unwrap();

    let removal = fx.manager.remove("c1", "myrepo", false, true).await.unwrap();

    assert!(removal.success);
    assert!(removal.branch_deleted);
    assert!(!info.worktree_path.exists());
    // The now-empty container directory is pruned too.
    assert!(!info.worktree_path.parent().unwrap().exists());
}

#[tokio::test]
async fn remove_refuses_uncommitted_changes_without_force() {
    let fx = fixture().await;
    let info = fx
        .manager
        .create("myrepo", "c1", "HEAD", fx.uid, fx.gid)
        .await
        .unwrap();
    std::fs::write(info.worktree_path.join("dirty.txt"), "wip\n").unwrap();

    let refused = fx.manager.remove("c1", "myrepo", false, true).await.unwrap();
    assert!(!refused.success);
    assert!(refused.uncommitted_changes);
    assert!(info.worktree_path.exists());

    let forced = fx.manager.remove("c1", "myrepo", true, true).await.unwrap();
    assert!(forced.success);
    assert!(!info.worktree_path.exists());
}

#[tokio::test]
async fn remove_missing_worktree_is_a_success() {
    let fx = fixture().await;
    let removal = fx.manager.remove("nope", "myrepo", false, true).await.unwrap();
    assert!(removal.success);
}

#[tokio::test]
async fn list_reports_container_and_branch() {
    let fx = fixture().await;
    fx.manager
        .create("myrepo", "c1", "HEAD", fx.uid, fx.gid)
        .await
        .unwrap();

    let listing = fx.manager.list();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].container_id, "c1");
    assert_eq!(listing[0].repos.len(), 1);
    assert_eq!(listing[0].repos[0].name, "myrepo");
    assert_eq!(listing[0].repos[0].branch.as_deref(), Some("jib/c1/work"));
}

#[tokio::test]
async fn orphan_sweep_spares_only_active_containers() {
    let fx = fixture().await;
    fx.manager
        .create("myrepo", "alive", "HEAD", fx.uid, fx.gid)
        .await
        .unwrap();
    fx.manager
        .create("myrepo", "dead", "HEAD", fx.uid, fx.gid)
        .await
        .unwrap();
    // A stray directory that is not a real worktree.
    let stray = fx.manager.worktree_root().join("stray").join("junkrepo");
    std::fs::create_dir_all(&stray).unwrap();

    let active: HashSet<String> = ["alive".to_owned()].into();
    fx.manager.orphan_sweep(&active).await;

    let remaining: Vec<String> = fx
        .manager
        .worktree_root()
        .read_dir()
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(remaining, vec!["alive"]);
}

#[tokio::test]
async fn orphan_sweep_with_no_active_set_clears_everything() {
    let fx = fixture().await;
    fx.manager
        .create("myrepo", "c1", "HEAD", fx.uid, fx.gid)
        .await
        .unwrap();
    fx.manager
        .create("myrepo", "c2", "HEAD", fx.uid, fx.gid)
        .await
        .unwrap();

    fx.manager.orphan_sweep(&HashSet::new()).await;

    let remaining = fx.manager.worktree_root().read_dir().unwrap().flatten().count();
    assert_eq!(remaining, 0);
}
