use std::path::Path;
use std::time::Duration;

use jib_gateway_github::{run_git, run_git_with_credentials};
use secrecy::SecretString;
use tempfile::TempDir;

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_owned()).collect()
}

async fn git_in(repo: &Path, args: &[&str]) {
    let outcome = run_git(repo, &strings(args), Duration::from_secs(30)).await;
    assert!(outcome.success, "git {args:?} failed: {}", outcome.stderr);
}

/// A repo with one commit.
async fn init_repo(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    git_in(dir, &["init", "--initial-branch=main"]).await;
    std::fs::write(dir.join("README.md"), "hello\n").unwrap();
    git_in(dir, &["add", "."]).await;
    git_in(
        dir,
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
}

#[tokio::test]
async fn run_git_reports_remote_url() {
    let tmp = TempDir::new().unwrap();
    let upstream = tmp.path().join("upstream");
    let work = tmp.path().join("work");
    init_repo(&upstream).await;
    init_repo(&work).await;
    git_in(&work, &["remote", "add", "origin", upstream.to_str().unwrap()]).await;

    let outcome = run_git(
        &work,
        &strings(&["remote", "get-url", "origin"]),
        Duration::from_secs(10),
    )
    .await;

    assert!(outcome.success);
    assert_eq!(outcome.stdout.trim(), upstream.to_str().unwrap());
}

#[tokio::test]
async fn run_git_nonzero_exit_is_reported_not_raised() {
    let tmp = TempDir::new().unwrap();
    let work = tmp.path().join("work");
    init_repo(&work).await;

    let outcome = run_git(
        &work,
        &strings(&["remote", "get-url", "nosuchremote"]),
        Duration::from_secs(10),
    )
    .await;

    assert!(!outcome.success);
    assert_ne!(outcome.returncode, 0);
    assert!(!outcome.stderr.is_empty());
}

#[tokio::test]
async fn credentialed_fetch_succeeds_and_scrubs() {
    let tmp = TempDir::new().unwrap();
    let upstream = tmp.path().join("upstream");
    let work = tmp.path().join("work");
    init_repo(&upstream).await;
    init_repo(&work).await;
    git_in(&work, &["remote", "add", "origin", upstream.to_str().unwrap()]).await;

    let token = SecretString::from("ghs_integration_token");
    let outcome = run_git_with_credentials(
        &work,
        &strings(&["fetch", "origin"]),
        Duration::from_secs(30),
        &token,
    )
    .await
    .unwrap();

    assert!(outcome.success, "fetch failed: {}", outcome.stderr);
    assert!(!outcome.stdout.contains("ghs_integration_token"));
    assert!(!outcome.stderr.contains("ghs_integration_token"));
}

#[tokio::test]
async fn credentialed_run_failure_still_reports_stderr() {
    let tmp = TempDir::new().unwrap();
    let work = tmp.path().join("work");
    init_repo(&work).await;

    let token = SecretString::from("ghs_integration_token");
    let outcome = run_git_with_credentials(
        &work,
        &strings(&["push", "nosuchremote"]),
        Duration::from_secs(30),
        &token,
    )
    .await
    .unwrap();

    assert!(!outcome.success);
    assert!(!outcome.stderr.contains("ghs_integration_token"));
}
