use jib_gateway_core::validate::{
    blocked_gh_command, is_readonly_gh_command, parse_refspec_branch, parse_remote_url,
    ssh_url_to_https, validate_gh_api_path, validate_git_args, validate_identifier,
    validate_repo_path,
};
use jib_gateway_core::{GitReadOp, ValidationError};
use tempfile::TempDir;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_owned()).collect()
}

// ── repo_path ──

#[test]
fn repo_path_inside_root_is_accepted() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("worktrees");
    let repo = root.join("c1").join("acme-foo");
    std::fs::create_dir_all(&repo).unwrap();

    let validated = validate_repo_path(repo.to_str().unwrap(), &[root]).unwrap();
    assert!(validated.ends_with("c1/acme-foo"));
}

#[test]
fn repo_path_relative_is_rejected() {
    let err = validate_repo_path("worktrees/c1/repo", &[]).unwrap_err();
    assert!(matches!(err, ValidationError::RelativePath));
}

#[test]
fn repo_path_with_dotdot_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("worktrees");
    std::fs::create_dir_all(&root).unwrap();
    let sneaky = format!("{}/c1/../../etc", root.display());

    let err = validate_repo_path(&sneaky, &[root]).unwrap_err();
    assert!(matches!(err, ValidationError::PathTraversal));
}

#[test]
fn repo_path_outside_roots_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("worktrees");
    let elsewhere = tmp.path().join("elsewhere");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::create_dir_all(&elsewhere).unwrap();

    let err = validate_repo_path(elsewhere.to_str().unwrap(), &[root]).unwrap_err();
    assert!(matches!(err, ValidationError::OutsideAllowedRoots));
}

#[test]
fn repo_path_equal_to_root_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("worktrees");
    std::fs::create_dir_all(&root).unwrap();

    let err = validate_repo_path(root.to_str().unwrap(), &[root.clone()]).unwrap_err();
    assert!(matches!(err, ValidationError::OutsideAllowedRoots));
}

#[cfg(unix)]
#[test]
fn repo_path_symlink_escape_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("worktrees");
    let outside = tmp.path().join("outside");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::create_dir_all(&outside).unwrap();
    let link = root.join("c1");
    std::os::unix::fs::symlink(&outside, &link).unwrap();

    let err = validate_repo_path(link.to_str().unwrap(), &[root]).unwrap_err();
    assert!(matches!(err, ValidationError::OutsideAllowedRoots));
}

#[test]
fn repo_path_nonexistent_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("worktrees");
    std::fs::create_dir_all(&root).unwrap();
    let missing = root.join("c9").join("ghost");

    let err = validate_repo_path(missing.to_str().unwrap(), &[root]).unwrap_err();
    assert!(matches!(err, ValidationError::Unresolvable(_)));
}

// ── git args ──

#[test]
fn fetch_allowlist_accepts_known_flags() {
    let validated = validate_git_args(
        GitReadOp::Fetch,
        &args(&["--all", "--tags", "--prune", "--depth=5", "--", "main"]),
    )
    .unwrap();
    assert_eq!(validated.len(), 6);
}

#[test]
fn fetch_rejects_unknown_options() {
    for bad in ["--mirror", "--upload-pack=/tmp/x", "-o", "--depth=0", "--depth=abc"] {
        let result = validate_git_args(GitReadOp::Fetch, &args(&[bad]));
        assert!(result.is_err(), "{bad} should be rejected");
    }
}

#[test]
fn fetch_rejects_suspicious_positionals() {
    for bad in ["", "..", "a..b", "-branch", "/abs"] {
        let result = validate_git_args(GitReadOp::Fetch, &args(&[bad]));
        assert!(result.is_err(), "{bad:?} should be rejected");
    }
}

#[test]
fn ls_remote_accepts_ref_patterns() {
    let validated =
        validate_git_args(GitReadOp::LsRemote, &args(&["refs/heads/*", "main"])).unwrap();
    assert_eq!(validated, vec!["refs/heads/*", "main"]);
}

#[test]
fn ls_remote_rejects_options_and_glob_is_fetch_rejected() {
    assert!(validate_git_args(GitReadOp::LsRemote, &args(&["--upload-pack=/x"])).is_err());
    // Globs are a pattern feature of ls-remote only.
    assert!(validate_git_args(GitReadOp::Fetch, &args(&["refs/heads/*"])).is_err());
}

// ── gh api paths ──

#[test]
fn api_allowlist_accepts_read_endpoints() {
    for path in [
        "/user",
        "user",
        "repos/acme/foo/branches/main",
        "/repos/acme/foo/commits/abc123/check-runs",
        "repos/acme/foo/pulls/42/comments",
        "repos/acme/foo/branches/main?per_page=1",
    ] {
        assert!(validate_gh_api_path(path, "GET").is_ok(), "{path} should pass");
    }
}

#[test]
fn api_allowlist_rejects_writes_and_unknown_paths() {
    assert!(validate_gh_api_path("repos/acme/foo/branches/main", "POST").is_err());
    assert!(validate_gh_api_path("repos/acme/foo/branches/main", "DELETE").is_err());
    for path in [
        "repos/acme/foo",
        "repos/acme/foo/pulls/42",
        "repos/acme/foo/pulls/abc/comments",
        "repos/acme/foo/../../meta",
        "orgs/acme/members",
        "",
    ] {
        assert!(validate_gh_api_path(path, "GET").is_err(), "{path:?} should fail");
    }
}

// ── gh command classification ──

#[test]
fn blocked_commands_are_detected() {
    assert_eq!(blocked_gh_command(&args(&["pr", "merge", "42"])), Some("pr merge"));
    assert_eq!(blocked_gh_command(&args(&["repo", "delete", "acme/foo"])), Some("repo delete"));
    assert_eq!(blocked_gh_command(&args(&["auth", "logout"])), Some("auth logout"));
    assert_eq!(blocked_gh_command(&args(&["pr", "view", "42"])), None);
}

#[test]
fn readonly_allowlist_matches() {
    assert!(is_readonly_gh_command(&args(&["pr", "view", "42"])));
    assert!(is_readonly_gh_command(&args(&["api", "repos/acme/foo/branches/main"])));
    assert!(is_readonly_gh_command(&args(&["search", "prs", "--author", "jib"])));
    assert!(!is_readonly_gh_command(&args(&["pr", "create"])));
    assert!(!is_readonly_gh_command(&args(&["workflow", "run"])));
    assert!(!is_readonly_gh_command(&args(&[])));
}

// ── URL and refspec parsing ──

#[test]
fn remote_url_forms_parse_to_owner_repo() {
    for url in [
        "https://github.com/acme/foo.git",
        "https://github.com/acme/foo",
        "git@github.com:acme/foo.git",
        "ssh://git@github.com/acme/foo.git",
    ] {
        assert_eq!(parse_remote_url(url).as_deref(), Some("acme/foo"), "{url}");
    }
}

#[test]
fn remote_url_other_hosts_yield_none() {
    assert!(parse_remote_url("https://gitlab.com/acme/foo.git").is_none());
    assert!(parse_remote_url("git@bitbucket.org:acme/foo.git").is_none());
    assert!(parse_remote_url("not a url").is_none());
    assert!(parse_remote_url("https://github.com/acme").is_none());
}

#[test]
fn ssh_urls_convert_to_https() {
    assert_eq!(
        ssh_url_to_https("git@github.com:acme/foo.git"),
        "https://github.com/acme/foo.git"
    );
    assert_eq!(
        ssh_url_to_https("ssh://git@github.com/acme/foo"),
        "https://github.com/acme/foo.git"
    );
    assert_eq!(
        ssh_url_to_https("https://github.com/acme/foo.git"),
        "https://github.com/acme/foo.git"
    );
}

#[test]
fn refspec_branch_extraction() {
    assert_eq!(parse_refspec_branch("feature").as_deref(), Some("feature"));
    assert_eq!(parse_refspec_branch("refs/heads/feature").as_deref(), Some("feature"));
    assert_eq!(parse_refspec_branch("local:remote").as_deref(), Some("remote"));
    assert_eq!(
        parse_refspec_branch("+refs/heads/a:refs/heads/b").as_deref(),
        Some("b")
    );
    assert_eq!(parse_refspec_branch("").is_none(), true);
    assert_eq!(parse_refspec_branch("a:").is_none(), true);
}

// ── identifiers ──

#[test]
fn identifier_accepts_safe_names() {
    for ok in ["jib-abc-123", "repo.name", "a", "C1_x"] {
        assert!(validate_identifier(ok, "container_id").is_ok(), "{ok}");
    }
}

#[test]
fn identifier_rejects_unsafe_names() {
    for bad in ["", "../etc", "a/b", ".hidden", "-lead", "a b", "a..b"] {
        assert!(validate_identifier(bad, "container_id").is_err(), "{bad:?}");
    }
}

// ── property tests ──

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// The validators never panic, whatever the input.
        #[test]
        fn parsers_are_total(s in "\\PC*") {
            let _ = parse_remote_url(&s);
            let _ = parse_refspec_branch(&s);
            let _ = ssh_url_to_https(&s);
            let _ = validate_identifier(&s, "container_id");
            let _ = validate_gh_api_path(&s, "GET");
        }

        /// Anything an arg validator accepts contains no shell-risky bytes.
        #[test]
        fn accepted_fetch_args_are_inert(s in "\\PC{0,40}") {
            if let Ok(validated) = validate_git_args(GitReadOp::Fetch, &[s.clone()]) {
                for arg in validated {
                    prop_assert!(!arg.contains(' '));
                    prop_assert!(!arg.contains(';'));
                    prop_assert!(!arg.contains('\n'));
                    prop_assert!(!arg.contains(".."));
                }
            }
        }

        /// A parsed remote always has the owner/repo shape.
        #[test]
        fn parsed_remote_has_two_segments(s in "\\PC*") {
            if let Some(repo) = parse_remote_url(&s) {
                let parts: Vec<&str> = repo.split('/').collect();
                prop_assert_eq!(parts.len(), 2);
                prop_assert!(!parts[0].is_empty());
                prop_assert!(!parts[1].is_empty());
            }
        }
    }
}
