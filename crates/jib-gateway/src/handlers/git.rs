use std::path::Path;
use std::time::Duration;

use axum::Extension;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::Response;
use jib_gateway_core::validate::{
    parse_refspec_branch, parse_remote_url, ssh_url_to_https, validate_git_args,
    validate_repo_path,
};
use jib_gateway_core::GitReadOp;
use jib_gateway_github::{run_git, run_git_with_credentials};
use serde::Deserialize;
use serde_json::json;

use crate::audit::audit;
use crate::auth::SourceIp;
use crate::response::{ApiError, success};
use crate::state::AppState;

const REMOTE_URL_TIMEOUT: Duration = Duration::from_secs(10);
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
pub struct PushRequest {
    repo_path: Option<String>,
    #[serde(default = "default_remote")]
    remote: String,
    #[serde(default)]
    refspec: String,
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Deserialize)]
pub struct FetchRequest {
    repo_path: Option<String>,
    #[serde(default = "default_remote")]
    remote: String,
    #[serde(default = "default_operation")]
    operation: String,
    #[serde(default)]
    args: Vec<String>,
}

fn default_remote() -> String {
    "origin".to_owned()
}

fn default_operation() -> String {
    "fetch".to_owned()
}

/// `POST /api/v1/git/push`: push a branch, subject to branch ownership.
pub async fn push(
    State(state): State<AppState>,
    Extension(SourceIp(source_ip)): Extension<SourceIp>,
    body: Result<Json<PushRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|_| ApiError::bad_request("Missing request body"))?;
    let Some(repo_path) = req.repo_path else {
        return Err(ApiError::bad_request("Missing repo_path"));
    };

    let repo_path = match validate_repo_path(&repo_path, &state.repo_roots) {
        Ok(path) => path,
        Err(err) => {
            audit(
                "push_blocked",
                "git_push",
                &source_ip,
                false,
                &json!({ "repo_path": repo_path, "reason": err.to_string() }),
            );
            return Err(ApiError::forbidden(err.to_string(), None));
        }
    };

    let remote_url = remote_url(&repo_path, &req.remote).await?;
    let repo = parse_remote_url(&remote_url).ok_or_else(|| {
        ApiError::bad_request(format!("Could not parse repository from URL: {remote_url}"))
    })?;

    let branch = match parse_refspec_branch(&req.refspec) {
        Some(branch) => branch,
        None => current_branch(&repo_path).await.ok_or_else(|| {
            ApiError::bad_request("Could not determine branch to push")
        })?,
    };

    let mode = state.repo_config.auth_mode(&repo);
    let decision = state.policy.check_branch_ownership(&repo, &branch, mode).await;
    if !decision.allowed {
        audit(
            "push_denied",
            "git_push",
            &source_ip,
            false,
            &json!({
                "repo": repo,
                "branch": branch,
                "reason": decision.reason,
                "auth_mode": mode.as_str(),
            }),
        );
        return Err(ApiError::forbidden(
            format!("Push denied: {}", decision.reason),
            Some(decision.details),
        ));
    }

    let token = state
        .tokens
        .token_for_mode(mode)
        .map_err(|err| ApiError::unavailable(err.to_string()))?;

    // Commit attribution is set at commit time, not push time; incognito only
    // changes which token authenticates the transfer.
    let mut args = vec!["push".to_owned()];
    if req.force {
        args.push("--force".to_owned());
    }
    args.push(transfer_target(&req.remote, &remote_url));
    if !req.refspec.is_empty() {
        args.push(req.refspec.clone());
    }

    let outcome = run_git_with_credentials(&repo_path, &args, TRANSFER_TIMEOUT, &token)
        .await
        .map_err(|err| ApiError::internal(format!("Push failed: {err}"), None))?;

    if outcome.is_timeout() {
        return Err(ApiError::timeout("Push timed out"));
    }

    if outcome.success {
        audit(
            "push_success",
            "git_push",
            &source_ip,
            true,
            &json!({
                "repo": repo,
                "branch": branch,
                "force": req.force,
                "auth_mode": mode.as_str(),
            }),
        );
        Ok(success(
            "Push successful",
            Some(json!({
                "repo": repo,
                "branch": branch,
                "stdout": outcome.stdout,
                "stderr": outcome.stderr,
                "auth_mode": mode.as_str(),
            })),
        ))
    } else {
        audit(
            "push_failed",
            "git_push",
            &source_ip,
            false,
            &json!({
                "repo": repo,
                "branch": branch,
                "returncode": outcome.returncode,
                "auth_mode": mode.as_str(),
            }),
        );
        Err(ApiError::internal(
            format!("Push failed: {}", outcome.stderr),
            Some(json!({ "stdout": outcome.stdout, "stderr": outcome.stderr })),
        ))
    }
}

/// `POST /api/v1/git/fetch`: authenticated fetch/ls-remote.
///
/// No ownership policy applies to reads, but the path, the operation, and
/// every extra argument still go through the validators.
pub async fn fetch(
    State(state): State<AppState>,
    Extension(SourceIp(source_ip)): Extension<SourceIp>,
    body: Result<Json<FetchRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|_| ApiError::bad_request("Missing request body"))?;
    let Some(repo_path) = req.repo_path else {
        return Err(ApiError::bad_request("Missing repo_path"));
    };

    let repo_path = match validate_repo_path(&repo_path, &state.repo_roots) {
        Ok(path) => path,
        Err(err) => {
            audit(
                "fetch_blocked",
                "git_fetch",
                &source_ip,
                false,
                &json!({ "repo_path": repo_path, "reason": err.to_string() }),
            );
            return Err(ApiError::forbidden(err.to_string(), None));
        }
    };

    let Some(operation) = GitReadOp::parse(&req.operation) else {
        return Err(ApiError::bad_request(format!(
            "Unsupported operation: {}",
            req.operation
        )));
    };

    let validated_args = match validate_git_args(operation, &req.args) {
        Ok(args) => args,
        Err(err) => {
            audit(
                "fetch_blocked",
                "git_fetch",
                &source_ip,
                false,
                &json!({ "reason": err.to_string(), "operation": operation.as_str() }),
            );
            return Err(ApiError::bad_request(err.to_string()));
        }
    };

    let remote_url = remote_url(&repo_path, &req.remote).await?;
    let repo = parse_remote_url(&remote_url).ok_or_else(|| {
        ApiError::bad_request(format!("Could not parse repository from URL: {remote_url}"))
    })?;

    let mode = state.repo_config.auth_mode(&repo);
    let token = state
        .tokens
        .token_for_mode(mode)
        .map_err(|err| ApiError::unavailable(err.to_string()))?;

    let mut args = vec![operation.as_str().to_owned()];
    match operation {
        GitReadOp::Fetch => {
            // --all already addresses every remote.
            if !validated_args.iter().any(|a| a == "--all") {
                args.push(transfer_target(&req.remote, &remote_url));
            }
        }
        GitReadOp::LsRemote => {
            args.push(transfer_target(&req.remote, &remote_url));
        }
    }
    args.extend(validated_args);

    let outcome = run_git_with_credentials(&repo_path, &args, TRANSFER_TIMEOUT, &token)
        .await
        .map_err(|err| {
            ApiError::internal(format!("{} failed: {err}", operation.as_str()), None)
        })?;

    if outcome.is_timeout() {
        return Err(ApiError::timeout(format!("{} timed out", operation.as_str())));
    }

    let op_name = format!("git_{}", operation.as_str().replace('-', "_"));
    if outcome.success {
        audit(
            &format!("{}_success", operation.as_str()),
            &op_name,
            &source_ip,
            true,
            &json!({ "repo": repo, "auth_mode": mode.as_str() }),
        );
        Ok(success(
            format!("{} successful", operation.as_str()),
            Some(json!({
                "repo": repo,
                "stdout": outcome.stdout,
                "stderr": outcome.stderr,
                "auth_mode": mode.as_str(),
            })),
        ))
    } else {
        audit(
            &format!("{}_failed", operation.as_str()),
            &op_name,
            &source_ip,
            false,
            &json!({
                "repo": repo,
                "returncode": outcome.returncode,
                "auth_mode": mode.as_str(),
            }),
        );
        Err(ApiError::internal(
            format!("{} failed: {}", operation.as_str(), outcome.stderr),
            Some(json!({ "stdout": outcome.stdout, "stderr": outcome.stderr })),
        ))
    }
}

/// `git remote get-url <remote>` inside the already-validated repo path.
async fn remote_url(repo_path: &Path, remote: &str) -> Result<String, ApiError> {
    let outcome = run_git(
        repo_path,
        &[
            "remote".to_owned(),
            "get-url".to_owned(),
            remote.to_owned(),
        ],
        REMOTE_URL_TIMEOUT,
    )
    .await;

    if !outcome.success {
        return Err(ApiError::bad_request(format!(
            "Failed to get remote URL: {}",
            outcome.stderr
        )));
    }
    Ok(outcome.stdout.trim().to_owned())
}

async fn current_branch(repo_path: &Path) -> Option<String> {
    let outcome = run_git(
        repo_path,
        &["branch".to_owned(), "--show-current".to_owned()],
        REMOTE_URL_TIMEOUT,
    )
    .await;
    let branch = outcome.stdout.trim();
    if outcome.success && !branch.is_empty() {
        Some(branch.to_owned())
    } else {
        None
    }
}

/// The transfer destination: the remote name, except SSH remotes are
/// rewritten to their HTTPS form (the gateway authenticates with tokens, not
/// keys).
fn transfer_target(remote: &str, remote_url: &str) -> String {
    if remote_url.starts_with("git@") || remote_url.starts_with("ssh://") {
        ssh_url_to_https(remote_url)
    } else {
        remote.to_owned()
    }
}
