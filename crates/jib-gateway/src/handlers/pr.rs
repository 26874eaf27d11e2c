use std::time::Duration;

use axum::Extension;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;

use crate::audit::audit;
use crate::auth::SourceIp;
use crate::response::{ApiError, success};
use crate::state::AppState;

const CREATE_TIMEOUT: Duration = Duration::from_secs(60);
const MODIFY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    repo: Option<String>,
    title: Option<String>,
    #[serde(default)]
    body: String,
    #[serde(default = "default_base")]
    base: String,
    head: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    repo: Option<String>,
    pr_number: Option<u64>,
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    repo: Option<String>,
    pr_number: Option<u64>,
    title: Option<String>,
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CloseRequest {
    repo: Option<String>,
    pr_number: Option<u64>,
}

fn default_base() -> String {
    "main".to_owned()
}

/// `POST /api/v1/gh/pr/create`: blocked in incognito mode.
pub async fn create(
    State(state): State<AppState>,
    Extension(SourceIp(source_ip)): Extension<SourceIp>,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|_| ApiError::bad_request("Missing request body"))?;
    let Some(repo) = req.repo else {
        return Err(ApiError::bad_request("Missing repo"));
    };
    let Some(title) = req.title else {
        return Err(ApiError::bad_request("Missing title"));
    };
    let Some(head) = req.head else {
        return Err(ApiError::bad_request("Missing head branch"));
    };

    let mode = state.repo_config.auth_mode(&repo);
    let decision = state.policy.check_pr_create_allowed(&repo, mode);
    if !decision.allowed {
        audit(
            "pr_create_blocked",
            "gh_pr_create",
            &source_ip,
            false,
            &json!({ "repo": repo, "reason": decision.reason, "auth_mode": mode.as_str() }),
        );
        return Err(ApiError::forbidden(decision.reason, Some(decision.details)));
    }

    let args = vec![
        "pr".to_owned(),
        "create".to_owned(),
        "--repo".to_owned(),
        repo.clone(),
        "--title".to_owned(),
        title.clone(),
        "--body".to_owned(),
        req.body,
        "--base".to_owned(),
        req.base.clone(),
        "--head".to_owned(),
        head.clone(),
    ];

    let outcome = state.github.execute(&args, CREATE_TIMEOUT, None, mode).await;
    if outcome.is_timeout() {
        return Err(ApiError::timeout("PR create timed out"));
    }

    if outcome.success {
        audit(
            "pr_created",
            "gh_pr_create",
            &source_ip,
            true,
            &json!({
                "repo": repo,
                "title": title,
                "base": req.base,
                "head": head,
                "auth_mode": mode.as_str(),
            }),
        );
        Ok(success(
            "PR created",
            Some(json!({
                "stdout": outcome.stdout,
                "stderr": outcome.stderr,
                "auth_mode": mode.as_str(),
            })),
        ))
    } else {
        let error = if outcome.stderr.is_empty() {
            "Unknown error".to_owned()
        } else {
            outcome.stderr.clone()
        };
        audit(
            "pr_create_failed",
            "gh_pr_create",
            &source_ip,
            false,
            &json!({
                "repo": repo,
                "error": error.chars().take(200).collect::<String>(),
                "auth_mode": mode.as_str(),
            }),
        );
        Err(ApiError::internal(
            format!("Failed to create PR: {error}"),
            Some(outcome.to_json()),
        ))
    }
}

/// `POST /api/v1/gh/pr/comment`: allowed on any PR that exists.
pub async fn comment(
    State(state): State<AppState>,
    Extension(SourceIp(source_ip)): Extension<SourceIp>,
    body: Result<Json<CommentRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|_| ApiError::bad_request("Missing request body"))?;
    let Some(repo) = req.repo else {
        return Err(ApiError::bad_request("Missing repo"));
    };
    let Some(pr_number) = req.pr_number else {
        return Err(ApiError::bad_request("Missing pr_number"));
    };
    let Some(comment_body) = req.body.filter(|b| !b.is_empty()) else {
        return Err(ApiError::bad_request("Missing body"));
    };

    let mode = state.repo_config.auth_mode(&repo);
    let decision = state
        .policy
        .check_pr_comment_allowed(&repo, pr_number, mode)
        .await;
    if !decision.allowed {
        audit(
            "pr_comment_denied",
            "gh_pr_comment",
            &source_ip,
            false,
            &json!({
                "repo": repo,
                "pr_number": pr_number,
                "reason": decision.reason,
                "auth_mode": mode.as_str(),
            }),
        );
        return Err(ApiError::forbidden(
            format!("Comment denied: {}", decision.reason),
            Some(decision.details),
        ));
    }

    let args = vec![
        "pr".to_owned(),
        "comment".to_owned(),
        pr_number.to_string(),
        "--repo".to_owned(),
        repo.clone(),
        "--body".to_owned(),
        comment_body,
    ];

    let outcome = state.github.execute(&args, MODIFY_TIMEOUT, None, mode).await;
    if outcome.is_timeout() {
        return Err(ApiError::timeout("PR comment timed out"));
    }

    if outcome.success {
        audit(
            "pr_comment_added",
            "gh_pr_comment",
            &source_ip,
            true,
            &json!({ "repo": repo, "pr_number": pr_number, "auth_mode": mode.as_str() }),
        );
        Ok(success(
            "Comment added",
            Some(json!({ "stdout": outcome.stdout, "auth_mode": mode.as_str() })),
        ))
    } else {
        Err(ApiError::internal(
            format!("Failed to add comment: {}", outcome.stderr),
            Some(outcome.to_json()),
        ))
    }
}

/// `POST /api/v1/gh/pr/edit`: requires PR ownership.
pub async fn edit(
    State(state): State<AppState>,
    Extension(SourceIp(source_ip)): Extension<SourceIp>,
    body: Result<Json<EditRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|_| ApiError::bad_request("Missing request body"))?;
    let Some(repo) = req.repo else {
        return Err(ApiError::bad_request("Missing repo"));
    };
    let Some(pr_number) = req.pr_number else {
        return Err(ApiError::bad_request("Missing pr_number"));
    };
    if req.title.is_none() && req.body.is_none() {
        return Err(ApiError::bad_request("Must provide title or body to edit"));
    }

    let mode = state.repo_config.auth_mode(&repo);
    let decision = state.policy.check_pr_ownership(&repo, pr_number, mode).await;
    if !decision.allowed {
        audit(
            "pr_edit_denied",
            "gh_pr_edit",
            &source_ip,
            false,
            &json!({
                "repo": repo,
                "pr_number": pr_number,
                "reason": decision.reason,
                "auth_mode": mode.as_str(),
            }),
        );
        return Err(ApiError::forbidden(
            format!("Edit denied: {}", decision.reason),
            Some(decision.details),
        ));
    }

    let mut args = vec![
        "pr".to_owned(),
        "edit".to_owned(),
        pr_number.to_string(),
        "--repo".to_owned(),
        repo.clone(),
    ];
    if let Some(title) = req.title {
        args.push("--title".to_owned());
        args.push(title);
    }
    if let Some(pr_body) = req.body {
        args.push("--body".to_owned());
        args.push(pr_body);
    }

    let outcome = state.github.execute(&args, MODIFY_TIMEOUT, None, mode).await;
    if outcome.is_timeout() {
        return Err(ApiError::timeout("PR edit timed out"));
    }

    if outcome.success {
        audit(
            "pr_edited",
            "gh_pr_edit",
            &source_ip,
            true,
            &json!({ "repo": repo, "pr_number": pr_number, "auth_mode": mode.as_str() }),
        );
        Ok(success(
            "PR edited",
            Some(json!({ "stdout": outcome.stdout, "auth_mode": mode.as_str() })),
        ))
    } else {
        Err(ApiError::internal(
            format!("Failed to edit PR: {}", outcome.stderr),
            Some(outcome.to_json()),
        ))
    }
}

/// `POST /api/v1/gh/pr/close`: requires PR ownership.
pub async fn close(
    State(state): State<AppState>,
    Extension(SourceIp(source_ip)): Extension<SourceIp>,
    body: Result<Json<CloseRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|_| ApiError::bad_request("Missing request body"))?;
    let Some(repo) = req.repo else {
        return Err(ApiError::bad_request("Missing repo"));
    };
    let Some(pr_number) = req.pr_number else {
        return Err(ApiError::bad_request("Missing pr_number"));
    };

    let mode = state.repo_config.auth_mode(&repo);
    let decision = state.policy.check_pr_ownership(&repo, pr_number, mode).await;
    if !decision.allowed {
        audit(
            "pr_close_denied",
            "gh_pr_close",
            &source_ip,
            false,
            &json!({
                "repo": repo,
                "pr_number": pr_number,
                "reason": decision.reason,
                "auth_mode": mode.as_str(),
            }),
        );
        return Err(ApiError::forbidden(
            format!("Close denied: {}", decision.reason),
            Some(decision.details),
        ));
    }

    let args = vec![
        "pr".to_owned(),
        "close".to_owned(),
        pr_number.to_string(),
        "--repo".to_owned(),
        repo.clone(),
    ];

    let outcome = state.github.execute(&args, MODIFY_TIMEOUT, None, mode).await;
    if outcome.is_timeout() {
        return Err(ApiError::timeout("PR close timed out"));
    }

    if outcome.success {
        audit(
            "pr_closed",
            "gh_pr_close",
            &source_ip,
            true,
            &json!({ "repo": repo, "pr_number": pr_number, "auth_mode": mode.as_str() }),
        );
        Ok(success(
            "PR closed",
            Some(json!({ "stdout": outcome.stdout, "auth_mode": mode.as_str() })),
        ))
    } else {
        Err(ApiError::internal(
            format!("Failed to close PR: {}", outcome.stderr),
            Some(outcome.to_json()),
        ))
    }
}
