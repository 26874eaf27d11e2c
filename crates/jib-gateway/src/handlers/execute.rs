use std::path::PathBuf;
use std::time::Duration;

use axum::Extension;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::Response;
use jib_gateway_core::validate::{
    READONLY_GH_COMMANDS, blocked_gh_command, gh_command_string, is_readonly_gh_command,
    validate_gh_api_path, validate_repo_path,
};
use serde::Deserialize;
use serde_json::json;

use crate::audit::audit;
use crate::auth::SourceIp;
use crate::response::{ApiError, success};
use crate::state::AppState;

const EXECUTE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    args: Vec<String>,
    cwd: Option<String>,
}

/// `POST /api/v1/gh/execute`: the read-only fallback for gh commands the
/// typed endpoints do not cover.
///
/// Enforcement is deny-list first (for the precise audit shape), then the
/// read-only allow-list, then the api-path validator as a second gate for
/// `gh api` invocations. Nothing is spawned for a rejected command.
pub async fn execute(
    State(state): State<AppState>,
    Extension(SourceIp(source_ip)): Extension<SourceIp>,
    body: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|_| ApiError::bad_request("Missing request body"))?;
    if req.args.is_empty() {
        return Err(ApiError::bad_request("Missing args"));
    }

    if let Some(blocked) = blocked_gh_command(&req.args) {
        audit(
            "blocked_command",
            "gh_execute",
            &source_ip,
            false,
            &json!({ "command_args": req.args, "blocked_command": blocked }),
        );
        return Err(ApiError::forbidden(
            format!(
                "Command '{blocked}' is not allowed through the gateway. \
                 Allowed read-only commands: {}",
                READONLY_GH_COMMANDS.join(", ")
            ),
            Some(json!({ "blocked_command": blocked, "command_args": req.args })),
        ));
    }

    if !is_readonly_gh_command(&req.args) {
        let command = gh_command_string(&req.args);
        audit(
            "blocked_command",
            "gh_execute",
            &source_ip,
            false,
            &json!({ "command_args": req.args, "blocked_command": command }),
        );
        return Err(ApiError::forbidden(
            format!(
                "Command '{command}' is not allowed through the gateway. \
                 Allowed read-only commands: {}",
                READONLY_GH_COMMANDS.join(", ")
            ),
            Some(json!({ "command_args": req.args })),
        ));
    }

    // Second gate for anything that slipped through as `gh api …`.
    if req.args[0] == "api" && req.args.len() > 1 {
        let api_path = &req.args[1];
        let method = req
            .args
            .windows(2)
            .find(|w| w[0] == "-X" || w[0] == "--method")
            .map(|w| w[1].to_uppercase())
            .unwrap_or_else(|| "GET".to_owned());

        if let Err(err) = validate_gh_api_path(api_path, &method) {
            audit(
                "api_path_blocked",
                "gh_execute",
                &source_ip,
                false,
                &json!({ "api_path": api_path, "method": method, "reason": err.to_string() }),
            );
            return Err(ApiError::forbidden(err.to_string(), None));
        }
    }

    // A working directory, when given, obeys the same containment rules as
    // every repo_path.
    let cwd: Option<PathBuf> = match req.cwd.as_deref() {
        Some(raw) => Some(
            validate_repo_path(raw, &state.repo_roots)
                .map_err(|err| ApiError::forbidden(err.to_string(), None))?,
        ),
        None => None,
    };

    // --repo/-R selects the repo and with it the auth mode.
    let repo = req
        .args
        .windows(2)
        .find(|w| w[0] == "--repo" || w[0] == "-R")
        .map(|w| w[1].clone());
    let mode = repo
        .as_deref()
        .map(|r| state.repo_config.auth_mode(r))
        .unwrap_or_default();

    let outcome = state
        .github
        .execute(&req.args, EXECUTE_TIMEOUT, cwd.as_deref(), mode)
        .await;
    if outcome.is_timeout() {
        return Err(ApiError::timeout("Command timed out"));
    }

    if outcome.success {
        audit(
            "command_executed",
            "gh_execute",
            &source_ip,
            true,
            &json!({ "command_args": req.args, "auth_mode": mode.as_str() }),
        );
        let mut data = outcome.to_json();
        if let Some(object) = data.as_object_mut() {
            object.insert("auth_mode".to_owned(), json!(mode.as_str()));
        }
        Ok(success("Command executed", Some(data)))
    } else {
        Err(ApiError::internal(
            format!("Command failed: {}", outcome.stderr),
            Some(outcome.to_json()),
        ))
    }
}
