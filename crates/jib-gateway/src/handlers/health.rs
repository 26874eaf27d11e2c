use axum::Json;
use axum::extract::State;
use jib_gateway_core::AuthMode;
use secrecy::ExposeSecret;
use serde_json::{Value, json};

use crate::state::AppState;

/// Health check. Unauthenticated: containers probe this before their first
/// real request.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let github_token_valid = state.tokens.is_valid(AuthMode::Bot);
    let auth_configured = !state.secret.expose_secret().is_empty();

    Json(json!({
        "status": if github_token_valid && auth_configured { "healthy" } else { "degraded" },
        "github_token_valid": github_token_valid,
        "auth_configured": auth_configured,
        "service": "jib-gateway",
    }))
}
