use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use secrecy::ExposeSecret;
use serde_json::json;

use crate::audit::audit;
use crate::response::ApiError;
use crate::state::AppState;

/// The caller's address, resolved once by the auth layer and attached to the
/// request for handlers and audit lines.
#[derive(Debug, Clone)]
pub struct SourceIp(pub String);

/// Axum middleware enforcing `Authorization: Bearer <gateway-secret>`.
///
/// Comparison is constant-time; failures log the source and endpoint but
/// never any token bytes.
pub async fn verify(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let source_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned());
    let endpoint = request.uri().path().to_owned();

    let bearer = request
        .headers()
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "));

    let Some(provided) = bearer else {
        tracing::warn!(%endpoint, %source_ip, "missing or malformed Authorization header");
        audit(
            "auth_failed",
            "auth",
            &source_ip,
            false,
            &json!({ "endpoint": endpoint, "reason": "missing or invalid Authorization header" }),
        );
        return Err(ApiError::unauthorized(
            "Missing or invalid Authorization header",
        ));
    };

    if !constant_time_eq(
        provided.as_bytes(),
        state.secret.expose_secret().as_bytes(),
    ) {
        tracing::warn!(%endpoint, %source_ip, "invalid authorization token");
        audit(
            "auth_failed",
            "auth",
            &source_ip,
            false,
            &json!({ "endpoint": endpoint, "reason": "invalid authorization token" }),
        );
        return Err(ApiError::unauthorized("Invalid authorization token"));
    }

    request.extensions_mut().insert(SourceIp(source_ip));
    Ok(next.run(request).await)
}

/// Constant-time byte comparison to prevent timing attacks on the gateway
/// secret.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
