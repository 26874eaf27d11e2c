use axum::Router;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::auth::{self, SourceIp};
use crate::handlers;
use crate::ratelimit::OpClass;
use crate::response::ApiError;
use crate::state::AppState;

/// Assemble the full HTTP surface.
///
/// Health is public; everything else sits behind the auth layer, with a
/// per-route rate-limit layer carrying that endpoint's operation class.
/// Layer order per request: auth, then rate limit, then the handler.
pub fn build_router(state: AppState) -> Router {
    let limited = |class: OpClass| {
        middleware::from_fn_with_state((state.clone(), class), enforce_rate_limit)
    };

    let protected = Router::new()
        .route(
            "/git/push",
            post(handlers::git::push).route_layer(limited(OpClass::GitPush)),
        )
        .route(
            "/git/fetch",
            post(handlers::git::fetch).route_layer(limited(OpClass::GitFetch)),
        )
        .route(
            "/gh/pr/create",
            post(handlers::pr::create).route_layer(limited(OpClass::GhPrCreate)),
        )
        .route(
            "/gh/pr/comment",
            post(handlers::pr::comment).route_layer(limited(OpClass::GhPrComment)),
        )
        .route(
            "/gh/pr/edit",
            post(handlers::pr::edit).route_layer(limited(OpClass::GhPrEdit)),
        )
        .route(
            "/gh/pr/close",
            post(handlers::pr::close).route_layer(limited(OpClass::GhPrClose)),
        )
        .route(
            "/gh/execute",
            post(handlers::execute::execute).route_layer(limited(OpClass::GhExecute)),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth::verify));

    Router::new()
        .route("/api/v1/health", get(handlers::health::health))
        .nest("/api/v1", protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Per-route rate limiting. Runs after auth, so every counted request was
/// authenticated; a denied request is counted nowhere.
async fn enforce_rate_limit(
    State((state, class)): State<(AppState, OpClass)>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(denied) = state.rate.check_and_record(class) {
        let source_ip = request
            .extensions()
            .get::<SourceIp>()
            .map(|ip| ip.0.clone())
            .unwrap_or_else(|| "unknown".to_owned());
        tracing::warn!(
            operation = class.as_str(),
            endpoint = %request.uri().path(),
            %source_ip,
            "rate limit exceeded"
        );
        crate::audit::audit(
            "rate_limited",
            class.as_str(),
            &source_ip,
            false,
            &serde_json::json!({ "endpoint": request.uri().path() }),
        );
        return Err(ApiError::rate_limited(denied.to_string()));
    }
    Ok(next.run(request).await)
}
