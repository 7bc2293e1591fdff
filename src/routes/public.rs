use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session: liveness, the sign-in flow and the tag
/// catalogue.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Load balancer probe.
        .route("/health", get(handlers::health))
        // POST /auth/register, POST /auth/login
        // Both answer `{user, token}`.
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        // GET /tags
        .route("/tags", get(handlers::tags::list_tags))
}
