use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Admin Router Module
///
/// Account, content and tag management. Mounted under `/admin` behind
/// `require_session` and `require_admin`; a disabled or demoted admin loses access on
/// their next request.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // --- Accounts ---
        .route(
            "/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        // DELETE refuses to target the caller.
        .route(
            "/users/{id}",
            get(handlers::users::get_user)
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        // --- Posts ---
        // Same handlers as the authenticated routes; the admin role passes every
        // ownership check.
        .route("/posts", get(handlers::posts::list_posts))
        .route(
            "/posts/{id}",
            get(handlers::posts::get_post)
                .put(handlers::posts::update_post)
                .delete(handlers::posts::delete_post),
        )
        // --- Tags ---
        .route("/tags", post(handlers::tags::create_tag))
        .route(
            "/tags/{id}",
            put(handlers::tags::update_tag).delete(handlers::tags::delete_tag),
        )
}
