use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Everything a signed-in user can do. `create_router` wraps this router in
/// `require_session`, so a request only reaches these handlers with an active account.
/// Ownership rules (author or admin) are checked per post inside the content service.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Profile ---
        .route(
            "/user/profile",
            get(handlers::users::get_profile).put(handlers::users::update_profile),
        )
        .route(
            "/user/change-password",
            post(handlers::users::change_password),
        )
        // --- Posts ---
        .route(
            "/posts",
            get(handlers::posts::list_posts).post(handlers::posts::create_post),
        )
        // Static segments win over `{id}`, so these never parse as ids.
        .route("/posts/my", get(handlers::posts::my_posts))
        .route("/posts/search", get(handlers::posts::search_posts))
        // PUT/DELETE require the author or an admin.
        .route(
            "/posts/{id}",
            get(handlers::posts::get_post)
                .put(handlers::posts::update_post)
                .delete(handlers::posts::delete_post),
        )
}
