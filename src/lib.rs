use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use tokio::task::JoinHandle;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core services.
pub mod accounts;
pub mod auth;
pub mod config;
pub mod content;
pub mod error;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod password;
pub mod policy;
pub mod repository;
pub mod token;
pub mod views;

// Routing segregation (Public, Authenticated, Admin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use accounts::AccountService;
pub use auth::{Principal, SessionResolver};
pub use config::AppConfig;
pub use content::ContentService;
pub use error::{AppError, AppResult};
pub use memory::InMemoryRepository;
pub use password::{BcryptVerifier, CredentialState};
pub use repository::{PostgresRepository, RepositoryState};
pub use token::{TokenCodec, TokenError};
pub use views::ViewCounter;

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` payload into the
/// OpenAPI document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::auth::register, handlers::auth::login,
        handlers::users::get_profile, handlers::users::update_profile,
        handlers::users::change_password, handlers::users::list_users,
        handlers::users::get_user, handlers::users::create_user,
        handlers::users::update_user, handlers::users::delete_user,
        handlers::posts::list_posts, handlers::posts::my_posts,
        handlers::posts::search_posts, handlers::posts::get_post,
        handlers::posts::create_post, handlers::posts::update_post,
        handlers::posts::delete_post,
        handlers::tags::list_tags, handlers::tags::create_tag,
        handlers::tags::update_tag, handlers::tags::delete_tag,
    ),
    components(
        schemas(
            models::Role, models::AccountStatus, models::PostStatus,
            models::UserProfile, models::UserSummary, models::Tag, models::PostDetail,
            models::PageMeta, models::PostPage, models::UserPage,
            models::RegisterRequest, models::LoginRequest, models::AuthResponse,
            models::UpdateProfileRequest, models::ChangePasswordRequest,
            models::CreateUserRequest, models::UpdateUserRequest,
            models::CreatePostRequest, models::UpdatePostRequest,
            models::CreateTagRequest, models::UpdateTagRequest,
            error::ErrorResponse, handlers::HealthResponse,
        )
    ),
    tags(
        (name = "press-portal", description = "Multi-tenant content management API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container for every service. Cloning is cheap: each field is
/// an `Arc` or a handle around one.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub config: AppConfig,
    pub sessions: SessionResolver,
    pub accounts: AccountService,
    pub content: ContentService,
}

impl AppState {
    /// build
    ///
    /// Wires the services around one repository and starts the view counting worker,
    /// whose handle is returned. Fails only if the signing configuration is unusable.
    pub fn build(
        config: AppConfig,
        repo: RepositoryState,
        credentials: CredentialState,
    ) -> Result<(Self, JoinHandle<()>), TokenError> {
        let codec = Arc::new(TokenCodec::new(&config.jwt_secret, config.jwt_lifetime)?);
        let (views, worker) = ViewCounter::start(repo.clone(), config.view_queue_depth);

        let state = Self {
            sessions: SessionResolver::new(codec.clone(), repo.clone()),
            accounts: AccountService::new(repo.clone(), credentials, codec),
            content: ContentService::new(repo.clone(), views),
            repo,
            config,
        };
        Ok((state, worker))
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

// Required by the `Principal` extractor and `require_session`.
impl FromRef<AppState> for SessionResolver {
    fn from_ref(app_state: &AppState) -> SessionResolver {
        app_state.sessions.clone()
    }
}

/// create_router
///
/// Assembles every route group under `/api`, attaches the access-control layers per
/// group, and wraps the whole app in the observability stack.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // Route layers run outermost-last: session resolution happens before the admin check.
    let admin_routes = admin::admin_routes()
        .route_layer(middleware::from_fn(auth::require_admin))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    let authenticated_routes = authenticated::authenticated_routes().route_layer(
        middleware::from_fn_with_state(state.clone(), auth::require_session),
    );

    let api = Router::new()
        .merge(public::public_routes())
        .merge(authenticated_routes)
        .nest("/admin", admin_routes);

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span carrying method, uri and the `x-request-id` set by
/// `SetRequestIdLayer`, so every log line of one request shares an id.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
