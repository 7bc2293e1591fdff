use axum::{Json, extract::State, http::StatusCode};

use crate::{
    AppState,
    error::{AppResult, ErrorResponse},
    models::{AuthResponse, LoginRequest, RegisterRequest},
};

/// register
///
/// [Public Route] Creates an active `user` account and signs it in.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = AuthResponse),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 409, description = "Username or email taken", body = ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let session = state.accounts.register(payload).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// login
///
/// [Public Route] Exchanges email and password for a session token.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Account disabled", body = ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    Ok(Json(state.accounts.login(payload).await?))
}
