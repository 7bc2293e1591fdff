use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::Principal,
    error::{AppResult, ErrorResponse},
    models::{
        ChangePasswordRequest, CreateUserRequest, PageParams, UpdateProfileRequest,
        UpdateUserRequest, UserPage, UserProfile,
    },
};

// --- Self-service ---

/// get_profile
///
/// [Authenticated Route] The caller's own account, read fresh from storage.
#[utoipa::path(
    get,
    path = "/api/user/profile",
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 401, description = "No valid session", body = ErrorResponse)
    )
)]
pub async fn get_profile(
    principal: Principal,
    State(state): State<AppState>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(state.accounts.profile(&principal).await?))
}

#[utoipa::path(
    put,
    path = "/api/user/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 409, description = "Username taken", body = ErrorResponse)
    )
)]
pub async fn update_profile(
    principal: Principal,
    State(state): State<AppState>,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(state.accounts.update_profile(&principal, payload).await?))
}

/// change_password
///
/// [Authenticated Route] Requires the current password. Existing tokens stay valid
/// until they expire.
#[utoipa::path(
    post,
    path = "/api/user/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Wrong current password or weak new one", body = ErrorResponse)
    )
)]
pub async fn change_password(
    principal: Principal,
    State(state): State<AppState>,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<StatusCode> {
    state.accounts.change_password(&principal, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Administration ---

/// list_users
///
/// [Admin Route] Every account, oldest first.
#[utoipa::path(
    get,
    path = "/api/admin/users",
    params(PageParams),
    responses(
        (status = 200, description = "One page of accounts", body = UserPage),
        (status = 403, description = "Not an admin", body = ErrorResponse)
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<UserPage>> {
    Ok(Json(state.accounts.list_users(page).await?))
}

#[utoipa::path(
    get,
    path = "/api/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = UserProfile),
        (status = 404, description = "No such user", body = ErrorResponse)
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(state.accounts.get_user(id).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Created", body = UserProfile),
        (status = 409, description = "Username or email taken", body = ErrorResponse)
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    let user = state.accounts.create_user(payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// update_user
///
/// [Admin Route] Sparse edit. Role and status changes bind the account's next request.
#[utoipa::path(
    put,
    path = "/api/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 404, description = "No such user", body = ErrorResponse)
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(state.accounts.update_user(id, payload).await?))
}

/// delete_user
///
/// [Admin Route] Removes an account and everything it authored. An admin cannot
/// delete their own account.
#[utoipa::path(
    delete,
    path = "/api/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Target is the caller", body = ErrorResponse),
        (status = 404, description = "No such user", body = ErrorResponse)
    )
)]
pub async fn delete_user(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.accounts.delete_user(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
