use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::{AppError, AppResult, ErrorResponse},
    models::{CreateTagRequest, Tag, UpdateTagRequest},
};

const DUPLICATE_TAG: &str = "a tag with this name already exists";

fn tag_conflict(e: AppError) -> AppError {
    match e {
        AppError::Conflict(_) => AppError::Conflict(DUPLICATE_TAG.into()),
        other => other,
    }
}

/// list_tags
///
/// [Public Route] Every tag, by name.
#[utoipa::path(
    get,
    path = "/api/tags",
    responses((status = 200, description = "All tags", body = [Tag]))
)]
pub async fn list_tags(State(state): State<AppState>) -> AppResult<Json<Vec<Tag>>> {
    Ok(Json(state.repo.list_tags().await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/tags",
    request_body = CreateTagRequest,
    responses(
        (status = 201, description = "Created", body = Tag),
        (status = 409, description = "Name taken", body = ErrorResponse)
    )
)]
pub async fn create_tag(
    State(state): State<AppState>,
    Json(payload): Json<CreateTagRequest>,
) -> AppResult<(StatusCode, Json<Tag>)> {
    let tag = state
        .repo
        .create_tag(payload.into_new_tag()?)
        .await
        .map_err(|e| tag_conflict(e.into()))?;
    tracing::info!(tag_id = %tag.id, name = %tag.name, "tag created");
    Ok((StatusCode::CREATED, Json(tag)))
}

#[utoipa::path(
    put,
    path = "/api/admin/tags/{id}",
    params(("id" = Uuid, Path, description = "Tag ID")),
    request_body = UpdateTagRequest,
    responses(
        (status = 200, description = "Updated", body = Tag),
        (status = 404, description = "No such tag", body = ErrorResponse),
        (status = 409, description = "Name taken", body = ErrorResponse)
    )
)]
pub async fn update_tag(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTagRequest>,
) -> AppResult<Json<Tag>> {
    state
        .repo
        .update_tag(id, payload.into_changes()?)
        .await
        .map_err(|e| tag_conflict(e.into()))?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("tag not found".into()))
}

/// delete_tag
///
/// [Admin Route] Detaches the tag from every post; the posts themselves stay.
#[utoipa::path(
    delete,
    path = "/api/admin/tags/{id}",
    params(("id" = Uuid, Path, description = "Tag ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such tag", body = ErrorResponse)
    )
)]
pub async fn delete_tag(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if !state.repo.delete_tag(id).await? {
        return Err(AppError::NotFound("tag not found".into()));
    }
    tracing::info!(tag_id = %id, "tag deleted");
    Ok(StatusCode::NO_CONTENT)
}
