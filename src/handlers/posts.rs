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
        CreatePostRequest, PageParams, PostDetail, PostPage, PostQuery, SearchQuery,
        UpdatePostRequest,
    },
};

/// list_posts
///
/// [Authenticated Route] Newest first, optionally narrowed by status and author.
/// Also mounted at `/api/admin/posts`.
#[utoipa::path(
    get,
    path = "/api/posts",
    params(PostQuery),
    responses((status = 200, description = "One page of posts", body = PostPage))
)]
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostQuery>,
) -> AppResult<Json<PostPage>> {
    let (filter, page) = query.split();
    Ok(Json(state.content.list(&filter, page).await?))
}

/// my_posts
///
/// [Authenticated Route] The caller's own posts in every status.
#[utoipa::path(
    get,
    path = "/api/posts/my",
    params(PostQuery),
    responses((status = 200, description = "One page of the caller's posts", body = PostPage))
)]
pub async fn my_posts(
    principal: Principal,
    State(state): State<AppState>,
    Query(query): Query<PostQuery>,
) -> AppResult<Json<PostPage>> {
    let (mut filter, page) = query.split();
    filter.author_id = Some(principal.id);
    Ok(Json(state.content.list(&filter, page).await?))
}

#[utoipa::path(
    get,
    path = "/api/posts/search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Published posts matching the keyword", body = PostPage),
        (status = 400, description = "Missing keyword", body = ErrorResponse)
    )
)]
pub async fn search_posts(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<PostPage>> {
    let page = PageParams {
        page: query.page,
        limit: query.limit,
    };
    Ok(Json(
        state.content.search(query.keyword.as_deref(), page).await?,
    ))
}

/// get_post
///
/// [Authenticated Route] Returns the post and queues a view increment. The count in
/// the response does not include this view.
#[utoipa::path(
    get,
    path = "/api/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Found", body = PostDetail),
        (status = 404, description = "No such post", body = ErrorResponse)
    )
)]
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PostDetail>> {
    Ok(Json(state.content.view(id).await?))
}

/// create_post
///
/// [Authenticated Route] The caller becomes the author. Post and tags are written
/// together or not at all.
#[utoipa::path(
    post,
    path = "/api/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Created", body = PostDetail),
        (status = 400, description = "Invalid payload", body = ErrorResponse)
    )
)]
pub async fn create_post(
    principal: Principal,
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<PostDetail>)> {
    let (post, tag_ids) = payload.into_new_post(principal.id)?;
    let created = state.content.create_with_tags(post, &tag_ids).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// update_post
///
/// [Authenticated Route] Author or admin only. Omitting `tag_ids` keeps the current
/// tags; `[]` removes them all.
#[utoipa::path(
    put,
    path = "/api/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Updated", body = PostDetail),
        (status = 403, description = "Not the author", body = ErrorResponse),
        (status = 404, description = "No such post", body = ErrorResponse)
    )
)]
pub async fn update_post(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePostRequest>,
) -> AppResult<Json<PostDetail>> {
    state.content.authorize_edit(&principal, id).await?;
    let (changes, tag_ids) = payload.into_changes()?;
    Ok(Json(
        state.content.update_with_tags(id, changes, tag_ids).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author", body = ErrorResponse),
        (status = 404, description = "No such post", body = ErrorResponse)
    )
)]
pub async fn delete_post(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.content.authorize_edit(&principal, id).await?;
    state.content.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
