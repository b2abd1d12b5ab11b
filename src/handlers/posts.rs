use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
};

use super::{read_id, read_json};
use crate::{
    AppState,
    auth::AuthUser,
    error::{ApiError, ErrorEnvelope},
    middleware::PostContext,
    models::{CreatePostPayload, DataEnvelope, FilterQuery, NewPost, Post, UpdatePostPayload},
};

/// list_posts
///
/// Public, paginated listing ordered by id.
#[utoipa::path(
    get,
    path = "/v1/posts",
    tag = "posts",
    params(FilterQuery),
    responses(
        (status = 200, description = "Posts", body = DataEnvelope<Vec<Post>>),
        (status = 400, description = "Invalid pagination", body = ErrorEnvelope)
    )
)]
pub async fn list_posts(
    State(state): State<AppState>,
    filter: FilterQuery,
) -> Result<Json<DataEnvelope<Vec<Post>>>, ApiError> {
    let posts = state.storage.posts.find_all(filter).await?;
    Ok(Json(DataEnvelope::new(posts)))
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}/posts",
    tag = "posts",
    params(("id" = i64, Path, description = "User ID"), FilterQuery),
    responses((status = 200, description = "Posts by user", body = DataEnvelope<Vec<Post>>))
)]
pub async fn list_user_posts(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    filter: FilterQuery,
) -> Result<Json<DataEnvelope<Vec<Post>>>, ApiError> {
    let user_id = read_id(path)?;
    let posts = state
        .storage
        .posts
        .find_all_by_user_id(filter, user_id)
        .await?;
    Ok(Json(DataEnvelope::new(posts)))
}

/// get_post
///
/// The lookup itself happens in `load_post`.
#[utoipa::path(
    get,
    path = "/v1/posts/{id}",
    tag = "posts",
    params(("id" = i64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Post", body = DataEnvelope<Post>),
        (status = 404, description = "Post not found", body = ErrorEnvelope)
    )
)]
pub async fn get_post(PostContext(post): PostContext) -> Json<DataEnvelope<Post>> {
    Json(DataEnvelope::new(post))
}

#[utoipa::path(
    post,
    path = "/v1/posts",
    tag = "posts",
    request_body = CreatePostPayload,
    responses(
        (status = 201, description = "Post created", body = DataEnvelope<Post>),
        (status = 400, description = "Invalid payload", body = ErrorEnvelope),
        (status = 401, description = "Not authenticated", body = ErrorEnvelope),
        (status = 403, description = "Role below user", body = ErrorEnvelope)
    )
)]
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<CreatePostPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<DataEnvelope<Post>>), ApiError> {
    let payload = read_json(payload)?;
    payload.validate()?;

    let post = state
        .storage
        .posts
        .create(NewPost {
            user_id: user.id,
            title: payload.title,
            content: payload.content,
        })
        .await?;

    tracing::info!(post_id = post.id, user_id = user.id, "post created");
    Ok((StatusCode::CREATED, Json(DataEnvelope::new(post))))
}

/// update_post
///
/// Moderator edit. Fields left out of the body keep their value.
#[utoipa::path(
    patch,
    path = "/v1/posts/{id}",
    tag = "posts",
    params(("id" = i64, Path, description = "Post ID")),
    request_body = UpdatePostPayload,
    responses(
        (status = 200, description = "Post updated", body = DataEnvelope<Post>),
        (status = 403, description = "Role below moderator", body = ErrorEnvelope),
        (status = 404, description = "Post not found", body = ErrorEnvelope)
    )
)]
pub async fn update_post(
    State(state): State<AppState>,
    PostContext(mut post): PostContext,
    payload: Result<Json<UpdatePostPayload>, JsonRejection>,
) -> Result<Json<DataEnvelope<Post>>, ApiError> {
    let payload = read_json(payload)?;
    payload.validate()?;
    payload.apply(&mut post);

    let updated = state.storage.posts.update(&post).await?;

    tracing::info!(post_id = updated.id, "post updated");
    Ok(Json(DataEnvelope::new(updated)))
}

#[utoipa::path(
    delete,
    path = "/v1/posts/{id}",
    tag = "posts",
    params(("id" = i64, Path, description = "Post ID")),
    responses(
        (status = 204, description = "Post deleted"),
        (status = 403, description = "Role below moderator", body = ErrorEnvelope),
        (status = 404, description = "Post not found", body = ErrorEnvelope)
    )
)]
pub async fn delete_post(
    State(state): State<AppState>,
    PostContext(post): PostContext,
) -> Result<StatusCode, ApiError> {
    state.storage.posts.delete(post.id).await?;

    tracing::info!(post_id = post.id, "post deleted");
    Ok(StatusCode::NO_CONTENT)
}
