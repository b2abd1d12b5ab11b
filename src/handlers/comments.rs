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
    models::{Comment, CreateCommentPayload, DataEnvelope, FilterQuery, NewComment},
};

#[utoipa::path(
    get,
    path = "/v1/posts/{id}/comments",
    tag = "comments",
    params(("id" = i64, Path, description = "Post ID"), FilterQuery),
    responses((status = 200, description = "Comments on the post", body = DataEnvelope<Vec<Comment>>))
)]
pub async fn list_post_comments(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    filter: FilterQuery,
) -> Result<Json<DataEnvelope<Vec<Comment>>>, ApiError> {
    let post_id = read_id(path)?;
    let comments = state
        .storage
        .comments
        .find_all_by_post_id(filter, post_id)
        .await?;
    Ok(Json(DataEnvelope::new(comments)))
}

/// create_comment
///
/// A comment on a post that does not exist is rejected by the store with 404.
#[utoipa::path(
    post,
    path = "/v1/posts/{id}/comments",
    tag = "comments",
    params(("id" = i64, Path, description = "Post ID")),
    request_body = CreateCommentPayload,
    responses(
        (status = 201, description = "Comment created", body = DataEnvelope<Comment>),
        (status = 400, description = "Invalid payload", body = ErrorEnvelope),
        (status = 404, description = "Post not found", body = ErrorEnvelope)
    )
)]
pub async fn create_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<CreateCommentPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<DataEnvelope<Comment>>), ApiError> {
    let post_id = read_id(path)?;
    let payload = read_json(payload)?;
    payload.validate()?;

    let comment = state
        .storage
        .comments
        .create(NewComment {
            user_id: user.id,
            post_id,
            content: payload.content,
        })
        .await?;

    tracing::info!(comment_id = comment.id, post_id, user_id = user.id, "comment created");
    Ok((StatusCode::CREATED, Json(DataEnvelope::new(comment))))
}

/// list_comments
///
/// Moderator view over every comment on every post.
#[utoipa::path(
    get,
    path = "/v1/posts/comments",
    tag = "comments",
    params(FilterQuery),
    responses(
        (status = 200, description = "All comments", body = DataEnvelope<Vec<Comment>>),
        (status = 403, description = "Role below moderator", body = ErrorEnvelope)
    )
)]
pub async fn list_comments(
    State(state): State<AppState>,
    filter: FilterQuery,
) -> Result<Json<DataEnvelope<Vec<Comment>>>, ApiError> {
    let comments = state.storage.comments.find_all(filter).await?;
    Ok(Json(DataEnvelope::new(comments)))
}

#[utoipa::path(
    delete,
    path = "/v1/posts/comments/{id}",
    tag = "comments",
    params(("id" = i64, Path, description = "Comment ID")),
    responses(
        (status = 204, description = "Comment deleted"),
        (status = 404, description = "Comment not found", body = ErrorEnvelope)
    )
)]
pub async fn delete_comment(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let id = read_id(path)?;
    state.storage.comments.delete(id).await?;

    tracing::info!(comment_id = id, "comment deleted");
    Ok(StatusCode::NO_CONTENT)
}
