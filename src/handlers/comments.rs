use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::auth::{AuthUser, BearerToken};
use crate::error::AppError;
use crate::handlers::{notify, parse_id};
use crate::models::*;
use crate::utils::{ApiResponse, PaginatedResponse, PaginationParams, PaginationQuery};
use crate::validation::{parse_body, QueryParams};
use crate::AppState;

pub async fn create_comment(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    bearer: BearerToken,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let post_id = parse_id(&post_id, "post id")?;
    let request: CommentRequest = parse_body(&body)?;
    let user = state.auth.authenticate(bearer.as_deref())?;

    let post = state
        .services
        .posts
        .get_post(post_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let comment = state
        .services
        .comments
        .create_comment(post.id, user.id, request.content)
        .await?;

    notify(
        &state,
        NewNotification {
            user_id: post.user_id,
            actor_id: user.id,
            kind: NotificationKind::Comment,
            entity_id: Some(post.id),
        },
    )
    .await;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(comment))))
}

pub async fn list_comments(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(post_id): Path<String>,
    QueryParams(pagination): QueryParams<PaginationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let post_id = parse_id(&post_id, "post id")?;
    let pagination = PaginationParams::from(pagination);

    if state.services.posts.get_post(post_id).await?.is_none() {
        return Err(AppError::NotFound);
    }

    let (comments, total) = state.services.comments.list_for_post(post_id, pagination).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(comments, pagination, total))))
}

pub async fn update_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    bearer: BearerToken,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let comment_id = parse_id(&comment_id, "comment id")?;
    let request: CommentRequest = parse_body(&body)?;
    let user = state.auth.authenticate(bearer.as_deref())?;

    let comment = state
        .services
        .comments
        .update_comment(comment_id, user.id, request.content)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(ApiResponse::success(comment)))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(comment_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let comment_id = parse_id(&comment_id, "comment id")?;

    if !state.services.comments.delete_comment(comment_id, user.id).await? {
        return Err(AppError::NotFound);
    }

    Ok(Json(ApiResponse::success(serde_json::json!({ "deleted": true }))))
}
