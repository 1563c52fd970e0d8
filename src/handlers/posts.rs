use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::auth::{AuthUser, BearerToken};
use crate::config::Config;
use crate::error::AppError;
use crate::handlers::parse_id;
use crate::models::*;
use crate::utils::{ApiResponse, PaginatedResponse, PaginationParams, PaginationQuery};
use crate::validation::{parse_body, QueryParams};
use crate::AppState;

impl PostResponse {
    pub fn new(post: Post, config: &Config) -> Self {
        Self {
            image_url: config.media_url(post.image_key.as_deref()),
            post,
        }
    }
}

pub async fn create_post(
    State(state): State<AppState>,
    bearer: BearerToken,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let request: CreatePostRequest = parse_body(&body)?;
    let user = state.auth.authenticate(bearer.as_deref())?;

    let post = state.services.posts.create_post(user.id, request).await?;
    tracing::info!(post_id = %post.id, user_id = %user.id, "post created");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(PostResponse::new(post, &state.config))),
    ))
}

pub async fn get_post(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let post_id = parse_id(&post_id, "post id")?;

    let post = state
        .services
        .posts
        .get_post(post_id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(ApiResponse::success(PostResponse::new(post, &state.config))))
}

pub async fn list_user_posts(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(user_id): Path<String>,
    QueryParams(pagination): QueryParams<PaginationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = parse_id(&user_id, "user id")?;
    let pagination = PaginationParams::from(pagination);

    let (posts, total) = state.services.posts.list_by_user(user_id, pagination).await?;
    let response = PaginatedResponse::new(posts, pagination, total)
        .map(|post| PostResponse::new(post, &state.config));

    Ok(Json(ApiResponse::success(response)))
}

pub async fn feed(
    State(state): State<AppState>,
    user: AuthUser,
    QueryParams(pagination): QueryParams<PaginationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let pagination = PaginationParams::from(pagination);

    let (posts, total) = state.services.posts.feed(user.id, pagination).await?;
    let response = PaginatedResponse::new(posts, pagination, total)
        .map(|post| PostResponse::new(post, &state.config));

    Ok(Json(ApiResponse::success(response)))
}

/// `PUT /api/posts/:post_id`
///
/// Body parsing and validation run before the token is checked, and a post
/// that exists but belongs to someone else is reported exactly like a missing
/// one.
pub async fn update_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    bearer: BearerToken,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let post_id = parse_id(&post_id, "post id")?;
    let request: UpdatePostRequest = parse_body(&body)?;
    let user = state.auth.authenticate(bearer.as_deref())?;

    let post = state
        .services
        .posts
        .update_post(post_id, user.id, request)
        .await?
        .ok_or(AppError::NotFound)?;

    tracing::info!(post_id = %post.id, user_id = %user.id, "post updated");
    Ok(Json(ApiResponse::success(PostResponse::new(post, &state.config))))
}

pub async fn delete_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let post_id = parse_id(&post_id, "post id")?;

    if !state.services.posts.delete_post(post_id, user.id).await? {
        return Err(AppError::NotFound);
    }

    tracing::info!(%post_id, user_id = %user.id, "post deleted");
    Ok(Json(ApiResponse::success(serde_json::json!({ "deleted": true }))))
}
