use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::handlers::{notify, parse_id};
use crate::models::*;
use crate::utils::{ApiResponse, PaginatedResponse, PaginationParams, PaginationQuery};
use crate::validation::QueryParams;
use crate::AppState;

pub async fn like_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let post_id = parse_id(&post_id, "post id")?;

    let created = state.services.likes.like(post_id, user.id).await?;
    let post = state
        .services
        .posts
        .get_post(post_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if created {
        notify(
            &state,
            NewNotification {
                user_id: post.user_id,
                actor_id: user.id,
                kind: NotificationKind::Like,
                entity_id: Some(post.id),
            },
        )
        .await;
    }

    Ok(Json(ApiResponse::success(LikeResponse {
        post_id: post.id,
        liked: true,
        like_count: post.like_count,
    })))
}

pub async fn unlike_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let post_id = parse_id(&post_id, "post id")?;

    state.services.likes.unlike(post_id, user.id).await?;
    let post = state
        .services
        .posts
        .get_post(post_id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(ApiResponse::success(LikeResponse {
        post_id: post.id,
        liked: false,
        like_count: post.like_count,
    })))
}

pub async fn follow_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let followee_id = parse_id(&user_id, "user id")?;
    if followee_id == user.id {
        return Err(AppError::BadRequest("You cannot follow yourself".to_string()));
    }

    let created = state.services.follows.follow(user.id, followee_id).await?;
    if created {
        tracing::debug!(follower = %user.id, followee = %followee_id, "follow created");
        notify(
            &state,
            NewNotification {
                user_id: followee_id,
                actor_id: user.id,
                kind: NotificationKind::Follow,
                entity_id: None,
            },
        )
        .await;
    }

    Ok(Json(ApiResponse::success(FollowResponse {
        user_id: followee_id,
        following: true,
    })))
}

pub async fn unfollow_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let followee_id = parse_id(&user_id, "user id")?;

    if state.services.users.find_by_id(followee_id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    state.services.follows.unfollow(user.id, followee_id).await?;

    Ok(Json(ApiResponse::success(FollowResponse {
        user_id: followee_id,
        following: false,
    })))
}

pub async fn list_followers(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(user_id): Path<String>,
    QueryParams(pagination): QueryParams<PaginationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = parse_id(&user_id, "user id")?;
    let pagination = PaginationParams::from(pagination);

    let (profiles, total) = state.services.follows.followers(user_id, pagination).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(profiles, pagination, total))))
}

pub async fn list_following(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(user_id): Path<String>,
    QueryParams(pagination): QueryParams<PaginationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = parse_id(&user_id, "user id")?;
    let pagination = PaginationParams::from(pagination);

    let (profiles, total) = state.services.follows.following(user_id, pagination).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(profiles, pagination, total))))
}
