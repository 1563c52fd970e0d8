use axum::{
    body::Bytes,
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::auth::{AuthUser, BearerToken};
use crate::error::AppError;
use crate::handlers::parse_id;
use crate::models::*;
use crate::utils::ApiResponse;
use crate::validation::parse_body;
use crate::AppState;

/// Decorates a profile with follow counts and the viewer's follow state.
async fn profile_response(
    state: &AppState,
    profile: Profile,
    viewer_id: Uuid,
) -> Result<ProfileResponse, AppError> {
    let follows = &state.services.follows;
    let counts = follows.counts(profile.user_id).await?;
    let followed_by_me = viewer_id != profile.user_id
        && follows.is_following(viewer_id, profile.user_id).await?;

    Ok(ProfileResponse {
        avatar_url: state.config.media_url(profile.avatar_key.as_deref()),
        followers: counts.followers,
        following: counts.following,
        followed_by_me,
        profile,
    })
}

pub async fn get_profile(
    State(state): State<AppState>,
    viewer: AuthUser,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = parse_id(&user_id, "user id")?;

    let profile = state
        .services
        .profiles
        .get_profile(user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(ApiResponse::success(profile_response(&state, profile, viewer.id).await?)))
}

pub async fn get_profile_by_username(
    State(state): State<AppState>,
    viewer: AuthUser,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let profile = state
        .services
        .profiles
        .get_by_username(username.trim())
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(ApiResponse::success(profile_response(&state, profile, viewer.id).await?)))
}

pub async fn get_own_profile(
    State(state): State<AppState>,
    viewer: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let profile = state
        .services
        .profiles
        .get_profile(viewer.id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(ApiResponse::success(profile_response(&state, profile, viewer.id).await?)))
}

pub async fn update_own_profile(
    State(state): State<AppState>,
    bearer: BearerToken,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let request: UpdateProfileRequest = parse_body(&body)?;
    let user = state.auth.authenticate(bearer.as_deref())?;

    let profile = state
        .services
        .profiles
        .update_profile(user.id, request)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(ApiResponse::success(profile_response(&state, profile, user.id).await?)))
}
