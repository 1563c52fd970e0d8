use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::*;
use crate::utils::ApiResponse;
use crate::validation::parse_body;
use crate::AppState;

pub async fn register(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let request: RegisterRequest = parse_body(&body)?;

    let password_hash = state.auth.hash_password(&request.password)?;
    let (user, profile) = state
        .services
        .users
        .create_user(NewUser {
            email: request.email,
            password_hash,
            username: request.username,
            display_name: request.display_name,
        })
        .await?;

    let token = state.auth.generate_token(&user)?;
    tracing::info!(user_id = %user.id, username = %profile.username, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(AuthResponse {
            token,
            user,
            profile: Some(profile),
        })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let request: LoginRequest = parse_body(&body)?;

    let user = state
        .services
        .users
        .find_by_email(&request.email)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !state.auth.verify_password(&request.password, &user.password_hash)? {
        return Err(AppError::Unauthorized);
    }

    let token = state.auth.generate_token(&user)?;
    let profile = state.services.profiles.get_profile(user.id).await?;

    Ok(Json(ApiResponse::success(AuthResponse { token, user, profile })))
}

pub async fn get_current_user(
    State(state): State<AppState>,
    current_user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .services
        .users
        .find_by_id(current_user.id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(ApiResponse::success(user)))
}
