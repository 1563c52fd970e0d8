use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::handlers::parse_id;
use crate::utils::{ApiResponse, PaginatedResponse, PaginationParams, PaginationQuery};
use crate::validation::QueryParams;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct NotificationFilterQuery {
    pub unread_only: Option<bool>,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthUser,
    QueryParams(filters): QueryParams<NotificationFilterQuery>,
    QueryParams(pagination): QueryParams<PaginationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let pagination = PaginationParams::from(pagination);

    let (notifications, total) = state
        .services
        .notifications
        .list(user.id, filters.unread_only.unwrap_or(false), pagination)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(notifications, pagination, total))))
}

pub async fn unread_count(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let count = state.services.notifications.unread_count(user.id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({ "unread": count }))))
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(notification_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let notification_id = parse_id(&notification_id, "notification id")?;

    let notification = state
        .services
        .notifications
        .mark_read(notification_id, user.id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(ApiResponse::success(notification)))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let updated = state.services.notifications.mark_all_read(user.id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({ "updated": updated }))))
}
