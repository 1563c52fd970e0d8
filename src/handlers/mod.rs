use axum::{response::IntoResponse, Json};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::NewNotification;
use crate::AppState;

pub mod auctions;
pub mod auth;
pub mod comments;
pub mod notifications;
pub mod posts;
pub mod profiles;
pub mod social;

pub use auctions::*;
pub use auth::*;
pub use comments::*;
pub use notifications::*;
pub use posts::*;
pub use profiles::*;
pub use social::*;

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Parses an id taken from the request path.
pub(crate) fn parse_id(raw: &str, name: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("Invalid {}", name)))
}

/// Records a notification as a side effect. Self-actions are skipped and
/// failures are logged rather than failing the request.
pub(crate) async fn notify(state: &AppState, notification: NewNotification) {
    if notification.user_id == notification.actor_id {
        return;
    }

    let kind = notification.kind;
    let recipient = notification.user_id;
    if let Err(err) = state.services.notifications.create(notification).await {
        tracing::warn!(error = %err, %kind, %recipient, "failed to record notification");
    }
}
