use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::validation::ValidationErrors;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("resource not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("validation failed")]
    Validation(ValidationErrors),

    #[error("unauthorized")]
    Unauthorized,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(ValidationErrors::single("query", rejection.body_text()))
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match self {
            AppError::Database(err) => {
                tracing::error!(error = ?err, "database error");
                json!({ "error": "Internal server error", "status": status.as_u16() })
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                json!({ "error": "Internal server error", "status": status.as_u16() })
            }
            AppError::Validation(errors) => json!({
                "error": "Validation failed",
                "status": status.as_u16(),
                "details": errors,
            }),
            AppError::NotFound => json!({ "error": "Resource not found", "status": status.as_u16() }),
            AppError::Unauthorized => json!({ "error": "Unauthorized", "status": status.as_u16() }),
            AppError::BadRequest(msg) | AppError::Conflict(msg) => {
                json!({ "error": msg, "status": status.as_u16() })
            }
        };

        (status, Json(body)).into_response()
    }
}
