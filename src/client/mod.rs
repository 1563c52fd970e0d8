//! HTTP client for the social API.
//!
//! Responses are unwrapped from the `ApiResponse` envelope. Network failures,
//! 5xx and 429 responses are retried according to a [`RetryPolicy`]; every
//! other failure is returned immediately.

use reqwest::{header, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::utils::ApiResponse;

mod retry;

pub use retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The server answered but did not allow the configured origin, which a
    /// browser would have blocked.
    #[error("origin {origin} is not allowed by the server")]
    Cors { origin: String },

    #[error("validation failed: {message}")]
    Validation { message: String, details: Option<Value> },

    #[error("unauthorized")]
    Unauthorized,

    #[error("resource not found")]
    NotFound,

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("request failed ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiClientError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiClientError::Network(_) | ApiClientError::Server { .. })
    }

    fn from_status(status: StatusCode, body: &Value) -> Self {
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ApiClientError::Validation {
                message,
                details: body.get("details").cloned(),
            },
            StatusCode::UNAUTHORIZED => ApiClientError::Unauthorized,
            StatusCode::NOT_FOUND => ApiClientError::NotFound,
            s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => ApiClientError::Server {
                status: s.as_u16(),
                message,
            },
            s => ApiClientError::Http {
                status: s.as_u16(),
                message,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    origin: Option<String>,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            origin: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sends `Origin` with every request and enforces the server's CORS answer.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiClientError> {
        self.request::<(), T>(Method::GET, path, None).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiClientError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ApiClientError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiClientError> {
        self.request::<(), T>(Method::DELETE, path, None).await
    }

    pub async fn request<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ApiClientError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send_once(method.clone(), path, body).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for(attempt - 1);
                    tracing::warn!(error = %err, %method, path, attempt, ?delay, "request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ApiClientError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut request = self.http.request(method, url);
        if let Some(origin) = &self.origin {
            request = request.header(header::ORIGIN, origin);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ApiClientError::Network)?;
        self.check_cors(&response)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.json::<Value>().await.unwrap_or(Value::Null);
            return Err(ApiClientError::from_status(status, &body));
        }

        let envelope = response
            .json::<ApiResponse<T>>()
            .await
            .map_err(|e| ApiClientError::InvalidResponse(e.to_string()))?;
        envelope
            .data
            .ok_or_else(|| ApiClientError::InvalidResponse("response carried no data".to_string()))
    }

    fn check_cors(&self, response: &reqwest::Response) -> Result<(), ApiClientError> {
        let Some(origin) = &self.origin else {
            return Ok(());
        };

        let allowed = response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == "*" || value == origin);

        if allowed {
            Ok(())
        } else {
            Err(ApiClientError::Cors {
                origin: origin.clone(),
            })
        }
    }
}
