use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct AuthService {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    token_ttl: Duration,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(jwt_secret: &str, token_ttl: Duration, bcrypt_cost: u32) -> Self {
        Self {
            encoding_key: Arc::new(EncodingKey::from_secret(jwt_secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(jwt_secret.as_bytes())),
            token_ttl,
            bcrypt_cost,
        }
    }

    pub fn hash_password(&self, password: &str) -> Result<String, AppError> {
        hash(password, self.bcrypt_cost)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AppError> {
        verify(password, hash)
            .map_err(|e| AppError::Internal(format!("Failed to verify password: {}", e)))
    }

    pub fn generate_token(&self, user: &User) -> Result<String, AppError> {
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(self.token_ttl)
            .ok_or_else(|| AppError::Internal("Token expiry overflowed".to_string()))?;

        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            iat: now.timestamp(),
            exp: expiration.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AppError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|err| {
                tracing::debug!(error = %err, "rejected bearer token");
                AppError::Unauthorized
            })?;

        Ok(token_data.claims)
    }

    /// Resolves the caller from an optional bearer token.
    pub fn authenticate(&self, token: Option<&str>) -> Result<AuthUser, AppError> {
        let claims = self.verify_token(token.ok_or(AppError::Unauthorized)?)?;
        let id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)?;

        Ok(AuthUser {
            id,
            email: claims.email,
        })
    }
}

/// Raw bearer token from the `Authorization` header, not yet verified.
///
/// Handlers that take a body use this so that body validation runs before
/// authentication.
#[derive(Debug, Clone, Default)]
pub struct BearerToken(pub Option<String>);

impl BearerToken {
    pub fn from_header(value: &str) -> Option<String> {
        let (scheme, token) = value.trim().split_once(' ')?;
        let token = token.trim();
        if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
            Some(token.to_string())
        } else {
            None
        }
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .and_then(BearerToken::from_header);

        Ok(BearerToken(token))
    }
}

/// Authenticated caller. Rejects with 401 when the token is missing or invalid.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = match BearerToken::from_request_parts(parts, state).await {
            Ok(token) => token,
            Err(never) => match never {},
        };

        state.auth.authenticate(token.as_deref())
    }
}
