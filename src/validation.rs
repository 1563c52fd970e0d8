//! Request schema validation.
//!
//! Bodies are parsed in two steps: [`parse_json`] rejects malformed JSON, then
//! [`Validate::validate`] checks field-level rules and reports every failing
//! field at once.

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::error::Category;

use crate::error::AppError;

/// `deserialize_with` helper that trims surrounding whitespace.
pub fn trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(|s| s.trim().to_string())
}

pub fn trimmed_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(|s| s.map(|s| s.trim().to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|e| e.field.as_str())
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Checks the trimmed character length of a required text field.
    pub fn check_text(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let len = value.trim().chars().count();
        if len < min {
            if min == 1 {
                self.add(field, format!("{} is required", field));
            } else {
                self.add(field, format!("{} must be at least {} characters", field, min));
            }
        } else if len > max {
            self.add(field, format!("{} must be at most {} characters", field, max));
        }
    }

    /// Same as [`check_text`](Self::check_text) but skips absent values.
    pub fn check_optional_text(&mut self, field: &str, value: Option<&str>, min: usize, max: usize) {
        if let Some(value) = value {
            self.check_text(field, value, min, max);
        }
    }
}

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationErrors>;
}

/// Parses a raw request body. Syntax errors and empty bodies are reported as
/// malformed JSON; well-formed JSON of the wrong shape is a schema violation.
pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(AppError::BadRequest("Invalid JSON in request body".to_string()));
    }

    serde_json::from_slice(body).map_err(|err| match err.classify() {
        Category::Data => AppError::Validation(ValidationErrors::single("body", err.to_string())),
        Category::Syntax | Category::Eof | Category::Io => {
            AppError::BadRequest("Invalid JSON in request body".to_string())
        }
    })
}

/// Parses then validates a request body.
pub fn parse_body<T: DeserializeOwned + Validate>(body: &[u8]) -> Result<T, AppError> {
    let request: T = parse_json(body)?;
    request.validate()?;
    Ok(request)
}

/// Query-string extractor that rejects with the JSON error body instead of
/// axum's plain-text rejection.
#[derive(Debug, Clone, Default)]
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(QueryParams(value))
    }
}

pub fn validate_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

pub fn validate_username(username: &str) -> bool {
    (3..=30).contains(&username.len())
        && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn is_strong_password(password: &str) -> bool {
    let has_uppercase = password.chars().any(|c| c.is_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| "!@#$%^&*()_+-=[]{}|;:,.<>?".contains(c));

    password.chars().count() >= 8 && has_uppercase && has_lowercase && has_digit && has_special
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
    }

    impl Validate for Sample {
        fn validate(&self) -> Result<(), ValidationErrors> {
            let mut errors = ValidationErrors::new();
            errors.check_text("name", &self.name, 1, 5);
            errors.into_result()
        }
    }

    #[rstest]
    #[case(b"{\"name\": ")]
    #[case(b"not json")]
    #[case(b"")]
    #[case(b"   ")]
    fn malformed_json_is_bad_request(#[case] body: &[u8]) {
        let err = parse_body::<Sample>(body).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)), "got {:?}", err);
    }

    #[test]
    fn wrong_shape_is_validation_error() {
        let err = parse_body::<Sample>(br#"{"name": 42}"#).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn schema_rules_are_applied_after_parsing() {
        let err = parse_body::<Sample>(br#"{"name": "   "}"#).unwrap_err();
        match err {
            AppError::Validation(errors) => {
                assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["name"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let err = parse_body::<Sample>(br#"{"name": "toolong"}"#).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let ok = parse_body::<Sample>(br#"{"name": "ok"}"#).unwrap();
        assert_eq!(ok.name, "ok");
    }

    #[rstest]
    #[case("jane@example.com", true)]
    #[case("jane@example", false)]
    #[case("@example.com", false)]
    #[case("jane doe@example.com", false)]
    #[case("jane@.com", false)]
    fn email_format(#[case] email: &str, #[case] expected: bool) {
        assert_eq!(validate_email(email), expected);
    }

    #[rstest]
    #[case("jane_doe", true)]
    #[case("jd", false)]
    #[case("jane-doe", false)]
    #[case("a_really_long_username_over_thirty", false)]
    fn username_format(#[case] username: &str, #[case] expected: bool) {
        assert_eq!(validate_username(username), expected);
    }

    #[test]
    fn password_strength() {
        assert!(is_strong_password("Sup3r$ecret"));
        assert!(!is_strong_password("password123"));
        assert!(!is_strong_password("Sh0rt!"));
        // eight bytes but only five characters
        assert!(!is_strong_password("Ääé1!"));
        assert!(is_strong_password("Äpfel#12"));
    }
}
