//! HTTP Error Handling (SI-11)
//!
//! Every handler and the auth gate return [`AppError`]. It carries a kind
//! (which fixes the status code), a client-safe message and optional
//! internal details. On the way out it logs itself and renders
//!
//! ```json
//! {"error": "unauthorized", "message": "Authentication required"}
//! ```
//!
//! Details are logged, never serialized. Internal failures always show the
//! same generic message regardless of what went wrong.

use std::fmt;

use axum::extract::rejection::FormRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::credentials::AuthError;
use crate::token::TokenError;

const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 400, malformed header or body
    BadRequest,
    /// 401, missing or rejected credential
    Unauthorized,
    /// 405
    MethodNotAllowed,
    /// 429, login lockout
    RateLimited,
    /// 500, details hidden
    Internal,
}

impl ErrorKind {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::BadRequest => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::RateLimited => "rate_limited",
            Self::Internal => "internal_error",
        };
        f.write_str(code)
    }
}

/// Error returned across the HTTP boundary.
#[derive(Debug)]
pub struct AppError {
    pub kind: ErrorKind,
    /// Safe to show the client
    pub message: String,
    /// Logged only
    pub details: Option<String>,
    /// Seconds, sent as `Retry-After` on 429
    pub retry_after: Option<u64>,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            retry_after: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(ErrorKind::MethodNotAllowed, "Method not allowed")
    }

    /// 429 with a `Retry-After` of `retry_after_secs` (at least one second).
    pub fn rate_limited(message: impl Into<String>, retry_after_secs: u64) -> Self {
        let mut err = Self::new(ErrorKind::RateLimited, message);
        err.retry_after = Some(retry_after_secs.max(1));
        err
    }

    /// 500. `source` is logged, the client sees a generic message.
    pub fn internal(message: impl Into<String>, source: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Internal, message).with_details(source.to_string())
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    fn log(&self) {
        let details = self.details.as_deref().unwrap_or("none");

        match self.kind {
            ErrorKind::Internal => {
                tracing::error!(
                    error_kind = %self.kind,
                    message = %self.message,
                    details = %details,
                    "Internal error"
                );
            }
            ErrorKind::Unauthorized | ErrorKind::RateLimited => {
                tracing::warn!(
                    error_kind = %self.kind,
                    message = %self.message,
                    "Auth error"
                );
            }
            _ => {
                tracing::debug!(
                    error_kind = %self.kind,
                    message = %self.message,
                    details = %details,
                    "Client error"
                );
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for AppError {}

// ============================================================================
// Error Response
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();

        let message = match self.kind {
            ErrorKind::Internal => INTERNAL_ERROR_MESSAGE.to_string(),
            _ => self.message,
        };
        let body = ErrorResponse {
            error: self.kind.to_string(),
            message,
        };

        let mut response = (self.kind.status_code(), Json(body)).into_response();
        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(_) => AppError::internal("Token signing failed", err),
            other => AppError::unauthorized("Authentication required").with_details(other.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => AppError::unauthorized("Invalid credentials"),
            AuthError::Token(token) => token.into(),
        }
    }
}

/// Request bodies are parsed with `serde_json` directly, whatever the
/// declared content type.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::bad_request("Invalid JSON body").with_details(err.to_string())
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        AppError::bad_request("Invalid form body").with_details(rejection.body_text())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: AppError) -> (StatusCode, Option<String>, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, retry_after, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn test_error_kind_status_codes() {
        assert_eq!(ErrorKind::BadRequest.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ErrorKind::MethodNotAllowed.status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(ErrorKind::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorKind::Internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let err = AppError::internal("Token signing failed", "HMAC key rejected");
        assert_eq!(err.details.as_deref(), Some("HMAC key rejected"));

        let (status, _, body) = render(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            serde_json::json!({"error": "internal_error", "message": "An internal error occurred"})
        );
    }

    #[tokio::test]
    async fn test_client_error_body() {
        let err = AppError::bad_request("Invalid JSON body").with_details("missing field `name`");
        let (status, retry_after, body) = render(err).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(retry_after.is_none());
        assert_eq!(body["error"], "bad_request");
        assert_eq!(body["message"], "Invalid JSON body");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_after() {
        let (status, retry_after, body) = render(AppError::rate_limited("Too many attempts", 90)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(retry_after.as_deref(), Some("90"));
        assert_eq!(body["error"], "rate_limited");

        let (_, retry_after, _) = render(AppError::rate_limited("Too many attempts", 0)).await;
        assert_eq!(retry_after.as_deref(), Some("1"));
    }

    #[test]
    fn test_token_error_conversion() {
        let err: AppError = TokenError::Expired.into();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
        assert_eq!(err.message, "Authentication required");

        let err: AppError = TokenError::Signing("boom".into()).into();
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[test]
    fn test_auth_error_conversion() {
        let err: AppError = AuthError::InvalidCredentials.into();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
        assert_eq!(err.message, "Invalid credentials");

        let err: AppError = AuthError::Token(TokenError::Signing("boom".into())).into();
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[test]
    fn test_error_display() {
        let err = AppError::unauthorized("Authentication required");
        assert_eq!(err.to_string(), "unauthorized: Authentication required");
    }
}
