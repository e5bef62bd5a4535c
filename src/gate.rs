//! Bearer Token Gate (AC-3, IA-2)
//!
//! Middleware in front of every guarded route. Per request:
//!
//! ```text
//! Received -> HeaderChecked -> TokenParsed -> Verified -> Delegated
//!        \            \             \            \
//!         +------------+-------------+------------+--> Rejected
//! ```
//!
//! - no `Authorization` header (or an empty one): 401
//! - header that does not split on single spaces into exactly two parts,
//!   or is not valid UTF-8: 400
//! - token that fails verification for any reason: 401
//!
//! The wrapped handler only runs after verification succeeds. The verified
//! [`Identity`] and [`Claim`] are placed in request extensions, and
//! `Identity` can be taken directly as an extractor.
//!
//! ```ignore
//! let guarded = Router::new()
//!     .route("/items", get(list_items))
//!     .layer(middleware::from_fn_with_state(codec, require_bearer));
//! ```

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::AppError;
use crate::observability::SecurityEvent;
use crate::token::{Claim, Identity, TokenCodec, TokenError};

/// Why the gate refused a request before it reached the handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateRejection {
    #[error("authorization header missing")]
    MissingHeader,

    #[error("authorization header malformed")]
    MalformedHeader,

    #[error(transparent)]
    Token(#[from] TokenError),
}

impl GateRejection {
    /// Short reason code for security logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingHeader => "missing_header",
            Self::MalformedHeader => "malformed_header",
            Self::Token(e) => e.reason(),
        }
    }
}

impl From<GateRejection> for AppError {
    fn from(rejection: GateRejection) -> Self {
        match rejection {
            GateRejection::MissingHeader => AppError::unauthorized("Authentication required"),
            GateRejection::MalformedHeader => {
                AppError::bad_request("Invalid authorization header format")
            }
            GateRejection::Token(e) => e.into(),
        }
    }
}

/// Pull the token out of `Authorization: <scheme> <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, GateRejection> {
    let value = match headers.get(AUTHORIZATION) {
        Some(value) if !value.is_empty() => value,
        _ => return Err(GateRejection::MissingHeader),
    };
    let value = value.to_str().map_err(|_| GateRejection::MalformedHeader)?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_scheme), Some(token), None) => Ok(token),
        _ => Err(GateRejection::MalformedHeader),
    }
}

/// Header check plus token verification, with no side effects.
pub fn authorize(codec: &TokenCodec, headers: &HeaderMap) -> Result<Claim, GateRejection> {
    let token = bearer_token(headers)?;
    Ok(codec.verify(token)?)
}

/// Middleware: reject unless the request carries a valid bearer token.
pub async fn require_bearer(
    State(codec): State<TokenCodec>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claim = match authorize(&codec, request.headers()) {
        Ok(claim) => claim,
        Err(rejection) => {
            crate::security_event!(
                SecurityEvent::AccessDenied,
                reason = rejection.reason(),
                method = %request.method(),
                path = %request.uri().path(),
                "Bearer token rejected"
            );
            return Err(rejection.into());
        }
    };

    crate::security_event!(
        SecurityEvent::AccessGranted,
        identity = %claim.username,
        method = %request.method(),
        path = %request.uri().path(),
        "Bearer token accepted"
    );

    request.extensions_mut().insert(claim.username.clone());
    request.extensions_mut().insert(claim);

    Ok(next.run(request).await)
}

/// Available in handlers behind [`require_bearer`].
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }
}
