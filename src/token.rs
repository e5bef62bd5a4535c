//! Signed, expiring bearer tokens (IA-2, SC-23)
//!
//! Tokens are compact JWS values with a fixed HS256 header:
//!
//! ```text
//! base64url({"alg":"HS256","typ":"JWT"}) . base64url(claim) . base64url(HMAC-SHA256)
//! ```
//!
//! The claim carries `username`, `iat` and `exp` (unix seconds), so tokens
//! interoperate with standard JWT libraries configured for HS256.
//!
//! # Verification order
//!
//! 1. exactly three segments
//! 2. header decodes
//! 3. declared `alg` equals [`TokenCodec::ALGORITHM`], checked before the
//!    signature is touched so `none`, `RS256` or `HS512` never reach the MAC
//! 4. signature over the received `header.payload` text matches
//! 5. claim decodes with `exp` present
//! 6. `exp` is not in the past (no leeway)
//!
//! Encoding and signature checks are done by `jsonwebtoken`.
//!
//! Verification is all-or-nothing: no partially trusted claim ever leaves
//! this module.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::signing_key::SigningKey;

// ============================================================================
// Identity and claim
// ============================================================================

/// An authenticated username.
///
/// Opaque to the service: it is whatever the credential table accepted at
/// login and whatever a verified token asserts afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(username: impl Into<String>) -> Self {
        Self(username.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Assertions embedded in a token. Immutable once issued and never stored
/// server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub username: Identity,
    /// Issued at (unix seconds)
    #[serde(rename = "iat")]
    pub issued_at: i64,
    /// Expires at (unix seconds)
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

impl Claim {
    /// Claim for `identity` valid from `issued_at` for `lifetime`.
    pub fn new(identity: Identity, issued_at: DateTime<Utc>, lifetime: Duration) -> Self {
        let lifetime = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX);
        let issued_at = issued_at.timestamp();
        Self {
            username: identity,
            issued_at,
            expires_at: issued_at.saturating_add(lifetime),
        }
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at < now
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Why a token was not issued or not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("unsupported token algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("token signature mismatch")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    /// The token could not be produced at all. Server-side fault.
    #[error("token signing failed: {0}")]
    Signing(String),
}

impl TokenError {
    /// Short reason code for security logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed_token",
            Self::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            Self::InvalidSignature => "invalid_signature",
            Self::Expired => "expired",
            Self::Signing(_) => "signing_failed",
        }
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Issues and verifies tokens under one process-wide signing key.
///
/// Stateless apart from the key; cloning shares the key.
#[derive(Clone)]
pub struct TokenCodec {
    keys: Arc<Keys>,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &Self::ALGORITHM)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// The only algorithm this codec issues or accepts.
    pub const ALGORITHM: &'static str = "HS256";

    pub fn new(key: SigningKey) -> Self {
        let keys = Keys {
            encoding: EncodingKey::from_secret(key.as_bytes()),
            decoding: DecodingKey::from_secret(key.as_bytes()),
        };
        Self {
            keys: Arc::new(keys),
        }
    }

    /// Serialize and sign `claim`.
    pub fn issue(&self, claim: &Claim) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claim, &self.keys.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify `token` against the current time.
    pub fn verify(&self, token: &str) -> Result<Claim, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify `token` as of `now` (unix seconds).
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claim, TokenError> {
        if token.split('.').count() != 3 {
            return Err(TokenError::Malformed);
        }

        let header = jsonwebtoken::decode_header(token).map_err(|_| unparsed_header(token))?;
        if header.alg != Algorithm::HS256 {
            return Err(TokenError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        // Expiry is checked below against `now`, not the library's clock
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.validate_aud = false;

        let claim = jsonwebtoken::decode::<Claim>(token, &self.keys.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })?;

        if claim.is_expired_at(now) {
            return Err(TokenError::Expired);
        }
        Ok(claim)
    }
}

/// Classify a header `jsonwebtoken` could not parse.
///
/// Algorithms it has no variant for (`none`, `hs256`) still arrive as an
/// `alg` string and are reported as unsupported rather than malformed.
fn unparsed_header(token: &str) -> TokenError {
    #[derive(Deserialize)]
    struct DeclaredAlg {
        alg: String,
    }

    let declared = token
        .split('.')
        .next()
        .and_then(|segment| URL_SAFE_NO_PAD.decode(segment).ok())
        .and_then(|bytes| serde_json::from_slice::<DeclaredAlg>(&bytes).ok());

    match declared {
        Some(DeclaredAlg { alg }) if alg != TokenCodec::ALGORITHM => {
            TokenError::UnsupportedAlgorithm(alg)
        }
        _ => TokenError::Malformed,
    }
}
